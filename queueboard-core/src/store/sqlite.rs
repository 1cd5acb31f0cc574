use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::error::QueueError;
use crate::metadata::{Album, Artist, MediaMetadata};
use crate::queue::{MultiQueue, QueueId};
use crate::store::{QueueEntity, QueueStore};
use crate::Result;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS queue (
    id INTEGER PRIMARY KEY,
    title TEXT NOT NULL DEFAULT '',
    shuffled INTEGER NOT NULL DEFAULT 0,
    queue_pos INTEGER NOT NULL DEFAULT -1,
    last_song_pos INTEGER,
    idx INTEGER NOT NULL DEFAULT 0,
    playlist_id TEXT
);
CREATE TABLE IF NOT EXISTS song (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    artists TEXT NOT NULL DEFAULT '[]',
    duration INTEGER NOT NULL DEFAULT 0,
    thumbnail_url TEXT,
    album TEXT,
    explicit INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS queue_song_map (
    queue_id INTEGER NOT NULL,
    idx INTEGER NOT NULL,
    song_id TEXT NOT NULL,
    shuffle_index INTEGER NOT NULL,
    PRIMARY KEY (queue_id, idx)
);
CREATE INDEX IF NOT EXISTS idx_queue_song_map_queue ON queue_song_map(queue_id, idx);
";

/// SQLite backed store, one database for every queue
pub struct SqliteQueueStore {
    conn: Mutex<Connection>,
}

impl SqliteQueueStore {
    /// Open (or create) the database at `db_path`
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path)?;
        log::info!("Opened queue database at {}", db_path.display());
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| QueueError::Poisoned)
    }

    /// Map a `SELECT id, title, shuffled, queue_pos, last_song_pos, idx, playlist_id` row
    fn entity_from_row(row: &Row<'_>) -> rusqlite::Result<QueueEntity> {
        let last_song_pos: Option<i64> = row.get(4)?;
        let index: i64 = row.get(5)?;
        Ok(QueueEntity {
            id: row.get(0)?,
            title: row.get(1)?,
            shuffled: row.get(2)?,
            queue_pos: row.get(3)?,
            last_song_pos: last_song_pos.and_then(|p| u64::try_from(p).ok()),
            index: usize::try_from(index).unwrap_or(0),
            playlist_id: row.get(6)?,
        })
    }

    fn read_entities(conn: &Connection) -> Result<Vec<QueueEntity>> {
        let mut stmt = conn.prepare(
            "SELECT id, title, shuffled, queue_pos, last_song_pos, idx, playlist_id
             FROM queue ORDER BY idx ASC",
        )?;
        let rows = stmt.query_map([], Self::entity_from_row)?;

        let mut entities = Vec::new();
        for row in rows {
            entities.push(row?);
        }
        Ok(entities)
    }

    fn read_songs(conn: &Connection, queue_id: QueueId) -> Result<Vec<(MediaMetadata, usize)>> {
        let mut stmt = conn.prepare(
            "SELECT song.id, song.title, song.artists, song.duration, song.thumbnail_url,
                    song.album, song.explicit, queue_song_map.shuffle_index
             FROM queue_song_map JOIN song ON queue_song_map.song_id = song.id
             WHERE queue_song_map.queue_id = ?1
             ORDER BY queue_song_map.idx ASC",
        )?;
        let rows = stmt.query_map(params![queue_id], |row| {
            let artists: String = row.get(2)?;
            let album: Option<String> = row.get(5)?;
            let shuffle_index: i64 = row.get(7)?;
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                artists,
                row.get::<_, u32>(3)?,
                row.get::<_, Option<String>>(4)?,
                album,
                row.get::<_, bool>(6)?,
                shuffle_index,
            ))
        })?;

        let mut songs = Vec::new();
        for row in rows {
            let (id, title, artists, duration, thumbnail_url, album, explicit, shuffle_index) = row?;
            let artists: Vec<Artist> = serde_json::from_str(&artists)?;
            let album: Option<Album> = match album {
                Some(json) => Some(serde_json::from_str(&json)?),
                None => None,
            };
            let song = MediaMetadata {
                id,
                title,
                artists,
                duration,
                thumbnail_url,
                album,
                explicit,
            };
            songs.push((song, usize::try_from(shuffle_index).unwrap_or(usize::MAX)));
        }
        Ok(songs)
    }

    fn write_entity(conn: &Connection, entity: &QueueEntity) -> Result<()> {
        conn.execute(
            "INSERT OR REPLACE INTO queue (id, title, shuffled, queue_pos, last_song_pos, idx, playlist_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entity.id,
                entity.title,
                entity.shuffled,
                entity.queue_pos,
                entity.last_song_pos.map(|p| p as i64),
                entity.index as i64,
                entity.playlist_id,
            ],
        )?;
        Ok(())
    }

    fn update_entity(conn: &Connection, entity: &QueueEntity) -> Result<()> {
        conn.execute(
            "UPDATE queue SET title = ?2, shuffled = ?3, queue_pos = ?4, last_song_pos = ?5,
                    idx = ?6, playlist_id = ?7
             WHERE id = ?1",
            params![
                entity.id,
                entity.title,
                entity.shuffled,
                entity.queue_pos,
                entity.last_song_pos.map(|p| p as i64),
                entity.index as i64,
                entity.playlist_id,
            ],
        )?;
        Ok(())
    }
}

impl QueueStore for SqliteQueueStore {
    fn read_queues(&self) -> Result<Vec<MultiQueue>> {
        let conn = self.lock()?;
        let mut queues = Vec::new();

        for entity in Self::read_entities(&conn)? {
            let songs = Self::read_songs(&conn, entity.id)?;
            if songs.is_empty() {
                continue;
            }
            queues.push(MultiQueue::restore(entity, songs));
        }
        log::debug!("Read {} queues from the database", queues.len());
        Ok(queues)
    }

    fn resumption_queue(&self) -> Result<Option<MultiQueue>> {
        let conn = self.lock()?;
        let entity = match Self::read_entities(&conn)?.pop() {
            Some(entity) => entity,
            None => return Ok(None),
        };
        let songs = Self::read_songs(&conn, entity.id)?;
        if songs.is_empty() {
            return Ok(None);
        }
        Ok(Some(MultiQueue::restore(entity, songs)))
    }

    fn save_queue(&self, queue: &MultiQueue) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        Self::write_entity(&tx, &queue.to_entity())?;
        tx.execute(
            "DELETE FROM queue_song_map WHERE queue_id = ?1",
            params![queue.id()],
        )?;

        for (idx, (song, shuffle_index)) in queue.song_rows().into_iter().enumerate() {
            let album = song.album.as_ref().map(serde_json::to_string).transpose()?;
            tx.execute(
                "INSERT OR REPLACE INTO song (id, title, artists, duration, thumbnail_url, album, explicit)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    song.id,
                    song.title,
                    serde_json::to_string(&song.artists)?,
                    song.duration,
                    song.thumbnail_url,
                    album,
                    song.explicit,
                ],
            )?;
            tx.execute(
                "INSERT INTO queue_song_map (queue_id, idx, song_id, shuffle_index)
                 VALUES (?1, ?2, ?3, ?4)",
                params![queue.id(), idx as i64, song.id, shuffle_index as i64],
            )?;
        }

        tx.commit()?;
        log::debug!("Saved queue \"{}\" with {} songs", queue.title, queue.len());
        Ok(())
    }

    fn update_queue(&self, entity: &QueueEntity) -> Result<()> {
        let conn = self.lock()?;
        Self::update_entity(&conn, entity)
    }

    fn update_all_queues(&self, entities: &[QueueEntity]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let stored: Vec<QueueId> = {
            let mut stmt = tx.prepare("SELECT id FROM queue")?;
            let ids = stmt.query_map([], |row| row.get(0))?;
            ids.collect::<std::result::Result<_, _>>()?
        };
        for id in stored {
            if !entities.iter().any(|e| e.id == id) {
                tx.execute("DELETE FROM queue WHERE id = ?1", params![id])?;
                tx.execute("DELETE FROM queue_song_map WHERE queue_id = ?1", params![id])?;
            }
        }
        for entity in entities {
            tx.execute(
                "UPDATE queue SET idx = ?2 WHERE id = ?1",
                params![entity.id, entity.index as i64],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn delete_queue(&self, id: QueueId) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM queue WHERE id = ?1", params![id])?;
        conn.execute("DELETE FROM queue_song_map WHERE queue_id = ?1", params![id])?;
        Ok(())
    }
}

impl SqliteQueueStore {
    /// Stored metadata of a single queue
    pub fn entity(&self, id: QueueId) -> Result<Option<QueueEntity>> {
        let conn = self.lock()?;
        let entity = conn
            .query_row(
                "SELECT id, title, shuffled, queue_pos, last_song_pos, idx, playlist_id
                 FROM queue WHERE id = ?1",
                params![id],
                Self::entity_from_row,
            )
            .optional()?;
        Ok(entity)
    }
}
