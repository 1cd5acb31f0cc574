use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::error::QueueError;
use crate::metadata::MediaMetadata;
use crate::queue::{MultiQueue, QueueId};
use crate::store::{QueueEntity, QueueStore};
use crate::Result;

#[derive(Default)]
struct Tables {
    queues: HashMap<QueueId, QueueEntity>,
    songs: HashMap<QueueId, Vec<(MediaMetadata, usize)>>,
}

/// Store kept in process memory, lost on exit
#[derive(Default)]
pub struct MemoryQueueStore {
    tables: Mutex<Tables>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables.lock().map_err(|_| QueueError::Poisoned)
    }

    pub fn entity(&self, id: QueueId) -> Option<QueueEntity> {
        self.lock().ok()?.queues.get(&id).cloned()
    }

    pub fn song_ids(&self, id: QueueId) -> Vec<String> {
        self.lock()
            .ok()
            .and_then(|t| t.songs.get(&id).map(|rows| rows.iter().map(|(s, _)| s.id.clone()).collect()))
            .unwrap_or_default()
    }

    pub fn queue_count(&self) -> usize {
        self.lock().map(|t| t.queues.len()).unwrap_or(0)
    }
}

impl QueueStore for MemoryQueueStore {
    fn read_queues(&self) -> Result<Vec<MultiQueue>> {
        let tables = self.lock()?;
        let mut entities: Vec<&QueueEntity> = tables.queues.values().collect();
        entities.sort_by_key(|e| e.index);

        Ok(entities
            .into_iter()
            .filter_map(|e| {
                let rows = tables.songs.get(&e.id).filter(|rows| !rows.is_empty())?;
                Some(MultiQueue::restore(e.clone(), rows.clone()))
            })
            .collect())
    }

    fn save_queue(&self, queue: &MultiQueue) -> Result<()> {
        let mut tables = self.lock()?;
        tables.queues.insert(queue.id(), queue.to_entity());
        let rows = queue
            .song_rows()
            .into_iter()
            .map(|(song, shuffle_index)| (song.clone(), shuffle_index))
            .collect();
        tables.songs.insert(queue.id(), rows);
        Ok(())
    }

    fn update_queue(&self, entity: &QueueEntity) -> Result<()> {
        let mut tables = self.lock()?;
        // Like an SQL UPDATE, unknown queues are left alone
        if let Some(existing) = tables.queues.get_mut(&entity.id) {
            *existing = entity.clone();
        }
        Ok(())
    }

    fn update_all_queues(&self, entities: &[QueueEntity]) -> Result<()> {
        let mut tables = self.lock()?;
        tables
            .queues
            .retain(|id, _| entities.iter().any(|e| e.id == *id));
        let Tables { queues, songs } = &mut *tables;
        songs.retain(|id, _| queues.contains_key(id));

        for entity in entities {
            if let Some(existing) = tables.queues.get_mut(&entity.id) {
                existing.index = entity.index;
            }
        }
        Ok(())
    }

    fn delete_queue(&self, id: QueueId) -> Result<()> {
        let mut tables = self.lock()?;
        tables.queues.remove(&id);
        tables.songs.remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue(id: QueueId, title: &str, ids: &[&str], index: usize) -> MultiQueue {
        let songs = ids.iter().map(|id| MediaMetadata::new(*id, *id)).collect();
        MultiQueue::new(id, title, songs, index, None)
    }

    #[test]
    fn order_update_keeps_metadata_and_drops_unlisted() {
        let store = MemoryQueueStore::new();
        let mut a = queue(1, "a", &["A"], 0);
        let b = queue(2, "b", &["B", "C"], 1);
        store.save_queue(&a).unwrap();
        store.save_queue(&b).unwrap();

        a.title = "renamed".into();
        a.index = 0;
        store.update_queue(&a.to_entity()).unwrap();

        // A stale ordering snapshot must not undo the rename
        let mut stale = queue(1, "a", &["A"], 1);
        stale.index = 1;
        store.update_all_queues(&[stale.to_entity()]).unwrap();

        let read = store.read_queues().unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].title, "renamed");
        assert_eq!(read[0].index, 1);
        assert!(store.song_ids(2).is_empty());
    }

    #[test]
    fn update_of_unknown_queue_is_ignored() {
        let store = MemoryQueueStore::new();
        store.update_queue(&queue(9, "ghost", &["A"], 0).to_entity()).unwrap();
        assert_eq!(store.queue_count(), 0);
    }
}
