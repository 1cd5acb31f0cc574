//! Multiple queues manager.
//!
//! The board owns every queue, tracks which one is current and is the only
//! place allowed to drive the player timeline. Methods do not (re)load a queue
//! into the player unless stated otherwise. Every operation degrades silently:
//! bad indices are clamped or reset, empty input is a no-op.

use rand::Rng;

use crate::metadata::MediaMetadata;
use crate::player::Player;
use crate::queue::{MultiQueue, QueueId, extension_title, follow_move};
use crate::writer::PersistWriter;

/// How [`QueueBoard::add_queue`] treats a title that already exists
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddQueueOptions {
    /// Load the queue shuffled, starting from a random song
    pub shuffled: bool,
    /// Add the songs even when they only repeat the existing queue
    pub force_insert: bool,
    /// Overwrite the whole queue. Overrides `force_insert` and `delta`.
    pub replace: bool,
    /// Add only songs the queue does not have yet. When false, every song is
    /// appended and the queue becomes an extension queue.
    pub delta: bool,
    /// Continuation token for queues backed by a paged remote source
    pub continuation: Option<String>,
    /// Song to start from, as an index into the added list
    pub start_index: usize,
}

impl Default for AddQueueOptions {
    fn default() -> Self {
        Self {
            shuffled: false,
            force_insert: false,
            replace: false,
            delta: true,
            continuation: None,
            start_index: 0,
        }
    }
}

impl AddQueueOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shuffled(mut self, shuffled: bool) -> Self {
        self.shuffled = shuffled;
        self
    }

    pub fn force_insert(mut self, force_insert: bool) -> Self {
        self.force_insert = force_insert;
        self
    }

    pub fn replace(mut self, replace: bool) -> Self {
        self.replace = replace;
        self
    }

    pub fn delta(mut self, delta: bool) -> Self {
        self.delta = delta;
        self
    }

    pub fn continuation(mut self, continuation: impl Into<String>) -> Self {
        self.continuation = Some(continuation.into());
        self
    }

    pub fn start_index(mut self, start_index: usize) -> Self {
        self.start_index = start_index;
        self
    }
}

pub struct QueueBoard<P: Player> {
    player: P,
    master_queues: Vec<MultiQueue>,
    master_index: Option<usize>,
    max_queues: usize,
    writer: Option<PersistWriter>,
}

impl<P: Player> QueueBoard<P> {
    /// Build a board from previously stored queues, keeping only the most recent
    /// `max_queues`. Without a writer the board works purely in memory.
    pub fn new(
        player: P,
        queues: Vec<MultiQueue>,
        max_queues: usize,
        writer: Option<PersistWriter>,
    ) -> Self {
        let max_queues = max_queues.max(1);
        let mut queues = queues;
        if queues.len() > max_queues {
            queues.drain(..queues.len() - max_queues);
        }

        let mut board = Self {
            player,
            master_index: queues.len().checked_sub(1),
            master_queues: queues,
            max_queues,
            writer,
        };
        board.regenerate_indexes();
        log::info!(
            "Queue board with {} queue limit. Persist queues = {}. Queues loaded = {}",
            board.max_queues,
            board.writer.is_some(),
            board.master_queues.len()
        );
        board
    }

    // ========================
    // Data structure management
    // ========================

    /// Regenerate indexes of queues to reflect their position
    fn regenerate_indexes(&mut self) {
        for (index, q) in self.master_queues.iter_mut().enumerate() {
            q.index = index;
        }
    }

    /// Push the queue at `index` to the end of the board and track it as current
    fn bubble_up(&mut self, index: usize) {
        if index >= self.master_queues.len() {
            log::warn!("Bubble up index out of bounds");
            return;
        }

        let item = self.master_queues.remove(index);
        self.master_queues.push(item);
        self.master_index = Some(self.master_queues.len() - 1);

        self.regenerate_indexes();
        self.save_all_queues();
    }

    fn index_of_id(&self, id: QueueId) -> Option<usize> {
        self.master_queues.iter().position(|q| q.id() == id)
    }

    fn index_of_title(&self, title: &str) -> Option<usize> {
        self.master_queues.iter().position(|q| q.title == title)
    }

    fn generate_queue_id(&self) -> QueueId {
        let mut rng = rand::rng();
        loop {
            let id = rng.random_range(10_000_000..100_000_000);
            if self.index_of_id(id).is_none() {
                return id;
            }
        }
    }

    /// Add a new queue to the board, or add to a queue if it exists.
    ///
    /// When a queue titled `title` exists:
    /// 1. `replace`: its contents are overwritten.
    /// 2. The songs are exactly the queue's songs (by id) and `force_insert` is off:
    ///    only the current position moves to the start song.
    /// 3. `delta`: songs not in the queue yet are appended and the position jumps
    ///    to the start song.
    /// 4. The queue is an extension queue, or has one: everything is appended to
    ///    the extension queue.
    /// 5. Otherwise everything is appended and the queue is renamed into an
    ///    extension queue, so the source-titled queue stays recognisable.
    ///
    /// Without a match a new queue is created, evicting the oldest one at capacity.
    /// Returns `None` when `media_list` is empty.
    pub fn add_queue(
        &mut self,
        title: &str,
        media_list: Vec<MediaMetadata>,
        options: AddQueueOptions,
    ) -> Option<&MultiQueue> {
        log::debug!(
            "Adding to queue \"{}\". medialist size = {}. forceInsert/replace/delta/startIndex = {}/{}/{}/{}",
            title,
            media_list.len(),
            options.force_insert,
            options.replace,
            options.delta,
            options.start_index
        );

        if media_list.is_empty() {
            return None;
        }
        let start_index = options.start_index.min(media_list.len() - 1);

        let mut matched = self.index_of_title(title);
        if matched.is_none() && !options.replace && !options.delta {
            // Additions to a source that already spawned an extension keep landing there
            matched = self.index_of_title(&extension_title(title));
        }

        let id = match matched {
            Some(index) => self.add_to_existing(index, media_list, options, start_index),
            None => self.add_new_queue(title, media_list, options, start_index),
        };
        self.index_of_id(id).map(|index| &self.master_queues[index])
    }

    fn add_to_existing(
        &mut self,
        index: usize,
        media_list: Vec<MediaMetadata>,
        options: AddQueueOptions,
        start_index: usize,
    ) -> QueueId {
        let AddQueueOptions {
            shuffled,
            force_insert,
            replace,
            delta,
            continuation,
            ..
        } = options;
        let start_id = media_list[start_index].id.clone();
        let q = &mut self.master_queues[index];
        let id = q.id();

        if replace {
            log::debug!("Adding to queue: replacing all queue items");
            q.replace_all(media_list);
            q.unshuffle();
            q.set_queue_pos(start_index);
            q.playlist_id = continuation;
            if shuffled {
                self.shuffle(index, false, true);
            }
            self.save_queue_songs(id);
            return id;
        }

        let contains_all = media_list.iter().all(|s| q.contains(&s.id));
        if contains_all && q.len() == media_list.len() && !force_insert {
            log::debug!("Adding to queue: jump only");
            if let Some(pos) = q.position_of(&start_id) {
                q.set_queue_pos(pos);
            }
            q.playlist_id = continuation;
            if shuffled {
                self.shuffle(index, false, true);
                self.save_queue_songs(id);
            } else {
                self.save_queue(id);
            }
            return id;
        }

        if delta {
            log::debug!("Adding to queue: delta additive");
            let mut fresh: Vec<MediaMetadata> = Vec::new();
            for s in media_list {
                if !q.contains(&s.id) && !fresh.iter().any(|f| f.id == s.id) {
                    fresh.push(s);
                }
            }
            q.append(fresh);
            if let Some(pos) = q.position_of(&start_id) {
                q.set_queue_pos(pos);
            }
            q.playlist_id = continuation;
            if shuffled {
                self.shuffle(index, false, true);
            }
            self.save_queue_songs(id);
            return id;
        }

        let extension = if q.is_extension() {
            Some(index)
        } else {
            let ext_title = extension_title(&q.title);
            self.index_of_title(&ext_title)
        };

        if let Some(ext_index) = extension {
            log::debug!("Adding to queue: extension queue additive");
            let ext_id = self.master_queues[ext_index].id();
            self.add_songs_to_queue(ext_index, usize::MAX, media_list, false);
            if let Some(ext_index) = self.index_of_id(ext_id) {
                self.master_queues[ext_index].playlist_id = continuation;
                if shuffled {
                    self.shuffle(ext_index, false, true);
                }
            }
            self.save_queue_songs(ext_id);
            return ext_id;
        }

        log::debug!("Adding to queue: extension queue rename + extension queue additive");
        self.add_songs_to_queue(index, usize::MAX, media_list, false);
        if let Some(index) = self.index_of_id(id) {
            let q = &mut self.master_queues[index];
            q.title = extension_title(&q.title);
            q.playlist_id = continuation;
            if shuffled {
                self.shuffle(index, false, true);
            }
        }
        self.save_queue_songs(id);
        id
    }

    fn add_new_queue(
        &mut self,
        title: &str,
        media_list: Vec<MediaMetadata>,
        options: AddQueueOptions,
        start_index: usize,
    ) -> QueueId {
        if self.master_queues.len() >= self.max_queues {
            let oldest = self.master_queues[0].title.clone();
            self.delete_queue(&oldest);
        }

        let id = self.generate_queue_id();
        let mut queue = MultiQueue::new(
            id,
            title,
            media_list,
            self.master_queues.len(),
            options.continuation,
        );
        queue.set_queue_pos(start_index);
        self.master_queues.push(queue);

        if options.shuffled {
            self.shuffle(self.master_queues.len() - 1, false, true);
        }
        self.save_queue_songs(id);
        self.save_all_queues();
        id
    }

    /// Add songs to the end of the current queue and update it in the player
    pub fn enqueue_end(&mut self, media_list: Vec<MediaMetadata>) {
        if let Some(index) = self.current_index() {
            self.add_songs_to_queue(index, usize::MAX, media_list, true);
        }
    }

    /// Insert songs at `pos` of the queue's active ordering and load the queue
    /// into the player
    pub fn add_songs_to_queue(
        &mut self,
        queue: usize,
        pos: usize,
        media_list: Vec<MediaMetadata>,
        save_to_db: bool,
    ) {
        let Some(q) = self.master_queues.get_mut(queue) else {
            log::warn!("Cannot add songs to queue at {}: out of bounds", queue);
            return;
        };
        if media_list.is_empty() {
            return;
        }
        let id = q.id();

        log::debug!("Inserting {} songs at position: {}", media_list.len(), pos.min(q.len()));
        q.insert_at_active(pos, media_list);

        self.set_curr_queue(queue, false);

        if save_to_db {
            self.save_queue_songs(id);
        }
    }

    /// Remove a song from the current queue
    pub fn remove_current_queue_song(&mut self, index: usize) -> bool {
        match self.current_index() {
            Some(queue) => self.remove_song(queue, index),
            None => false,
        }
    }

    /// Remove the song at `index` of the queue's active ordering
    pub fn remove_song(&mut self, queue: usize, index: usize) -> bool {
        let Some(q) = self.master_queues.get_mut(queue) else {
            return false;
        };

        match q.remove_at_active(index) {
            Some(song) => {
                log::debug!("Removed song: {}", song.title);
                let id = q.id();
                self.save_queue_songs(id);
                true
            }
            None => {
                log::warn!("No song at index {} in queue \"{}\"", index, q.title);
                false
            }
        }
    }

    /// Delete the queue titled `title`. Returns the number of queues left.
    pub fn delete_queue(&mut self, title: &str) -> usize {
        log::debug!("Deleting queue {}", title);

        match self.index_of_title(title) {
            Some(index) => {
                let removed = self.master_queues.remove(index);
                self.master_index = match self.master_index {
                    _ if self.master_queues.is_empty() => None,
                    Some(current) if index < current => Some(current - 1),
                    Some(current) if index == current => Some(current.saturating_sub(1)),
                    other => other,
                };
                self.regenerate_indexes();

                if let Some(writer) = &self.writer {
                    writer.delete(removed.id());
                }
                self.save_all_queues();
            }
            None => log::warn!("Cannot find queue to delete: {}", title),
        }

        self.master_queues.len()
    }

    /// Un-shuffle the current queue
    pub fn un_shuffle_current(&mut self) -> usize {
        match self.current_index() {
            Some(index) => self.un_shuffle(index),
            None => 0,
        }
    }

    /// Switch a queue back to canonical order. Returns its position tracker.
    pub fn un_shuffle(&mut self, index: usize) -> usize {
        let Some(q) = self.master_queues.get_mut(index) else {
            return 0;
        };
        if q.shuffled() {
            log::debug!("Un-shuffling queue {}", q.title);
        }
        let pos = q.unshuffle();
        let id = q.id();

        self.save_queue_songs(id);
        self.bubble_up(index);
        pos
    }

    /// Shuffle the current queue
    pub fn shuffle_current(&mut self, preserve_current: bool, bypass_save_to_db: bool) -> usize {
        match self.current_index() {
            Some(index) => self.shuffle(index, preserve_current, bypass_save_to_db),
            None => 0,
        }
    }

    /// Shuffle a queue.
    ///
    /// `preserve_current` keeps the playing song at the head of the shuffle order,
    /// otherwise playback starts over from a random song. Returns the new position
    /// tracker.
    pub fn shuffle(&mut self, index: usize, preserve_current: bool, bypass_save_to_db: bool) -> usize {
        let Some(q) = self.master_queues.get_mut(index) else {
            return 0;
        };
        log::debug!("Shuffling queue {}", q.title);

        let pos = q.shuffle(&mut rand::rng(), preserve_current);
        let id = q.id();

        if !bypass_save_to_db {
            self.save_queue_songs(id);
        }
        self.bubble_up(index);
        pos
    }

    /// Move a queue on the board
    pub fn move_queue(&mut self, from_index: usize, to_index: usize) {
        if self.master_queues.is_empty() {
            return;
        }
        let last = self.master_queues.len() - 1;
        let (from_index, to_index) = (from_index.min(last), to_index.min(last));

        self.master_index = self
            .master_index
            .map(|current| follow_move(current, from_index, to_index));

        let item = self.master_queues.remove(from_index);
        self.master_queues.insert(to_index, item);
        self.regenerate_indexes();
        self.save_all_queues();
    }

    /// Move a song in the current queue
    pub fn move_current_song(&mut self, from_index: usize, to_index: usize) -> Option<usize> {
        let queue = self.current_index()?;
        Some(self.move_song(queue, from_index, to_index))
    }

    /// Move a song inside a queue's active ordering. Returns the new position of
    /// the current song.
    pub fn move_song(&mut self, queue: usize, from_index: usize, to_index: usize) -> usize {
        let Some(q) = self.master_queues.get_mut(queue) else {
            return 0;
        };
        let pos = q.move_active(from_index, to_index);
        let id = q.id();
        self.save_queue_songs(id);

        log::debug!("Moved item from {} to {}, current now at {}", from_index, to_index, pos);
        pos
    }

    // =================
    // Player management
    // =================

    /// All queues, oldest first
    pub fn queues(&self) -> &[MultiQueue] {
        &self.master_queues
    }

    pub fn master_index(&self) -> Option<usize> {
        self.master_index
    }

    pub fn max_queues(&self) -> usize {
        self.max_queues
    }

    pub fn find_queue(&self, title: &str) -> Option<&MultiQueue> {
        self.index_of_title(title).map(|i| &self.master_queues[i])
    }

    pub fn player(&self) -> &P {
        &self.player
    }

    pub fn player_mut(&mut self) -> &mut P {
        &mut self.player
    }

    pub fn writer(&self) -> Option<&PersistWriter> {
        self.writer.as_ref()
    }

    /// Index of the current queue, resetting a stale index to the last queue
    pub fn current_index(&mut self) -> Option<usize> {
        match self.master_index {
            Some(index) if index < self.master_queues.len() => Some(index),
            stale => {
                if stale.is_some() {
                    log::warn!("Current queue index {:?} is out of bounds, resetting", stale);
                }
                self.master_index = self.master_queues.len().checked_sub(1);
                None
            }
        }
    }

    /// The current queue, if the current index is valid
    pub fn current_queue(&mut self) -> Option<&MultiQueue> {
        let index = self.current_index()?;
        self.master_queues.get(index)
    }

    /// Rename a queue. Titles identify queues, so a name taken by another queue
    /// is refused.
    pub fn rename_queue(&mut self, queue: usize, new_name: &str) -> bool {
        if self.index_of_title(new_name).is_some_and(|taken| taken != queue) {
            log::warn!("Cannot rename queue {} to \"{}\": title already in use", queue, new_name);
            return false;
        }
        let Some(q) = self.master_queues.get_mut(queue) else {
            return false;
        };
        log::debug!("Renamed queue from \"{}\" to \"{}\"", q.title, new_name);
        q.title = new_name.to_string();
        let id = q.id();
        self.save_queue(id);
        true
    }

    /// Load the queue at `index` into the player.
    ///
    /// `should_resume` resumes the current song at its saved position instead of
    /// from the start. Returns the position loaded, or `None` when there is no such
    /// queue or it is empty.
    pub fn set_curr_queue(&mut self, index: usize, should_resume: bool) -> Option<usize> {
        if index >= self.master_queues.len() {
            log::warn!("Cannot load queue {}: out of bounds", index);
            self.current_index();
            return None;
        }
        self.load_queue(index, should_resume)
    }

    /// Load the current queue into the player, clearing the player when there is none
    pub fn load_current(&mut self, should_resume: bool) -> Option<usize> {
        match self.current_index() {
            Some(index) => self.load_queue(index, should_resume),
            None => {
                self.player.clear_media_items();
                None
            }
        }
    }

    fn load_queue(&mut self, index: usize, should_resume: bool) -> Option<usize> {
        let q = &self.master_queues[index];
        log::debug!(
            "Loading queue {} into player. Shuffle state = {}",
            q.title,
            q.shuffled()
        );

        if q.is_empty() {
            self.player.clear_media_items();
            return None;
        }

        let queue_pos = q.active_pos();
        let last_song_pos = if should_resume { q.last_song_pos } else { None };
        let shuffled = q.shuffled();
        let media_items: Vec<MediaMetadata> = q.active_items().into_iter().cloned().collect();

        // The playing song is already the jump target: edit around it instead of
        // reloading, which would restart playback
        let seamless = self.player.current_media_id() == Some(media_items[queue_pos].id.as_str());
        if seamless {
            let player_index = self.player.current_media_item_index();
            log::debug!("Trying seamless queue switch. Is first song?: {}", queue_pos == 0);

            if queue_pos == 0 {
                let player_item_count = self.player.media_item_count();
                if player_index + 1 < player_item_count {
                    self.player.remove_media_items(player_index + 1, player_item_count);
                }
                if player_index > 0 {
                    self.player.remove_media_items(0, player_index);
                }
                self.player.add_media_items(media_items[1..].to_vec());
            } else {
                self.player
                    .replace_media_items(0, player_index, media_items[..queue_pos].to_vec());
                self.player.replace_media_items(
                    queue_pos + 1,
                    usize::MAX,
                    media_items[queue_pos + 1..].to_vec(),
                );
            }
        } else {
            log::debug!("Seamless is not supported. Loading songs in directly");
            self.player.set_media_items(media_items, queue_pos, last_song_pos);
        }

        self.bubble_up(index);
        if self.player.shuffle_mode_enabled() != shuffled {
            self.player.set_shuffle_mode_enabled(shuffled);
        }
        Some(queue_pos)
    }

    /// Update the current position of the current queue, as an index into its
    /// active ordering
    pub fn set_curr_queue_pos_index(&mut self, index: usize) {
        if let Some(queue) = self.current_index() {
            let q = &mut self.master_queues[queue];
            if q.active_pos() != index {
                q.set_active_pos(index);
            }
            let id = q.id();
            self.save_queue(id);
        }
    }

    /// Remember the playback position inside the current song
    pub fn set_last_song_pos(&mut self, position_ms: Option<u64>) {
        if let Some(queue) = self.current_index() {
            let q = &mut self.master_queues[queue];
            q.last_song_pos = position_ms;
            let id = q.id();
            self.save_queue(id);
        }
    }

    /// Drop pending writes and stop the write task
    pub fn shutdown(&mut self) {
        if let Some(writer) = &self.writer {
            writer.shutdown();
        }
    }

    // ========================
    // Database sync management
    // ========================

    fn save_queue_songs(&self, id: QueueId) {
        if let (Some(writer), Some(index)) = (&self.writer, self.index_of_id(id)) {
            writer.save_songs(&self.master_queues[index]);
        }
    }

    fn save_queue(&self, id: QueueId) {
        if let (Some(writer), Some(index)) = (&self.writer, self.index_of_id(id)) {
            writer.save_position(&self.master_queues[index]);
        }
    }

    fn save_all_queues(&self) {
        if let Some(writer) = &self.writer {
            writer.save_order(&self.master_queues);
        }
    }
}
