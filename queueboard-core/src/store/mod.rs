//! Persistence of queues across restarts.
//!
//! A queue is stored as one [`QueueEntity`] row plus its ordered song membership,
//! each song tagged with its shuffle position. The board never calls a store
//! directly; writes go through the debounced [`crate::writer::PersistWriter`].

mod memory;
mod sqlite;

pub use memory::MemoryQueueStore;
pub use sqlite::SqliteQueueStore;

use crate::Result;
use crate::queue::{MultiQueue, QueueId};

/// Queue metadata without its songs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntity {
    pub id: QueueId,
    pub title: String,
    pub shuffled: bool,
    /// Canonical index of the current song, negative when unset
    pub queue_pos: i64,
    pub last_song_pos: Option<u64>,
    pub index: usize,
    pub playlist_id: Option<String>,
}

pub trait QueueStore: Send + Sync {
    /// All stored queues ordered by their board index. Queues without songs are skipped.
    fn read_queues(&self) -> Result<Vec<MultiQueue>>;

    /// The most recently used queue, if any
    fn resumption_queue(&self) -> Result<Option<MultiQueue>> {
        Ok(self.read_queues()?.pop())
    }

    /// Rewrite a queue's metadata and its whole song membership
    fn save_queue(&self, queue: &MultiQueue) -> Result<()>;

    /// Update metadata and position only
    fn update_queue(&self, entity: &QueueEntity) -> Result<()>;

    /// Store the board ordering. Only the index of listed queues changes; queues
    /// missing from `entities` are deleted.
    fn update_all_queues(&self, entities: &[QueueEntity]) -> Result<()>;

    fn delete_queue(&self, id: QueueId) -> Result<()>;
}
