//! Debounced write-back of queue state.
//!
//! Queue mutations arrive in bursts while the user reorders or shuffles, so writes
//! are coalesced: each class of write keeps only the latest pending job per queue,
//! and a single background task flushes one class at a time after a quiet period.
//! A crash inside the window loses at most the last few seconds of queue edits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use strum::{EnumIter, IntoEnumIterator};
use tokio::runtime::Handle;
use tokio::sync::Notify;

use crate::queue::{MultiQueue, QueueId};
use crate::store::{QueueEntity, QueueStore};

/// Classes of pending writes, highest priority first
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, strum::Display)]
pub enum WriteKind {
    /// Full rewrite of a queue's songs
    #[strum(serialize = "songs")]
    Songs,
    /// Metadata and position only
    #[strum(serialize = "position")]
    Position,
    /// Ordering of the whole board
    #[strum(serialize = "order")]
    Order,
}

#[derive(Default)]
struct Pending {
    songs: Vec<MultiQueue>,
    positions: Vec<QueueEntity>,
    order: Option<Vec<QueueEntity>>,
}

impl Pending {
    fn is_empty(&self) -> bool {
        self.songs.is_empty() && self.positions.is_empty() && self.order.is_none()
    }

    fn take(&mut self, kind: WriteKind) -> Option<Batch> {
        match kind {
            WriteKind::Songs if !self.songs.is_empty() => {
                Some(Batch::Songs(std::mem::take(&mut self.songs)))
            }
            WriteKind::Position if !self.positions.is_empty() => {
                Some(Batch::Positions(std::mem::take(&mut self.positions)))
            }
            WriteKind::Order => self.order.take().map(Batch::Order),
            _ => None,
        }
    }

    /// Highest priority non-empty class
    fn take_next(&mut self) -> Option<Batch> {
        WriteKind::iter().find_map(|kind| self.take(kind))
    }
}

enum Batch {
    Songs(Vec<MultiQueue>),
    Positions(Vec<QueueEntity>),
    Order(Vec<QueueEntity>),
}

impl Batch {
    fn kind(&self) -> WriteKind {
        match self {
            Batch::Songs(_) => WriteKind::Songs,
            Batch::Positions(_) => WriteKind::Position,
            Batch::Order(_) => WriteKind::Order,
        }
    }

    fn execute(self, store: &dyn QueueStore) {
        let kind = self.kind();
        let result = match self {
            Batch::Songs(queues) => queues.iter().try_for_each(|q| store.save_queue(q)),
            Batch::Positions(entities) => entities.iter().try_for_each(|e| store.update_queue(e)),
            Batch::Order(entities) => store.update_all_queues(&entities),
        };
        match result {
            Ok(()) => log::debug!("Flushed pending {} writes", kind),
            Err(e) => log::warn!("Failed to write queue {}: {}", kind, e),
        }
    }
}

struct WriterInner {
    store: Arc<dyn QueueStore>,
    pending: Mutex<Pending>,
    notify: Notify,
    debounce: Duration,
    closed: AtomicBool,
    runtime: Handle,
}

impl WriterInner {
    fn pending(&self) -> MutexGuard<'_, Pending> {
        // A poisoned lock only means a writer panicked mid-update; the data is still usable
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn run(self: Arc<Self>) {
        log::debug!("Starting queue write task");
        loop {
            self.notify.notified().await;
            if self.closed.load(Ordering::Acquire) {
                break;
            }

            loop {
                tokio::time::sleep(self.debounce).await;
                if self.closed.load(Ordering::Acquire) {
                    break;
                }
                let next = self.pending().take_next();
                match next {
                    Some(batch) => batch.execute(self.store.as_ref()),
                    None => break,
                }
            }

            if self.closed.load(Ordering::Acquire) {
                break;
            }
        }
        log::debug!("Exiting queue write task");
    }
}

/// Handle to the background write task. Cloning shares the same task.
#[derive(Clone)]
pub struct PersistWriter {
    inner: Arc<WriterInner>,
}

impl PersistWriter {
    /// Spawn the write task on `runtime`
    pub fn new(store: Arc<dyn QueueStore>, debounce: Duration, runtime: &Handle) -> Self {
        let inner = Arc::new(WriterInner {
            store,
            pending: Mutex::new(Pending::default()),
            notify: Notify::new(),
            debounce,
            closed: AtomicBool::new(false),
            runtime: runtime.clone(),
        });
        runtime.spawn(Arc::clone(&inner).run());
        Self { inner }
    }

    pub fn store(&self) -> &Arc<dyn QueueStore> {
        &self.inner.store
    }

    fn schedule(&self) {
        if !self.inner.closed.load(Ordering::Acquire) {
            self.inner.notify.notify_one();
        }
    }

    /// Queue a full rewrite of `queue`
    pub fn save_songs(&self, queue: &MultiQueue) {
        {
            let mut pending = self.inner.pending();
            pending.songs.retain(|q| q.id() != queue.id());
            // The full rewrite carries the position too
            pending.positions.retain(|e| e.id != queue.id());
            pending.songs.push(queue.clone());
        }
        self.schedule();
    }

    /// Queue a metadata/position update of `queue`
    pub fn save_position(&self, queue: &MultiQueue) {
        {
            let mut pending = self.inner.pending();
            pending.positions.retain(|e| e.id != queue.id());
            pending.positions.push(queue.to_entity());
        }
        self.schedule();
    }

    /// Queue an update of the board ordering
    pub fn save_order(&self, queues: &[MultiQueue]) {
        let entities = queues.iter().map(MultiQueue::to_entity).collect();
        self.inner.pending().order = Some(entities);
        self.schedule();
    }

    /// Delete a queue's rows right away, dropping its pending writes
    pub fn delete(&self, id: QueueId) {
        {
            let mut pending = self.inner.pending();
            pending.songs.retain(|q| q.id() != id);
            pending.positions.retain(|e| e.id != id);
        }
        let store = Arc::clone(&self.inner.store);
        self.inner.runtime.spawn(async move {
            if let Err(e) = store.delete_queue(id) {
                log::warn!("Failed to delete queue {}: {}", id, e);
            }
        });
    }

    pub fn has_pending(&self) -> bool {
        !self.inner.pending().is_empty()
    }

    /// Execute every pending write now, in priority order
    pub fn flush(&self) {
        loop {
            let next = self.inner.pending().take_next();
            match next {
                Some(batch) => batch.execute(self.inner.store.as_ref()),
                None => break,
            }
        }
    }

    /// Drop pending writes and stop the background task
    pub fn shutdown(&self) {
        *self.inner.pending() = Pending::default();
        self.inner.closed.store(true, Ordering::Release);
        self.inner.notify.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Result;
    use crate::metadata::MediaMetadata;

    #[derive(Default)]
    struct RecordingStore {
        calls: Mutex<Vec<String>>,
    }

    impl RecordingStore {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) -> Result<()> {
            self.calls.lock().unwrap().push(call);
            Ok(())
        }
    }

    impl QueueStore for RecordingStore {
        fn read_queues(&self) -> Result<Vec<MultiQueue>> {
            Ok(Vec::new())
        }

        fn save_queue(&self, queue: &MultiQueue) -> Result<()> {
            self.record(format!("save {} {}", queue.title, queue.len()))
        }

        fn update_queue(&self, entity: &QueueEntity) -> Result<()> {
            self.record(format!("update {} {}", entity.title, entity.queue_pos))
        }

        fn update_all_queues(&self, entities: &[QueueEntity]) -> Result<()> {
            self.record(format!("order {}", entities.len()))
        }

        fn delete_queue(&self, id: QueueId) -> Result<()> {
            self.record(format!("delete {}", id))
        }
    }

    fn queue(id: QueueId, title: &str, len: usize) -> MultiQueue {
        let songs = (0..len)
            .map(|i| MediaMetadata::new(format!("{title}-{i}"), "song"))
            .collect();
        MultiQueue::new(id, title, songs, 0, None)
    }

    fn writer(store: &Arc<RecordingStore>) -> PersistWriter {
        let store: Arc<dyn QueueStore> = store.clone();
        PersistWriter::new(store, Duration::from_secs(5), &Handle::current())
    }

    #[tokio::test(start_paused = true)]
    async fn bursts_collapse_into_latest_write() {
        let store = Arc::new(RecordingStore::default());
        let writer = writer(&store);

        let mut q = queue(1, "Radio", 1);
        for len in 2..6 {
            q.append(vec![MediaMetadata::new(format!("x{len}"), "x")]);
            writer.save_songs(&q);
        }

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(store.calls().is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(store.calls(), ["save Radio 5"]);
        assert!(!writer.has_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn classes_flush_one_per_window_by_priority() {
        let store = Arc::new(RecordingStore::default());
        let writer = writer(&store);

        let a = queue(1, "a", 2);
        let mut b = queue(2, "b", 3);
        writer.save_order(&[a.clone(), b.clone()]);
        b.set_queue_pos(2);
        writer.save_position(&b);
        writer.save_songs(&a);

        tokio::time::sleep(Duration::from_millis(5_100)).await;
        assert_eq!(store.calls(), ["save a 2"]);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(store.calls(), ["save a 2", "update b 2"]);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(store.calls(), ["save a 2", "update b 2", "order 2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn songs_rewrite_supersedes_older_position_update() {
        let store = Arc::new(RecordingStore::default());
        let writer = writer(&store);

        let q = queue(1, "a", 2);
        writer.save_position(&q);
        writer.save_songs(&q);
        writer.flush();

        assert_eq!(store.calls(), ["save a 2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_drops_pending_writes() {
        let store = Arc::new(RecordingStore::default());
        let writer = writer(&store);

        writer.save_songs(&queue(1, "a", 1));
        writer.shutdown();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert!(store.calls().is_empty());
        assert!(!writer.has_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn delete_runs_without_waiting() {
        let store = Arc::new(RecordingStore::default());
        let writer = writer(&store);

        writer.save_songs(&queue(7, "gone", 1));
        writer.delete(7);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(store.calls(), ["delete 7"]);
        assert!(!writer.has_pending());
    }
}
