use crate::board::AddQueueOptions;
use crate::metadata::MediaMetadata;
use crate::queue::{MultiQueue, QueueId};

/// Commands sent from the front end to the queue engine
#[derive(Debug, Clone)]
pub enum QueueCommand {
    /// Add a queue, or add to an existing one, then load it
    AddQueue {
        title: String,
        items: Vec<MediaMetadata>,
        options: AddQueueOptions,
    },
    /// Append songs to the end of the current queue
    EnqueueEnd(Vec<MediaMetadata>),
    /// Insert songs into a queue at a position of its active ordering
    AddSongs {
        queue: usize,
        pos: usize,
        items: Vec<MediaMetadata>,
    },
    /// Remove a song from a queue
    RemoveSong { queue: usize, index: usize },
    /// Remove a song from the current queue
    RemoveCurrentSong(usize),
    /// Delete the queue with this title
    DeleteQueue(String),
    /// Shuffle a queue, optionally keeping the playing song first
    Shuffle { queue: usize, preserve_current: bool },
    ShuffleCurrent { preserve_current: bool },
    UnShuffle(usize),
    UnShuffleCurrent,
    /// Reorder the board
    MoveQueue { from: usize, to: usize },
    /// Reorder songs inside the current queue
    MoveSong { from: usize, to: usize },
    /// Load the queue at this board index
    SetCurrentQueue { queue: usize, resume: bool },
    /// Player moved to another song of the current queue
    SetQueuePos(usize),
    /// Player position inside the current song, in milliseconds
    SetLastSongPos(Option<u64>),
    RenameQueue { queue: usize, title: String },
    /// Request a snapshot of the board
    Snapshot,
    /// Flush pending writes and shut down the engine
    Quit,
}

/// Responses sent from the queue engine to the front end
#[derive(Debug, Clone)]
pub enum QueueResponse {
    /// Board state after a command
    Snapshot(BoardSnapshot),
    /// A queue was loaded into the player at this position
    Loaded { title: String, position: usize },
    /// Result of a song removal
    Removed(bool),
    /// A queue was deleted, with the number of queues left
    Deleted { remaining: usize },
    /// An error occurred
    Error(String),
    /// Engine is shutting down
    Shutdown,
}

/// Read-only view of the board
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoardSnapshot {
    pub queues: Vec<QueueSummary>,
    pub current: Option<usize>,
    /// Ids of the player timeline in play order
    pub timeline: Vec<String>,
    pub timeline_index: usize,
    pub shuffle_mode: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueueSummary {
    pub id: QueueId,
    pub title: String,
    pub len: usize,
    pub shuffled: bool,
    /// Position of the current song in the active ordering
    pub position: usize,
    pub current_song: Option<String>,
    /// Total duration in seconds
    pub duration: u64,
}

impl From<&MultiQueue> for QueueSummary {
    fn from(q: &MultiQueue) -> Self {
        Self {
            id: q.id(),
            title: q.title.clone(),
            len: q.len(),
            shuffled: q.shuffled(),
            position: q.active_pos(),
            current_song: q.current_song().map(|s| s.title.clone()),
            duration: q.duration(),
        }
    }
}
