use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, unbounded};
use tokio::runtime::{Builder, Runtime};

use crate::board::QueueBoard;
use crate::commands::{BoardSnapshot, QueueCommand, QueueResponse, QueueSummary};
use crate::config::BoardConfig;
use crate::error::QueueError;
use crate::player::Player;
use crate::store::QueueStore;
use crate::writer::PersistWriter;
use crate::Result;

/// Owns the board and serves commands from a dedicated thread
pub struct QueueEngine<P: Player + Send + 'static> {
    board: QueueBoard<P>,
    // Hosts the background write task for as long as the engine lives
    runtime: Runtime,
    cmd_rx: Receiver<QueueCommand>,
    resp_tx: Sender<QueueResponse>,
}

/// Front end side of the engine channels
pub struct QueueEngineHandle {
    pub cmd_tx: Sender<QueueCommand>,
    pub resp_rx: Receiver<QueueResponse>,
}

impl QueueEngineHandle {
    /// Send a command and wait for its response
    pub fn request(&self, cmd: QueueCommand, timeout: Duration) -> Result<QueueResponse> {
        self.cmd_tx.send(cmd).map_err(|_| QueueError::Channel)?;
        self.resp_rx
            .recv_timeout(timeout)
            .map_err(|_| QueueError::Channel)
    }
}

impl<P: Player + Send + 'static> QueueEngine<P> {
    /// Create the engine and its handle.
    ///
    /// Without a store, or with persistence turned off, the board starts empty and
    /// never writes anything.
    pub fn new(
        config: &BoardConfig,
        player: P,
        store: Option<Arc<dyn QueueStore>>,
    ) -> Result<(Self, QueueEngineHandle)> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("queue-writer")
            .enable_time()
            .build()?;

        let (queues, writer) = match store.filter(|_| config.persistent_queues) {
            Some(store) => {
                let queues = store.read_queues().unwrap_or_else(|e| {
                    log::warn!("Failed to read stored queues, starting empty: {}", e);
                    Vec::new()
                });
                let writer = PersistWriter::new(store, config.save_debounce(), runtime.handle());
                (queues, Some(writer))
            }
            None => (Vec::new(), None),
        };

        let board = QueueBoard::new(player, queues, config.max_queues, writer);
        let (cmd_tx, cmd_rx) = unbounded();
        let (resp_tx, resp_rx) = unbounded();

        let engine = Self {
            board,
            runtime,
            cmd_rx,
            resp_tx,
        };
        Ok((engine, QueueEngineHandle { cmd_tx, resp_rx }))
    }

    /// Run the engine on its own thread
    pub fn spawn(self) -> JoinHandle<()> {
        thread::spawn(move || self.run())
    }

    fn run(mut self) {
        log::info!("Queue engine started");

        // The front end waits for exactly one startup response
        let response = match self.board.load_current(true) {
            Some(position) => self.loaded(position),
            None => self.snapshot(),
        };
        self.respond(response);

        while let Ok(cmd) = self.cmd_rx.recv() {
            if matches!(cmd, QueueCommand::Quit) {
                break;
            }
            log::debug!("Queue command: {:?}", cmd);
            let response = self.handle_command(cmd);
            self.respond(response);
        }

        if let Some(writer) = self.board.writer() {
            writer.flush();
        }
        self.board.shutdown();
        self.respond(QueueResponse::Shutdown);

        log::info!("Queue engine stopped");
        self.runtime.shutdown_background();
    }

    fn respond(&self, response: QueueResponse) {
        if self.resp_tx.send(response).is_err() {
            log::warn!("Queue response dropped, front end is gone");
        }
    }

    fn handle_command(&mut self, cmd: QueueCommand) -> QueueResponse {
        match cmd {
            QueueCommand::AddQueue {
                title,
                items,
                options,
            } => {
                let Some(index) = self
                    .board
                    .add_queue(&title, items, options)
                    .map(|q| q.index)
                else {
                    return QueueResponse::Error(format!("Nothing to add to \"{}\"", title));
                };
                self.load(index)
            }
            QueueCommand::EnqueueEnd(items) => {
                self.board.enqueue_end(items);
                self.snapshot()
            }
            QueueCommand::AddSongs { queue, pos, items } => {
                self.board.add_songs_to_queue(queue, pos, items, true);
                self.snapshot()
            }
            QueueCommand::RemoveSong { queue, index } => {
                QueueResponse::Removed(self.board.remove_song(queue, index))
            }
            QueueCommand::RemoveCurrentSong(index) => {
                let removed = self.board.remove_current_queue_song(index);
                if removed {
                    self.board.load_current(false);
                }
                QueueResponse::Removed(removed)
            }
            QueueCommand::DeleteQueue(title) => QueueResponse::Deleted {
                remaining: self.board.delete_queue(&title),
            },
            QueueCommand::Shuffle {
                queue,
                preserve_current,
            } => {
                self.board.shuffle(queue, preserve_current, false);
                self.reload_current()
            }
            QueueCommand::ShuffleCurrent { preserve_current } => {
                self.board.shuffle_current(preserve_current, false);
                self.reload_current()
            }
            QueueCommand::UnShuffle(queue) => {
                self.board.un_shuffle(queue);
                self.reload_current()
            }
            QueueCommand::UnShuffleCurrent => {
                self.board.un_shuffle_current();
                self.reload_current()
            }
            QueueCommand::MoveQueue { from, to } => {
                self.board.move_queue(from, to);
                self.snapshot()
            }
            QueueCommand::MoveSong { from, to } => {
                if self.board.move_current_song(from, to).is_some() {
                    self.board.load_current(false);
                }
                self.snapshot()
            }
            QueueCommand::SetCurrentQueue { queue, resume } => {
                match self.board.set_curr_queue(queue, resume) {
                    Some(position) => self.loaded(position),
                    None => QueueResponse::Error(format!("No playable queue at {}", queue)),
                }
            }
            QueueCommand::SetQueuePos(index) => {
                self.board.set_curr_queue_pos_index(index);
                self.snapshot()
            }
            QueueCommand::SetLastSongPos(position_ms) => {
                self.board.set_last_song_pos(position_ms);
                self.snapshot()
            }
            QueueCommand::RenameQueue { queue, title } => {
                if self.board.rename_queue(queue, &title) {
                    self.snapshot()
                } else {
                    QueueResponse::Error(format!("No queue at {}", queue))
                }
            }
            QueueCommand::Snapshot => self.snapshot(),
            // Handled by the run loop
            QueueCommand::Quit => QueueResponse::Shutdown,
        }
    }

    fn load(&mut self, index: usize) -> QueueResponse {
        match self.board.set_curr_queue(index, false) {
            Some(position) => self.loaded(position),
            None => QueueResponse::Error(format!("No playable queue at {}", index)),
        }
    }

    /// Reload the current queue, keeping the playing song when it did not change
    fn reload_current(&mut self) -> QueueResponse {
        match self.board.load_current(false) {
            Some(position) => self.loaded(position),
            None => self.snapshot(),
        }
    }

    fn loaded(&mut self, position: usize) -> QueueResponse {
        let title = self
            .board
            .current_queue()
            .map(|q| q.title.clone())
            .unwrap_or_default();
        log::info!("Loaded queue \"{}\" at position {}", title, position);
        QueueResponse::Loaded { title, position }
    }

    fn snapshot(&mut self) -> QueueResponse {
        let current = self.board.current_index();
        let player = self.board.player();
        let timeline = (0..player.media_item_count())
            .filter_map(|i| player.media_id_at(i).map(String::from))
            .collect();

        QueueResponse::Snapshot(BoardSnapshot {
            queues: self.board.queues().iter().map(QueueSummary::from).collect(),
            current,
            timeline,
            timeline_index: player.current_media_item_index(),
            shuffle_mode: player.shuffle_mode_enabled(),
        })
    }
}
