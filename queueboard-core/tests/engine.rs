use std::sync::Arc;
use std::time::Duration;

use queueboard_core::board::AddQueueOptions;
use queueboard_core::commands::{QueueCommand, QueueResponse};
use queueboard_core::config::BoardConfig;
use queueboard_core::engine::{QueueEngine, QueueEngineHandle};
use queueboard_core::metadata::MediaMetadata;
use queueboard_core::player::TimelinePlayer;
use queueboard_core::store::{MemoryQueueStore, QueueStore};

const TIMEOUT: Duration = Duration::from_secs(5);

fn songs(ids: &[&str]) -> Vec<MediaMetadata> {
    ids.iter().map(|id| MediaMetadata::new(*id, *id)).collect()
}

fn config() -> BoardConfig {
    BoardConfig {
        max_queues: 3,
        // Long enough that only the flush on quit writes anything
        save_debounce_ms: 60_000,
        ..BoardConfig::default()
    }
}

fn start(config: &BoardConfig, store: Option<Arc<dyn QueueStore>>) -> (QueueEngineHandle, std::thread::JoinHandle<()>) {
    let (engine, handle) = QueueEngine::new(config, TimelinePlayer::new(), store).unwrap();
    (handle, engine.spawn())
}

/// Start an engine over an empty store and consume its startup snapshot
fn start_empty(config: &BoardConfig, store: Option<Arc<dyn QueueStore>>) -> (QueueEngineHandle, std::thread::JoinHandle<()>) {
    let (handle, thread) = start(config, store);
    match handle.resp_rx.recv_timeout(TIMEOUT).unwrap() {
        QueueResponse::Snapshot(snapshot) => {
            assert!(snapshot.queues.is_empty());
            assert_eq!(snapshot.current, None);
        }
        other => panic!("unexpected {:?}", other),
    }
    (handle, thread)
}

fn add(title: &str, ids: &[&str]) -> QueueCommand {
    QueueCommand::AddQueue {
        title: title.to_string(),
        items: songs(ids),
        options: AddQueueOptions::new(),
    }
}

fn quit(handle: &QueueEngineHandle, thread: std::thread::JoinHandle<()>) {
    handle.cmd_tx.send(QueueCommand::Quit).unwrap();
    assert!(matches!(handle.resp_rx.recv_timeout(TIMEOUT).unwrap(), QueueResponse::Shutdown));
    thread.join().unwrap();
}

#[test]
fn commands_drive_the_board_and_player() {
    let (handle, thread) = start_empty(&config(), None);

    match handle.request(add("Radio", &["a", "b", "c"]), TIMEOUT).unwrap() {
        QueueResponse::Loaded { title, position } => {
            assert_eq!(title, "Radio");
            assert_eq!(position, 0);
        }
        other => panic!("unexpected {:?}", other),
    }

    handle.request(add("Mix", &["x", "b"]), TIMEOUT).unwrap();
    let QueueResponse::Snapshot(snapshot) = handle.request(QueueCommand::Snapshot, TIMEOUT).unwrap() else {
        panic!("expected a snapshot");
    };
    assert_eq!(snapshot.queues.len(), 2);
    assert_eq!(snapshot.current, Some(1));
    assert_eq!(snapshot.timeline, ["x", "b"]);

    let response = handle.request(QueueCommand::RemoveCurrentSong(0), TIMEOUT).unwrap();
    assert!(matches!(response, QueueResponse::Removed(true)));

    let response = handle
        .request(QueueCommand::SetCurrentQueue { queue: 7, resume: false }, TIMEOUT)
        .unwrap();
    assert!(matches!(response, QueueResponse::Error(_)));

    let response = handle.request(QueueCommand::DeleteQueue("Radio".into()), TIMEOUT).unwrap();
    assert!(matches!(response, QueueResponse::Deleted { remaining: 1 }));

    quit(&handle, thread);
}

#[test]
fn quit_flushes_pending_writes_and_restart_resumes() {
    let store = Arc::new(MemoryQueueStore::new());
    let config = config();

    let (handle, thread) = start_empty(&config, Some(store.clone() as Arc<dyn QueueStore>));
    handle.request(add("Radio", &["a", "b", "c"]), TIMEOUT).unwrap();
    handle.request(QueueCommand::SetQueuePos(2), TIMEOUT).unwrap();
    assert_eq!(store.queue_count(), 0);
    quit(&handle, thread);

    let stored = store.read_queues().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(store.song_ids(stored[0].id()), ["a", "b", "c"]);
    assert_eq!(stored[0].current_song().unwrap().id, "c");

    // A restarted engine loads the last queue into the player right away
    let (handle, thread) = start(&config, Some(store.clone() as Arc<dyn QueueStore>));
    match handle.resp_rx.recv_timeout(TIMEOUT).unwrap() {
        QueueResponse::Loaded { title, position } => {
            assert_eq!(title, "Radio");
            assert_eq!(position, 2);
        }
        other => panic!("unexpected {:?}", other),
    }
    quit(&handle, thread);
}

#[test]
fn disabled_persistence_never_writes() {
    let store = Arc::new(MemoryQueueStore::new());
    let config = BoardConfig {
        persistent_queues: false,
        ..config()
    };

    let (handle, thread) = start_empty(&config, Some(store.clone() as Arc<dyn QueueStore>));
    handle.request(add("Radio", &["a"]), TIMEOUT).unwrap();
    quit(&handle, thread);

    assert_eq!(store.queue_count(), 0);
}

#[test]
fn every_start_sends_exactly_one_response() {
    let (handle, thread) = start_empty(&config(), None);
    // Nothing else arrives until a command is sent
    assert!(handle.resp_rx.recv_timeout(Duration::from_millis(200)).is_err());
    quit(&handle, thread);
}
