use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};

use queueboard_core::{
    board::AddQueueOptions,
    commands::{QueueCommand, QueueResponse},
    config::BoardConfig,
    engine::{QueueEngine, QueueEngineHandle},
    metadata::MediaMetadata,
    player::TimelinePlayer,
    store::{MemoryQueueStore, QueueStore, SqliteQueueStore},
};

const DEFAULT_CONFIG: &str = "queueboard.toml";
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

const HELP: &str = "\
commands:
  add <title> <id,id,..> [start]      add songs, extending the queue if it exists
  delta <title> <id,id,..> [start]    add only songs the queue does not have
  replace <title> <id,id,..> [start]  overwrite the queue
  append <id,id,..>                   append to the current queue
  play <queue> [resume]               load a queue into the player
  shuffle [keep]                      shuffle the current queue
  unshuffle                           restore canonical order
  remove <index>                      remove a song from the current queue
  move <from> <to>                    move a queue on the board
  movesong <from> <to>                move a song in the current queue
  delete <title>                      delete a queue
  rename <queue> <title>              rename a queue
  seek <index>                        report the player moved to a song
  list                                show the board
  quit";

struct Args {
    config_path: PathBuf,
    memory: bool,
}

impl Args {
    fn parse(args: impl Iterator<Item = String>) -> Self {
        let mut parsed = Args {
            config_path: PathBuf::from(DEFAULT_CONFIG),
            memory: false,
        };
        for arg in args {
            match arg.as_str() {
                "--memory" => parsed.memory = true,
                path => parsed.config_path = PathBuf::from(path),
            }
        }
        parsed
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse(std::env::args().skip(1));
    let config = BoardConfig::load(&args.config_path)
        .with_context(|| format!("Cannot load config {}", args.config_path.display()))?;

    let store: Option<Arc<dyn QueueStore>> = if !config.persistent_queues {
        None
    } else if args.memory {
        Some(Arc::new(MemoryQueueStore::new()))
    } else {
        let store = SqliteQueueStore::open(&config.database_path)
            .with_context(|| format!("Cannot open {}", config.database_path.display()))?;
        Some(Arc::new(store))
    };

    log::info!("Starting queueboard");

    // Create the queue engine and get communication handle
    let (engine, handle) = QueueEngine::new(&config, TimelinePlayer::new(), store)
        .context("Cannot start queue engine")?;
    let engine_thread = engine.spawn();

    let result = run_shell(&handle);

    // Pending writes are flushed by the engine on quit
    let _ = handle.cmd_tx.send(QueueCommand::Quit);
    while let Ok(response) = handle.resp_rx.recv_timeout(RESPONSE_TIMEOUT) {
        if matches!(response, QueueResponse::Shutdown) {
            break;
        }
    }
    if engine_thread.join().is_err() {
        log::error!("Queue engine thread panicked");
    }

    result
}

fn run_shell(handle: &QueueEngineHandle) -> anyhow::Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    // The engine reports the restored queue, or the empty board, on startup
    let response = handle
        .resp_rx
        .recv_timeout(RESPONSE_TIMEOUT)
        .context("Queue engine did not start")?;
    print_response(&mut stdout, &response)?;
    writeln!(stdout, "type \"help\" for commands")?;

    for line in stdin.lock().lines() {
        let line = line?;
        let line = line.trim();
        match line {
            "" => continue,
            "quit" | "exit" => break,
            "help" => {
                writeln!(stdout, "{}", HELP)?;
                continue;
            }
            _ => {}
        }

        let cmd = match parse_command(line) {
            Ok(cmd) => cmd,
            Err(e) => {
                writeln!(stdout, "error: {}", e)?;
                continue;
            }
        };

        handle.cmd_tx.send(cmd).context("Queue engine stopped")?;
        let response = handle
            .resp_rx
            .recv_timeout(RESPONSE_TIMEOUT)
            .context("Queue engine did not respond")?;
        print_response(&mut stdout, &response)?;
    }

    Ok(())
}

fn parse_songs(list: &str) -> Vec<MediaMetadata> {
    list.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| MediaMetadata::new(id, id))
        .collect()
}

fn parse_index(word: Option<&str>, name: &str) -> anyhow::Result<usize> {
    let Some(word) = word else {
        bail!("missing {}", name);
    };
    word.parse()
        .with_context(|| format!("{} must be a number, got \"{}\"", name, word))
}

fn parse_command(line: &str) -> anyhow::Result<QueueCommand> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        bail!("empty command");
    };

    let cmd = match verb {
        "add" | "delta" | "replace" => {
            let title = words.next().context("missing title")?.to_string();
            let items = parse_songs(words.next().context("missing song ids")?);
            let start_index = match words.next() {
                Some(word) => parse_index(Some(word), "start")?,
                None => 0,
            };
            let options = AddQueueOptions::new()
                .delta(verb == "delta")
                .replace(verb == "replace")
                .start_index(start_index);
            QueueCommand::AddQueue {
                title,
                items,
                options,
            }
        }
        "append" => QueueCommand::EnqueueEnd(parse_songs(words.next().context("missing song ids")?)),
        "play" => QueueCommand::SetCurrentQueue {
            queue: parse_index(words.next(), "queue")?,
            resume: words.next() == Some("resume"),
        },
        "shuffle" => QueueCommand::ShuffleCurrent {
            preserve_current: words.next() == Some("keep"),
        },
        "unshuffle" => QueueCommand::UnShuffleCurrent,
        "remove" => QueueCommand::RemoveCurrentSong(parse_index(words.next(), "index")?),
        "move" => QueueCommand::MoveQueue {
            from: parse_index(words.next(), "from")?,
            to: parse_index(words.next(), "to")?,
        },
        "movesong" => QueueCommand::MoveSong {
            from: parse_index(words.next(), "from")?,
            to: parse_index(words.next(), "to")?,
        },
        "delete" => {
            let title = words.collect::<Vec<_>>().join(" ");
            if title.is_empty() {
                bail!("missing title");
            }
            QueueCommand::DeleteQueue(title)
        }
        "rename" => {
            let queue = parse_index(words.next(), "queue")?;
            let title = words.collect::<Vec<_>>().join(" ");
            if title.is_empty() {
                bail!("missing title");
            }
            QueueCommand::RenameQueue { queue, title }
        }
        "seek" => QueueCommand::SetQueuePos(parse_index(words.next(), "index")?),
        "list" => QueueCommand::Snapshot,
        other => bail!("unknown command \"{}\"", other),
    };
    Ok(cmd)
}

fn print_response(out: &mut impl Write, response: &QueueResponse) -> io::Result<()> {
    match response {
        QueueResponse::Snapshot(snapshot) => {
            for (i, q) in snapshot.queues.iter().enumerate() {
                let marker = if snapshot.current == Some(i) { '*' } else { ' ' };
                writeln!(
                    out,
                    "{} {:>2} {} [{} songs{}] at {} {}",
                    marker,
                    i,
                    q.title,
                    q.len,
                    if q.shuffled { ", shuffled" } else { "" },
                    q.position,
                    q.current_song.as_deref().unwrap_or("-"),
                )?;
            }
            writeln!(
                out,
                "player: {} (playing {})",
                snapshot.timeline.join(" "),
                snapshot.timeline_index
            )
        }
        QueueResponse::Loaded { title, position } => {
            writeln!(out, "loaded \"{}\" at {}", title, position)
        }
        QueueResponse::Removed(removed) => writeln!(out, "removed: {}", removed),
        QueueResponse::Deleted { remaining } => {
            writeln!(out, "deleted, {} queues left", remaining)
        }
        QueueResponse::Error(e) => writeln!(out, "error: {}", e),
        QueueResponse::Shutdown => writeln!(out, "bye"),
    }
}
