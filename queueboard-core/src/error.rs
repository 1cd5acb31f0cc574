use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("cannot encode song metadata: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("queue engine is not running")]
    Channel,
    #[error("store lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, QueueError>;
