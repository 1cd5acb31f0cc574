pub mod board;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod metadata;
pub mod player;
pub mod queue;
pub mod store;
pub mod writer;

pub use error::{QueueError, Result};

