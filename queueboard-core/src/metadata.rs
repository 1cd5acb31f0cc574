use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artist {
    pub id: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Album {
    pub id: String,
    pub title: String,
}

/// A playable track as the queues see it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaMetadata {
    /// Track identity, unique across the library and the remote catalog
    pub id: String,
    pub title: String,
    pub artists: Vec<Artist>,
    /// Duration in seconds
    pub duration: u32,
    pub thumbnail_url: Option<String>,
    pub album: Option<Album>,
    pub explicit: bool,
}

impl MediaMetadata {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            artists: Vec::new(),
            duration: 0,
            thumbnail_url: None,
            album: None,
            explicit: false,
        }
    }

    pub fn with_artist(mut self, name: impl Into<String>) -> Self {
        self.artists.push(Artist {
            id: None,
            name: name.into(),
        });
        self
    }

    pub fn with_duration(mut self, seconds: u32) -> Self {
        self.duration = seconds;
        self
    }

    /// Artist names joined for display
    pub fn artist_names(&self) -> String {
        self.artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Display for MediaMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mins = self.duration / 60;
        let secs = self.duration % 60;

        write!(f, "{}", self.title)?;
        if !self.artists.is_empty() {
            write!(f, " - {}", self.artist_names())?;
        }
        write!(f, " ({:02}:{:02})", mins, secs)
    }
}
