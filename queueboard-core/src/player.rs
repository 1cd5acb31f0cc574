use crate::metadata::MediaMetadata;

/// The live player timeline the board drives.
///
/// Ranges are half-open and clamped to the timeline. `set_media_items` is treated
/// as a full reload that restarts playback; the other edits keep the current item
/// playing as long as it is not inside the edited range.
pub trait Player {
    fn set_media_items(
        &mut self,
        items: Vec<MediaMetadata>,
        start_index: usize,
        start_position_ms: Option<u64>,
    );

    fn replace_media_items(&mut self, from: usize, to: usize, items: Vec<MediaMetadata>);

    fn remove_media_items(&mut self, from: usize, to: usize);

    fn add_media_items(&mut self, items: Vec<MediaMetadata>);

    fn clear_media_items(&mut self) {
        self.set_media_items(Vec::new(), 0, None);
    }

    fn current_media_item_index(&self) -> usize;

    fn media_item_count(&self) -> usize;

    fn media_id_at(&self, index: usize) -> Option<&str>;

    /// Id of the item currently loaded, if any
    fn current_media_id(&self) -> Option<&str> {
        self.media_id_at(self.current_media_item_index())
    }

    fn shuffle_mode_enabled(&self) -> bool;

    fn set_shuffle_mode_enabled(&mut self, enabled: bool);
}

/// In-memory player timeline with no audio output
#[derive(Debug, Clone, Default)]
pub struct TimelinePlayer {
    items: Vec<MediaMetadata>,
    current: usize,
    position_ms: u64,
    shuffle_mode: bool,
    reloads: usize,
}

impl TimelinePlayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[MediaMetadata] {
        &self.items
    }

    pub fn item_ids(&self) -> Vec<&str> {
        self.items.iter().map(|s| s.id.as_str()).collect()
    }

    pub fn current_item(&self) -> Option<&MediaMetadata> {
        self.items.get(self.current)
    }

    /// Playback position inside the current item in milliseconds
    pub fn position_ms(&self) -> u64 {
        self.position_ms
    }

    /// Number of full timeline reloads so far
    pub fn reloads(&self) -> usize {
        self.reloads
    }

    /// Move playback to `index`, as a skip or an automatic transition would
    pub fn seek_to_item(&mut self, index: usize) {
        if index < self.items.len() {
            self.current = index;
            self.position_ms = 0;
        }
    }

    fn clamp(&self, from: usize, to: usize) -> (usize, usize) {
        let to = to.min(self.items.len());
        (from.min(to), to)
    }

    fn clamp_current(&mut self) {
        if self.current >= self.items.len() {
            self.current = self.items.len().saturating_sub(1);
        }
    }
}

impl Player for TimelinePlayer {
    fn set_media_items(
        &mut self,
        items: Vec<MediaMetadata>,
        start_index: usize,
        start_position_ms: Option<u64>,
    ) {
        self.items = items;
        self.current = start_index;
        self.clamp_current();
        self.position_ms = start_position_ms.unwrap_or(0);
        self.reloads += 1;
    }

    fn replace_media_items(&mut self, from: usize, to: usize, items: Vec<MediaMetadata>) {
        let (from, to) = self.clamp(from, to);
        let inserted = items.len();
        self.items.splice(from..to, items);

        if self.current >= to {
            self.current = self.current - (to - from) + inserted;
        } else if self.current >= from {
            self.current = from;
            self.position_ms = 0;
        }
        self.clamp_current();
    }

    fn remove_media_items(&mut self, from: usize, to: usize) {
        let (from, to) = self.clamp(from, to);
        self.items.drain(from..to);

        if self.current >= to {
            self.current -= to - from;
        } else if self.current >= from {
            self.current = from;
            self.position_ms = 0;
        }
        self.clamp_current();
    }

    fn add_media_items(&mut self, items: Vec<MediaMetadata>) {
        self.items.extend(items);
    }

    fn current_media_item_index(&self) -> usize {
        self.current
    }

    fn media_item_count(&self) -> usize {
        self.items.len()
    }

    fn media_id_at(&self, index: usize) -> Option<&str> {
        self.items.get(index).map(|s| s.id.as_str())
    }

    fn shuffle_mode_enabled(&self) -> bool {
        self.shuffle_mode
    }

    fn set_shuffle_mode_enabled(&mut self, enabled: bool) {
        self.shuffle_mode = enabled;
    }
}
