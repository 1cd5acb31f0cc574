use rand::Rng;
use rand::seq::SliceRandom;

use crate::metadata::MediaMetadata;
use crate::store::QueueEntity;

pub type QueueId = i64;

/// Marks a queue whose contents diverged from its source through user additions
pub const EXTENSION_SUFFIX: &str = " +\u{200B}";

/// Title of the extension queue derived from `title`
pub fn extension_title(title: &str) -> String {
    format!("{}{}", title, EXTENSION_SUFFIX)
}

/// Where a tracked index ends up after moving the element at `from` to `to`
pub(crate) fn follow_move(tracked: usize, from: usize, to: usize) -> usize {
    if tracked < from.min(to) || tracked > from.max(to) {
        return tracked;
    }

    if tracked == from {
        to
    } else if tracked == to {
        if tracked < from { tracked + 1 } else { tracked - 1 }
    } else if to > tracked {
        tracked - 1
    } else {
        tracked + 1
    }
}

/// One named queue with a canonical order and a shuffle order over the same items.
///
/// `shuffle_order[k]` is the canonical index of the item at shuffle position `k`.
/// The order is kept a permutation of `0..len` through every mutation, whether or
/// not the queue is currently shuffled. `queue_pos` always points into the
/// canonical order.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiQueue {
    id: QueueId,
    /// Queue title, also its identity on the board
    pub title: String,
    items: Vec<MediaMetadata>,
    shuffle_order: Vec<usize>,
    shuffled: bool,
    queue_pos: usize,
    /// Saved position inside the current song, in milliseconds
    pub last_song_pos: Option<u64>,
    /// Order of the queue on the board
    pub index: usize,
    /// Continuation token of a paged remote source
    pub playlist_id: Option<String>,
}

impl MultiQueue {
    pub fn new(
        id: QueueId,
        title: impl Into<String>,
        items: Vec<MediaMetadata>,
        index: usize,
        playlist_id: Option<String>,
    ) -> Self {
        let shuffle_order = (0..items.len()).collect();
        Self {
            id,
            title: title.into(),
            items,
            shuffle_order,
            shuffled: false,
            queue_pos: 0,
            last_song_pos: None,
            index,
            playlist_id,
        }
    }

    /// Rebuild a queue from its stored record and `(song, shuffle index)` rows in
    /// canonical order. A broken shuffle order resets the queue to canonical playback.
    pub fn restore(entity: QueueEntity, songs: Vec<(MediaMetadata, usize)>) -> Self {
        let len = songs.len();
        let mut order = vec![usize::MAX; len];
        let mut valid = true;
        let mut items = Vec::with_capacity(len);

        for (canonical, (song, shuffle_index)) in songs.into_iter().enumerate() {
            if shuffle_index < len && order[shuffle_index] == usize::MAX {
                order[shuffle_index] = canonical;
            } else {
                valid = false;
            }
            items.push(song);
        }

        let mut queue = Self {
            id: entity.id,
            title: entity.title,
            items,
            shuffle_order: order,
            shuffled: entity.shuffled,
            queue_pos: 0,
            last_song_pos: entity.last_song_pos,
            index: entity.index,
            playlist_id: entity.playlist_id,
        };

        if !valid {
            log::warn!(
                "Queue \"{}\" has an inconsistent shuffle order, resetting it",
                queue.title
            );
            queue.reset_order();
            queue.shuffled = false;
        }

        match usize::try_from(entity.queue_pos) {
            Ok(pos) => queue.queue_pos = pos,
            Err(_) => queue.queue_pos = usize::MAX,
        }
        queue.validate_queue_pos();
        queue
    }

    pub fn id(&self) -> QueueId {
        self.id
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn shuffled(&self) -> bool {
        self.shuffled
    }

    /// Canonical index of the current item
    pub fn queue_pos(&self) -> usize {
        self.queue_pos
    }

    /// Items in canonical (insertion) order
    pub fn items(&self) -> &[MediaMetadata] {
        &self.items
    }

    pub fn is_extension(&self) -> bool {
        self.title.ends_with(EXTENSION_SUFFIX)
    }

    /// Items in the order playback traverses them
    pub fn active_items(&self) -> Vec<&MediaMetadata> {
        if self.shuffled {
            self.shuffle_order.iter().map(|&c| &self.items[c]).collect()
        } else {
            self.items.iter().collect()
        }
    }

    pub fn item_at_active(&self, pos: usize) -> Option<&MediaMetadata> {
        self.canonical_index(pos).and_then(|c| self.items.get(c))
    }

    /// Shuffle position of the item at canonical index `canonical`
    pub fn shuffle_index(&self, canonical: usize) -> Option<usize> {
        self.shuffle_order.iter().position(|&c| c == canonical)
    }

    /// Canonical index of the item at `active_pos` in the active ordering
    pub fn canonical_index(&self, active_pos: usize) -> Option<usize> {
        if self.shuffled {
            self.shuffle_order.get(active_pos).copied()
        } else {
            (active_pos < self.items.len()).then_some(active_pos)
        }
    }

    fn active_index(&self, canonical: usize) -> Option<usize> {
        if self.shuffled {
            self.shuffle_index(canonical)
        } else {
            (canonical < self.items.len()).then_some(canonical)
        }
    }

    /// Position of the current item in the active ordering
    pub fn active_pos(&self) -> usize {
        self.active_index(self.queue_pos).unwrap_or(0)
    }

    /// Point the queue at `pos` in the active ordering, clamped into the queue
    pub fn set_active_pos(&mut self, pos: usize) {
        if self.items.is_empty() {
            self.queue_pos = 0;
            return;
        }
        let pos = pos.min(self.items.len() - 1);
        if let Some(canonical) = self.canonical_index(pos) {
            self.queue_pos = canonical;
        }
    }

    /// Point the queue at canonical index `pos`, clamped into the queue
    pub fn set_queue_pos(&mut self, pos: usize) {
        self.queue_pos = pos.min(self.items.len().saturating_sub(1));
    }

    /// Out of range pointers reset the queue to canonical playback from the start
    pub fn validate_queue_pos(&mut self) {
        if self.queue_pos >= self.items.len() {
            self.reset_order();
            self.shuffled = false;
            self.queue_pos = 0;
        }
    }

    fn reset_order(&mut self) {
        self.shuffle_order = (0..self.items.len()).collect();
    }

    pub fn current_song(&self) -> Option<&MediaMetadata> {
        self.items.get(self.queue_pos)
    }

    /// Look a song up by id, checking the current song first
    pub fn find_song(&self, media_id: &str) -> Option<&MediaMetadata> {
        if let Some(current) = self.current_song() {
            if current.id == media_id {
                return Some(current);
            }
        }
        self.items.iter().find(|s| s.id == media_id)
    }

    /// Canonical index of the first item with `media_id`
    pub fn position_of(&self, media_id: &str) -> Option<usize> {
        self.items.iter().position(|s| s.id == media_id)
    }

    pub fn contains(&self, media_id: &str) -> bool {
        self.position_of(media_id).is_some()
    }

    /// Total duration of all songs in seconds
    pub fn duration(&self) -> u64 {
        self.items.iter().map(|s| s.duration as u64).sum()
    }

    /// Replace every item, resetting both orderings. The caller sets the position.
    pub fn replace_all(&mut self, items: Vec<MediaMetadata>) {
        self.items = items;
        self.reset_order();
        self.queue_pos = 0;
    }

    /// Append items to the end of both orderings
    pub fn append(&mut self, items: Vec<MediaMetadata>) {
        for item in items {
            self.shuffle_order.push(self.items.len());
            self.items.push(item);
        }
    }

    /// Insert items at `pos` of the active ordering. Shuffled queues keep new items
    /// at the canonical end and splice them into the shuffle order instead.
    pub fn insert_at_active(&mut self, pos: usize, new_items: Vec<MediaMetadata>) {
        let count = new_items.len();
        if count == 0 {
            return;
        }
        let list_pos = pos.min(self.items.len());
        let was_empty = self.items.is_empty();

        if self.shuffled {
            let start = self.items.len();
            self.items.extend(new_items);
            self.shuffle_order
                .splice(list_pos..list_pos, start..start + count);
        } else {
            for c in self.shuffle_order.iter_mut() {
                if *c >= list_pos {
                    *c += count;
                }
            }
            self.items.splice(list_pos..list_pos, new_items);
            self.shuffle_order
                .splice(list_pos..list_pos, list_pos..list_pos + count);

            if !was_empty && self.queue_pos >= list_pos {
                self.queue_pos += count;
            }
        }
    }

    /// Remove the item at `index` of the active ordering.
    ///
    /// Removing the current item moves the pointer on to the item that followed it,
    /// or to the new last item when the removed one was last.
    pub fn remove_at_active(&mut self, index: usize) -> Option<MediaMetadata> {
        let removed_canonical = self.canonical_index(index)?;
        let current = self.active_pos();

        let target = if index == current {
            self.canonical_index(current + 1)
                .or_else(|| current.checked_sub(1).and_then(|p| self.canonical_index(p)))
        } else {
            Some(self.queue_pos)
        };

        let removed = self.items.remove(removed_canonical);
        self.shuffle_order.retain(|&c| c != removed_canonical);
        for c in self.shuffle_order.iter_mut() {
            if *c > removed_canonical {
                *c -= 1;
            }
        }

        self.queue_pos = match target {
            Some(c) if c > removed_canonical => c - 1,
            Some(c) => c,
            None => 0,
        };
        self.set_queue_pos(self.queue_pos);

        Some(removed)
    }

    /// Move an item inside the active ordering, keeping the pointer on the same song.
    ///
    /// Returns the new position of the current item in the active ordering.
    pub fn move_active(&mut self, from: usize, to: usize) -> usize {
        if self.items.is_empty() {
            return 0;
        }
        let last = self.items.len() - 1;
        let (from, to) = (from.min(last), to.min(last));
        let new_pos = follow_move(self.active_pos(), from, to);

        if self.shuffled {
            let moved = self.shuffle_order.remove(from);
            self.shuffle_order.insert(to, moved);
        } else {
            let moved = self.items.remove(from);
            self.items.insert(to, moved);
            self.reset_order();
        }

        self.set_active_pos(new_pos);
        self.active_pos()
    }

    /// Draw a fresh shuffle order and switch to shuffled playback.
    ///
    /// With `preserve_current` the playing item is swapped to shuffle position 0,
    /// otherwise playback restarts at whatever landed there. Returns the new
    /// canonical position.
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R, preserve_current: bool) -> usize {
        self.shuffled = true;
        if self.items.is_empty() {
            return 0;
        }

        let current = self.queue_pos;
        self.reset_order();
        self.shuffle_order.shuffle(rng);

        if preserve_current {
            if let Some(k) = self.shuffle_index(current) {
                self.shuffle_order.swap(0, k);
            }
            self.queue_pos = current;
        } else {
            self.queue_pos = self.shuffle_order[0];
            self.last_song_pos = None;
        }
        self.queue_pos
    }

    /// Return to canonical playback. The current song does not change.
    pub fn unshuffle(&mut self) -> usize {
        self.shuffled = false;
        self.queue_pos
    }

    pub fn to_entity(&self) -> QueueEntity {
        QueueEntity {
            id: self.id,
            title: self.title.clone(),
            shuffled: self.shuffled,
            queue_pos: self.queue_pos as i64,
            last_song_pos: self.last_song_pos,
            index: self.index,
            playlist_id: self.playlist_id.clone(),
        }
    }

    /// `(song, shuffle index)` pairs in canonical order
    pub fn song_rows(&self) -> Vec<(&MediaMetadata, usize)> {
        let mut shuffle_indices = vec![0; self.items.len()];
        for (k, &c) in self.shuffle_order.iter().enumerate() {
            shuffle_indices[c] = k;
        }
        self.items.iter().zip(shuffle_indices).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn songs(ids: &[&str]) -> Vec<MediaMetadata> {
        ids.iter().map(|id| MediaMetadata::new(*id, *id)).collect()
    }

    fn ids(items: Vec<&MediaMetadata>) -> Vec<String> {
        items.into_iter().map(|s| s.id.clone()).collect()
    }

    fn assert_permutation(q: &MultiQueue) {
        let mut indices: Vec<usize> = q.song_rows().into_iter().map(|(_, s)| s).collect();
        indices.sort_unstable();
        assert_eq!(indices, (0..q.len()).collect::<Vec<_>>());
    }

    #[test]
    fn follow_move_tracks_the_same_element() {
        for len in 1..7usize {
            for from in 0..len {
                for to in 0..len {
                    for tracked in 0..len {
                        let mut v: Vec<usize> = (0..len).collect();
                        let x = v.remove(from);
                        v.insert(to, x);
                        let after = follow_move(tracked, from, to);
                        assert_eq!(v[after], tracked, "from {from} to {to} tracked {tracked}");
                    }
                }
            }
        }
    }

    #[test]
    fn shuffle_preserving_current_puts_it_first() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut q = MultiQueue::new(1, "q", songs(&["A", "B", "C", "D"]), 0, None);
        q.set_queue_pos(2);

        for _ in 0..20 {
            let pos = q.shuffle(&mut rng, true);
            assert_eq!(pos, 2);
            assert_eq!(q.shuffle_index(2), Some(0));
            assert_eq!(q.current_song().map(|s| s.id.as_str()), Some("C"));
            assert_eq!(q.active_pos(), 0);
            assert_permutation(&q);
        }
    }

    #[test]
    fn shuffle_without_preserving_restarts_at_first_shuffled() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut q = MultiQueue::new(1, "q", songs(&["A", "B", "C", "D", "E"]), 0, None);
        q.last_song_pos = Some(42_000);

        let pos = q.shuffle(&mut rng, false);
        assert_eq!(q.shuffle_index(pos), Some(0));
        assert_eq!(q.last_song_pos, None);
        assert!(q.shuffled());
    }

    #[test]
    fn insert_before_current_in_canonical_order_shifts_pointer() {
        let mut q = MultiQueue::new(1, "q", songs(&["A", "B", "C"]), 0, None);
        q.set_queue_pos(1);
        q.insert_at_active(0, songs(&["X", "Y"]));

        assert_eq!(ids(q.active_items()), ["X", "Y", "A", "B", "C"]);
        assert_eq!(q.current_song().map(|s| s.id.as_str()), Some("B"));
        assert_permutation(&q);
    }

    #[test]
    fn insert_after_current_keeps_pointer() {
        let mut q = MultiQueue::new(1, "q", songs(&["A", "B", "C"]), 0, None);
        q.set_queue_pos(1);
        q.insert_at_active(usize::MAX, songs(&["X"]));

        assert_eq!(ids(q.active_items()), ["A", "B", "C", "X"]);
        assert_eq!(q.queue_pos(), 1);
    }

    #[test]
    fn insert_into_shuffled_queue_splices_shuffle_order() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut q = MultiQueue::new(1, "q", songs(&["A", "B", "C", "D"]), 0, None);
        q.shuffle(&mut rng, true);
        let before = ids(q.active_items());
        let current = q.current_song().cloned();

        q.insert_at_active(1, songs(&["X", "Y"]));

        let after = ids(q.active_items());
        assert_eq!(after[0], before[0]);
        assert_eq!(&after[1..3], ["X", "Y"]);
        assert_eq!(&after[3..], &before[1..]);
        assert_eq!(&q.items()[4..], &songs(&["X", "Y"])[..]);
        assert_eq!(q.current_song().cloned(), current);
        assert_permutation(&q);
    }

    #[test]
    fn remove_before_current_keeps_song() {
        let mut q = MultiQueue::new(1, "q", songs(&["A", "B", "C", "D"]), 0, None);
        q.set_queue_pos(2);
        let removed = q.remove_at_active(0);

        assert_eq!(removed.map(|s| s.id), Some("A".to_string()));
        assert_eq!(q.current_song().map(|s| s.id.as_str()), Some("C"));
        assert_eq!(q.active_pos(), 1);
        assert_permutation(&q);
    }

    #[test]
    fn remove_current_moves_on_to_next() {
        let mut q = MultiQueue::new(1, "q", songs(&["A", "B", "C", "D"]), 0, None);
        q.set_queue_pos(1);
        q.remove_at_active(1);
        assert_eq!(q.current_song().map(|s| s.id.as_str()), Some("C"));

        q.set_queue_pos(2);
        q.remove_at_active(2);
        assert_eq!(q.current_song().map(|s| s.id.as_str()), Some("C"));
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn remove_in_shuffled_queue_uses_shuffle_order() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut q = MultiQueue::new(1, "q", songs(&["A", "B", "C", "D", "E"]), 0, None);
        q.shuffle(&mut rng, true);
        let order = ids(q.active_items());

        q.remove_at_active(3);

        let mut expected = order.clone();
        expected.remove(3);
        assert_eq!(ids(q.active_items()), expected);
        assert_eq!(q.current_song().map(|s| s.id.clone()), Some(order[0].clone()));
        assert_permutation(&q);
    }

    #[test]
    fn remove_last_song_leaves_empty_queue() {
        let mut q = MultiQueue::new(1, "q", songs(&["A"]), 0, None);
        assert!(q.remove_at_active(0).is_some());
        assert!(q.is_empty());
        assert_eq!(q.queue_pos(), 0);
        assert!(q.remove_at_active(0).is_none());
    }

    #[test]
    fn move_keeps_current_song() {
        let mut q = MultiQueue::new(1, "q", songs(&["A", "B", "C", "D", "E"]), 0, None);
        q.set_queue_pos(2);

        let pos = q.move_active(0, 4);
        assert_eq!(ids(q.active_items()), ["B", "C", "D", "E", "A"]);
        assert_eq!(pos, 1);
        assert_eq!(q.current_song().map(|s| s.id.as_str()), Some("C"));

        let pos = q.move_active(1, 3);
        assert_eq!(pos, 3);
        assert_eq!(q.current_song().map(|s| s.id.as_str()), Some("C"));
        assert_permutation(&q);
    }

    #[test]
    fn move_in_shuffled_queue_reorders_shuffle_only() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut q = MultiQueue::new(1, "q", songs(&["A", "B", "C", "D"]), 0, None);
        q.shuffle(&mut rng, true);
        let canonical = q.items().to_vec();
        let mut order = ids(q.active_items());

        q.move_active(0, 2);
        let moved = order.remove(0);
        order.insert(2, moved.clone());

        assert_eq!(ids(q.active_items()), order);
        assert_eq!(q.items(), &canonical[..]);
        assert_eq!(q.current_song().map(|s| s.id.clone()), Some(moved));
        assert_eq!(q.active_pos(), 2);
    }

    #[test]
    fn restore_repairs_duplicate_shuffle_indices() {
        let entity = QueueEntity {
            id: 3,
            title: "broken".into(),
            shuffled: true,
            queue_pos: 1,
            last_song_pos: Some(10),
            index: 0,
            playlist_id: None,
        };
        let rows = vec![
            (MediaMetadata::new("A", "A"), 0),
            (MediaMetadata::new("B", "B"), 0),
        ];
        let q = MultiQueue::restore(entity, rows);

        assert_eq!(ids(q.active_items()), ["A", "B"]);
        assert_permutation(&q);
        assert!(!q.shuffled());
        assert_eq!(q.queue_pos(), 1);
    }

    #[test]
    fn restore_resets_out_of_range_position() {
        let entity = QueueEntity {
            id: 3,
            title: "stale".into(),
            shuffled: true,
            queue_pos: 9,
            last_song_pos: None,
            index: 0,
            playlist_id: None,
        };
        let rows = vec![
            (MediaMetadata::new("A", "A"), 1),
            (MediaMetadata::new("B", "B"), 0),
        ];
        let q = MultiQueue::restore(entity, rows);

        assert!(!q.shuffled());
        assert_eq!(q.queue_pos(), 0);
        assert_eq!(q.shuffle_index(0), Some(0));
    }

    #[test]
    fn extension_title_is_recognised() {
        let q = MultiQueue::new(1, extension_title("Radio"), songs(&["A"]), 0, None);
        assert!(q.is_extension());
        assert_eq!(q.title, "Radio +\u{200B}");
    }
}
