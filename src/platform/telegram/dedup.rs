//! Replay guard for `getUpdates`

use std::collections::{HashSet, VecDeque};

/// Ids remembered exactly before falling back to the floor
const WINDOW: usize = 1024;

/// Tracks which update ids were already dispatched
///
/// Update ids only grow, so the guard keeps a window of recent ids and a
/// floor: the highest id that has left the window. Anything at or below the
/// floor is a replay.
#[derive(Debug)]
pub struct UpdateDedup {
    window: VecDeque<i64>,
    members: HashSet<i64>,
    capacity: usize,
    floor: Option<i64>,
}

impl Default for UpdateDedup {
    fn default() -> Self {
        Self::with_window(WINDOW)
    }
}

impl UpdateDedup {
    #[must_use]
    pub fn with_window(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            members: HashSet::with_capacity(capacity),
            capacity,
            floor: None,
        }
    }

    /// Record `update_id`; true if it was seen before
    pub fn is_duplicate(&mut self, update_id: i64) -> bool {
        if self.floor.is_some_and(|floor| update_id <= floor) {
            return true;
        }
        if !self.members.insert(update_id) {
            return true;
        }

        self.window.push_back(update_id);
        if self.window.len() > self.capacity {
            if let Some(evicted) = self.window.pop_front() {
                self.members.remove(&evicted);
                self.floor = Some(self.floor.map_or(evicted, |floor| floor.max(evicted)));
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeats_are_duplicates() {
        let mut seen = UpdateDedup::default();
        assert!(!seen.is_duplicate(10));
        assert!(seen.is_duplicate(10));
        assert!(!seen.is_duplicate(11));
    }

    #[test]
    fn ids_behind_the_window_stay_duplicates() {
        let mut seen = UpdateDedup::with_window(2);
        assert!(!seen.is_duplicate(1));
        assert!(!seen.is_duplicate(2));
        assert!(!seen.is_duplicate(3));

        assert!(seen.is_duplicate(1));
        assert!(seen.is_duplicate(3));
        assert!(!seen.is_duplicate(4));
    }

    #[test]
    fn out_of_order_ids_inside_the_window_are_accepted() {
        let mut seen = UpdateDedup::with_window(4);
        assert!(!seen.is_duplicate(7));
        assert!(!seen.is_duplicate(5));
        assert!(seen.is_duplicate(7));
    }
}
