use std::collections::VecDeque;

/// The last few plates recorded during a camera session, newest first.
///
/// Consecutive frames usually show the same car, so a plate found here is
/// not recorded again.
#[derive(Debug)]
pub struct RecentPlates {
    capacity: usize,
    plates: VecDeque<String>,
}

impl RecentPlates {
    pub fn new(capacity: usize) -> RecentPlates {
        RecentPlates {
            capacity,
            plates: VecDeque::with_capacity(capacity),
        }
    }

    pub fn contains(&self, plate: &str) -> bool {
        self.plates.iter().any(|p| p == plate)
    }

    /// Returns false (and changes nothing) if the plate was already seen.
    pub fn remember(&mut self, plate: &str) -> bool {
        if self.capacity == 0 || self.contains(plate) {
            return false;
        }
        if self.plates.len() == self.capacity {
            self.plates.pop_back();
        }
        self.plates.push_front(plate.to_string());
        true
    }

    pub fn clear(&mut self) {
        self.plates.clear();
    }

    pub fn len(&self) -> usize {
        self.plates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plates.is_empty()
    }
}
