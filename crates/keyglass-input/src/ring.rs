//! Fixed-capacity circular history used for axis deltas.

/// Ring buffer that overwrites its oldest entry once full.
///
/// Capacity is fixed at construction. While not full, entries are appended;
/// afterwards the slot at `start` is overwritten and `start` advances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRing {
    elems: Vec<i32>,
    start: usize,
    capacity: usize,
}

impl HistoryRing {
    /// Create an empty ring. A capacity of 0 is raised to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            elems: Vec::with_capacity(capacity),
            start: 0,
            capacity,
        }
    }

    pub fn insert(&mut self, value: i32) {
        if self.elems.len() < self.capacity {
            self.elems.push(value);
        } else {
            self.elems[self.start] = value;
            self.start = (self.start + 1) % self.capacity;
        }
    }

    pub fn len(&self) -> usize {
        self.elems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The two storage regions in oldest-to-newest order: `[start, len)` then `[0, start)`.
    pub fn as_slices(&self) -> (&[i32], &[i32]) {
        let (head, tail) = self.elems.split_at(self.start);
        (tail, head)
    }

    /// Entries from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = i32> + '_ {
        let (older, newer) = self.as_slices();
        older.iter().chain(newer.iter()).copied()
    }

    pub fn linearize(&self) -> Vec<i32> {
        self.iter().collect()
    }

    /// Most recently inserted entry.
    pub fn newest(&self) -> Option<i32> {
        if self.elems.is_empty() {
            None
        } else if self.start == 0 {
            self.elems.last().copied()
        } else {
            Some(self.elems[self.start - 1])
        }
    }
}
