//! Ordered job queue with value dedup and predicate dequeue.

use std::cmp::Ordering;

/// `(stage, distance)`, lower runs first. Distance compares with `total_cmp`.
#[derive(Clone, Copy, Debug)]
pub struct Priority {
    pub stage: u32,
    pub distance: f32,
}

impl Priority {
    pub const fn new(stage: u32, distance: f32) -> Self {
        Self { stage, distance }
    }
}

impl PartialEq for Priority {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Priority {}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.stage
            .cmp(&other.stage)
            .then_with(|| self.distance.total_cmp(&other.distance))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Enqueued {
    Inserted,
    /// An equal value was queued with a worse priority and has been moved.
    Replaced,
    /// An equal value was already queued at the same or a better priority.
    Kept,
}

/// Linear-scan queue. Equal priorities keep insertion order.
#[derive(Clone, Debug)]
pub struct PriorityQueue<T> {
    items: Vec<(Priority, T)>,
}

impl<T> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: PartialEq> PriorityQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue_or_replace(&mut self, value: T, priority: Priority) -> Enqueued {
        let mut outcome = Enqueued::Inserted;
        if let Some(i) = self.items.iter().position(|(_, v)| *v == value) {
            if priority >= self.items[i].0 {
                return Enqueued::Kept;
            }
            self.items.remove(i);
            outcome = Enqueued::Replaced;
        }
        let at = self
            .items
            .iter()
            .position(|(p, _)| *p > priority)
            .unwrap_or(self.items.len());
        self.items.insert(at, (priority, value));
        outcome
    }

    /// Removes and returns the first value (in priority order) accepted by
    /// `pred`. Earlier values that fail `pred` stay where they are.
    pub fn dequeue_if(&mut self, mut pred: impl FnMut(&T) -> bool) -> Option<T> {
        let i = self.items.iter().position(|(_, v)| pred(v))?;
        Some(self.items.remove(i).1)
    }

    pub fn pop(&mut self) -> Option<T> {
        self.dequeue_if(|_| true)
    }

    pub fn peek_min_priority(&self) -> Option<Priority> {
        self.items.first().map(|(p, _)| *p)
    }

    pub fn contains(&self, value: &T) -> bool {
        self.items.iter().any(|(_, v)| v == value)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Priority, &T)> {
        self.items.iter().map(|(p, v)| (p, v))
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}
