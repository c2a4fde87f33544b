//! Fixed-capacity FIFO ring buffer
//!
//! Pushing into a full buffer evicts the oldest element. Elements are never
//! duplicated or reordered, so after any sequence of pushes the buffer holds
//! exactly the most recent `capacity` elements in insertion order.

use std::collections::VecDeque;

/// Bounded buffer with oldest-first eviction.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// Creates an empty buffer holding at most `capacity` elements.
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Appends `item`, returning the evicted element if the buffer was full.
    ///
    /// A zero-capacity buffer retains nothing; the pushed item itself is returned.
    pub fn push(&mut self, item: T) -> Option<T> {
        if self.capacity == 0 {
            return Some(item);
        }
        let evicted = if self.items.len() >= self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    /// Removes and returns every element, leaving the buffer empty.
    pub fn take_all(&mut self) -> Vec<T> {
        std::mem::take(&mut self.items).into()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterates oldest to newest.
    pub fn iter(&self) -> std::collections::vec_deque::Iter<'_, T> {
        self.items.iter()
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Copy of the current contents, oldest first.
    pub fn snapshot(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }

    /// The last `count` elements in insertion order.
    pub fn tail(&self, count: usize) -> Vec<T> {
        let skip = self.items.len().saturating_sub(count);
        self.items.iter().skip(skip).cloned().collect()
    }

    /// Elements matching `predicate`, preserving relative order.
    pub fn filtered<F>(&self, mut predicate: F) -> Vec<T>
    where
        F: FnMut(&T) -> bool,
    {
        self.items.iter().filter(|item| predicate(item)).cloned().collect()
    }
}
