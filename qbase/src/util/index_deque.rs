use std::{
    collections::VecDeque,
    ops::{Index, IndexMut},
};

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("the index exceeds the limit {0}")]
pub struct ExceedLimit(u64);

/// A deque whose elements are addressed by a monotonic `u64` index.
///
/// Used for the records of sent packets, where the index is the packet number:
/// pushing assigns the next packet number, and acknowledged or lost records
/// at the front slide out by advancing the offset.
#[derive(Debug)]
pub struct IndexDeque<T, const LIMIT: u64> {
    deque: VecDeque<T>,
    offset: u64,
}

impl<T, const LIMIT: u64> Default for IndexDeque<T, LIMIT> {
    fn default() -> Self {
        Self {
            deque: VecDeque::default(),
            offset: 0,
        }
    }
}

impl<T, const LIMIT: u64> IndexDeque<T, LIMIT> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            deque: VecDeque::with_capacity(capacity),
            offset: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.deque.is_empty()
    }

    pub fn len(&self) -> usize {
        self.deque.len()
    }

    /// The index of the front element.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// The index the next pushed element will get.
    pub fn largest(&self) -> u64 {
        self.offset + self.deque.len() as u64
    }

    pub fn contain(&self, idx: u64) -> bool {
        idx >= self.offset && idx < self.largest()
    }

    pub fn get(&self, idx: u64) -> Option<&T> {
        if self.contain(idx) {
            Some(&self.deque[(idx - self.offset) as usize])
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, idx: u64) -> Option<&mut T> {
        if self.contain(idx) {
            Some(&mut self.deque[(idx - self.offset) as usize])
        } else {
            None
        }
    }

    /// Append an element and return its index.
    pub fn push_back(&mut self, value: T) -> Result<u64, ExceedLimit> {
        let next_idx = self.largest();
        if next_idx > LIMIT {
            Err(ExceedLimit(LIMIT))
        } else {
            self.deque.push_back(value);
            Ok(next_idx)
        }
    }

    /// Pop the front element along with its index.
    pub fn pop_front(&mut self) -> Option<(u64, T)> {
        self.deque.pop_front().map(|v| {
            let offset = self.offset;
            self.offset += 1;
            (offset, v)
        })
    }

    pub fn front(&self) -> Option<&T> {
        self.deque.front()
    }

    pub fn iter_with_idx(&self) -> impl DoubleEndedIterator<Item = (u64, &T)> {
        self.deque
            .iter()
            .enumerate()
            .map(|(idx, item)| (self.offset + idx as u64, item))
    }

    pub fn iter_mut_with_idx(&mut self) -> impl DoubleEndedIterator<Item = (u64, &mut T)> {
        let offset = self.offset;
        self.deque
            .iter_mut()
            .enumerate()
            .map(move |(idx, item)| (offset + idx as u64, item))
    }

    /// Remove every element below `end`, clamped to the deque bounds.
    pub fn drain_to(&mut self, end: u64) -> impl DoubleEndedIterator<Item = T> + '_ {
        let end = end.clamp(self.offset, self.largest());
        let n = (end - self.offset) as usize;
        self.offset = end;
        self.deque.drain(..n)
    }

    /// Skip the index space up to `idx` without storing elements, only
    /// allowed while the deque is empty.
    pub fn reset_offset(&mut self, idx: u64) {
        debug_assert!(self.deque.is_empty() && idx >= self.offset);
        self.offset = idx;
    }
}

impl<T, const LIMIT: u64> Index<u64> for IndexDeque<T, LIMIT> {
    type Output = T;

    fn index(&self, index: u64) -> &Self::Output {
        &self.deque[(index - self.offset) as usize]
    }
}

impl<T, const LIMIT: u64> IndexMut<u64> for IndexDeque<T, LIMIT> {
    fn index_mut(&mut self, index: u64) -> &mut Self::Output {
        &mut self.deque[(index - self.offset) as usize]
    }
}
