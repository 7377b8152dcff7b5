//! In-memory ordering disciplines: FIFO and priority with insertion tie-break.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};

use super::{Discipline, Prioritized};

/// First in, first out.
#[derive(Debug)]
pub struct FifoOrder<T> {
    items: VecDeque<T>,
}

impl<T> Default for FifoOrder<T> {
    fn default() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }
}

impl<T: Send> Discipline<T> for FifoOrder<T> {
    fn push(&mut self, item: T) {
        self.items.push_back(item);
    }

    fn pop(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn drain_all(&mut self) -> Vec<T> {
        self.items.drain(..).collect()
    }
}

/// Wrapper to make items orderable by priority (highest first) and FIFO within priority.
struct PriorityEntry<T> {
    priority: i32,
    seq: u64,
    item: T,
}

impl<T> PartialEq for PriorityEntry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl<T> Eq for PriorityEntry<T> {}

impl<T> PartialOrd for PriorityEntry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for PriorityEntry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority first
        match self.priority.cmp(&other.priority) {
            // FIFO within same priority: lower sequence wins (reversed for max-heap)
            Ordering::Equal => other.seq.cmp(&self.seq),
            other => other,
        }
    }
}

/// Priority descending, then insertion sequence ascending.
///
/// The sequence is assigned on push, so equal-priority items come out in
/// exactly the order they went in. This provides O(log n) push and pop.
pub struct PriorityOrder<T> {
    heap: BinaryHeap<PriorityEntry<T>>,
    next_seq: u64,
}

impl<T> Default for PriorityOrder<T> {
    fn default() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }
}

impl<T: Prioritized + Send> Discipline<T> for PriorityOrder<T> {
    fn push(&mut self, item: T) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(PriorityEntry {
            priority: item.priority(),
            seq,
            item,
        });
    }

    fn pop(&mut self) -> Option<T> {
        self.heap.pop().map(|entry| entry.item)
    }

    fn len(&self) -> usize {
        self.heap.len()
    }
}
