//! Strict-priority egress queues.

use std::array;
use std::collections::VecDeque;

use crate::message::{Frame, Priority};

/// Eight bounded FIFO queues, one per priority level.
///
/// The scheduler always serves the head of the highest non-empty queue.
#[derive(Debug, Clone)]
pub struct PriorityQueues {
    queues: [VecDeque<Frame>; Priority::LEVELS],
    capacity: usize,
}

impl PriorityQueues {
    /// Creates queues holding at most `capacity` frames per priority level.
    pub fn new(capacity: usize) -> Self {
        Self {
            queues: array::from_fn(|_| VecDeque::new()),
            capacity,
        }
    }

    /// Appends the frame to the queue of its priority.
    ///
    /// If that queue is full, the frame is handed back to the caller as a drop.
    pub fn push(&mut self, frame: Frame) -> Result<(), Frame> {
        let queue = &mut self.queues[frame.priority().index()];
        if queue.len() >= self.capacity {
            return Err(frame);
        }
        queue.push_back(frame);
        Ok(())
    }

    /// Removes and returns the head of the highest non-empty queue.
    pub fn pop_highest(&mut self) -> Option<Frame> {
        self.queues.iter_mut().rev().find_map(|q| q.pop_front())
    }

    /// Returns the head of the highest non-empty queue.
    pub fn peek_highest(&self) -> Option<&Frame> {
        self.queues.iter().rev().find_map(|q| q.front())
    }

    /// Priority of the frame [`pop_highest`](Self::pop_highest) would return.
    pub fn highest_priority(&self) -> Option<Priority> {
        self.peek_highest().map(Frame::priority)
    }

    /// Number of frames waiting at `priority`.
    pub fn len_at(&self, priority: Priority) -> usize {
        self.queues[priority.index()].len()
    }

    /// Total number of waiting frames.
    pub fn len(&self) -> usize {
        self.queues.iter().map(VecDeque::len).sum()
    }

    /// Whether all queues are empty.
    pub fn is_empty(&self) -> bool {
        self.queues.iter().all(VecDeque::is_empty)
    }

    /// Frames per priority level.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::test_helpers::frame;

    #[test]
    fn highest_priority_first_fifo_within_level() {
        let mut q = PriorityQueues::new(10);
        q.push(frame(1, 2, 100)).unwrap();
        q.push(frame(2, 5, 100)).unwrap();
        q.push(frame(3, 2, 100)).unwrap();
        q.push(frame(4, 5, 100)).unwrap();
        q.push(frame(5, 0, 100)).unwrap();
        let order: Vec<u64> = std::iter::from_fn(|| q.pop_highest()).map(|f| f.message.id.0).collect();
        assert_eq!(order, vec![2, 4, 1, 3, 5]);
    }

    #[test]
    fn full_level_rejects_without_affecting_others() {
        let mut q = PriorityQueues::new(2);
        q.push(frame(1, 3, 100)).unwrap();
        q.push(frame(2, 3, 100)).unwrap();
        let dropped = q.push(frame(3, 3, 100)).unwrap_err();
        assert_eq!(dropped.message.id.0, 3);
        q.push(frame(4, 4, 100)).unwrap();
        assert_eq!(q.len(), 3);
        assert_eq!(q.len_at(Priority::new(3).unwrap()), 2);
        assert_eq!(q.highest_priority(), Priority::new(4));
    }

    #[test]
    fn zero_capacity_drops_everything() {
        let mut q = PriorityQueues::new(0);
        assert!(q.push(frame(1, 7, 10)).is_err());
        assert!(q.is_empty());
        assert!(q.pop_highest().is_none());
    }
}
