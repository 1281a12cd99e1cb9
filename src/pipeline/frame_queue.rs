// src/pipeline/frame_queue.rs
//
// Bounded single-producer/single-consumer frame queue with drop-oldest
// overflow. The producer is the feed callback, which must never block,
// so overflow evicts the oldest frame instead of applying backpressure.

use crate::types::Frame;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::warn;

pub struct FrameQueue {
    name: &'static str,
    inner: Mutex<VecDeque<Frame>>,
    capacity: usize,
    dropped: AtomicU64,
}

impl FrameQueue {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            inner: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    /// Push a frame, evicting the oldest entry first if the queue is full.
    /// Never blocks beyond the short internal lock.
    pub fn push(&self, frame: Frame) {
        let mut q = self.inner.lock().expect("frame queue poisoned");
        if q.len() >= self.capacity {
            q.pop_front();
            let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(
                "Queue '{}' full ({} frames), dropping oldest ({} dropped so far)",
                self.name, self.capacity, total
            );
        }
        q.push_back(frame);
    }

    /// Pop the oldest frame, if any. Consumers sleep-and-retry on None.
    pub fn pop(&self) -> Option<Frame> {
        self.inner.lock().expect("frame queue poisoned").pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("frame queue poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_bound_keeps_newest() {
        let q = FrameQueue::new("test", 3);
        for i in 0..10 {
            q.push(Frame::new(i));
        }
        // min(N, C) items, always the most recently enqueued ones
        assert_eq!(q.len(), 3);
        assert_eq!(q.dropped(), 7);
        assert_eq!(q.pop().unwrap().frame_index, 7);
        assert_eq!(q.pop().unwrap().frame_index, 8);
        assert_eq!(q.pop().unwrap().frame_index, 9);
        assert!(q.pop().is_none());
    }

    #[test]
    fn test_queue_under_capacity() {
        let q = FrameQueue::new("test", 8);
        q.push(Frame::new(1));
        q.push(Frame::new(2));
        assert_eq!(q.len(), 2);
        assert_eq!(q.dropped(), 0);
    }

    #[test]
    fn test_fifo_order() {
        let q = FrameQueue::new("test", 16);
        for i in 0..5 {
            q.push(Frame::new(i));
        }
        for i in 0..5 {
            assert_eq!(q.pop().unwrap().frame_index, i);
        }
    }
}
