//! Tests for the ordering containers

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use prometheus_task_engine::infra::queue::Prioritized;
use prometheus_task_engine::infra::{OrderingContainer, PriorityQueue, QueueError, TaskQueue};

#[derive(Debug, PartialEq, Eq)]
struct Job {
    id: u32,
    priority: i32,
}

impl Prioritized for Job {
    fn priority(&self) -> i32 {
        self.priority
    }
}

fn job(id: u32, priority: i32) -> Job {
    Job { id, priority }
}

#[test]
fn test_priority_queue_orders_by_priority() {
    let queue = PriorityQueue::<Job>::new(0);
    for (id, priority) in [(1, 0), (2, 10), (3, -5), (4, 10), (5, 3)] {
        queue.put(job(id, priority)).unwrap();
    }
    let order: Vec<u32> = (0..5).filter_map(|_| queue.get()).map(|j| j.id).collect();
    assert_eq!(order, vec![2, 4, 5, 1, 3]);
}

#[test]
fn test_fifo_queue_keeps_submission_order() {
    let queue = TaskQueue::<Job>::new(0);
    for (id, priority) in [(1, 0), (2, 10), (3, -5)] {
        queue.put(job(id, priority)).unwrap();
    }
    let order: Vec<u32> = (0..3).filter_map(|_| queue.get()).map(|j| j.id).collect();
    assert_eq!(order, vec![1, 2, 3]);
}

#[test]
fn test_bounded_queue_reports_capacity() {
    let queue = TaskQueue::<u32>::new(2);
    assert_eq!(queue.capacity(), Some(2));
    queue.try_put(1).unwrap();
    queue.try_put(2).unwrap();
    assert!(queue.is_full());
    assert_eq!(queue.try_put(3), Err(QueueError::Full(2)));
    assert_eq!(TaskQueue::<u32>::new(0).capacity(), None);
}

#[test]
fn test_closed_queue_rejects_put() {
    let queue = PriorityQueue::<Job>::new(4);
    queue.close();
    assert!(queue.is_closed());
    assert_eq!(queue.put(job(1, 0)), Err(QueueError::Closed));
    assert_eq!(queue.try_put(job(2, 0)), Err(QueueError::Closed));
    assert!(queue.get().is_none());
}

#[test]
fn test_producers_and_consumers_across_threads() {
    let queue = Arc::new(TaskQueue::<u32>::new(4));
    let producers: Vec<_> = (0..4_u32)
        .map(|p| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for i in 0..25 {
                    queue.put(p * 100 + i).unwrap();
                }
            })
        })
        .collect();

    let consumer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            let mut seen = Vec::new();
            while let Some(item) = queue.get_timeout(Duration::from_secs(2)) {
                seen.push(item);
                queue.task_done();
                if seen.len() == 100 {
                    break;
                }
            }
            seen
        })
    };

    for producer in producers {
        producer.join().unwrap();
    }
    let mut seen = consumer.join().unwrap();
    seen.sort_unstable();
    seen.dedup();
    assert_eq!(seen.len(), 100);
    assert!(queue.join_timeout(Duration::from_secs(1)));
}
