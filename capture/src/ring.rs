// SPDX-License-Identifier: Apache-2.0
// Copyright Multicast Capture Authors

//! Bounded chunk rings.
//!
//! Two of these couple the network and disk threads: `free` carries re-armed
//! chunks toward the network thread, `ready` carries filled chunks toward the
//! disk thread. Either side may stop a ring; a stopped ring refuses new items
//! but still drains what it holds, so the final short chunk always reaches
//! the disk.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

/// The tagged result a ring operation reports once [`Ring::stop`] has taken
/// effect.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("ring stopped")]
pub struct RingStopped;

#[derive(Debug)]
struct State<T> {
    items: VecDeque<T>,
    stopped: bool,
}

/// A bounded single-producer/single-consumer queue with explicit stop.
///
/// Items are moved, never cloned. `push` blocks while full and fails once
/// stopped; `pop` blocks while empty and reports stopped only after the ring
/// has drained.
#[derive(Debug)]
pub struct Ring<T> {
    state: Mutex<State<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl<T> Ring<T> {
    pub fn new(capacity: usize) -> Ring<T> {
        Ring {
            state: Mutex::new(State {
                items: VecDeque::with_capacity(capacity),
                stopped: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    pub fn push(&self, item: T) -> Result<(), RingStopped> {
        let mut state = self.state.lock().unwrap();
        loop {
            if state.stopped {
                return Err(RingStopped);
            }
            if state.items.len() < self.capacity {
                break;
            }
            state = self.not_full.wait(state).unwrap();
        }
        state.items.push_back(item);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    pub fn pop(&self) -> Result<T, RingStopped> {
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(item) = state.items.pop_front() {
                drop(state);
                self.not_full.notify_one();
                return Ok(item);
            }
            if state.stopped {
                return Err(RingStopped);
            }
            state = self.not_empty.wait(state).unwrap();
        }
    }

    /// Mark the ring stopped and wake every waiter.
    pub fn stop(&self) {
        let mut state = self.state.lock().unwrap();
        state.stopped = true;
        drop(state);
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn moves_items_in_order() {
        let ring = Ring::new(4);
        ring.push(1).unwrap();
        ring.push(2).unwrap();
        assert_eq!(ring.pop(), Ok(1));
        assert_eq!(ring.pop(), Ok(2));
    }

    #[test]
    fn stopped_ring_drains_before_reporting_stop() {
        let ring = Ring::new(4);
        ring.push("last chunk").unwrap();
        ring.stop();
        assert_eq!(ring.pop(), Ok("last chunk"));
        assert_eq!(ring.pop(), Err(RingStopped));
    }

    #[test]
    fn push_fails_once_stopped() {
        let ring = Ring::new(4);
        ring.stop();
        assert_eq!(ring.push(1), Err(RingStopped));
    }

    #[test]
    fn stop_wakes_a_blocked_consumer() {
        let ring: Arc<Ring<u32>> = Arc::new(Ring::new(1));
        let consumer = {
            let ring = Arc::clone(&ring);
            thread::spawn(move || ring.pop())
        };
        thread::sleep(Duration::from_millis(50));
        ring.stop();
        assert_eq!(consumer.join().unwrap(), Err(RingStopped));
    }

    #[test]
    fn full_ring_blocks_the_producer_until_a_pop() {
        let ring: Arc<Ring<u32>> = Arc::new(Ring::new(1));
        ring.push(1).unwrap();
        let producer = {
            let ring = Arc::clone(&ring);
            thread::spawn(move || ring.push(2))
        };
        thread::sleep(Duration::from_millis(50));
        assert_eq!(ring.pop(), Ok(1));
        producer.join().unwrap().unwrap();
        assert_eq!(ring.pop(), Ok(2));
    }

    #[test]
    fn stop_wakes_a_blocked_producer() {
        let ring: Arc<Ring<u32>> = Arc::new(Ring::new(1));
        ring.push(1).unwrap();
        let producer = {
            let ring = Arc::clone(&ring);
            thread::spawn(move || ring.push(2))
        };
        thread::sleep(Duration::from_millis(50));
        ring.stop();
        assert_eq!(producer.join().unwrap(), Err(RingStopped));
    }
}
