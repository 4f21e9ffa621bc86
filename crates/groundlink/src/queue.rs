// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Delivery queue - FIFO of encoded messages with consumer wake-up.
//!
//! Producers call [`DeliveryQueue::enqueue`], which never blocks. The consumer
//! awaits [`DeliveryQueue::notified`] and then drains with
//! [`DeliveryQueue::dequeue`] until it returns `None`.

use crate::codec::Message;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Notify;

/// Concurrency-safe FIFO of outbound messages.
#[derive(Debug)]
pub struct DeliveryQueue {
    inner: Mutex<VecDeque<Message>>,
    /// 0 = unbounded.
    capacity: usize,
    notify: Notify,
    dropped: AtomicU64,
}

impl DeliveryQueue {
    /// Unbounded queue.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Queue holding at most `capacity` messages (0 = unbounded).
    ///
    /// When full, the oldest message is evicted to make room.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            capacity,
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
        }
    }

    /// Append to the tail and wake the consumer.
    ///
    /// Returns the message evicted to make room, if the queue was full.
    pub fn enqueue(&self, message: Message) -> Option<Message> {
        let evicted = {
            let mut queue = self.inner.lock();
            let evicted = if self.capacity > 0 && queue.len() >= self.capacity {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                queue.pop_front()
            } else {
                None
            };
            queue.push_back(message);
            evicted
        };
        self.notify.notify_one();
        evicted
    }

    /// Remove the head, or `None` if there is nothing to send yet.
    pub fn dequeue(&self) -> Option<Message> {
        self.inner.lock().pop_front()
    }

    /// Wait until a message has been enqueued since the last wake-up.
    ///
    /// A notification issued while nobody is waiting is kept, so an enqueue
    /// that races with the consumer's drain is never missed.
    pub async fn notified(&self) {
        self.notify.notified().await;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Messages evicted because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for DeliveryQueue {
    fn default() -> Self {
        Self::new()
    }
}
