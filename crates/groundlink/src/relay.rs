// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fan-out relay and statistics.
//!
//! Each streaming session owns a private [`DeliveryQueue`] registered here for
//! as long as its [`Subscription`] lives. Publishing pushes one clone of the
//! message into every registered queue, so every attached session sees every
//! message produced after it attached.

use crate::codec::Message;
use crate::generator::MessageSink;
use crate::queue::DeliveryQueue;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Registry of attached session queues.
#[derive(Debug)]
pub struct Relay {
    queues: DashMap<u64, Arc<DeliveryQueue>>,
    next_key: AtomicU64,
    /// Per-session queue bound (0 = unbounded).
    queue_capacity: usize,
    stats: Arc<RelayStats>,
}

impl Relay {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            queues: DashMap::new(),
            next_key: AtomicU64::new(0),
            queue_capacity,
            stats: Arc::new(RelayStats::new()),
        }
    }

    /// Register a new session queue. Dropping the returned guard deregisters it.
    ///
    /// `label` only identifies the session in logs.
    pub fn attach(self: &Arc<Self>, label: impl Into<String>) -> Subscription {
        let label = label.into();
        let key = self.next_key.fetch_add(1, Ordering::Relaxed);
        let queue = Arc::new(DeliveryQueue::with_capacity(self.queue_capacity));
        self.queues.insert(key, queue.clone());
        self.stats.sessions_attached.fetch_add(1, Ordering::Relaxed);
        debug!("[{}] Attached to relay ({} active)", label, self.queues.len());

        Subscription {
            key,
            label,
            queue,
            relay: self.clone(),
        }
    }

    /// Deliver one clone of `message` to every attached session.
    pub fn publish(&self, message: Message) {
        self.stats.messages_published.fetch_add(1, Ordering::Relaxed);
        let mut fanned = 0u64;
        let mut evicted = 0u64;
        for entry in self.queues.iter() {
            if entry.value().enqueue(message.clone()).is_some() {
                evicted += 1;
            }
            fanned += 1;
        }
        self.stats.frames_fanned_out.fetch_add(fanned, Ordering::Relaxed);
        if evicted > 0 {
            self.stats.messages_evicted.fetch_add(evicted, Ordering::Relaxed);
        }
    }

    pub fn session_count(&self) -> usize {
        self.queues.len()
    }

    pub fn stats(&self) -> &Arc<RelayStats> {
        &self.stats
    }

    fn detach(&self, key: u64, label: &str) {
        if let Some((_, queue)) = self.queues.remove(&key) {
            self.stats.sessions_detached.fetch_add(1, Ordering::Relaxed);
            debug!(
                "[{}] Detached from relay ({} undelivered, {} evicted, {} active)",
                label,
                queue.len(),
                queue.dropped(),
                self.queues.len()
            );
        }
    }
}

impl MessageSink for Relay {
    fn publish(&self, message: Message) {
        Relay::publish(self, message);
    }
}

/// Guard for one session's registration with the [`Relay`].
#[derive(Debug)]
pub struct Subscription {
    key: u64,
    label: String,
    queue: Arc<DeliveryQueue>,
    relay: Arc<Relay>,
}

impl Subscription {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn queue(&self) -> &DeliveryQueue {
        &self.queue
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.relay.detach(self.key, &self.label);
    }
}

/// Relay counters.
#[derive(Debug)]
pub struct RelayStats {
    /// Messages handed to the relay.
    pub messages_published: AtomicU64,

    /// Message copies enqueued to session queues.
    pub frames_fanned_out: AtomicU64,

    /// Messages evicted from full session queues.
    pub messages_evicted: AtomicU64,

    pub sessions_attached: AtomicU64,
    pub sessions_detached: AtomicU64,

    /// Relay creation time.
    pub created: Instant,
}

impl RelayStats {
    pub fn new() -> Self {
        Self {
            messages_published: AtomicU64::new(0),
            frames_fanned_out: AtomicU64::new(0),
            messages_evicted: AtomicU64::new(0),
            sessions_attached: AtomicU64::new(0),
            sessions_detached: AtomicU64::new(0),
            created: Instant::now(),
        }
    }

    /// Get snapshot of current stats.
    pub fn snapshot(&self) -> RelayStatsSnapshot {
        RelayStatsSnapshot {
            messages_published: self.messages_published.load(Ordering::Relaxed),
            frames_fanned_out: self.frames_fanned_out.load(Ordering::Relaxed),
            messages_evicted: self.messages_evicted.load(Ordering::Relaxed),
            sessions_attached: self.sessions_attached.load(Ordering::Relaxed),
            sessions_detached: self.sessions_detached.load(Ordering::Relaxed),
            uptime_secs: self.created.elapsed().as_secs(),
        }
    }
}

impl Default for RelayStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of relay statistics.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RelayStatsSnapshot {
    pub messages_published: u64,
    pub frames_fanned_out: u64,
    pub messages_evicted: u64,
    pub sessions_attached: u64,
    pub sessions_detached: u64,
    pub uptime_secs: u64,
}

impl RelayStatsSnapshot {
    /// Calculate messages per second.
    pub fn messages_per_second(&self) -> f64 {
        if self.uptime_secs > 0 {
            self.messages_published as f64 / self.uptime_secs as f64
        } else {
            0.0
        }
    }
}
