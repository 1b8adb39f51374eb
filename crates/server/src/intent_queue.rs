//! The single intent queue.
//!
//! Every accepted intent from every connection lands here in arrival
//! order and is drained by one dispatcher, so no two intents ever touch
//! the world concurrently.
//!
//! - FIFO across all origins
//! - Rate limiting: at most `per_tick_limit` intents per origin per
//!   lifecycle tick window
//! - A closed connection's queued intents are purged

use std::collections::{HashMap, VecDeque};

use lumberyard_sim::{Command, SessionId};

/// One queued intent, bound to the connection it arrived on.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedIntent {
    pub origin: SessionId,
    pub command: Command,
}

/// Result of attempting to enqueue an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueResult {
    Queued,
    RateLimited,
}

/// FIFO intent queue with a per-origin rate window.
#[derive(Debug)]
pub struct IntentQueue {
    queue: VecDeque<QueuedIntent>,
    /// Intents received per origin in the current window.
    window: HashMap<SessionId, u32>,
    per_tick_limit: u32,
}

impl IntentQueue {
    pub fn new(per_tick_limit: u32) -> Self {
        Self {
            queue: VecDeque::new(),
            window: HashMap::new(),
            per_tick_limit,
        }
    }

    pub fn per_tick_limit(&self) -> u32 {
        self.per_tick_limit
    }

    pub fn try_push(&mut self, origin: SessionId, command: Command) -> EnqueueResult {
        let count = self.window.entry(origin).or_insert(0);
        if *count >= self.per_tick_limit {
            return EnqueueResult::RateLimited;
        }
        *count += 1;
        self.queue.push_back(QueuedIntent { origin, command });
        EnqueueResult::Queued
    }

    pub fn pop(&mut self) -> Option<QueuedIntent> {
        self.queue.pop_front()
    }

    /// Drop everything queued by `origin`. Returns how many were dropped.
    pub fn purge(&mut self, origin: SessionId) -> usize {
        let before = self.queue.len();
        self.queue.retain(|intent| intent.origin != origin);
        self.window.remove(&origin);
        before - self.queue.len()
    }

    /// Start a new rate window.
    pub fn reset_window(&mut self) {
        self.window.clear();
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
