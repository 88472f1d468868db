//! Bounded conversation memory shared by a run.
//!
//! Holds the most recent messages in insertion order. When the capacity is
//! exceeded the single oldest message is evicted. Readers always get copies,
//! so a snapshot never changes under the caller.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use moonagent_core::{Message, Role};
use parking_lot::RwLock;

/// Capacity used when zero is requested.
pub const DEFAULT_CAPACITY: usize = 100;

#[derive(Debug)]
pub struct MemoryState {
    inner: RwLock<MemoryInner>,
    capacity: usize,
}

#[derive(Debug)]
struct MemoryInner {
    messages: VecDeque<Message>,
    created_at: DateTime<Utc>,
}

impl MemoryState {
    /// Create a memory holding at most `capacity` messages (0 → default).
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 { DEFAULT_CAPACITY } else { capacity };
        Self {
            inner: RwLock::new(MemoryInner {
                messages: VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY)),
                created_at: Utc::now(),
            }),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a message, evicting the oldest if the memory is full.
    pub fn add_message(&self, message: Message) {
        let mut inner = self.inner.write();
        inner.messages.push_back(message);
        if inner.messages.len() > self.capacity {
            inner.messages.pop_front();
        }
    }

    /// Append a `(role, content)` pair.
    pub fn add(&self, role: Role, content: impl Into<String>) {
        self.add_message(Message::new(role, content));
    }

    /// Copies of the most recent `n` messages, oldest first.
    pub fn recent(&self, n: usize) -> Vec<Message> {
        let inner = self.inner.read();
        let skip = inner.messages.len().saturating_sub(n);
        inner.messages.iter().skip(skip).cloned().collect()
    }

    /// Copies of every retained message, oldest first.
    pub fn snapshot(&self) -> Vec<Message> {
        self.inner.read().messages.iter().cloned().collect()
    }

    /// Replace the contents with `messages`, keeping only the newest
    /// `capacity` of them.
    pub fn restore(&self, messages: Vec<Message>) {
        let skip = messages.len().saturating_sub(self.capacity);
        let mut inner = self.inner.write();
        inner.messages = messages.into_iter().skip(skip).collect();
    }

    /// Drop every message and restart the age clock.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.messages.clear();
        inner.created_at = Utc::now();
    }

    pub fn len(&self) -> usize {
        self.inner.read().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().messages.is_empty()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.read().created_at
    }

    /// One-line description of the conversation so far.
    pub fn summary(&self) -> String {
        let inner = self.inner.read();
        if inner.messages.is_empty() {
            return "No conversation history".into();
        }
        let age = Utc::now() - inner.created_at;
        let secs = (age.num_milliseconds().max(0) + 500) / 1000;
        format!("Conversation with {} messages over {secs}s", inner.messages.len())
    }
}

impl Default for MemoryState {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
