//! Bounded dedup store for message ids.
//!
//! Suppresses duplicate handler invocations when a broker redelivers an id
//! while the first delivery is still in flight, or shortly after it settled.
//! Entries age out by TTL and the store evicts oldest-first at capacity, so
//! memory stays bounded regardless of traffic.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

pub const DEFAULT_CAPACITY: usize = 10_000;
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceState {
    InFlight,
    Complete,
    Failed,
}

#[derive(Debug)]
struct Entry {
    state: NonceState,
    inserted_at: Instant,
}

#[derive(Debug, Default)]
struct GateInner {
    entries: HashMap<String, Entry>,
    insertion_order: VecDeque<String>,
}

#[derive(Debug)]
pub struct NonceGate {
    inner: Mutex<GateInner>,
    capacity: usize,
    ttl: Duration,
}

impl Default for NonceGate {
    fn default() -> Self {
        NonceGate::new(DEFAULT_CAPACITY, DEFAULT_TTL)
    }
}

impl NonceGate {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        NonceGate {
            inner: Mutex::new(GateInner::default()),
            capacity: capacity.max(1),
            ttl,
        }
    }

    /// Admits an unseen id, transitioning it to in-flight. Returns false for
    /// an id that is already in flight or settled (a duplicate delivery).
    pub fn admit(&self, id: &str) -> bool {
        let mut inner = self.inner.lock();
        Self::evict_expired(&mut inner, self.ttl);

        if inner.entries.contains_key(id) {
            return false;
        }

        while inner.entries.len() >= self.capacity {
            match inner.insertion_order.pop_front() {
                Some(oldest) => {
                    inner.entries.remove(&oldest);
                }
                None => break,
            }
        }

        inner.entries.insert(
            id.to_string(),
            Entry {
                state: NonceState::InFlight,
                inserted_at: Instant::now(),
            },
        );
        inner.insertion_order.push_back(id.to_string());
        true
    }

    pub fn complete(&self, id: &str) {
        self.settle(id, NonceState::Complete);
    }

    pub fn failed(&self, id: &str) {
        self.settle(id, NonceState::Failed);
    }

    pub fn state(&self, id: &str) -> Option<NonceState> {
        let inner = self.inner.lock();
        inner.entries.get(id).map(|entry| entry.state)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn settle(&self, id: &str, state: NonceState) {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.entries.get_mut(id) {
            if entry.state == NonceState::InFlight {
                entry.state = state;
            }
        }
    }

    fn evict_expired(inner: &mut GateInner, ttl: Duration) {
        let now = Instant::now();
        while let Some(front) = inner.insertion_order.front() {
            let expired = inner
                .entries
                .get(front)
                .map(|entry| now.duration_since(entry.inserted_at) >= ttl)
                .unwrap_or(true);
            if !expired {
                break;
            }
            let id = inner.insertion_order.pop_front().unwrap();
            inner.entries.remove(&id);
        }
    }
}
