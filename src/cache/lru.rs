use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// LRU cache with a fixed capacity and time-to-live.
///
/// Every operation, including eviction, runs under the same mutex. Updating
/// an existing key replaces the value in place and restarts its TTL.
pub struct LruCache<V> {
    capacity: usize,
    ttl: Duration,
    inner: Mutex<Inner<V>>,
}

struct Node<V> {
    key: String,
    value: V,
    stored_at: Instant,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Doubly-linked recency list stored in a slab; `head` is most recently used.
struct Inner<V> {
    index: HashMap<String, usize>,
    slots: Vec<Option<Node<V>>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl<V: Clone> LruCache<V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            inner: Mutex::new(Inner::with_capacity(capacity)),
        }
    }

    pub fn set(&self, key: impl Into<String>, value: V) {
        if self.capacity == 0 {
            return;
        }

        let key = key.into();
        let mut inner = self.lock();

        if let Some(&idx) = inner.index.get(&key) {
            if let Some(node) = inner.slots[idx].as_mut() {
                node.value = value;
                node.stored_at = Instant::now();
            }
            inner.move_to_front(idx);
            return;
        }

        if inner.index.len() >= self.capacity {
            if let Some(evicted) = inner.pop_back() {
                tracing::debug!(key = %evicted.key, "Evicted least recently used cache entry");
            }
        }

        inner.push_front(key, value);
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let mut inner = self.lock();

        let idx = *inner.index.get(key)?;
        let expired = match inner.slots[idx].as_ref() {
            Some(node) => node.stored_at.elapsed() > self.ttl,
            None => return None,
        };

        if expired {
            inner.remove(idx);
            tracing::debug!(key = %key, "Cache entry expired");
            return None;
        }

        inner.move_to_front(idx);
        inner.slots[idx].as_ref().map(|node| node.value.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Inner<V>> {
        // The list is consistent between statements, so a poisoned guard is still usable
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<V> Inner<V> {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            index: HashMap::with_capacity(capacity),
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            head: None,
            tail: None,
        }
    }

    fn push_front(&mut self, key: String, value: V) {
        let node = Node {
            key: key.clone(),
            value,
            stored_at: Instant::now(),
            prev: None,
            next: None,
        };

        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(node);
                idx
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };

        self.index.insert(key, idx);
        self.link_front(idx);
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }
        self.unlink(idx);
        self.link_front(idx);
    }

    fn pop_back(&mut self) -> Option<Node<V>> {
        let idx = self.tail?;
        self.remove(idx)
    }

    fn remove(&mut self, idx: usize) -> Option<Node<V>> {
        self.unlink(idx);
        let node = self.slots[idx].take()?;
        self.index.remove(&node.key);
        self.free.push(idx);
        Some(node)
    }

    fn link_front(&mut self, idx: usize) {
        let old_head = self.head;

        if let Some(node) = self.slots[idx].as_mut() {
            node.prev = None;
            node.next = old_head;
        }
        if let Some(head) = old_head {
            if let Some(node) = self.slots[head].as_mut() {
                node.prev = Some(idx);
            }
        }

        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = match self.slots[idx].as_ref() {
            Some(node) => (node.prev, node.next),
            None => return,
        };

        match prev {
            Some(p) => {
                if let Some(node) = self.slots[p].as_mut() {
                    node.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(n) => {
                if let Some(node) = self.slots[n].as_mut() {
                    node.prev = prev;
                }
            }
            None => self.tail = prev,
        }

        if let Some(node) = self.slots[idx].as_mut() {
            node.prev = None;
            node.next = None;
        }
    }
}
