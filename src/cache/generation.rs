//! Request-generation tokens used to drop stale responses.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};

/// Token handed out when a request starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket<K> {
  key: K,
  generation: u64,
}

impl<K> Ticket<K> {
  pub fn generation(&self) -> u64 {
    self.generation
  }
}

#[derive(Debug)]
struct GenState<K> {
  next: u64,
  newest: u64,
  latest: HashMap<K, u64>,
}

/// Monotonically increasing generation counter per cache key.
///
/// Every request takes a ticket before it suspends. When its response comes
/// back, the store asks whether the ticket is still current; a request that
/// was overtaken by a newer one (for the same key or for any other key the
/// store switched to) is discarded instead of overwriting fresher state.
#[derive(Debug)]
pub struct Generations<K> {
  state: Mutex<GenState<K>>,
}

impl<K> Default for Generations<K> {
  fn default() -> Self {
    Self {
      state: Mutex::new(GenState {
        next: 0,
        newest: 0,
        latest: HashMap::new(),
      }),
    }
  }
}

impl<K: Eq + Hash + Clone> Generations<K> {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, GenState<K>> {
    // Counters stay consistent even if a holder panicked.
    self.state.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Start a request for `key`.
  pub fn begin(&self, key: K) -> Ticket<K> {
    let mut state = self.lock();
    state.next += 1;
    let generation = state.next;
    state.newest = generation;
    state.latest.insert(key.clone(), generation);
    Ticket { key, generation }
  }

  /// Whether the ticket belongs to the newest request the store issued.
  pub fn is_current(&self, ticket: &Ticket<K>) -> bool {
    let state = self.lock();
    state.newest == ticket.generation && state.latest.get(&ticket.key) == Some(&ticket.generation)
  }

  /// Make every outstanding ticket stale.
  pub fn invalidate_all(&self) {
    let mut state = self.lock();
    state.next += 1;
    state.newest = state.next;
    state.latest.clear();
  }
}
