//! Single-slot cache tagged by the key it is valid for.

use chrono::{DateTime, Utc};
use std::sync::Mutex;

use crate::error::Result;

/// A cached value together with the tag it was stored under.
#[derive(Debug, Clone)]
pub struct SlotEntry<K, V> {
  pub tag: K,
  pub value: V,
  pub cached_at: DateTime<Utc>,
}

/// One cache slot holding a value for exactly one tag (user id, project id).
///
/// A lookup only hits while the requested tag equals the stored tag; any
/// mismatch is a miss and the caller refetches. Storing under a new tag
/// evicts whatever was there before.
#[derive(Debug)]
pub struct CacheSlot<K, V> {
  entry: Mutex<Option<SlotEntry<K, V>>>,
}

impl<K, V> Default for CacheSlot<K, V> {
  fn default() -> Self {
    Self {
      entry: Mutex::new(None),
    }
  }
}

impl<K, V> CacheSlot<K, V>
where
  K: Clone + PartialEq,
  V: Clone,
{
  pub fn new() -> Self {
    Self::default()
  }

  /// Whether the slot currently holds data for `tag`.
  pub fn valid_for(&self, tag: &K) -> Result<bool> {
    let entry = self.entry.lock()?;
    Ok(entry.as_ref().is_some_and(|e| &e.tag == tag))
  }

  /// Get the cached entry if it was stored under `tag`.
  pub fn get_valid(&self, tag: &K) -> Result<Option<SlotEntry<K, V>>> {
    let entry = self.entry.lock()?;
    Ok(entry.as_ref().filter(|e| &e.tag == tag).cloned())
  }

  /// Get whatever the slot holds, regardless of tag.
  pub fn peek(&self) -> Result<Option<SlotEntry<K, V>>> {
    Ok(self.entry.lock()?.clone())
  }

  /// The tag the slot is currently valid for.
  pub fn tag(&self) -> Result<Option<K>> {
    Ok(self.entry.lock()?.as_ref().map(|e| e.tag.clone()))
  }

  /// Store `value` under `tag`, replacing any previous entry.
  pub fn put(&self, tag: K, value: V) -> Result<()> {
    let mut entry = self.entry.lock()?;
    *entry = Some(SlotEntry {
      tag,
      value,
      cached_at: Utc::now(),
    });
    Ok(())
  }

  /// Modify the cached value in place, only if the slot holds `tag`.
  ///
  /// Returns true if the slot was updated.
  pub fn update_if<F>(&self, tag: &K, f: F) -> Result<bool>
  where
    F: FnOnce(&mut V),
  {
    let mut entry = self.entry.lock()?;
    match entry.as_mut() {
      Some(e) if &e.tag == tag => {
        f(&mut e.value);
        Ok(true)
      }
      _ => Ok(false),
    }
  }

  /// Drop the slot entirely.
  pub fn clear(&self) -> Result<()> {
    *self.entry.lock()? = None;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_hit_only_for_matching_tag() {
    let slot: CacheSlot<String, Vec<u32>> = CacheSlot::new();
    slot.put("u1".to_string(), vec![1, 2]).unwrap();

    assert!(slot.valid_for(&"u1".to_string()).unwrap());
    assert!(!slot.valid_for(&"u2".to_string()).unwrap());
    assert_eq!(
      slot.get_valid(&"u1".to_string()).unwrap().map(|e| e.value),
      Some(vec![1, 2])
    );
    assert!(slot.get_valid(&"u2".to_string()).unwrap().is_none());
  }

  #[test]
  fn test_put_under_new_tag_evicts() {
    let slot: CacheSlot<String, u32> = CacheSlot::new();
    slot.put("p1".to_string(), 1).unwrap();
    slot.put("p2".to_string(), 2).unwrap();

    assert!(slot.get_valid(&"p1".to_string()).unwrap().is_none());
    assert_eq!(slot.tag().unwrap(), Some("p2".to_string()));
  }

  #[test]
  fn test_update_if_ignores_other_tags() {
    let slot: CacheSlot<String, Vec<u32>> = CacheSlot::new();
    slot.put("p1".to_string(), vec![1, 2, 3]).unwrap();

    let updated = slot
      .update_if(&"p2".to_string(), |v| v.retain(|x| *x != 2))
      .unwrap();
    assert!(!updated);

    let updated = slot
      .update_if(&"p1".to_string(), |v| v.retain(|x| *x != 2))
      .unwrap();
    assert!(updated);
    assert_eq!(slot.peek().unwrap().unwrap().value, vec![1, 3]);
  }

  #[test]
  fn test_clear() {
    let slot: CacheSlot<String, u32> = CacheSlot::new();
    slot.put("p1".to_string(), 1).unwrap();
    slot.clear().unwrap();
    assert!(slot.peek().unwrap().is_none());
    assert!(slot.tag().unwrap().is_none());
  }
}
