// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory observable store.
//!
//! Backs the integration tests and any consumer that wants the full
//! facade behavior without a platform store. Writes are atomic (the value
//! map is swapped under a lock) and every write bumps a per-key version
//! counter that subscribers observe.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio::sync::watch;

use crate::error::StoreError;

use super::ObservableStore;

/// Thread-safe in-memory implementation of [`ObservableStore`].
///
/// # Examples
///
/// ```
/// use nightlight_lib::{MemoryStore, ObservableStore};
///
/// let store = MemoryStore::new();
/// store.put("settings", "Data", &[1, 2, 3]).unwrap();
/// assert_eq!(store.get("settings", "Data").unwrap(), Some(vec![1, 2, 3]));
/// assert_eq!(store.get("settings", "Other").unwrap(), None);
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<(String, String), Vec<u8>>>,
    versions: RwLock<HashMap<String, watch::Sender<u64>>>,
    write_count: AtomicU64,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful writes performed so far.
    ///
    /// Lets tests assert that a clean record performs no store write.
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.write_count.load(Ordering::SeqCst)
    }

    /// Makes every subsequent `put` fail with
    /// [`StoreError::WriteRejected`] until switched back off.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Removes the named value, notifying subscribers of the key path.
    pub fn remove(&self, key_path: &str, value_name: &str) {
        let removed = self
            .values
            .write()
            .remove(&(key_path.to_string(), value_name.to_string()));
        if removed.is_some() {
            self.bump(key_path);
        }
    }

    fn bump(&self, key_path: &str) {
        let versions = self.versions.read();
        if let Some(sender) = versions.get(key_path) {
            sender.send_modify(|version| *version += 1);
        }
    }
}

impl ObservableStore for MemoryStore {
    fn get(&self, key_path: &str, value_name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self
            .values
            .read()
            .get(&(key_path.to_string(), value_name.to_string()))
            .cloned())
    }

    fn put(&self, key_path: &str, value_name: &str, data: &[u8]) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::WriteRejected(key_path.to_string()));
        }
        self.values.write().insert(
            (key_path.to_string(), value_name.to_string()),
            data.to_vec(),
        );
        self.write_count.fetch_add(1, Ordering::SeqCst);
        self.bump(key_path);
        Ok(())
    }

    fn subscribe(&self, key_path: &str) -> Result<watch::Receiver<u64>, StoreError> {
        let mut versions = self.versions.write();
        let sender = versions
            .entry(key_path.to_string())
            .or_insert_with(|| watch::channel(0).0);
        Ok(sender.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_missing_value_is_none() {
        let store = MemoryStore::new();
        assert_eq!(store.get("key", "Data").unwrap(), None);
        assert_eq!(store.value_size("key", "Data").unwrap(), None);
    }

    #[test]
    fn put_then_get_round_trips() {
        let store = MemoryStore::new();
        store.put("key", "Data", &[0xAA, 0xBB]).unwrap();
        assert_eq!(store.get("key", "Data").unwrap(), Some(vec![0xAA, 0xBB]));
        assert_eq!(store.value_size("key", "Data").unwrap(), Some(2));
        assert_eq!(store.write_count(), 1);
    }

    #[test]
    fn failed_write_is_rejected_and_not_counted() {
        let store = MemoryStore::new();
        store.set_fail_writes(true);
        let err = store.put("key", "Data", &[1]).unwrap_err();
        assert!(matches!(err, StoreError::WriteRejected(_)));
        assert_eq!(store.write_count(), 0);
        assert_eq!(store.get("key", "Data").unwrap(), None);
    }

    #[tokio::test]
    async fn subscribers_observe_writes() {
        let store = MemoryStore::new();
        let mut rx = store.subscribe("key").unwrap();
        assert!(!rx.has_changed().unwrap());

        store.put("key", "Data", &[1]).unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), 1);

        // Writes under other key paths do not signal this subscription.
        store.put("other", "Data", &[2]).unwrap();
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn remove_notifies_subscribers() {
        let store = MemoryStore::new();
        store.put("key", "Data", &[1]).unwrap();
        let mut rx = store.subscribe("key").unwrap();

        store.remove("key", "Data");
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();
        assert_eq!(store.get("key", "Data").unwrap(), None);

        // Removing an absent value is a no-op and does not signal.
        store.remove("key", "Data");
        assert!(!rx.has_changed().unwrap());
    }
}
