// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Observable key/value store abstraction.
//!
//! The night light records live in an external store (on Windows, the
//! CloudStore registry keys) that other applications and the OS itself
//! mutate at any time. This module defines the capability the rest of the
//! library consumes: read and write one named binary value under a key
//! path, and subscribe to change notifications for a key path.
//!
//! Change notifications are exposed as a [`tokio::sync::watch`] receiver
//! carrying a version counter. Awaiting
//! [`changed()`](tokio::sync::watch::Receiver::changed) is the wait
//! primitive; the receiver re-arms itself after every observed change, so
//! no notification is lost between waits.

mod memory;

pub use memory::MemoryStore;

use tokio::sync::watch;

use crate::error::StoreError;

/// An externally mutable key/value store with change notifications.
///
/// Implementations must be thread-safe: the watcher tasks and the caller's
/// own context access the store concurrently. The store is treated as an
/// independent resource — a value read now may already be stale, and the
/// library is designed around that.
pub trait ObservableStore: Send + Sync {
    /// Reads the named binary value under a key path.
    ///
    /// Returns `Ok(None)` when the key path or value does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backend fails in a way other than
    /// plain absence.
    fn get(&self, key_path: &str, value_name: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Writes the named binary value under a key path, creating it if
    /// necessary. The write must be atomic: readers see either the old or
    /// the new bytes, never a mix.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::WriteRejected`] when the store refuses the
    /// write.
    fn put(&self, key_path: &str, value_name: &str, data: &[u8]) -> Result<(), StoreError>;

    /// Reports the size in bytes of the named value, without copying it.
    ///
    /// Returns `Ok(None)` when the value does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backend fails.
    fn value_size(&self, key_path: &str, value_name: &str) -> Result<Option<usize>, StoreError> {
        Ok(self.get(key_path, value_name)?.map(|data| data.len()))
    }

    /// Subscribes to change notifications for everything under a key path.
    ///
    /// The returned receiver observes a version counter that is bumped on
    /// every write under the key path, including writes made through this
    /// same store handle.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the subscription cannot be registered.
    fn subscribe(&self, key_path: &str) -> Result<watch::Receiver<u64>, StoreError>;
}
