// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the night light library.
//!
//! This module provides the error hierarchy for failures across the library:
//! store access, record encoding/decoding, and change watching.
//!
//! Note that the record-level [`load`](crate::Repository::load) and
//! [`save`](crate::Repository::save) operations deliberately collapse these
//! errors to a `bool`, matching the contract of the store they mirror: an
//! absent value and a malformed value are indistinguishable to callers, and
//! a failed save simply leaves the record dirty for a later retry. The typed
//! errors below surface at the [`ObservableStore`](crate::ObservableStore)
//! boundary and in log output.

use thiserror::Error;

/// The main error type for this library.
#[derive(Debug, Error)]
pub enum Error {
    /// Error occurred while accessing the key/value store.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Error occurred while encoding or decoding a record.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Error occurred in the change watcher.
    #[error("watch error: {0}")]
    Watch(#[from] WatchError),
}

/// Errors related to the underlying key/value store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested key path does not exist.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// The store rejected a write.
    #[error("write rejected: {0}")]
    WriteRejected(String),

    /// The store backend failed in a backend-specific way.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Errors related to the binary record layout.
///
/// These errors occur when a stored value cannot be decoded, or when a
/// record selects a marshaling protocol this build does not implement.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The value is too short to contain the fixed header and metadata.
    #[error("value is truncated: {actual} bytes, need at least {required}")]
    Truncated {
        /// Minimum number of bytes required.
        required: usize,
        /// Number of bytes actually present.
        actual: usize,
    },

    /// The record metadata selects a protocol that is not implemented.
    #[error("unsupported marshaling protocol {protocol:#06x} v{version}")]
    UnsupportedProtocol {
        /// The protocol identifier from the record metadata.
        protocol: i16,
        /// The protocol version from the record metadata.
        version: i16,
    },

    /// A field tag carries an unknown wire type.
    #[error("invalid wire type {0:#04x}")]
    InvalidWireType(u8),

    /// A variable-length integer does not fit in 64 bits.
    #[error("varint overflows 64 bits")]
    VarIntOverflow,

    /// The body ended in the middle of a field.
    #[error("unexpected end of body at offset {0}")]
    UnexpectedEof(usize),
}

/// Errors related to change watching.
#[derive(Debug, Error)]
pub enum WatchError {
    /// Registering a change subscription on a key failed.
    #[error("subscription failed for {key}: {source}")]
    Subscribe {
        /// The key path that could not be subscribed to.
        key: String,
        /// The underlying store error.
        source: StoreError,
    },

    /// The change stream for a key closed while the watcher was running.
    #[error("change stream closed for {0}")]
    StreamClosed(String),
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_error_display() {
        let err = CodecError::Truncated {
            required: 20,
            actual: 7,
        };
        assert_eq!(
            err.to_string(),
            "value is truncated: 7 bytes, need at least 20"
        );
    }

    #[test]
    fn unsupported_protocol_display() {
        let err = CodecError::UnsupportedProtocol {
            protocol: 0x464D,
            version: 1,
        };
        assert_eq!(err.to_string(), "unsupported marshaling protocol 0x464d v1");
    }

    #[test]
    fn error_from_store_error() {
        let store_err = StoreError::KeyNotFound("settings".to_string());
        let err: Error = store_err.into();
        assert!(matches!(err, Error::Store(StoreError::KeyNotFound(_))));
    }

    #[test]
    fn watch_error_display() {
        let err = WatchError::StreamClosed("state".to_string());
        assert_eq!(err.to_string(), "change stream closed for state");
    }
}
