// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Dirty-tracked record persistence.
//!
//! A [`Repository`] owns one typed payload together with the opaque header
//! and metadata of the stored blob it mirrors, and a dirty flag tracking
//! unsaved local mutations. Loading and saving go through the
//! [`ObservableStore`] the repository was created with.
//!
//! The load/save contract is boolean on purpose — it mirrors the behavior
//! of the store the records live in:
//!
//! - `load` returns `false` when the value is absent, truncated, or fails
//!   to decode; the in-memory record is left untouched, so accessors keep
//!   serving the last successfully loaded (stale but valid) data.
//! - `save` is a no-op success when the record is clean. A failed write
//!   leaves the dirty flag set so a later `save` retries.

pub mod codec;

use std::sync::Arc;

pub use codec::{BodyReader, BodyWriter, Header, Metadata, WireType, filetime_now};

use crate::error::CodecError;
use crate::schema::{Schema, VALUE_NAME};
use crate::store::ObservableStore;

/// Capability set a payload type supplies to its [`Repository`]: where it
/// lives, its schema defaults, and its body encoding.
pub trait Payload: Clone + PartialEq + Send + 'static {
    /// Key path this payload's record lives under.
    fn key_path(schema: &Schema) -> &str;

    /// Payload populated with the schema's default values.
    fn reset(schema: &Schema) -> Self;

    /// Encodes the payload fields into a compact body.
    fn encode_body(&self, writer: &mut BodyWriter);

    /// Decodes payload fields from a compact body.
    ///
    /// Starts from [`reset`](Self::reset) so fields absent from the blob
    /// keep their schema defaults; unknown field ids are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] on a malformed body.
    fn decode_body(reader: &mut BodyReader<'_>, schema: &Schema) -> Result<Self, CodecError>;
}

/// A typed, dirty-tracked record persisted in an [`ObservableStore`].
pub struct Repository<P: Payload> {
    store: Arc<dyn ObservableStore>,
    schema: Arc<Schema>,
    header: Header,
    metadata: Metadata,
    payload: P,
    dirty: bool,
}

impl<P: Payload> Repository<P> {
    /// Creates a repository with schema-default payload, not yet loaded.
    #[must_use]
    pub fn new(store: Arc<dyn ObservableStore>, schema: Arc<Schema>) -> Self {
        let payload = P::reset(&schema);
        Self {
            store,
            schema,
            header: Header::default(),
            metadata: Metadata::default(),
            payload,
            dirty: false,
        }
    }

    /// Key path of the stored record.
    #[must_use]
    pub fn key_path(&self) -> &str {
        P::key_path(&self.schema)
    }

    /// The schema this repository validates against.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The stored blob's header as of the last load.
    #[must_use]
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// The stored blob's metadata as of the last load.
    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Read access to the payload.
    #[must_use]
    pub fn payload(&self) -> &P {
        &self.payload
    }

    /// Write access to the payload. Marks the record dirty.
    pub fn payload_mut(&mut self) -> &mut P {
        self.dirty = true;
        &mut self.payload
    }

    /// Whether the record has unsaved local mutations.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Sets the dirty flag directly.
    ///
    /// Used by the facade's backup bookkeeping, where a backup is tagged
    /// dirty exactly when its snapshot load succeeded so that a restore
    /// writes only valid snapshots.
    pub fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }

    /// Resets the payload to schema defaults and marks the record dirty.
    pub fn reset(&mut self) {
        self.payload = P::reset(&self.schema);
        self.dirty = true;
    }

    /// Reloads the record from the store.
    ///
    /// Returns `false` — leaving the record completely unmodified — when
    /// the value is absent, shorter than the fixed header and metadata, or
    /// fails to decode. On success the freshly decoded header, metadata,
    /// and payload are swapped in and the dirty flag is cleared.
    pub fn load(&mut self) -> bool {
        let key = P::key_path(&self.schema);
        // Size probe before copying the value out.
        if let Ok(Some(size)) = self.store.value_size(key, VALUE_NAME)
            && size < codec::HEADER_LEN + codec::METADATA_LEN
        {
            tracing::debug!(key, size, "store value too short");
            return false;
        }
        let data = match self.store.get(key, VALUE_NAME) {
            Ok(Some(data)) => data,
            Ok(None) => {
                tracing::debug!(key, "store value absent");
                return false;
            }
            Err(error) => {
                tracing::debug!(key, %error, "store read failed");
                return false;
            }
        };
        // Decode into scratch values first; a malformed blob must not
        // corrupt the live record.
        match Self::decode(&data, &self.schema) {
            Ok((header, metadata, payload)) => {
                self.header = header;
                self.metadata = metadata;
                self.payload = payload;
                self.dirty = false;
                true
            }
            Err(error) => {
                tracing::debug!(key, %error, "record decode failed");
                false
            }
        }
    }

    /// Persists the record to the store.
    ///
    /// A clean record is a no-op success. Otherwise the header's filetime
    /// is refreshed, the blob re-encoded under the stored protocol
    /// selection, and written; the dirty flag is cleared only when the
    /// write succeeds.
    pub fn save(&mut self) -> bool {
        if !self.dirty {
            return true;
        }
        let key = P::key_path(&self.schema).to_owned();
        let data = match self.encode() {
            Ok(data) => data,
            Err(error) => {
                tracing::debug!(key, %error, "record encode failed");
                return false;
            }
        };
        match self.store.put(&key, VALUE_NAME, &data) {
            Ok(()) => {
                tracing::debug!(key, len = data.len(), "record saved");
                self.dirty = false;
                true
            }
            Err(error) => {
                tracing::debug!(key, %error, "store write failed");
                false
            }
        }
    }

    fn decode(data: &[u8], schema: &Schema) -> Result<(Header, Metadata, P), CodecError> {
        if data.len() < codec::HEADER_LEN + codec::METADATA_LEN {
            return Err(CodecError::Truncated {
                required: codec::HEADER_LEN + codec::METADATA_LEN,
                actual: data.len(),
            });
        }
        let header = Header::read(data)?;
        let metadata = Metadata::read(&data[codec::HEADER_LEN..])?;
        if !metadata.is_supported() {
            return Err(CodecError::UnsupportedProtocol {
                protocol: metadata.protocol,
                version: metadata.version,
            });
        }
        let mut reader = BodyReader::new(&data[codec::HEADER_LEN + codec::METADATA_LEN..]);
        let payload = P::decode_body(&mut reader, schema)?;
        Ok((header, metadata, payload))
    }

    fn encode(&mut self) -> Result<Vec<u8>, CodecError> {
        if !self.metadata.is_supported() {
            return Err(CodecError::UnsupportedProtocol {
                protocol: self.metadata.protocol,
                version: self.metadata.version,
            });
        }
        self.header.filetime = filetime_now();
        let mut out = Vec::with_capacity(64);
        self.header.write(&mut out);
        self.metadata.write(&mut out);
        let mut writer = BodyWriter::new();
        self.payload.encode_body(&mut writer);
        out.extend_from_slice(&writer.finish());
        Ok(out)
    }
}

impl<P: Payload + std::fmt::Debug> std::fmt::Debug for Repository<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("key_path", &self.key_path())
            .field("header", &self.header)
            .field("metadata", &self.metadata)
            .field("payload", &self.payload)
            .field("dirty", &self.dirty)
            .finish_non_exhaustive()
    }
}
