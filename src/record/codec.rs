// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Binary layout of the persisted records.
//!
//! Every stored blob is `Header + Metadata + body`:
//!
//! ```text
//! offset  0: Header   { magic1: u32, filetime: i64, magic2: u32 }   16 bytes, LE
//! offset 16: Metadata { protocol: i16, version: i16 }                4 bytes, LE
//! offset 20: body — schema-encoded fields, selected by protocol/version
//! ```
//!
//! The header is opaque to this library and round-tripped verbatim, except
//! that `filetime` (100 ns ticks since 1601-01-01 UTC) is refreshed on every
//! save. The metadata selects the body marshaling protocol; only the compact
//! protocol is implemented, and records naming any other protocol fail to
//! encode or decode.
//!
//! The compact body is a sequence of tagged fields: a field id byte (zero
//! terminates the sequence), a wire type byte, then the value. Integers are
//! zigzag varints, nested structs recurse with their own terminator, and
//! unknown field ids are skipped by wire type so blobs written by a newer
//! schema still decode.

use crate::error::CodecError;

/// Compact binary protocol identifier (`'C' 'P'`).
pub const PROTOCOL_COMPACT: i16 = 0x4350;

/// Fast binary protocol identifier (`'F' 'M'`). Recognized, not implemented.
pub const PROTOCOL_FAST: i16 = 0x464D;

/// Simple binary protocol identifier (`'S' 'P'`). Recognized, not implemented.
pub const PROTOCOL_SIMPLE: i16 = 0x5350;

/// Protocol version written by this library.
pub const PROTOCOL_VERSION: i16 = 1;

/// Size of the fixed header in bytes.
pub const HEADER_LEN: usize = 16;

/// Size of the metadata block in bytes.
pub const METADATA_LEN: usize = 4;

/// Seconds between 1601-01-01 (the filetime epoch) and 1970-01-01.
const FILETIME_UNIX_OFFSET_SECS: i64 = 11_644_473_600;

/// Current system time as 100 ns ticks since 1601-01-01 UTC.
#[must_use]
pub fn filetime_now() -> i64 {
    let now = chrono::Utc::now();
    (now.timestamp() + FILETIME_UNIX_OFFSET_SECS) * 10_000_000
        + i64::from(now.timestamp_subsec_nanos() / 100)
}

/// Fixed record header, round-tripped verbatim apart from `filetime`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Header {
    /// First opaque magic word.
    pub magic1: u32,
    /// Last-written time, 100 ns ticks since 1601-01-01 UTC.
    pub filetime: i64,
    /// Second opaque magic word.
    pub magic2: u32,
}

impl Header {
    /// Decodes a header from the first [`HEADER_LEN`] bytes of `data`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Truncated`] when `data` is too short.
    pub fn read(data: &[u8]) -> Result<Self, CodecError> {
        if data.len() < HEADER_LEN {
            return Err(CodecError::Truncated {
                required: HEADER_LEN,
                actual: data.len(),
            });
        }
        Ok(Self {
            magic1: u32::from_le_bytes(data[0..4].try_into().unwrap_or_default()),
            filetime: i64::from_le_bytes(data[4..12].try_into().unwrap_or_default()),
            magic2: u32::from_le_bytes(data[12..16].try_into().unwrap_or_default()),
        })
    }

    /// Appends the header's [`HEADER_LEN`] bytes to `out`.
    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.magic1.to_le_bytes());
        out.extend_from_slice(&self.filetime.to_le_bytes());
        out.extend_from_slice(&self.magic2.to_le_bytes());
    }
}

/// Metadata block selecting the body marshaling protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata {
    /// Marshaling protocol identifier.
    pub protocol: i16,
    /// Protocol version.
    pub version: i16,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            protocol: PROTOCOL_COMPACT,
            version: PROTOCOL_VERSION,
        }
    }
}

impl Metadata {
    /// Decodes the metadata block from the first [`METADATA_LEN`] bytes of
    /// `data`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Truncated`] when `data` is too short.
    pub fn read(data: &[u8]) -> Result<Self, CodecError> {
        if data.len() < METADATA_LEN {
            return Err(CodecError::Truncated {
                required: METADATA_LEN,
                actual: data.len(),
            });
        }
        Ok(Self {
            protocol: i16::from_le_bytes(data[0..2].try_into().unwrap_or_default()),
            version: i16::from_le_bytes(data[2..4].try_into().unwrap_or_default()),
        })
    }

    /// Appends the metadata's [`METADATA_LEN`] bytes to `out`.
    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.protocol.to_le_bytes());
        out.extend_from_slice(&self.version.to_le_bytes());
    }

    /// Whether this metadata selects a protocol this build can marshal.
    #[must_use]
    pub fn is_supported(&self) -> bool {
        self.protocol == PROTOCOL_COMPACT
    }
}

/// Field id that terminates a field sequence.
const STOP: u8 = 0;

/// Wire type of a compact body field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WireType {
    /// Single byte, zero or one.
    Bool = 1,
    /// Zigzag varint, up to 64 bits.
    VarInt = 2,
    /// Nested field sequence with its own terminator.
    Struct = 3,
}

impl WireType {
    fn from_byte(byte: u8) -> Result<Self, CodecError> {
        match byte {
            1 => Ok(Self::Bool),
            2 => Ok(Self::VarInt),
            3 => Ok(Self::Struct),
            other => Err(CodecError::InvalidWireType(other)),
        }
    }
}

#[allow(clippy::cast_sign_loss)]
fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

#[allow(clippy::cast_possible_wrap)]
fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// Writer for a compact body.
///
/// Fields must be emitted in ascending id order within each struct; the
/// reader does not require it, but keeping the order stable keeps blobs
/// byte-comparable across saves.
#[derive(Debug, Default)]
pub struct BodyWriter {
    buf: Vec<u8>,
}

impl BodyWriter {
    /// Creates an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn tag(&mut self, id: u8, wire: WireType) {
        debug_assert_ne!(id, STOP, "field id 0 is the terminator");
        self.buf.push(id);
        self.buf.push(wire as u8);
    }

    fn varint(&mut self, mut value: u64) {
        loop {
            let byte = (value & 0x7F) as u8;
            value >>= 7;
            if value == 0 {
                self.buf.push(byte);
                return;
            }
            self.buf.push(byte | 0x80);
        }
    }

    /// Writes a boolean field.
    pub fn write_bool(&mut self, id: u8, value: bool) {
        self.tag(id, WireType::Bool);
        self.buf.push(u8::from(value));
    }

    /// Writes a signed integer field as a zigzag varint.
    pub fn write_int(&mut self, id: u8, value: i64) {
        self.tag(id, WireType::VarInt);
        self.varint(zigzag_encode(value));
    }

    /// Opens a nested struct field. Must be balanced by
    /// [`end_struct`](Self::end_struct).
    pub fn begin_struct(&mut self, id: u8) {
        self.tag(id, WireType::Struct);
    }

    /// Closes the innermost nested struct.
    pub fn end_struct(&mut self) {
        self.buf.push(STOP);
    }

    /// Terminates the body and returns the encoded bytes.
    #[must_use]
    pub fn finish(mut self) -> Vec<u8> {
        self.buf.push(STOP);
        self.buf
    }
}

/// Forward-only reader over a compact body.
///
/// The reader cannot rewind; payload decoders consume fields in a single
/// pass, skipping ids they do not recognize.
#[derive(Debug)]
pub struct BodyReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BodyReader<'a> {
    /// Creates a reader over the body bytes.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn byte(&mut self) -> Result<u8, CodecError> {
        let byte = *self
            .data
            .get(self.pos)
            .ok_or(CodecError::UnexpectedEof(self.pos))?;
        self.pos += 1;
        Ok(byte)
    }

    /// Advances to the next field tag.
    ///
    /// Returns `Ok(None)` at the terminator of the current field sequence.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] on a truncated tag or unknown wire type.
    pub fn next_field(&mut self) -> Result<Option<(u8, WireType)>, CodecError> {
        let id = self.byte()?;
        if id == STOP {
            return Ok(None);
        }
        let wire = WireType::from_byte(self.byte()?)?;
        Ok(Some((id, wire)))
    }

    /// Reads the value of a [`WireType::Bool`] field.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnexpectedEof`] on a truncated body.
    pub fn read_bool(&mut self) -> Result<bool, CodecError> {
        Ok(self.byte()? != 0)
    }

    /// Reads the value of a [`WireType::VarInt`] field.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] on a truncated or overlong varint.
    pub fn read_int(&mut self) -> Result<i64, CodecError> {
        let mut value: u64 = 0;
        for shift in (0..64).step_by(7) {
            let byte = self.byte()?;
            value |= u64::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                return Ok(zigzag_decode(value));
            }
        }
        Err(CodecError::VarIntOverflow)
    }

    /// Skips the value of a field with the given wire type.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] on a truncated body.
    pub fn skip(&mut self, wire: WireType) -> Result<(), CodecError> {
        match wire {
            WireType::Bool => {
                self.byte()?;
            }
            WireType::VarInt => {
                self.read_int()?;
            }
            WireType::Struct => {
                while let Some((_, nested)) = self.next_field()? {
                    self.skip(nested)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip() {
        let header = Header {
            magic1: 0x4300_0043,
            filetime: 0x01D9_8765_4321_0000,
            magic2: 0xCA_FE_BA_BE,
        };
        let mut out = Vec::new();
        header.write(&mut out);
        assert_eq!(out.len(), HEADER_LEN);
        assert_eq!(Header::read(&out).unwrap(), header);
    }

    #[test]
    fn header_truncated() {
        let err = Header::read(&[0; 7]).unwrap_err();
        assert_eq!(
            err,
            CodecError::Truncated {
                required: HEADER_LEN,
                actual: 7
            }
        );
    }

    #[test]
    fn metadata_defaults_to_compact_v1() {
        let meta = Metadata::default();
        assert_eq!(meta.protocol, PROTOCOL_COMPACT);
        assert_eq!(meta.version, PROTOCOL_VERSION);
        assert!(meta.is_supported());
    }

    #[test]
    fn metadata_rejects_other_protocols() {
        for protocol in [PROTOCOL_FAST, PROTOCOL_SIMPLE, 0x1234] {
            let meta = Metadata {
                protocol,
                version: PROTOCOL_VERSION,
            };
            assert!(!meta.is_supported());
        }
    }

    #[test]
    fn varint_round_trip() {
        for value in [0_i64, 1, -1, 23, -59, 6500, i64::MAX, i64::MIN] {
            let mut writer = BodyWriter::new();
            writer.write_int(1, value);
            let body = writer.finish();
            let mut reader = BodyReader::new(&body);
            let (id, wire) = reader.next_field().unwrap().unwrap();
            assert_eq!((id, wire), (1, WireType::VarInt));
            assert_eq!(reader.read_int().unwrap(), value);
            assert!(reader.next_field().unwrap().is_none());
        }
    }

    #[test]
    fn nested_struct_round_trip() {
        let mut writer = BodyWriter::new();
        writer.write_bool(1, true);
        writer.begin_struct(2);
        writer.write_int(1, 20);
        writer.write_int(2, 30);
        writer.end_struct();
        writer.write_int(3, -42);
        let body = writer.finish();

        let mut reader = BodyReader::new(&body);
        assert_eq!(reader.next_field().unwrap(), Some((1, WireType::Bool)));
        assert!(reader.read_bool().unwrap());
        assert_eq!(reader.next_field().unwrap(), Some((2, WireType::Struct)));
        assert_eq!(reader.next_field().unwrap(), Some((1, WireType::VarInt)));
        assert_eq!(reader.read_int().unwrap(), 20);
        assert_eq!(reader.next_field().unwrap(), Some((2, WireType::VarInt)));
        assert_eq!(reader.read_int().unwrap(), 30);
        assert_eq!(reader.next_field().unwrap(), None); // end of struct
        assert_eq!(reader.next_field().unwrap(), Some((3, WireType::VarInt)));
        assert_eq!(reader.read_int().unwrap(), -42);
        assert_eq!(reader.next_field().unwrap(), None);
    }

    #[test]
    fn unknown_fields_are_skippable() {
        let mut writer = BodyWriter::new();
        writer.write_int(9, 77);
        writer.begin_struct(10);
        writer.write_bool(1, false);
        writer.end_struct();
        writer.write_bool(2, true);
        let body = writer.finish();

        let mut reader = BodyReader::new(&body);
        let mut seen = None;
        while let Some((id, wire)) = reader.next_field().unwrap() {
            if id == 2 && wire == WireType::Bool {
                seen = Some(reader.read_bool().unwrap());
            } else {
                reader.skip(wire).unwrap();
            }
        }
        assert_eq!(seen, Some(true));
    }

    #[test]
    fn truncated_body_errors() {
        let mut writer = BodyWriter::new();
        writer.write_int(1, 123_456);
        let mut body = writer.finish();
        body.truncate(3);

        let mut reader = BodyReader::new(&body);
        reader.next_field().unwrap();
        assert!(matches!(
            reader.read_int(),
            Err(CodecError::UnexpectedEof(_))
        ));
    }

    #[test]
    fn invalid_wire_type_errors() {
        let body = [1_u8, 0xEE];
        let mut reader = BodyReader::new(&body);
        assert_eq!(
            reader.next_field().unwrap_err(),
            CodecError::InvalidWireType(0xEE)
        );
    }

    #[test]
    fn filetime_is_past_2020() {
        // 2020-01-01 as filetime ticks.
        assert!(filetime_now() > 132_223_104_000_000_000);
    }
}
