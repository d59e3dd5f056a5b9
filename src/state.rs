// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The persisted night light runtime state.

use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::record::{BodyReader, BodyWriter, Payload, WireType};
use crate::schema::Schema;

// Body field ids.
const F_STATUS: u8 = 1;
const F_TRIGGER: u8 = 2;
const F_CHANGED_ON: u8 = 3;
const F_USABLE: u8 = 4;

// Wire values for `Status`.
const STATUS_OTHER: i64 = 0;
const STATUS_RUNNING: i64 = 1;

// Wire values for `Trigger`.
const TRIGGER_AUTOMATIC: i64 = 0;
const TRIGGER_MANUAL: i64 = 1;

/// Reported run status of the feature.
///
/// The store uses an unset sentinel besides the two concrete values;
/// that sentinel is modeled as `None` in the record's `Option<Status>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    /// The feature is actively tinting the display.
    Running,
    /// Any reported status other than running.
    Other,
}

/// Attribution of the most recent status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trigger {
    /// The user flipped the feature.
    Manual,
    /// A schedule flipped the feature.
    Automatic,
}

/// The feature's runtime state record.
///
/// # Examples
///
/// ```
/// use nightlight_lib::{Schema, State, Status};
/// use nightlight_lib::record::Payload;
///
/// let schema = Schema::windows();
/// let mut state = State::reset(&schema);
/// assert!(!state.is_running());
/// state.resume();
/// assert!(state.is_running());
/// state.pause();
/// assert_eq!(state.status(), None);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    status: Option<Status>,
    trigger: Trigger,
    changed_on: i64,
    usable: bool,
}

impl State {
    /// The reported status, `None` when unset.
    #[must_use]
    pub fn status(&self) -> Option<Status> {
        self.status
    }

    /// Attribution of the last status change.
    #[must_use]
    pub fn trigger(&self) -> Trigger {
        self.trigger
    }

    /// When the state last changed, as filetime ticks.
    #[must_use]
    pub fn changed_on(&self) -> i64 {
        self.changed_on
    }

    /// Whether the last status change was user-caused.
    #[must_use]
    pub fn was_manually_triggered(&self) -> bool {
        self.trigger == Trigger::Manual
    }

    /// Whether the feature is actively running and currently usable.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status == Some(Status::Running) && self.usable
    }

    /// Marks the feature running.
    pub fn resume(&mut self) -> &mut Self {
        self.status = Some(Status::Running);
        self
    }

    /// Marks the feature stopped, using the unset sentinel.
    pub fn pause(&mut self) -> &mut Self {
        self.status = None;
        self
    }

    /// Whether the host currently permits toggling the feature at all.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.usable
    }

    /// Sets the usable flag.
    pub fn set_usable(&mut self, usable: bool) -> &mut Self {
        self.usable = usable;
        self
    }

    /// Stamps the record for persisting: refreshes `changed_on` and, when
    /// `attribute_trigger` holds, derives the trigger attribution from
    /// current usability.
    pub(crate) fn stamp(&mut self, now_filetime: i64, attribute_trigger: bool) -> &mut Self {
        self.changed_on = now_filetime;
        if attribute_trigger {
            self.trigger = if self.usable {
                Trigger::Manual
            } else {
                Trigger::Automatic
            };
        }
        self
    }
}

impl Payload for State {
    fn key_path(schema: &Schema) -> &str {
        schema.state_key()
    }

    fn reset(schema: &Schema) -> Self {
        Self {
            status: None,
            trigger: Trigger::Automatic,
            changed_on: 0,
            usable: schema.default_usable,
        }
    }

    fn encode_body(&self, writer: &mut BodyWriter) {
        // The unset sentinel is encoded by omitting the field.
        if let Some(status) = self.status {
            let value = match status {
                Status::Running => STATUS_RUNNING,
                Status::Other => STATUS_OTHER,
            };
            writer.write_int(F_STATUS, value);
        }
        let trigger = match self.trigger {
            Trigger::Manual => TRIGGER_MANUAL,
            Trigger::Automatic => TRIGGER_AUTOMATIC,
        };
        writer.write_int(F_TRIGGER, trigger);
        writer.write_int(F_CHANGED_ON, self.changed_on);
        writer.write_bool(F_USABLE, self.usable);
    }

    fn decode_body(reader: &mut BodyReader<'_>, schema: &Schema) -> Result<Self, CodecError> {
        let mut state = Self::reset(schema);
        while let Some((id, wire)) = reader.next_field()? {
            match (id, wire) {
                (F_STATUS, WireType::VarInt) => {
                    state.status = Some(match reader.read_int()? {
                        STATUS_RUNNING => Status::Running,
                        _ => Status::Other,
                    });
                }
                (F_TRIGGER, WireType::VarInt) => {
                    state.trigger = match reader.read_int()? {
                        TRIGGER_MANUAL => Trigger::Manual,
                        _ => Trigger::Automatic,
                    };
                }
                (F_CHANGED_ON, WireType::VarInt) => state.changed_on = reader.read_int()?,
                (F_USABLE, WireType::Bool) => state.usable = reader.read_bool()?,
                (_, wire) => reader.skip(wire)?,
            }
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::windows()
    }

    #[test]
    fn running_requires_status_and_usability() {
        let schema = schema();
        let mut state = State::reset(&schema);

        for (status, usable, expected) in [
            (Some(Status::Running), true, true),
            (Some(Status::Running), false, false),
            (Some(Status::Other), true, false),
            (Some(Status::Other), false, false),
            (None, true, false),
            (None, false, false),
        ] {
            state.status = status;
            state.set_usable(usable);
            assert_eq!(state.is_running(), expected, "{status:?}/{usable}");
        }
    }

    #[test]
    fn pause_sets_unset_sentinel_not_other() {
        let schema = schema();
        let mut state = State::reset(&schema);
        state.resume();
        assert_eq!(state.status(), Some(Status::Running));
        state.pause();
        assert_eq!(state.status(), None);
    }

    #[test]
    fn stamp_derives_trigger_from_usability() {
        let schema = schema();
        let mut state = State::reset(&schema);

        state.set_usable(true).stamp(1000, true);
        assert_eq!(state.trigger(), Trigger::Manual);
        assert_eq!(state.changed_on(), 1000);

        state.set_usable(false).stamp(2000, true);
        assert_eq!(state.trigger(), Trigger::Automatic);
        assert_eq!(state.changed_on(), 2000);

        // With attribution gated off, only the timestamp moves.
        state.set_usable(true).stamp(3000, false);
        assert_eq!(state.trigger(), Trigger::Automatic);
        assert_eq!(state.changed_on(), 3000);
    }

    #[test]
    fn body_round_trip() {
        let schema = schema();
        let mut original = State::reset(&schema);
        original.resume().set_usable(true).stamp(123_456_789, true);

        let mut writer = BodyWriter::new();
        original.encode_body(&mut writer);
        let body = writer.finish();

        let mut reader = BodyReader::new(&body);
        let decoded = State::decode_body(&mut reader, &schema).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn unset_status_round_trips_as_none() {
        let schema = schema();
        let mut original = State::reset(&schema);
        original.pause();

        let mut writer = BodyWriter::new();
        original.encode_body(&mut writer);
        let body = writer.finish();

        let mut reader = BodyReader::new(&body);
        let decoded = State::decode_body(&mut reader, &schema).unwrap();
        assert_eq!(decoded.status(), None);
    }

    #[test]
    fn unknown_status_value_decodes_as_other() {
        let schema = schema();
        let mut writer = BodyWriter::new();
        writer.write_int(F_STATUS, 42);
        let body = writer.finish();

        let mut reader = BodyReader::new(&body);
        let decoded = State::decode_body(&mut reader, &schema).unwrap();
        assert_eq!(decoded.status(), Some(Status::Other));
    }
}
