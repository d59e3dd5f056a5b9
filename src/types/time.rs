// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Schedule time of day.

use chrono::Timelike;
use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::record::{BodyReader, BodyWriter, WireType};
use crate::schema::Schema;

/// Minutes in a day, used to unwrap ranges that cross midnight.
const MINUTES_PER_DAY: u32 = 24 * 60;

/// A schedule time of day with schema-clamped hours and minutes.
///
/// Every constructor and setter clamps against the [`Schema`] bounds, so a
/// `Time` always holds valid values.
///
/// # Examples
///
/// ```
/// use nightlight_lib::{Schema, Time};
///
/// let schema = Schema::windows();
/// let t = Time::new(30, -5, &schema);
/// assert_eq!((t.hours(), t.minutes()), (23, 0));
/// assert_eq!(Time::new(21, 30, &schema).to_minutes(), 1290);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Time {
    hours: i8,
    minutes: i8,
}

impl Time {
    /// Creates a time, clamping both components to the schema bounds.
    #[must_use]
    pub fn new(hours: i8, minutes: i8, schema: &Schema) -> Self {
        let mut time = Self::default();
        time.set_hours(hours, schema).set_minutes(minutes, schema);
        time
    }

    /// The schema-default time.
    #[must_use]
    pub fn reset(schema: &Schema) -> Self {
        let mut time = Self::default();
        // Defaults already lie inside the bounds; clamp regardless.
        time.set_hours(to_i8(schema.hours.default), schema)
            .set_minutes(to_i8(schema.minutes.default), schema);
        time
    }

    /// The current local wall-clock time.
    #[must_use]
    pub fn now(schema: &Schema) -> Self {
        let now = chrono::Local::now();
        Self::new(to_i8_u32(now.hour()), to_i8_u32(now.minute()), schema)
    }

    /// Hour component.
    #[must_use]
    pub fn hours(&self) -> i8 {
        self.hours
    }

    /// Minute component.
    #[must_use]
    pub fn minutes(&self) -> i8 {
        self.minutes
    }

    /// Sets the hour component, clamped to the schema bounds.
    pub fn set_hours(&mut self, hours: i8, schema: &Schema) -> &mut Self {
        self.hours = to_i8(schema.hours.clamp(i32::from(hours)));
        self
    }

    /// Sets the minute component, clamped to the schema bounds.
    pub fn set_minutes(&mut self, minutes: i8, schema: &Schema) -> &mut Self {
        self.minutes = to_i8(schema.minutes.clamp(i32::from(minutes)));
        self
    }

    /// This time as minutes since midnight.
    #[must_use]
    pub fn to_minutes(&self) -> u16 {
        let hours = u16::try_from(self.hours).unwrap_or(0);
        let minutes = u16::try_from(self.minutes).unwrap_or(0);
        hours * 60 + minutes
    }

    /// Whether `t` lies in the inclusive range `[start, end]`, where the
    /// range may wrap past midnight.
    ///
    /// When `end` precedes `start` as a minute of day, the range is
    /// understood to cross midnight; `t` is normalized the same way
    /// relative to `start`.
    ///
    /// # Examples
    ///
    /// ```
    /// use nightlight_lib::{Schema, Time};
    ///
    /// let schema = Schema::windows();
    /// let start = Time::new(20, 0, &schema);
    /// let end = Time::new(6, 0, &schema);
    /// assert!(Time::is_within_range(start, end, Time::new(21, 0, &schema)));
    /// assert!(!Time::is_within_range(start, end, Time::new(7, 0, &schema)));
    /// ```
    #[must_use]
    pub fn is_within_range(start: Time, end: Time, t: Time) -> bool {
        let start_m = u32::from(start.to_minutes());
        let mut end_m = u32::from(end.to_minutes());
        let mut t_m = u32::from(t.to_minutes());
        if end_m < start_m {
            end_m += MINUTES_PER_DAY;
        }
        if t_m < start_m {
            t_m += MINUTES_PER_DAY;
        }
        t_m >= start_m && t_m <= end_m
    }

    /// Whether this time lies in `[start, end]`, wrapping midnight.
    #[must_use]
    pub fn within(&self, start: Time, end: Time) -> bool {
        Self::is_within_range(start, end, *self)
    }

    pub(crate) fn encode(&self, writer: &mut BodyWriter, id: u8) {
        writer.begin_struct(id);
        writer.write_int(1, i64::from(self.hours));
        writer.write_int(2, i64::from(self.minutes));
        writer.end_struct();
    }

    pub(crate) fn decode(
        reader: &mut BodyReader<'_>,
        schema: &Schema,
    ) -> Result<Self, CodecError> {
        let mut time = Self::reset(schema);
        while let Some((id, wire)) = reader.next_field()? {
            match (id, wire) {
                (1, WireType::VarInt) => {
                    time.set_hours(clamp_i64(reader.read_int()?), schema);
                }
                (2, WireType::VarInt) => {
                    time.set_minutes(clamp_i64(reader.read_int()?), schema);
                }
                (_, wire) => reader.skip(wire)?,
            }
        }
        Ok(time)
    }
}

impl std::fmt::Display for Time {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.hours, self.minutes)
    }
}

/// Narrows a clamped i32 to i8. Only called on values already inside the
/// schema bounds, which fit an i8 by construction.
#[allow(clippy::cast_possible_truncation)]
fn to_i8(value: i32) -> i8 {
    value.clamp(i32::from(i8::MIN), i32::from(i8::MAX)) as i8
}

#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
fn to_i8_u32(value: u32) -> i8 {
    value.min(i8::MAX as u32) as i8
}

#[allow(clippy::cast_possible_truncation)]
fn clamp_i64(value: i64) -> i8 {
    value.clamp(i64::from(i8::MIN), i64::from(i8::MAX)) as i8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::windows()
    }

    #[test]
    fn setters_clamp_to_schema_bounds() {
        let schema = schema();
        let mut t = Time::default();
        t.set_hours(30, &schema);
        assert_eq!(t.hours(), 23);
        t.set_hours(-2, &schema);
        assert_eq!(t.hours(), 0);
        t.set_minutes(75, &schema);
        assert_eq!(t.minutes(), 59);
        t.set_minutes(-1, &schema);
        assert_eq!(t.minutes(), 0);
    }

    #[test]
    fn to_minutes() {
        let schema = schema();
        assert_eq!(Time::new(0, 0, &schema).to_minutes(), 0);
        assert_eq!(Time::new(20, 0, &schema).to_minutes(), 1200);
        assert_eq!(Time::new(23, 59, &schema).to_minutes(), 1439);
    }

    #[test]
    fn range_wrapping_midnight() {
        let schema = schema();
        let start = Time::new(20, 0, &schema);
        let end = Time::new(6, 0, &schema);

        assert!(Time::is_within_range(start, end, Time::new(21, 0, &schema)));
        assert!(!Time::is_within_range(start, end, Time::new(7, 0, &schema)));
        // Inclusive at both endpoints.
        assert!(Time::is_within_range(start, end, Time::new(20, 0, &schema)));
        assert!(Time::is_within_range(start, end, Time::new(6, 0, &schema)));
        // Past midnight but before the end.
        assert!(Time::is_within_range(start, end, Time::new(2, 30, &schema)));
    }

    #[test]
    fn range_not_wrapping() {
        let schema = schema();
        let start = Time::new(8, 0, &schema);
        let end = Time::new(20, 0, &schema);

        assert!(Time::new(12, 0, &schema).within(start, end));
        assert!(!Time::new(21, 0, &schema).within(start, end));
        assert!(!Time::new(7, 59, &schema).within(start, end));
    }

    #[test]
    fn codec_round_trip() {
        let schema = schema();
        let original = Time::new(22, 45, &schema);
        let mut writer = BodyWriter::new();
        original.encode(&mut writer, 4);
        let body = writer.finish();

        let mut reader = BodyReader::new(&body);
        assert_eq!(reader.next_field().unwrap(), Some((4, WireType::Struct)));
        let decoded = Time::decode(&mut reader, &schema).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn decode_clamps_out_of_range_values() {
        let schema = schema();
        let mut writer = BodyWriter::new();
        writer.begin_struct(1);
        writer.write_int(1, 300);
        writer.write_int(2, -10);
        writer.end_struct();
        let body = writer.finish();

        let mut reader = BodyReader::new(&body);
        reader.next_field().unwrap();
        let decoded = Time::decode(&mut reader, &schema).unwrap();
        assert_eq!((decoded.hours(), decoded.minutes()), (23, 0));
    }

    #[test]
    fn display_zero_pads() {
        let schema = schema();
        assert_eq!(Time::new(6, 5, &schema).to_string(), "06:05");
    }
}
