// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The persisted night light settings.

use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::record::{BodyReader, BodyWriter, Payload, WireType};
use crate::schema::Schema;
use crate::types::Time;

// Body field ids.
const F_ENABLED: u8 = 1;
const F_ON_SUN_SCHEDULE: u8 = 2;
const F_NIGHT_COLOR_TEMPERATURE: u8 = 3;
const F_MANUAL_START: u8 = 4;
const F_MANUAL_END: u8 = 5;
const F_SUN_START: u8 = 6;
const F_SUN_END: u8 = 7;
const F_ADJUSTING: u8 = 8;

/// The user-facing night light configuration.
///
/// Two schedule modes exist: a manual schedule whose start and end times
/// the user sets, and a sun schedule whose times the store populates from
/// the local sunset/sunrise. [`start_time`](Self::start_time) and
/// [`end_time`](Self::end_time) select the pair matching the active mode.
///
/// Dirty-tracking lives in the owning [`Repository`](crate::Repository):
/// obtaining mutable access through it marks the record dirty, so every
/// setter call counts as an unsaved mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    enabled: bool,
    on_sun_schedule: bool,
    manual_schedule_start: Time,
    manual_schedule_end: Time,
    sun_schedule_start: Time,
    sun_schedule_end: Time,
    night_color_temperature: i16,
    adjusting_color_temperature: bool,
}

impl Settings {
    /// Whether the feature is enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enables or disables the feature.
    pub fn set_enabled(&mut self, enabled: bool) -> &mut Self {
        self.enabled = enabled;
        self
    }

    /// Whether the sun schedule is active (as opposed to the manual one).
    #[must_use]
    pub fn is_on_sun_schedule(&self) -> bool {
        self.on_sun_schedule
    }

    /// Switches between the sun and manual schedules.
    pub fn set_on_sun_schedule(&mut self, on_sun_schedule: bool) -> &mut Self {
        self.on_sun_schedule = on_sun_schedule;
        self
    }

    /// Start time of the active schedule.
    #[must_use]
    pub fn start_time(&self) -> Time {
        if self.on_sun_schedule {
            self.sun_schedule_start
        } else {
            self.manual_schedule_start
        }
    }

    /// End time of the active schedule.
    #[must_use]
    pub fn end_time(&self) -> Time {
        if self.on_sun_schedule {
            self.sun_schedule_end
        } else {
            self.manual_schedule_end
        }
    }

    /// Sets the manual schedule start time.
    pub fn set_start_time(&mut self, time: Time) -> &mut Self {
        self.manual_schedule_start = time;
        self
    }

    /// Sets the manual schedule end time.
    pub fn set_end_time(&mut self, time: Time) -> &mut Self {
        self.manual_schedule_end = time;
        self
    }

    /// Sun schedule start time, as populated by the store.
    #[must_use]
    pub fn sun_schedule_start(&self) -> Time {
        self.sun_schedule_start
    }

    /// Sun schedule end time, as populated by the store.
    #[must_use]
    pub fn sun_schedule_end(&self) -> Time {
        self.sun_schedule_end
    }

    /// The configured night color temperature in Kelvin.
    #[must_use]
    pub fn night_color_temperature(&self) -> i16 {
        self.night_color_temperature
    }

    /// Sets the night color temperature, clamped to the schema bounds.
    pub fn set_night_color_temperature(&mut self, kelvin: i16, schema: &Schema) -> &mut Self {
        let clamped = schema.color_temperature.clamp(i32::from(kelvin));
        // Clamped into i16 range by the schema bounds.
        #[allow(clippy::cast_possible_truncation)]
        {
            self.night_color_temperature = clamped as i16;
        }
        self
    }

    /// The fixed day color temperature from the schema.
    #[must_use]
    pub fn day_color_temperature(schema: &Schema) -> i16 {
        schema.day_color_temperature()
    }

    /// Whether an external UI is live-previewing a color temperature.
    ///
    /// Set by the store while the system settings page drags the
    /// temperature slider; never set locally.
    #[must_use]
    pub fn is_adjusting_color_temperature(&self) -> bool {
        self.adjusting_color_temperature
    }
}

impl Payload for Settings {
    fn key_path(schema: &Schema) -> &str {
        schema.settings_key()
    }

    fn reset(schema: &Schema) -> Self {
        Self {
            enabled: schema.default_enabled,
            on_sun_schedule: schema.default_on_sun_schedule,
            manual_schedule_start: Time::reset(schema),
            manual_schedule_end: Time::reset(schema),
            sun_schedule_start: Time::reset(schema),
            sun_schedule_end: Time::reset(schema),
            night_color_temperature: schema.day_color_temperature(),
            adjusting_color_temperature: false,
        }
    }

    fn encode_body(&self, writer: &mut BodyWriter) {
        writer.write_bool(F_ENABLED, self.enabled);
        writer.write_bool(F_ON_SUN_SCHEDULE, self.on_sun_schedule);
        writer.write_int(
            F_NIGHT_COLOR_TEMPERATURE,
            i64::from(self.night_color_temperature),
        );
        self.manual_schedule_start.encode(writer, F_MANUAL_START);
        self.manual_schedule_end.encode(writer, F_MANUAL_END);
        self.sun_schedule_start.encode(writer, F_SUN_START);
        self.sun_schedule_end.encode(writer, F_SUN_END);
        writer.write_bool(F_ADJUSTING, self.adjusting_color_temperature);
    }

    fn decode_body(reader: &mut BodyReader<'_>, schema: &Schema) -> Result<Self, CodecError> {
        let mut settings = Self::reset(schema);
        while let Some((id, wire)) = reader.next_field()? {
            match (id, wire) {
                (F_ENABLED, WireType::Bool) => settings.enabled = reader.read_bool()?,
                (F_ON_SUN_SCHEDULE, WireType::Bool) => {
                    settings.on_sun_schedule = reader.read_bool()?;
                }
                (F_NIGHT_COLOR_TEMPERATURE, WireType::VarInt) => {
                    let kelvin = reader.read_int()?.clamp(i64::from(i16::MIN), i64::from(i16::MAX));
                    #[allow(clippy::cast_possible_truncation)]
                    settings.set_night_color_temperature(kelvin as i16, schema);
                }
                (F_MANUAL_START, WireType::Struct) => {
                    settings.manual_schedule_start = Time::decode(reader, schema)?;
                }
                (F_MANUAL_END, WireType::Struct) => {
                    settings.manual_schedule_end = Time::decode(reader, schema)?;
                }
                (F_SUN_START, WireType::Struct) => {
                    settings.sun_schedule_start = Time::decode(reader, schema)?;
                }
                (F_SUN_END, WireType::Struct) => {
                    settings.sun_schedule_end = Time::decode(reader, schema)?;
                }
                (F_ADJUSTING, WireType::Bool) => {
                    settings.adjusting_color_temperature = reader.read_bool()?;
                }
                (_, wire) => reader.skip(wire)?,
            }
        }
        Ok(settings)
    }
}
