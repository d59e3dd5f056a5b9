// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Schema metadata for the persisted night light records.
//!
//! The store blobs are described by an external schema: each field carries
//! default/min/max attributes and each record type carries the key path it
//! lives under. This module models that schema as a plain, injectable value
//! so the rest of the library never reaches for a hidden global.
//!
//! [`Schema::windows`] carries the real CloudStore key paths and bounds used
//! by the OS night light feature, and is the default. Tests and non-Windows
//! consumers can construct their own [`Schema`] with different key paths.

use serde::{Deserialize, Serialize};

/// Default/min/max metadata for one schema field.
///
/// # Examples
///
/// ```
/// use nightlight_lib::FieldBounds;
///
/// let hours = FieldBounds::new(0, 23, 0);
/// assert_eq!(hours.clamp(30), 23);
/// assert_eq!(hours.clamp(-4), 0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldBounds {
    /// Minimum allowed value.
    pub min: i32,
    /// Maximum allowed value.
    pub max: i32,
    /// Default value used when the field is absent from a stored record.
    pub default: i32,
}

impl FieldBounds {
    /// Creates bounds with the given minimum, maximum, and default.
    #[must_use]
    pub const fn new(min: i32, max: i32, default: i32) -> Self {
        Self { min, max, default }
    }

    /// Clamps a value into `[min, max]`.
    #[must_use]
    pub fn clamp(&self, value: i32) -> i32 {
        value.clamp(self.min, self.max)
    }
}

/// Key path of the settings record under the Windows CloudStore.
const WINDOWS_SETTINGS_KEY: &str = "Software\\Microsoft\\Windows\\CurrentVersion\\CloudStore\\Store\\DefaultAccount\\Current\\default$windows.data.bluelightreduction.settings\\windows.data.bluelightreduction.settings";

/// Key path of the state record under the Windows CloudStore.
const WINDOWS_STATE_KEY: &str = "Software\\Microsoft\\Windows\\CurrentVersion\\CloudStore\\Store\\DefaultAccount\\Current\\default$windows.data.bluelightreduction.bluelightreductionstate\\windows.data.bluelightreduction.bluelightreductionstate";

/// The fixed name of the binary value under each record's key path.
pub const VALUE_NAME: &str = "Data";

/// Schema provider for the settings and state records.
///
/// Supplies the key paths the records live under and the validation bounds
/// the payload setters clamp against. The facade and every
/// [`Repository`](crate::Repository) hold a shared `Arc<Schema>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    settings_key: String,
    state_key: String,
    /// Bounds for schedule hours.
    pub hours: FieldBounds,
    /// Bounds for schedule minutes.
    pub minutes: FieldBounds,
    /// Bounds for the night color temperature in Kelvin. The default value
    /// doubles as the fixed day color temperature.
    pub color_temperature: FieldBounds,
    /// Default for the settings `enabled` field.
    pub default_enabled: bool,
    /// Default for the settings `on_sun_schedule` field.
    pub default_on_sun_schedule: bool,
    /// Default for the state `usable` field.
    pub default_usable: bool,
}

impl Schema {
    /// Schema matching the Windows night light CloudStore records.
    #[must_use]
    pub fn windows() -> Self {
        Self {
            settings_key: WINDOWS_SETTINGS_KEY.to_string(),
            state_key: WINDOWS_STATE_KEY.to_string(),
            hours: FieldBounds::new(0, 23, 0),
            minutes: FieldBounds::new(0, 59, 0),
            color_temperature: FieldBounds::new(1200, 6500, 6500),
            default_enabled: false,
            default_on_sun_schedule: false,
            default_usable: true,
        }
    }

    /// Schema with custom key paths and the standard field bounds.
    ///
    /// Useful for tests and for stores that namespace the records
    /// differently.
    #[must_use]
    pub fn with_keys(settings_key: impl Into<String>, state_key: impl Into<String>) -> Self {
        Self {
            settings_key: settings_key.into(),
            state_key: state_key.into(),
            ..Self::windows()
        }
    }

    /// Key path of the settings record.
    #[must_use]
    pub fn settings_key(&self) -> &str {
        &self.settings_key
    }

    /// Key path of the state record.
    #[must_use]
    pub fn state_key(&self) -> &str {
        &self.state_key
    }

    /// The day color temperature, a fixed schema constant.
    #[must_use]
    pub fn day_color_temperature(&self) -> i16 {
        // The schema default fits in i16 for any sane bounds set.
        #[allow(clippy::cast_possible_truncation)]
        {
            self.color_temperature.default as i16
        }
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::windows()
    }
}
