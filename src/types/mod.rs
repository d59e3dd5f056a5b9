// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Value types for the night light records.
//!
//! - [`Time`] - Schedule time of day, clamped to the schema's hour and
//!   minute bounds, with a midnight-wrapping range test.

mod time;

pub use time::Time;
