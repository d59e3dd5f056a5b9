// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `NightLight` Lib - A Rust library to observe and control a night light
//! display toggle backed by an observable key/value store.
//!
//! The night light records live in an external store that other processes
//! mutate at any time. This library keeps a local, dirty-tracked mirror of
//! those records, watches the store for changes without polling, and on each
//! observed change classifies whether it was user-initiated or automatic,
//! deriving the smoothing window over which the reported color temperature
//! transitions.
//!
//! # Components
//!
//! - [`ObservableStore`]: the store abstraction — get/put binary values
//!   under key paths, plus per-key change subscriptions. [`MemoryStore`] is
//!   the in-process implementation used in tests and examples; production
//!   embedders supply their own (e.g. a registry adapter).
//! - [`Repository`]: one typed record (header, metadata, payload) with
//!   dirty-tracking and a boolean load/save contract.
//! - [`Watcher`]: a background task multi-waiting on store subscriptions,
//!   with pause/resume gating for self-induced saves.
//! - [`NightLight`]: the facade owning the records and watchers, the change
//!   classification, and the smoothed color temperature.
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use nightlight_lib::{MemoryStore, NightLight, Schema, Time};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let store = Arc::new(MemoryStore::new());
//!     let schema = Schema::with_keys("demo\\settings", "demo\\state");
//!     let light = NightLight::with_schema(store, schema.clone());
//!
//!     light
//!         .enable()
//!         .set_start_time(Time::new(20, 0, &schema))
//!         .set_end_time(Time::new(6, 30, &schema))
//!         .set_night_color_temperature(3400);
//!     assert!(light.save(true).await);
//! }
//! ```
//!
//! # Watching for External Changes
//!
//! ```no_run
//! use std::sync::Arc;
//! use nightlight_lib::{MemoryStore, NightLight};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Arc::new(MemoryStore::new());
//!     let light = NightLight::new(store);
//!
//!     light
//!         .start_watching(|light| {
//!             println!(
//!                 "running={} smoothing={:?}",
//!                 light.is_running(),
//!                 light.smoothening_duration()
//!             );
//!         })
//!         .await;
//!
//!     // ... the callback fires on every external store change ...
//!     light.stop_watching().await;
//! }
//! ```

pub mod error;
mod night_light;
pub mod record;
mod schema;
mod settings;
mod state;
pub mod store;
mod types;
mod watcher;

pub use error::{CodecError, Error, Result, StoreError, WatchError};
pub use night_light::{CORRELATION_WINDOW, NightLight, Policy, SmootheningDuration};
pub use record::{Header, Metadata, Repository};
pub use schema::{FieldBounds, Schema, VALUE_NAME};
pub use settings::Settings;
pub use state::{State, Status, Trigger};
pub use store::{MemoryStore, ObservableStore};
pub use types::Time;
pub use watcher::Watcher;
