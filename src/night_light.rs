// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The night light reconciliation engine.
//!
//! [`NightLight`] owns the settings and state records (plus a backup pair)
//! and two background [`Watcher`]s, and reconciles every externally observed
//! store change: it classifies the change as user-initiated or automatic by
//! temporal correlation, and derives the smoothing window over which the
//! reported color temperature interpolates instead of snapping.
//!
//! # Classification
//!
//! The store gives no causality between the settings and state records, and
//! the two watchers deliver on independent tasks in no guaranteed order. The
//! engine therefore correlates by time: a status flip observed within
//! [`CORRELATION_WINDOW`] of a settings edit is attributed to that edit and
//! smoothed over [`SmootheningDuration::Short`]; an uncorrelated flip (a
//! scheduled switch) gets [`SmootheningDuration::Long`] unless the store
//! itself tags it as manually triggered.
//!
//! # Handles
//!
//! `NightLight` is a cheap clonable handle over shared inner state. The
//! watcher callback receives its own handle, so observers never touch the
//! records without going through the engine's bookkeeping.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, mpsc};

use crate::record::{Repository, filetime_now};
use crate::schema::Schema;
use crate::settings::Settings;
use crate::state::State;
use crate::store::ObservableStore;
use crate::types::Time;
use crate::watcher::Watcher;

const CORRELATION_WINDOW_MS: u64 = 100;

/// Window within which a settings edit and a status change are considered
/// causally linked.
pub const CORRELATION_WINDOW: std::time::Duration =
    std::time::Duration::from_millis(CORRELATION_WINDOW_MS);

/// Sentinel for "no change recorded yet" in the millisecond timestamps.
const NEVER: u64 = u64::MAX;

/// How long a status transition's reported color temperature interpolates
/// before snapping to the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmootheningDuration {
    /// No observed transition; report the target outright.
    None,
    /// Near-instant transition for user-initiated flips.
    Short,
    /// Slow transition for scheduled, automatic flips.
    Long,
}

impl SmootheningDuration {
    /// The duration in milliseconds.
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        match self {
            Self::None => 0,
            Self::Short => 2_000,
            Self::Long => 120_000,
        }
    }
}

/// Behavior knobs the engine leaves to the embedder.
///
/// The defaults reproduce the stock behavior of the system feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    /// Whether [`NightLight::enable`] also resumes the feature when the
    /// current time lies inside the active schedule.
    pub resume_on_enable_within_range: bool,
    /// Whether a live color-temperature preview counts as "enabled" for
    /// support probing.
    pub preview_counts_as_enabled: bool,
    /// Whether [`NightLight::save`] attributes the state's trigger only
    /// when the saved state aligns with the schedule; when off, every save
    /// re-derives the trigger from usability.
    pub save_requires_schedule_alignment: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            resume_on_enable_within_range: false,
            preview_counts_as_enabled: true,
            save_requires_schedule_alignment: false,
        }
    }
}

/// Which record a watcher observed a change on.
enum ChangedRecord {
    Settings,
    State,
}

/// The two lazily created watchers, one per record key.
#[derive(Default)]
struct WatchState {
    settings: Option<Watcher>,
    state: Option<Watcher>,
}

struct Inner {
    store: Arc<dyn ObservableStore>,
    schema: Arc<Schema>,
    policy: Policy,
    settings: Mutex<Repository<Settings>>,
    state: Mutex<Repository<State>>,
    backup_settings: Mutex<Repository<Settings>>,
    backup_state: Mutex<Repository<State>>,
    status_changed: AtomicBool,
    settings_changed: AtomicBool,
    adjusting_changed: AtomicBool,
    /// Milliseconds since `epoch`, `NEVER` until the first recorded change.
    last_status_change: AtomicU64,
    last_settings_change: AtomicU64,
    epoch: Instant,
    watch: AsyncMutex<WatchState>,
}

/// The night light engine: records, watchers, and change classification.
///
/// Cloning yields another handle to the same engine.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use nightlight_lib::{MemoryStore, NightLight, Schema};
///
/// let store = Arc::new(MemoryStore::new());
/// let light = NightLight::with_schema(store, Schema::with_keys("t\\settings", "t\\state"));
/// light.enable().set_night_color_temperature(3400);
/// assert!(light.is_enabled());
/// assert_eq!(light.night_color_temperature(), 3400);
/// ```
#[derive(Clone)]
pub struct NightLight {
    inner: Arc<Inner>,
}

impl NightLight {
    /// Creates an engine over the given store with the Windows schema and
    /// default policy, snapshots the backup pair, and performs the initial
    /// load with classification suppressed.
    #[must_use]
    pub fn new(store: Arc<dyn ObservableStore>) -> Self {
        Self::with_policy(store, Schema::windows(), Policy::default())
    }

    /// Creates an engine with a custom schema and the default policy.
    #[must_use]
    pub fn with_schema(store: Arc<dyn ObservableStore>, schema: Schema) -> Self {
        Self::with_policy(store, schema, Policy::default())
    }

    /// Creates an engine with a custom schema and policy.
    #[must_use]
    pub fn with_policy(store: Arc<dyn ObservableStore>, schema: Schema, policy: Policy) -> Self {
        let schema = Arc::new(schema);
        let inner = Arc::new(Inner {
            settings: Mutex::new(Repository::new(Arc::clone(&store), Arc::clone(&schema))),
            state: Mutex::new(Repository::new(Arc::clone(&store), Arc::clone(&schema))),
            backup_settings: Mutex::new(Repository::new(Arc::clone(&store), Arc::clone(&schema))),
            backup_state: Mutex::new(Repository::new(Arc::clone(&store), Arc::clone(&schema))),
            store,
            schema,
            policy,
            status_changed: AtomicBool::new(false),
            settings_changed: AtomicBool::new(false),
            adjusting_changed: AtomicBool::new(false),
            last_status_change: AtomicU64::new(NEVER),
            last_settings_change: AtomicU64::new(NEVER),
            epoch: Instant::now(),
            watch: AsyncMutex::new(WatchState::default()),
        });
        let light = Self { inner };
        light.backup();
        light.load(true);
        light
    }

    /// Probes whether the store carries loadable night light records, with
    /// the Windows schema and default policy.
    ///
    /// With `check_enabled`, additionally requires the feature to be
    /// enabled, running, or live-previewing a color temperature.
    #[must_use]
    pub fn is_supported(store: Arc<dyn ObservableStore>, check_enabled: bool) -> bool {
        Self::is_supported_with(store, Schema::windows(), Policy::default(), check_enabled)
    }

    /// [`is_supported`](Self::is_supported) with a custom schema and policy.
    #[must_use]
    pub fn is_supported_with(
        store: Arc<dyn ObservableStore>,
        schema: Schema,
        policy: Policy,
        check_enabled: bool,
    ) -> bool {
        let schema = Arc::new(schema);
        let mut settings: Repository<Settings> =
            Repository::new(Arc::clone(&store), Arc::clone(&schema));
        let mut state: Repository<State> = Repository::new(store, schema);
        if !settings.load() || !state.load() {
            return false;
        }
        if !check_enabled {
            return true;
        }
        settings.payload().is_enabled()
            || state.payload().is_running()
            || (policy.preview_counts_as_enabled
                && settings.payload().is_adjusting_color_temperature())
    }

    /// The engine's policy.
    #[must_use]
    pub fn policy(&self) -> Policy {
        self.inner.policy
    }

    // --- mutators -------------------------------------------------------

    /// Enables the feature. Per policy, may also resume it when the current
    /// time lies inside the active schedule.
    pub fn enable(&self) -> &Self {
        let within = {
            let mut repo = self.inner.settings.lock();
            let payload = repo.payload_mut();
            payload.set_enabled(true);
            Time::now(&self.inner.schema).within(payload.start_time(), payload.end_time())
        };
        if self.inner.policy.resume_on_enable_within_range && within {
            self.resume();
        }
        self
    }

    /// Disables the feature.
    pub fn disable(&self) -> &Self {
        self.inner.settings.lock().payload_mut().set_enabled(false);
        self
    }

    /// Marks the feature running.
    pub fn resume(&self) -> &Self {
        self.inner.state.lock().payload_mut().resume();
        self
    }

    /// Marks the feature stopped.
    pub fn pause(&self) -> &Self {
        self.inner.state.lock().payload_mut().pause();
        self
    }

    /// Switches to the sun schedule.
    pub fn use_sun_schedule(&self) -> &Self {
        self.inner
            .settings
            .lock()
            .payload_mut()
            .set_on_sun_schedule(true);
        self
    }

    /// Switches to the manual schedule.
    pub fn use_manual_schedule(&self) -> &Self {
        self.inner
            .settings
            .lock()
            .payload_mut()
            .set_on_sun_schedule(false);
        self
    }

    /// Sets the manual schedule start time and forces the manual schedule.
    pub fn set_start_time(&self, time: Time) -> &Self {
        let mut repo = self.inner.settings.lock();
        repo.payload_mut()
            .set_on_sun_schedule(false)
            .set_start_time(time);
        self
    }

    /// Sets the manual schedule end time and forces the manual schedule.
    pub fn set_end_time(&self, time: Time) -> &Self {
        let mut repo = self.inner.settings.lock();
        repo.payload_mut()
            .set_on_sun_schedule(false)
            .set_end_time(time);
        self
    }

    /// Sets the night color temperature, clamped to the schema bounds.
    pub fn set_night_color_temperature(&self, kelvin: i16) -> &Self {
        let mut repo = self.inner.settings.lock();
        repo.payload_mut()
            .set_night_color_temperature(kelvin, &self.inner.schema);
        self
    }

    /// Marks the feature unusable, which hides it from the system UI.
    pub fn disable_system_ui(&self) -> &Self {
        self.inner.state.lock().payload_mut().set_usable(false);
        self
    }

    // --- accessors ------------------------------------------------------

    /// Whether the feature is enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.inner.settings.lock().payload().is_enabled()
    }

    /// Whether the feature is actively running and usable.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.state.lock().payload().is_running()
    }

    /// Whether the host currently permits toggling the feature.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.inner.state.lock().payload().is_usable()
    }

    /// Whether the store tags the last status change as user-caused.
    #[must_use]
    pub fn was_manually_triggered(&self) -> bool {
        self.inner.state.lock().payload().was_manually_triggered()
    }

    /// Whether the sun schedule is active.
    #[must_use]
    pub fn is_on_sun_schedule(&self) -> bool {
        self.inner.settings.lock().payload().is_on_sun_schedule()
    }

    /// Start time of the active schedule.
    #[must_use]
    pub fn start_time(&self) -> Time {
        self.inner.settings.lock().payload().start_time()
    }

    /// End time of the active schedule.
    #[must_use]
    pub fn end_time(&self) -> Time {
        self.inner.settings.lock().payload().end_time()
    }

    /// Whether the current wall-clock time lies inside the active schedule.
    #[must_use]
    pub fn is_within_time_range(&self) -> bool {
        let repo = self.inner.settings.lock();
        let payload = repo.payload();
        Time::now(&self.inner.schema).within(payload.start_time(), payload.end_time())
    }

    /// Whether the last load observed a running-status transition.
    #[must_use]
    pub fn did_status_change(&self) -> bool {
        self.inner.status_changed.load(Ordering::SeqCst)
    }

    /// Whether the last load observed an uncorrelated settings edit.
    #[must_use]
    pub fn did_settings_change(&self) -> bool {
        self.inner.settings_changed.load(Ordering::SeqCst)
    }

    /// Whether the last load observed the preview flag toggling.
    #[must_use]
    pub fn did_adjusting_color_temperature_change(&self) -> bool {
        self.inner.adjusting_changed.load(Ordering::SeqCst)
    }

    /// Whether an external UI is live-previewing a color temperature.
    #[must_use]
    pub fn is_adjusting_color_temperature(&self) -> bool {
        self.inner
            .settings
            .lock()
            .payload()
            .is_adjusting_color_temperature()
    }

    /// The fixed day color temperature.
    #[must_use]
    pub fn day_color_temperature(&self) -> i16 {
        self.inner.schema.day_color_temperature()
    }

    /// The configured night color temperature.
    #[must_use]
    pub fn night_color_temperature(&self) -> i16 {
        self.inner.settings.lock().payload().night_color_temperature()
    }

    /// The current target color temperature: night while running, day
    /// otherwise.
    #[must_use]
    pub fn color_temperature(&self) -> i16 {
        if self.is_running() {
            self.night_color_temperature()
        } else {
            self.day_color_temperature()
        }
    }

    // --- classification -------------------------------------------------

    /// The smoothing window for the last observed transition.
    ///
    /// `Short` when the status flip correlates with a settings edit or the
    /// store tags it manual, `Long` for an uncorrelated (scheduled) flip,
    /// `None` when no transition was observed.
    #[must_use]
    pub fn smoothening_duration(&self) -> SmootheningDuration {
        if !self.did_status_change() {
            return SmootheningDuration::None;
        }
        if self.did_settings_change() || self.was_manually_triggered() {
            SmootheningDuration::Short
        } else {
            SmootheningDuration::Long
        }
    }

    /// The color temperature to present right now: the target once the
    /// smoothing window has elapsed, otherwise a linear interpolation from
    /// the previous endpoint toward the target.
    #[must_use]
    pub fn smoothened_color_temperature(&self) -> i16 {
        let to = self.color_temperature();
        let duration = self.smoothening_duration().as_millis();
        let since = self.inner.last_status_change.load(Ordering::SeqCst);
        if duration == 0 || since == NEVER {
            return to;
        }
        let elapsed = self.inner.now_ms().saturating_sub(since);
        if elapsed >= duration {
            return to;
        }
        let from = if self.is_running() {
            self.day_color_temperature()
        } else {
            self.night_color_temperature()
        };
        interpolate(from, to, elapsed, duration)
    }

    // --- persistence ----------------------------------------------------

    /// Reloads both records from the store, settings first.
    ///
    /// With `ignore_status_change` the reload skips all classification
    /// bookkeeping; used for the construction-time load. Returns whether
    /// both records loaded.
    pub fn load(&self, ignore_status_change: bool) -> bool {
        let settings = self.inner.load_settings(!ignore_status_change);
        let state = self.inner.load_state(!ignore_status_change);
        settings && state
    }

    /// Persists both records.
    ///
    /// With `dont_trigger` the engine's own watchers are paused around the
    /// writes so the save does not observe itself. A dirty state record is
    /// stamped before writing. Returns whether both records persisted.
    pub async fn save(&self, dont_trigger: bool) -> bool {
        let watch = if dont_trigger {
            Some(self.inner.watch.lock().await)
        } else {
            None
        };
        if let Some(watch) = &watch {
            if let Some(watcher) = &watch.settings {
                watcher.pause();
            }
            if let Some(watcher) = &watch.state {
                watcher.pause();
            }
        }

        let saved = self.inner.persist();

        if let Some(watch) = &watch {
            if let Some(watcher) = &watch.settings {
                watcher.resume().await;
            }
            if let Some(watcher) = &watch.state {
                watcher.resume().await;
            }
        }
        saved
    }

    /// Snapshots both records into the backup pair.
    ///
    /// Each backup is tagged dirty exactly when its snapshot load
    /// succeeded, so a later [`restore`](Self::restore) writes only valid
    /// snapshots.
    pub fn backup(&self) {
        let mut repo = self.inner.backup_settings.lock();
        let loaded = repo.load();
        repo.set_dirty(loaded);
        drop(repo);

        let mut repo = self.inner.backup_state.lock();
        let loaded = repo.load();
        repo.set_dirty(loaded);
    }

    /// Writes the backup snapshots back to the store and reloads.
    ///
    /// Backups whose snapshot never loaded are clean and skipped, leaving
    /// the store untouched for that record. Returns whether both backups
    /// persisted.
    pub fn restore(&self) -> bool {
        let settings = self.inner.backup_settings.lock().save();
        let state = {
            let mut repo = self.inner.backup_state.lock();
            if repo.is_dirty() {
                repo.payload_mut().stamp(filetime_now(), true);
            }
            repo.save()
        };
        self.load(false);
        settings && state
    }

    // --- watching -------------------------------------------------------

    /// Starts watching both record keys.
    ///
    /// Each observed change reloads just the changed record with full
    /// classification bookkeeping and then invokes `callback` with a handle
    /// to this engine, from a single consumer task. Restartable; an already
    /// watching engine is restarted in place.
    pub async fn start_watching<F>(&self, callback: F)
    where
        F: Fn(&NightLight) + Send + Sync + 'static,
    {
        let inner = &self.inner;
        let mut watch = inner.watch.lock().await;

        let (tx, mut rx) = mpsc::unbounded_channel::<ChangedRecord>();
        // The consumer holds a weak handle so an engine dropped mid-watch
        // tears the task down instead of leaking a reference cycle.
        let weak = Arc::downgrade(inner);
        tokio::spawn(async move {
            while let Some(changed) = rx.recv().await {
                let Some(inner) = weak.upgrade() else { break };
                match changed {
                    ChangedRecord::Settings => {
                        inner.load_settings(true);
                    }
                    ChangedRecord::State => {
                        inner.load_state(true);
                    }
                }
                callback(&NightLight { inner });
            }
        });

        let watcher = watch
            .settings
            .get_or_insert_with(|| Watcher::new(Arc::clone(&inner.store)));
        let settings_tx = tx.clone();
        watcher
            .start(vec![inner.schema.settings_key().to_string()], move |_| {
                let _ = settings_tx.send(ChangedRecord::Settings);
            })
            .await;

        let watcher = watch
            .state
            .get_or_insert_with(|| Watcher::new(Arc::clone(&inner.store)));
        watcher
            .start(vec![inner.schema.state_key().to_string()], move |_| {
                let _ = tx.send(ChangedRecord::State);
            })
            .await;
    }

    /// Stops both watchers and the consumer task. No-op when not watching.
    pub async fn stop_watching(&self) {
        let mut watch = self.inner.watch.lock().await;
        if let Some(watcher) = watch.settings.as_mut() {
            watcher.stop().await;
        }
        if let Some(watcher) = watch.state.as_mut() {
            watcher.stop().await;
        }
    }

    /// Whether either record watcher is running.
    pub async fn is_watching(&self) -> bool {
        let watch = self.inner.watch.lock().await;
        watch.settings.as_ref().is_some_and(Watcher::is_watching)
            || watch.state.as_ref().is_some_and(Watcher::is_watching)
    }
}

impl std::fmt::Debug for NightLight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NightLight")
            .field("enabled", &self.is_enabled())
            .field("running", &self.is_running())
            .field("status_changed", &self.did_status_change())
            .field("settings_changed", &self.did_settings_change())
            .finish_non_exhaustive()
    }
}

impl Inner {
    /// Milliseconds since the engine's epoch, kept clear of the sentinel.
    fn now_ms(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(NEVER - 1)
    }

    /// Reloads the settings record, classifying the observed diff.
    ///
    /// A payload diff further than the correlation window from the previous
    /// settings change marks `settings_changed` and un-marks
    /// `status_changed` (a settings-caused edit is not also an independent
    /// status transition). A preview-flag diff marks `adjusting_changed`.
    fn load_settings(&self, classify: bool) -> bool {
        let mut repo = self.settings.lock();
        let before = repo.payload().clone();
        if !repo.load() {
            return false;
        }
        let after = repo.payload().clone();
        drop(repo);

        if !classify {
            return true;
        }
        if after.is_adjusting_color_temperature() != before.is_adjusting_color_temperature() {
            self.adjusting_changed.store(true, Ordering::SeqCst);
        }
        if after != before {
            let now = self.now_ms();
            let last = self.last_settings_change.load(Ordering::SeqCst);
            if last == NEVER || now.saturating_sub(last) > CORRELATION_WINDOW_MS {
                self.settings_changed.store(true, Ordering::SeqCst);
                self.status_changed.store(false, Ordering::SeqCst);
            }
            self.last_settings_change.store(now, Ordering::SeqCst);
        }
        true
    }

    /// Reloads the state record, classifying the observed diff.
    ///
    /// A running-status flip marks `status_changed` and clears
    /// `adjusting_changed`; when the flip falls outside the correlation
    /// window after the last settings edit, `settings_changed` is cleared
    /// too, as the flip cannot be attributed to that edit.
    fn load_state(&self, classify: bool) -> bool {
        let mut repo = self.state.lock();
        let before_running = repo.payload().is_running();
        if !repo.load() {
            return false;
        }
        let after_running = repo.payload().is_running();
        drop(repo);

        if !classify {
            return true;
        }
        if after_running == before_running {
            self.status_changed.store(false, Ordering::SeqCst);
            return true;
        }
        let now = self.now_ms();
        self.status_changed.store(true, Ordering::SeqCst);
        self.last_status_change.store(now, Ordering::SeqCst);
        self.adjusting_changed.store(false, Ordering::SeqCst);

        let last_settings = self.last_settings_change.load(Ordering::SeqCst);
        if last_settings == NEVER || now.saturating_sub(last_settings) > CORRELATION_WINDOW_MS {
            self.settings_changed.store(false, Ordering::SeqCst);
        }
        true
    }

    /// Saves both records, stamping a dirty state record first.
    fn persist(&self) -> bool {
        let (enabled, within) = {
            let repo = self.settings.lock();
            let payload = repo.payload();
            let within =
                Time::now(&self.schema).within(payload.start_time(), payload.end_time());
            (payload.is_enabled(), within)
        };
        let settings = self.settings.lock().save();

        let mut repo = self.state.lock();
        let state = if repo.is_dirty() {
            let attribute = if self.policy.save_requires_schedule_alignment {
                let payload = repo.payload();
                payload.is_running() || (enabled && within && payload.is_usable())
            } else {
                true
            };
            repo.payload_mut().stamp(filetime_now(), attribute);
            repo.save()
        } else {
            true
        };
        settings && state
    }
}

/// Linear interpolation from `from` toward `to`, rounded.
fn interpolate(from: i16, to: i16, elapsed_ms: u64, duration_ms: u64) -> i16 {
    #[allow(clippy::cast_precision_loss)]
    let fraction = elapsed_ms as f64 / duration_ms as f64;
    let value = f64::from(from) + f64::from(to - from) * fraction;
    // The endpoints bound the result, so it fits an i16.
    #[allow(clippy::cast_possible_truncation)]
    {
        value.round() as i16
    }
}
