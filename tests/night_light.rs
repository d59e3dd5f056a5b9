// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Integration tests for the night light engine over an in-memory store.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use nightlight_lib::record::Payload;
use nightlight_lib::{
    MemoryStore, NightLight, ObservableStore, Repository, Schema, Settings, SmootheningDuration,
    State, Time,
};
use tokio::time::sleep;

fn store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new())
}

fn schema() -> Schema {
    Schema::with_keys("it\\settings", "it\\state")
}

fn light(store: &Arc<MemoryStore>) -> NightLight {
    NightLight::with_schema(Arc::clone(store) as Arc<dyn ObservableStore>, schema())
}

/// Mutates a record in the store directly, simulating an external writer
/// such as the system settings page.
fn write_record<P, F>(store: &Arc<MemoryStore>, mutate: F)
where
    P: Payload,
    F: FnOnce(&mut P, &Schema),
{
    let schema = Arc::new(schema());
    let mut repo: Repository<P> = Repository::new(
        Arc::clone(store) as Arc<dyn ObservableStore>,
        Arc::clone(&schema),
    );
    repo.load();
    mutate(repo.payload_mut(), &schema);
    assert!(repo.save());
}

async fn wait_until(check: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    check()
}

// ============================================================================
// Persistence
// ============================================================================

mod persistence {
    use super::*;

    #[tokio::test]
    async fn saved_configuration_is_visible_to_a_fresh_engine() {
        let store = store();
        let schema = schema();

        let light = light(&store);
        light
            .enable()
            .set_start_time(Time::new(20, 0, &schema))
            .set_end_time(Time::new(6, 30, &schema))
            .set_night_color_temperature(3400)
            .resume();
        assert!(light.save(true).await);

        let reloaded = super::light(&store);
        assert!(reloaded.is_enabled());
        assert!(reloaded.is_running());
        assert!(!reloaded.is_on_sun_schedule());
        assert_eq!(reloaded.start_time(), Time::new(20, 0, &schema));
        assert_eq!(reloaded.end_time(), Time::new(6, 30, &schema));
        assert_eq!(reloaded.night_color_temperature(), 3400);
        // The save stamped the state record.
        assert!(reloaded.was_manually_triggered());
    }

    #[tokio::test]
    async fn clean_engine_save_writes_nothing() {
        let store = store();
        let light = light(&store);
        assert!(light.save(true).await);
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn failed_write_reports_and_retries() {
        let store = store();
        let light = light(&store);
        light.enable();

        store.set_fail_writes(true);
        assert!(!light.save(true).await);

        // The record stayed dirty, so the retry persists it.
        store.set_fail_writes(false);
        assert!(light.save(true).await);
        assert!(super::light(&store).is_enabled());
    }

    #[tokio::test]
    async fn load_reflects_external_edits() {
        let store = store();
        let light = light(&store);
        assert!(!light.is_enabled());

        write_record::<Settings, _>(&store, |settings, schema| {
            settings
                .set_enabled(true)
                .set_night_color_temperature(2700, schema);
        });
        write_record::<State, _>(&store, |_, _| {});
        assert!(light.load(false));
        assert!(light.is_enabled());
        assert_eq!(light.night_color_temperature(), 2700);
        assert!(light.did_settings_change());
    }
}

// ============================================================================
// Backup and restore
// ============================================================================

mod backup_restore {
    use super::*;

    #[tokio::test]
    async fn restore_reverts_later_external_edits() {
        let store = store();
        write_record::<Settings, _>(&store, |settings, schema| {
            settings.set_night_color_temperature(3000, schema);
        });
        write_record::<State, _>(&store, |_, _| {});

        // Construction snapshots the backup pair.
        let light = light(&store);
        assert_eq!(light.night_color_temperature(), 3000);

        write_record::<Settings, _>(&store, |settings, schema| {
            settings.set_enabled(true).set_night_color_temperature(1200, schema);
        });
        light.load(false);
        assert_eq!(light.night_color_temperature(), 1200);

        assert!(light.restore());
        assert_eq!(light.night_color_temperature(), 3000);
        assert!(!light.is_enabled());
    }

    #[tokio::test]
    async fn restore_without_valid_backup_leaves_store_untouched() {
        let store = store();
        // Nothing to snapshot at construction time.
        let light = light(&store);

        write_record::<Settings, _>(&store, |settings, _| {
            settings.set_enabled(true);
        });
        let writes_before = store.write_count();

        assert!(light.restore());
        assert_eq!(store.write_count(), writes_before);
        // The external edit survives the no-op restore.
        assert!(light.is_enabled());
    }
}

// ============================================================================
// Watching
// ============================================================================

mod watching {
    use super::*;

    #[tokio::test]
    async fn external_change_reloads_and_notifies() {
        let store = store();
        let light = light(&store);
        let hits = Arc::new(AtomicUsize::new(0));

        let counted = Arc::clone(&hits);
        light
            .start_watching(move |observed| {
                assert!(observed.is_enabled());
                counted.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        assert!(light.is_watching().await);

        write_record::<Settings, _>(&store, |settings, _| {
            settings.set_enabled(true);
        });
        assert!(wait_until(|| hits.load(Ordering::SeqCst) == 1).await);

        // The engine reloaded before notifying.
        assert!(light.is_enabled());
        assert!(light.did_settings_change());

        light.stop_watching().await;
        assert!(!light.is_watching().await);
    }

    #[tokio::test]
    async fn own_save_does_not_notify() {
        let store = store();
        let light = light(&store);
        let hits = Arc::new(AtomicUsize::new(0));

        let counted = Arc::clone(&hits);
        light
            .start_watching(move |_| {
                counted.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        light.enable().set_night_color_temperature(2700).resume();
        assert!(light.save(true).await);

        sleep(Duration::from_millis(100)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        // External changes after the save still arrive.
        write_record::<Settings, _>(&store, |settings, _| {
            settings.set_enabled(false);
        });
        assert!(wait_until(|| hits.load(Ordering::SeqCst) >= 1).await);

        light.stop_watching().await;
    }

    #[tokio::test]
    async fn save_without_suppression_notifies() {
        let store = store();
        let light = light(&store);
        let hits = Arc::new(AtomicUsize::new(0));

        let counted = Arc::clone(&hits);
        light
            .start_watching(move |_| {
                counted.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        light.enable();
        assert!(light.save(false).await);
        assert!(wait_until(|| hits.load(Ordering::SeqCst) >= 1).await);

        light.stop_watching().await;
    }

    #[tokio::test]
    async fn uncorrelated_status_flip_classifies_long_through_the_watcher() {
        let store = store();
        let light = light(&store);
        let hits = Arc::new(AtomicUsize::new(0));

        let counted = Arc::clone(&hits);
        light
            .start_watching(move |_| {
                counted.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        // A scheduler-style writer flips the status without touching the
        // settings and without a manual tag.
        write_record::<State, _>(&store, |state, _| {
            state.set_usable(true).resume();
        });
        assert!(wait_until(|| hits.load(Ordering::SeqCst) == 1).await);

        assert!(light.did_status_change());
        assert!(light.is_running());
        assert!(!light.was_manually_triggered());
        assert_eq!(light.smoothening_duration(), SmootheningDuration::Long);

        light.stop_watching().await;
    }

    #[tokio::test]
    async fn restart_watching_replaces_the_consumer() {
        let store = store();
        let light = light(&store);
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let counted = Arc::clone(&first);
        light
            .start_watching(move |_| {
                counted.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        let counted = Arc::clone(&second);
        light
            .start_watching(move |_| {
                counted.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        write_record::<Settings, _>(&store, |settings, _| {
            settings.set_enabled(true);
        });
        assert!(wait_until(|| second.load(Ordering::SeqCst) == 1).await);
        assert_eq!(first.load(Ordering::SeqCst), 0);

        light.stop_watching().await;
    }
}

// ============================================================================
// Support probing
// ============================================================================

mod support {
    use super::*;

    #[tokio::test]
    async fn empty_store_is_unsupported() {
        let store = store();
        assert!(!NightLight::is_supported_with(
            Arc::clone(&store) as Arc<dyn ObservableStore>,
            schema(),
            nightlight_lib::Policy::default(),
            false
        ));
    }

    #[tokio::test]
    async fn saved_records_make_the_store_supported() {
        let store = store();
        let light = light(&store);
        light.enable();
        // resume() dirties the state record so both records get written.
        light.resume();
        assert!(light.save(true).await);

        let dyn_store = Arc::clone(&store) as Arc<dyn ObservableStore>;
        assert!(NightLight::is_supported_with(
            Arc::clone(&dyn_store),
            schema(),
            nightlight_lib::Policy::default(),
            false
        ));
        assert!(NightLight::is_supported_with(
            dyn_store,
            schema(),
            nightlight_lib::Policy::default(),
            true
        ));
    }
}
