// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Background change watcher over store key paths.
//!
//! A [`Watcher`] subscribes to change notifications on a set of key paths
//! and invokes a callback with the key that changed, from one long-lived
//! background task per watcher. There is no polling: the task blocks on a
//! multi-wait over every subscription plus a cancellation token.
//!
//! # State machine
//!
//! `Idle → Watching → Idle` via [`start`](Watcher::start) /
//! [`stop`](Watcher::stop), with an orthogonal paused flag while watching.
//! Pausing does not drop the subscriptions — notifications that fire while
//! paused are consumed and discarded, so resuming never replays them, and
//! changes after the resume are delivered normally. The facade uses this to
//! swallow the notification its own save would otherwise trigger.
//!
//! A subscription or wait error is fatal to the background loop: it is
//! logged and the loop exits, leaving [`is_watching`](Watcher::is_watching)
//! false. Callers currently cannot distinguish that death from a deliberate
//! `stop()`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::select_all;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use crate::error::WatchError;
use crate::store::ObservableStore;

type ChangeCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Control messages handled by the watch loop between waits.
enum Control {
    /// Discard notifications that fired while paused, clear the paused
    /// flag, then acknowledge.
    Resume { ack: oneshot::Sender<()> },
}

/// Watches a set of store key paths from a background task.
///
/// Dropping a watcher cancels its background task without waiting for it;
/// use [`stop`](Watcher::stop) when the caller needs the subscriptions
/// released before proceeding.
pub struct Watcher {
    store: Arc<dyn ObservableStore>,
    watching: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    cancel: CancellationToken,
    control_tx: Option<mpsc::UnboundedSender<Control>>,
    finished: Option<oneshot::Receiver<()>>,
}

impl Watcher {
    /// Creates an idle watcher over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn ObservableStore>) -> Self {
        Self {
            store,
            watching: Arc::new(AtomicBool::new(false)),
            paused: Arc::new(AtomicBool::new(false)),
            cancel: CancellationToken::new(),
            control_tx: None,
            finished: None,
        }
    }

    /// Whether the background loop is (still) running.
    #[must_use]
    pub fn is_watching(&self) -> bool {
        self.watching.load(Ordering::SeqCst)
    }

    /// Whether callback delivery is currently suppressed.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Starts watching the given key paths.
    ///
    /// No-op when `keys` is empty. When already watching, performs an
    /// implicit [`stop`](Self::stop) first, so a restart never leaks the
    /// previous run's subscriptions. Subscriptions are registered before
    /// this returns — a change made after `start` returns is observed —
    /// and a registration failure leaves the watcher idle, logged only.
    pub async fn start<F>(&mut self, keys: Vec<String>, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        if self.is_watching() {
            self.stop().await;
        }
        if keys.is_empty() {
            return;
        }

        let mut subs: Vec<(String, watch::Receiver<u64>)> = Vec::with_capacity(keys.len());
        for key in keys {
            match self.store.subscribe(&key) {
                Ok(rx) => subs.push((key, rx)),
                Err(source) => {
                    let error = WatchError::Subscribe { key, source };
                    tracing::error!(%error, "watcher not started");
                    return;
                }
            }
        }

        self.watching.store(true, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
        self.cancel = CancellationToken::new();

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = oneshot::channel();
        self.control_tx = Some(control_tx);
        self.finished = Some(done_rx);

        tracing::debug!(keys = ?subs.iter().map(|(k, _)| k).collect::<Vec<_>>(), "watcher starting");
        tokio::spawn(watch_loop(
            subs,
            Arc::new(callback) as ChangeCallback,
            Arc::clone(&self.watching),
            Arc::clone(&self.paused),
            self.cancel.clone(),
            control_rx,
            done_tx,
        ));
    }

    /// Stops watching and waits for the background loop to release every
    /// subscription. No-op when idle; idempotent.
    pub async fn stop(&mut self) {
        if !self.is_watching() && self.finished.is_none() {
            return;
        }
        self.watching.store(false, Ordering::SeqCst);
        self.cancel.cancel();
        self.control_tx = None;
        if let Some(done) = self.finished.take() {
            // The loop signals after dropping its subscriptions; an error
            // means it is already gone.
            let _ = done.await;
        }
        tracing::debug!("watcher stopped");
    }

    /// Suppresses callback delivery. The subscriptions stay registered.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    /// Restores callback delivery for changes after this call.
    ///
    /// Notifications that fired while paused are discarded before the
    /// paused flag clears; the call returns once the loop has acknowledged,
    /// so a change made after `resume` returns is guaranteed delivery.
    pub async fn resume(&self) {
        if self.is_watching()
            && let Some(tx) = &self.control_tx
        {
            let (ack_tx, ack_rx) = oneshot::channel();
            if tx.send(Control::Resume { ack: ack_tx }).is_ok() && ack_rx.await.is_ok() {
                return;
            }
        }
        // Loop not running; just clear the flag.
        self.paused.store(false, Ordering::SeqCst);
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("watching", &self.is_watching())
            .field("paused", &self.is_paused())
            .finish_non_exhaustive()
    }
}

/// Outcome of one multi-wait iteration.
enum LoopEvent {
    Cancelled,
    Control(Option<Control>),
    Changed(Result<(), watch::error::RecvError>, String),
}

async fn watch_loop(
    mut subs: Vec<(String, watch::Receiver<u64>)>,
    callback: ChangeCallback,
    watching: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    cancel: CancellationToken,
    mut control_rx: mpsc::UnboundedReceiver<Control>,
    done_tx: oneshot::Sender<()>,
) {
    let mut control_open = true;
    loop {
        let changes: Vec<_> = subs
            .iter_mut()
            .map(|(key, rx)| {
                let key = key.clone();
                Box::pin(async move { (rx.changed().await, key) })
            })
            .collect();

        let event = tokio::select! {
            () = cancel.cancelled() => LoopEvent::Cancelled,
            ctrl = control_rx.recv(), if control_open => LoopEvent::Control(ctrl),
            ((result, key), _, _) = select_all(changes) => LoopEvent::Changed(result, key),
        };

        match event {
            LoopEvent::Cancelled => break,
            LoopEvent::Control(None) => control_open = false,
            LoopEvent::Control(Some(Control::Resume { ack })) => {
                for (_, rx) in &mut subs {
                    rx.mark_unchanged();
                }
                paused.store(false, Ordering::SeqCst);
                let _ = ack.send(());
            }
            LoopEvent::Changed(Ok(()), key) => {
                if paused.load(Ordering::SeqCst) {
                    tracing::debug!(key, "change suppressed while paused");
                } else {
                    tracing::debug!(key, "change observed");
                    callback(&key);
                }
            }
            LoopEvent::Changed(Err(_), key) => {
                let error = WatchError::StreamClosed(key);
                tracing::error!(%error, "watch loop aborting");
                break;
            }
        }
    }

    watching.store(false, Ordering::SeqCst);
    drop(subs);
    let _ = done_tx.send(());
}
