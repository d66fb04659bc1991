//! Idle-timeout policy toggle subscription.
//!
//! The timeout-enabled flag is owned by the embedding application and
//! pushed at runtime. The machine never reads it ad hoc: it acquires a
//! [`SettingsSubscription`] on entering Started and releases it on exit,
//! and every change arrives as a typed event on the same ordered queue
//! as everything else.

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;

use super::ApEvent;

/// Creates a connected settings pair with the given initial toggle
/// value.
#[must_use]
pub fn timeout_settings(enabled: bool) -> (TimeoutSettingsHandle, TimeoutSettings) {
    let (tx, rx) = watch::channel(enabled);
    (TimeoutSettingsHandle { tx }, TimeoutSettings { rx })
}

/// Producer side of the timeout toggle, held by the embedding
/// application.
#[derive(Debug)]
pub struct TimeoutSettingsHandle {
    tx: watch::Sender<bool>,
}

impl TimeoutSettingsHandle {
    /// Pushes a new toggle value. Unchanged values are still delivered;
    /// the machine suppresses no-op toggles itself.
    pub fn set_enabled(&self, enabled: bool) {
        if self.tx.send(enabled).is_err() {
            debug!("no timeout settings subscribers");
        }
    }
}

/// Consumer side handed to the manager.
#[derive(Debug, Clone)]
pub struct TimeoutSettings {
    rx: watch::Receiver<bool>,
}

impl TimeoutSettings {
    /// Acquires the subscription resource: reads the current value and
    /// spawns a forwarder that posts every subsequent change onto the
    /// machine queue.
    pub(crate) fn subscribe(&self, tx: mpsc::UnboundedSender<ApEvent>) -> SettingsSubscription {
        let mut rx = self.rx.clone();
        let initial = *rx.borrow_and_update();
        let task = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let enabled = *rx.borrow_and_update();
                if tx.send(ApEvent::TimeoutToggleChanged(enabled)).is_err() {
                    break;
                }
            }
        });
        SettingsSubscription { initial, task }
    }
}

/// A live subscription. Dropping it releases the resource and stops the
/// forwarder, so no toggle events are delivered outside Started.
#[derive(Debug)]
pub(crate) struct SettingsSubscription {
    initial: bool,
    task: JoinHandle<()>,
}

impl SettingsSubscription {
    /// The toggle value observed at subscription time.
    pub(crate) const fn initial_enabled(&self) -> bool {
        self.initial
    }
}

impl Drop for SettingsSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}
