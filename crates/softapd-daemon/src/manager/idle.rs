//! Idle-timeout scheduler.
//!
//! A single-shot, cancelable deferred timer. Arming replaces any
//! previously armed timer; the fire is routed through the machine's
//! serialized queue, stamped with a generation number. The machine only
//! honors a fire whose generation matches the scheduler's current one,
//! so a cancel (or re-arm) processed first always wins, even when the
//! fire and the cancel race.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use super::ApEvent;

/// Cancelable single-shot timer posting onto the machine queue.
#[derive(Debug)]
pub(crate) struct IdleTimeout {
    tx: mpsc::UnboundedSender<ApEvent>,
    delay: Duration,
    generation: u64,
    armed: Option<JoinHandle<()>>,
}

impl IdleTimeout {
    pub(crate) fn new(tx: mpsc::UnboundedSender<ApEvent>, delay: Duration) -> Self {
        Self {
            tx,
            delay,
            generation: 0,
            armed: None,
        }
    }

    /// Arms the timer at `now + delay`, replacing any armed timer.
    pub(crate) fn schedule(&mut self) {
        if let Some(task) = self.armed.take() {
            task.abort();
        }
        self.generation = self.generation.wrapping_add(1);
        let generation = self.generation;
        let delay = self.delay;
        let tx = self.tx.clone();
        self.armed = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(ApEvent::NoClientsTimeout { generation });
        }));
        debug!(generation, delay_secs = delay.as_secs(), "idle timeout armed");
    }

    /// Disarms the timer. A no-op when nothing is armed.
    pub(crate) fn cancel(&mut self) {
        if let Some(task) = self.armed.take() {
            task.abort();
            self.generation = self.generation.wrapping_add(1);
            debug!("idle timeout canceled");
        }
    }

    /// Consumes a fire event. Returns `true` only when the generation
    /// matches the currently armed timer; stale fires are rejected.
    pub(crate) fn fired(&mut self, generation: u64) -> bool {
        if self.armed.is_some() && generation == self.generation {
            self.armed = None;
            true
        } else {
            false
        }
    }

    /// Returns `true` while a timer is armed.
    pub(crate) const fn is_armed(&self) -> bool {
        self.armed.is_some()
    }
}

impl Drop for IdleTimeout {
    fn drop(&mut self) {
        if let Some(task) = self.armed.take() {
            task.abort();
        }
    }
}
