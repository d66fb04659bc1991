//! Soft AP lifecycle manager.
//!
//! [`SoftApManager`] is the public handle over a single lifecycle run.
//! Every operation, from `start` and `stop` to driver callbacks, timer
//! fires, settings toggles, and dump requests, is posted onto one
//! ordered queue and processed one at a time by a dedicated task, so at
//! most one state transition is ever in flight and notifications are
//! observed in exactly transition order.
//!
//! A manager instance is single-use: once the machine leaves the
//! Started state (stop, idle timeout, driver failure, interface
//! destruction) it runs its cleanup, emits `on_stopped`, and stops
//! accepting events. Restarting requires a fresh instance. A *failed*
//! start attempt does not consume the instance; the machine stays idle
//! and a later `start` may retry.

mod bringup;
mod idle;
mod machine;
mod settings;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use softapd_core::{
    ApConfiguration, ApState, ChannelPolicy, ClientSet, CountryCode, DefaultChannelPolicy,
    FailureReason,
};
use softapd_core::state::ApStateChange;

use crate::config_store::ConfigStore;
use crate::diagnostics::{Diagnostics, LogDiagnostics};
use crate::driver::{ApDriver, DriverEvent};
use crate::metrics::{ApMetrics, NullMetrics};

pub use settings::{timeout_settings, TimeoutSettings, TimeoutSettingsHandle};

use machine::StateMachine;

/// Floor for the idle-timeout delay. Configured values below this are
/// clamped so a misconfigured overlay cannot produce a pathologically
/// short shutdown timer.
pub const MIN_IDLE_TIMEOUT: Duration = Duration::from_secs(600);

/// Capacity of the state-change broadcast channel.
const STATE_BROADCAST_CAPACITY: usize = 64;

/// Logical purpose assignment for a manager instance. Bound once;
/// re-assignment is a contract violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Sharing upstream connectivity.
    Tethering,
    /// Local-only hotspot.
    LocalOnly,
}

impl Role {
    /// Returns the role as a stable string identifier.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Tethering => "tethering",
            Self::LocalOnly => "local_only",
        }
    }
}

/// Errors from the manager handle.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ManagerError {
    /// Neither the builder nor the config store provided a
    /// configuration.
    #[error("no AP configuration available")]
    MissingConfiguration,

    /// The one-shot role was assigned twice.
    #[error("role is already assigned")]
    RoleAlreadyAssigned,

    /// The machine has terminated and no longer serves requests.
    #[error("manager event loop has terminated")]
    Terminated,
}

/// Notification callbacks emitted synchronously from the machine task,
/// in event order.
///
/// Default method bodies are empty so listeners implement only what
/// they observe.
pub trait ApEventListener: Send + Sync {
    /// The published AP state changed. The failure reason is only
    /// meaningful when the new state is [`ApState::Failed`].
    fn on_state_changed(&self, _new_state: ApState, _failure: Option<FailureReason>) {}

    /// The associated-client set changed (order-independent diff).
    fn on_connected_clients_changed(&self, _clients: &ClientSet) {}

    /// The AP is up and serving.
    fn on_started(&self) {}

    /// A start attempt failed; the machine is back in idle.
    fn on_start_failure(&self) {}

    /// The lifecycle run finished and the instance is released.
    fn on_stopped(&self) {}
}

/// Everything the machine serializes onto its queue.
#[derive(Debug)]
pub(crate) enum ApEvent {
    /// Public start request.
    Start,
    /// Public stop request. Routed through the queue so it can never
    /// race a driver event into a transient observable state.
    Stop,
    /// Asynchronous driver callback.
    Driver(DriverEvent),
    /// Idle-timeout policy toggle, forwarded by the settings
    /// subscription.
    TimeoutToggleChanged(bool),
    /// Idle-timeout fire. Only honored when the generation matches the
    /// currently armed timer.
    NoClientsTimeout {
        /// Scheduler generation the timer was armed with.
        generation: u64,
    },
    /// Diagnostic snapshot request.
    Dump(oneshot::Sender<String>),
}

/// Static manager configuration, fixed per lifecycle run.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    idle_timeout: Duration,
    randomize_mac: bool,
    country_code: Option<CountryCode>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            idle_timeout: MIN_IDLE_TIMEOUT,
            randomize_mac: false,
            country_code: None,
        }
    }
}

impl ManagerConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the idle-timeout delay, clamped to [`MIN_IDLE_TIMEOUT`].
    #[must_use]
    pub fn with_idle_timeout(mut self, delay: Duration) -> Self {
        if delay < MIN_IDLE_TIMEOUT {
            warn!(
                requested_secs = delay.as_secs(),
                floor_secs = MIN_IDLE_TIMEOUT.as_secs(),
                "idle timeout below floor, clamping"
            );
            self.idle_timeout = MIN_IDLE_TIMEOUT;
        } else {
            self.idle_timeout = delay;
        }
        self
    }

    /// Enables or disables MAC randomization for bring-up.
    #[must_use]
    pub const fn with_mac_randomization(mut self, randomize: bool) -> Self {
        self.randomize_mac = randomize;
        self
    }

    /// Sets the regulatory country code.
    #[must_use]
    pub const fn with_country_code(mut self, code: CountryCode) -> Self {
        self.country_code = Some(code);
        self
    }

    /// The clamped idle-timeout delay.
    #[must_use]
    pub const fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Whether bring-up uses a randomized MAC address.
    #[must_use]
    pub const fn randomize_mac(&self) -> bool {
        self.randomize_mac
    }

    /// The regulatory country code, if known.
    #[must_use]
    pub const fn country_code(&self) -> Option<CountryCode> {
        self.country_code
    }
}

/// Builder for [`SoftApManager`].
pub struct SoftApManagerBuilder {
    driver: Arc<dyn ApDriver>,
    listener: Arc<dyn ApEventListener>,
    configuration: Option<ApConfiguration>,
    config_store: Option<Arc<dyn ConfigStore>>,
    manager_config: ManagerConfig,
    channel_policy: Arc<dyn ChannelPolicy>,
    metrics: Arc<dyn ApMetrics>,
    diagnostics: Arc<dyn Diagnostics>,
    settings: Option<TimeoutSettings>,
}

impl SoftApManagerBuilder {
    fn new(driver: Arc<dyn ApDriver>, listener: Arc<dyn ApEventListener>) -> Self {
        Self {
            driver,
            listener,
            configuration: None,
            config_store: None,
            manager_config: ManagerConfig::default(),
            channel_policy: Arc::new(DefaultChannelPolicy::new()),
            metrics: Arc::new(NullMetrics),
            diagnostics: Arc::new(LogDiagnostics),
            settings: None,
        }
    }

    /// Supplies the configuration for this run. Without it, the config
    /// store is consulted at spawn time.
    #[must_use]
    pub fn configuration(mut self, configuration: ApConfiguration) -> Self {
        self.configuration = Some(configuration);
        self
    }

    /// Supplies the persistent configuration store used as a fallback.
    #[must_use]
    pub fn config_store(mut self, store: Arc<dyn ConfigStore>) -> Self {
        self.config_store = Some(store);
        self
    }

    /// Supplies the static manager configuration.
    #[must_use]
    pub fn manager_config(mut self, config: ManagerConfig) -> Self {
        self.manager_config = config;
        self
    }

    /// Supplies the channel-selection policy.
    #[must_use]
    pub fn channel_policy(mut self, policy: Arc<dyn ChannelPolicy>) -> Self {
        self.channel_policy = policy;
        self
    }

    /// Supplies the metrics sink.
    #[must_use]
    pub fn metrics(mut self, metrics: Arc<dyn ApMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Supplies the diagnostics collaborator.
    #[must_use]
    pub fn diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Supplies the idle-timeout settings source. Without it the toggle
    /// defaults to enabled and never changes.
    #[must_use]
    pub fn timeout_settings(mut self, settings: TimeoutSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Resolves the configuration and spawns the machine task.
    ///
    /// Must run inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::MissingConfiguration`] when neither the
    /// builder nor the config store yields a configuration.
    pub fn spawn(self) -> Result<SoftApManager, ManagerError> {
        let configuration = self
            .configuration
            .or_else(|| {
                self.config_store
                    .as_ref()
                    .and_then(|store| store.ap_configuration())
            })
            .ok_or(ManagerError::MissingConfiguration)?;

        let settings = self
            .settings
            .unwrap_or_else(|| timeout_settings(true).1);

        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, _) = broadcast::channel(STATE_BROADCAST_CAPACITY);
        let role = Arc::new(Mutex::new(None));

        let machine = StateMachine::new(
            self.driver,
            self.listener,
            self.channel_policy,
            self.metrics,
            self.diagnostics,
            settings,
            configuration,
            self.manager_config,
            rx,
            tx.clone(),
            state_tx.clone(),
            Arc::clone(&role),
        );
        let task = tokio::spawn(machine.run());

        Ok(SoftApManager {
            tx,
            role,
            state_tx,
            task: Mutex::new(Some(task)),
        })
    }
}

/// Handle over one soft AP lifecycle run.
pub struct SoftApManager {
    tx: mpsc::UnboundedSender<ApEvent>,
    role: Arc<Mutex<Option<Role>>>,
    state_tx: broadcast::Sender<ApStateChange>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SoftApManager {
    /// Starts building a manager around a driver and a listener.
    #[must_use]
    pub fn builder(
        driver: Arc<dyn ApDriver>,
        listener: Arc<dyn ApEventListener>,
    ) -> SoftApManagerBuilder {
        SoftApManagerBuilder::new(driver, listener)
    }

    /// Requests bring-up. Ignored when the machine is already started
    /// or has terminated.
    pub fn start(&self) {
        self.post(ApEvent::Start);
    }

    /// Requests shutdown. Processed in queue order, after every event
    /// already posted.
    pub fn stop(&self) {
        self.post(ApEvent::Stop);
    }

    /// Assigns the one-shot role.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::RoleAlreadyAssigned`] on re-assignment.
    pub fn set_role(&self, role: Role) -> Result<(), ManagerError> {
        let mut slot = self.role.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Err(ManagerError::RoleAlreadyAssigned);
        }
        *slot = Some(role);
        Ok(())
    }

    /// Returns the assigned role, if any. Best-effort snapshot read;
    /// the authoritative clear happens inside the machine on exit.
    #[must_use]
    pub fn role(&self) -> Option<Role> {
        *self.role.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Requests a diagnostic text snapshot.
    ///
    /// The request travels the ordered queue, so the reply reflects
    /// every event posted before it; tests use it as a barrier.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::Terminated`] when the machine is gone.
    pub async fn dump(&self) -> Result<String, ManagerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(ApEvent::Dump(reply_tx))
            .map_err(|_| ManagerError::Terminated)?;
        reply_rx.await.map_err(|_| ManagerError::Terminated)
    }

    /// Subscribes to the state-change record broadcast.
    #[must_use]
    pub fn subscribe_state_changes(&self) -> broadcast::Receiver<ApStateChange> {
        self.state_tx.subscribe()
    }

    /// Waits for the machine task to terminate.
    pub async fn join(&self) {
        let task = {
            let mut slot = self.task.lock().unwrap_or_else(PoisonError::into_inner);
            slot.take()
        };
        if let Some(task) = task {
            if let Err(error) = task.await {
                warn!(%error, "manager task ended abnormally");
            }
        }
    }

    fn post(&self, event: ApEvent) {
        if self.tx.send(event).is_err() {
            debug!("manager terminated, dropping request");
        }
    }
}
