//! The serialized lifecycle state machine.
//!
//! One task, one queue, run-to-completion handlers. The machine owns
//! every piece of mutable lifecycle state (the interface handle, the
//! client registry, the timeout policy, the reported channel), so there
//! is nothing to race on by construction. Driver calls issued from a
//! handler are synchronous; the next event is not processed until the
//! current transition and its side effects are complete.
//!
//! Internally there are two states, Idle and Started. What observers
//! see is the finer published [`ApState`]; the machine tracks the last
//! published value so every notification and broadcast record carries a
//! consistent `previous_state`.

use std::fmt::Write as _;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Local};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use softapd_core::state::ApStateChange;
use softapd_core::{
    ApConfiguration, ApState, ChannelPolicy, ClientRegistry, FailureReason, MacAddress,
    ReportedChannel,
};

use crate::diagnostics::Diagnostics;
use crate::driver::{ApDriver, DriverEvent, DriverEvents};
use crate::metrics::ApMetrics;

use super::bringup::{self, StartedAp};
use super::idle::IdleTimeout;
use super::settings::{SettingsSubscription, TimeoutSettings};
use super::{ApEvent, ApEventListener, ManagerConfig, Role};

/// Format for the human-readable start timestamp in dumps.
const START_TIMESTAMP_FORMAT: &str = "%m-%d %H:%M:%S%.3f";

/// Internal machine state. The published [`ApState`] is derived from
/// transitions between these two plus the failure paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Idle,
    Started,
}

impl Lifecycle {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Started => "started",
        }
    }
}

/// Handler outcome: keep serving the queue or terminate the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

pub(crate) struct StateMachine {
    driver: Arc<dyn ApDriver>,
    listener: Arc<dyn ApEventListener>,
    channel_policy: Arc<dyn ChannelPolicy>,
    metrics: Arc<dyn ApMetrics>,
    diagnostics: Arc<dyn Diagnostics>,
    settings: TimeoutSettings,

    /// Caller-supplied configuration; never mutated in place.
    config: ApConfiguration,
    /// Configuration with band/channel resolved, once bring-up ran.
    resolved: Option<ApConfiguration>,
    manager_config: ManagerConfig,

    rx: mpsc::UnboundedReceiver<ApEvent>,
    tx: mpsc::UnboundedSender<ApEvent>,
    state_tx: broadcast::Sender<ApStateChange>,
    role: Arc<Mutex<Option<Role>>>,

    lifecycle: Lifecycle,
    /// Last externally published state; the `previous_state` of the
    /// next record.
    published: ApState,
    interface: Option<String>,
    interface_up: bool,
    interface_destroyed: bool,
    registry: ClientRegistry,
    reported_channel: Option<ReportedChannel>,
    timeout: IdleTimeout,
    timeout_enabled: bool,
    subscription: Option<SettingsSubscription>,
    started_at: Option<DateTime<Local>>,
}

impl StateMachine {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        driver: Arc<dyn ApDriver>,
        listener: Arc<dyn ApEventListener>,
        channel_policy: Arc<dyn ChannelPolicy>,
        metrics: Arc<dyn ApMetrics>,
        diagnostics: Arc<dyn Diagnostics>,
        settings: TimeoutSettings,
        config: ApConfiguration,
        manager_config: ManagerConfig,
        rx: mpsc::UnboundedReceiver<ApEvent>,
        tx: mpsc::UnboundedSender<ApEvent>,
        state_tx: broadcast::Sender<ApStateChange>,
        role: Arc<Mutex<Option<Role>>>,
    ) -> Self {
        let timeout = IdleTimeout::new(tx.clone(), manager_config.idle_timeout());
        Self {
            driver,
            listener,
            channel_policy,
            metrics,
            diagnostics,
            settings,
            config,
            resolved: None,
            manager_config,
            rx,
            tx,
            state_tx,
            role,
            lifecycle: Lifecycle::Idle,
            published: ApState::Disabled,
            interface: None,
            interface_up: false,
            interface_destroyed: false,
            registry: ClientRegistry::new(),
            reported_channel: None,
            timeout,
            timeout_enabled: true,
            subscription: None,
            started_at: None,
        }
    }

    /// Serves the queue until a terminal transition.
    pub(crate) async fn run(mut self) {
        debug!("soft AP state machine running");
        while let Some(event) = self.rx.recv().await {
            let flow = match self.lifecycle {
                Lifecycle::Idle => self.handle_idle(event),
                Lifecycle::Started => self.handle_started(event),
            };
            if flow == Flow::Quit {
                break;
            }
        }
        debug!("soft AP state machine terminated");
    }

    // ========================================================================
    // Idle state
    // ========================================================================

    fn handle_idle(&mut self, event: ApEvent) -> Flow {
        match event {
            ApEvent::Start => self.handle_start(),
            ApEvent::Stop => {
                debug!("stop requested while idle");
                Flow::Quit
            },
            ApEvent::Dump(reply) => {
                self.reply_dump(reply);
                Flow::Continue
            },
            other => {
                debug!(event = ?other, "ignoring event while idle");
                Flow::Continue
            },
        }
    }

    fn handle_start(&mut self) -> Flow {
        let interface = match self
            .driver
            .setup_interface(DriverEvents::new(self.tx.clone()))
        {
            Ok(interface) => interface,
            Err(error) => {
                error!(%error, "interface setup failed");
                self.publish(ApState::Failed, Some(FailureReason::General));
                self.metrics
                    .start_result(false, Some(FailureReason::General));
                self.listener.on_start_failure();
                return Flow::Continue;
            },
        };

        self.interface = Some(interface.clone());
        self.publish(ApState::Enabling, None);

        match bringup::start_soft_ap(
            self.driver.as_ref(),
            &interface,
            &self.config,
            &self.manager_config,
            self.channel_policy.as_ref(),
            self.diagnostics.as_ref(),
        ) {
            Ok(StartedAp {
                resolved,
                started_at,
            }) => {
                self.resolved = Some(resolved);
                self.started_at = Some(started_at);
                self.enter_started()
            },
            Err(error) => {
                let reason = error.failure_reason();
                warn!(%error, reason = %reason, "bring-up failed");
                self.publish(ApState::Failed, Some(reason));
                self.stop_soft_ap();
                self.interface = None;
                self.metrics.start_result(false, Some(reason));
                self.listener.on_start_failure();
                Flow::Continue
            },
        }
    }

    // ========================================================================
    // Started state
    // ========================================================================

    fn enter_started(&mut self) -> Flow {
        self.lifecycle = Lifecycle::Started;
        self.interface_up = false;
        self.interface_destroyed = false;

        // The registry is established empty before the up-check so the
        // initial client-list notification reports a defined snapshot.
        self.registry.clear();

        let up = self
            .interface
            .as_deref()
            .is_some_and(|interface| self.driver.is_interface_up(interface));
        if self.handle_up_change(up) == Flow::Quit {
            return Flow::Quit;
        }

        let subscription = self.settings.subscribe(self.tx.clone());
        self.timeout_enabled = subscription.initial_enabled();
        self.subscription = Some(subscription);
        debug!(
            enabled = self.timeout_enabled,
            delay_secs = self.manager_config.idle_timeout().as_secs(),
            "idle timeout policy"
        );

        if self.timeout_enabled {
            self.timeout.schedule();
        }
        Flow::Continue
    }

    fn handle_started(&mut self, event: ApEvent) -> Flow {
        match event {
            ApEvent::Start => {
                debug!("already started, ignoring start request");
                Flow::Continue
            },
            ApEvent::Stop => {
                info!("stop requested");
                self.publish(ApState::Disabling, None);
                self.exit_started()
            },
            ApEvent::Driver(driver_event) => self.handle_driver_event(driver_event),
            ApEvent::TimeoutToggleChanged(enabled) => {
                self.handle_timeout_toggle(enabled);
                Flow::Continue
            },
            ApEvent::NoClientsTimeout { generation } => self.handle_timeout_fire(generation),
            ApEvent::Dump(reply) => {
                self.reply_dump(reply);
                Flow::Continue
            },
        }
    }

    fn handle_driver_event(&mut self, event: DriverEvent) -> Flow {
        match event {
            DriverEvent::ClientsChanged { clients } => {
                self.set_connected_clients(clients);
                Flow::Continue
            },
            DriverEvent::ChannelSwitched {
                frequency_mhz,
                bandwidth_mhz,
            } => {
                self.handle_channel_switched(frequency_mhz, bandwidth_mhz);
                Flow::Continue
            },
            DriverEvent::InterfaceUp { interface } => {
                if self.is_bound_interface(&interface) {
                    self.handle_up_change(true)
                } else {
                    Flow::Continue
                }
            },
            DriverEvent::InterfaceDown { interface } => {
                if self.is_bound_interface(&interface) {
                    self.handle_up_change(false)
                } else {
                    Flow::Continue
                }
            },
            DriverEvent::InterfaceDestroyed { interface } => {
                if self.is_bound_interface(&interface) {
                    info!("interface was destroyed externally");
                    self.interface_destroyed = true;
                    self.publish(ApState::Disabling, None);
                    self.exit_started()
                } else {
                    Flow::Continue
                }
            },
            DriverEvent::ApFailure => {
                warn!("driver reported AP failure, stopping and reporting");
                self.fail_and_exit()
            },
        }
    }

    fn is_bound_interface(&self, interface: &str) -> bool {
        let bound = self.interface.as_deref() == Some(interface);
        if !bound {
            debug!(interface = %interface, "event for foreign interface, ignoring");
        }
        bound
    }

    /// Applies a driver client report: diff, notify, account, and
    /// re-evaluate the idle-timer invariant (armed iff enabled and
    /// empty), all within this event.
    fn set_connected_clients(&mut self, clients: Vec<MacAddress>) {
        let Some(snapshot) = self.registry.update(Some(clients)) else {
            return;
        };
        info!(count = snapshot.len(), "connected clients changed");
        self.listener.on_connected_clients_changed(&snapshot);
        self.metrics.clients_changed(snapshot.len(), self.config.mode);

        if snapshot.is_empty() {
            if self.timeout_enabled {
                self.timeout.schedule();
            }
        } else {
            self.timeout.cancel();
        }
    }

    fn handle_channel_switched(&mut self, frequency_mhz: u32, bandwidth_mhz: u32) {
        let channel = ReportedChannel {
            frequency_mhz,
            bandwidth_mhz,
        };
        debug!(frequency_mhz, bandwidth_mhz, "channel switched");
        self.reported_channel = Some(channel);
        self.metrics.channel_switched(channel, self.config.mode);

        if channel.violates_band_preference(self.config.profile.band) {
            error!(
                frequency_mhz,
                requested_band = %self.config.profile.band,
                "reported channel does not satisfy the requested band"
            );
            self.metrics.band_preference_violation();
        }
    }

    fn handle_timeout_toggle(&mut self, enabled: bool) {
        if enabled == self.timeout_enabled {
            return;
        }
        info!(enabled, "idle timeout policy toggled");
        self.timeout_enabled = enabled;
        if !enabled {
            self.timeout.cancel();
        } else if self.registry.is_empty() {
            self.timeout.schedule();
        }
    }

    fn handle_timeout_fire(&mut self, generation: u64) -> Flow {
        if !self.timeout.fired(generation) {
            debug!(generation, "stale idle-timeout fire, dropping");
            return Flow::Continue;
        }
        // Either condition indicates a scheduling defect: the timer is
        // canceled whenever the policy is disabled or a client is
        // present.
        if !self.timeout_enabled {
            error!("idle timeout fired while the policy is disabled, dropping");
            return Flow::Continue;
        }
        if !self.registry.is_empty() {
            error!(
                clients = self.registry.len(),
                "idle timeout fired with associated clients, dropping"
            );
            return Flow::Continue;
        }

        info!("no associated clients within the timeout, stopping soft AP");
        self.publish(ApState::Disabling, None);
        self.exit_started()
    }

    /// Applies an interface up/down observation. A repeat of the
    /// current link state is ignored; up→down is a fatal interface
    /// error.
    fn handle_up_change(&mut self, up: bool) -> Flow {
        if up == self.interface_up {
            return Flow::Continue;
        }
        self.interface_up = up;

        if up {
            info!("soft AP is ready for use");
            self.publish(ApState::Enabled, None);
            self.listener.on_started();
            self.metrics.start_result(true, None);
            self.metrics.up_changed(true, self.config.mode);
            self.listener
                .on_connected_clients_changed(self.registry.clients());
            Flow::Continue
        } else {
            warn!("interface went down, stopping and reporting failure");
            self.fail_and_exit()
        }
    }

    /// Fatal runtime driver error: publish `Failed` then run the normal
    /// exit path.
    fn fail_and_exit(&mut self) -> Flow {
        self.publish(ApState::Failed, Some(FailureReason::General));
        self.publish(ApState::Disabling, None);
        self.exit_started()
    }

    /// The single exit path out of Started. Releases the interface
    /// exactly once, the subscription, the timer, and the role, then
    /// terminates the machine.
    fn exit_started(&mut self) -> Flow {
        self.lifecycle = Lifecycle::Idle;

        if self.interface_destroyed {
            debug!("interface already destroyed, skipping teardown");
        } else {
            self.stop_soft_ap();
        }

        // Dropping the subscription aborts the forwarder; no toggle
        // events are delivered past this point.
        self.subscription = None;

        if let Some(snapshot) = self.registry.update(Some(Vec::new())) {
            debug!("resetting connected clients on stop");
            self.listener.on_connected_clients_changed(&snapshot);
            self.metrics.clients_changed(0, self.config.mode);
        }
        self.timeout.cancel();
        self.metrics.up_changed(false, self.config.mode);

        self.publish(ApState::Disabled, None);

        self.interface = None;
        self.interface_up = false;
        self.interface_destroyed = false;
        {
            let mut role = self.role.lock().unwrap_or_else(PoisonError::into_inner);
            *role = None;
        }
        self.listener.on_stopped();
        info!("soft AP manager released");
        Flow::Quit
    }

    /// Stops diagnostic capture and tears the interface down.
    fn stop_soft_ap(&mut self) {
        if let Some(interface) = self.interface.as_deref() {
            self.diagnostics.stop_capture(interface);
            self.driver.teardown_interface(interface);
            debug!(interface = %interface, "soft AP stopped");
        }
    }

    // ========================================================================
    // Notifications
    // ========================================================================

    /// Publishes a state change: listener callback plus broadcast
    /// record, synchronously and in event order.
    fn publish(&mut self, new_state: ApState, failure: Option<FailureReason>) {
        let previous_state = self.published;
        self.published = new_state;

        self.listener.on_state_changed(new_state, failure);
        let record = ApStateChange {
            new_state,
            previous_state,
            failure_reason: failure,
            interface: self.interface.clone(),
            mode: self.config.mode,
        };
        // Absence of broadcast subscribers is not an error.
        let _ = self.state_tx.send(record);
        debug!(new = %new_state, previous = %previous_state, "published AP state");
    }

    // ========================================================================
    // Dump
    // ========================================================================

    fn reply_dump(&self, reply: tokio::sync::oneshot::Sender<String>) {
        if reply.send(self.dump_snapshot()).is_err() {
            debug!("dump requester went away");
        }
    }

    fn dump_snapshot(&self) -> String {
        let role = *self.role.lock().unwrap_or_else(PoisonError::into_inner);
        let profile = self
            .resolved
            .as_ref()
            .map_or(&self.config.profile, |resolved| &resolved.profile);

        let mut out = String::new();
        let _ = writeln!(out, "--Dump of SoftApManager--");
        let _ = writeln!(out, "state: {}", self.lifecycle.as_str());
        let _ = writeln!(out, "published_state: {}", self.published);
        let _ = writeln!(out, "role: {}", role.map_or("unassigned", |r| r.as_str()));
        let _ = writeln!(
            out,
            "interface: {}",
            self.interface.as_deref().unwrap_or("none")
        );
        let _ = writeln!(out, "interface_up: {}", self.interface_up);
        let _ = writeln!(
            out,
            "country_code: {}",
            self.manager_config
                .country_code()
                .map_or_else(|| "unknown".to_string(), |code| code.to_string())
        );
        let _ = writeln!(out, "mode: {}", self.config.mode);
        let _ = writeln!(out, "ssid: {}", profile.ssid);
        let _ = writeln!(out, "band: {}", profile.band);
        let _ = writeln!(out, "hidden: {}", profile.hidden);
        let _ = writeln!(out, "connected_clients: {}", self.registry.len());
        let _ = writeln!(out, "timeout_enabled: {}", self.timeout_enabled);
        let _ = writeln!(out, "idle_timer_armed: {}", self.timeout.is_armed());
        let _ = writeln!(
            out,
            "reported_channel: {}",
            self.reported_channel
                .map_or_else(|| "none".to_string(), |channel| channel.to_string())
        );
        let _ = writeln!(
            out,
            "start_timestamp: {}",
            self.started_at.map_or_else(
                || "none".to_string(),
                |at| at.format(START_TIMESTAMP_FORMAT).to_string()
            )
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use softapd_core::{Band, MacAddress, NetworkProfile, OperatingMode, Security};

    use crate::diagnostics::LogDiagnostics;
    use crate::driver::FakeDriver;
    use crate::manager::settings::timeout_settings;
    use crate::metrics::NullMetrics;

    use super::*;

    struct NullListener;
    impl ApEventListener for NullListener {}

    fn config() -> ApConfiguration {
        ApConfiguration {
            mode: OperatingMode::Tethered,
            profile: NetworkProfile {
                ssid: "lounge".to_string(),
                security: Security::Open,
                hidden: false,
                band: Band::TwoGhz,
                channel: None,
            },
        }
    }

    fn machine(driver: Arc<FakeDriver>) -> StateMachine {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, _) = broadcast::channel(16);
        let (_handle, settings) = timeout_settings(true);
        StateMachine::new(
            driver,
            Arc::new(NullListener),
            Arc::new(softapd_core::DefaultChannelPolicy::new()),
            Arc::new(NullMetrics),
            Arc::new(LogDiagnostics),
            settings,
            config(),
            ManagerConfig::default(),
            rx,
            tx.clone(),
            state_tx,
            Arc::new(Mutex::new(None)),
        )
    }

    fn mac(last: u8) -> MacAddress {
        MacAddress::from_octets([0x02, 0, 0, 0, 0, last])
    }

    #[tokio::test]
    async fn test_start_reaches_started_with_interface_bound() {
        let driver = Arc::new(FakeDriver::new());
        let mut m = machine(Arc::clone(&driver));

        assert_eq!(m.handle_idle(ApEvent::Start), Flow::Continue);
        assert_eq!(m.lifecycle, Lifecycle::Started);
        assert!(m.interface.is_some());
        assert!(m.interface_up);
        assert!(m.timeout.is_armed());
    }

    #[tokio::test]
    async fn test_failed_start_releases_interface_and_stays_alive() {
        let driver = Arc::new(FakeDriver::new().with_start_failure());
        let mut m = machine(Arc::clone(&driver));

        assert_eq!(m.handle_idle(ApEvent::Start), Flow::Continue);
        assert_eq!(m.lifecycle, Lifecycle::Idle);
        assert!(m.interface.is_none());
        assert_eq!(driver.teardown_calls(), 1);
    }

    #[tokio::test]
    async fn test_stale_timeout_generation_is_dropped() {
        let driver = Arc::new(FakeDriver::new());
        let mut m = machine(Arc::clone(&driver));
        m.handle_idle(ApEvent::Start);

        // Canceling after arm makes any in-flight fire stale.
        m.timeout.cancel();
        let flow = m.handle_started(ApEvent::NoClientsTimeout { generation: 1 });
        assert_eq!(flow, Flow::Continue);
        assert_eq!(m.lifecycle, Lifecycle::Started);
        assert_eq!(driver.teardown_calls(), 0);
    }

    #[tokio::test]
    async fn test_timeout_with_clients_is_a_defect_and_dropped() {
        let driver = Arc::new(FakeDriver::new());
        let mut m = machine(Arc::clone(&driver));
        m.handle_idle(ApEvent::Start);

        // Force the inconsistent shape directly: armed timer but a
        // non-empty client set.
        let _ = m.registry.update(Some(vec![mac(1)]));
        let generation = 1;
        let flow = m.handle_started(ApEvent::NoClientsTimeout { generation });
        assert_eq!(flow, Flow::Continue);
        assert_eq!(m.lifecycle, Lifecycle::Started);
    }

    #[tokio::test]
    async fn test_foreign_interface_events_are_ignored() {
        let driver = Arc::new(FakeDriver::new());
        let mut m = machine(Arc::clone(&driver));
        m.handle_idle(ApEvent::Start);

        let flow = m.handle_started(ApEvent::Driver(DriverEvent::InterfaceDown {
            interface: "wlan7".to_string(),
        }));
        assert_eq!(flow, Flow::Continue);
        assert_eq!(m.lifecycle, Lifecycle::Started);
    }

    #[tokio::test]
    async fn test_destroyed_interface_skips_teardown() {
        let driver = Arc::new(FakeDriver::new());
        let mut m = machine(Arc::clone(&driver));
        m.handle_idle(ApEvent::Start);

        let flow = m.handle_started(ApEvent::Driver(DriverEvent::InterfaceDestroyed {
            interface: "ap0".to_string(),
        }));
        assert_eq!(flow, Flow::Quit);
        assert_eq!(driver.teardown_calls(), 0);
        assert!(m.interface.is_none());
    }

    #[tokio::test]
    async fn test_repeated_up_reports_are_ignored() {
        let driver = Arc::new(FakeDriver::new());
        let mut m = machine(Arc::clone(&driver));
        m.handle_idle(ApEvent::Start);
        assert!(m.interface_up);

        let flow = m.handle_started(ApEvent::Driver(DriverEvent::InterfaceUp {
            interface: "ap0".to_string(),
        }));
        assert_eq!(flow, Flow::Continue);
        assert_eq!(m.lifecycle, Lifecycle::Started);
    }

    #[tokio::test]
    async fn test_dump_reports_core_fields() {
        let driver = Arc::new(FakeDriver::new());
        let mut m = machine(driver);
        m.handle_idle(ApEvent::Start);

        let dump = m.dump_snapshot();
        assert!(dump.contains("state: started"));
        assert!(dump.contains("interface: ap0"));
        assert!(dump.contains("ssid: lounge"));
        assert!(dump.contains("timeout_enabled: true"));
    }
}
