//! Driver adapter boundary.
//!
//! [`ApDriver`] is the imperative control surface over the radio
//! driver/firmware: create and destroy the AP interface, start the AP
//! with a configuration, query link state, program MAC address and
//! country code. Calls are synchronous from the state machine's point of
//! view and are only ever issued from inside the serialized event
//! handler.
//!
//! Asynchronous driver callbacks travel the other way through
//! [`DriverEvents`]: a sender handed to the driver at interface setup
//! which maps every callback onto the manager's single ordered event
//! queue, so driver events are serialized with public calls, timer
//! fires, and settings toggles.

mod fake;

use tokio::sync::mpsc;
use tracing::debug;

use softapd_core::{ApConfiguration, CountryCode, DriverError, MacAddress};

use crate::manager::ApEvent;

pub use fake::FakeDriver;

/// Asynchronous callbacks a driver can deliver after interface setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    /// The named interface transitioned to up.
    InterfaceUp {
        /// Interface the driver is reporting on.
        interface: String,
    },

    /// The named interface transitioned to down.
    InterfaceDown {
        /// Interface the driver is reporting on.
        interface: String,
    },

    /// The named interface was destroyed outside the manager's control.
    InterfaceDestroyed {
        /// Interface the driver is reporting on.
        interface: String,
    },

    /// The AP daemon underneath the driver failed.
    ApFailure,

    /// The associated-client list changed.
    ClientsChanged {
        /// Complete current membership as reported by the driver.
        clients: Vec<MacAddress>,
    },

    /// The AP switched channels.
    ChannelSwitched {
        /// New center frequency in MHz.
        frequency_mhz: u32,
        /// New bandwidth in MHz.
        bandwidth_mhz: u32,
    },
}

/// Callback sender handed to the driver at interface setup.
///
/// Every method posts onto the manager's serialized event queue. Once
/// the manager has terminated, events are silently dropped.
#[derive(Debug, Clone)]
pub struct DriverEvents {
    tx: mpsc::UnboundedSender<ApEvent>,
}

impl DriverEvents {
    pub(crate) fn new(tx: mpsc::UnboundedSender<ApEvent>) -> Self {
        Self { tx }
    }

    /// Posts a raw driver event.
    pub fn post(&self, event: DriverEvent) {
        if self.tx.send(ApEvent::Driver(event)).is_err() {
            debug!("manager terminated, dropping driver event");
        }
    }

    /// Reports the named interface as up.
    pub fn interface_up(&self, interface: &str) {
        self.post(DriverEvent::InterfaceUp {
            interface: interface.to_string(),
        });
    }

    /// Reports the named interface as down.
    pub fn interface_down(&self, interface: &str) {
        self.post(DriverEvent::InterfaceDown {
            interface: interface.to_string(),
        });
    }

    /// Reports the named interface as destroyed.
    pub fn interface_destroyed(&self, interface: &str) {
        self.post(DriverEvent::InterfaceDestroyed {
            interface: interface.to_string(),
        });
    }

    /// Reports an AP daemon failure.
    pub fn ap_failure(&self) {
        self.post(DriverEvent::ApFailure);
    }

    /// Reports the complete current client membership.
    pub fn clients_changed(&self, clients: Vec<MacAddress>) {
        self.post(DriverEvent::ClientsChanged { clients });
    }

    /// Reports a channel switch.
    pub fn channel_switched(&self, frequency_mhz: u32, bandwidth_mhz: u32) {
        self.post(DriverEvent::ChannelSwitched {
            frequency_mhz,
            bandwidth_mhz,
        });
    }
}

/// Imperative driver control surface.
///
/// Implementations must be safe to call from the manager task; blocking
/// is acceptable, suspension is not part of the contract.
pub trait ApDriver: Send + Sync {
    /// Creates an AP interface and registers the callback sink.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] when no interface can be created.
    fn setup_interface(&self, events: DriverEvents) -> Result<String, DriverError>;

    /// Destroys a previously created interface. Idempotency is not
    /// assumed; the manager guarantees at most one call per interface.
    fn teardown_interface(&self, interface: &str);

    /// Starts the AP on the interface with a fully resolved
    /// configuration. Returns `false` on failure.
    fn start_ap(&self, interface: &str, config: &ApConfiguration) -> bool;

    /// Queries current link state.
    fn is_interface_up(&self, interface: &str) -> bool;

    /// Programs a MAC address. Returns `false` on failure.
    fn set_mac_address(&self, interface: &str, mac: MacAddress) -> bool;

    /// Reads the factory-assigned MAC address, if the driver knows it.
    fn factory_mac_address(&self, interface: &str) -> Option<MacAddress>;

    /// Programs the regulatory country code. Returns `false` on
    /// failure.
    fn set_country_code(&self, interface: &str, code: &CountryCode) -> bool;
}
