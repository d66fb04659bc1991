//! Scriptable in-memory driver.
//!
//! Used by the integration tests and by the binary's simulation mode.
//! Failure knobs script each step of the bring-up sequence; call
//! recording lets tests assert on teardown counts and applied
//! configuration; the stored [`DriverEvents`] handle lets a test (or the
//! simulator) play the role of the hardware and inject asynchronous
//! events.

use std::sync::{Mutex, MutexGuard, PoisonError};

use softapd_core::{ApConfiguration, CountryCode, DriverError, MacAddress};

use super::{ApDriver, DriverEvents};

/// Interface name the fake hands out.
const FAKE_INTERFACE: &str = "ap0";

#[derive(Debug, Default)]
struct FakeState {
    fail_setup: bool,
    fail_start: bool,
    fail_set_mac: bool,
    fail_set_country: bool,
    no_factory_mac: bool,
    report_down: bool,
    started: bool,
    events: Option<DriverEvents>,
    setup_calls: u32,
    teardown_calls: u32,
    applied_macs: Vec<MacAddress>,
    applied_country: Option<CountryCode>,
    last_config: Option<ApConfiguration>,
}

/// In-memory [`ApDriver`] with scriptable failures.
#[derive(Debug, Default)]
pub struct FakeDriver {
    state: Mutex<FakeState>,
}

impl FakeDriver {
    /// Creates a fake that accepts every call.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts interface setup to fail.
    #[must_use]
    pub fn with_setup_failure(self) -> Self {
        self.state().fail_setup = true;
        self
    }

    /// Scripts the AP start call to fail.
    #[must_use]
    pub fn with_start_failure(self) -> Self {
        self.state().fail_start = true;
        self
    }

    /// Scripts MAC programming to fail.
    #[must_use]
    pub fn with_mac_failure(self) -> Self {
        self.state().fail_set_mac = true;
        self
    }

    /// Scripts country-code programming to fail.
    #[must_use]
    pub fn with_country_failure(self) -> Self {
        self.state().fail_set_country = true;
        self
    }

    /// Scripts the factory MAC address as unknown.
    #[must_use]
    pub fn without_factory_mac(self) -> Self {
        self.state().no_factory_mac = true;
        self
    }

    /// Scripts the interface to report down after a successful start.
    #[must_use]
    pub fn with_interface_down(self) -> Self {
        self.state().report_down = true;
        self
    }

    /// Returns the callback sender captured at setup, for injecting
    /// asynchronous driver events.
    #[must_use]
    pub fn events(&self) -> Option<DriverEvents> {
        self.state().events.clone()
    }

    /// Number of `setup_interface` calls so far.
    #[must_use]
    pub fn setup_calls(&self) -> u32 {
        self.state().setup_calls
    }

    /// Number of `teardown_interface` calls so far.
    #[must_use]
    pub fn teardown_calls(&self) -> u32 {
        self.state().teardown_calls
    }

    /// MAC addresses applied, in order.
    #[must_use]
    pub fn applied_macs(&self) -> Vec<MacAddress> {
        self.state().applied_macs.clone()
    }

    /// Country code last applied.
    #[must_use]
    pub fn applied_country(&self) -> Option<CountryCode> {
        self.state().applied_country
    }

    /// Configuration passed to the last AP start call.
    #[must_use]
    pub fn last_config(&self) -> Option<ApConfiguration> {
        self.state().last_config.clone()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ApDriver for FakeDriver {
    fn setup_interface(&self, events: DriverEvents) -> Result<String, DriverError> {
        let mut state = self.state();
        state.setup_calls += 1;
        if state.fail_setup {
            return Err(DriverError::InterfaceSetup("scripted failure".to_string()));
        }
        state.events = Some(events);
        Ok(FAKE_INTERFACE.to_string())
    }

    fn teardown_interface(&self, _interface: &str) {
        let mut state = self.state();
        state.teardown_calls += 1;
        state.started = false;
    }

    fn start_ap(&self, _interface: &str, config: &ApConfiguration) -> bool {
        let mut state = self.state();
        state.last_config = Some(config.clone());
        if state.fail_start {
            return false;
        }
        state.started = true;
        true
    }

    fn is_interface_up(&self, interface: &str) -> bool {
        let state = self.state();
        interface == FAKE_INTERFACE && state.started && !state.report_down
    }

    fn set_mac_address(&self, _interface: &str, mac: MacAddress) -> bool {
        let mut state = self.state();
        if state.fail_set_mac {
            return false;
        }
        state.applied_macs.push(mac);
        true
    }

    fn factory_mac_address(&self, _interface: &str) -> Option<MacAddress> {
        let state = self.state();
        if state.no_factory_mac {
            None
        } else {
            Some(MacAddress::from_octets([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]))
        }
    }

    fn set_country_code(&self, _interface: &str, code: &CountryCode) -> bool {
        let mut state = self.state();
        if state.fail_set_country {
            return false;
        }
        state.applied_country = Some(*code);
        true
    }
}
