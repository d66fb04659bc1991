#![allow(dead_code)]
//! Shared test harness: a recording listener and a spawned manager
//! around a scriptable fake driver.
//!
//! Determinism comes from the manager's own ordering guarantee: a
//! `dump()` request travels the same serialized queue as every other
//! event, so awaiting it is a barrier that flushes everything posted
//! before it.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use softapd_core::{
    ApConfiguration, ApState, Band, ClientSet, FailureReason, MacAddress, NetworkProfile,
    OperatingMode, Security,
};
use softapd_daemon::{
    timeout_settings, ApDriver, ApEventListener, FakeDriver, ManagerConfig, SoftApManager,
    TimeoutSettingsHandle,
};

/// One observed listener callback, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Note {
    State(ApState, Option<FailureReason>),
    Clients(Vec<MacAddress>),
    Started,
    StartFailure,
    Stopped,
}

/// Listener that appends every callback to a shared log.
#[derive(Debug, Default)]
pub struct Recorder {
    notes: Mutex<Vec<Note>>,
}

impl Recorder {
    pub fn notes(&self) -> Vec<Note> {
        self.notes.lock().unwrap().clone()
    }

    pub fn client_notes(&self) -> Vec<Vec<MacAddress>> {
        self.notes()
            .into_iter()
            .filter_map(|note| match note {
                Note::Clients(clients) => Some(clients),
                _ => None,
            })
            .collect()
    }

    fn push(&self, note: Note) {
        self.notes.lock().unwrap().push(note);
    }
}

impl ApEventListener for Recorder {
    fn on_state_changed(&self, new_state: ApState, failure: Option<FailureReason>) {
        self.push(Note::State(new_state, failure));
    }

    fn on_connected_clients_changed(&self, clients: &ClientSet) {
        self.push(Note::Clients(clients.iter().copied().collect()));
    }

    fn on_started(&self) {
        self.push(Note::Started);
    }

    fn on_start_failure(&self) {
        self.push(Note::StartFailure);
    }

    fn on_stopped(&self) {
        self.push(Note::Stopped);
    }
}

/// A spawned manager plus handles on its collaborators.
pub struct Harness {
    pub driver: Arc<FakeDriver>,
    pub listener: Arc<Recorder>,
    pub manager: SoftApManager,
    pub settings: TimeoutSettingsHandle,
}

impl Harness {
    /// Flushes the event queue and returns the snapshot.
    pub async fn barrier(&self) -> String {
        self.manager.dump().await.expect("manager terminated")
    }

    /// Polls dumps until one contains `needle`; for state driven by
    /// forwarder tasks that post outside the test's own queue order.
    pub async fn wait_for(&self, needle: &str) -> String {
        for _ in 0..500 {
            let dump = self.barrier().await;
            if dump.contains(needle) {
                return dump;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("timed out waiting for '{needle}'");
    }
}

pub fn config(band: Band) -> ApConfiguration {
    ApConfiguration {
        mode: OperatingMode::Tethered,
        profile: NetworkProfile {
            ssid: "lounge".to_string(),
            security: Security::Open,
            hidden: false,
            band,
            channel: None,
        },
    }
}

pub fn mac(last: u8) -> MacAddress {
    MacAddress::from_octets([0x02, 0, 0, 0, 0, last])
}

pub fn spawn_harness(
    driver: FakeDriver,
    configuration: ApConfiguration,
    manager_config: ManagerConfig,
) -> Harness {
    let driver = Arc::new(driver);
    let listener = Arc::new(Recorder::default());
    let (settings, settings_rx) = timeout_settings(true);
    let manager = SoftApManager::builder(
        Arc::clone(&driver) as Arc<dyn ApDriver>,
        Arc::clone(&listener) as Arc<dyn ApEventListener>,
    )
        .configuration(configuration)
        .manager_config(manager_config)
        .timeout_settings(settings_rx)
        .spawn()
        .expect("spawn manager");
    Harness {
        driver,
        listener,
        manager,
        settings,
    }
}
