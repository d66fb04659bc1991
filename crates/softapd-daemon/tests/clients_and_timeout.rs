//! Integration tests for client tracking, the idle-timeout invariant,
//! and channel-switch handling.

mod common;

use std::sync::Arc;

use softapd_core::Band;
use softapd_daemon::metrics::encode_text;
use softapd_daemon::{
    ApDriver, ApEventListener, FakeDriver, ManagerConfig, PrometheusApMetrics, SoftApManager,
};

use common::{config, mac, spawn_harness, Note, Recorder};

// ============================================================================
// Client registry behavior through the machine
// ============================================================================

/// Scenario C: sets {A}, {A,B}, {A}, {} produce one notification each;
/// the timer is armed only once the set is empty again.
#[tokio::test]
async fn test_client_join_leave_notification_per_distinct_set() {
    let h = spawn_harness(
        FakeDriver::new(),
        config(Band::TwoGhz),
        ManagerConfig::default(),
    );
    h.manager.start();
    h.barrier().await;

    let events = h.driver.events().unwrap();
    events.clients_changed(vec![mac(1)]);
    let dump = h.barrier().await;
    assert!(dump.contains("connected_clients: 1"));
    assert!(dump.contains("idle_timer_armed: false"));

    events.clients_changed(vec![mac(1), mac(2)]);
    events.clients_changed(vec![mac(1)]);
    events.clients_changed(Vec::new());
    let dump = h.barrier().await;

    assert!(dump.contains("connected_clients: 0"));
    assert!(dump.contains("idle_timer_armed: true"));
    assert_eq!(
        h.listener.client_notes(),
        vec![
            Vec::new(), // initial snapshot at Enabled
            vec![mac(1)],
            vec![mac(1), mac(2)],
            vec![mac(1)],
            Vec::new(),
        ]
    );
}

/// A permutation of the current membership must not notify or touch
/// the timer.
#[tokio::test]
async fn test_reordered_report_is_not_a_change() {
    let h = spawn_harness(
        FakeDriver::new(),
        config(Band::TwoGhz),
        ManagerConfig::default(),
    );
    h.manager.start();
    h.barrier().await;

    let events = h.driver.events().unwrap();
    events.clients_changed(vec![mac(1), mac(2)]);
    events.clients_changed(vec![mac(2), mac(1)]);
    events.clients_changed(vec![mac(2), mac(1), mac(1)]);
    h.barrier().await;

    assert_eq!(
        h.listener.client_notes(),
        vec![Vec::new(), vec![mac(1), mac(2)]]
    );
}

// ============================================================================
// Idle timeout
// ============================================================================

/// Scenario D: the timer fires with no clients and the policy enabled;
/// the AP shuts down with one teardown call.
#[tokio::test(start_paused = true)]
async fn test_idle_timeout_stops_the_ap() {
    let h = spawn_harness(
        FakeDriver::new(),
        config(Band::TwoGhz),
        ManagerConfig::default(),
    );
    h.manager.start();
    h.barrier().await;

    // Paused time auto-advances to the timer deadline once the runtime
    // is otherwise idle.
    h.manager.join().await;

    let notes = h.listener.notes();
    let tail = &notes[notes.len() - 3..];
    assert_eq!(
        tail,
        [
            Note::State(softapd_core::ApState::Disabling, None),
            Note::State(softapd_core::ApState::Disabled, None),
            Note::Stopped,
        ]
    );
    assert_eq!(h.driver.teardown_calls(), 1);
}

/// A client joining cancels the armed timer; time passing then does
/// not shut the AP down.
#[tokio::test(start_paused = true)]
async fn test_client_presence_cancels_the_timer() {
    let h = spawn_harness(
        FakeDriver::new(),
        config(Band::TwoGhz),
        ManagerConfig::default(),
    );
    h.manager.start();
    h.barrier().await;

    h.driver.events().unwrap().clients_changed(vec![mac(1)]);
    let dump = h.barrier().await;
    assert!(dump.contains("idle_timer_armed: false"));

    // Even after the original deadline would have elapsed, the machine
    // must still be running.
    tokio::time::sleep(softapd_daemon::MIN_IDLE_TIMEOUT * 2).await;
    let dump = h.barrier().await;
    assert!(dump.contains("state: started"));
    assert_eq!(h.driver.teardown_calls(), 0);
}

/// Toggling the policy off disarms the timer; re-enabling with an
/// empty client set re-arms it within the same event.
#[tokio::test]
async fn test_policy_toggle_reevaluates_timer() {
    let h = spawn_harness(
        FakeDriver::new(),
        config(Band::TwoGhz),
        ManagerConfig::default(),
    );
    h.manager.start();
    let dump = h.barrier().await;
    assert!(dump.contains("idle_timer_armed: true"));

    h.settings.set_enabled(false);
    let dump = h.wait_for("timeout_enabled: false").await;
    assert!(dump.contains("idle_timer_armed: false"));

    h.settings.set_enabled(true);
    let dump = h.wait_for("timeout_enabled: true").await;
    assert!(dump.contains("idle_timer_armed: true"));
}

/// Re-enabling the policy while clients are present must not arm the
/// timer until the set empties.
#[tokio::test]
async fn test_reenable_with_clients_does_not_arm() {
    let h = spawn_harness(
        FakeDriver::new(),
        config(Band::TwoGhz),
        ManagerConfig::default(),
    );
    h.manager.start();
    h.barrier().await;

    let events = h.driver.events().unwrap();
    events.clients_changed(vec![mac(1)]);
    h.barrier().await;

    h.settings.set_enabled(false);
    h.wait_for("timeout_enabled: false").await;
    h.settings.set_enabled(true);
    let dump = h.wait_for("timeout_enabled: true").await;
    assert!(dump.contains("idle_timer_armed: false"));

    events.clients_changed(Vec::new());
    let dump = h.barrier().await;
    assert!(dump.contains("idle_timer_armed: true"));
}

// ============================================================================
// Channel switches
// ============================================================================

/// A reported switch is recorded and a band-preference violation is
/// accounted when the frequency contradicts the requested band.
#[tokio::test]
async fn test_channel_switch_records_and_flags_violation() {
    let registry = prometheus::Registry::new();
    let metrics = Arc::new(PrometheusApMetrics::new(&registry).unwrap());

    let driver = Arc::new(FakeDriver::new());
    let listener = Arc::new(Recorder::default());
    let manager = SoftApManager::builder(
        Arc::clone(&driver) as Arc<dyn ApDriver>,
        Arc::clone(&listener) as Arc<dyn ApEventListener>,
    )
        .configuration(config(Band::TwoGhz))
        .metrics(metrics)
        .spawn()
        .unwrap();
    manager.start();
    manager.dump().await.unwrap();

    // In-band switch: recorded, no violation.
    let events = driver.events().unwrap();
    events.channel_switched(2437, 20);
    let dump = manager.dump().await.unwrap();
    assert!(dump.contains("reported_channel: 2437 MHz / 20 MHz"));

    // A 5 GHz report against a 2.4 GHz request is a violation.
    events.channel_switched(5180, 80);
    let dump = manager.dump().await.unwrap();
    assert!(dump.contains("reported_channel: 5180 MHz / 80 MHz"));

    let text = encode_text(&registry).unwrap();
    assert!(text.contains("softapd_band_preference_violations_total 1"));
    assert!(text.contains("softapd_channel_switches_total"));
}
