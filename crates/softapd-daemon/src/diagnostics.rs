//! Diagnostic capture boundary.
//!
//! Capture is purely observational: it starts after a successful driver
//! start and stops during teardown, and never gates bring-up success.

use tracing::info;

/// Diagnostic log capture for a running AP interface.
pub trait Diagnostics: Send + Sync {
    /// Begins capture for the named interface.
    fn start_capture(&self, interface: &str);

    /// Stops capture for the named interface.
    fn stop_capture(&self, interface: &str);
}

/// Default implementation that only marks capture boundaries in the
/// log stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDiagnostics;

impl Diagnostics for LogDiagnostics {
    fn start_capture(&self, interface: &str) {
        info!(interface = %interface, "diagnostic capture started");
    }

    fn stop_capture(&self, interface: &str) {
        info!(interface = %interface, "diagnostic capture stopped");
    }
}
