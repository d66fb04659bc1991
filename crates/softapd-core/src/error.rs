//! Error taxonomy for bring-up and driver interaction.

use thiserror::Error;

use crate::state::FailureReason;

/// Errors that abort an Idle → Started bring-up attempt.
///
/// Every variant returns the manager to Idle with a start-failure
/// notification carrying the most specific reason available.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StartError {
    /// No usable network profile (empty SSID, bad passphrase).
    #[error("no usable network configuration")]
    ConfigInvalid,

    /// Channel resolution exhausted the requested band.
    #[error("no channel available for the requested band")]
    NoChannelAvailable,

    /// Any other bring-up fault.
    #[error("{0}")]
    Generic(String),
}

impl StartError {
    /// Maps the error onto the externally published failure reason.
    ///
    /// Only the no-channel case is distinguished on the wire; everything
    /// else reports as a general failure.
    #[must_use]
    pub const fn failure_reason(&self) -> FailureReason {
        match self {
            Self::NoChannelAvailable => FailureReason::NoChannel,
            Self::ConfigInvalid | Self::Generic(_) => FailureReason::General,
        }
    }
}

/// Errors from the driver adapter's imperative surface.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DriverError {
    /// The driver could not create an AP interface.
    #[error("failed to create AP interface: {0}")]
    InterfaceSetup(String),

    /// The driver rejected an operation on an interface it does not
    /// know about.
    #[error("unknown interface '{0}'")]
    UnknownInterface(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_reason_mapping() {
        assert_eq!(
            StartError::NoChannelAvailable.failure_reason(),
            FailureReason::NoChannel
        );
        assert_eq!(
            StartError::ConfigInvalid.failure_reason(),
            FailureReason::General
        );
        assert_eq!(
            StartError::Generic("driver start failed".to_string()).failure_reason(),
            FailureReason::General
        );
    }
}
