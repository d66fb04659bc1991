//! Published AP state and state-change records.
//!
//! The lifecycle state machine internally only knows Idle and Started;
//! what it publishes to listeners and broadcast observers is the finer
//! five-phase [`ApState`]. For a given manager instance the published
//! states are observed in exactly the order the internal transitions
//! occurred.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::OperatingMode;

/// Externally published AP state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApState {
    /// No interface bound; the manager is quiescent.
    Disabled,
    /// An interface has been acquired and bring-up is in progress.
    Enabling,
    /// The AP is up and serving.
    Enabled,
    /// Teardown is in progress.
    Disabling,
    /// Bring-up failed or the driver reported a fatal runtime error.
    Failed,
}

impl ApState {
    /// Returns the state as a stable string identifier.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Enabling => "enabling",
            Self::Enabled => "enabled",
            Self::Disabling => "disabling",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ApState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reason attached to a [`ApState::Failed`] publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Generic bring-up or runtime fault.
    General,
    /// Channel resolution found no usable channel for the requested
    /// band.
    NoChannel,
}

impl FailureReason {
    /// Returns the reason as a stable string identifier.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::NoChannel => "no_channel",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State-change record broadcast to external observers.
///
/// `failure_reason` is only meaningful when `new_state` is
/// [`ApState::Failed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApStateChange {
    /// The state just entered.
    pub new_state: ApState,

    /// The state just left.
    pub previous_state: ApState,

    /// Failure reason, set only on transitions into `Failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,

    /// Name of the bound radio interface, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,

    /// Operating mode of the configuration driving this lifecycle run.
    pub mode: OperatingMode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_identifiers_are_stable() {
        assert_eq!(ApState::Disabled.as_str(), "disabled");
        assert_eq!(ApState::Enabling.as_str(), "enabling");
        assert_eq!(ApState::Enabled.as_str(), "enabled");
        assert_eq!(ApState::Disabling.as_str(), "disabling");
        assert_eq!(ApState::Failed.as_str(), "failed");
    }

    #[test]
    fn test_record_omits_empty_fields() {
        let record = ApStateChange {
            new_state: ApState::Enabling,
            previous_state: ApState::Disabled,
            failure_reason: None,
            interface: Some("ap0".to_string()),
            mode: OperatingMode::Tethered,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("failure_reason"));
        assert!(json.contains("\"interface\":\"ap0\""));
    }
}
