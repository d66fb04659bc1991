//! Channel reporting and band/channel resolution policy.
//!
//! The manager does not choose frequencies itself; it delegates to a
//! [`ChannelPolicy`] and only consumes the outcome. What it does keep is
//! the last channel the driver reported after a switch, which feeds
//! band-preference-violation detection.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{Band, CountryCode, NetworkProfile};

/// 2.4 GHz channel frequencies span 2401-2495 MHz.
const FREQ_2GHZ_MIN_MHZ: u32 = 2401;
const FREQ_2GHZ_MAX_MHZ: u32 = 2495;

/// 5 GHz channel frequencies span 5160-5885 MHz.
const FREQ_5GHZ_MIN_MHZ: u32 = 5160;
const FREQ_5GHZ_MAX_MHZ: u32 = 5885;

/// Default 2.4 GHz channel when the policy has no allow-list.
const DEFAULT_2GHZ_CHANNEL: u16 = 6;

/// First non-DFS 5 GHz channel, the default 5 GHz pick.
const DEFAULT_5GHZ_CHANNEL: u16 = 36;

/// Returns `true` when the frequency lies in the 2.4 GHz band.
#[must_use]
pub const fn is_24ghz(frequency_mhz: u32) -> bool {
    frequency_mhz >= FREQ_2GHZ_MIN_MHZ && frequency_mhz <= FREQ_2GHZ_MAX_MHZ
}

/// Returns `true` when the frequency lies in the 5 GHz band.
#[must_use]
pub const fn is_5ghz(frequency_mhz: u32) -> bool {
    frequency_mhz >= FREQ_5GHZ_MIN_MHZ && frequency_mhz <= FREQ_5GHZ_MAX_MHZ
}

/// The channel the driver last reported after a successful switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedChannel {
    /// Center frequency in MHz.
    pub frequency_mhz: u32,

    /// Channel bandwidth in MHz.
    pub bandwidth_mhz: u32,
}

impl ReportedChannel {
    /// Returns `true` when the reported frequency contradicts the
    /// requested band. Used only for violation accounting, never for
    /// control decisions.
    #[must_use]
    pub const fn violates_band_preference(&self, requested: Band) -> bool {
        match requested {
            Band::TwoGhz => is_5ghz(self.frequency_mhz),
            Band::FiveGhz => is_24ghz(self.frequency_mhz),
            Band::Any => false,
        }
    }
}

impl fmt::Display for ReportedChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} MHz / {} MHz", self.frequency_mhz, self.bandwidth_mhz)
    }
}

/// Errors from band/channel resolution.
///
/// The no-channel case is kept distinct so the caller can report a
/// specific start-failure reason.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ChannelError {
    /// The requested band has no usable channel.
    #[error("no usable channel in the requested band")]
    NoChannel,

    /// Any other resolution fault.
    #[error("channel resolution failed: {0}")]
    Generic(String),
}

/// Policy collaborator that resolves a requested band into a concrete
/// band/channel pair on a private copy of the network profile.
pub trait ChannelPolicy: Send + Sync {
    /// Rewrites `profile.band` and `profile.channel` to concrete values.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::NoChannel`] when the requested band is
    /// exhausted, [`ChannelError::Generic`] for anything else.
    fn resolve(
        &self,
        country: Option<&CountryCode>,
        profile: &mut NetworkProfile,
    ) -> Result<(), ChannelError>;
}

/// Table-driven default policy.
///
/// 2.4 GHz picks from an optional allow-list (first entry) or channel 6;
/// 5 GHz picks channel 36 and requires a country code; `Any` prefers
/// 5 GHz when regulatory information permits and falls back to 2.4 GHz.
#[derive(Debug, Clone, Default)]
pub struct DefaultChannelPolicy {
    allowed_2ghz_channels: Option<Vec<u16>>,
}

impl DefaultChannelPolicy {
    /// Creates the policy with no 2.4 GHz allow-list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts 2.4 GHz picks to the given channels. An empty list
    /// makes every 2.4 GHz request fail with `NoChannel`.
    #[must_use]
    pub fn with_allowed_2ghz_channels(mut self, channels: Vec<u16>) -> Self {
        self.allowed_2ghz_channels = Some(channels);
        self
    }

    fn pick_2ghz(&self) -> Result<u16, ChannelError> {
        match &self.allowed_2ghz_channels {
            Some(channels) => channels.first().copied().ok_or(ChannelError::NoChannel),
            None => Ok(DEFAULT_2GHZ_CHANNEL),
        }
    }
}

impl ChannelPolicy for DefaultChannelPolicy {
    fn resolve(
        &self,
        country: Option<&CountryCode>,
        profile: &mut NetworkProfile,
    ) -> Result<(), ChannelError> {
        match profile.band {
            Band::TwoGhz => {
                profile.channel = Some(self.pick_2ghz()?);
            },
            Band::FiveGhz => {
                if country.is_none() {
                    return Err(ChannelError::NoChannel);
                }
                profile.channel = Some(DEFAULT_5GHZ_CHANNEL);
            },
            Band::Any => {
                if country.is_some() {
                    profile.band = Band::FiveGhz;
                    profile.channel = Some(DEFAULT_5GHZ_CHANNEL);
                } else {
                    profile.band = Band::TwoGhz;
                    profile.channel = Some(self.pick_2ghz()?);
                }
            },
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Security;

    fn profile(band: Band) -> NetworkProfile {
        NetworkProfile {
            ssid: "lounge".to_string(),
            security: Security::Open,
            hidden: false,
            band,
            channel: None,
        }
    }

    fn country() -> CountryCode {
        "US".parse().unwrap()
    }

    #[test]
    fn test_band_classification() {
        assert!(is_24ghz(2437));
        assert!(!is_24ghz(5180));
        assert!(is_5ghz(5180));
        assert!(!is_5ghz(2437));
    }

    #[test]
    fn test_violation_detection() {
        let on_5ghz = ReportedChannel {
            frequency_mhz: 5180,
            bandwidth_mhz: 80,
        };
        assert!(on_5ghz.violates_band_preference(Band::TwoGhz));
        assert!(!on_5ghz.violates_band_preference(Band::FiveGhz));
        assert!(!on_5ghz.violates_band_preference(Band::Any));

        let on_24ghz = ReportedChannel {
            frequency_mhz: 2437,
            bandwidth_mhz: 20,
        };
        assert!(on_24ghz.violates_band_preference(Band::FiveGhz));
        assert!(!on_24ghz.violates_band_preference(Band::TwoGhz));
    }

    #[test]
    fn test_default_policy_2ghz() {
        let policy = DefaultChannelPolicy::new();
        let mut p = profile(Band::TwoGhz);
        policy.resolve(None, &mut p).unwrap();
        assert_eq!(p.band, Band::TwoGhz);
        assert_eq!(p.channel, Some(6));
    }

    #[test]
    fn test_allow_list_is_honored() {
        let policy = DefaultChannelPolicy::new().with_allowed_2ghz_channels(vec![1, 11]);
        let mut p = profile(Band::TwoGhz);
        policy.resolve(None, &mut p).unwrap();
        assert_eq!(p.channel, Some(1));

        let empty = DefaultChannelPolicy::new().with_allowed_2ghz_channels(Vec::new());
        let mut p = profile(Band::TwoGhz);
        assert_eq!(empty.resolve(None, &mut p), Err(ChannelError::NoChannel));
    }

    #[test]
    fn test_5ghz_requires_country() {
        let policy = DefaultChannelPolicy::new();
        let mut p = profile(Band::FiveGhz);
        assert_eq!(policy.resolve(None, &mut p), Err(ChannelError::NoChannel));

        let code = country();
        policy.resolve(Some(&code), &mut p).unwrap();
        assert_eq!(p.channel, Some(36));
    }

    #[test]
    fn test_any_prefers_5ghz_with_country() {
        let policy = DefaultChannelPolicy::new();
        let code = country();

        let mut p = profile(Band::Any);
        policy.resolve(Some(&code), &mut p).unwrap();
        assert_eq!(p.band, Band::FiveGhz);

        let mut p = profile(Band::Any);
        policy.resolve(None, &mut p).unwrap();
        assert_eq!(p.band, Band::TwoGhz);
        assert_eq!(p.channel, Some(6));
    }
}
