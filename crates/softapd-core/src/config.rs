//! AP configuration types.
//!
//! An [`ApConfiguration`] is the caller-supplied description of the
//! network to bring up: operating mode plus a [`NetworkProfile`]. The
//! profile is immutable once bring-up begins for a run; channel
//! resolution works on a private copy so the caller's profile is never
//! rewritten in place.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::StartError;

/// Why the AP exists: tethering for other devices or a local-only
/// network. Bound once per manager instance via the role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatingMode {
    /// Shares upstream connectivity with associated clients.
    Tethered,
    /// Local-only network with no upstream forwarding.
    LocalOnly,
}

impl OperatingMode {
    /// Returns the mode as a stable string identifier.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Tethered => "tethered",
            Self::LocalOnly => "local_only",
        }
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requested radio band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Band {
    /// 2.4 GHz only.
    #[serde(rename = "2ghz")]
    TwoGhz,
    /// 5 GHz only. Requires a known country code.
    #[serde(rename = "5ghz")]
    FiveGhz,
    /// No preference; the channel policy picks.
    Any,
}

impl Band {
    /// Returns the band as a stable string identifier.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TwoGhz => "2ghz",
            Self::FiveGhz => "5ghz",
            Self::Any => "any",
        }
    }

    /// Returns `true` when regulatory information is mandatory for this
    /// band request.
    #[must_use]
    pub const fn requires_country_code(&self) -> bool {
        matches!(self, Self::FiveGhz)
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Link-layer security for the broadcast network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Security {
    /// Open network, no authentication.
    Open,
    /// WPA2-PSK with the given passphrase.
    Wpa2Psk {
        /// Pre-shared passphrase, 8-63 printable ASCII characters.
        passphrase: String,
    },
}

impl Security {
    /// Returns the security kind as a stable string identifier.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Wpa2Psk { .. } => "wpa2_psk",
        }
    }
}

/// The network identity and radio parameters to broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkProfile {
    /// Network name. Must be non-empty for bring-up to proceed.
    pub ssid: String,

    /// Link-layer security.
    pub security: Security,

    /// Whether the SSID is withheld from beacons.
    #[serde(default)]
    pub hidden: bool,

    /// Requested band. Channel resolution may rewrite this on its
    /// private copy (e.g. `Any` collapsing to a concrete band).
    pub band: Band,

    /// Concrete channel number, filled in by channel resolution.
    /// Caller-supplied values are treated as hints and may be replaced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<u16>,
}

/// Full AP configuration: target mode plus network profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApConfiguration {
    /// Target operating mode.
    pub mode: OperatingMode,

    /// Network profile to broadcast.
    pub profile: NetworkProfile,
}

impl ApConfiguration {
    /// Validates that the configuration carries a usable network
    /// identity.
    ///
    /// # Errors
    ///
    /// Returns [`StartError::ConfigInvalid`] when the SSID is empty or
    /// the WPA2 passphrase is out of range.
    pub fn validate(&self) -> Result<(), StartError> {
        if self.profile.ssid.is_empty() {
            return Err(StartError::ConfigInvalid);
        }
        if let Security::Wpa2Psk { passphrase } = &self.profile.security {
            if passphrase.len() < 8 || passphrase.len() > 63 {
                return Err(StartError::ConfigInvalid);
            }
        }
        Ok(())
    }
}

/// Errors from parsing a country code.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid country code '{0}'")]
pub struct CountryCodeError(String);

/// ISO 3166-1 alpha-2 regulatory country code, stored uppercased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CountryCode([u8; 2]);

impl CountryCode {
    /// Returns the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        // Invariant: constructed only from ASCII alphabetic bytes.
        std::str::from_utf8(&self.0).unwrap_or("??")
    }
}

impl FromStr for CountryCode {
    type Err = CountryCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() != 2 || !bytes.iter().all(u8::is_ascii_alphabetic) {
            return Err(CountryCodeError(s.to_string()));
        }
        Ok(Self([
            bytes[0].to_ascii_uppercase(),
            bytes[1].to_ascii_uppercase(),
        ]))
    }
}

impl TryFrom<String> for CountryCode {
    type Error = CountryCodeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<CountryCode> for String {
    fn from(code: CountryCode) -> Self {
        code.as_str().to_string()
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(ssid: &str) -> NetworkProfile {
        NetworkProfile {
            ssid: ssid.to_string(),
            security: Security::Open,
            hidden: false,
            band: Band::TwoGhz,
            channel: None,
        }
    }

    #[test]
    fn test_validate_accepts_open_network() {
        let config = ApConfiguration {
            mode: OperatingMode::Tethered,
            profile: profile("lounge"),
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_ssid() {
        let config = ApConfiguration {
            mode: OperatingMode::Tethered,
            profile: profile(""),
        };
        assert_eq!(config.validate(), Err(StartError::ConfigInvalid));
    }

    #[test]
    fn test_validate_checks_passphrase_bounds() {
        let mut config = ApConfiguration {
            mode: OperatingMode::LocalOnly,
            profile: profile("lounge"),
        };
        config.profile.security = Security::Wpa2Psk {
            passphrase: "short".to_string(),
        };
        assert_eq!(config.validate(), Err(StartError::ConfigInvalid));

        config.profile.security = Security::Wpa2Psk {
            passphrase: "long enough".to_string(),
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_country_code_uppercases() {
        let code: CountryCode = "de".parse().unwrap();
        assert_eq!(code.as_str(), "DE");
    }

    #[test]
    fn test_country_code_rejects_garbage() {
        assert!("".parse::<CountryCode>().is_err());
        assert!("DEU".parse::<CountryCode>().is_err());
        assert!("1A".parse::<CountryCode>().is_err());
    }

    #[test]
    fn test_band_country_requirement() {
        assert!(Band::FiveGhz.requires_country_code());
        assert!(!Band::TwoGhz.requires_country_code());
        assert!(!Band::Any.requires_country_code());
    }

    #[test]
    fn test_profile_rejects_unknown_fields() {
        let json = r#"{
            "ssid": "lounge",
            "security": "open",
            "band": "2ghz",
            "surprise": true
        }"#;
        let result: Result<NetworkProfile, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }
}
