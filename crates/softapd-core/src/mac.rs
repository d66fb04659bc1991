//! MAC address value type.
//!
//! Client identity and interface addressing both use 48-bit hardware
//! addresses. The type distinguishes factory-assigned addresses from
//! randomly generated locally-administered ones, which the bring-up
//! sequencer uses when MAC randomization is enabled.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bit 0 of the first octet: group (multicast) addresses.
const MULTICAST_BIT: u8 = 0x01;

/// Bit 1 of the first octet: locally administered addresses.
const LOCALLY_ADMINISTERED_BIT: u8 = 0x02;

/// Errors from parsing a textual MAC address.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MacParseError {
    /// The string does not have six colon-separated octets.
    #[error("expected six colon-separated octets, got '{0}'")]
    BadShape(String),

    /// An octet is not valid hexadecimal.
    #[error("invalid octet '{0}'")]
    BadOctet(String),
}

/// A 48-bit IEEE 802 hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// Creates an address from raw octets.
    #[must_use]
    pub const fn from_octets(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Returns the raw octets.
    #[must_use]
    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Generates a random locally-administered unicast address.
    ///
    /// The multicast bit is cleared and the locally-administered bit set,
    /// so the result can never collide with a factory OUI assignment.
    #[must_use]
    pub fn random_locally_administered<R: Rng>(rng: &mut R) -> Self {
        let mut octets = [0u8; 6];
        rng.fill(&mut octets[..]);
        octets[0] &= !MULTICAST_BIT;
        octets[0] |= LOCALLY_ADMINISTERED_BIT;
        Self(octets)
    }

    /// Returns `true` for unicast addresses.
    #[must_use]
    pub const fn is_unicast(&self) -> bool {
        self.0[0] & MULTICAST_BIT == 0
    }

    /// Returns `true` for locally-administered addresses.
    #[must_use]
    pub const fn is_locally_administered(&self) -> bool {
        self.0[0] & LOCALLY_ADMINISTERED_BIT != 0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl FromStr for MacAddress {
    type Err = MacParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut parts = s.split(':');
        for octet in &mut octets {
            let part = parts
                .next()
                .ok_or_else(|| MacParseError::BadShape(s.to_string()))?;
            *octet = u8::from_str_radix(part, 16)
                .map_err(|_| MacParseError::BadOctet(part.to_string()))?;
        }
        if parts.next().is_some() {
            return Err(MacParseError::BadShape(s.to_string()));
        }
        Ok(Self(octets))
    }
}

impl TryFrom<String> for MacAddress {
    type Error = MacParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> Self {
        mac.to_string()
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn test_display_round_trip() {
        let mac = MacAddress::from_octets([0x02, 0x1a, 0x2b, 0x3c, 0x4d, 0x5e]);
        assert_eq!(mac.to_string(), "02:1a:2b:3c:4d:5e");
        assert_eq!("02:1a:2b:3c:4d:5e".parse::<MacAddress>().unwrap(), mac);
    }

    #[test]
    fn test_parse_rejects_bad_shapes() {
        assert!("02:1a:2b:3c:4d".parse::<MacAddress>().is_err());
        assert!("02:1a:2b:3c:4d:5e:6f".parse::<MacAddress>().is_err());
        assert!("02:1a:2b:3c:4d:zz".parse::<MacAddress>().is_err());
        assert!("".parse::<MacAddress>().is_err());
    }

    #[test]
    fn test_random_is_locally_administered_unicast() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..64 {
            let mac = MacAddress::random_locally_administered(&mut rng);
            assert!(mac.is_unicast(), "{mac} must be unicast");
            assert!(
                mac.is_locally_administered(),
                "{mac} must be locally administered"
            );
        }
    }

    #[test]
    fn test_serde_uses_text_form() {
        let mac = MacAddress::from_octets([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
        let json = serde_json::to_string(&mac).unwrap();
        assert_eq!(json, "\"02:00:00:00:00:01\"");
        let back: MacAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, mac);
    }
}
