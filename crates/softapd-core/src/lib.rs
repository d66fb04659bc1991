//! softapd-core - Core types and policies for the soft AP lifecycle
//! manager.
//!
//! This crate holds the pure data model shared by the daemon and by
//! embedders: AP configuration, MAC address handling, the connected-client
//! registry, channel policy, the published AP state taxonomy, and the
//! bring-up error taxonomy. Nothing in here owns a runtime or a hardware
//! resource; the lifecycle state machine lives in `softapd-daemon`.

pub mod channel;
pub mod client;
pub mod config;
pub mod error;
pub mod mac;
pub mod state;

pub use channel::{ChannelError, ChannelPolicy, DefaultChannelPolicy, ReportedChannel};
pub use client::{ClientRegistry, ClientSet};
pub use config::{ApConfiguration, Band, CountryCode, NetworkProfile, OperatingMode, Security};
pub use error::{DriverError, StartError};
pub use mac::MacAddress;
pub use state::{ApState, ApStateChange, FailureReason};
