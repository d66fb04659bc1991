//! Bring-up sequencer.
//!
//! The ordered steps that take an acquired interface to a broadcasting
//! AP, executed once per Idle → Started attempt and short-circuiting on
//! the first fatal step: validate configuration, program the MAC
//! address, program the country code, resolve band/channel on a private
//! copy of the configuration, issue the driver start. The observational
//! tail (diagnostic capture, start timestamp) never gates success.
//!
//! Fatality is per-step policy, not uniform: failing to re-apply the
//! factory MAC is tolerated because some drivers refuse the operation
//! and the interface already carries that address; failing to apply a
//! *randomized* MAC is fatal because continuing would leak the factory
//! address. A missing or unappliable country code is fatal only when
//! the requested band strictly requires regulatory information.

use chrono::{DateTime, Local};
use tracing::{debug, error, info, warn};

use softapd_core::channel::ChannelError;
use softapd_core::{ApConfiguration, Band, ChannelPolicy, CountryCode, MacAddress, StartError};

use crate::diagnostics::Diagnostics;
use crate::driver::ApDriver;

use super::ManagerConfig;

/// Outcome of a successful bring-up.
#[derive(Debug)]
pub(crate) struct StartedAp {
    /// Configuration with band/channel resolved, as handed to the
    /// driver.
    pub(crate) resolved: ApConfiguration,

    /// Wall-clock start timestamp.
    pub(crate) started_at: DateTime<Local>,
}

/// Runs the bring-up sequence on an already-acquired interface.
///
/// The caller owns cleanup: on error the interface is still allocated
/// and must be torn down by the Idle-state failure path.
pub(crate) fn start_soft_ap(
    driver: &dyn ApDriver,
    interface: &str,
    config: &ApConfiguration,
    manager_config: &ManagerConfig,
    policy: &dyn ChannelPolicy,
    diagnostics: &dyn Diagnostics,
) -> Result<StartedAp, StartError> {
    config.validate()?;

    debug!(
        interface = %interface,
        band = %config.profile.band,
        country = ?manager_config.country_code(),
        "starting soft AP"
    );

    configure_mac(driver, interface, manager_config.randomize_mac())?;
    configure_country(
        driver,
        interface,
        manager_config.country_code(),
        config.profile.band,
    )?;

    // Band/channel resolution works on a private copy so the caller's
    // profile is never rewritten in place.
    let mut resolved = config.clone();
    policy
        .resolve(manager_config.country_code().as_ref(), &mut resolved.profile)
        .map_err(|error| match error {
            ChannelError::NoChannel => {
                error!("no usable channel for the requested band");
                StartError::NoChannelAvailable
            },
            ChannelError::Generic(message) => {
                error!(%message, "band/channel resolution failed");
                StartError::Generic(message)
            },
            other => {
                error!(error = %other, "band/channel resolution failed");
                StartError::Generic(other.to_string())
            },
        })?;

    if resolved.profile.hidden {
        debug!("soft AP network is hidden");
    }

    if !driver.start_ap(interface, &resolved) {
        error!(interface = %interface, "driver rejected AP start");
        return Err(StartError::Generic("driver rejected AP start".to_string()));
    }

    diagnostics.start_capture(interface);
    let started_at = Local::now();
    info!(interface = %interface, ssid = %resolved.profile.ssid, "soft AP started");

    Ok(StartedAp {
        resolved,
        started_at,
    })
}

/// Programs the interface MAC address according to the randomization
/// policy.
fn configure_mac(
    driver: &dyn ApDriver,
    interface: &str,
    randomize: bool,
) -> Result<(), StartError> {
    if !randomize {
        let Some(mac) = driver.factory_mac_address(interface) else {
            error!("failed to read factory MAC address");
            return Err(StartError::Generic(
                "factory MAC address unavailable".to_string(),
            ));
        };
        // Some drivers refuse to (re-)set the MAC at all; the interface
        // already carries the factory address, so fail soft.
        if !driver.set_mac_address(interface, mac) {
            warn!(%mac, "failed to reset factory MAC address; continuing with current MAC");
        }
        return Ok(());
    }

    let mac = MacAddress::random_locally_administered(&mut rand::thread_rng());
    if !driver.set_mac_address(interface, mac) {
        error!(%mac, "failed to apply randomized MAC address");
        return Err(StartError::Generic(
            "driver rejected randomized MAC address".to_string(),
        ));
    }
    Ok(())
}

/// Programs the regulatory country code with band-dependent fatality.
fn configure_country(
    driver: &dyn ApDriver,
    interface: &str,
    country: Option<CountryCode>,
    band: Band,
) -> Result<(), StartError> {
    let Some(code) = country else {
        if band.requires_country_code() {
            error!(%band, "country code required for the requested band");
            return Err(StartError::Generic(
                "country code required for 5 GHz operation".to_string(),
            ));
        }
        return Ok(());
    };

    if !driver.set_country_code(interface, &code) {
        if band.requires_country_code() {
            error!(%code, %band, "failed to apply mandatory country code");
            return Err(StartError::Generic(
                "driver rejected mandatory country code".to_string(),
            ));
        }
        warn!(%code, "failed to apply country code; continuing");
    }
    Ok(())
}
