//! Preloading of subscriber tunnel bindings from a TOML file, for hosts
//! that run without a live signaling decoder.

use super::TunnelPair;
use anyhow::{Result, bail};
use gtpv1u::{GtpTeid, TunnelEndpoint};
use serde::Deserialize;
use slog::{Logger, error, info};
use std::collections::HashMap;
use std::fs;
use std::net::Ipv4Addr;

#[derive(Deserialize, Debug)]
struct EndpointEntry {
    ip: Ipv4Addr,
    #[serde(with = "hex")]
    teid: [u8; 4],
}

#[derive(Deserialize, Debug)]
struct BindingEntry {
    radio: EndpointEntry,
    core: EndpointEntry,
}

impl From<EndpointEntry> for TunnelEndpoint {
    fn from(entry: EndpointEntry) -> Self {
        TunnelEndpoint {
            ip: entry.ip,
            teid: GtpTeid(entry.teid),
        }
    }
}

/// Load subscriber tunnel bindings from file into memory.
pub fn load_tunnels_file(filename: &str, logger: &Logger) -> Result<Vec<(Ipv4Addr, TunnelPair)>> {
    let contents = fs::read_to_string(filename).inspect_err(|e| {
        error!(
            logger,
            "Failed to load tunnel file {filename} with error code {e}"
        )
    })?;
    let table: HashMap<String, BindingEntry> = toml::from_str(&contents)?;
    let mut bindings = Vec::new();
    for (key, entry) in table.into_iter() {
        let Ok(subscriber) = key.parse::<Ipv4Addr>() else {
            bail!("Key {} in {filename} is not an IPv4 address", key)
        };
        info!(
            logger,
            "Loaded tunnel binding for UE {subscriber} from {filename}"
        );
        bindings.push((
            subscriber,
            TunnelPair {
                radio: entry.radio.into(),
                core: entry.core.into(),
            },
        ));
    }
    Ok(bindings)
}
