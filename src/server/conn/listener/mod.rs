use std::{
    net::{IpAddr, Ipv4Addr},
    time::Duration,
};

use crate::{config::ServerConfig, errors::ServerError};

pub(crate) mod tcp;

/// Knobs the accept loop needs from [`ServerConfig`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ListenerSettings {
    pub concurrency: usize,
    pub drain_timeout: Duration,
    pub handshake_timeout: Duration,
}

impl ListenerSettings {
    pub fn from_config(config: &ServerConfig) -> ListenerSettings {
        ListenerSettings {
            concurrency: config.concurrency(),
            drain_timeout: config.drain_timeout(),
            handshake_timeout: config.handshake_timeout(),
        }
    }
}

/// Resolves the configured interface to a concrete address.
///
/// `localhost` always means the IPv4 loopback; the wildcard address is never
/// produced here.
pub fn resolve_interface(interface: &str) -> Result<IpAddr, ServerError> {
    if interface.eq_ignore_ascii_case("localhost") {
        return Ok(IpAddr::V4(Ipv4Addr::LOCALHOST));
    }

    interface
        .parse::<IpAddr>()
        .map_err(|e| ServerError::Bind(format!("invalid interface {}: {}", interface, e)))
}
