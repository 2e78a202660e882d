//! Local interface address resolution.

use std::net::IpAddr;

use crate::error::FrontendError;

/// Resolve an interface name to its address, preferring IPv4.
///
/// The balancer needs a concrete address to route to, so this is
/// resolved once at frontend construction and substituted for
/// wildcard-bound ports.
pub(crate) fn first_address(name: &str) -> Result<IpAddr, FrontendError> {
    let addrs = if_addrs::get_if_addrs().map_err(FrontendError::Interfaces)?;

    let mine: Vec<IpAddr> = addrs
        .into_iter()
        .filter(|addr| addr.name == name)
        .map(|addr| addr.ip())
        .collect();

    mine.iter()
        .copied()
        .find(IpAddr::is_ipv4)
        .or_else(|| mine.first().copied())
        .ok_or_else(|| FrontendError::NoAddress(name.to_string()))
}
