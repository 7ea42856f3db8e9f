// src/utils/system.rs
//! Host information used at registration, and home directory lookup.

use std::net::IpAddr;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Hostname of this machine
pub fn hostname() -> String {
    gethostname::gethostname().to_string_lossy().to_string()
}

/// Non-loopback local addresses reported at registration.
///
/// IPv4 addresses are always included; IPv6 addresses are included unless
/// link-local (fe80::/10).
pub fn local_ips() -> Vec<String> {
    let addrs = pnet::datalink::interfaces()
        .into_iter()
        .flat_map(|iface| iface.ips.into_iter().map(|network| network.ip()));

    let ips = select_registration_ips(addrs);
    if ips.is_empty() {
        warn!("No non-loopback addresses found for registration");
    } else {
        debug!("Local addresses for registration: {:?}", ips);
    }
    ips
}

/// Filter applied by [`local_ips`]
pub fn select_registration_ips<I>(addrs: I) -> Vec<String>
where
    I: IntoIterator<Item = IpAddr>,
{
    addrs
        .into_iter()
        .filter(|ip| !ip.is_loopback())
        .filter(|ip| match ip {
            IpAddr::V4(_) => true,
            IpAddr::V6(v6) => (v6.segments()[0] & 0xffc0) != 0xfe80,
        })
        .map(|ip| ip.to_string())
        .collect()
}

/// Home directory of the user running the agent
#[cfg(unix)]
pub fn home_dir() -> Option<PathBuf> {
    use nix::unistd::{getuid, User};

    match User::from_uid(getuid()) {
        Ok(Some(user)) => Some(user.dir),
        _ => std::env::var_os("HOME").map(PathBuf::from),
    }
}

#[cfg(not(unix))]
pub fn home_dir() -> Option<PathBuf> {
    std::env::var_os("USERPROFILE")
        .or_else(|| std::env::var_os("HOME"))
        .map(PathBuf::from)
}
