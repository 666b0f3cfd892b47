//! Outbound connection gate.
//!
//! Every connection attempt is checked here first so that user-supplied
//! server addresses cannot be used to reach hosts on the local network.
//!
//! The rule set is a fixed blocklist and is known to be incomplete:
//! IPv4 link-local (`169.254.0.0/16`), IPv6 unique-local (`fc00::/7`),
//! IPv4-mapped IPv6 loopback and other reserved ranges are *not* rejected.
//! Existing deployments depend on exactly this behavior, so the list is kept
//! as is.

use std::net::IpAddr;

/// Returns `true` when `address` must not be connected to.
///
/// `address` must be an IP literal. Hostnames are never resolved and are
/// always treated as unsafe.
pub fn is_unsafe_target(address: &str) -> bool {
    match address.parse::<IpAddr>() {
        Err(_) => true,
        Ok(IpAddr::V4(ip)) => {
            let [a, b, _, _] = ip.octets();
            a == 10 || (a == 172 && (16..=31).contains(&b)) || (a == 192 && b == 168) || a == 127
        }
        // Only the canonical literal is matched, not other spellings of ::1.
        Ok(IpAddr::V6(_)) => address == "::1",
    }
}
