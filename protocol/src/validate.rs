//! Validation routines shared by every binary: overlay subnet membership,
//! public key format, and CIDR parsing. Kept here (rather than duplicated in
//! `cilo-server` and `cilo-agent`) because both sides validate the same
//! wire values and must agree on the edge cases.

use ipnet::Ipv4Net;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// The overlay address space tunnel peer IPs are drawn from.
pub const OVERLAY_SUBNET: &str = "10.225.0.0/16";

/// Length of a WireGuard-style base64-encoded public key: 32 raw bytes,
/// base64-encoded with padding, is always 44 characters.
pub const PUBLIC_KEY_LEN: usize = 44;

/// Returns true exactly when `ip` parses as a bare IPv4 literal (not a CIDR,
/// not IPv6) contained in [`OVERLAY_SUBNET`].
///
/// `Ipv4Addr::from_str` rejects CIDR suffixes and empty strings on its own,
/// so the only extra work here is the subnet containment check.
pub fn validate_peer_subnet(ip: &str) -> bool {
    let Ok(addr) = Ipv4Addr::from_str(ip) else {
        return false;
    };
    let net: Ipv4Net = OVERLAY_SUBNET.parse().expect("overlay subnet is valid");
    net.contains(&addr)
}

/// Returns true when `key` has the shape of a WireGuard-style public key:
/// exactly 44 base64 characters. This is a format check only — it does not
/// verify the key decodes to a valid curve point.
pub fn validate_public_key(key: &str) -> bool {
    if key.len() != PUBLIC_KEY_LEN {
        return false;
    }
    key.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '=')
}

/// Parses a comma-separated list of CIDRs, rejecting the whole list if any
/// entry fails to parse or the list is empty.
pub fn validate_cidr(list: &str) -> Option<Vec<Ipv4Net>> {
    if list.trim().is_empty() {
        return None;
    }
    list.split(',')
        .map(|s| s.trim().parse::<Ipv4Net>().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subnet_validation_matches_spec_scenarios() {
        for ip in ["10.225.0.0", "10.225.0.1", "10.225.128.128", "10.225.255.255"] {
            assert!(validate_peer_subnet(ip), "{ip} should be valid");
        }
        for ip in [
            "10.224.255.255",
            "10.226.0.0",
            "192.168.1.1",
            "::1",
            "10.225.0.1/32",
            "",
            "not-an-ip",
        ] {
            assert!(!validate_peer_subnet(ip), "{ip} should be invalid");
        }
    }

    #[test]
    fn public_key_length_is_enforced() {
        let ok = "A".repeat(43) + "=";
        assert!(validate_public_key(&ok));
        assert!(!validate_public_key("too-short"));
        assert!(!validate_public_key(&("A".repeat(45))));
    }

    #[test]
    fn cidr_list_rejects_empty_and_malformed() {
        assert!(validate_cidr("").is_none());
        assert!(validate_cidr("not-a-cidr").is_none());
        let parsed = validate_cidr("10.225.0.1/32, 10.224.1.0/24").unwrap();
        assert_eq!(parsed.len(), 2);
    }
}
