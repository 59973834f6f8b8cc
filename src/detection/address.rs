//! Address extraction from free-form log lines

use regex::Regex;
use std::net::IpAddr;
use std::sync::OnceLock;

// IPv4 dotted quads, or colon-hex runs with an optional embedded IPv4 tail.
// Candidates are validated by `IpAddr` parsing, so timestamps like
// `12:00:00` fall through to the next candidate.
const ADDRESS_PATTERN: &str = r"\b(?:[0-9]{1,3}\.){3}[0-9]{1,3}\b|(?:[0-9A-Fa-f]{0,4}:){2,7}(?:(?:[0-9]{1,3}\.){3}[0-9]{1,3}|[0-9A-Fa-f]{0,4})";

fn address_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(ADDRESS_PATTERN).expect("address pattern is valid"))
}

/// First IPv4 or IPv6 address in the line, as written
pub fn extract_address(line: &str) -> Option<String> {
    address_regex()
        .find_iter(line)
        .map(|m| m.as_str())
        .find(|candidate| match candidate.parse::<IpAddr>() {
            Ok(ip) => !ip.is_unspecified(),
            Err(_) => false,
        })
        .map(String::from)
}
