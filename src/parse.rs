/// Token extraction for single lines of `ping` / `ping -D` output.
///
/// Typical input:
///
/// ```text
/// PING 8.8.8.8 (8.8.8.8) 56(84) bytes of data.
/// [1597166438.798339] 64 bytes from 8.8.8.8: icmp_seq=1 ttl=118 time=14.2 ms
/// [1597245144.447473] 64 bytes from 8.8.8.8: icmp_seq=877 ttl=118 time=244 ms (DUP!)
/// [1597411489.934841] From x.x.x.x icmp_seq=14 Packet filtered
/// ```
///
/// Every function here is pure: a line in, an optional value out.
use regex::Regex;
use std::sync::LazyLock;

/// Prefix of the banner line `ping` prints once at startup.
pub const BANNER_PREFIX: &str = "PING ";

/// `seq=` followed by the sequence digits (matches `icmp_seq=` too).
static SEQUENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"seq=([0-9]*)").unwrap());

/// Numeric timestamp in square brackets, as printed by `ping -D`.
static TIMESTAMP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([0-9]+(?:[.,][0-9]*)?)\]").unwrap());

/// `time=<number> ms`, with `.` or `,` as decimal separator.
static ROUND_TRIP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"time=([0-9]+(?:[.,][0-9]*)?) ms").unwrap());

/// Whether the line is the startup banner.
pub fn is_banner(line: &str) -> bool {
    line.starts_with(BANNER_PREFIX)
}

/// Bracketed unix timestamp embedded in the line, if any.
pub fn timestamp(line: &str) -> Option<f64> {
    let caps = TIMESTAMP.captures(line)?;
    parse_decimal(&caps[1])
}

/// Sequence number following the first `seq=` in the line.
///
/// A marker with no digits, or digits that overflow, yields `None`.
pub fn sequence(line: &str) -> Option<u32> {
    let caps = SEQUENCE.captures(line)?;
    caps[1].parse().ok()
}

/// Round-trip time in milliseconds from the `time=<number> ms` token.
pub fn round_trip_ms(line: &str) -> Option<f64> {
    let caps = ROUND_TRIP.captures(line)?;
    parse_decimal(&caps[1])
}

/// Whether anything follows the `time=<number> ms` token, e.g. `(DUP!)`.
///
/// Expects a line with trailing whitespace already stripped.
pub fn has_suffix_after_round_trip(line: &str) -> bool {
    ROUND_TRIP
        .find(line)
        .is_some_and(|m| m.end() < line.len())
}

/// Parse a number that may use `,` as decimal separator.
fn parse_decimal(text: &str) -> Option<f64> {
    text.replace(',', ".").parse().ok()
}
