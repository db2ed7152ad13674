/// Wall-clock access and human-readable timestamp rendering.
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local, Utc};

/// Current time as fractional unix seconds.
pub fn now_unix() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Render fractional unix seconds in the local time zone using a strftime format.
///
/// Timestamps chrono cannot represent (absurdly large values from a garbled
/// line) fall back to the plain number rather than panicking.
pub fn render_timestamp(timestamp: f64, format: &str) -> String {
    if !timestamp.is_finite() {
        return timestamp.to_string();
    }
    let secs = timestamp.floor();
    let nanos = (((timestamp - secs) * 1e9) as u32).min(999_999_999);
    match DateTime::<Utc>::from_timestamp(secs as i64, nanos) {
        Some(dt) => dt.with_timezone(&Local).format(format).to_string(),
        None => timestamp.to_string(),
    }
}

/// Whether chrono can render every specifier in `format`.
///
/// `DelayedFormat` panics on `to_string()` for an invalid specifier, so
/// formats are checked once at startup.
pub fn is_valid_format(format: &str) -> bool {
    !StrftimeItems::new(format).any(|item| item == Item::Error)
}
