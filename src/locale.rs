// Locale advisory: localized `ping` output (e.g. `Zeit=12.3 ms`) cannot
// be parsed, so a non-English locale earns a one-time warning.

/// Warning text if the effective locale is likely to localize ping output.
///
/// `LC_ALL` takes precedence over `LANG`; empty values count as unset.
pub fn locale_warning(lc_all: Option<&str>, lang: Option<&str>) -> Option<String> {
    let (name, value) = match lc_all.filter(|v| !v.is_empty()) {
        Some(v) => ("LC_ALL", v),
        None => ("LANG", lang.filter(|v| !v.is_empty())?),
    };

    let neutral = value == "C" || value == "POSIX" || value.starts_with("C.");
    if neutral || value.starts_with("en") {
        return None;
    }

    Some(format!(
        "{name}={value} selects a language other than English; ping output may not be \
         parseable (e.g. \"Zeit=12.3 ms\" instead of \"time=12.3 ms\"). \
         Consider running ping with LC_ALL=C."
    ))
}

/// Check the process environment and log the advisory once.
pub fn warn_if_localized() {
    let lc_all = std::env::var("LC_ALL").ok();
    let lang = std::env::var("LANG").ok();
    if let Some(msg) = locale_warning(lc_all.as_deref(), lang.as_deref()) {
        tracing::warn!("{msg}");
    }
}
