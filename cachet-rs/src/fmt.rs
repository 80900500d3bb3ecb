//! Provides parsing and formatting helpers for durations and byte sizes.
//!
//! Both are used when reading the cache settings from the config (e.g. `ttl: 5m` or
//! `max_memory: 50m`) and when rendering statistics or log messages.
use std::fmt::Write;
use std::time::Duration;

/// Units used to render byte sizes, each one being 1024 times larger than the previous one.
const SIZE_UNITS: [&str; 6] = ["bytes", "KiB", "MiB", "GiB", "TiB", "PiB"];

/// Units used to render durations along with their length in milliseconds.
const DURATION_UNITS: [(&str, u128); 5] = [
    ("d", 24 * 60 * 60 * 1000),
    ("h", 60 * 60 * 1000),
    ("m", 60 * 1000),
    ("s", 1000),
    ("ms", 1),
];

/// Formats a given size in bytes.
///
/// Picks the largest binary unit which keeps the value above 1 and renders three significant
/// digits.
///
/// # Examples
///
/// ```
/// assert_eq!(cachet::fmt::format_size(0), "0 bytes");
/// assert_eq!(cachet::fmt::format_size(1), "1 byte");
/// assert_eq!(cachet::fmt::format_size(100), "100 bytes");
/// assert_eq!(cachet::fmt::format_size(8_734), "8.53 KiB");
/// assert_eq!(cachet::fmt::format_size(87_340), "85.3 KiB");
/// assert_eq!(cachet::fmt::format_size(873_400), "853 KiB");
/// assert_eq!(cachet::fmt::format_size(52_428_800), "50.0 MiB");
/// ```
pub fn format_size(size_in_bytes: usize) -> String {
    if size_in_bytes == 1 {
        return "1 byte".to_owned();
    }
    if size_in_bytes < 1024 {
        return format!("{} bytes", size_in_bytes);
    }

    let mut value = size_in_bytes as f64;
    let mut unit = 0;
    while value >= 1024. && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.;
        unit += 1;
    }

    if value < 10. {
        format!("{:.2} {}", value, SIZE_UNITS[unit])
    } else if value < 100. {
        format!("{:.1} {}", value, SIZE_UNITS[unit])
    } else {
        format!("{:.0} {}", value, SIZE_UNITS[unit])
    }
}

/// Parses a size expression like `512`, `8k` or `50 M` into a number of bytes.
///
/// Accepted suffixes (case insensitive) are **b**, **k**, **m**, **g** and **t**, each one being
/// a power of 1024.
///
/// # Examples
///
/// ```
/// assert_eq!(cachet::fmt::parse_size("100").unwrap(), 100);
/// assert_eq!(cachet::fmt::parse_size("100b").unwrap(), 100);
/// assert_eq!(cachet::fmt::parse_size("8k").unwrap(), 8192);
/// assert_eq!(cachet::fmt::parse_size("50 M").unwrap(), 50 * 1024 * 1024);
///
/// // Unknown suffixes, fractions and negative numbers are rejected...
/// assert_eq!(cachet::fmt::parse_size("3 Y").is_err(), true);
/// assert_eq!(cachet::fmt::parse_size("1.2g").is_err(), true);
/// assert_eq!(cachet::fmt::parse_size("-1").is_err(), true);
/// ```
pub fn parse_size(expression: impl AsRef<str>) -> anyhow::Result<usize> {
    lazy_static::lazy_static! {
        static ref SIZE_EXPRESSION: regex::Regex =
            regex::Regex::new(r"^\s*(\d+)\s*([bBkKmMgGtT]?)\s*$").unwrap();
    }

    let expression = expression.as_ref();
    let captures = SIZE_EXPRESSION.captures(expression).ok_or_else(|| {
        anyhow::anyhow!(
            "Cannot parse '{}' into a size. \
             Expected a positive number and optionally 'b', 'k', 'm', 'g' or 't' as suffix.",
            expression
        )
    })?;

    let number = captures[1].parse::<usize>()?;
    let exponent = match captures[2].to_ascii_lowercase().as_str() {
        "k" => 1,
        "m" => 2,
        "g" => 3,
        "t" => 4,
        _ => 0,
    };

    number
        .checked_mul(1024usize.pow(exponent))
        .ok_or_else(|| anyhow::anyhow!("The size '{}' is too large.", expression))
}

/// Parses a duration expression like `250ms`, `30s` or `5 m`.
///
/// Accepted suffixes (case insensitive) are **ms**, **s**, **m**, **h** and **d**. A plain
/// number is treated as milliseconds.
///
/// # Examples
///
/// ```
/// # use std::time::Duration;
/// assert_eq!(cachet::fmt::parse_duration("100").unwrap(), Duration::from_millis(100));
/// assert_eq!(cachet::fmt::parse_duration("100 ms").unwrap(), Duration::from_millis(100));
/// assert_eq!(cachet::fmt::parse_duration("12 s").unwrap(), Duration::from_secs(12));
/// assert_eq!(cachet::fmt::parse_duration("5M").unwrap(), Duration::from_secs(5 * 60));
/// assert_eq!(cachet::fmt::parse_duration("2h").unwrap(), Duration::from_secs(2 * 60 * 60));
/// assert_eq!(cachet::fmt::parse_duration("1d").unwrap(), Duration::from_secs(24 * 60 * 60));
///
/// assert_eq!(cachet::fmt::parse_duration("3 Y").is_err(), true);
/// assert_eq!(cachet::fmt::parse_duration("-1m").is_err(), true);
/// ```
pub fn parse_duration(expression: impl AsRef<str>) -> anyhow::Result<Duration> {
    lazy_static::lazy_static! {
        static ref DURATION_EXPRESSION: regex::Regex =
            regex::Regex::new(r"^\s*(\d+)\s*((?i:ms|s|m|h|d))?\s*$").unwrap();
    }

    let expression = expression.as_ref();
    let captures = DURATION_EXPRESSION.captures(expression).ok_or_else(|| {
        anyhow::anyhow!(
            "Cannot parse '{}' into a duration. \
             Expected a positive number and optionally 'ms', 's', 'm', 'h' or 'd' as suffix.",
            expression
        )
    })?;

    let number = captures[1].parse::<u64>()?;
    let suffix = captures
        .get(2)
        .map(|suffix| suffix.as_str().to_ascii_lowercase())
        .unwrap_or_default();

    let seconds_per_unit = match suffix.as_str() {
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        _ => return Ok(Duration::from_millis(number)),
    };

    number
        .checked_mul(seconds_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| anyhow::anyhow!("The duration '{}' is too large.", expression))
}

/// Formats a duration into a string like "1d 3h 17m 2s 12ms".
///
/// Units with a value of zero are skipped.
///
/// # Examples
///
/// ```
/// # use std::time::Duration;
/// assert_eq!(cachet::fmt::format_duration(Duration::from_millis(0)), "0ms");
/// assert_eq!(cachet::fmt::format_duration(Duration::from_millis(13)), "13ms");
/// assert_eq!(cachet::fmt::format_duration(Duration::from_millis(62_013)), "1m 2s 13ms");
/// assert_eq!(cachet::fmt::format_duration(Duration::from_secs(60 * 61)), "1h 1m");
/// assert_eq!(cachet::fmt::format_duration(Duration::from_secs(24 * 60 * 60 + 59)), "1d 59s");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let mut remaining = duration.as_millis();
    if remaining == 0 {
        return "0ms".to_owned();
    }

    let mut result = String::new();
    for (suffix, millis) in DURATION_UNITS {
        let amount = remaining / millis;
        if amount > 0 {
            if !result.is_empty() {
                result.push(' ');
            }
            let _ = write!(result, "{}{}", amount, suffix);
            remaining %= millis;
        }
    }

    result
}
