use crate::error::ConfigError;
use std::time::Duration;

/// Longest accepted interval: one year.
pub const MAX_REFRESH_SECS: f64 = 365.0 * 86400.0;

/// Parse a compact refresh rate such as `"30s"`, `"5m"`, `"1h"` or `"1d"`.
///
/// The unit is the last character and must be one of `s`, `m`, `h`, `d`.
/// Input is trimmed and case-insensitive; the numeric prefix may be fractional.
///
/// # Examples
///
/// ```
/// use netpulse_common::rate::parse_refresh_rate;
/// use std::time::Duration;
///
/// assert_eq!(parse_refresh_rate(" 5M ").unwrap(), Duration::from_secs(300));
/// assert_eq!(parse_refresh_rate("1.5m").unwrap(), Duration::from_secs(90));
/// assert!(parse_refresh_rate("10w").is_err());
/// ```
pub fn parse_refresh_rate(rate: &str) -> Result<Duration, ConfigError> {
    let normalized = rate.trim().to_lowercase();
    let invalid = |reason: String| ConfigError::InvalidRefreshRate {
        rate: rate.to_string(),
        reason,
    };

    let Some(unit) = normalized.chars().last() else {
        return Err(invalid("empty value".to_string()));
    };
    let unit_secs = match unit {
        's' => 1.0,
        'm' => 60.0,
        'h' => 3600.0,
        'd' => 86400.0,
        other => {
            return Err(invalid(format!(
                "unknown unit '{other}', expected one of s, m, h, d"
            )))
        }
    };

    let number = &normalized[..normalized.len() - unit.len_utf8()];
    let value: f64 = number
        .trim()
        .parse()
        .map_err(|_| invalid(format!("'{number}' is not a number")))?;

    let secs = value * unit_secs;
    if !secs.is_finite() || secs <= 0.0 {
        return Err(invalid("interval must be greater than zero".to_string()));
    }
    if secs > MAX_REFRESH_SECS {
        return Err(invalid("interval must not exceed 365d".to_string()));
    }
    Duration::try_from_secs_f64(secs).map_err(|e| invalid(e.to_string()))
}
