//! Serde helpers for human-readable durations (`"250ms"`, `"30s"`, `"2m"`).
//!
//! Use with `#[serde(with = "verdict_common::duration_serde")]`.

use serde::{Deserialize, Deserializer, Serializer};
use std::time::Duration;

pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_duration(*duration))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_duration(&s).map_err(serde::de::Error::custom)
}

/// Formats whole seconds as `"Ns"` and anything finer as `"Nms"`.
pub fn format_duration(duration: Duration) -> String {
    if duration.subsec_millis() == 0 {
        format!("{}s", duration.as_secs())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    // "ms" before "s" since "ms" ends with 's'
    if let Some(num) = s.strip_suffix("ms") {
        let millis: u64 = num.trim().parse().map_err(|_| format!("Invalid duration: {}", s))?;
        Ok(Duration::from_millis(millis))
    } else if let Some(num) = s.strip_suffix('s') {
        let secs: u64 = num.trim().parse().map_err(|_| format!("Invalid duration: {}", s))?;
        Ok(Duration::from_secs(secs))
    } else if let Some(num) = s.strip_suffix('m') {
        let mins: u64 = num.trim().parse().map_err(|_| format!("Invalid duration: {}", s))?;
        let secs = mins
            .checked_mul(60)
            .ok_or_else(|| format!("Duration too large: {}", s))?;
        Ok(Duration::from_secs(secs))
    } else {
        Err(format!("Duration must end with 's', 'ms', or 'm': {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_units() {
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration(" 5 s ").unwrap(), Duration::from_secs(5));
    }

    #[test]
    fn test_parse_rejects_overflowing_minutes() {
        let err = parse_duration(&format!("{}m", u64::MAX)).unwrap_err();
        assert!(err.contains("too large"));
        assert_eq!(
            parse_duration(&format!("{}s", u64::MAX)).unwrap(),
            Duration::from_secs(u64::MAX)
        );
    }

    #[test]
    fn test_parse_rejects_unknown_suffix() {
        assert!(parse_duration("5h").is_err());
        assert!(parse_duration("fast").is_err());
        assert!(parse_duration("1.5s").is_err());
    }

    #[test]
    fn test_format() {
        assert_eq!(format_duration(Duration::from_secs(60)), "60s");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1500ms");
    }
}
