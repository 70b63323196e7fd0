//! Validation of user-supplied identifiers, reasons and durations.
//!
//! Instance, phase, unit and candidate ids end up in file names under
//! `.phasegate/`, so they are checked before any path is built from them.

use anyhow::{bail, Result};
use chrono::Duration;

/// Maximum allowed length for ids.
pub const MAX_ID_LENGTH: usize = 128;

/// Maximum allowed length for skip reasons and reviewer feedback.
pub const MAX_REASON_LENGTH: usize = 2000;

const RESERVED_NAMES: &[&str] = &[
    ".", "..", "con", "prn", "aux", "nul", "com1", "com2", "com3", "com4", "lpt1", "lpt2", "lpt3",
];

/// Validates that an id is safe for use in file paths.
///
/// ```
/// use phasegate::validation::validate_id;
///
/// assert!(validate_id("feature-login").is_ok());
/// assert!(validate_id("../etc/passwd").is_err());
/// ```
pub fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() {
        bail!("ID cannot be empty");
    }

    if id.len() > MAX_ID_LENGTH {
        bail!("ID too long: {} characters (max {MAX_ID_LENGTH})", id.len());
    }

    let valid_chars = id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid_chars {
        bail!("ID '{id}' contains invalid characters. Use only alphanumeric characters, dashes (-), and underscores (_)");
    }

    if RESERVED_NAMES.contains(&id.to_lowercase().as_str()) {
        bail!("ID '{id}' uses a reserved name");
    }

    Ok(())
}

/// Validates a free-text reason or feedback string. Empty text is rejected.
pub fn validate_reason(reason: &str) -> Result<()> {
    let trimmed = reason.trim();
    if trimmed.is_empty() {
        bail!("Reason cannot be empty");
    }
    if trimmed.len() > MAX_REASON_LENGTH {
        bail!(
            "Reason too long: {} characters (max {MAX_REASON_LENGTH})",
            trimmed.len()
        );
    }
    Ok(())
}

/// Parse a queue time-to-live such as `90s`, `45m`, `24h` or `7d`.
///
/// A bare number is read as hours.
pub fn parse_ttl(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        bail!("TTL cannot be empty");
    }

    let (digits, unit) = match s.char_indices().find(|(_, c)| !c.is_ascii_digit()) {
        Some((idx, _)) => (&s[..idx], &s[idx..]),
        None => (s, "h"),
    };

    let value: i64 = digits
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid TTL '{s}': expected a number followed by s, m, h or d"))?;
    if value <= 0 {
        bail!("TTL must be positive: '{s}'");
    }

    let ttl = match unit {
        "s" => Duration::try_seconds(value),
        "m" => Duration::try_minutes(value),
        "h" => Duration::try_hours(value),
        "d" => Duration::try_days(value),
        other => bail!("Invalid TTL unit '{other}' in '{s}': use s, m, h or d"),
    };

    ttl.ok_or_else(|| anyhow::anyhow!("TTL out of range: '{s}'"))
}

/// Clap value parser for id arguments.
pub fn clap_id_validator(s: &str) -> Result<String, String> {
    validate_id(s).map_err(|e| e.to_string())?;
    Ok(s.to_string())
}

/// Clap value parser for TTL arguments.
pub fn clap_ttl_validator(s: &str) -> Result<Duration, String> {
    parse_ttl(s).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_id_valid() {
        assert!(validate_id("feature-20260101-ab12").is_ok());
        assert!(validate_id("design_review").is_ok());
        assert!(validate_id("a").is_ok());
    }

    #[test]
    fn test_validate_id_invalid() {
        assert!(validate_id("").unwrap_err().to_string().contains("cannot be empty"));
        assert!(validate_id(&"a".repeat(MAX_ID_LENGTH + 1))
            .unwrap_err()
            .to_string()
            .contains("too long"));
        assert!(validate_id("phase/one").is_err());
        assert!(validate_id("unit one").is_err());
        assert!(validate_id("NUL").is_err());
    }

    #[test]
    fn test_validate_reason() {
        assert!(validate_reason("covered by upstream suite").is_ok());
        assert!(validate_reason("  ").is_err());
        assert!(validate_reason(&"x".repeat(MAX_REASON_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_parse_ttl() {
        assert_eq!(parse_ttl("90s").unwrap(), Duration::seconds(90));
        assert_eq!(parse_ttl("45m").unwrap(), Duration::minutes(45));
        assert_eq!(parse_ttl("24h").unwrap(), Duration::hours(24));
        assert_eq!(parse_ttl("7d").unwrap(), Duration::days(7));
        assert_eq!(parse_ttl("12").unwrap(), Duration::hours(12));
        assert!(parse_ttl("0h").is_err());
        assert!(parse_ttl("3w").is_err());
        assert!(parse_ttl("h").is_err());
    }

    #[test]
    fn test_clap_validators() {
        assert!(clap_id_validator("ok-id").is_ok());
        assert!(clap_id_validator("../bad").is_err());
        assert!(clap_ttl_validator("1d").is_ok());
        assert!(clap_ttl_validator("soon").is_err());
    }
}
