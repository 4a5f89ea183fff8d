//! TTL and expiry header parsing, shared between the server (which
//! enforces them) and anything that needs to validate them ahead of
//! a request.

use chrono::{DateTime, Utc};

#[derive(Debug, thiserror::Error)]
pub enum TtlParseError {
    #[error("stream-ttl must be a non-negative integer number of seconds")]
    InvalidTtl,
    #[error("stream-expires-at must be an RFC3339 timestamp")]
    InvalidExpiresAt,
    #[error("stream-ttl and stream-expires-at are mutually exclusive")]
    BothGiven,
}

/// Parse the `stream-ttl` header value strictly: digits only, no sign,
/// no leading zeros other than a lone `0`, no fractional part.
pub fn parse_ttl_seconds(raw: &str) -> Result<u64, TtlParseError> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(TtlParseError::InvalidTtl);
    }
    if raw.len() > 1 && raw.starts_with('0') {
        return Err(TtlParseError::InvalidTtl);
    }
    raw.parse().map_err(|_| TtlParseError::InvalidTtl)
}

/// Parse the `stream-expires-at` header value as RFC3339.
pub fn parse_expires_at(raw: &str) -> Result<DateTime<Utc>, TtlParseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| TtlParseError::InvalidExpiresAt)
}

/// Resolve the effective expiry instant for a newly created stream,
/// given raw optional `stream-ttl` and `stream-expires-at` header
/// values and a creation instant. At most one may be provided.
pub fn resolve_expiry(
    ttl_seconds: Option<&str>,
    expires_at: Option<&str>,
    created_at: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, TtlParseError> {
    match (ttl_seconds, expires_at) {
        (Some(_), Some(_)) => Err(TtlParseError::BothGiven),
        (Some(ttl), None) => {
            let secs = parse_ttl_seconds(ttl)?;
            Ok(Some(created_at + chrono::Duration::seconds(secs as i64)))
        }
        (None, Some(exp)) => parse_expires_at(exp).map(Some),
        (None, None) => Ok(None),
    }
}

/// Whether a stream with the given resolved expiry is expired at `now`.
/// A malformed expiry never reaches here (rejected at create time), so
/// only `None` (no expiry) is "never expires".
pub fn is_expired(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    expires_at.is_some_and(|exp| now >= exp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_digit_ttl() {
        assert!(parse_ttl_seconds("-1").is_err());
        assert!(parse_ttl_seconds("1.5").is_err());
        assert!(parse_ttl_seconds("+1").is_err());
        assert!(parse_ttl_seconds("01").is_err());
    }

    #[test]
    fn accepts_zero_and_plain_digits() {
        assert_eq!(parse_ttl_seconds("0").unwrap(), 0);
        assert_eq!(parse_ttl_seconds("3600").unwrap(), 3600);
    }

    #[test]
    fn rejects_both_ttl_and_expiry() {
        let now = Utc::now();
        let err = resolve_expiry(Some("60"), Some("2030-01-01T00:00:00Z"), now).unwrap_err();
        assert!(matches!(err, TtlParseError::BothGiven));
    }
}
