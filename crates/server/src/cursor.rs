//! Opaque read-resumption cursor.
//!
//! The cursor is a coarse time bucket rather than per-record state, so
//! that repeated long-poll/catch-up requests landing in the same
//! window collapse to the same cursor value (useful if a CDN or proxy
//! sits in front of the server and wants a cache key).

#[derive(Debug, Clone, Copy)]
pub struct CursorOptions {
    pub interval_secs: u64,
}

/// Compute the response cursor for `now`, given the interval.
pub fn generate_response_cursor(now_unix_secs: u64, options: CursorOptions) -> u64 {
    let interval = options.interval_secs.max(1);
    now_unix_secs / interval
}

/// Parse a client-supplied cursor token. Unknown/malformed tokens are
/// simply ignored (the cursor has no effect on correctness, only on
/// cacheability), so this never errors.
pub fn parse_cursor(raw: &str) -> Option<u64> {
    raw.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_in_the_same_bucket_get_the_same_cursor() {
        let opts = CursorOptions { interval_secs: 5 };
        assert_eq!(
            generate_response_cursor(100, opts),
            generate_response_cursor(104, opts)
        );
        assert_ne!(
            generate_response_cursor(100, opts),
            generate_response_cursor(105, opts)
        );
    }

    #[test]
    fn parse_cursor_ignores_garbage() {
        assert_eq!(parse_cursor("not-a-number"), None);
        assert_eq!(parse_cursor("42"), Some(42));
    }
}
