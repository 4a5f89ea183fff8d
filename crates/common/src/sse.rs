//! Shared SSE framing helpers: the `control` event payload shape and
//! the newline-normalization both sides must agree on so a record
//! containing `\r\n` (or a lone `\r`) can never forge an extra
//! `data:` line on the wire.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ControlEvent {
    pub stream_next_offset: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_cursor: Option<String>,
    pub up_to_date: bool,
}

/// Normalize `\r\n` and lone `\r` to `\n` before framing a record body
/// as one or more `data:` lines. Without this, a record containing a
/// raw `\r\ndata: {"malicious":true}\r\n\r\n` could be interpreted by
/// a naive parser as extra SSE events.
pub fn normalize_newlines(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\r' {
            if chars.peek() == Some(&'\n') {
                chars.next();
            }
            out.push('\n');
        } else {
            out.push(c);
        }
    }
    out
}

/// Frame a single record body as SSE `data:` lines (without the
/// trailing blank-line terminator, which the caller appends once per
/// event alongside its `event:` line).
pub fn frame_data_lines(body: &str) -> String {
    // `split('\n')`, not `str::lines()`: `lines()` silently drops a
    // trailing empty segment, so a record body ending in `\n` would
    // round-trip as one `data:` line short.
    normalize_newlines(body)
        .split('\n')
        .map(|line| format!("data:{line}\n"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_crlf_and_lone_cr() {
        assert_eq!(normalize_newlines("a\r\nb\rc\nd"), "a\nb\nc\nd");
    }

    #[test]
    fn frames_multiline_body_as_multiple_data_lines() {
        let framed = frame_data_lines("a\r\ndata: {\"evil\":true}\r\n\r\nb");
        assert_eq!(
            framed,
            "data:a\ndata:data: {\"evil\":true}\ndata:\ndata:b\n"
        );
    }

    #[test]
    fn preserves_a_trailing_newline_as_its_own_empty_line() {
        let framed = frame_data_lines("b\n");
        assert_eq!(framed, "data:b\ndata:\n");
    }

    #[test]
    fn control_event_round_trips_through_json() {
        let ev = ControlEvent {
            stream_next_offset: "00000000000000000010_0000000000".to_string(),
            stream_cursor: Some("c1".to_string()),
            up_to_date: true,
        };
        let json = serde_json::to_string(&ev).unwrap();
        let back: ControlEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(ev, back);
    }
}
