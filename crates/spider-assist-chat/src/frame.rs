use tracing::debug;

/// Prefix that marks a line as a data frame.
pub const DATA_PREFIX: &str = "data: ";
/// Payload that ends the stream regardless of anything else on the line.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Classification of one complete line of the response body.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FrameEvent {
    /// Blank line, comment, non-data field, malformed payload, or empty delta.
    Ignored,
    /// Assistant text fragment carried by the frame.
    Delta(String),
    /// The sentinel frame: no more deltas follow.
    Done,
}

/// Classifies a line and extracts its content delta.
///
/// A malformed payload costs exactly one frame: it is logged and reported as
/// `Ignored`, and the caller keeps reading.
pub fn parse_line(line: &str) -> FrameEvent {
    let Some(rest) = line.strip_prefix(DATA_PREFIX) else {
        return FrameEvent::Ignored;
    };
    let payload = rest.trim();
    if payload == DONE_SENTINEL {
        return FrameEvent::Done;
    }

    let value: serde_json::Value = match serde_json::from_str(payload) {
        Ok(value) => value,
        Err(err) => {
            debug!(
                event = "chat.frame_dropped",
                domain = "chat",
                error = %err,
                payload_len = payload.len() as u64,
                "dropping malformed data frame"
            );
            return FrameEvent::Ignored;
        }
    };
    match delta_content(&value) {
        Some(text) if !text.is_empty() => FrameEvent::Delta(text.to_string()),
        _ => FrameEvent::Ignored,
    }
}

/// Reads `choices[0].delta.content`.
fn delta_content(value: &serde_json::Value) -> Option<&str> {
    value
        .get("choices")
        .and_then(|v| v.get(0))
        .and_then(|choice| choice.get("delta"))
        .and_then(|delta| delta.get("content"))
        .and_then(|v| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_delta_content() {
        assert_eq!(
            parse_line(r#"data: {"choices":[{"delta":{"content":"Hello"}}]}"#),
            FrameEvent::Delta("Hello".into())
        );
    }

    #[test]
    fn sentinel_ends_stream_with_surrounding_whitespace() {
        assert_eq!(parse_line("data: [DONE]"), FrameEvent::Done);
        assert_eq!(parse_line("data:  [DONE]  \r"), FrameEvent::Done);
    }

    #[test]
    fn non_data_lines_are_ignored() {
        for line in ["", ": keep-alive", "event: message", "id: 7", "data:[DONE]"] {
            assert_eq!(parse_line(line), FrameEvent::Ignored, "line {line:?}");
        }
    }

    #[test]
    fn malformed_payload_is_swallowed() {
        assert_eq!(parse_line("data: not-json"), FrameEvent::Ignored);
        assert_eq!(parse_line(r#"data: {"choices":[{"delta":"#), FrameEvent::Ignored);
    }

    #[test]
    fn missing_or_empty_content_is_a_no_op() {
        for line in [
            r#"data: {"choices":[]}"#,
            r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#,
            r#"data: {"choices":[{"delta":{"content":""}}]}"#,
            r#"data: {"choices":[{"delta":{"content":null}}]}"#,
            r#"data: {"id":"x"}"#,
        ] {
            assert_eq!(parse_line(line), FrameEvent::Ignored, "line {line:?}");
        }
    }

    #[test]
    fn only_the_first_choice_is_read() {
        let line = r#"data: {"choices":[{"delta":{"content":"a"}},{"delta":{"content":"b"}}]}"#;
        assert_eq!(parse_line(line), FrameEvent::Delta("a".into()));
    }
}
