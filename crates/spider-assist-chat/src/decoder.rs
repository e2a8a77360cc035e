//! Stateful UTF-8 line splitter for chunked response bodies.
//!
//! Network reads split the body at arbitrary byte offsets, so a multi-byte
//! character may straddle two chunks and a logical line may span many. The
//! decoder carries both across `feed` calls.
//!
//! There is no bound on line length: a single unterminated line keeps growing
//! the partial-line buffer until a line feed or `flush` arrives.

/// Splits a byte stream into `\n`-terminated lines.
#[derive(Debug, Default)]
pub struct LineDecoder {
    /// Undecoded tail: at most one incomplete UTF-8 sequence.
    pending: Vec<u8>,
    /// Decoded text of the current, not yet terminated line.
    line: String,
}

impl LineDecoder {
    /// Creates an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes `chunk` and returns every line completed by it, without the
    /// terminating `\n`. The trailing fragment stays buffered.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        self.decode_pending();
        self.take_complete_lines()
    }

    /// Returns the buffered partial line once the transport has ended.
    ///
    /// Bytes of an unfinished UTF-8 sequence decode to U+FFFD.
    pub fn flush(&mut self) -> Option<String> {
        if !self.pending.is_empty() {
            self.line.push_str(&String::from_utf8_lossy(&self.pending));
            self.pending.clear();
        }
        if self.line.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.line))
        }
    }

    /// Decoded text of the line currently being assembled.
    pub fn partial_line(&self) -> &str {
        &self.line
    }

    /// Number of raw bytes waiting for the rest of a UTF-8 sequence.
    pub fn pending_bytes(&self) -> usize {
        self.pending.len()
    }

    fn decode_pending(&mut self) {
        let mut start = 0;
        while start < self.pending.len() {
            match std::str::from_utf8(&self.pending[start..]) {
                Ok(text) => {
                    self.line.push_str(text);
                    start = self.pending.len();
                }
                Err(err) => {
                    let valid_end = start + err.valid_up_to();
                    self.line
                        .push_str(&String::from_utf8_lossy(&self.pending[start..valid_end]));
                    match err.error_len() {
                        // Invalid sequence: replace and keep going.
                        Some(len) => {
                            self.line.push(char::REPLACEMENT_CHARACTER);
                            start = valid_end + len;
                        }
                        // Incomplete sequence at the end: wait for more bytes.
                        None => {
                            start = valid_end;
                            break;
                        }
                    }
                }
            }
        }
        self.pending.drain(..start);
    }

    fn take_complete_lines(&mut self) -> Vec<String> {
        let Some(last_newline) = self.line.rfind('\n') else {
            return Vec::new();
        };
        let rest = self.line.split_off(last_newline + 1);
        let mut complete = std::mem::replace(&mut self.line, rest);
        complete.pop();
        complete.split('\n').map(str::to_owned).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(chunks: &[&[u8]]) -> Vec<String> {
        let mut decoder = LineDecoder::new();
        let mut lines = Vec::new();
        for chunk in chunks {
            lines.extend(decoder.feed(chunk));
            assert!(!decoder.partial_line().contains('\n'));
        }
        lines.extend(decoder.flush());
        lines
    }

    #[test]
    fn retains_partial_line_until_completed() {
        let mut decoder = LineDecoder::new();
        assert!(decoder.feed(b"data: abc").is_empty());
        assert_eq!(decoder.partial_line(), "data: abc");
        assert_eq!(decoder.feed(b"def\nda"), vec!["data: abcdef".to_string()]);
        assert_eq!(decoder.partial_line(), "da");
    }

    #[test]
    fn emits_blank_lines_between_frames() {
        assert_eq!(
            decode_all(&[b"a\n\nb\n"]),
            vec!["a".to_string(), String::new(), "b".to_string()]
        );
    }

    #[test]
    fn flush_returns_unterminated_tail_once() {
        let mut decoder = LineDecoder::new();
        assert!(decoder.feed(b"tail").is_empty());
        assert_eq!(decoder.flush().as_deref(), Some("tail"));
        assert_eq!(decoder.flush(), None);
    }

    #[test]
    fn multibyte_character_split_across_chunks_is_preserved() {
        let text = "爬虫 ✓\n".as_bytes();
        // Split inside the first three-byte character.
        let lines = decode_all(&[&text[..1], &text[1..2], &text[2..]]);
        assert_eq!(lines, vec!["爬虫 ✓".to_string()]);
    }

    #[test]
    fn every_split_point_decodes_identically() {
        let body = "data: héllo 世界 🕷️\nsecond line ü\nthird".as_bytes();
        let expected = decode_all(&[body]);
        assert_eq!(expected.len(), 3);
        for i in 0..=body.len() {
            assert_eq!(decode_all(&[&body[..i], &body[i..]]), expected, "split at {i}");
            for j in i..=body.len() {
                assert_eq!(
                    decode_all(&[&body[..i], &body[i..j], &body[j..]]),
                    expected,
                    "split at {i}/{j}"
                );
            }
        }
    }

    #[test]
    fn byte_by_byte_feeding_matches_single_chunk() {
        let body = "α\nβγ\n".as_bytes();
        let chunks: Vec<&[u8]> = body.chunks(1).collect();
        assert_eq!(decode_all(&chunks), vec!["α".to_string(), "βγ".to_string()]);
    }

    #[test]
    fn invalid_bytes_become_replacement_characters() {
        let lines = decode_all(&[b"ok \xff end\n"]);
        assert_eq!(lines, vec!["ok \u{FFFD} end".to_string()]);
    }

    #[test]
    fn dangling_incomplete_sequence_is_replaced_on_flush() {
        let mut decoder = LineDecoder::new();
        assert!(decoder.feed(&[b'x', 0xE4, 0xB8]).is_empty());
        assert_eq!(decoder.pending_bytes(), 2);
        assert_eq!(decoder.flush().as_deref(), Some("x\u{FFFD}"));
    }
}
