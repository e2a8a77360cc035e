//! Fenced code block extraction over a growing transcript.
//!
//! The scan is a pure function of the text snapshot: it finds the first
//! opening fence for the language, then the first closing fence after it.

/// Fence delimiter.
pub const FENCE: &str = "```";
/// Language tag of the artifact shown in the live preview.
pub const ARTIFACT_LANGUAGE: &str = "python";

/// A code block pulled out of assistant text.
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CodeArtifact {
    pub language: String,
    pub body: String,
}

/// Extracts the first complete ```` ```python ```` block.
pub fn extract_code(text: &str) -> Option<CodeArtifact> {
    extract_fenced(text, ARTIFACT_LANGUAGE)
}

/// Extracts the first complete block whose opening fence is exactly
/// ```` ```<language>\n ````. Returns the interior with surrounding whitespace
/// trimmed, or `None` while the block is still open.
///
/// Later blocks are never considered, even when the first one is unclosed.
pub fn extract_fenced(text: &str, language: &str) -> Option<CodeArtifact> {
    let opening = format!("{FENCE}{language}\n");
    let body_start = text.find(&opening)? + opening.len();
    let body_len = text[body_start..].find(FENCE)?;
    Some(CodeArtifact {
        language: language.to_string(),
        body: text[body_start..body_start + body_len].trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_fence_yields_nothing_until_closed() {
        let mut text = String::from("Here you go:\n```python\nprint(1)");
        assert_eq!(extract_code(&text), None);
        text.push_str("\n```");
        assert_eq!(
            extract_code(&text),
            Some(CodeArtifact {
                language: "python".into(),
                body: "print(1)".into(),
            })
        );
    }

    #[test]
    fn only_first_block_is_returned() {
        let text = "```python\nfirst()\n```\ntext\n```python\nsecond()\n```";
        assert_eq!(extract_code(text).map(|a| a.body).as_deref(), Some("first()"));
    }

    #[test]
    fn other_languages_and_bare_fences_are_skipped() {
        let text = "```html\n<div/>\n```\n```\nplain\n```\n```python\nok = True\n```";
        assert_eq!(extract_code(text).map(|a| a.body).as_deref(), Some("ok = True"));
        assert_eq!(
            extract_fenced(text, "html").map(|a| a.body).as_deref(),
            Some("<div/>")
        );
    }

    #[test]
    fn tag_must_be_followed_by_newline() {
        assert_eq!(extract_code("```python3\nx\n```"), None);
        assert_eq!(extract_code("```python x\n```"), None);
    }

    #[test]
    fn body_is_trimmed() {
        let text = "```python\n\n   import lxml  \n\n```";
        assert_eq!(extract_code(text).map(|a| a.body).as_deref(), Some("import lxml"));
    }

    #[test]
    fn discovery_never_regresses_as_text_grows() {
        let full = "intro\n```python\nclass S:\n    pass\n```\nmore ```python\nx";
        let mut found = false;
        for end in (0..=full.len()).filter(|i| full.is_char_boundary(*i)) {
            let result = extract_code(&full[..end]);
            if found {
                assert_eq!(
                    result.as_ref().map(|a| a.body.as_str()),
                    Some("class S:\n    pass")
                );
            }
            found |= result.is_some();
        }
        assert!(found);
    }
}
