/// Append-only assistant text for a single turn.
///
/// One instance per turn; it is dropped when the turn ends, whether the turn
/// completed or failed. There is no rollback.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Transcript {
    text: String,
    deltas: u64,
}

impl Transcript {
    /// Creates an empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `delta` and returns the full text so far.
    pub fn append(&mut self, delta: &str) -> &str {
        self.text.push_str(delta);
        self.deltas = self.deltas.saturating_add(1);
        &self.text
    }

    /// Current full text.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Number of deltas appended so far.
    pub fn delta_count(&self) -> u64 {
        self.deltas
    }

    /// True until some delta has added text.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Consumes the transcript and returns its text.
    pub fn into_string(self) -> String {
        self.text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_returns_running_text() {
        let mut transcript = Transcript::new();
        assert_eq!(transcript.append("Hel"), "Hel");
        assert_eq!(transcript.append("lo"), "Hello");
        assert_eq!(transcript.delta_count(), 2);
    }

    #[test]
    fn final_text_is_concatenation_in_arrival_order() {
        let deltas = ["```py", "thon\n", "", "x = 1", "\n```", " done", " done"];
        let mut transcript = Transcript::new();
        for delta in deltas {
            transcript.append(delta);
        }
        assert_eq!(transcript.into_string(), deltas.concat());
    }
}
