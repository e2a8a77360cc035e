use crate::code::CodeArtifact;
use crate::errors::ChatError;

/// Final result of a successful turn.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TurnOutput {
    /// Full assistant text, the concatenation of every delta.
    pub transcript: String,
    /// First complete ```` ```python ```` block of the transcript.
    pub artifact: Option<CodeArtifact>,
}

/// Events yielded by `TurnStream`: zero or more `Chunk`s, then exactly one
/// of `Completed` or `Failed`. Nothing follows a terminal event.
#[derive(Clone, Debug, PartialEq)]
pub enum TurnEvent {
    /// One delta, in arrival order.
    Chunk {
        turn_id: uuid::Uuid,
        seq: u64,
        /// The incremental text of this delta only.
        text: String,
        /// Code extracted from the transcript after this delta.
        artifact: Option<CodeArtifact>,
    },
    /// The stream ended with the sentinel or a clean close.
    Completed {
        turn_id: uuid::Uuid,
        output: TurnOutput,
    },
    /// Transport failure or cancellation.
    Failed {
        turn_id: uuid::Uuid,
        error: ChatError,
    },
}

impl TurnEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }

    pub fn turn_id(&self) -> uuid::Uuid {
        match self {
            Self::Chunk { turn_id, .. }
            | Self::Completed { turn_id, .. }
            | Self::Failed { turn_id, .. } => *turn_id,
        }
    }
}

/// Callback-style consumer for `TurnStream::drive`.
///
/// `on_chunk` may fire any number of times; then exactly one of
/// `on_complete` or `on_error` fires.
pub trait TurnHandler {
    fn on_chunk(&mut self, text: &str, artifact: Option<&CodeArtifact>);
    fn on_complete(&mut self, output: &TurnOutput);
    fn on_error(&mut self, error: &ChatError);
}
