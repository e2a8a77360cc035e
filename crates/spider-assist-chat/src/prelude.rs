//! Common imports for typical chat usage.
pub use crate::{
    AbortHandle, ChatError, ChatSession, ClientConfig, CodeArtifact, CompletionTransport,
    CompletionsClient, HtmlContext, PageFetcher, PagePreview, PromptMode, SpiderRequest,
    TurnEvent, TurnHandler, TurnOutput, TurnState, TurnStream,
};
