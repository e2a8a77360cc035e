//! Streaming chat client that drafts and refines Python spider code.
//!
//! A [`ChatSession`] owns one conversation in one [`PromptMode`]. Each
//! submitted turn streams deltas from an OpenAI-compatible
//! `/chat/completions` endpoint, accumulates them into a transcript and
//! re-extracts the first fenced python block after every delta.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use spider_assist_chat::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ChatError> {
//! let client = CompletionsClient::from_env()?;
//! let session = ChatSession::new(Arc::new(client), PromptMode::Plain);
//!
//! let output = session
//!     .submit("Crawl quotes.toscrape.com and collect every quote")
//!     .await?
//!     .finish()
//!     .await?;
//!
//! if let Some(code) = output.artifact {
//!     println!("{}", code.body);
//! }
//! # Ok(())
//! # }
//! ```

/// OpenAI-compatible completions client and its configuration.
pub mod client;
/// Fenced code extraction.
pub mod code;
/// Incremental UTF-8 line decoding of response bodies.
pub mod decoder;
/// Public error type.
pub mod errors;
/// Server-sent event frame parsing.
pub mod frame;
/// Conversation roles and turns.
pub mod message;
/// Page previews fetched through the scraping backend.
pub mod page;
/// Common imports for typical usage.
pub mod prelude;
/// System prompts, greetings and page context.
pub mod prompt;
/// Session state machine, turn streams and cancellation.
pub mod session;
/// Turn events and callback handler.
pub mod stream;
/// Append-only assistant transcript.
pub mod transcript;
/// Transport seam between the session and the HTTP client.
pub mod transport;

pub use client::{ClientConfig, CompletionsClient};
pub use code::{CodeArtifact, extract_code};
pub use decoder::LineDecoder;
pub use errors::ChatError;
pub use frame::{FrameEvent, parse_line};
pub use message::{ConversationTurn, Role};
pub use page::{BackendPageFetcher, PageFetcher, PagePreview};
pub use prompt::{HtmlContext, PromptMode, SpiderRequest, greeting, system_prompt};
pub use session::{AbortHandle, ChatSession, TurnState, TurnStream};
pub use stream::{TurnEvent, TurnHandler, TurnOutput};
pub use transcript::Transcript;
pub use transport::{ByteStream, CompletionTransport};
