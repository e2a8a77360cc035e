use std::collections::VecDeque;
use std::pin::Pin;

use async_trait::async_trait;
use futures::StreamExt as _;
use futures::stream;

use crate::decoder::LineDecoder;
use crate::errors::ChatError;
use crate::frame::{FrameEvent, parse_line};
use crate::message::ConversationTurn;

/// Raw response body chunks in arrival order.
pub type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, ChatError>> + Send + 'static>>;

/// Opens a streaming chat-completion request.
///
/// `CompletionsClient` is the production implementation; the session only
/// depends on this seam.
#[async_trait]
pub trait CompletionTransport: Send + Sync {
    /// Sends `messages` and returns the response body once the endpoint has
    /// accepted the request. A non-success status is an error here, before
    /// any chunk is read.
    async fn open_stream(
        &self,
        messages: Vec<ConversationTurn>,
    ) -> Result<ByteStream, ChatError>;
}

/// Turns a response body into content deltas.
///
/// The stream ends after the `[DONE]` frame (the body is dropped without
/// reading further) or when the body closes cleanly, after its unterminated
/// last line has been processed. Body read errors end it with an error.
pub fn delta_stream(
    bytes: ByteStream,
) -> impl futures::Stream<Item = Result<String, ChatError>> + Send {
    struct State {
        bytes: Option<ByteStream>,
        decoder: LineDecoder,
        pending: VecDeque<String>,
    }

    stream::try_unfold(
        State {
            bytes: Some(bytes),
            decoder: LineDecoder::new(),
            pending: VecDeque::new(),
        },
        |mut state| async move {
            loop {
                if let Some(delta) = state.pending.pop_front() {
                    return Ok(Some((delta, state)));
                }
                let Some(body) = state.bytes.as_mut() else {
                    return Ok(None);
                };

                match body.next().await {
                    Some(Ok(chunk)) => {
                        let lines = state.decoder.feed(&chunk);
                        if queue_frames(&mut state.pending, lines) {
                            state.bytes = None;
                        }
                    }
                    Some(Err(err)) => return Err(err),
                    None => {
                        state.bytes = None;
                        queue_frames(&mut state.pending, state.decoder.flush());
                    }
                }
            }
        },
    )
}

/// Queues the deltas of `lines` in order. Returns true once the sentinel is
/// seen; lines after it are not parsed.
fn queue_frames(
    pending: &mut VecDeque<String>,
    lines: impl IntoIterator<Item = String>,
) -> bool {
    for line in lines {
        match parse_line(&line) {
            FrameEvent::Delta(text) => pending.push_back(text),
            FrameEvent::Done => return true,
            FrameEvent::Ignored => {}
        }
    }
    false
}

#[cfg(test)]
pub(crate) fn scripted_body(chunks: Vec<Result<bytes::Bytes, ChatError>>) -> ByteStream {
    Box::pin(stream::iter(chunks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt as _;

    fn ok(bytes: &'static [u8]) -> Result<bytes::Bytes, ChatError> {
        Ok(bytes::Bytes::from_static(bytes))
    }

    async fn collect(chunks: Vec<Result<bytes::Bytes, ChatError>>) -> Result<String, ChatError> {
        let deltas: Vec<String> = delta_stream(scripted_body(chunks)).try_collect().await?;
        Ok(deltas.concat())
    }

    #[tokio::test]
    async fn frame_split_across_chunks_then_sentinel() {
        let text = collect(vec![
            ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel"),
            ok(b"lo\"}}]}\n"),
            ok(b"data: [DONE]\n"),
        ])
        .await
        .expect("stream");
        assert_eq!(text, "Hello");
    }

    #[tokio::test]
    async fn malformed_frame_between_valid_frames_is_dropped() {
        let text = collect(vec![ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\
data: not-json\n\
data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n")])
        .await
        .expect("stream");
        assert_eq!(text, "ab");
    }

    #[tokio::test]
    async fn frames_after_sentinel_are_not_read() {
        let text = collect(vec![
            ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\ndata: [DONE]\n"),
            ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n"),
            Err(ChatError::Transport("never polled".into())),
        ])
        .await
        .expect("stream");
        assert_eq!(text, "x");
    }

    #[tokio::test]
    async fn clean_close_processes_unterminated_last_frame() {
        let text = collect(vec![
            ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n"),
            ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}"),
        ])
        .await
        .expect("stream");
        assert_eq!(text, "ab");
    }

    #[tokio::test]
    async fn body_error_is_returned_after_earlier_deltas() {
        let mut deltas = std::pin::pin!(delta_stream(scripted_body(vec![
            ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n"),
            Err(ChatError::Transport("connection reset".into())),
        ])));
        assert_eq!(deltas.next().await, Some(Ok("a".to_string())));
        assert_eq!(
            deltas.next().await,
            Some(Err(ChatError::Transport("connection reset".into())))
        );
    }

    #[tokio::test]
    async fn transcript_is_independent_of_chunk_boundaries() {
        let body: &'static [u8] = "data: {\"choices\":[{\"delta\":{\"content\":\"爬\"}}]}\n\
: keep-alive\n\
\n\
data: {\"choices\":[{\"delta\":{\"content\":\"虫 ✓\"}}]}\n\
data: [DONE]\n"
            .as_bytes();
        let expected = collect(vec![ok(body)]).await.expect("stream");
        assert_eq!(expected, "爬虫 ✓");
        for i in 0..=body.len() {
            for j in (i..=body.len()).step_by(7) {
                let text = collect(vec![ok(&body[..i]), ok(&body[i..j]), ok(&body[j..])])
                    .await
                    .expect("stream");
                assert_eq!(text, expected, "split at {i}/{j}");
            }
        }
    }
}
