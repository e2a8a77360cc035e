use std::sync::Arc;

use futures::StreamExt as _;
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::code::extract_code;
use crate::errors::ChatError;
use crate::message::{ConversationTurn, request_messages};
use crate::prompt::{PromptMode, greeting, system_prompt};
use crate::stream::{TurnEvent, TurnHandler, TurnOutput};
use crate::transcript::Transcript;
use crate::transport::{CompletionTransport, delta_stream};

/// Default bound of the per-turn event channel.
pub const DEFAULT_EVENT_BUFFER: usize = 128;

/// Lifecycle of the current turn of a session.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum TurnState {
    /// No turn submitted yet.
    #[default]
    Idle,
    /// Request issued, waiting for the endpoint to accept it.
    Sending,
    /// Endpoint accepted the request; deltas are arriving.
    Streaming,
    /// Last turn ended with the sentinel or a clean close.
    Completed,
    /// Last turn failed or was cancelled.
    Failed,
}

impl TurnState {
    /// True while a turn owns the session.
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Sending | Self::Streaming)
    }

    /// True once the last turn has completed or failed.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Handle used to cancel a running turn.
#[derive(Clone)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    /// Requests cancellation.
    ///
    /// The turn task drops the response body (closing the connection) and
    /// reports a terminal `TurnEvent::Failed` with `ChatError::Cancelled`.
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }
}

/// One conversation with the completion endpoint, in one prompting mode.
///
/// The visible history starts with the mode's greeting. Each accepted
/// submission appends the user turn; a completed turn appends the assistant
/// transcript, a failed turn appends nothing.
pub struct ChatSession {
    transport: Arc<dyn CompletionTransport>,
    session_id: uuid::Uuid,
    mode: PromptMode,
    history: Arc<Mutex<Vec<ConversationTurn>>>,
    state: watch::Sender<TurnState>,
    event_buffer: usize,
}

impl ChatSession {
    /// Creates a session whose history is seeded with the greeting for `mode`.
    pub fn new(transport: Arc<dyn CompletionTransport>, mode: PromptMode) -> Self {
        let history = vec![ConversationTurn::assistant(greeting(&mode))];
        let (state, _) = watch::channel(TurnState::Idle);
        Self {
            transport,
            session_id: uuid::Uuid::new_v4(),
            mode,
            history: Arc::new(Mutex::new(history)),
            state,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }

    /// Sets the bounded buffer between the turn task and the consumer.
    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity;
        self
    }

    pub fn session_id(&self) -> uuid::Uuid {
        self.session_id
    }

    pub fn mode(&self) -> &PromptMode {
        &self.mode
    }

    /// Current turn state.
    pub fn state(&self) -> TurnState {
        *self.state.borrow()
    }

    /// Subscribes to turn state changes.
    pub fn watch_state(&self) -> watch::Receiver<TurnState> {
        self.state.subscribe()
    }

    /// Snapshot of the visible conversation.
    pub async fn history(&self) -> Vec<ConversationTurn> {
        self.history.lock().await.clone()
    }

    /// Switches the prompting mode and restarts the conversation with the new
    /// mode's greeting. Rejected while a turn is in flight.
    pub async fn set_mode(&mut self, mode: PromptMode) -> Result<(), ChatError> {
        if self.state().is_in_flight() {
            return Err(ChatError::TurnInFlight);
        }
        self.mode = mode;
        self.reset().await
    }

    /// Clears the conversation back to the greeting.
    pub async fn reset(&self) -> Result<(), ChatError> {
        let mut history = self.history.lock().await;
        if self.state().is_in_flight() {
            return Err(ChatError::TurnInFlight);
        }
        history.clear();
        history.push(ConversationTurn::assistant(greeting(&self.mode)));
        Ok(())
    }

    /// Submits a user turn and starts streaming the reply.
    ///
    /// Fails with `ChatError::TurnInFlight` while another turn of this session
    /// is sending or streaming, and with `ChatError::Validation` for blank
    /// input. Both leave the session untouched.
    pub async fn submit(&self, text: impl Into<String>) -> Result<TurnStream, ChatError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(ChatError::Validation("message must not be empty".into()));
        }
        if self.event_buffer == 0 {
            return Err(ChatError::Validation(
                "event buffer capacity must be greater than 0".into(),
            ));
        }
        // Nothing below the gate may await: a dropped `submit` future must
        // never leave the state in `Sending` without a turn task.
        let mut history = self.history.lock().await;
        let accepted = self.state.send_if_modified(|state| {
            if state.is_in_flight() {
                false
            } else {
                *state = TurnState::Sending;
                true
            }
        });
        if !accepted {
            debug!(
                event = "chat.turn_rejected",
                domain = "chat",
                session_id = %self.session_id,
                code = "chat.turn_in_flight"
            );
            return Err(ChatError::TurnInFlight);
        }
        history.push(ConversationTurn::user(text));
        let messages = request_messages(&system_prompt(&self.mode), &history);
        drop(history);

        let turn_id = uuid::Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.event_buffer);
        let (final_tx, final_rx) = oneshot::channel();
        let (abort_tx, abort_rx) = watch::channel(false);
        info!(
            event = "chat.turn_started",
            domain = "chat",
            session_id = %self.session_id,
            turn_id = %turn_id,
            mode = self.mode.label(),
            message_count = messages.len() as u64
        );

        tokio::spawn(run_turn(TurnTask {
            turn_id,
            transport: Arc::clone(&self.transport),
            messages,
            history: Arc::clone(&self.history),
            state: self.state.clone(),
            tx,
            final_tx,
            abort_rx,
        }));

        Ok(TurnStream {
            turn_id,
            session_id: self.session_id,
            rx,
            final_rx,
            abort_handle: AbortHandle { tx: abort_tx },
            saw_terminal: false,
        })
    }
}

/// Streaming handle for one turn, returned by `ChatSession::submit`.
///
/// Dropping it before the terminal event cancels the turn and releases the
/// connection.
pub struct TurnStream {
    turn_id: uuid::Uuid,
    session_id: uuid::Uuid,
    rx: mpsc::Receiver<TurnEvent>,
    final_rx: oneshot::Receiver<Result<TurnOutput, ChatError>>,
    abort_handle: AbortHandle,
    saw_terminal: bool,
}

impl TurnStream {
    pub fn turn_id(&self) -> uuid::Uuid {
        self.turn_id
    }

    pub fn session_id(&self) -> uuid::Uuid {
        self.session_id
    }

    /// Returns a handle that can cancel the turn.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort_handle.clone()
    }

    /// Waits for the next event. Returns `None` once the terminal event has
    /// been delivered.
    pub async fn next_event(&mut self) -> Option<TurnEvent> {
        let event = self.rx.recv().await;
        if event.as_ref().is_some_and(TurnEvent::is_terminal) {
            self.saw_terminal = true;
        }
        event
    }

    /// Drains remaining events and returns the turn result.
    pub async fn finish(mut self) -> Result<TurnOutput, ChatError> {
        while !self.saw_terminal {
            if self.next_event().await.is_none() {
                break;
            }
        }
        match (&mut self.final_rx).await {
            Ok(result) => result,
            Err(_) => Err(ChatError::protocol(format!(
                "turn {} ended without a result",
                self.turn_id
            ))),
        }
    }

    /// Feeds every event to `handler` and returns the turn result.
    pub async fn drive<H: TurnHandler + ?Sized>(
        mut self,
        handler: &mut H,
    ) -> Result<TurnOutput, ChatError> {
        let mut reported = false;
        while let Some(event) = self.next_event().await {
            match &event {
                TurnEvent::Chunk { text, artifact, .. } => {
                    handler.on_chunk(text, artifact.as_ref())
                }
                TurnEvent::Completed { output, .. } => {
                    handler.on_complete(output);
                    reported = true;
                }
                TurnEvent::Failed { error, .. } => {
                    handler.on_error(error);
                    reported = true;
                }
            }
        }
        let result = self.finish().await;
        if !reported && let Err(error) = &result {
            handler.on_error(error);
        }
        result
    }
}

impl Drop for TurnStream {
    fn drop(&mut self) {
        if !self.saw_terminal {
            self.abort_handle.abort();
        }
    }
}

struct TurnTask {
    turn_id: uuid::Uuid,
    transport: Arc<dyn CompletionTransport>,
    messages: Vec<ConversationTurn>,
    history: Arc<Mutex<Vec<ConversationTurn>>>,
    state: watch::Sender<TurnState>,
    tx: mpsc::Sender<TurnEvent>,
    final_tx: oneshot::Sender<Result<TurnOutput, ChatError>>,
    abort_rx: watch::Receiver<bool>,
}

async fn run_turn(task: TurnTask) {
    let TurnTask {
        turn_id,
        transport,
        messages,
        history,
        state,
        tx,
        final_tx,
        mut abort_rx,
    } = task;

    let result = stream_turn(
        turn_id,
        transport.as_ref(),
        messages,
        &state,
        &tx,
        &mut abort_rx,
    )
    .await;
    match result {
        Ok(output) => {
            history
                .lock()
                .await
                .push(ConversationTurn::assistant(output.transcript.clone()));
            state.send_replace(TurnState::Completed);
            info!(
                event = "chat.turn_completed",
                domain = "chat",
                turn_id = %turn_id,
                transcript_len = output.transcript.len() as u64,
                has_artifact = output.artifact.is_some()
            );
            let _ = tx
                .send(TurnEvent::Completed {
                    turn_id,
                    output: output.clone(),
                })
                .await;
            let _ = final_tx.send(Ok(output));
        }
        Err(error) => {
            state.send_replace(TurnState::Failed);
            warn!(
                event = "chat.turn_failed",
                domain = "chat",
                turn_id = %turn_id,
                code = error.code(),
                error = %error
            );
            let _ = tx
                .send(TurnEvent::Failed {
                    turn_id,
                    error: error.clone(),
                })
                .await;
            let _ = final_tx.send(Err(error));
        }
    }
}

/// Drives one turn from request to end of stream. Every suspension point
/// also watches for cancellation; returning drops the body and with it the
/// connection.
async fn stream_turn(
    turn_id: uuid::Uuid,
    transport: &dyn CompletionTransport,
    messages: Vec<ConversationTurn>,
    state: &watch::Sender<TurnState>,
    tx: &mpsc::Sender<TurnEvent>,
    abort_rx: &mut watch::Receiver<bool>,
) -> Result<TurnOutput, ChatError> {
    let body = tokio::select! {
        biased;
        _ = cancelled(abort_rx) => return Err(ChatError::Cancelled),
        opened = transport.open_stream(messages) => opened?,
    };
    state.send_replace(TurnState::Streaming);
    debug!(event = "chat.stream_opened", domain = "chat", turn_id = %turn_id);

    let mut deltas = std::pin::pin!(delta_stream(body));
    let mut transcript = Transcript::new();
    let mut seq = 0_u64;
    loop {
        let next = tokio::select! {
            biased;
            _ = cancelled(abort_rx) => return Err(ChatError::Cancelled),
            next = deltas.next() => next,
        };
        let text = match next {
            Some(Ok(text)) => text,
            Some(Err(err)) => return Err(err),
            None => break,
        };

        let artifact = extract_code(transcript.append(&text));
        debug!(
            event = "chat.delta_received",
            domain = "chat",
            turn_id = %turn_id,
            seq,
            delta_len = text.len() as u64,
            has_artifact = artifact.is_some()
        );
        let event = TurnEvent::Chunk {
            turn_id,
            seq,
            text,
            artifact,
        };
        let sent = tokio::select! {
            biased;
            _ = cancelled(abort_rx) => return Err(ChatError::Cancelled),
            sent = tx.send(event) => sent.is_ok(),
        };
        if !sent {
            return Err(ChatError::Cancelled);
        }
        seq = seq.saturating_add(1);
    }

    let transcript = transcript.into_string();
    let artifact = extract_code(&transcript);
    Ok(TurnOutput {
        transcript,
        artifact,
    })
}

/// Resolves once cancellation has been requested. Never resolves if every
/// abort handle is gone without aborting.
async fn cancelled(abort_rx: &mut watch::Receiver<bool>) {
    loop {
        if *abort_rx.borrow_and_update() {
            return;
        }
        if abort_rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
