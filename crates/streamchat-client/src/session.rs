//! Session controller: owns the conversation and drives one send at a time.

use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::api::ChatBackend;
use crate::error::ChatError;
use crate::state::StreamState;
use crate::types::{ChatRequest, ChatSettings, Message, StreamChunk};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Progress events emitted while a send is in flight
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A send started; `message_id` is the assistant placeholder
    Started { message_id: String, model: String },
    /// One text delta arrived for the placeholder
    Token { message_id: String, text: String },
    /// The placeholder was finalized with the full response
    Completed { message_id: String, content: String },
    /// The send failed; the placeholder now holds a user-facing error string
    Failed { message_id: String, error: String },
    /// The conversation was cleared
    Cleared,
}

/// Handle for cancelling the in-flight stream
#[derive(Debug, Clone)]
struct CancelHandle {
    sender: broadcast::Sender<()>,
}

impl CancelHandle {
    fn new() -> (Self, broadcast::Receiver<()>) {
        let (sender, receiver) = broadcast::channel(1);
        (Self { sender }, receiver)
    }

    fn cancel(&self) {
        let _ = self.sender.send(());
    }
}

struct SessionInner {
    messages: Vec<Message>,
    stream: StreamState,
    /// Placeholder bound to the live [`StreamState`], while a send is active
    streaming_message_id: Option<String>,
    in_flight: bool,
    use_streaming: bool,
    cancel: Option<CancelHandle>,
}

impl SessionInner {
    /// Replace the bound placeholder's content by whole-vector rebuild, so
    /// concurrently-taken snapshots never observe a torn message. A stale id
    /// (placeholder discarded by a clear) rebuilds nothing.
    fn replace_content(&mut self, id: &str, content: &str) {
        self.messages = self
            .messages
            .iter()
            .map(|m| {
                if m.id == id {
                    Message {
                        content: content.to_string(),
                        ..m.clone()
                    }
                } else {
                    m.clone()
                }
            })
            .collect();
    }
}

/// One chat conversation and its single in-flight send.
///
/// Cheap to clone; clones share the same conversation.
#[derive(Clone)]
pub struct ChatSession {
    backend: Arc<dyn ChatBackend>,
    inner: Arc<Mutex<SessionInner>>,
    events: broadcast::Sender<SessionEvent>,
}

impl ChatSession {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            backend,
            inner: Arc::new(Mutex::new(SessionInner {
                messages: Vec::new(),
                stream: StreamState::new(),
                streaming_message_id: None,
                in_flight: false,
                use_streaming: true,
                cancel: None,
            })),
            events,
        }
    }

    /// Snapshot of the conversation in order
    pub fn messages(&self) -> Vec<Message> {
        self.inner.lock().messages.clone()
    }

    /// Whether a send is in flight
    pub fn is_loading(&self) -> bool {
        self.inner.lock().in_flight
    }

    /// Whether the assistant is "thinking": a send is in flight and no text
    /// has arrived yet
    pub fn typing_indicator(&self) -> bool {
        let inner = self.inner.lock();
        inner.in_flight && inner.stream.current_message.is_empty()
    }

    /// Snapshot of the live stream reducer state
    pub fn stream_state(&self) -> StreamState {
        self.inner.lock().stream.clone()
    }

    /// Id of the placeholder message bound to the live stream, if any
    pub fn streaming_message_id(&self) -> Option<String> {
        self.inner.lock().streaming_message_id.clone()
    }

    /// Whether sends use the streaming endpoint
    pub fn use_streaming(&self) -> bool {
        self.inner.lock().use_streaming
    }

    /// Toggle between the streaming endpoint and the single-shot fallback
    pub fn set_streaming(&self, enabled: bool) {
        self.inner.lock().use_streaming = enabled;
    }

    /// Subscribe to send progress events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Send one user message and resolve the assistant's reply into the
    /// conversation.
    ///
    /// A call while another send is in flight is rejected (dropped), not
    /// queued. Failures never propagate: the assistant placeholder ends up
    /// holding a user-facing error string instead.
    pub async fn send_message(&self, content: &str, settings: &ChatSettings) {
        let Some(mut send) = self.start_send(content, settings) else {
            return;
        };

        let _ = self.events.send(SessionEvent::Started {
            message_id: send.placeholder_id.clone(),
            model: settings.model.clone(),
        });

        if send.use_streaming {
            let cancel_rx = send
                .cancel_rx
                .take()
                .unwrap_or_else(|| CancelHandle::new().1);
            self.drive_stream(&send, cancel_rx).await;
        } else {
            self.drive_single_shot(&send).await;
        }

        let mut inner = self.inner.lock();
        inner.in_flight = false;
        inner.streaming_message_id = None;
        inner.cancel = None;
    }

    /// Empty the conversation and cancel any in-flight stream.
    pub fn clear_messages(&self) {
        let cancel = {
            let mut inner = self.inner.lock();
            inner.messages = Vec::new();
            inner.stream.reset();
            inner.streaming_message_id = None;
            inner.cancel.take()
        };
        if let Some(cancel) = cancel {
            debug!("cancelling in-flight stream on clear");
            cancel.cancel();
        }
        let _ = self.events.send(SessionEvent::Cleared);
    }

    /// Reserve the session for one send: append the user message, allocate
    /// the assistant placeholder and bind a fresh stream state. Returns
    /// `None` when another send already holds the session.
    fn start_send(&self, content: &str, settings: &ChatSettings) -> Option<PendingSend> {
        let mut inner = self.inner.lock();
        if inner.in_flight {
            warn!("send_message rejected: another send is in flight");
            return None;
        }
        inner.in_flight = true;

        let history = inner.messages.clone();
        let request = ChatRequest::new(content, history, settings);

        let placeholder = Message::assistant("");
        let placeholder_id = placeholder.id.clone();

        inner.messages.push(Message::user(content));
        inner.messages.push(placeholder);

        let use_streaming = inner.use_streaming;
        let mut cancel_rx = None;
        if use_streaming {
            inner.stream.begin();
            inner.streaming_message_id = Some(placeholder_id.clone());
            let (cancel, rx) = CancelHandle::new();
            inner.cancel = Some(cancel);
            cancel_rx = Some(rx);
        } else {
            inner.stream.reset();
        }

        Some(PendingSend {
            request,
            placeholder_id,
            use_streaming,
            cancel_rx,
        })
    }

    async fn drive_stream(&self, send: &PendingSend, mut cancel_rx: broadcast::Receiver<()>) {
        let mut stream = self.backend.send_message_stream(&send.request);

        loop {
            let next = tokio::select! {
                _ = cancel_rx.recv() => {
                    debug!(message_id = %send.placeholder_id, "stream cancelled");
                    return;
                }
                next = stream.next() => next,
            };

            match next {
                Some(Ok(chunk)) => {
                    if self.reduce_chunk(send, &chunk) {
                        return;
                    }
                }
                Some(Err(e)) => {
                    self.finish_with_error(send, &e);
                    return;
                }
                // The transport's decoder always ends the stream with a
                // terminal chunk, so this arm only runs after one.
                None => return,
            }
        }
    }

    /// Reduce one chunk into the stream state and mirror the result into the
    /// placeholder. Returns true once the send reached a terminal state.
    fn reduce_chunk(&self, send: &PendingSend, chunk: &StreamChunk) -> bool {
        let mut inner = self.inner.lock();
        if !inner.stream.apply(chunk) {
            // Double-delivered or post-terminal chunk: the reducer ignored
            // it, so nothing is mirrored and no event goes out.
            return inner.stream.is_terminal();
        }

        match chunk {
            StreamChunk::Data { data, .. } => {
                // Mirror the reducer's accumulated value rather than
                // appending, so the transcript cannot desync from the
                // reducer if an update is dropped.
                let accumulated = inner.stream.current_message.clone();
                inner.replace_content(&send.placeholder_id, &accumulated);
                drop(inner);
                let _ = self.events.send(SessionEvent::Token {
                    message_id: send.placeholder_id.clone(),
                    text: data.clone(),
                });
                false
            }
            StreamChunk::Complete => {
                let content = inner.stream.current_message.clone();
                inner.replace_content(&send.placeholder_id, &content);
                drop(inner);
                let _ = self.events.send(SessionEvent::Completed {
                    message_id: send.placeholder_id.clone(),
                    content,
                });
                true
            }
            StreamChunk::Error { error } => {
                // Partial streamed text is discarded, not shown.
                let display = generic_failure_message();
                inner.replace_content(&send.placeholder_id, &display);
                drop(inner);
                let _ = self.events.send(SessionEvent::Failed {
                    message_id: send.placeholder_id.clone(),
                    error: error.clone(),
                });
                true
            }
        }
    }

    async fn drive_single_shot(&self, send: &PendingSend) {
        match self.backend.send_message(&send.request).await {
            Ok(response) => {
                let mut inner = self.inner.lock();
                inner.replace_content(&send.placeholder_id, &response.response);
                drop(inner);
                let _ = self.events.send(SessionEvent::Completed {
                    message_id: send.placeholder_id.clone(),
                    content: response.response,
                });
            }
            Err(e) => self.finish_with_error(send, &e),
        }
    }

    /// Terminal failure from the transport: record it on the reducer and
    /// substitute the classified user-facing string into the placeholder.
    fn finish_with_error(&self, send: &PendingSend, error: &ChatError) {
        warn!(error = %error, message_id = %send.placeholder_id, "send failed");
        let display = error.user_message();
        let mut inner = self.inner.lock();
        inner.stream.fail(error.to_string());
        inner.replace_content(&send.placeholder_id, &display);
        drop(inner);
        let _ = self.events.send(SessionEvent::Failed {
            message_id: send.placeholder_id.clone(),
            error: display,
        });
    }
}

struct PendingSend {
    request: ChatRequest,
    placeholder_id: String,
    use_streaming: bool,
    cancel_rx: Option<broadcast::Receiver<()>>,
}

fn generic_failure_message() -> String {
    ChatError::StreamUnavailable.user_message()
}
