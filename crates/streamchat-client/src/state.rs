//! Stream reducer: the canonical incremental state of one in-flight send.

use tracing::debug;

use crate::types::StreamChunk;

/// Accumulated state of a streamed response.
///
/// Lifecycle: `reset` -> `begin` -> zero or more `apply(data)` -> exactly one
/// terminal transition (`apply(complete)`, `apply(error)` or `fail`). Once
/// terminal, the state never changes again until the next `reset`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamState {
    pub is_streaming: bool,
    pub current_message: String,
    pub error: Option<String>,
    pub is_complete: bool,
}

impl StreamState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore the zero state
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Enter the streaming state for a fresh send
    pub fn begin(&mut self) {
        self.reset();
        self.is_streaming = true;
    }

    /// Whether the state machine reached Completed or Errored
    pub fn is_terminal(&self) -> bool {
        self.is_complete || self.error.is_some()
    }

    /// Reduce one decoded chunk into the state.
    ///
    /// Returns whether the chunk was reduced. Chunks arriving after a
    /// terminal state (double delivery from the decoder or transport) are
    /// ignored and return `false` so callers don't mirror them anywhere.
    pub fn apply(&mut self, chunk: &StreamChunk) -> bool {
        if self.is_terminal() || !self.is_streaming {
            debug!(?chunk, "ignoring chunk outside the streaming state");
            return false;
        }

        match chunk {
            StreamChunk::Data { data, .. } => {
                self.current_message.push_str(data);
            }
            StreamChunk::Complete => {
                self.is_streaming = false;
                self.is_complete = true;
            }
            StreamChunk::Error { error } => {
                self.is_streaming = false;
                self.error = Some(error.clone());
            }
        }
        true
    }

    /// Record a transport-level failure as the terminal error.
    pub fn fail(&mut self, message: impl Into<String>) {
        if self.is_terminal() {
            debug!("ignoring failure after terminal state");
            return;
        }
        self.is_streaming = false;
        self.error = Some(message.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_yields_zero_state() {
        let mut state = StreamState::new();
        state.begin();
        state.apply(&StreamChunk::data("partial"));
        state.reset();
        assert_eq!(state, StreamState::default());
        assert!(!state.is_streaming);
        assert_eq!(state.current_message, "");
        assert_eq!(state.error, None);
        assert!(!state.is_complete);
    }

    #[test]
    fn data_chunks_concatenate_in_order() {
        let mut state = StreamState::new();
        state.begin();
        for part in ["Hel", "lo", ", ", "world"] {
            state.apply(&StreamChunk::data(part));
        }
        assert_eq!(state.current_message, "Hello, world");
        assert!(state.is_streaming);
    }

    #[test]
    fn complete_is_terminal_and_exclusive_with_streaming() {
        let mut state = StreamState::new();
        state.begin();
        state.apply(&StreamChunk::data("done"));
        state.apply(&StreamChunk::Complete);
        assert!(!state.is_streaming);
        assert!(state.is_complete);
        assert!(state.is_terminal());

        // Nothing moves after the terminal transition.
        state.apply(&StreamChunk::data("late"));
        state.apply(&StreamChunk::error("late error"));
        state.fail("late failure");
        assert_eq!(state.current_message, "done");
        assert_eq!(state.error, None);
        assert!(state.is_complete);
    }

    #[test]
    fn error_chunk_is_terminal() {
        let mut state = StreamState::new();
        state.begin();
        state.apply(&StreamChunk::data("par"));
        state.apply(&StreamChunk::error("boom"));
        assert!(!state.is_streaming);
        assert_eq!(state.error.as_deref(), Some("boom"));
        assert!(!state.is_complete);

        state.apply(&StreamChunk::Complete);
        assert!(!state.is_complete);
    }

    #[test]
    fn transport_failure_is_terminal() {
        let mut state = StreamState::new();
        state.begin();
        state.fail("connection reset");
        assert!(state.is_terminal());
        assert_eq!(state.error.as_deref(), Some("connection reset"));

        state.apply(&StreamChunk::data("late"));
        assert_eq!(state.current_message, "");
    }

    #[test]
    fn chunks_before_begin_are_ignored() {
        let mut state = StreamState::new();
        state.apply(&StreamChunk::data("early"));
        assert_eq!(state, StreamState::default());
    }

    #[test]
    fn apply_reports_whether_the_chunk_was_reduced() {
        let mut state = StreamState::new();
        assert!(!state.apply(&StreamChunk::data("early")));

        state.begin();
        assert!(state.apply(&StreamChunk::data("A")));
        assert!(state.apply(&StreamChunk::Complete));

        assert!(!state.apply(&StreamChunk::Complete));
        assert!(!state.apply(&StreamChunk::data("late")));
        assert!(!state.apply(&StreamChunk::error("late error")));
    }

    #[test]
    fn begin_after_terminal_starts_fresh() {
        let mut state = StreamState::new();
        state.begin();
        state.apply(&StreamChunk::error("boom"));
        state.begin();
        assert!(state.is_streaming);
        assert_eq!(state.error, None);
        assert_eq!(state.current_message, "");
    }
}
