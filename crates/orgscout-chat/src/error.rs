//! Error types for turn orchestration.

use orgscout_core::error::ScoutError;

/// Errors raised while handling one turn.
///
/// Everything except [`ChatError::Transport`] is scoped to the current turn:
/// the session reports it as an error frame and keeps reading.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
    #[error("classifier error: {0}")]
    Classifier(String),
    #[error("malformed classifier reply: {0}")]
    MalformedReply(String),
    #[error("search error: {0}")]
    Search(String),
    #[error("search stream error: {0}")]
    SearchStream(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl ChatError {
    /// Whether the connection itself is gone and the read loop must stop.
    pub fn is_transport(&self) -> bool {
        matches!(self, ChatError::Transport(_))
    }
}

impl From<ScoutError> for ChatError {
    fn from(err: ScoutError) -> Self {
        ChatError::Storage(err.to_string())
    }
}
