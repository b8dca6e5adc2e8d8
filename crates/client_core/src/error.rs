use thiserror::Error;

/// Failure taxonomy for conversation operations.
///
/// Read-receipt sync has no variant here: it is best-effort and its failures
/// are logged, never surfaced.
#[derive(Debug, Error)]
pub enum ChatError {
    /// A required id was missing before any network attempt was made. The
    /// caller must supply it; retrying cannot help.
    #[error("cannot resolve conversation: missing {field}")]
    Precondition { field: &'static str },

    /// Conversation resolution failed. Blocks sending until resolution
    /// succeeds; no partial state is retained.
    #[error("conversation is unavailable: {source}")]
    ConversationUnavailable {
        #[source]
        source: anyhow::Error,
    },

    /// A history page fetch failed. The store is left unchanged and the
    /// failure is isolated to this one page request.
    #[error("failed to load message history: {source}")]
    HistoryLoadFailed {
        #[source]
        source: anyhow::Error,
    },

    /// The create-message call failed after the optimistic insert. The entry
    /// has been rolled back; `text` is the composed message, preserved so the
    /// caller can offer it for retry.
    #[error("failed to send message: {source}")]
    SendFailed {
        text: String,
        #[source]
        source: anyhow::Error,
    },
}

impl ChatError {
    /// Whether re-invoking the failed operation with the same inputs can
    /// succeed. Precondition failures need different inputs; an unavailable
    /// conversation blocks everything until resolution succeeds.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::HistoryLoadFailed { .. } | Self::SendFailed { .. }
        )
    }
}
