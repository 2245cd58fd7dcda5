use hyk_trie_sync::SyncError;

/// Reasons a state sync ends without a complete state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateSyncError {
    /// The sync was cancelled. Everything committed so far stays staged.
    #[error("state sync cancelled")]
    Cancelled,
    /// Verified content could not be decoded.
    #[error("state sync aborted: {0}")]
    Aborted(#[source] SyncError),
    /// Too many batches in a row failed without any progress in between.
    #[error("state sync stalled after {rounds} batches in a row made no progress")]
    Stalled {
        /// Number of consecutive batches without progress.
        rounds: usize,
    },
    /// [`StateSync::run`](crate::StateSync::run) was called before a root was added.
    #[error("no state root to sync")]
    NoRoot,
    /// The synced state could not be written.
    #[error("failed to flush synced state: {0}")]
    Flush(#[source] SyncError),
}
