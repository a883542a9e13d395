/// Errors produced by the notification subsystem.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The queue's worker thread has exited.
    #[error("dispatch queue '{0}' is closed")]
    QueueClosed(String),

    /// `sync` was called from the queue's own thread.
    #[error("cannot wait for dispatch queue '{0}' from its own thread")]
    SyncOnQueue(String),

    /// The worker thread could not be started.
    #[error("failed to spawn dispatch queue '{label}': {source}")]
    Spawn {
        label: String,
        source: std::io::Error,
    },

    /// Diff computation failed.
    #[error("diff error: {0}")]
    Diff(#[from] vellum_diff::DiffError),
}

/// Convenience alias used throughout the notify crate.
pub type Result<T> = std::result::Result<T, NotifyError>;
