use thiserror::Error;

/// Error type callbacks report failures through.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Preprocessing error: {0}")]
    Preprocessing(BoxError),

    #[error("Worker already started")]
    AlreadyStarted,

    #[error("Processor shut down")]
    ShutDown,

    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}
