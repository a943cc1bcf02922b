use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Task identifier does not produce a usable repository name: {0:?}")]
    InvalidTaskIdentifier(String),

    #[error("Round must be 1 or greater, got {0}")]
    InvalidRound(u32),

    #[error("Validation error: {0}")]
    Validation(String),
}
