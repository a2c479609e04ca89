use thiserror::Error;

#[derive(Error, Debug)]
pub enum SitescreenError {
    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
