use thiserror::Error;

pub type KeepsakeResult<T> = Result<T, KeepsakeError>;

#[derive(Debug, Error)]
pub enum KeepsakeError {
    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
