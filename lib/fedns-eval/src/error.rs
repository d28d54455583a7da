use thiserror::Error;

pub type Result<T> = std::result::Result<T, EvalError>;

#[derive(Error, Debug)]
pub enum EvalError {
    #[error("Invalid admission rate: {0} runs per second")]
    InvalidRate(u32),

    #[error("Malformed report {path} at line {line}: {reason}")]
    MalformedReport {
        path: String,
        line: usize,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
