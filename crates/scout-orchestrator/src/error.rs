use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Prompt error: {0}")]
    Prompt(String),

    #[error("Worker {worker_id} failed: {message}")]
    Worker { worker_id: u32, message: String },
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
