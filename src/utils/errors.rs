use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("failed to spawn worker: {0}")]
    Spawn(String),

    #[error("initialize handshake failed: {0}")]
    Handshake(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request '{method}' timed out after {timeout_ms}ms")]
    Timeout { method: String, timeout_ms: u64 },

    #[error("worker returned error: {0}")]
    Rpc(String),

    #[error("worker disconnected")]
    Disconnected,

    #[error("reconnection attempts exhausted")]
    ReconnectExhausted,

    #[error("no provider could resolve resource: {0}")]
    NoProviderFound(String),

    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type RelayResult<T> = Result<T, RelayError>;
