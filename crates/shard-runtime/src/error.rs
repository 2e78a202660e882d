//! Runtime error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from the container engine client.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unsupported engine endpoint '{0}'")]
    Endpoint(String),

    #[error("{op}: {source}")]
    Transport {
        op: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("engine returned {status} for {op}: {message}")]
    Api {
        op: &'static str,
        status: u16,
        message: String,
    },

    #[error("decoding engine response for {op}: {source}")]
    Decode {
        op: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors from group orchestration.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("group '{0}' does not exist")]
    GroupNotFound(String),

    #[error("invalid port spec '{0}'")]
    InvalidPortSpec(String),

    #[error("reading config overlay {path}: {source}")]
    OverlayRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("decoding config overlay {path}: {source}")]
    OverlayDecode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Engine(#[from] EngineError),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
