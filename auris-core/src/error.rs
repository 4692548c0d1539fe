use thiserror::Error;

use crate::events::EngineState;

/// All errors produced by auris-core.
#[derive(Debug, Error)]
pub enum AurisError {
    #[error("required asset missing or invalid: {0}")]
    AssetMissing(String),

    #[error("model initialization failed: {0}")]
    ModelInit(String),

    #[error("audio source error: {0}")]
    AudioDevice(String),

    #[error("inference error: {0}")]
    Inference(String),

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("invalid engine transition: {op} while {state:?}")]
    InvalidTransition {
        op: &'static str,
        state: EngineState,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AurisError>;
