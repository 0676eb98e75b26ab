use std::io;

use mpc::MpcError;
use thiserror::Error;

/// Errors of model handling and secure inference.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error(transparent)]
    Mpc(#[from] MpcError),

    #[error("invalid model: {0}")]
    InvalidModel(String),

    #[error("party {party} must provide {what}")]
    MissingInput { party: usize, what: &'static str },

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ModelError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidModel(msg.into())
    }
}

pub type Result<T, E = ModelError> = std::result::Result<T, E>;
