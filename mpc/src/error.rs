use std::io;

use thiserror::Error;

/// Kind of correlated randomness served by a dealer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaterialKind {
    BeaverTriple,
    MatrixTriple,
    TruncationPair,
    ComparisonMask,
}

/// Reason why a communication round could not be completed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AbortReason {
    /// No message arrived before the configured timeout.
    Timeout,
    /// Peer closed its channel or the message could not be decoded.
    Disconnected,
    /// Message could not be written to the channel.
    SendFailed,
}

/// Errors of the secret-sharing engine and its protocols.
#[derive(Debug, Error)]
pub enum MpcError {
    #[error("value {value} is not representable with {precision} fractional bits")]
    EncodingOverflow { value: f64, precision: u32 },

    #[error("reveal needs {expected} shares, got {actual}")]
    IncompleteShareSet { expected: usize, actual: usize },

    #[error("precomputed {kind:?} material exhausted: requested {requested}, available {available}")]
    InsufficientPrecompute {
        kind: MaterialKind,
        requested: usize,
        available: usize,
    },

    #[error("protocol aborted while talking to party {peer}: {reason:?}")]
    ProtocolAborted { peer: usize, reason: AbortReason },

    #[error("shape mismatch in {op}: {lhs:?} vs {rhs:?}")]
    ShapeMismatch {
        op: &'static str,
        lhs: Vec<usize>,
        rhs: Vec<usize>,
    },

    #[error("circuit is pending without issuing any communication")]
    Stalled,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl MpcError {
    /// Shape mismatch between two operands.
    pub fn shape_mismatch(op: &'static str, lhs: &[usize], rhs: &[usize]) -> Self {
        Self::ShapeMismatch {
            op,
            lhs: lhs.to_vec(),
            rhs: rhs.to_vec(),
        }
    }

    /// Whether the error was raised by a failed round trip.
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::ProtocolAborted { .. })
    }
}

impl From<bincode::Error> for MpcError {
    fn from(err: bincode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for MpcError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

pub type Result<T, E = MpcError> = std::result::Result<T, E>;
