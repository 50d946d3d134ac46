//! Error types for engine transports, analysis sessions and the tablebase
//! oracle.

use chess_core::RulesError;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum EngineError {
    #[error("Failed to start engine: {0}")]
    Spawn(String),

    #[error("Engine I/O error: {0}")]
    Io(String),
}

#[derive(Error, Debug, Clone)]
pub enum SessionError {
    #[error("Invalid position: {0}")]
    InvalidPosition(#[from] RulesError),

    #[error("No position set")]
    NoPosition,

    #[error("Invalid session config: {0}")]
    InvalidConfig(&'static str),

    #[error(transparent)]
    Transport(#[from] EngineError),

    #[error("Analysis session closed")]
    Closed,
}

#[derive(Error, Debug)]
pub enum OracleError {
    #[error("Invalid position: {0}")]
    InvalidPosition(#[from] RulesError),

    #[error("Tablebase unavailable: {0}")]
    Unavailable(String),
}
