//! Engine analysis: drive a UCI engine locally or through an engine host,
//! turn its output into ranked candidate lines, and overlay exact endgame
//! results from a tablebase.

pub mod config;
pub mod error;
pub mod eval;
pub mod reconcile;
pub mod session;
pub mod tablebase;
pub mod transport;
pub mod uci;

pub use config::EngineConfig;
pub use error::{EngineError, OracleError, SessionError};
pub use eval::{
    AnalysisRequest, AnalysisSnapshot, EngineOption, Evaluation, RequestId, SearchUpdate,
    SessionConfig, VariationLine,
};
pub use reconcile::{reconcile, OracleState, Recommendation};
pub use session::{AnalysisSession, SessionEvent, SessionHandle, SessionState};
pub use tablebase::{RankedMove, TablebaseOracle, TablebaseVerdict, Wdl};
