//! Decide what to present: the exact tablebase answer or the engine's lines.

use serde::Serialize;

use crate::error::OracleError;
use crate::eval::{AnalysisSnapshot, Evaluation, VariationLine};
use crate::tablebase::TablebaseVerdict;

/// Where the tablebase lookup for the current position stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleState {
    Pending,
    Ready(TablebaseVerdict),
    Failed(String),
}

impl OracleState {
    pub fn from_result(result: Result<TablebaseVerdict, OracleError>) -> Self {
        match result {
            Ok(verdict) => Self::Ready(verdict),
            Err(e) => Self::Failed(e.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Recommendation {
    NoVerdictYet,
    /// Exact result. Engine lines, if any, are kept for display only.
    Tablebase {
        verdict: TablebaseVerdict,
        best_move: Option<String>,
        supplementary: Vec<VariationLine>,
    },
    Engine {
        lines: Vec<VariationLine>,
        best_move: Option<String>,
        evaluation: Option<Evaluation>,
    },
}

impl Recommendation {
    pub fn best_move(&self) -> Option<&str> {
        match self {
            Self::NoVerdictYet => None,
            Self::Tablebase { best_move, .. } | Self::Engine { best_move, .. } => {
                best_move.as_deref()
            }
        }
    }
}

/// An applicable tablebase verdict always wins. Otherwise the engine is
/// authoritative, including while the lookup is still pending.
pub fn reconcile(oracle: &OracleState, engine: Option<&AnalysisSnapshot>) -> Recommendation {
    let lines = engine.map(|s| s.lines.clone()).unwrap_or_default();

    if let OracleState::Ready(verdict) = oracle {
        if verdict.applicable {
            return Recommendation::Tablebase {
                best_move: verdict.recommended.as_ref().map(|m| m.uci.clone()),
                verdict: verdict.clone(),
                supplementary: lines,
            };
        }
    }

    if lines.is_empty() {
        return Recommendation::NoVerdictYet;
    }

    let best = engine.and_then(AnalysisSnapshot::best_line);
    Recommendation::Engine {
        best_move: best.map(|l| l.best_move.clone()),
        evaluation: best.map(|l| l.evaluation),
        lines,
    }
}
