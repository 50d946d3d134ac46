//! Evaluation model shared by the parser, the session and the reconciler.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Mate scores are folded into centipawns as `±(MATE_SCORE - 10·n)`.
const MATE_SCORE: i32 = 10_000;

/// Engine score, from the side to move's perspective.
///
/// `Mate(n)`: positive means the side to move mates in `n`, negative means it
/// gets mated. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Evaluation {
    Centipawns(i32),
    Mate(i32),
}

impl Evaluation {
    /// Negate the score (flip perspective).
    pub fn negate(self) -> Self {
        match self {
            Self::Centipawns(cp) => Self::Centipawns(-cp),
            Self::Mate(m) => Self::Mate(-m),
        }
    }

    /// Re-orient to White's perspective for history display.
    pub fn for_white(self, white_to_move: bool) -> Self {
        if white_to_move {
            self
        } else {
            self.negate()
        }
    }

    /// Single comparable number. Shorter mates score higher.
    pub fn to_centipawns(self) -> i32 {
        match self {
            Self::Centipawns(cp) => cp,
            Self::Mate(m) if m > 0 => MATE_SCORE - m * 10,
            Self::Mate(m) => -MATE_SCORE - m * 10,
        }
    }

    pub fn is_mate(self) -> bool {
        matches!(self, Self::Mate(_))
    }
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Centipawns(cp) => write!(f, "{:+.2}", *cp as f64 / 100.0),
            Self::Mate(m) => write!(f, "#{m}"),
        }
    }
}

/// One parsed `info … score … pv …` report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchUpdate {
    /// 1-based MultiPV rank.
    pub slot: u32,
    pub evaluation: Evaluation,
    pub depth: u32,
    pub pv: Vec<String>,
}

/// A published candidate line. Built only from a [`SearchUpdate`] with a
/// non-empty PV, so `best_move == pv[0]` always holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariationLine {
    pub slot: u32,
    pub evaluation: Evaluation,
    pub best_move: String,
    pub pv: Vec<String>,
    pub depth: u32,
}

impl VariationLine {
    pub fn from_update(update: SearchUpdate) -> Option<Self> {
        let best_move = update.pv.first()?.clone();
        Some(Self {
            slot: update.slot,
            evaluation: update.evaluation,
            best_move,
            pv: update.pv,
            depth: update.depth,
        })
    }
}

/// Monotonically increasing identifier attached to everything a session
/// publishes for one analysis request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct RequestId(pub u64);

impl RequestId {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An opaque engine option, sent as `setoption name <name> value <value>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineOption {
    pub name: String,
    pub value: String,
}

impl EngineOption {
    pub fn new(name: impl Into<String>, value: impl ToString) -> Self {
        Self {
            name: name.into(),
            value: value.to_string(),
        }
    }

    pub fn to_command(&self) -> String {
        format!("setoption name {} value {}", self.name, self.value)
    }
}

/// Per-request search parameters. Replaced wholesale, never mutated while a
/// search runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub search_depth: u32,
    pub variation_count: u32,
    #[serde(default)]
    pub extra_options: Vec<EngineOption>,
}

impl SessionConfig {
    pub fn new(search_depth: u32, variation_count: u32) -> Self {
        Self {
            search_depth,
            variation_count,
            extra_options: Vec::new(),
        }
    }

    pub fn with_option(mut self, option: EngineOption) -> Self {
        self.extra_options.push(option);
        self
    }

    pub fn validate(&self) -> Result<(), SessionError> {
        if self.search_depth == 0 {
            return Err(SessionError::InvalidConfig("search depth must be at least 1"));
        }
        if self.variation_count == 0 {
            return Err(SessionError::InvalidConfig(
                "variation count must be at least 1",
            ));
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(18, 1)
    }
}

/// One "analyse this position" call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub id: RequestId,
    pub position: String,
    pub config: SessionConfig,
}

/// Full ranked list for one request, sorted ascending by slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisSnapshot {
    pub request: RequestId,
    pub lines: Vec<VariationLine>,
}

impl AnalysisSnapshot {
    /// The top-ranked line, if the engine has reported it yet.
    pub fn best_line(&self) -> Option<&VariationLine> {
        self.lines.iter().find(|l| l.slot == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Evaluation::Centipawns(35).to_string(), "+0.35");
        assert_eq!(Evaluation::Centipawns(-120).to_string(), "-1.20");
        assert_eq!(Evaluation::Mate(3).to_string(), "#3");
        assert_eq!(Evaluation::Mate(-3).to_string(), "#-3");
    }

    #[test]
    fn test_to_centipawns_orders_mates() {
        assert_eq!(Evaluation::Mate(1).to_centipawns(), 9990);
        assert_eq!(Evaluation::Mate(-1).to_centipawns(), -9990);
        assert!(Evaluation::Mate(2).to_centipawns() < Evaluation::Mate(1).to_centipawns());
        assert!(Evaluation::Mate(5).to_centipawns() > Evaluation::Centipawns(2000).to_centipawns());
    }

    #[test]
    fn test_for_white_flips_black_to_move() {
        assert_eq!(Evaluation::Centipawns(50).for_white(true), Evaluation::Centipawns(50));
        assert_eq!(Evaluation::Centipawns(50).for_white(false), Evaluation::Centipawns(-50));
        assert_eq!(Evaluation::Mate(-2).for_white(false), Evaluation::Mate(2));
    }

    #[test]
    fn test_variation_line_requires_pv() {
        let update = SearchUpdate {
            slot: 1,
            evaluation: Evaluation::Centipawns(0),
            depth: 1,
            pv: vec![],
        };
        assert!(VariationLine::from_update(update).is_none());
    }

    #[test]
    fn test_config_validation() {
        assert!(SessionConfig::new(10, 3).validate().is_ok());
        assert!(SessionConfig::new(0, 3).validate().is_err());
        assert!(SessionConfig::new(10, 0).validate().is_err());
    }

    #[test]
    fn test_option_command() {
        let opt = EngineOption::new("Hash", 256);
        assert_eq!(opt.to_command(), "setoption name Hash value 256");
    }
}
