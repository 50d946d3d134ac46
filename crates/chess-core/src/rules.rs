//! The move-rules capability: "given a position and a move, produce the
//! resulting position, or reject it".

use shakmaty::{uci::UciMove, CastlingMode, Position};

use crate::error::RulesError;
use crate::position::{parse_position, to_fen};

pub trait MoveRules: Send + Sync {
    /// Check that a position token is well-formed and legal.
    fn validate(&self, fen: &str) -> Result<(), RulesError>;

    /// Play a UCI move and return the resulting position token.
    fn apply_move(&self, fen: &str, uci: &str) -> Result<String, RulesError>;

    /// All legal moves in UCI notation.
    fn legal_moves(&self, fen: &str) -> Result<Vec<String>, RulesError>;

    fn piece_count(&self, fen: &str) -> Result<u32, RulesError>;
}

/// Standard chess rules backed by `shakmaty`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardRules;

impl MoveRules for StandardRules {
    fn validate(&self, fen: &str) -> Result<(), RulesError> {
        parse_position(fen).map(|_| ())
    }

    fn apply_move(&self, fen: &str, uci: &str) -> Result<String, RulesError> {
        let mut pos = parse_position(fen)?;
        let illegal = || RulesError::IllegalMove {
            fen: fen.to_string(),
            uci: uci.to_string(),
        };
        let uci_move: UciMove = uci.parse().map_err(|_| illegal())?;
        let mv = uci_move.to_move(&pos).map_err(|_| illegal())?;
        pos.play_unchecked(mv);
        Ok(to_fen(&pos))
    }

    fn legal_moves(&self, fen: &str) -> Result<Vec<String>, RulesError> {
        let pos = parse_position(fen)?;
        Ok(pos
            .legal_moves()
            .iter()
            .map(|m| m.to_uci(CastlingMode::Standard).to_string())
            .collect())
    }

    fn piece_count(&self, fen: &str) -> Result<u32, RulesError> {
        crate::position::piece_count(fen)
    }
}
