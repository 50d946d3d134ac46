//! FEN position tokens.

use shakmaty::{fen::Fen, CastlingMode, Chess, Color, EnPassantMode, Position};

use crate::error::RulesError;

pub const STANDARD_START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Parse and validate a FEN into a playable position.
pub fn parse_position(fen: &str) -> Result<Chess, RulesError> {
    let parsed: Fen = fen.trim().parse().map_err(|e: shakmaty::fen::ParseFenError| {
        RulesError::InvalidFen {
            fen: fen.to_string(),
            reason: e.to_string(),
        }
    })?;

    parsed
        .into_position(CastlingMode::Standard)
        .map_err(|e| RulesError::IllegalPosition {
            fen: fen.to_string(),
            reason: e.to_string(),
        })
}

/// Serialize a position back into a FEN token.
pub fn to_fen(pos: &Chess) -> String {
    Fen::from_position(pos, EnPassantMode::Legal).to_string()
}

/// Total number of pieces on the board, kings and pawns included.
pub fn piece_count(fen: &str) -> Result<u32, RulesError> {
    let pos = parse_position(fen)?;
    Ok(pos.board().occupied().count() as u32)
}

pub fn white_to_move(fen: &str) -> Result<bool, RulesError> {
    Ok(parse_position(fen)?.turn() == Color::White)
}
