//! Rendering engine lines for humans.

use shakmaty::{san::San, uci::UciMove, Chess, Position};

use crate::position::parse_position;

/// A principal variation rendered in SAN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanLine {
    /// Move-numbered text, e.g. `"1. e4 e5 2. Nf3"` or `"3... Kh8 4. Qh7#"`.
    pub formatted: String,
    pub moves: Vec<String>,
}

/// Convert a UCI principal variation to SAN, stopping at the first move that
/// does not parse or is illegal.
pub fn pv_to_san(fen: &str, pv: &[String]) -> Option<SanLine> {
    let mut pos: Chess = parse_position(fen).ok()?;
    let mut fullmove = pos.fullmoves().get();
    let mut white = pos.turn().is_white();

    let mut moves = Vec::new();
    let mut formatted = String::new();

    for uci_str in pv {
        let Some(san) = uci_to_san(&mut pos, uci_str) else {
            break;
        };

        if !formatted.is_empty() {
            formatted.push(' ');
        }
        if white {
            formatted.push_str(&format!("{fullmove}. {san}"));
        } else {
            if moves.is_empty() {
                formatted.push_str(&format!("{fullmove}... "));
            }
            formatted.push_str(&san);
            fullmove += 1;
        }
        white = !white;
        moves.push(san);
    }

    if moves.is_empty() {
        return None;
    }
    Some(SanLine { formatted, moves })
}

/// Play one UCI move on `pos` and return its SAN (with check suffix).
fn uci_to_san(pos: &mut Chess, uci_str: &str) -> Option<String> {
    let uci_move: UciMove = uci_str.parse().ok()?;
    let legal_move = uci_move.to_move(&*pos).ok()?;
    let san = San::from_move(&*pos, legal_move.clone());
    pos.play_unchecked(legal_move);

    let suffix = if pos.is_checkmate() {
        "#"
    } else if pos.is_check() {
        "+"
    } else {
        ""
    };
    Some(format!("{san}{suffix}"))
}
