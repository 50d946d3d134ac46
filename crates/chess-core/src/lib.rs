//! Position tokens and the move-rules capability used by the analysis crates.
//!
//! A *position token* is a FEN string. Everything here is a thin layer over
//! `shakmaty`: the analysis subsystem treats legality as a trusted capability
//! and never generates moves itself.

pub mod error;
pub mod notation;
pub mod position;
pub mod rules;

pub use error::RulesError;
pub use rules::{MoveRules, StandardRules};
