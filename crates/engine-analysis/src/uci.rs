//! UCI output parsing.
//!
//! Pure functions over single lines. Anything that does not match the fixed
//! grammar yields `None` / [`EngineLine::Other`]; nothing here panics on
//! garbled input.

use std::sync::LazyLock;

use regex::Regex;

use crate::eval::{Evaluation, SearchUpdate};

static SCORE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bscore (cp|mate) (-?\d+)\b").unwrap());
static DEPTH_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bdepth (\S+)").unwrap());
static MULTIPV_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bmultipv (\S+)").unwrap());

/// Tokens that may follow the PV on some engines and are not moves.
const PV_TERMINATORS: &[&str] = &["bmc", "string"];

/// Final move report of a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BestMove {
    /// `None` for `bestmove (none)` (no legal moves).
    pub best: Option<String>,
    pub ponder: Option<String>,
}

/// What kind of line the engine sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineLine {
    IdName(String),
    UciOk,
    ReadyOk,
    /// `info string …` free text.
    Info(String),
    BestMove(BestMove),
    Search(SearchUpdate),
    Other,
}

/// Classify one line of engine output.
pub fn classify(line: &str) -> EngineLine {
    let trimmed = line.trim();
    match trimmed {
        "uciok" => return EngineLine::UciOk,
        "readyok" => return EngineLine::ReadyOk,
        _ => {}
    }
    if let Some(name) = trimmed.strip_prefix("id name ") {
        return EngineLine::IdName(name.trim().to_string());
    }
    if let Some(text) = trimmed.strip_prefix("info string ") {
        return EngineLine::Info(text.trim().to_string());
    }
    if let Some(best) = parse_bestmove(trimmed) {
        return EngineLine::BestMove(best);
    }
    match parse_line(trimmed) {
        Some(update) => EngineLine::Search(update),
        None => EngineLine::Other,
    }
}

/// Parse a score/PV report into a [`SearchUpdate`].
///
/// Requires an `info` line with a `score` and a non-empty `pv`. `multipv`
/// defaults to 1 and `depth` to 0.
pub fn parse_line(line: &str) -> Option<SearchUpdate> {
    let line = line.trim();
    let mut tokens = line.split_whitespace();
    if tokens.next() != Some("info") || tokens.next() == Some("string") {
        return None;
    }

    let (head, tail) = split_at_pv(line)?;

    let score = SCORE_RE.captures(head)?;
    let value: i32 = score[2].parse().ok()?;
    let evaluation = match &score[1] {
        "cp" => Evaluation::Centipawns(value),
        _ if value == 0 => return None,
        _ => Evaluation::Mate(value),
    };

    let slot = match MULTIPV_RE.captures(head) {
        Some(c) => c[1].parse::<u32>().ok().filter(|s| *s >= 1)?,
        None => 1,
    };
    let depth = match DEPTH_RE.captures(head) {
        Some(c) => c[1].parse::<u32>().ok()?,
        None => 0,
    };

    let pv = parse_pv(tail);
    if pv.is_empty() {
        return None;
    }

    Some(SearchUpdate {
        slot,
        evaluation,
        depth,
        pv,
    })
}

/// Parse `bestmove <move> [ponder <move>]`.
pub fn parse_bestmove(line: &str) -> Option<BestMove> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.first() != Some(&"bestmove") {
        return None;
    }
    let best = parts
        .get(1)
        .filter(|m| **m != "(none)")
        .map(|m| m.to_string());
    let ponder = match parts.get(2) {
        Some(&"ponder") => parts.get(3).map(|m| m.to_string()),
        _ => None,
    };
    Some(BestMove { best, ponder })
}

/// Split the line around the ` pv ` marker.
fn split_at_pv(line: &str) -> Option<(&str, &str)> {
    let idx = line.find(" pv ")?;
    Some((&line[..idx], &line[idx + 4..]))
}

fn parse_pv(tail: &str) -> Vec<String> {
    tail.split_whitespace()
        .take_while(|t| !PV_TERMINATORS.iter().any(|k| t.starts_with(k)))
        .map(|t| t.to_string())
        .collect()
}
