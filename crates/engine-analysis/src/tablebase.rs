//! Exact endgame results from a Lichess-compatible tablebase service.

use std::time::Duration;

use chess_core::{MoveRules, StandardRules};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::OracleError;

pub const DEFAULT_TABLEBASE_URL: &str = "https://tablebase.lichess.ovh/standard";

/// Largest piece count (kings included) the tablebase covers.
pub const MAX_TABLEBASE_PIECES: u32 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Wdl {
    Win,
    Draw,
    Loss,
    Unknown,
}

impl Wdl {
    /// Map a service category. Cursed wins and blessed losses are draws under
    /// the fifty-move rule.
    pub fn from_category(category: &str) -> Self {
        match category {
            "win" | "maybe-win" => Self::Win,
            "cursed-win" | "draw" | "blessed-loss" => Self::Draw,
            "loss" | "maybe-loss" => Self::Loss,
            _ => Self::Unknown,
        }
    }

    /// The same result seen from the other side.
    pub fn invert(self) -> Self {
        match self {
            Self::Win => Self::Loss,
            Self::Loss => Self::Win,
            other => other,
        }
    }

    fn rank(self) -> u8 {
        match self {
            Self::Win => 3,
            Self::Draw => 2,
            Self::Loss => 1,
            Self::Unknown => 0,
        }
    }
}

/// A candidate move, scored for the side to move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedMove {
    pub uci: String,
    pub san: Option<String>,
    pub wdl: Wdl,
    pub distance_to_zero: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TablebaseVerdict {
    pub piece_count: u32,
    pub applicable: bool,
    pub wdl: Wdl,
    pub distance_to_zero: i32,
    pub distance_to_mate: Option<i32>,
    /// Best first.
    pub ranked_moves: Vec<RankedMove>,
    pub recommended: Option<RankedMove>,
}

impl TablebaseVerdict {
    pub fn not_applicable(piece_count: u32) -> Self {
        Self {
            piece_count,
            applicable: false,
            wdl: Wdl::Unknown,
            distance_to_zero: 0,
            distance_to_mate: None,
            ranked_moves: Vec::new(),
            recommended: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TablebaseResponse {
    category: Option<String>,
    dtz: Option<i32>,
    dtm: Option<i32>,
    #[serde(default)]
    moves: Vec<TablebaseMove>,
}

/// Categories and distances here describe the position *after* the move, so
/// from the opponent's side.
#[derive(Debug, Deserialize)]
struct TablebaseMove {
    uci: String,
    san: Option<String>,
    category: Option<String>,
    dtz: Option<i32>,
}

/// Stateless tablebase client. Cheap to clone; safe to share.
#[derive(Debug, Clone)]
pub struct TablebaseOracle<R = StandardRules> {
    client: Client,
    base_url: String,
    timeout: Duration,
    rules: R,
}

impl TablebaseOracle {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self::with_rules(base_url, timeout, StandardRules)
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.tablebase_url.clone(), config.tablebase_timeout)
    }
}

impl<R: MoveRules> TablebaseOracle<R> {
    pub fn with_rules(base_url: impl Into<String>, timeout: Duration, rules: R) -> Self {
        let client = Client::builder()
            .user_agent("engine-analysis/0.1")
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to build HTTP client, using defaults: {e}");
                Client::new()
            });
        Self {
            client,
            base_url: base_url.into(),
            timeout,
            rules,
        }
    }

    /// Look up a position. Positions with more than
    /// [`MAX_TABLEBASE_PIECES`] pieces return an inapplicable verdict without
    /// touching the network.
    pub async fn query(&self, fen: &str) -> Result<TablebaseVerdict, OracleError> {
        let piece_count = self.rules.piece_count(fen)?;
        if piece_count > MAX_TABLEBASE_PIECES {
            debug!(piece_count, "tablebase not applicable");
            return Ok(TablebaseVerdict::not_applicable(piece_count));
        }

        debug!(fen, "tablebase lookup");
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[("fen", fen.trim())])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| OracleError::Unavailable(format!("Request error: {e}")))?;

        if !resp.status().is_success() {
            return Err(OracleError::Unavailable(format!("HTTP {}", resp.status())));
        }

        let body: TablebaseResponse = resp
            .json()
            .await
            .map_err(|e| OracleError::Unavailable(format!("Malformed response: {e}")))?;

        Ok(build_verdict(piece_count, body))
    }
}

fn build_verdict(piece_count: u32, body: TablebaseResponse) -> TablebaseVerdict {
    let mut ranked_moves: Vec<RankedMove> = body
        .moves
        .into_iter()
        .map(|m| RankedMove {
            uci: m.uci,
            san: m.san,
            wdl: m
                .category
                .as_deref()
                .map(Wdl::from_category)
                .unwrap_or(Wdl::Unknown)
                .invert(),
            distance_to_zero: -m.dtz.unwrap_or(0),
        })
        .collect();

    // Best result first; among equals, the fastest zeroing move.
    ranked_moves.sort_by(|a, b| {
        b.wdl
            .rank()
            .cmp(&a.wdl.rank())
            .then(a.distance_to_zero.abs().cmp(&b.distance_to_zero.abs()))
    });

    TablebaseVerdict {
        piece_count,
        applicable: true,
        wdl: body
            .category
            .as_deref()
            .map(Wdl::from_category)
            .unwrap_or(Wdl::Unknown),
        distance_to_zero: body.dtz.unwrap_or(0),
        distance_to_mate: body.dtm,
        recommended: ranked_moves.first().cloned(),
        ranked_moves,
    }
}
