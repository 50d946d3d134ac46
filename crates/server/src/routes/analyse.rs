//! `POST /api/engine/analyse`: run one command batch on a fresh engine.

use std::sync::Arc;

use axum::{
    body::Body,
    http::header::CONTENT_TYPE,
    response::{IntoResponse, Response},
    Extension,
};
use tracing::info;

use crate::config::Config;
use crate::engine::EngineProcess;
use crate::error::AppError;

const ALLOWED_COMMANDS: &[&str] = &["uci", "isready", "ucinewgame", "setoption", "position", "go"];

/// Split a request body into engine commands, up to and including the first
/// `go`. Anything after it is ignored.
pub fn parse_batch(body: &str) -> Result<Vec<&str>, AppError> {
    let mut batch = Vec::new();
    for line in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let keyword = line.split_whitespace().next().unwrap_or_default();
        if !ALLOWED_COMMANDS.contains(&keyword) {
            return Err(AppError::BadRequest(format!("Unsupported engine command: {keyword}")));
        }
        batch.push(line);
        if keyword == "go" {
            return Ok(batch);
        }
    }

    if batch.is_empty() {
        Err(AppError::BadRequest("No engine commands".into()))
    } else {
        Err(AppError::BadRequest("Command batch has no go command".into()))
    }
}

pub async fn analyse(
    Extension(config): Extension<Arc<Config>>,
    body: String,
) -> Result<Response, AppError> {
    let batch = parse_batch(&body)?;

    let mut engine = EngineProcess::spawn(&config.stockfish_path)?;
    for cmd in &batch {
        engine.send(cmd).await?;
    }
    info!(commands = batch.len(), "engine search started");

    let output = engine.into_output(config.max_search);
    Ok((
        [(CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(output),
    )
        .into_response())
}
