//! Analyse one position from the command line.
//!
//! Prints every snapshot the engine publishes, then the tablebase verdict
//! (when the position is small enough) and the final recommendation.

use chess_core::notation::pv_to_san;
use chess_core::position::{white_to_move, STANDARD_START_FEN};
use engine_analysis::{
    reconcile, EngineConfig, OracleState, Recommendation, SessionConfig, SessionEvent,
    SessionHandle, TablebaseOracle,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

struct Args {
    fen: String,
    depth: u32,
    multipv: u32,
    json: bool,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let defaults = SessionConfig::default();
    let mut parsed = Args {
        fen: STANDARD_START_FEN.to_string(),
        depth: defaults.search_depth,
        multipv: defaults.variation_count,
        json: false,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--fen" => {
                if let Some(fen) = args.get(i + 1) {
                    parsed.fen = fen.clone();
                }
                i += 2;
            }
            "--depth" => {
                parsed.depth = args.get(i + 1).and_then(|s| s.parse().ok()).unwrap_or(parsed.depth);
                i += 2;
            }
            "--multipv" => {
                parsed.multipv = args.get(i + 1).and_then(|s| s.parse().ok()).unwrap_or(parsed.multipv);
                i += 2;
            }
            "--json" => {
                parsed.json = true;
                i += 1;
            }
            "-h" | "--help" => {
                eprintln!("Usage: {} [--fen FEN] [--depth N] [--multipv N] [--json]", args[0]);
                std::process::exit(0);
            }
            _ => i += 1,
        }
    }
    parsed
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args();
    let config = EngineConfig::from_env();
    info!(
        remote = config.remote_url.is_some(),
        depth = args.depth,
        multipv = args.multipv,
        "analysing position"
    );

    let oracle = TablebaseOracle::from_config(&config);
    let lookup = tokio::spawn({
        let fen = args.fen.clone();
        async move { oracle.query(&fen).await }
    });

    let handle = SessionHandle::spawn(config.connector());
    let mut events = handle.subscribe();
    let request = handle
        .analyze_position(&args.fen, SessionConfig::new(args.depth, args.multipv))
        .await?;

    let white = white_to_move(&args.fen).unwrap_or(true);
    let mut last_snapshot = None;

    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "display fell behind the engine");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        if event.request() != request {
            continue;
        }

        match event {
            SessionEvent::Snapshot(snapshot) => {
                if args.json {
                    println!("{}", serde_json::to_string(&snapshot)?);
                } else {
                    for line in &snapshot.lines {
                        let san = pv_to_san(&args.fen, &line.pv)
                            .map(|s| s.formatted)
                            .unwrap_or_else(|| line.pv.join(" "));
                        println!(
                            "depth {:>2}  [{}] {:>7}  {}",
                            line.depth,
                            line.slot,
                            line.evaluation.for_white(white).to_string(),
                            san
                        );
                    }
                }
                last_snapshot = Some(snapshot);
            }
            SessionEvent::Message { text, .. } => info!("engine: {text}"),
            SessionEvent::Completed { best_move, .. } => {
                info!(best_move = ?best_move, "search complete");
                break;
            }
            SessionEvent::Failed { message, .. } => {
                warn!("analysis failed: {message}");
                break;
            }
            SessionEvent::Cancelled { .. } => break,
        }
    }

    handle.shutdown().await;

    let oracle_state = OracleState::from_result(lookup.await?);
    if let OracleState::Failed(reason) = &oracle_state {
        warn!("tablebase lookup failed: {reason}");
    }

    let recommendation = reconcile(&oracle_state, last_snapshot.as_ref());
    if args.json {
        println!("{}", serde_json::to_string(&recommendation)?);
        return Ok(());
    }

    match &recommendation {
        Recommendation::NoVerdictYet => println!("no result"),
        Recommendation::Tablebase { verdict, best_move, .. } => println!(
            "tablebase: {:?} (dtz {}, dtm {}), best move {}",
            verdict.wdl,
            verdict.distance_to_zero,
            verdict
                .distance_to_mate
                .map(|d| d.to_string())
                .unwrap_or_else(|| "-".into()),
            best_move.as_deref().unwrap_or("-")
        ),
        Recommendation::Engine { best_move, evaluation, .. } => println!(
            "engine: {}, best move {}",
            evaluation
                .map(|e| e.for_white(white).to_string())
                .unwrap_or_else(|| "-".into()),
            best_move.as_deref().unwrap_or("-")
        ),
    }

    Ok(())
}
