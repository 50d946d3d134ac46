//! Tablebase oracle against a mock tablebase service.

mod common;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::Query, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use common::{spawn_server, KPK_FEN};
use engine_analysis::{
    reconcile, AnalysisSnapshot, Evaluation, OracleError, OracleState, Recommendation, RequestId,
    TablebaseOracle, VariationLine, Wdl,
};
use serde_json::json;

const SEVEN_PIECES: &str = "8/8/3p4/3pk3/8/2P1P3/3PK3/8 w - - 0 1";
const EIGHT_PIECES: &str = "8/8/3p4/3pk3/8/2P1P3/3PK3/4N3 w - - 0 1";

/// Mock tablebase that counts lookups and answers every position as a KPK win.
async fn mock_tablebase(hits: Arc<AtomicUsize>) -> String {
    let app = Router::new().route(
        "/standard",
        get(move |Query(params): Query<HashMap<String, String>>| async move {
            hits.fetch_add(1, Ordering::SeqCst);
            assert!(params.contains_key("fen"));
            Json(json!({
                "category": "win",
                "dtz": 1,
                "dtm": 19,
                "checkmate": false,
                "stalemate": false,
                "moves": [
                    {"uci": "e1d2", "san": "Kd2", "category": "draw", "dtz": 0, "dtm": null},
                    {"uci": "e2e4", "san": "e4", "category": "loss", "dtz": -1, "dtm": -18},
                    {"uci": "e1f2", "san": "Kf2", "category": "loss", "dtz": -3, "dtm": -22}
                ]
            }))
        }),
    );
    let addr = spawn_server(app).await;
    format!("http://{addr}/standard")
}

#[tokio::test]
async fn test_kpk_lookup() {
    let hits = Arc::new(AtomicUsize::new(0));
    let url = mock_tablebase(hits.clone()).await;
    let oracle = TablebaseOracle::new(url, Duration::from_secs(5));

    let verdict = oracle.query(KPK_FEN).await.unwrap();
    assert!(verdict.applicable);
    assert_eq!(verdict.piece_count, 3);
    assert_ne!(verdict.wdl, Wdl::Unknown);
    assert_eq!(verdict.wdl, Wdl::Win);
    assert_eq!(verdict.distance_to_mate, Some(19));

    let recommended = verdict.recommended.as_ref().unwrap();
    assert_eq!(recommended.uci, "e2e4");
    assert_eq!(recommended.san.as_deref(), Some("e4"));
    assert_eq!(recommended.wdl, Wdl::Win);
    assert_eq!(verdict.ranked_moves.last().unwrap().wdl, Wdl::Draw);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_piece_count_boundary() {
    let hits = Arc::new(AtomicUsize::new(0));
    let url = mock_tablebase(hits.clone()).await;
    let oracle = TablebaseOracle::new(url, Duration::from_secs(5));

    let seven = oracle.query(SEVEN_PIECES).await.unwrap();
    assert!(seven.applicable);
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    let eight = oracle.query(EIGHT_PIECES).await.unwrap();
    assert!(!eight.applicable);
    assert_eq!(eight.piece_count, 8);
    assert_eq!(hits.load(Ordering::SeqCst), 1, "no lookup above seven pieces");
}

#[tokio::test]
async fn test_server_error_is_unavailable() {
    let app = Router::new().route(
        "/standard",
        get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response() }),
    );
    let addr = spawn_server(app).await;
    let oracle = TablebaseOracle::new(format!("http://{addr}/standard"), Duration::from_secs(5));

    let err = oracle.query(KPK_FEN).await.unwrap_err();
    assert!(matches!(err, OracleError::Unavailable(_)));
}

#[tokio::test]
async fn test_malformed_payload_is_unavailable() {
    let app = Router::new().route("/standard", get(|| async { "not json" }));
    let addr = spawn_server(app).await;
    let oracle = TablebaseOracle::new(format!("http://{addr}/standard"), Duration::from_secs(5));

    assert!(matches!(
        oracle.query(KPK_FEN).await,
        Err(OracleError::Unavailable(_))
    ));
}

#[tokio::test]
async fn test_slow_service_hits_timeout() {
    let app = Router::new().route(
        "/standard",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            "{}"
        }),
    );
    let addr = spawn_server(app).await;
    let oracle = TablebaseOracle::new(format!("http://{addr}/standard"), Duration::from_millis(200));

    let result = tokio::time::timeout(Duration::from_secs(5), oracle.query(KPK_FEN))
        .await
        .expect("lookup outlived its timeout");
    assert!(matches!(result, Err(OracleError::Unavailable(_))));
}

#[tokio::test]
async fn test_verdict_overrides_engine() {
    let hits = Arc::new(AtomicUsize::new(0));
    let url = mock_tablebase(hits).await;
    let oracle = TablebaseOracle::new(url, Duration::from_secs(5));

    let engine = AnalysisSnapshot {
        request: RequestId(1),
        lines: vec![VariationLine {
            slot: 1,
            evaluation: Evaluation::Centipawns(180),
            best_move: "e1d2".into(),
            pv: vec!["e1d2".into()],
            depth: 24,
        }],
    };

    let pending = reconcile(&OracleState::Pending, Some(&engine));
    assert_eq!(pending.best_move(), Some("e1d2"));

    let ready = OracleState::from_result(oracle.query(KPK_FEN).await);
    match reconcile(&ready, Some(&engine)) {
        Recommendation::Tablebase { best_move, supplementary, .. } => {
            assert_eq!(best_move.as_deref(), Some("e2e4"));
            assert_eq!(supplementary, engine.lines);
        }
        other => panic!("expected the tablebase to win, got {other:?}"),
    }
}
