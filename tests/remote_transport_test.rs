//! Sessions driving an engine host over HTTP, against in-process mock hosts.

mod common;

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{body::Body, http::StatusCode, response::IntoResponse, routing::post, Router};
use common::{drain_for, events_until_done, next_event, spawn_server, START_FEN};
use engine_analysis::transport::RemoteConnector;
use engine_analysis::{SessionConfig, SessionEvent, SessionHandle};

const ANALYSE_PATH: &str = "/api/engine/analyse";

fn remote(addr: std::net::SocketAddr, start_timeout: Duration) -> SessionHandle {
    let url = format!("http://{addr}{ANALYSE_PATH}");
    SessionHandle::spawn(Arc::new(RemoteConnector::new(url, start_timeout)))
}

/// Sets its flag when the response body is dropped.
struct DisconnectFlag(Arc<AtomicBool>);

impl Drop for DisconnectFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_stop_before_output_closes_connection() {
    let requests = Arc::new(AtomicUsize::new(0));
    let disconnected = Arc::new(AtomicBool::new(false));

    // Never produces a real line; only blank keep-alives.
    let app = Router::new().route(
        ANALYSE_PATH,
        post({
            let requests = requests.clone();
            let disconnected = disconnected.clone();
            move || async move {
                requests.fetch_add(1, Ordering::SeqCst);
                let flag = DisconnectFlag(disconnected);
                let body = futures::stream::unfold(flag, |flag| async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Some((Ok::<_, io::Error>("\n".to_string()), flag))
                });
                Body::from_stream(body)
            }
        }),
    );
    let addr = spawn_server(app).await;

    let handle = remote(addr, Duration::from_secs(10));
    let mut events = handle.subscribe();
    let request = handle
        .analyze_position(START_FEN, SessionConfig::new(20, 1))
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while requests.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("engine host never saw the request");

    assert_eq!(handle.stop().await.unwrap(), Some(request));
    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Cancelled { request }
    );

    tokio::time::timeout(Duration::from_secs(5), async {
        while !disconnected.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("engine host never saw the disconnect");

    let late = drain_for(&mut events, Duration::from_millis(200)).await;
    assert!(late.is_empty(), "events after stop: {late:?}");
    handle.shutdown().await;
}

#[tokio::test]
async fn test_batch_is_posted_and_output_relayed() {
    let received = Arc::new(Mutex::new(Vec::<String>::new()));
    let app = Router::new().route(
        ANALYSE_PATH,
        post({
            let received = received.clone();
            move |body: String| async move {
                received.lock().unwrap().push(body);
                concat!(
                    "id name HostFish\n",
                    "uciok\n",
                    "readyok\n",
                    "info depth 12 multipv 1 score cp 35 pv e2e4 e7e5\n",
                    "info depth 12 multipv 2 score cp 20 pv d2d4 d7d5\n",
                    "info string NNUE evaluation enabled\n",
                    "bestmove e2e4 ponder e7e5\n",
                )
            }
        }),
    );
    let addr = spawn_server(app).await;

    let handle = remote(addr, Duration::from_secs(5));
    let mut events = handle.subscribe();
    let request = handle
        .analyze_position(START_FEN, SessionConfig::new(12, 2))
        .await
        .unwrap();
    let seen = events_until_done(&mut events, request).await;

    let last_snapshot = seen
        .iter()
        .rev()
        .find_map(|e| match e {
            SessionEvent::Snapshot(s) => Some(s),
            _ => None,
        })
        .unwrap();
    let best: Vec<&str> = last_snapshot.lines.iter().map(|l| l.best_move.as_str()).collect();
    assert_eq!(best, vec!["e2e4", "d2d4"]);
    assert!(seen.contains(&SessionEvent::Message {
        request,
        text: "NNUE evaluation enabled".into(),
    }));
    assert_eq!(
        seen.last(),
        Some(&SessionEvent::Completed {
            request,
            best_move: Some("e2e4".into()),
        })
    );

    let bodies = received.lock().unwrap().clone();
    assert_eq!(bodies.len(), 1);
    let lines: Vec<&str> = bodies[0].lines().collect();
    let position = format!("position fen {START_FEN}");
    assert_eq!(
        lines,
        vec![
            "uci",
            "isready",
            "setoption name MultiPV value 2",
            position.as_str(),
            "go depth 12",
        ]
    );
    handle.shutdown().await;
}

#[tokio::test]
async fn test_unavailable_host_reports_start_failure() {
    let app = Router::new().route(
        ANALYSE_PATH,
        post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "no engines left").into_response() }),
    );
    let addr = spawn_server(app).await;

    let handle = remote(addr, Duration::from_secs(5));
    let mut events = handle.subscribe();
    let request = handle
        .analyze_position(START_FEN, SessionConfig::default())
        .await
        .unwrap();

    match next_event(&mut events).await {
        SessionEvent::Message { request: r, text } => {
            assert_eq!(r, request);
            assert!(text.starts_with("Engine failed to start"), "{text}");
        }
        other => panic!("expected a start-failure message, got {other:?}"),
    }
    assert!(matches!(
        next_event(&mut events).await,
        SessionEvent::Failed { request: r, .. } if r == request
    ));
    handle.shutdown().await;
}

#[tokio::test]
async fn test_silent_host_times_out() {
    let app = Router::new().route(
        ANALYSE_PATH,
        post(|| async {
            let body = futures::stream::pending::<Result<String, io::Error>>();
            Body::from_stream(body)
        }),
    );
    let addr = spawn_server(app).await;

    let handle = remote(addr, Duration::from_millis(300));
    let mut events = handle.subscribe();
    let request = handle
        .analyze_position(START_FEN, SessionConfig::default())
        .await
        .unwrap();

    let seen = events_until_done(&mut events, request).await;
    assert!(matches!(seen.last(), Some(SessionEvent::Failed { .. })));
}
