#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use axum::Router;
use engine_analysis::{RequestId, SessionEvent};
use tokio::sync::broadcast;
use tokio::time::timeout;

pub const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
pub const KPK_FEN: &str = "8/8/8/4k3/8/8/4P3/4K3 w - - 0 1";

/// Answers every `go` at once with two lines and a best move.
const QUICK_ENGINE: &str = r#"#!/bin/sh
while read -r cmd; do
  case "$cmd" in
    uci) echo "id name FakeFish"; echo "uciok" ;;
    isready) echo "readyok" ;;
    go*)
      echo "info depth 1 seldepth 1 multipv 1 score cp 20 nodes 20 pv e2e4 e7e5"
      echo "info depth 2 seldepth 2 multipv 1 score cp 31 nodes 80 pv e2e4 e7e5 g1f3"
      echo "bestmove e2e4 ponder e7e5"
      ;;
    quit) exit 0 ;;
  esac
done
"#;

/// Reports one line per `go`, then searches until told to stop.
const PATIENT_ENGINE: &str = r#"#!/bin/sh
searches=0
while read -r cmd; do
  case "$cmd" in
    uci) echo "id name PatientFish"; echo "uciok" ;;
    isready) echo "readyok" ;;
    go*)
      searches=$((searches + 1))
      echo "info depth 1 multipv 1 score cp $searches pv d2d4"
      ;;
    stop) echo "bestmove d2d4" ;;
    quit) exit 0 ;;
  esac
done
"#;

pub struct FakeEngines {
    pub quick: PathBuf,
    pub patient: PathBuf,
}

/// Fake engine scripts, written once per test binary before anything spawns
/// them.
#[cfg(unix)]
pub fn fake_engines() -> &'static FakeEngines {
    static ENGINES: OnceLock<FakeEngines> = OnceLock::new();
    ENGINES.get_or_init(|| FakeEngines {
        quick: write_script("quick", QUICK_ENGINE),
        patient: write_script("patient", PATIENT_ENGINE),
    })
}

#[cfg(unix)]
fn write_script(name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = std::env::temp_dir().join(format!("fake-engine-{name}-{}.sh", std::process::id()));
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Serve `app` on an ephemeral local port.
pub async fn spawn_server(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Next session event, failing the test after five seconds.
pub async fn next_event(events: &mut broadcast::Receiver<SessionEvent>) -> SessionEvent {
    timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for a session event")
        .expect("session event channel closed")
}

/// Events up to and including the terminal one for `request`.
pub async fn events_until_done(
    events: &mut broadcast::Receiver<SessionEvent>,
    request: RequestId,
) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    loop {
        let event = next_event(events).await;
        let done = event.request() == request
            && matches!(
                event,
                SessionEvent::Completed { .. }
                    | SessionEvent::Failed { .. }
                    | SessionEvent::Cancelled { .. }
            );
        seen.push(event);
        if done {
            return seen;
        }
    }
}

/// Whatever arrives within `window`.
pub async fn drain_for(
    events: &mut broadcast::Receiver<SessionEvent>,
    window: Duration,
) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    while let Ok(Ok(event)) = timeout(window, events.recv()).await {
        seen.push(event);
    }
    seen
}
