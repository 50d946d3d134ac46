//! One engine process per request, streamed back line by line.

use std::io;
use std::process::Stdio;
use std::time::Duration;

use futures::stream::{self, Stream};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use crate::error::AppError;

/// Extra time the engine gets to answer `stop` once the search budget is
/// spent.
const STOP_GRACE: Duration = Duration::from_secs(5);

pub struct EngineProcess {
    process: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

impl EngineProcess {
    pub fn spawn(path: &str) -> Result<Self, AppError> {
        let mut process = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AppError::EngineUnavailable(format!("Failed to spawn engine: {e}")))?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| AppError::Internal("engine stdin not captured".into()))?;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| AppError::Internal("engine stdout not captured".into()))?;

        debug!(path, pid = process.id(), "engine spawned");
        Ok(Self {
            process,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        })
    }

    pub async fn send(&mut self, cmd: &str) -> Result<(), AppError> {
        debug!(cmd, "engine <");
        let write = async {
            self.stdin.write_all(cmd.as_bytes()).await?;
            self.stdin.write_all(b"\n").await?;
            self.stdin.flush().await
        };
        write
            .await
            .map_err(|e| AppError::EngineUnavailable(format!("Failed to write to engine: {e}")))
    }

    /// Engine output as `\n`-terminated lines. Ends after `bestmove`, when the
    /// engine exits, or when `budget` and the stop grace period are both
    /// spent. Dropping the stream kills the engine.
    pub fn into_output(self, budget: Duration) -> impl Stream<Item = io::Result<String>> + Send {
        let state = OutputState {
            engine: self,
            deadline: Instant::now() + budget,
            stopping: false,
            done: false,
        };

        stream::unfold(state, |mut state| async move {
            if state.done {
                return None;
            }
            loop {
                match timeout_at(state.deadline, state.engine.stdout.next_line()).await {
                    Ok(Ok(Some(line))) => {
                        debug!(line = line.as_str(), "engine >");
                        if line.starts_with("bestmove") {
                            state.done = true;
                        }
                        return Some((Ok(format!("{line}\n")), state));
                    }
                    Ok(Ok(None)) => return None,
                    Ok(Err(e)) => {
                        state.done = true;
                        return Some((Err(e), state));
                    }
                    Err(_) if !state.stopping => {
                        warn!("search budget exhausted, stopping engine");
                        state.stopping = true;
                        state.deadline = Instant::now() + STOP_GRACE;
                        if state.engine.send("stop").await.is_err() {
                            return None;
                        }
                    }
                    Err(_) => {
                        warn!("engine ignored stop");
                        return None;
                    }
                }
            }
        })
    }
}

struct OutputState {
    engine: EngineProcess,
    deadline: Instant,
    stopping: bool,
    done: bool,
}

impl Drop for EngineProcess {
    fn drop(&mut self) {
        debug!(pid = self.process.id(), "killing engine");
        // Best-effort synchronous kill in drop
        let _ = self.process.start_kill();
    }
}
