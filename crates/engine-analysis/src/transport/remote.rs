//! Engine host reached over a streaming HTTP request.
//!
//! The host spawns a fresh engine per request, so there is no persistent pipe
//! to write into. Configuration and the position are buffered locally and the
//! whole batch goes out with the `go` command; the response body is the
//! engine's output, one line per `\n`.

use std::time::Duration;

use futures::StreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use super::{command_keyword, Connector, FailureScope, OutputSink, Transport};
use crate::error::EngineError;

const USER_AGENT: &str = "engine-analysis/0.1";

/// Where the batch buffer stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Empty,
    Configuring,
    Positioned,
    Searching,
}

pub struct RemoteTransport {
    client: Client,
    url: String,
    start_timeout: Duration,
    sink: OutputSink,
    handshake: Vec<String>,
    pending_options: Vec<String>,
    latched_position: Option<String>,
    searches: u64,
    in_flight: Option<JoinHandle<()>>,
    terminated: bool,
}

impl RemoteTransport {
    pub fn new(client: Client, url: String, start_timeout: Duration, sink: OutputSink) -> Self {
        Self {
            client,
            url,
            start_timeout,
            sink,
            handshake: Vec::new(),
            pending_options: Vec::new(),
            latched_position: None,
            searches: 0,
            in_flight: None,
            terminated: false,
        }
    }

    pub fn state(&self) -> BatchState {
        if self.in_flight.as_ref().is_some_and(|t| !t.is_finished()) {
            BatchState::Searching
        } else if self.latched_position.is_some() {
            BatchState::Positioned
        } else if !self.pending_options.is_empty() || !self.handshake.is_empty() {
            BatchState::Configuring
        } else {
            BatchState::Empty
        }
    }

    /// The commands that precede `go` in the next batch.
    pub fn pending_batch(&self) -> Vec<String> {
        let mut batch = self.handshake.clone();
        batch.extend(self.pending_options.iter().cloned());
        batch.extend(self.latched_position.iter().cloned());
        batch
    }

    fn buffer_option(&mut self, command: &str) {
        let name = option_name(command);
        match self
            .pending_options
            .iter_mut()
            .find(|existing| option_name(existing) == name)
        {
            Some(existing) => *existing = command.to_string(),
            None => self.pending_options.push(command.to_string()),
        }
    }

    fn start_search(&mut self, go: &str) {
        self.abort_search();
        if self.latched_position.is_none() {
            warn!("Starting remote search without a position");
        }

        self.searches += 1;
        let search = self.searches;

        let mut batch = self.pending_batch();
        batch.push(go.to_string());
        debug!(search, commands = batch.len(), url = %self.url, "sending remote batch");

        let mut body = batch.join("\n");
        body.push('\n');

        self.in_flight = Some(tokio::spawn(stream_search(
            self.client.clone(),
            self.url.clone(),
            body,
            self.start_timeout,
            self.sink.clone(),
            search,
        )));
    }

    /// Dropping the request future closes the connection, which is what tells
    /// the host to kill the engine.
    fn abort_search(&mut self) {
        if let Some(task) = self.in_flight.take() {
            if !task.is_finished() {
                debug!(search = self.searches, "aborting remote search");
            }
            task.abort();
        }
    }
}

impl Transport for RemoteTransport {
    fn send(&mut self, command: &str) {
        if self.terminated {
            return;
        }
        let command = command.trim();
        match command_keyword(command) {
            "uci" | "isready" | "ucinewgame" => {
                if !self.handshake.iter().any(|c| c == command) {
                    self.handshake.push(command.to_string());
                }
            }
            "setoption" => self.buffer_option(command),
            "position" => self.latched_position = Some(command.to_string()),
            "go" => self.start_search(command),
            "stop" => self.abort_search(),
            "quit" => self.terminate(),
            _ => debug!(command, "ignoring command for remote engine"),
        }
    }

    fn terminate(&mut self) {
        if !self.terminated {
            self.abort_search();
            self.terminated = true;
        }
    }

    /// Each search is its own request; a failed one leaves the next usable.
    fn failure_scope(&self) -> FailureScope {
        FailureScope::Search
    }
}

impl Drop for RemoteTransport {
    fn drop(&mut self) {
        self.terminate();
    }
}

async fn stream_search(
    client: Client,
    url: String,
    body: String,
    start_timeout: Duration,
    sink: OutputSink,
    search: u64,
) {
    match relay_response(&client, &url, body, start_timeout, &sink, search).await {
        Ok(()) => {
            sink.ended(search);
        }
        Err(EngineError::Spawn(reason)) => {
            warn!(search, "Remote engine failed to start: {reason}");
            sink.line(search, format!("info string Engine failed to start: {reason}"));
            sink.failed(search, reason);
        }
        Err(e) => {
            warn!(search, "Remote engine stream broke: {e}");
            sink.failed(search, e.to_string());
        }
    }
}

async fn relay_response(
    client: &Client,
    url: &str,
    body: String,
    start_timeout: Duration,
    sink: &OutputSink,
    search: u64,
) -> Result<(), EngineError> {
    let deadline = Instant::now() + start_timeout;
    let no_output = || {
        EngineError::Spawn(format!(
            "no engine output within {}s",
            start_timeout.as_secs()
        ))
    };

    let response = timeout_at(
        deadline,
        client
            .post(url)
            .header(CONTENT_TYPE, "text/plain")
            .body(body)
            .send(),
    )
    .await
    .map_err(|_| no_output())?
    .map_err(|e| EngineError::Spawn(format!("request error: {e}")))?;

    if !response.status().is_success() {
        let status = response.status();
        let detail = response.text().await.unwrap_or_default();
        return Err(EngineError::Spawn(format!("HTTP {status} {}", detail.trim())));
    }

    let mut stream = response.bytes_stream();
    let mut buf: Vec<u8> = Vec::new();
    let mut started = false;

    loop {
        let next = if started {
            stream.next().await
        } else {
            timeout_at(deadline, stream.next())
                .await
                .map_err(|_| no_output())?
        };

        match next {
            Some(Ok(chunk)) => {
                buf.extend_from_slice(&chunk);
                while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                    let raw: Vec<u8> = buf.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&raw);
                    let line = line.trim_end();
                    if line.is_empty() {
                        continue;
                    }
                    started = true;
                    if !sink.line(search, line) {
                        return Ok(());
                    }
                }
            }
            Some(Err(e)) if started => return Err(EngineError::Io(e.to_string())),
            Some(Err(e)) => return Err(EngineError::Spawn(format!("stream error: {e}"))),
            None => break,
        }
    }

    let rest = String::from_utf8_lossy(&buf);
    let rest = rest.trim();
    if !rest.is_empty() {
        sink.line(search, rest);
    } else if !started {
        return Err(EngineError::Spawn("engine host closed the stream without output".into()));
    }
    Ok(())
}

/// `setoption name <name> value <v>` → lower-cased `<name>`.
fn option_name(command: &str) -> String {
    let rest = command
        .split_once(" name ")
        .map(|(_, rest)| rest)
        .unwrap_or(command);
    let name = rest.split_once(" value").map(|(n, _)| n).unwrap_or(rest);
    name.trim().to_ascii_lowercase()
}

/// Connects to an engine host at `url`.
#[derive(Debug, Clone)]
pub struct RemoteConnector {
    client: Client,
    url: String,
    start_timeout: Duration,
}

impl RemoteConnector {
    pub fn new(url: impl Into<String>, start_timeout: Duration) -> Self {
        // `relay_response` applies the start deadline itself.
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(start_timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to build HTTP client, using defaults: {e}");
                Client::new()
            });
        Self {
            client,
            url: url.into(),
            start_timeout,
        }
    }
}

impl Connector for RemoteConnector {
    fn connect(&self, sink: OutputSink) -> Result<Box<dyn Transport>, EngineError> {
        Ok(Box::new(RemoteTransport::new(
            self.client.clone(),
            self.url.clone(),
            self.start_timeout,
            sink,
        )))
    }
}
