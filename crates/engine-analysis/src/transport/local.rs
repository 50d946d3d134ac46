//! Co-located engine: a child process on a persistent stdin/stdout pipe, or
//! any in-process async reader/writer pair speaking UCI.

use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::{Connector, OutputSink, Transport};
use crate::error::EngineError;

/// Drives an engine over a persistent duplex channel.
///
/// Commands are queued to a writer task, so `send` returns immediately. A
/// reader task relays output lines in order. Because a UCI engine answers
/// every `go` with exactly one `bestmove`, the reader attributes each line to
/// search `bestmoves_seen + 1`.
pub struct LocalTransport {
    commands: Option<mpsc::UnboundedSender<String>>,
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
    child: Option<Child>,
}

impl LocalTransport {
    /// Spawn an engine binary and attach to its stdio.
    pub fn spawn(path: &str, sink: OutputSink) -> Result<Self, EngineError> {
        let mut child = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::Spawn(format!("{path}: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::Spawn("engine stdin not captured".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Spawn("engine stdout not captured".into()))?;

        debug!(path, pid = child.id(), "engine process spawned");

        let mut transport = Self::from_io(stdout, stdin, sink);
        transport.child = Some(child);
        Ok(transport)
    }

    /// Drive an engine that lives behind an arbitrary async byte stream.
    pub fn from_io<R, W>(reader: R, writer: W, sink: OutputSink) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            commands: Some(tx),
            writer: Some(tokio::spawn(write_commands(writer, rx))),
            reader: Some(tokio::spawn(relay_output(reader, sink))),
            child: None,
        }
    }
}

impl Transport for LocalTransport {
    fn send(&mut self, command: &str) {
        if let Some(commands) = &self.commands {
            let _ = commands.send(command.to_string());
        }
    }

    fn terminate(&mut self) {
        self.commands = None;
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(writer) = self.writer.take() {
            writer.abort();
        }
        if let Some(mut child) = self.child.take() {
            // Best-effort: the runtime reaps the process.
            let _ = child.start_kill();
            debug!("engine process killed");
        }
    }
}

impl Drop for LocalTransport {
    fn drop(&mut self) {
        self.terminate();
    }
}

async fn write_commands<W>(mut writer: W, mut commands: mpsc::UnboundedReceiver<String>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(cmd) = commands.recv().await {
        debug!(cmd = %cmd, "engine <");
        let written = async {
            writer.write_all(cmd.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await
        };
        if let Err(e) = written.await {
            warn!("Failed to write to engine: {e}");
            break;
        }
    }
}

async fn relay_output<R>(reader: R, sink: OutputSink)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut search = 1u64;

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim_end();
                if line.is_empty() {
                    continue;
                }
                trace!(line, "engine >");
                let search_done = line.starts_with("bestmove");
                if !sink.line(search, line) {
                    return;
                }
                if search_done {
                    search += 1;
                }
            }
            Ok(None) => {
                sink.failed(search, "engine process exited");
                return;
            }
            Err(e) => {
                sink.failed(search, format!("failed to read engine output: {e}"));
                return;
            }
        }
    }
}

/// Spawns a fresh engine process per connection.
#[derive(Debug, Clone)]
pub struct LocalConnector {
    path: String,
}

impl LocalConnector {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl Connector for LocalConnector {
    fn connect(&self, sink: OutputSink) -> Result<Box<dyn Transport>, EngineError> {
        Ok(Box::new(LocalTransport::spawn(&self.path, sink)?))
    }
}
