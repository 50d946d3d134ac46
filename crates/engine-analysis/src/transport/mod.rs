//! Engine transports: one command/event contract over a co-located engine
//! ([`LocalTransport`]) or an engine host reached over HTTP
//! ([`RemoteTransport`]).
//!
//! Output never flows back through a return value. Each transport is handed an
//! [`OutputSink`] when it is created and pushes [`TransportEvent`]s into it,
//! tagged with the transport's generation and the search they belong to.

mod local;
mod remote;

use tokio::sync::mpsc;

use crate::error::EngineError;

pub use local::{LocalConnector, LocalTransport};
pub use remote::{BatchState, RemoteConnector, RemoteTransport};

/// Something that can drive a UCI engine.
///
/// `send` never blocks and never fails; delivery problems surface as
/// [`TransportOutput::Failed`] on the sink. `terminate` is idempotent.
pub trait Transport: Send {
    fn send(&mut self, command: &str);

    fn terminate(&mut self);

    /// What a [`TransportOutput::Failed`] from this transport takes down.
    fn failure_scope(&self) -> FailureScope {
        FailureScope::Transport
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureScope {
    /// The engine behind the transport is gone; every search on it is dead.
    Transport,
    /// Only the search the failure is tagged with ended.
    Search,
}

/// Creates transports on demand. The session calls this whenever it needs a
/// fresh engine.
pub trait Connector: Send + Sync {
    fn connect(&self, sink: OutputSink) -> Result<Box<dyn Transport>, EngineError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportOutput {
    Line(String),
    /// The output stream for this search closed normally.
    Ended,
    /// The engine could not be started or died. Also closes the stream.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
    /// Generation of the transport that produced this event.
    pub transport: u64,
    /// 1-based ordinal of the `go` command this output belongs to.
    pub search: u64,
    pub output: TransportOutput,
}

/// Where a transport delivers its output.
#[derive(Debug, Clone)]
pub struct OutputSink {
    transport: u64,
    tx: mpsc::UnboundedSender<TransportEvent>,
}

impl OutputSink {
    pub fn new(transport: u64, tx: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self { transport, tx }
    }

    /// A sink plus the receiving end, for callers that drive a transport
    /// directly.
    pub fn channel(transport: u64) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(transport, tx), rx)
    }

    pub fn transport(&self) -> u64 {
        self.transport
    }

    /// Returns `false` once nobody is listening.
    pub fn line(&self, search: u64, line: impl Into<String>) -> bool {
        self.emit(search, TransportOutput::Line(line.into()))
    }

    pub fn ended(&self, search: u64) -> bool {
        self.emit(search, TransportOutput::Ended)
    }

    pub fn failed(&self, search: u64, reason: impl Into<String>) -> bool {
        self.emit(search, TransportOutput::Failed(reason.into()))
    }

    fn emit(&self, search: u64, output: TransportOutput) -> bool {
        self.tx
            .send(TransportEvent {
                transport: self.transport,
                search,
                output,
            })
            .is_ok()
    }
}

/// First word of a UCI command.
fn command_keyword(command: &str) -> &str {
    command.split_whitespace().next().unwrap_or("")
}
