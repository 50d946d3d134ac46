//! Analysis session: sequences engine commands for one view and turns engine
//! output into ranked snapshots.
//!
//! [`AnalysisSession`] is a synchronous state machine. [`SessionHandle`] runs
//! it on a tokio task and is what callers normally use.

mod handle;

use std::collections::BTreeMap;
use std::sync::Arc;

use chess_core::MoveRules;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, trace, warn};

use crate::error::{EngineError, SessionError};
use crate::eval::{
    AnalysisRequest, AnalysisSnapshot, EngineOption, RequestId, SessionConfig, VariationLine,
};
use crate::transport::{
    Connector, FailureScope, OutputSink, Transport, TransportEvent, TransportOutput,
};
use crate::uci::{self, EngineLine};

pub use handle::SessionHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Idle,
    Configuring,
    PositionSet,
    Searching,
    Stopped,
    Completed,
}

/// Everything a session publishes. Every event names the request it belongs
/// to; subscribers drop events for requests they no longer care about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Full ranked list after an update.
    Snapshot(AnalysisSnapshot),
    Completed {
        request: RequestId,
        best_move: Option<String>,
    },
    /// The request was stopped or superseded. Its lines are void.
    Cancelled { request: RequestId },
    Failed {
        request: RequestId,
        message: String,
    },
    /// `info string` text from the engine.
    Message { request: RequestId, text: String },
}

impl SessionEvent {
    pub fn request(&self) -> RequestId {
        match self {
            Self::Snapshot(snapshot) => snapshot.request,
            Self::Completed { request, .. }
            | Self::Cancelled { request }
            | Self::Failed { request, .. }
            | Self::Message { request, .. } => *request,
        }
    }
}

pub struct AnalysisSession {
    connector: Arc<dyn Connector>,
    rules: Arc<dyn MoveRules>,
    output: mpsc::UnboundedSender<TransportEvent>,
    events: broadcast::Sender<SessionEvent>,

    transport: Option<Box<dyn Transport>>,
    transport_generation: u64,
    searches_sent: u64,

    state: SessionState,
    options: Vec<EngineOption>,
    options_unsent: bool,
    position: Option<String>,

    last_request: RequestId,
    request: Option<AnalysisRequest>,
    /// Search ordinal whose output is currently accepted.
    active_search: Option<u64>,
    lines: BTreeMap<u32, VariationLine>,
}

impl AnalysisSession {
    /// `output` must be the sending half of the channel the caller feeds back
    /// into [`AnalysisSession::handle_output`].
    pub fn new(
        connector: Arc<dyn Connector>,
        rules: Arc<dyn MoveRules>,
        output: mpsc::UnboundedSender<TransportEvent>,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            connector,
            rules,
            output,
            events,
            transport: None,
            transport_generation: 0,
            searches_sent: 0,
            state: SessionState::Idle,
            options: Vec::new(),
            options_unsent: false,
            position: None,
            last_request: RequestId::default(),
            request: None,
            active_search: None,
            lines: BTreeMap::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn position(&self) -> Option<&str> {
        self.position.as_deref()
    }

    /// The request currently being searched, if any.
    pub fn current_request(&self) -> Option<&AnalysisRequest> {
        self.request.as_ref().filter(|_| self.active_search.is_some())
    }

    /// Add or replace engine options. Applied to the live engine when it is
    /// idle, otherwise with the next request; always replayed on a new
    /// transport.
    pub fn set_options(&mut self, options: Vec<EngineOption>) {
        for option in options {
            match self
                .options
                .iter_mut()
                .find(|o| o.name.eq_ignore_ascii_case(&option.name))
            {
                Some(existing) => *existing = option,
                None => self.options.push(option),
            }
        }
        self.options_unsent = true;

        if self.state == SessionState::Idle {
            self.state = SessionState::Configuring;
        }
        if self.state != SessionState::Searching {
            self.flush_options();
        }
    }

    /// Replace the position. An in-flight search for the old position is
    /// cancelled.
    pub fn set_position(&mut self, fen: &str) -> Result<(), SessionError> {
        self.rules.validate(fen)?;
        if self.state == SessionState::Searching {
            self.cancel_search();
        }
        self.position = Some(fen.trim().to_string());
        self.state = SessionState::PositionSet;
        Ok(())
    }

    /// Start searching the current position. Supersedes any running request.
    pub fn analyze(&mut self, config: SessionConfig) -> Result<RequestId, SessionError> {
        config.validate()?;
        let position = self.position.clone().ok_or(SessionError::NoPosition)?;

        if self.state == SessionState::Searching {
            self.cancel_search();
        }

        let id = self.last_request.next();
        self.last_request = id;
        self.lines.clear();
        self.active_search = None;

        if let Err(e) = self.ensure_transport() {
            warn!(request = %id, "Engine unavailable: {e}");
            self.state = SessionState::Stopped;
            self.publish(SessionEvent::Failed {
                request: id,
                message: e.to_string(),
            });
            return Err(e.into());
        }

        self.flush_options();
        self.send(&EngineOption::new("MultiPV", config.variation_count).to_command());
        for option in &config.extra_options {
            self.send(&option.to_command());
        }
        self.send(&format!("position fen {position}"));
        self.send(&format!("go depth {}", config.search_depth));

        self.searches_sent += 1;
        self.active_search = Some(self.searches_sent);
        self.state = SessionState::Searching;

        debug!(
            request = %id,
            depth = config.search_depth,
            multipv = config.variation_count,
            "analysis started"
        );
        self.request = Some(AnalysisRequest {
            id,
            position,
            config,
        });
        Ok(id)
    }

    /// Cancel the running search. Returns the cancelled request.
    pub fn stop(&mut self) -> Option<RequestId> {
        if self.state != SessionState::Searching {
            return None;
        }
        self.cancel_search()
    }

    /// Feed one transport event back in.
    pub fn handle_output(&mut self, event: TransportEvent) {
        if event.transport != self.transport_generation {
            trace!(transport = event.transport, "dropping output from retired transport");
            return;
        }

        match event.output {
            TransportOutput::Line(line) => self.handle_line(event.search, &line),
            TransportOutput::Ended => {
                if self.is_live(event.search) {
                    self.complete(None);
                }
            }
            TransportOutput::Failed(reason) => {
                let scope = self
                    .transport
                    .as_ref()
                    .map_or(FailureScope::Transport, |t| t.failure_scope());
                if scope == FailureScope::Search && !self.is_live(event.search) {
                    debug!(search = event.search, "stale search failed: {reason}");
                    return;
                }

                // A dead transport takes the running search with it, whatever
                // search the failure was attributed to.
                self.retire_transport();
                if self.active_search.is_some() {
                    let request = self.live_request_id();
                    warn!(request = %request, "Engine failed: {reason}");
                    self.active_search = None;
                    self.state = SessionState::Stopped;
                    self.publish(SessionEvent::Failed {
                        request,
                        message: reason,
                    });
                } else {
                    debug!("idle engine went away: {reason}");
                }
            }
        }
    }

    /// Terminate the engine. The session stays usable; the next request
    /// starts a new transport.
    pub fn shutdown(&mut self) {
        if self.state == SessionState::Searching {
            self.cancel_search();
        }
        self.retire_transport();
    }

    fn handle_line(&mut self, search: u64, line: &str) {
        let parsed = uci::classify(line);
        match &parsed {
            EngineLine::IdName(name) => info!(engine = %name, "engine identified"),
            EngineLine::UciOk | EngineLine::ReadyOk => debug!(line, "engine handshake"),
            _ => {}
        }

        if !self.is_live(search) {
            trace!(search, line, "dropping stale engine output");
            return;
        }

        match parsed {
            EngineLine::Search(update) => {
                let Some(request) = &self.request else {
                    return;
                };
                if update.slot > request.config.variation_count {
                    trace!(slot = update.slot, "dropping line outside requested slots");
                    return;
                }
                if let Some(line) = VariationLine::from_update(update) {
                    self.lines.insert(line.slot, line);
                    let snapshot = self.snapshot();
                    self.publish(SessionEvent::Snapshot(snapshot));
                }
            }
            EngineLine::BestMove(best) => self.complete(best.best),
            EngineLine::Info(text) => {
                let request = self.live_request_id();
                self.publish(SessionEvent::Message { request, text });
            }
            _ => {}
        }
    }

    fn snapshot(&self) -> AnalysisSnapshot {
        AnalysisSnapshot {
            request: self.live_request_id(),
            lines: self.lines.values().cloned().collect(),
        }
    }

    fn is_live(&self, search: u64) -> bool {
        self.state == SessionState::Searching && self.active_search == Some(search)
    }

    fn live_request_id(&self) -> RequestId {
        self.request.as_ref().map(|r| r.id).unwrap_or_default()
    }

    fn complete(&mut self, best_move: Option<String>) {
        let request = self.live_request_id();
        debug!(request = %request, best_move = ?best_move, "analysis complete");
        self.active_search = None;
        self.state = SessionState::Completed;
        self.publish(SessionEvent::Completed { request, best_move });
    }

    fn cancel_search(&mut self) -> Option<RequestId> {
        let request = self.request.as_ref()?.id;
        self.send("stop");
        self.active_search = None;
        self.lines.clear();
        self.state = SessionState::Stopped;
        debug!(request = %request, "analysis cancelled");
        self.publish(SessionEvent::Cancelled { request });
        Some(request)
    }

    fn ensure_transport(&mut self) -> Result<(), EngineError> {
        if self.transport.is_some() {
            return Ok(());
        }

        let generation = self.transport_generation + 1;
        let sink = OutputSink::new(generation, self.output.clone());
        let mut transport = self.connector.connect(sink)?;

        transport.send("uci");
        for option in &self.options {
            transport.send(&option.to_command());
        }
        transport.send("isready");

        info!(generation, "engine transport started");
        self.transport_generation = generation;
        self.searches_sent = 0;
        self.options_unsent = false;
        self.transport = Some(transport);
        Ok(())
    }

    fn flush_options(&mut self) {
        if !self.options_unsent {
            return;
        }
        if let Some(transport) = self.transport.as_mut() {
            for option in &self.options {
                transport.send(&option.to_command());
            }
            self.options_unsent = false;
        }
    }

    fn retire_transport(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.terminate();
            // Anything still in flight from it is now stale.
            self.transport_generation += 1;
        }
    }

    fn send(&mut self, command: &str) {
        if let Some(transport) = self.transport.as_mut() {
            transport.send(command);
        }
    }

    fn publish(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

impl Drop for AnalysisSession {
    fn drop(&mut self) {
        self.retire_transport();
    }
}
