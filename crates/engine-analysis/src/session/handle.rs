//! Async front end for [`AnalysisSession`].

use std::sync::Arc;

use chess_core::{MoveRules, StandardRules};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use super::{AnalysisSession, SessionEvent, SessionState};
use crate::error::SessionError;
use crate::eval::{EngineOption, RequestId, SessionConfig};
use crate::transport::{Connector, TransportEvent};

/// Buffered session events per subscriber before it starts lagging.
const EVENT_CAPACITY: usize = 256;

enum Command {
    SetOptions(Vec<EngineOption>, oneshot::Sender<()>),
    SetPosition(String, oneshot::Sender<Result<(), SessionError>>),
    Analyze(SessionConfig, oneshot::Sender<Result<RequestId, SessionError>>),
    Stop(oneshot::Sender<Option<RequestId>>),
    State(oneshot::Sender<SessionState>),
    Shutdown,
}

/// Owns an [`AnalysisSession`] on a background task.
///
/// Every method returns once the session has applied the command. In
/// particular, after `stop()` returns no further event for the cancelled
/// request is published.
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<SessionEvent>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    pub fn spawn(connector: Arc<dyn Connector>) -> Self {
        Self::spawn_with_rules(connector, Arc::new(StandardRules))
    }

    pub fn spawn_with_rules(connector: Arc<dyn Connector>, rules: Arc<dyn MoveRules>) -> Self {
        let (commands, command_rx) = mpsc::channel(32);
        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let session = AnalysisSession::new(connector, rules, output_tx, events.clone());
        let task = tokio::spawn(run(session, command_rx, output_rx));

        Self {
            commands,
            events,
            task,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn set_options(&self, options: Vec<EngineOption>) -> Result<(), SessionError> {
        self.call(|tx| Command::SetOptions(options, tx)).await
    }

    pub async fn set_position(&self, fen: impl Into<String>) -> Result<(), SessionError> {
        let fen = fen.into();
        self.call(|tx| Command::SetPosition(fen, tx)).await?
    }

    pub async fn analyze(&self, config: SessionConfig) -> Result<RequestId, SessionError> {
        self.call(|tx| Command::Analyze(config, tx)).await?
    }

    /// Set the position and start searching it.
    pub async fn analyze_position(
        &self,
        fen: impl Into<String>,
        config: SessionConfig,
    ) -> Result<RequestId, SessionError> {
        self.set_position(fen).await?;
        self.analyze(config).await
    }

    pub async fn stop(&self) -> Result<Option<RequestId>, SessionError> {
        self.call(Command::Stop).await
    }

    pub async fn state(&self) -> Result<SessionState, SessionError> {
        self.call(Command::State).await
    }

    /// Stop the background task and terminate the engine.
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown).await;
        let _ = self.task.await;
    }

    async fn call<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }
}

async fn run(
    mut session: AnalysisSession,
    mut commands: mpsc::Receiver<Command>,
    mut output: mpsc::UnboundedReceiver<TransportEvent>,
) {
    loop {
        tokio::select! {
            // Commands first, so a stop is applied before any queued output.
            biased;

            command = commands.recv() => match command {
                Some(Command::Shutdown) | None => break,
                Some(command) => apply(&mut session, command),
            },
            Some(event) = output.recv() => session.handle_output(event),
        }
    }

    session.shutdown();
    debug!("analysis session closed");
}

fn apply(session: &mut AnalysisSession, command: Command) {
    match command {
        Command::SetOptions(options, tx) => {
            session.set_options(options);
            let _ = tx.send(());
        }
        Command::SetPosition(fen, tx) => {
            let _ = tx.send(session.set_position(&fen));
        }
        Command::Analyze(config, tx) => {
            let _ = tx.send(session.analyze(config));
        }
        Command::Stop(tx) => {
            let _ = tx.send(session.stop());
        }
        Command::State(tx) => {
            let _ = tx.send(session.state());
        }
        Command::Shutdown => {}
    }
}
