//! Streaming session manager.
//!
//! At most one prompt streams at a time. The manager owns the single session
//! slot, relays worker messages to the UI event channel and guarantees that
//! every session ends with exactly one `StreamDone`, however the worker goes
//! away.

use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use jarules_core::{BridgeEvent, DoneSummary, FailureKind, SessionId, SessionState};
use jarules_worker_sdk::{
    MessageHandler, SignalError, StreamExit, StreamingWorker, WorkerError, WorkerHandle,
    WorkerMessage,
};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use crate::error::BridgeError;

const NO_DONE_NOTE: &str = "Worker exited without sending a done message";

/// Snapshot of the session slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    pub state: SessionState,
}

impl SessionSnapshot {
    fn idle() -> Self {
        Self {
            session_id: None,
            state: SessionState::Idle,
        }
    }
}

struct ActiveSession {
    id: SessionId,
    relay: Arc<SessionRelay>,
    handle: WorkerHandle,
}

type Slot = Arc<Mutex<Option<ActiveSession>>>;

/// Owns the single streaming slot.
pub struct SessionManager {
    worker: StreamingWorker,
    script: String,
    slot: Slot,
    events: mpsc::UnboundedSender<BridgeEvent>,
}

impl SessionManager {
    pub fn new(
        worker: StreamingWorker,
        script: impl Into<String>,
        events: mpsc::UnboundedSender<BridgeEvent>,
    ) -> Self {
        Self {
            worker,
            script: script.into(),
            slot: Arc::new(Mutex::new(None)),
            events,
        }
    }

    /// Start streaming `prompt` through `model_id`.
    ///
    /// Returns as soon as the worker is spawned; everything else arrives as
    /// events. With no model the session fails immediately with an error and
    /// a done event, and nothing is spawned.
    pub async fn start(
        &self,
        prompt: &str,
        model_id: Option<String>,
    ) -> Result<SessionId, BridgeError> {
        let Some(model_id) = model_id else {
            let session_id = SessionId::generate();
            let err = BridgeError::NoActiveModel {
                session_id: session_id.clone(),
            };
            warn!(session_id = %session_id, "Prompt sent without an active model");
            self.emit(BridgeEvent::error(
                session_id.clone(),
                FailureKind::State,
                err.to_string(),
                None,
                false,
            ));
            self.emit(BridgeEvent::done(
                session_id,
                DoneSummary::failed(err.to_string(), false),
            ));
            return Err(err);
        };

        let mut slot = self.slot.lock().await;
        if let Some(active) = slot.as_ref() {
            warn!(session_id = %active.id, "Rejecting prompt while a session is live");
            return Err(BridgeError::SessionBusy(active.id.clone()));
        }

        let session_id = SessionId::generate();
        let relay = Arc::new(SessionRelay::new(
            session_id.clone(),
            Some(model_id.clone()),
            self.events.clone(),
            self.slot.clone(),
        ));

        let args = vec![prompt.to_string(), model_id.clone()];
        let running = match self.worker.spawn(&self.script, &args, relay.clone()) {
            Ok(running) => running,
            Err(e) => {
                relay.spawn_failed(&e);
                return Err(BridgeError::Worker(e));
            }
        };

        info!(
            session_id = %session_id,
            model_id = %model_id,
            pid = ?running.handle().pid(),
            "Session started"
        );

        *slot = Some(ActiveSession {
            id: session_id.clone(),
            relay: relay.clone(),
            handle: running.handle(),
        });
        drop(slot);

        tokio::spawn(async move {
            let exit = running.wait().await;
            relay.finish(exit).await;
        });

        Ok(session_id)
    }

    /// Ask the live worker to stop.
    ///
    /// The worker is expected to answer with a cancelled `error` message; the
    /// session then ends through the usual error path.
    pub async fn cancel(&self) -> Result<SessionId, BridgeError> {
        let slot = self.slot.lock().await;
        let active = slot.as_ref().ok_or(BridgeError::NoActiveSession)?;

        match active.handle.interrupt() {
            Ok(()) => {
                active.relay.mark_cancel_requested();
                info!(session_id = %active.id, "Stop signal sent");
                Ok(active.id.clone())
            }
            Err(SignalError::AlreadyTerminated) => {
                info!(session_id = %active.id, "Worker already terminated");
                Err(BridgeError::AlreadyTerminated(active.id.clone()))
            }
            Err(e) => {
                error!(session_id = %active.id, error = %e, "Failed to signal worker");
                Err(BridgeError::SignalFailed {
                    session_id: active.id.clone(),
                    message: e.to_string(),
                })
            }
        }
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        match self.slot.lock().await.as_ref() {
            Some(active) => SessionSnapshot {
                session_id: Some(active.id.clone()),
                state: active.relay.state(),
            },
            None => SessionSnapshot::idle(),
        }
    }

    /// Interrupt whatever is live. Used at teardown.
    pub async fn shutdown(&self) {
        match self.cancel().await {
            Ok(session_id) => info!(session_id = %session_id, "Interrupted live session at shutdown"),
            Err(BridgeError::NoActiveSession) => {}
            Err(e) => debug!(error = %e, "Nothing to interrupt at shutdown"),
        }
    }

    fn emit(&self, event: BridgeEvent) {
        if self.events.send(event).is_err() {
            debug!("Event receiver dropped");
        }
    }
}

#[derive(Debug)]
struct RelayState {
    state: SessionState,
    done_sent: bool,
    cancel_requested: bool,
    /// Tokens seen so far, for a synthesized done.
    response: String,
}

/// Per-session message relay. Tracks the state machine and owns the
/// exactly-one-done guarantee.
struct SessionRelay {
    session_id: SessionId,
    model_id: Option<String>,
    events: mpsc::UnboundedSender<BridgeEvent>,
    slot: Slot,
    inner: StdMutex<RelayState>,
}

impl SessionRelay {
    fn new(
        session_id: SessionId,
        model_id: Option<String>,
        events: mpsc::UnboundedSender<BridgeEvent>,
        slot: Slot,
    ) -> Self {
        Self {
            session_id,
            model_id,
            events,
            slot,
            inner: StdMutex::new(RelayState {
                state: SessionState::Starting,
                done_sent: false,
                cancel_requested: false,
                response: String::new(),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RelayState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn state(&self) -> SessionState {
        self.lock().state
    }

    fn mark_cancel_requested(&self) {
        self.lock().cancel_requested = true;
    }

    fn spawn_failed(&self, err: &WorkerError) {
        let events = {
            let mut inner = self.lock();
            self.terminal_error(
                &mut inner,
                FailureKind::Transport,
                "Failed to start generation process".to_string(),
                Some(Value::String(err.to_string())),
                false,
            )
        };
        self.emit_all(events);
    }

    /// Translate one worker message into events, under the relay lock.
    fn relay(&self, message: WorkerMessage) -> (Vec<BridgeEvent>, bool) {
        let mut inner = self.lock();
        if inner.done_sent {
            debug!(
                session_id = %self.session_id,
                message_type = message.kind(),
                "Ignoring message after done"
            );
            return (Vec::new(), false);
        }

        match message {
            WorkerMessage::StreamStart { metadata } => {
                if inner.state != SessionState::Starting {
                    warn!(session_id = %self.session_id, "Duplicate stream_start ignored");
                    return (Vec::new(), false);
                }
                self.advance(&mut inner, SessionState::Streaming);
                (
                    vec![BridgeEvent::started(
                        self.session_id.clone(),
                        self.model_id.clone(),
                        Value::Object(metadata),
                    )],
                    false,
                )
            }
            chunk @ WorkerMessage::Chunk { .. } => {
                if inner.state == SessionState::Starting {
                    debug!(session_id = %self.session_id, "Chunk before stream_start");
                    self.advance(&mut inner, SessionState::Streaming);
                }
                if let WorkerMessage::Chunk {
                    token: Some(token), ..
                } = &chunk
                {
                    inner.response.push_str(token);
                }
                let data = serde_json::to_value(&chunk).unwrap_or(Value::Null);
                (vec![BridgeEvent::chunk(self.session_id.clone(), data)], false)
            }
            WorkerMessage::Done { full_response, .. } => {
                self.advance(&mut inner, SessionState::Completed);
                inner.done_sent = true;
                info!(session_id = %self.session_id, "Session completed");
                (
                    vec![BridgeEvent::done(
                        self.session_id.clone(),
                        DoneSummary::completed(full_response),
                    )],
                    true,
                )
            }
            WorkerMessage::Error {
                message,
                details,
                cancelled,
            } => {
                let cancelled = cancelled || inner.cancel_requested;
                let message = message.unwrap_or_else(|| "Worker reported an error".to_string());
                let events = self.terminal_error(
                    &mut inner,
                    FailureKind::Application,
                    message,
                    details,
                    cancelled,
                );
                (events, true)
            }
            WorkerMessage::Unknown(value) => {
                warn!(
                    session_id = %self.session_id,
                    kind = %FailureKind::Protocol,
                    message = %value,
                    "Ignoring unrecognized worker message"
                );
                (Vec::new(), false)
            }
        }
    }

    /// Close the session once the worker process is gone.
    async fn finish(&self, exit: StreamExit) {
        let events = {
            let mut inner = self.lock();
            if inner.done_sent {
                debug!(session_id = %self.session_id, exit = ?exit, "Worker exited after done");
                Vec::new()
            } else if inner.cancel_requested {
                self.terminal_error(
                    &mut inner,
                    FailureKind::Application,
                    "Generation cancelled".to_string(),
                    None,
                    true,
                )
            } else if exit.is_clean() {
                self.advance(&mut inner, SessionState::Completed);
                inner.done_sent = true;
                warn!(session_id = %self.session_id, "{}", NO_DONE_NOTE);
                let response = (!inner.response.is_empty()).then(|| inner.response.clone());
                vec![BridgeEvent::done(
                    self.session_id.clone(),
                    DoneSummary::completed(response).with_note(NO_DONE_NOTE),
                )]
            } else {
                let details = match &exit {
                    StreamExit::Failed { stderr, .. } if !stderr.is_empty() => {
                        Some(Value::String(stderr.clone()))
                    }
                    _ => None,
                };
                self.terminal_error(
                    &mut inner,
                    FailureKind::Transport,
                    exit.describe(),
                    details,
                    false,
                )
            }
        };

        self.release().await;
        self.emit_all(events);
    }

    /// Error followed by the session's one failed done.
    fn terminal_error(
        &self,
        inner: &mut RelayState,
        kind: FailureKind,
        message: String,
        details: Option<Value>,
        cancelled: bool,
    ) -> Vec<BridgeEvent> {
        let next = if cancelled {
            SessionState::Cancelled
        } else {
            SessionState::Failed
        };
        self.advance(inner, next);
        inner.done_sent = true;
        warn!(
            session_id = %self.session_id,
            kind = %kind,
            cancelled = cancelled,
            error = %message,
            "Session ended with error"
        );
        vec![
            BridgeEvent::error(
                self.session_id.clone(),
                kind,
                message.clone(),
                details,
                cancelled,
            ),
            BridgeEvent::done(
                self.session_id.clone(),
                DoneSummary::failed(message, cancelled),
            ),
        ]
    }

    fn advance(&self, inner: &mut RelayState, next: SessionState) {
        match inner.state.transition(next) {
            Ok(state) => {
                debug!(session_id = %self.session_id, from = inner.state.as_str(), to = state.as_str(), "Session transition");
                inner.state = state;
            }
            Err(e) => warn!(session_id = %self.session_id, error = %e, "Unexpected session transition"),
        }
    }

    /// Free the slot if it still holds this session.
    async fn release(&self) {
        let mut slot = self.slot.lock().await;
        if slot.as_ref().map(|active| &active.id) == Some(&self.session_id) {
            *slot = None;
            debug!(session_id = %self.session_id, "Session slot released");
        }
    }

    fn emit_all(&self, events: Vec<BridgeEvent>) {
        for event in events {
            if self.events.send(event).is_err() {
                debug!(session_id = %self.session_id, "Event receiver dropped");
                return;
            }
        }
    }
}

#[async_trait]
impl MessageHandler for SessionRelay {
    async fn on_message(&self, message: WorkerMessage) -> Result<(), WorkerError> {
        let (events, terminal) = self.relay(message);
        if terminal {
            self.release().await;
        }
        self.emit_all(events);
        Ok(())
    }
}
