//! The handle a running flow uses to talk to counterparties
//!
//! A flow suspends only inside [`FlowContext::receive`] (and
//! [`FlowContext::send_and_receive`]); sends are enqueued and return at once.
//! Checkpoints are written at every session operation, after every recorded
//! effect and at sub-flow boundaries. While a restored flow is catching up,
//! checkpoints are not written, already-performed sends are checked against
//! their recorded digests and suppressed, and receives and recorded effects
//! are served from the checkpoint.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tessera_core::{Party, SecureHash};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::checkpoint::{Checkpoint, RecordedEffect, SessionCheckpoint, SuspensionPoint};
use crate::error::FlowError;
use crate::logic::FlowLogic;
use crate::router::{RouteKey, SessionEvent};
use crate::runtime::RuntimeCore;
use crate::services::ServiceHub;
use crate::session::{
    FlowId, FlowSession, SessionEnvelope, SessionId, SessionMessage, SessionRole,
};

struct SessionState {
    id: SessionId,
    counterparty: Party,
    role: SessionRole,
    protocol: String,
    init_sent: bool,
    sent: Vec<SecureHash>,
    received: Vec<Vec<u8>>,
    inbox: mpsc::UnboundedReceiver<SessionEvent>,
    closed: bool,
    /// Digests of sends already performed before a restore
    skip_sends: VecDeque<SecureHash>,
    /// Payloads consumed before a restore
    replay: VecDeque<Vec<u8>>,
}

impl SessionState {
    fn route(&self) -> RouteKey {
        RouteKey {
            peer: self.counterparty.name.clone(),
            session: self.id,
            role: self.role,
        }
    }

    fn handle(&self) -> FlowSession {
        FlowSession {
            id: self.id,
            counterparty: self.counterparty.clone(),
        }
    }

    fn replaying(&self) -> bool {
        !self.skip_sends.is_empty() || !self.replay.is_empty()
    }

    fn to_checkpoint(&self) -> SessionCheckpoint {
        SessionCheckpoint {
            session_id: self.id,
            counterparty: self.counterparty.clone(),
            role: self.role,
            protocol: self.protocol.clone(),
            init_sent: self.init_sent,
            sent: self.sent.clone(),
            received: self.received.clone(),
        }
    }
}

/// Execution context of one flow instance
pub struct FlowContext {
    flow_id: FlowId,
    flow_name: String,
    initial_state: Vec<u8>,
    services: ServiceHub,
    core: Arc<RuntimeCore>,
    sessions: Vec<SessionState>,
    /// Initiating protocol names, innermost last
    protocols: Vec<&'static str>,
    /// Initiator sessions recorded before a restore, reused in order
    replay_initiations: VecDeque<SessionId>,
    effects: Vec<RecordedEffect>,
    /// Effect results recorded before a restore
    replay_effects: VecDeque<RecordedEffect>,
    suspension: SuspensionPoint,
    progress: Option<String>,
}

impl FlowContext {
    pub(crate) fn new(
        flow_id: FlowId,
        flow_name: &str,
        initial_state: Vec<u8>,
        services: ServiceHub,
        core: Arc<RuntimeCore>,
        protocol: Option<&'static str>,
    ) -> Self {
        Self {
            flow_id,
            flow_name: flow_name.to_string(),
            initial_state,
            services,
            core,
            sessions: Vec::new(),
            protocols: protocol.into_iter().collect(),
            replay_initiations: VecDeque::new(),
            effects: Vec::new(),
            replay_effects: VecDeque::new(),
            suspension: SuspensionPoint::Started,
            progress: None,
        }
    }

    /// Context for a responder started by an incoming session
    pub(crate) fn for_responder(
        flow_id: FlowId,
        flow_name: &str,
        services: ServiceHub,
        core: Arc<RuntimeCore>,
        session: &FlowSession,
        protocol: &str,
        inbox: mpsc::UnboundedReceiver<SessionEvent>,
    ) -> Result<Self, FlowError> {
        let initial_state = bincode::serialize(session)?;
        let mut ctx = Self::new(flow_id, flow_name, initial_state, services, core, None);
        ctx.sessions.push(SessionState {
            id: session.id,
            counterparty: session.counterparty.clone(),
            role: SessionRole::Responder,
            protocol: protocol.to_string(),
            init_sent: true,
            sent: Vec::new(),
            received: Vec::new(),
            inbox,
            closed: false,
            skip_sends: VecDeque::new(),
            replay: VecDeque::new(),
        });
        Ok(ctx)
    }

    /// Context that replays `checkpoint` before going live
    pub(crate) fn restore(
        checkpoint: &Checkpoint,
        services: ServiceHub,
        core: Arc<RuntimeCore>,
        protocol: Option<&'static str>,
    ) -> Self {
        let mut ctx = Self::new(
            checkpoint.flow_id,
            &checkpoint.flow_name,
            checkpoint.initial_state.clone(),
            services,
            core,
            protocol,
        );
        for record in &checkpoint.sessions {
            let inbox = ctx.core.router.open(record.route());
            if record.role == SessionRole::Initiator {
                ctx.replay_initiations.push_back(record.session_id);
            }
            ctx.sessions.push(SessionState {
                id: record.session_id,
                counterparty: record.counterparty.clone(),
                role: record.role,
                protocol: record.protocol.clone(),
                init_sent: record.init_sent,
                sent: Vec::new(),
                received: Vec::new(),
                inbox,
                closed: false,
                skip_sends: record.sent.iter().copied().collect(),
                replay: record.received.iter().cloned().collect(),
            });
        }
        ctx.replay_effects = checkpoint.effects.iter().cloned().collect();
        ctx.progress = checkpoint.progress.clone();
        ctx.suspension = checkpoint.suspension.clone();
        info!(
            flow_id = %ctx.flow_id,
            flow = %ctx.flow_name,
            sessions = ctx.sessions.len(),
            effects = ctx.replay_effects.len(),
            "Restoring flow from checkpoint"
        );
        ctx
    }

    /// This flow's id
    pub fn flow_id(&self) -> FlowId {
        self.flow_id
    }

    /// The node's legal identity
    pub fn our_identity(&self) -> &Party {
        self.services.my_identity()
    }

    /// Node services
    pub fn services(&self) -> &ServiceHub {
        &self.services
    }

    /// Receive timeout configured for the node
    pub fn default_receive_timeout(&self) -> Duration {
        self.core.config.default_receive_timeout()
    }

    /// Whether a restored flow is still catching up with its checkpoint
    pub fn is_replaying(&self) -> bool {
        !self.replay_initiations.is_empty()
            || !self.replay_effects.is_empty()
            || self.sessions.iter().any(SessionState::replaying)
    }

    /// Record the current progress step
    pub fn progress(&mut self, step: &str) {
        debug!(flow_id = %self.flow_id, flow = %self.flow_name, step, "Progress");
        self.progress = Some(step.to_string());
    }

    /// Last recorded progress step
    pub fn current_progress(&self) -> Option<&str> {
        self.progress.as_deref()
    }

    /// Run a local effect once, replaying its result after a restore
    ///
    /// Wrap every call whose result the flow depends on and that would not
    /// give the same answer when run again, such as minting a key or reading
    /// the clock. The result is written to the checkpoint; a restored flow gets
    /// it back without `effect` being polled. Effects must be recorded in the
    /// same order on every run. An effect that completed but was not yet
    /// checkpointed when the node stopped runs again.
    pub async fn record<T, E, Fut>(&mut self, name: &str, effect: Fut) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned + Send,
        E: From<FlowError>,
        Fut: Future<Output = Result<T, E>> + Send,
    {
        if let Some(recorded) = self.replay_effects.pop_front() {
            if recorded.name != name {
                return Err(FlowError::checkpoint(format!(
                    "restored flow recorded effect {} where it now runs {name}",
                    recorded.name
                ))
                .into());
            }
            let value = bincode::deserialize(&recorded.value).map_err(FlowError::from)?;
            trace!(flow_id = %self.flow_id, effect = name, "Replaying recorded effect");
            self.effects.push(recorded);
            return Ok(value);
        }

        let value = effect.await?;
        self.effects.push(RecordedEffect {
            name: name.to_string(),
            value: bincode::serialize(&value).map_err(FlowError::from)?,
        });
        self.suspension = SuspensionPoint::Effect {
            name: name.to_string(),
        };
        self.checkpoint()?;
        Ok(value)
    }

    /// Open a session with `counterparty`
    ///
    /// Does not suspend. The counterparty learns of the session with the
    /// first send or receive on it.
    pub fn initiate(&mut self, counterparty: &Party) -> Result<FlowSession, FlowError> {
        let protocol = *self.protocols.last().ok_or_else(|| FlowError::NotInitiating {
            flow: self.flow_name.clone(),
        })?;

        if let Some(id) = self.replay_initiations.pop_front() {
            let state = self.session(id)?;
            if state.counterparty != *counterparty {
                return Err(FlowError::checkpoint(format!(
                    "restored {id} was with {} but flow now initiates with {}",
                    state.counterparty, counterparty
                )));
            }
            return Ok(state.handle());
        }

        let id = SessionId::new();
        let key = RouteKey {
            peer: counterparty.name.clone(),
            session: id,
            role: SessionRole::Initiator,
        };
        let inbox = self.core.router.open(key);
        self.sessions.push(SessionState {
            id,
            counterparty: counterparty.clone(),
            role: SessionRole::Initiator,
            protocol: protocol.to_string(),
            init_sent: false,
            sent: Vec::new(),
            received: Vec::new(),
            inbox,
            closed: false,
            skip_sends: VecDeque::new(),
            replay: VecDeque::new(),
        });
        debug!(
            flow_id = %self.flow_id,
            session = %id,
            counterparty = %counterparty,
            protocol,
            "Session opened"
        );
        Ok(FlowSession {
            id,
            counterparty: counterparty.clone(),
        })
    }

    /// Enqueue `message` on `session`
    pub async fn send<T>(&mut self, session: &FlowSession, message: &T) -> Result<(), FlowError>
    where
        T: Serialize + Sync + ?Sized,
    {
        let bytes = bincode::serialize(message)?;
        self.send_bytes(session.id, bytes).await
    }

    /// Wait for the next message on `session`
    ///
    /// Fails with the counterparty's declared reason if its flow failed, and
    /// with [`FlowError::Timeout`] if nothing arrives within `timeout`, in
    /// which case the session is closed.
    pub async fn receive<T>(&mut self, session: &FlowSession, timeout: Duration) -> Result<T, FlowError>
    where
        T: DeserializeOwned,
    {
        let bytes = self.receive_bytes(session.id, timeout).await?;
        bincode::deserialize(&bytes).map_err(|e| FlowError::UnexpectedMessage {
            session: session.id,
            reason: e.to_string(),
        })
    }

    /// Send then receive, as one suspension
    pub async fn send_and_receive<R, T>(
        &mut self,
        session: &FlowSession,
        message: &T,
        timeout: Duration,
    ) -> Result<R, FlowError>
    where
        R: DeserializeOwned,
        T: Serialize + Sync + ?Sized,
    {
        self.send(session, message).await?;
        self.receive(session, timeout).await
    }

    /// Run `flow` to completion inside this flow
    ///
    /// The child shares this flow's checkpoint and sessions. Its failure is
    /// returned to the caller, which propagates it unless it handles it.
    pub async fn sub_flow<F: FlowLogic>(&mut self, mut flow: F) -> Result<F::Output, F::Error> {
        if let Some(protocol) = F::INITIATING {
            self.protocols.push(protocol);
        }
        self.suspension = SuspensionPoint::SubFlowEntry {
            name: F::NAME.to_string(),
        };
        self.checkpoint()?;
        debug!(flow_id = %self.flow_id, sub_flow = F::NAME, "Entering sub-flow");

        let result = flow.call(self).await;

        if F::INITIATING.is_some() {
            self.protocols.pop();
        }
        debug!(flow_id = %self.flow_id, sub_flow = F::NAME, ok = result.is_ok(), "Leaving sub-flow");
        if result.is_ok() {
            self.suspension = SuspensionPoint::SubFlowExit {
                name: F::NAME.to_string(),
            };
            self.checkpoint()?;
        }
        result
    }

    fn session(&self, id: SessionId) -> Result<&SessionState, FlowError> {
        self.sessions
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| FlowError::checkpoint(format!("{id} is not a session of this flow")))
    }

    fn session_mut(&mut self, id: SessionId) -> Result<&mut SessionState, FlowError> {
        self.sessions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| FlowError::checkpoint(format!("{id} is not a session of this flow")))
    }

    async fn send_bytes(&mut self, id: SessionId, bytes: Vec<u8>) -> Result<(), FlowError> {
        let me = self.our_identity().clone();
        let state = self.session_mut(id)?;
        if state.closed {
            return Err(FlowError::SessionEnded { session: id });
        }
        let digest = SecureHash::of(&bytes);
        if let Some(performed) = state.skip_sends.pop_front() {
            if performed != digest {
                return Err(FlowError::checkpoint(format!(
                    "restored flow sent a different payload on {id} than before the restart"
                )));
            }
            state.sent.push(digest);
            trace!(session = %id, "Suppressing send already performed before restore");
            return Ok(());
        }

        let body = if state.role == SessionRole::Initiator && !state.init_sent {
            state.init_sent = true;
            SessionMessage::Init {
                protocol: state.protocol.clone(),
                initiator: me,
                payload: Some(bytes),
            }
        } else {
            SessionMessage::Data(bytes)
        };
        state.sent.push(digest);
        let to = state.counterparty.name.clone();
        let envelope = SessionEnvelope {
            session_id: id,
            sender_role: state.role,
            body,
        };

        self.core.messaging.send(&to, envelope).await?;
        self.suspension = SuspensionPoint::Send { session: id };
        self.checkpoint()
    }

    async fn receive_bytes(&mut self, id: SessionId, timeout: Duration) -> Result<Vec<u8>, FlowError> {
        let flow_id = self.flow_id;
        let me = self.our_identity().clone();
        let state = self.session_mut(id)?;
        if let Some(bytes) = state.replay.pop_front() {
            state.received.push(bytes.clone());
            trace!(session = %id, "Replaying payload consumed before restore");
            return Ok(bytes);
        }
        if state.closed {
            return Err(FlowError::SessionEnded { session: id });
        }

        // A session opened by a receive still has to announce itself.
        let opening = if state.role == SessionRole::Initiator && !state.init_sent {
            state.init_sent = true;
            Some((
                state.counterparty.name.clone(),
                SessionEnvelope {
                    session_id: id,
                    sender_role: state.role,
                    body: SessionMessage::Init {
                        protocol: state.protocol.clone(),
                        initiator: me,
                        payload: None,
                    },
                },
            ))
        } else {
            None
        };
        if let Some((to, envelope)) = opening {
            self.core.messaging.send(&to, envelope).await?;
        }

        self.suspension = SuspensionPoint::Receive { session: id };
        self.checkpoint()?;
        debug!(flow_id = %flow_id, session = %id, "Suspended on receive");

        let state = self.session_mut(id)?;
        let counterparty = state.counterparty.name.clone();
        match tokio::time::timeout(timeout, state.inbox.recv()).await {
            Ok(Some(SessionEvent::Data(bytes))) => {
                state.received.push(bytes.clone());
                debug!(flow_id = %flow_id, session = %id, "Resumed with message");
                self.checkpoint()?;
                Ok(bytes)
            }
            Ok(Some(SessionEvent::Error(reason))) => {
                self.close_session(id, None).await;
                warn!(flow_id = %flow_id, session = %id, reason = %reason, "Counterparty failed");
                Err(FlowError::CounterpartyError {
                    counterparty,
                    reason,
                })
            }
            Ok(Some(SessionEvent::Rejected(protocol))) => {
                self.close_session(id, None).await;
                warn!(flow_id = %flow_id, session = %id, protocol = %protocol, "Session rejected");
                Err(FlowError::NoResponder { protocol })
            }
            Ok(Some(SessionEvent::End)) | Ok(None) => {
                self.close_session(id, None).await;
                Err(FlowError::SessionEnded { session: id })
            }
            Err(_) => {
                let after_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(flow_id = %flow_id, session = %id, after_ms, "Receive timed out");
                self.close_session(id, Some("Session timed out".to_string()))
                    .await;
                Err(FlowError::Timeout {
                    session: id,
                    counterparty,
                    after_ms,
                })
            }
        }
    }

    /// Mark a session closed, optionally telling the counterparty why
    async fn close_session(&mut self, id: SessionId, notify: Option<String>) {
        let Ok(state) = self.session_mut(id) else {
            return;
        };
        if state.closed {
            return;
        }
        state.closed = true;
        let key = state.route();
        let role = state.role;
        let announce = role == SessionRole::Responder || state.init_sent;
        self.core.router.close(&key);
        if let (true, Some(reason)) = (announce, notify) {
            let envelope = SessionEnvelope {
                session_id: id,
                sender_role: role,
                body: SessionMessage::Error { reason },
            };
            if let Err(err) = self.core.messaging.send(&key.peer, envelope).await {
                warn!(session = %id, error = %err, "Could not notify counterparty");
            }
        }
        debug!(flow_id = %self.flow_id, session = %id, "Session closed");
    }

    /// Write the initial checkpoint
    pub(crate) fn begin(&mut self) -> Result<(), FlowError> {
        self.checkpoint()
    }

    /// End every open session and drop the checkpoint
    ///
    /// `failure` is the reason to report, or `None` on success.
    pub(crate) async fn finish(&mut self, failure: Option<String>) {
        let open: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|s| !s.closed)
            .map(|s| s.id)
            .collect();
        for id in open {
            let Ok(state) = self.session_mut(id) else {
                continue;
            };
            state.closed = true;
            let key = state.route();
            let announce = state.role == SessionRole::Responder || state.init_sent;
            let envelope = SessionEnvelope {
                session_id: id,
                sender_role: state.role,
                body: match &failure {
                    Some(reason) => SessionMessage::Error {
                        reason: reason.clone(),
                    },
                    None => SessionMessage::End,
                },
            };
            self.core.router.close(&key);
            if announce {
                if let Err(err) = self.core.messaging.send(&key.peer, envelope).await {
                    warn!(session = %id, error = %err, "Could not end session");
                }
            }
        }
        self.core.checkpoints.remove(&self.flow_id);
    }

    fn checkpoint(&mut self) -> Result<(), FlowError> {
        if !self.core.config.checkpointing || self.is_replaying() {
            return Ok(());
        }
        let checkpoint = Checkpoint {
            flow_id: self.flow_id,
            flow_name: self.flow_name.clone(),
            initial_state: self.initial_state.clone(),
            sessions: self.sessions.iter().map(SessionState::to_checkpoint).collect(),
            effects: self.effects.clone(),
            suspension: self.suspension.clone(),
            progress: self.progress.clone(),
        };
        self.core.checkpoints.save(&checkpoint)?;
        trace!(flow_id = %self.flow_id, suspension = ?self.suspension, "Checkpoint written");
        Ok(())
    }
}
