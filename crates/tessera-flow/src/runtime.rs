//! The flow runtime
//!
//! Each flow runs as its own tokio task and is therefore never resumed
//! concurrently with itself. A dispatcher task reads the node's inbound
//! messages, starts responders for `Init` messages and routes everything else
//! to the inbox of the session it belongs to.

use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use tessera_core::{Party, PartyName};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::checkpoint::{Checkpoint, CheckpointStorage, SessionCheckpoint};
use crate::config::FlowRuntimeConfig;
use crate::context::FlowContext;
use crate::error::{FlowError, FlowFailure, GENERIC_FAILURE_REASON};
use crate::logic::FlowLogic;
use crate::router::{RouteKey, Router, SessionEvent};
use crate::services::ServiceHub;
use crate::session::{FlowId, FlowSession, SessionEnvelope, SessionMessage, SessionRole};
use crate::transport::{InboundReceiver, MessagingService};

/// State shared between the runtime and every flow context
pub(crate) struct RuntimeCore {
    pub(crate) messaging: Arc<dyn MessagingService>,
    pub(crate) router: Router,
    pub(crate) checkpoints: Arc<dyn CheckpointStorage>,
    pub(crate) config: FlowRuntimeConfig,
}

type Erased = Box<dyn Any + Send>;
type ErasedOutcome = Result<Erased, Erased>;

type ResponderStarter = Arc<
    dyn Fn(
            &FlowRuntime,
            FlowSession,
            &str,
            mpsc::UnboundedReceiver<SessionEvent>,
        ) -> Result<FlowId, FlowError>
        + Send
        + Sync,
>;

type Restorer = Arc<
    dyn Fn(&FlowRuntime, &Checkpoint) -> Result<oneshot::Receiver<ErasedOutcome>, FlowError>
        + Send
        + Sync,
>;

struct RuntimeInner {
    core: Arc<RuntimeCore>,
    services: ServiceHub,
    responders: RwLock<HashMap<String, ResponderStarter>>,
    restorers: RwLock<HashMap<String, Restorer>>,
    tasks: Mutex<HashMap<FlowId, JoinHandle<()>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

/// Hosts the flows of one node
#[derive(Clone)]
pub struct FlowRuntime {
    inner: Arc<RuntimeInner>,
}

impl fmt::Debug for FlowRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowRuntime")
            .field("node", self.inner.services.my_identity())
            .field("flows", &self.inner.tasks.lock().len())
            .finish()
    }
}

/// Handle on a started flow
pub struct FlowHandle<F: FlowLogic> {
    flow_id: FlowId,
    result: oneshot::Receiver<Result<F::Output, F::Error>>,
}

impl<F: FlowLogic> FlowHandle<F> {
    /// Id of the flow
    pub fn flow_id(&self) -> FlowId {
        self.flow_id
    }

    /// Wait for the flow to finish
    ///
    /// Fails with [`FlowError::Cancelled`] if the runtime shut down first.
    pub async fn result(self) -> Result<F::Output, F::Error> {
        self.result
            .await
            .unwrap_or_else(|_| Err(F::Error::from(FlowError::Cancelled)))
    }
}

/// A flow resumed from a checkpoint
pub struct RestoredFlow {
    /// Id the flow had before the restart
    pub flow_id: FlowId,
    /// Registered flow name
    pub flow_name: String,
    result: oneshot::Receiver<ErasedOutcome>,
}

impl fmt::Debug for RestoredFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestoredFlow")
            .field("flow_id", &self.flow_id)
            .field("flow_name", &self.flow_name)
            .finish_non_exhaustive()
    }
}

impl RestoredFlow {
    /// Wait for the flow to finish, reading its result as flow type `F`
    pub async fn result<F: FlowLogic>(self) -> Result<F::Output, F::Error> {
        let wrong_type = || {
            F::Error::from(FlowError::checkpoint(format!(
                "restored flow {} is not a {}",
                self.flow_name,
                F::NAME
            )))
        };
        match self.result.await {
            Err(_) => Err(F::Error::from(FlowError::Cancelled)),
            Ok(Ok(output)) => output
                .downcast::<F::Output>()
                .map(|o| *o)
                .map_err(|_| wrong_type()),
            Ok(Err(error)) => Err(error
                .downcast::<F::Error>()
                .map(|e| *e)
                .unwrap_or_else(|_| wrong_type())),
        }
    }
}

fn erase<F: FlowLogic>(result: Result<F::Output, F::Error>) -> ErasedOutcome {
    match result {
        Ok(output) => Ok(Box::new(output)),
        Err(error) => Err(Box::new(error)),
    }
}

impl FlowRuntime {
    /// Create a runtime; call [`FlowRuntime::run`] to start receiving
    pub fn new(
        services: ServiceHub,
        messaging: Arc<dyn MessagingService>,
        checkpoints: Arc<dyn CheckpointStorage>,
        config: FlowRuntimeConfig,
    ) -> Self {
        let core = Arc::new(RuntimeCore {
            messaging,
            router: Router::default(),
            checkpoints,
            config,
        });
        Self {
            inner: Arc::new(RuntimeInner {
                core,
                services,
                responders: RwLock::new(HashMap::new()),
                restorers: RwLock::new(HashMap::new()),
                tasks: Mutex::new(HashMap::new()),
                dispatcher: Mutex::new(None),
            }),
        }
    }

    /// Node services
    pub fn services(&self) -> &ServiceHub {
        &self.inner.services
    }

    /// The node's identity
    pub fn identity(&self) -> &Party {
        self.inner.services.my_identity()
    }

    /// Start dispatching inbound messages
    ///
    /// Messages for checkpointed sessions that arrive before
    /// [`FlowRuntime::restore_checkpoints`] are held until the flow resumes.
    pub fn run(&self, mut inbound: InboundReceiver) {
        match self.inner.core.checkpoints.load_all() {
            Ok(checkpoints) => self.inner.core.router.expect(
                checkpoints
                    .iter()
                    .flat_map(|c| c.sessions.iter().map(SessionCheckpoint::route)),
            ),
            Err(err) => warn!(node = %self.identity(), error = %err, "Could not read checkpoints"),
        }
        let weak: Weak<RuntimeInner> = Arc::downgrade(&self.inner);
        let node = self.identity().name.clone();
        let dispatcher = tokio::spawn(async move {
            while let Some((from, envelope)) = inbound.recv().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                FlowRuntime { inner }.handle_inbound(from, envelope).await;
            }
            debug!(node = %node, "Dispatcher stopped");
        });
        if let Some(previous) = self.inner.dispatcher.lock().replace(dispatcher) {
            previous.abort();
        }
        info!(node = %self.identity(), "Flow runtime running");
    }

    /// Make `F` restorable from checkpoints
    pub fn register_flow<F>(&self)
    where
        F: FlowLogic + Serialize + DeserializeOwned,
    {
        let restorer: Restorer = Arc::new(|runtime: &FlowRuntime, checkpoint: &Checkpoint| {
            let flow: F = bincode::deserialize(&checkpoint.initial_state)?;
            let ctx = FlowContext::restore(
                checkpoint,
                runtime.inner.services.clone(),
                Arc::clone(&runtime.inner.core),
                F::INITIATING,
            );
            let (tx, rx) = oneshot::channel();
            runtime.spawn(flow, ctx, move |result| {
                let _ = tx.send(erase::<F>(result));
            });
            Ok(rx)
        });
        self.inner.restorers.write().insert(F::NAME.to_string(), restorer);
    }

    /// Run flows built by `factory` for sessions opened with `protocol`
    pub fn register_responder<F, Fac>(&self, protocol: &'static str, factory: Fac)
    where
        F: FlowLogic,
        Fac: Fn(FlowSession) -> F + Send + Sync + 'static,
    {
        let factory = Arc::new(factory);

        let start_factory = Arc::clone(&factory);
        let starter: ResponderStarter = Arc::new(
            move |runtime: &FlowRuntime,
                  session: FlowSession,
                  protocol: &str,
                  inbox: mpsc::UnboundedReceiver<SessionEvent>| {
                let ctx = FlowContext::for_responder(
                    FlowId::new(),
                    F::NAME,
                    runtime.inner.services.clone(),
                    Arc::clone(&runtime.inner.core),
                    &session,
                    protocol,
                    inbox,
                )?;
                let flow_id = ctx.flow_id();
                runtime.spawn(start_factory(session), ctx, |_| {});
                Ok(flow_id)
            },
        );

        let restorer: Restorer = Arc::new(move |runtime: &FlowRuntime, checkpoint: &Checkpoint| {
            let session: FlowSession = bincode::deserialize(&checkpoint.initial_state)?;
            let ctx = FlowContext::restore(
                checkpoint,
                runtime.inner.services.clone(),
                Arc::clone(&runtime.inner.core),
                F::INITIATING,
            );
            let (tx, rx) = oneshot::channel();
            runtime.spawn(factory(session), ctx, move |result| {
                let _ = tx.send(erase::<F>(result));
            });
            Ok(rx)
        });

        self.inner
            .responders
            .write()
            .insert(protocol.to_string(), starter);
        self.inner.restorers.write().insert(F::NAME.to_string(), restorer);
        debug!(node = %self.identity(), protocol, responder = F::NAME, "Responder registered");
    }

    /// Start `flow`
    pub fn start_flow<F>(&self, flow: F) -> Result<FlowHandle<F>, FlowError>
    where
        F: FlowLogic + Serialize + DeserializeOwned,
    {
        self.register_flow::<F>();
        let initial_state = bincode::serialize(&flow)?;
        let ctx = FlowContext::new(
            FlowId::new(),
            F::NAME,
            initial_state,
            self.inner.services.clone(),
            Arc::clone(&self.inner.core),
            F::INITIATING,
        );
        let flow_id = ctx.flow_id();
        let (tx, rx) = oneshot::channel();
        self.spawn(flow, ctx, move |result| {
            let _ = tx.send(result);
        });
        Ok(FlowHandle {
            flow_id,
            result: rx,
        })
    }

    /// Resume every checkpointed flow that is not already running
    pub fn restore_checkpoints(&self) -> Result<Vec<RestoredFlow>, FlowError> {
        let mut restored = Vec::new();
        for checkpoint in self.inner.core.checkpoints.load_all()? {
            let running = self
                .inner
                .tasks
                .lock()
                .get(&checkpoint.flow_id)
                .is_some_and(|task| !task.is_finished());
            if running {
                continue;
            }
            let restorer = self
                .inner
                .restorers
                .read()
                .get(&checkpoint.flow_name)
                .cloned()
                .ok_or_else(|| {
                    FlowError::checkpoint(format!(
                        "no flow registered as {}",
                        checkpoint.flow_name
                    ))
                })?;
            let result = restorer(self, &checkpoint)?;
            restored.push(RestoredFlow {
                flow_id: checkpoint.flow_id,
                flow_name: checkpoint.flow_name.clone(),
                result,
            });
        }
        info!(node = %self.identity(), restored = restored.len(), "Checkpoints restored");
        Ok(restored)
    }

    /// Number of flows still running
    pub fn running_flows(&self) -> usize {
        self.inner
            .tasks
            .lock()
            .values()
            .filter(|task| !task.is_finished())
            .count()
    }

    /// Stop the dispatcher and abort every flow, leaving checkpoints in place
    pub fn shutdown(&self) {
        if let Some(dispatcher) = self.inner.dispatcher.lock().take() {
            dispatcher.abort();
        }
        let tasks: Vec<_> = self.inner.tasks.lock().drain().collect();
        for (_, task) in &tasks {
            task.abort();
        }
        info!(node = %self.identity(), aborted = tasks.len(), "Flow runtime shut down");
    }

    fn spawn<F, D>(&self, mut flow: F, mut ctx: FlowContext, deliver: D)
    where
        F: FlowLogic,
        D: FnOnce(Result<F::Output, F::Error>) + Send + 'static,
    {
        let flow_id = ctx.flow_id();
        let task = tokio::spawn(async move {
            debug!(flow_id = %flow_id, flow = F::NAME, "Flow started");
            let result = match ctx.begin() {
                Ok(()) => flow.call(&mut ctx).await,
                Err(err) => Err(F::Error::from(err)),
            };
            let failure = match &result {
                Ok(_) => {
                    debug!(flow_id = %flow_id, flow = F::NAME, "Flow completed");
                    None
                }
                Err(err) => {
                    warn!(flow_id = %flow_id, flow = F::NAME, error = %err, "Flow failed");
                    Some(
                        err.declared_reason()
                            .unwrap_or_else(|| GENERIC_FAILURE_REASON.to_string()),
                    )
                }
            };
            ctx.finish(failure).await;
            deliver(result);
        });

        let mut tasks = self.inner.tasks.lock();
        tasks.retain(|_, t| !t.is_finished());
        tasks.insert(flow_id, task);
    }

    async fn handle_inbound(&self, from: PartyName, envelope: SessionEnvelope) {
        let key = RouteKey {
            peer: from.clone(),
            session: envelope.session_id,
            role: envelope.sender_role.opposite(),
        };
        let router = &self.inner.core.router;
        match envelope.body {
            SessionMessage::Init {
                protocol,
                initiator,
                payload,
            } => {
                self.accept_session(from, key, protocol, initiator, payload)
                    .await;
            }
            SessionMessage::Data(bytes) => router.deliver(key, SessionEvent::Data(bytes)),
            SessionMessage::Error { reason } => router.deliver(key, SessionEvent::Error(reason)),
            SessionMessage::Reject { protocol } => {
                router.deliver(key, SessionEvent::Rejected(protocol));
            }
            SessionMessage::End => router.deliver(key, SessionEvent::End),
        }
    }

    async fn accept_session(
        &self,
        from: PartyName,
        key: RouteKey,
        protocol: String,
        initiator: Party,
        payload: Option<Vec<u8>>,
    ) {
        let core = &self.inner.core;
        if initiator.name != from {
            warn!(from = %from, claimed = %initiator, "Rejecting session init with mismatched initiator");
            self.reply(&from, &key, SessionMessage::Error {
                reason: "Initiator does not match sender".to_string(),
            })
            .await;
            return;
        }
        if core.router.is_open(&key) {
            warn!(from = %from, session = %key.session, "Ignoring duplicate session init");
            return;
        }

        let starter = self.inner.responders.read().get(&protocol).cloned();
        let Some(starter) = starter else {
            warn!(from = %from, protocol = %protocol, "No responder registered");
            self.reply(&from, &key, SessionMessage::Reject { protocol }).await;
            return;
        };

        let inbox = core.router.open(key.clone());
        if let Some(bytes) = payload {
            core.router.deliver(key.clone(), SessionEvent::Data(bytes));
        }
        let session = FlowSession {
            id: key.session,
            counterparty: initiator,
        };
        match starter(self, session, &protocol, inbox) {
            Ok(flow_id) => {
                debug!(flow_id = %flow_id, from = %from, protocol = %protocol, "Responder started");
            }
            Err(err) => {
                warn!(from = %from, protocol = %protocol, error = %err, "Responder failed to start");
                core.router.close(&key);
                self.reply(&from, &key, SessionMessage::Error {
                    reason: GENERIC_FAILURE_REASON.to_string(),
                })
                .await;
            }
        }
    }

    async fn reply(&self, to: &PartyName, key: &RouteKey, body: SessionMessage) {
        let envelope = SessionEnvelope {
            session_id: key.session,
            sender_role: SessionRole::Responder,
            body,
        };
        if let Err(err) = self.inner.core.messaging.send(to, envelope).await {
            warn!(to = %to, error = %err, "Could not reply to session init");
        }
    }
}
