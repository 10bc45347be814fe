//! In-process network of fully wired nodes
//!
//! Every node gets its own Ed25519 key store, transaction storage, identity
//! registry and checkpoint store, and shares the network's clock and network
//! map. Notary nodes additionally run a [`NotaryService`].

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tessera_core::effects::{CryptoEffects, PhysicalTimeEffects};
use tessera_core::{Party, PartyName, PhysicalTime, SecureHash};
use tessera_effects::Ed25519CryptoHandler;
use tessera_flow::{
    FlowError, FlowHandle, FlowLogic, FlowRuntime, FlowRuntimeConfig, InMemoryCheckpointStorage,
    InMemoryNetwork, NetworkMapCache, NodeInfo, RestoredFlow, ServiceHub,
};
use tessera_identity::{IdentityExchangeFlow, IdentityService, InMemoryIdentityService};
use tessera_ledger::{
    InMemoryTransactionStorage, SignedTransaction, TransactionResolver, TransactionStorage,
};
use tessera_notary::{NotaryClientFlow, NotaryConfig, NotaryService};
use tracing::info;

use crate::clock::ControllableClock;
use crate::keys::KeyFixture;

/// Clock reading every mock network starts at
pub const NETWORK_EPOCH: PhysicalTime = PhysicalTime { ts_ms: 1_700_000_000_000 };

/// A set of nodes connected by an [`InMemoryNetwork`]
#[derive(Debug)]
pub struct MockNetwork {
    network: InMemoryNetwork,
    network_map: Arc<NetworkMapCache>,
    clock: Arc<ControllableClock>,
    config: FlowRuntimeConfig,
}

impl Default for MockNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl MockNetwork {
    /// Empty network with default runtime settings
    pub fn new() -> Self {
        Self::with_config(FlowRuntimeConfig::default())
    }

    /// Empty network whose nodes use `config`
    pub fn with_config(config: FlowRuntimeConfig) -> Self {
        Self {
            network: InMemoryNetwork::new(),
            network_map: Arc::new(NetworkMapCache::new()),
            clock: Arc::new(ControllableClock::new(NETWORK_EPOCH)),
            config,
        }
    }

    /// The clock shared by every node
    pub fn clock(&self) -> &Arc<ControllableClock> {
        &self.clock
    }

    /// Messages sent between nodes so far
    pub fn messages_sent(&self) -> u64 {
        self.network.messages_sent()
    }

    /// The shared network map
    pub fn network_map(&self) -> &Arc<NetworkMapCache> {
        &self.network_map
    }

    /// Start an ordinary node named `name`
    ///
    /// Must be called inside a Tokio runtime.
    pub fn create_node(&self, name: &str) -> MockNode {
        let node = self.build_node(name, None);
        self.network_map.add_node(NodeInfo::new(node.party.clone()));
        node
    }

    /// Start a notary node named `name`
    pub fn create_notary_node(&self, name: &str, config: NotaryConfig) -> MockNode {
        let mode = config.mode;
        let node = self.build_node(name, Some(config));
        self.network_map
            .add_node(NodeInfo::notary(node.party.clone(), mode));
        node
    }

    fn build_node(&self, name: &str, notary: Option<NotaryConfig>) -> MockNode {
        let crypto = Arc::new(Ed25519CryptoHandler::seeded(seed_for(name)));
        let owning_key = crypto.import_key(KeyFixture::from_seed(name).signing_key());
        let party = Party::new(
            PartyName::new(name).expect("mock node names are valid"),
            owning_key,
        );

        let identities = Arc::new(InMemoryIdentityService::new(
            Arc::clone(&crypto) as Arc<dyn CryptoEffects>
        ));
        let mut node = MockNode {
            party,
            crypto,
            storage: InMemoryTransactionStorage::new(),
            identities,
            checkpoints: InMemoryCheckpointStorage::new(),
            notary: None,
            runtime: Mutex::new(None),
        };
        node.notary = notary.map(|config| Arc::new(NotaryService::in_memory(config)));
        node.start(self);
        info!(node = %node.party, notary = node.notary.is_some(), "Mock node started");
        node
    }
}

fn seed_for(name: &str) -> u64 {
    let digest = SecureHash::of(name.as_bytes());
    let mut seed = [0u8; 8];
    seed.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(seed)
}

/// One node of a [`MockNetwork`]
#[derive(Debug)]
pub struct MockNode {
    party: Party,
    crypto: Arc<Ed25519CryptoHandler>,
    storage: InMemoryTransactionStorage,
    identities: Arc<InMemoryIdentityService>,
    checkpoints: InMemoryCheckpointStorage,
    notary: Option<Arc<NotaryService>>,
    runtime: Mutex<Option<FlowRuntime>>,
}

impl MockNode {
    /// Legal identity
    pub fn party(&self) -> &Party {
        &self.party
    }

    /// Key store holding the legal identity key
    pub fn crypto(&self) -> &Arc<Ed25519CryptoHandler> {
        &self.crypto
    }

    /// Validated transactions
    pub fn storage(&self) -> &InMemoryTransactionStorage {
        &self.storage
    }

    /// Identity registry
    pub fn identities(&self) -> &Arc<InMemoryIdentityService> {
        &self.identities
    }

    /// Checkpoint store; survives restarts
    pub fn checkpoints(&self) -> &InMemoryCheckpointStorage {
        &self.checkpoints
    }

    /// Notary service, on notary nodes
    pub fn notary_service(&self) -> Option<&Arc<NotaryService>> {
        self.notary.as_ref()
    }

    /// The current flow runtime
    ///
    /// Panics if the node is stopped.
    pub fn runtime(&self) -> FlowRuntime {
        self.runtime.lock().clone().expect("node is stopped")
    }

    /// Start `flow` on this node
    pub fn start_flow<F>(&self, flow: F) -> Result<FlowHandle<F>, FlowError>
    where
        F: FlowLogic + Serialize + DeserializeOwned,
    {
        self.runtime().start_flow(flow)
    }

    /// Record `stx` as validated by this node
    pub fn record(&self, stx: SignedTransaction) {
        self.storage.add_transaction(stx);
    }

    /// Abort every flow and drop off the network, keeping checkpoints
    pub fn stop(&self, network: &MockNetwork) {
        if let Some(runtime) = self.runtime.lock().take() {
            runtime.shutdown();
        }
        network.network.detach(&self.party.name);
        info!(node = %self.party, "Mock node stopped");
    }

    /// Stop, then come back with a fresh runtime over the same stores
    ///
    /// Call [`MockNode::restore`] afterwards to resume checkpointed flows.
    pub fn restart(&self, network: &MockNetwork) {
        self.stop(network);
        self.start(network);
        info!(node = %self.party, checkpoints = self.checkpoints.len(), "Mock node restarted");
    }

    /// Resume every checkpointed flow
    pub fn restore(&self) -> Result<Vec<RestoredFlow>, FlowError> {
        self.runtime().restore_checkpoints()
    }

    fn start(&self, network: &MockNetwork) {
        let services = ServiceHub::new(
            self.party.clone(),
            Arc::clone(&self.crypto) as Arc<dyn CryptoEffects>,
            Arc::clone(&network.clock) as Arc<dyn PhysicalTimeEffects>,
            Arc::clone(&network.network_map),
        );
        services.register::<dyn TransactionResolver>(Arc::new(self.storage.clone()));

        let (endpoint, inbound) = network.network.register(self.party.name.clone());
        let runtime = FlowRuntime::new(
            services,
            Arc::new(endpoint),
            Arc::new(self.checkpoints.clone()),
            network.config.clone(),
        );
        tessera_identity::install(
            &runtime,
            Arc::clone(&self.identities) as Arc<dyn IdentityService>,
        );
        if let Some(notary) = &self.notary {
            NotaryService::attach(notary, &runtime);
        }
        runtime.register_flow::<NotaryClientFlow>();
        runtime.register_flow::<IdentityExchangeFlow>();
        runtime.run(inbound);

        *self.runtime.lock() = Some(runtime);
    }
}
