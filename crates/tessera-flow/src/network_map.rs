//! Cache of known nodes and the services they advertise

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tessera_core::{Party, PartyName, PublicKey};
use tracing::debug;

/// Kind of notary service a node offers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotaryKind {
    /// Re-verifies the full transaction and its dependencies
    Validating,
    /// Checks uniqueness of inputs only
    #[default]
    NonValidating,
}

/// What the network knows about one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Legal identity
    pub party: Party,
    /// Notary service offered, if any
    pub notary: Option<NotaryKind>,
}

impl NodeInfo {
    /// A node offering no notary service
    pub fn new(party: Party) -> Self {
        Self {
            party,
            notary: None,
        }
    }

    /// A notary node
    pub fn notary(party: Party, kind: NotaryKind) -> Self {
        Self {
            party,
            notary: Some(kind),
        }
    }
}

/// In-memory node directory, keyed by legal identity key
///
/// Adding a node whose key is already present replaces the earlier entry.
#[derive(Debug, Default)]
pub struct NetworkMapCache {
    by_key: RwLock<HashMap<PublicKey, NodeInfo>>,
}

impl NetworkMapCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a node
    pub fn add_node(&self, info: NodeInfo) {
        let replaced = self.by_key.write().insert(info.party.owning_key, info.clone());
        debug!(
            node = %info.party.name,
            replaced = replaced.is_some(),
            "Network map node added"
        );
    }

    /// Remove a node; returns whether it was present
    pub fn remove_node(&self, info: &NodeInfo) -> bool {
        let mut by_key = self.by_key.write();
        match by_key.get(&info.party.owning_key) {
            Some(existing) if existing == info => {
                by_key.remove(&info.party.owning_key);
                debug!(node = %info.party.name, "Network map node removed");
                true
            }
            _ => false,
        }
    }

    /// Look up by legal name
    pub fn node_by_legal_name(&self, name: &PartyName) -> Option<NodeInfo> {
        self.by_key
            .read()
            .values()
            .find(|n| n.party.name == *name)
            .cloned()
    }

    /// Look up by legal identity key
    pub fn node_by_legal_identity_key(&self, key: &PublicKey) -> Option<NodeInfo> {
        self.by_key.read().get(key).cloned()
    }

    /// Look up by full legal identity
    pub fn node_by_legal_identity(&self, party: &Party) -> Option<NodeInfo> {
        self.node_by_legal_identity_key(&party.owning_key)
            .filter(|n| n.party == *party)
    }

    /// Notary service advertised by `party`, if any
    pub fn notary_kind(&self, party: &Party) -> Option<NotaryKind> {
        self.node_by_legal_identity(party).and_then(|n| n.notary)
    }

    /// Every node advertising a notary service
    pub fn notary_nodes(&self) -> Vec<NodeInfo> {
        let mut notaries: Vec<_> = self
            .by_key
            .read()
            .values()
            .filter(|n| n.notary.is_some())
            .cloned()
            .collect();
        notaries.sort_by(|a, b| a.party.name.cmp(&b.party.name));
        notaries
    }
}
