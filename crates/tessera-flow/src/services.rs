//! Node services available to flows
//!
//! Shared node state (uniqueness store, identity registry, transaction
//! storage) is injected into flows through the [`ServiceHub`] rather than
//! reached as ambient globals. Each service does its own locking.

use parking_lot::RwLock;
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tessera_core::effects::{CryptoEffects, PhysicalTimeEffects};
use tessera_core::Party;

use crate::error::FlowError;
use crate::network_map::NetworkMapCache;

type ServiceMap = HashMap<TypeId, Box<dyn Any + Send + Sync>>;

/// Services shared by every flow on a node
#[derive(Clone)]
pub struct ServiceHub {
    identity: Party,
    crypto: Arc<dyn CryptoEffects>,
    clock: Arc<dyn PhysicalTimeEffects>,
    network_map: Arc<NetworkMapCache>,
    extensions: Arc<RwLock<ServiceMap>>,
}

impl ServiceHub {
    /// Create a hub with the core services
    pub fn new(
        identity: Party,
        crypto: Arc<dyn CryptoEffects>,
        clock: Arc<dyn PhysicalTimeEffects>,
        network_map: Arc<NetworkMapCache>,
    ) -> Self {
        Self {
            identity,
            crypto,
            clock,
            network_map,
            extensions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// The node's legal identity
    pub fn my_identity(&self) -> &Party {
        &self.identity
    }

    /// Signing and key management
    pub fn crypto(&self) -> &Arc<dyn CryptoEffects> {
        &self.crypto
    }

    /// Wall clock
    pub fn clock(&self) -> &Arc<dyn PhysicalTimeEffects> {
        &self.clock
    }

    /// Known nodes
    pub fn network_map(&self) -> &Arc<NetworkMapCache> {
        &self.network_map
    }

    /// Install a service, replacing any earlier one of the same type
    ///
    /// `T` may be a trait object: `register::<dyn Foo>(Arc::new(impl))`.
    pub fn register<T>(&self, service: Arc<T>)
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.extensions
            .write()
            .insert(TypeId::of::<Arc<T>>(), Box::new(service));
    }

    /// Look up a service
    pub fn service<T>(&self) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.extensions
            .read()
            .get(&TypeId::of::<Arc<T>>())
            .and_then(|s| s.downcast_ref::<Arc<T>>())
            .cloned()
    }

    /// Look up a service that a flow cannot run without
    pub fn require<T>(&self) -> Result<Arc<T>, FlowError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.service::<T>()
            .ok_or_else(|| FlowError::service(format!("{} is not installed", type_name::<T>())))
    }
}

impl fmt::Debug for ServiceHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceHub")
            .field("identity", &self.identity)
            .field("extensions", &self.extensions.read().len())
            .finish_non_exhaustive()
    }
}
