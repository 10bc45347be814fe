//! The notary's node-side service
//!
//! **Effect Classification**: Infrastructure. Holds the uniqueness store,
//! the optional transaction resolver used by validating notaries, and the
//! checks the service flow runs in order. Installed once per notary node
//! and shared by every concurrent [`NotaryServiceFlow`].

use std::collections::BTreeSet;
use std::sync::Arc;
use tessera_core::effects::CryptoEffects;
use tessera_core::{CompositeKey, DigitalSignature, Party, PartyName, PhysicalTime, SecureHash, TimeWindow};
use tessera_flow::{FlowRuntime, NotaryKind};
use tessera_ledger::{LedgerTransaction, TransactionResolver, WireTransaction};
use tessera_signature::SignatureRequirementResolver;
use tracing::{debug, error, info, warn};

use crate::config::NotaryConfig;
use crate::error::NotaryError;
use crate::flows::NotaryServiceFlow;
use crate::messages::{NotarisationRequest, NOTARY_PROTOCOL};
use crate::uniqueness::{CommitResult, ShardedUniquenessStore, UniquenessProvider};

/// Outcome of the read-only uniqueness check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniquenessCheck {
    /// No input has been consumed yet
    Fresh,
    /// Every input is already consumed by this transaction
    AlreadyCommitted,
}

/// Notary service state shared by the service flows of one node
pub struct NotaryService {
    config: NotaryConfig,
    uniqueness: Arc<dyn UniquenessProvider>,
    resolver: Option<Arc<dyn TransactionResolver>>,
    signatures: SignatureRequirementResolver,
}

impl std::fmt::Debug for NotaryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotaryService")
            .field("config", &self.config)
            .field("resolver", &self.resolver.is_some())
            .finish_non_exhaustive()
    }
}

impl NotaryService {
    /// Service backed by `uniqueness`
    pub fn new(config: NotaryConfig, uniqueness: Arc<dyn UniquenessProvider>) -> Self {
        Self {
            config,
            uniqueness,
            resolver: None,
            signatures: SignatureRequirementResolver::default(),
        }
    }

    /// Service with an in-memory sharded store sized by `config`
    pub fn in_memory(config: NotaryConfig) -> Self {
        let store = ShardedUniquenessStore::new(config.uniqueness_shards);
        Self::new(config, Arc::new(store))
    }

    /// Resolve inputs missing from a request's dependency chain through `resolver`
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn TransactionResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Settings
    pub fn config(&self) -> &NotaryConfig {
        &self.config
    }

    /// The uniqueness store
    pub fn uniqueness(&self) -> &Arc<dyn UniquenessProvider> {
        &self.uniqueness
    }

    /// Register the service and its responder flow on `runtime`
    pub fn install(self, runtime: &FlowRuntime) -> Arc<Self> {
        let service = Arc::new(self);
        Self::attach(&service, runtime);
        service
    }

    /// Register an already shared service, as when a node's runtime is rebuilt
    pub fn attach(service: &Arc<Self>, runtime: &FlowRuntime) {
        runtime.services().register(Arc::clone(service));
        runtime.register_responder(NOTARY_PROTOCOL, NotaryServiceFlow::new);
        info!(
            notary = %runtime.identity(),
            mode = ?service.config.mode,
            "Notary service installed"
        );
    }

    pub(crate) fn is_validating(&self) -> bool {
        self.config.mode == NotaryKind::Validating
    }

    /// Re-verify the attached transaction
    pub(crate) async fn validate(
        &self,
        request: &NotarisationRequest,
        notary: &Party,
    ) -> Result<(), NotaryError> {
        let payload = request.payload.as_ref().ok_or_else(|| {
            NotaryError::transaction_invalid("validating notary requires the full transaction")
        })?;
        let stx = &payload.transaction;
        let tx = stx.tx();
        if stx.id() != request.tx_id
            || tx.inputs() != request.inputs.as_slice()
            || tx.time_window() != request.time_window.as_ref()
        {
            return Err(NotaryError::transaction_invalid(
                "request does not match the attached transaction",
            ));
        }
        if tx.notary() != Some(notary) {
            return Err(NotaryError::transaction_invalid(format!(
                "transaction is not assigned to notary {notary}"
            )));
        }

        let own_key = BTreeSet::from([CompositeKey::Leaf(notary.owning_key)]);
        self.signatures
            .verify_signatures_except(stx, &own_key)
            .map_err(|e| NotaryError::transaction_invalid(e.to_string()))?;

        let mut dependencies: Vec<WireTransaction> = Vec::with_capacity(payload.dependencies.len());
        for dependency in &payload.dependencies {
            self.signatures
                .verify_required_signatures(dependency)
                .map_err(|e| NotaryError::transaction_invalid(e.to_string()))?;
            dependencies.push(dependency.tx().clone());
        }

        let attached: BTreeSet<SecureHash> = dependencies.iter().map(WireTransaction::id).collect();
        let unresolved: BTreeSet<SecureHash> = tx
            .inputs()
            .iter()
            .map(|input| input.tx_id)
            .filter(|id| !attached.contains(id))
            .collect();
        if let Some(first) = unresolved.first() {
            let resolver = self.resolver.as_ref().ok_or_else(|| {
                NotaryError::transaction_invalid(format!("dependency {first} was not provided"))
            })?;
            for id in &unresolved {
                let resolved = resolver
                    .resolve(id)
                    .await
                    .map_err(|e| NotaryError::transaction_invalid(e.to_string()))?;
                dependencies.push(resolved.transaction.tx().clone());
            }
        }

        LedgerTransaction::resolve(tx, dependencies.iter())
            .map_err(|e| NotaryError::transaction_invalid(e.to_string()))?;
        debug!(tx_id = %request.tx_id, dependencies = dependencies.len(), "Transaction validated");
        Ok(())
    }

    /// Read-only conflict check before committing
    pub(crate) fn check_uniqueness(
        &self,
        request: &NotarisationRequest,
    ) -> Result<UniquenessCheck, NotaryError> {
        let consumers = self.uniqueness.lookup(&request.inputs);
        let conflicts: std::collections::BTreeMap<_, _> = consumers
            .iter()
            .filter(|(_, consumer)| consumer.tx_id != request.tx_id)
            .map(|(state, consumer)| (*state, consumer.clone()))
            .collect();
        if !conflicts.is_empty() {
            return Err(NotaryError::Conflict {
                tx_id: request.tx_id,
                conflicts,
            });
        }
        if !request.inputs.is_empty() && consumers.len() == request.inputs.len() {
            return Ok(UniquenessCheck::AlreadyCommitted);
        }
        Ok(UniquenessCheck::Fresh)
    }

    /// Check `now` falls within `window`, allowing the configured drift
    pub(crate) fn check_time_window(
        &self,
        window: &TimeWindow,
        now: PhysicalTime,
    ) -> Result<(), NotaryError> {
        if window.contains_with_tolerance(now, self.config.time_tolerance_ms) {
            Ok(())
        } else {
            Err(NotaryError::TimeWindowInvalid {
                current_time: now,
                window: *window,
            })
        }
    }

    /// Commit the request's inputs
    ///
    /// A conflict at commit time means another request won a race since the
    /// check; the commit is attempted once more as a fresh check and any
    /// conflict it reports is final.
    pub(crate) fn commit(
        &self,
        request: &NotarisationRequest,
        requester: &PartyName,
    ) -> Result<(), NotaryError> {
        let mut retried = false;
        loop {
            match self
                .uniqueness
                .try_commit(request.tx_id, &request.inputs, requester)
            {
                CommitResult::Committed | CommitResult::AlreadyCommitted => return Ok(()),
                CommitResult::Conflict(conflicts) if retried => {
                    return Err(NotaryError::Conflict {
                        tx_id: request.tx_id,
                        conflicts,
                    });
                }
                CommitResult::Conflict(_) => {
                    warn!(tx_id = %request.tx_id, "Commit raced with another request, re-checking");
                    retried = true;
                }
            }
        }
    }

    /// Sign the transaction id with the notary key
    pub(crate) async fn sign(
        &self,
        crypto: &dyn CryptoEffects,
        notary: &Party,
        tx_id: SecureHash,
    ) -> Result<DigitalSignature, NotaryError> {
        crypto
            .sign(tx_id.as_bytes(), &notary.owning_key)
            .await
            .map_err(|e| {
                error!(tx_id = %tx_id, error = %e, "Notary signing failed");
                NotaryError::general("unable to sign transaction")
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tessera_ledger::StateRef;

    fn request(tx: &[u8], inputs: Vec<StateRef>) -> NotarisationRequest {
        NotarisationRequest {
            tx_id: SecureHash::of(tx),
            inputs,
            time_window: None,
            payload: None,
        }
    }

    fn alice() -> PartyName {
        PartyName::new("Alice").unwrap()
    }

    #[test]
    fn test_uniqueness_check_sequence() {
        let service = NotaryService::in_memory(NotaryConfig::default());
        let input = StateRef::new(SecureHash::of(b"issue"), 0);
        let first = request(b"tx-1", vec![input]);

        assert_eq!(service.check_uniqueness(&first), Ok(UniquenessCheck::Fresh));
        service.commit(&first, &alice()).unwrap();
        assert_eq!(
            service.check_uniqueness(&first),
            Ok(UniquenessCheck::AlreadyCommitted)
        );

        let spend_again = request(b"tx-2", vec![input]);
        assert_matches!(
            service.check_uniqueness(&spend_again),
            Err(NotaryError::Conflict { ref conflicts, .. }) if conflicts.contains_key(&input)
        );
        assert_matches!(
            service.commit(&spend_again, &alice()),
            Err(NotaryError::Conflict { .. })
        );
    }

    #[test]
    fn test_time_window_tolerance() {
        let service = NotaryService::in_memory(NotaryConfig {
            time_tolerance_ms: 100,
            ..NotaryConfig::default()
        });
        let window = TimeWindow::until_only(PhysicalTime::from_millis(1_000));
        assert!(service
            .check_time_window(&window, PhysicalTime::from_millis(1_050))
            .is_ok());
        assert_matches!(
            service.check_time_window(&window, PhysicalTime::from_millis(1_200)),
            Err(NotaryError::TimeWindowInvalid { .. })
        );
    }

    #[tokio::test]
    async fn test_validating_requires_payload() {
        let service = NotaryService::in_memory(NotaryConfig::validating());
        let notary = Party::new(
            PartyName::new("Notary").unwrap(),
            tessera_core::PublicKey::from_bytes([3; 32]),
        );
        assert_matches!(
            service.validate(&request(b"tx", vec![]), &notary).await,
            Err(NotaryError::TransactionInvalid { .. })
        );
    }
}
