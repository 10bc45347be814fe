//! Notarisation flows
//!
//! The requester runs [`NotaryClientFlow`] against the notary named by the
//! transaction. The notary node answers with [`NotaryServiceFlow`], which
//! walks the phases below and always replies with a typed response:
//!
//! ```text
//! AWAITING_REQUEST -> [VALIDATING] -> CHECKING_UNIQUENESS -> CHECKING_TIME_WINDOW
//!     -> COMMITTING -> SIGNING -> REPLIED
//! ```
//!
//! Any phase may end in REJECTED. A request whose inputs are all already
//! consumed by the same transaction skips straight to SIGNING.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tessera_core::{
    CompositeKey, DigitalSignature, Ed25519Verifier, Party, SecureHash, SignatureVerifier,
};
use tessera_flow::{async_trait, FlowContext, FlowError, FlowLogic, FlowSession, NotaryKind};
use tessera_ledger::{MalformedTransaction, SignedTransaction, TransactionResolver};
use tessera_signature::SignatureRequirementResolver;
use tracing::{debug, info, warn};

use crate::error::{NotaryError, NotaryException};
use crate::messages::{NotarisationRequest, NotarisationResponse, NOTARY_PROTOCOL};
use crate::service::{NotaryService, UniquenessCheck};

/// Requester progress step: assembling the request
pub const BUILD_REQUEST: &str = "BUILD_REQUEST";
/// Requester progress step: waiting for the notary
pub const AWAIT_RESPONSE: &str = "AWAIT_RESPONSE";

/// Obtain the notary's signature on a transaction
///
/// Returns the transaction with the notary signature appended. Fails with
/// [`NotaryException::Notary`] when the notary refuses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotaryClientFlow {
    stx: SignedTransaction,
}

impl NotaryClientFlow {
    /// Notarise `stx`
    pub fn new(stx: SignedTransaction) -> Self {
        Self { stx }
    }

    /// The transaction's producers, each preceded by its own dependencies
    async fn dependencies(
        &self,
        resolver: &dyn TransactionResolver,
    ) -> Result<Vec<SignedTransaction>, NotaryException> {
        let producers: BTreeSet<SecureHash> =
            self.stx.tx().inputs().iter().map(|i| i.tx_id).collect();

        let mut chain: IndexMap<SecureHash, SignedTransaction> = IndexMap::new();
        for producer in producers {
            let resolved = resolver
                .resolve(&producer)
                .await
                .map_err(|e| FlowError::service(e.to_string()))?;
            for dependency in resolved.dependencies {
                chain.entry(dependency.id()).or_insert(dependency);
            }
            chain
                .entry(resolved.transaction.id())
                .or_insert(resolved.transaction);
        }
        Ok(chain.into_values().collect())
    }

    fn check_notary_signature(
        &self,
        notary: &Party,
        signature: &DigitalSignature,
    ) -> Result<(), NotaryException> {
        if signature.by == notary.owning_key
            && Ed25519Verifier.verify(self.stx.id().as_bytes(), signature)
        {
            return Ok(());
        }
        Err(NotaryException::InvalidNotarySignature {
            notary: notary.name.clone(),
        })
    }
}

#[async_trait]
impl FlowLogic for NotaryClientFlow {
    const NAME: &'static str = "tessera.notary.client";
    const INITIATING: Option<&'static str> = Some(NOTARY_PROTOCOL);
    type Output = SignedTransaction;
    type Error = NotaryException;

    async fn call(&mut self, ctx: &mut FlowContext) -> Result<SignedTransaction, NotaryException> {
        ctx.progress(BUILD_REQUEST);
        let tx_id = self.stx.id();
        let notary = self
            .stx
            .tx()
            .notary()
            .cloned()
            .ok_or(MalformedTransaction::MissingNotary)?;

        let own_key = BTreeSet::from([CompositeKey::Leaf(notary.owning_key)]);
        SignatureRequirementResolver::new(Ed25519Verifier)
            .verify_signatures_except(&self.stx, &own_key)?;

        // Unknown notaries are assumed to validate.
        let validating = ctx.services().network_map().notary_kind(&notary)
            != Some(NotaryKind::NonValidating);
        let request = if validating {
            let dependencies = match ctx.services().service::<dyn TransactionResolver>() {
                Some(resolver) => self.dependencies(resolver.as_ref()).await?,
                None => Vec::new(),
            };
            NotarisationRequest::validating(&self.stx, dependencies)
        } else {
            NotarisationRequest::identifying(&self.stx)
        };
        debug!(tx_id = %tx_id, notary = %notary, validating, "Notarisation request built");

        ctx.progress(AWAIT_RESPONSE);
        let session = ctx.initiate(&notary)?;
        let timeout = ctx.default_receive_timeout();
        let response: NotarisationResponse =
            ctx.send_and_receive(&session, &request, timeout).await?;

        match response {
            NotarisationResponse::Signed(signature) => {
                self.check_notary_signature(&notary, &signature)?;
                info!(tx_id = %tx_id, notary = %notary, "Transaction notarised");
                Ok(self.stx.with_signature(signature))
            }
            NotarisationResponse::Rejected(error) => {
                warn!(tx_id = %tx_id, notary = %notary, error = %error, "Notarisation refused");
                Err(NotaryException::Notary(error))
            }
        }
    }
}

/// Recorded effect name for the notary's clock reading
const CLOCK_EFFECT: &str = "notary-clock";

/// Phases of the service side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServicePhase {
    /// Waiting for the request
    AwaitingRequest,
    /// Re-verifying the transaction (validating notaries only)
    Validating,
    /// Looking for already consumed inputs
    CheckingUniqueness,
    /// Comparing the clock with the time window
    CheckingTimeWindow,
    /// Writing the inputs to the uniqueness store
    Committing,
    /// Producing the notary signature
    Signing,
    /// Signature sent
    Replied,
    /// Refusal sent
    Rejected,
}

impl ServicePhase {
    /// Progress step name
    pub fn step(self) -> &'static str {
        match self {
            ServicePhase::AwaitingRequest => "AWAITING_REQUEST",
            ServicePhase::Validating => "VALIDATING",
            ServicePhase::CheckingUniqueness => "CHECKING_UNIQUENESS",
            ServicePhase::CheckingTimeWindow => "CHECKING_TIME_WINDOW",
            ServicePhase::Committing => "COMMITTING",
            ServicePhase::Signing => "SIGNING",
            ServicePhase::Replied => "REPLIED",
            ServicePhase::Rejected => "REJECTED",
        }
    }
}

/// Notary side of a notarisation session
#[derive(Debug, Clone)]
pub struct NotaryServiceFlow {
    session: FlowSession,
}

impl NotaryServiceFlow {
    /// Serve the request arriving on `session`
    pub fn new(session: FlowSession) -> Self {
        Self { session }
    }

    async fn notarise(
        &self,
        ctx: &mut FlowContext,
        service: &NotaryService,
        request: &NotarisationRequest,
    ) -> Result<DigitalSignature, NotaryError> {
        let notary = ctx.our_identity().clone();

        if service.is_validating() {
            ctx.progress(ServicePhase::Validating.step());
            service.validate(request, &notary).await?;
        }

        ctx.progress(ServicePhase::CheckingUniqueness.step());
        match service.check_uniqueness(request)? {
            UniquenessCheck::AlreadyCommitted => {
                info!(tx_id = %request.tx_id, "Repeated request for a committed transaction");
            }
            UniquenessCheck::Fresh => {
                ctx.progress(ServicePhase::CheckingTimeWindow.step());
                if let Some(window) = &request.time_window {
                    let clock = Arc::clone(ctx.services().clock());
                    let now = ctx
                        .record(CLOCK_EFFECT, async move {
                            clock
                                .physical_time()
                                .await
                                .map_err(|e| FlowError::service(e.to_string()))
                        })
                        .await
                        .map_err(|e| {
                            warn!(error = %e, "Notary clock unavailable");
                            NotaryError::general("notary clock unavailable")
                        })?;
                    service.check_time_window(window, now)?;
                }

                ctx.progress(ServicePhase::Committing.step());
                service.commit(request, &self.session.counterparty.name)?;
            }
        }

        ctx.progress(ServicePhase::Signing.step());
        let crypto = Arc::clone(ctx.services().crypto());
        service.sign(crypto.as_ref(), &notary, request.tx_id).await
    }
}

#[async_trait]
impl FlowLogic for NotaryServiceFlow {
    const NAME: &'static str = "tessera.notary.service";
    type Output = ();
    type Error = FlowError;

    async fn call(&mut self, ctx: &mut FlowContext) -> Result<(), FlowError> {
        let service = ctx.services().require::<NotaryService>()?;
        ctx.progress(ServicePhase::AwaitingRequest.step());
        let timeout = ctx.default_receive_timeout();
        let request: NotarisationRequest = ctx.receive(&self.session, timeout).await?;
        debug!(
            tx_id = %request.tx_id,
            requester = %self.session.counterparty,
            inputs = request.inputs.len(),
            "Notarisation request received"
        );

        let response = match self.notarise(ctx, &service, &request).await {
            Ok(signature) => {
                ctx.progress(ServicePhase::Replied.step());
                info!(tx_id = %request.tx_id, requester = %self.session.counterparty, "Transaction signed");
                NotarisationResponse::Signed(signature)
            }
            Err(error) => {
                ctx.progress(ServicePhase::Rejected.step());
                warn!(tx_id = %request.tx_id, requester = %self.session.counterparty, error = %error, "Notarisation rejected");
                NotarisationResponse::Rejected(error)
            }
        };
        ctx.send(&self.session, &response).await
    }
}
