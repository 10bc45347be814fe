//! Confidential identity exchange
//!
//! Both parties mint a fresh anonymous key certified by their well-known
//! identity, swap the certificates and verify each other's. The initiator
//! sends first; the responder checks the initiator's identity before minting
//! its own.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tessera_core::{Party, VerifiedAnonymousIdentity};
use tessera_flow::{async_trait, FlowContext, FlowLogic, FlowRuntime, FlowSession};
use tracing::{debug, info, warn};

use crate::error::IdentityExchangeError;
use crate::service::IdentityService;

/// Session protocol of the exchange
pub const IDENTITY_EXCHANGE_PROTOCOL: &str = "tessera.identity-exchange";

/// Progress step while waiting for the counterparty's key
pub const AWAITING_KEY: &str = "AWAITING_KEY";

/// Recorded effect name for minting our anonymous identity
pub const FRESH_IDENTITY_EFFECT: &str = "fresh-identity";

/// Install `identities` and the exchange responder on `runtime`
pub fn install(runtime: &FlowRuntime, identities: Arc<dyn IdentityService>) {
    runtime
        .services()
        .register::<dyn IdentityService>(identities);
    runtime.register_responder(IDENTITY_EXCHANGE_PROTOCOL, IdentityExchangeResponder::new);
}

fn check_name(
    expected: &Party,
    identity: &VerifiedAnonymousIdentity,
) -> Result<(), IdentityExchangeError> {
    if identity.name == expected.name {
        return Ok(());
    }
    warn!(expected = %expected, actual = %identity.name, "Counterparty presented another party's identity");
    Err(IdentityExchangeError::IdentityMismatch {
        expected: expected.name.clone(),
        actual: identity.name.clone(),
    })
}

/// Mint our identity once; a restored flow gets the same one back
async fn mint(
    ctx: &mut FlowContext,
    identities: &dyn IdentityService,
    me: &Party,
) -> Result<VerifiedAnonymousIdentity, IdentityExchangeError> {
    ctx.record(FRESH_IDENTITY_EFFECT, async {
        Ok::<_, IdentityExchangeError>(identities.fresh_identity(me).await?)
    })
    .await
}

/// Swap fresh anonymous identities with `counterparty`
///
/// The result maps each well-known party to its new identity, ours first.
/// Exchanging with ourselves mints one identity and opens no session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityExchangeFlow {
    counterparty: Party,
}

impl IdentityExchangeFlow {
    /// Exchange with `counterparty`
    pub fn new(counterparty: Party) -> Self {
        Self { counterparty }
    }
}

#[async_trait]
impl FlowLogic for IdentityExchangeFlow {
    const NAME: &'static str = "tessera.identity.exchange";
    const INITIATING: Option<&'static str> = Some(IDENTITY_EXCHANGE_PROTOCOL);
    type Output = IndexMap<Party, VerifiedAnonymousIdentity>;
    type Error = IdentityExchangeError;

    async fn call(
        &mut self,
        ctx: &mut FlowContext,
    ) -> Result<IndexMap<Party, VerifiedAnonymousIdentity>, IdentityExchangeError> {
        ctx.progress(AWAITING_KEY);
        let identities = ctx.services().require::<dyn IdentityService>()?;
        let me = ctx.our_identity().clone();
        let ours = mint(ctx, identities.as_ref(), &me).await?;

        let mut exchanged = IndexMap::with_capacity(2);
        if self.counterparty == me {
            debug!(party = %me, "Identity exchange with self");
            exchanged.insert(me, ours);
            return Ok(exchanged);
        }

        let session = ctx.initiate(&self.counterparty)?;
        let timeout = ctx.default_receive_timeout();
        let theirs: VerifiedAnonymousIdentity =
            ctx.send_and_receive(&session, &ours, timeout).await?;
        check_name(&self.counterparty, &theirs)?;
        identities.register_verified(&theirs, &self.counterparty)?;
        info!(counterparty = %self.counterparty, "Confidential identities exchanged");

        exchanged.insert(me, ours);
        exchanged.insert(self.counterparty.clone(), theirs);
        Ok(exchanged)
    }
}

/// Responder side of [`IdentityExchangeFlow`]
#[derive(Debug, Clone)]
pub struct IdentityExchangeResponder {
    session: FlowSession,
}

impl IdentityExchangeResponder {
    /// Answer the exchange arriving on `session`
    pub fn new(session: FlowSession) -> Self {
        Self { session }
    }
}

#[async_trait]
impl FlowLogic for IdentityExchangeResponder {
    const NAME: &'static str = "tessera.identity.exchange-responder";
    type Output = ();
    type Error = IdentityExchangeError;

    async fn call(&mut self, ctx: &mut FlowContext) -> Result<(), IdentityExchangeError> {
        ctx.progress(AWAITING_KEY);
        let identities = ctx.services().require::<dyn IdentityService>()?;
        let timeout = ctx.default_receive_timeout();
        let theirs: VerifiedAnonymousIdentity = ctx.receive(&self.session, timeout).await?;
        check_name(&self.session.counterparty, &theirs)?;
        identities.register_verified(&theirs, &self.session.counterparty)?;

        let me = ctx.our_identity().clone();
        let ours = mint(ctx, identities.as_ref(), &me).await?;
        ctx.send(&self.session, &ours).await?;
        debug!(counterparty = %self.session.counterparty, "Anonymous identity sent");
        Ok(())
    }
}
