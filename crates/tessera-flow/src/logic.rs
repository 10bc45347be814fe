//! The flow trait

use async_trait::async_trait;

use crate::context::FlowContext;
use crate::error::{FlowError, FlowFailure};

/// One protocol role, run as a suspendable task by the flow runtime
///
/// A flow is started from a value of its type. On restart the runtime
/// rebuilds that value from the checkpoint and calls [`FlowLogic::call`]
/// again, so `call` must be deterministic given the messages it receives.
#[async_trait]
pub trait FlowLogic: Send + 'static {
    /// Stable name, used to find the flow again when restoring checkpoints
    const NAME: &'static str;

    /// Protocol name announced when this flow opens sessions; `None` for
    /// flows that never initiate
    const INITIATING: Option<&'static str> = None;

    /// Successful result
    type Output: Send + 'static;

    /// Failure type; runtime errors convert into it
    type Error: From<FlowError> + FlowFailure + Send + 'static;

    /// Run the protocol
    async fn call(&mut self, ctx: &mut FlowContext) -> Result<Self::Output, Self::Error>;
}
