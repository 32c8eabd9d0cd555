use async_trait::async_trait;

use crate::error::MachineError;
use crate::middleware::{HandlerContext, ResultsPatch};
use crate::proposer::{self, ProposerContext, StateProposal};
use crate::protocol::ProtocolParams;
use crate::traits::Middleware;

/// Parameters the proposer sees: those of the latest message, with this
/// party's freshly generated app key filled into its install slot.
fn effective_params(ctx: &HandlerContext<'_>) -> ProtocolParams {
    let mut params = ctx.base_message().data.clone();
    if let (ProtocolParams::Install(install), Some(key)) =
        (&mut params, ctx.results.app_signing_key)
    {
        let me = ctx.message.self_address;
        if me == install.initiator && install.initiator_signing_key.is_none() {
            install.initiator_signing_key = Some(key);
        } else if me == install.responder && install.responder_signing_key.is_none() {
            install.responder_signing_key = Some(key);
        }
    }
    params
}

async fn build_proposal(ctx: &HandlerContext<'_>) -> Result<StateProposal, MachineError> {
    let params = effective_params(ctx);
    let channels = ctx.env.channels.snapshot().await;
    let client = &ctx.message.client_message;
    let proposer_ctx = ProposerContext {
        network: &ctx.env.network,
        apps: &ctx.env.apps,
        self_address: ctx.message.self_address,
        requested_by: client.from_address,
        multisig: client.multisig_address,
    };
    proposer::propose(&params, &channels, &proposer_ctx)
}

/// `STATE_TRANSITION_PROPOSE`: always recompute the proposal.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProposeMiddleware;

#[async_trait]
impl Middleware for ProposeMiddleware {
    fn name(&self) -> &str {
        "state_transition_propose"
    }

    async fn handle(&self, ctx: &HandlerContext<'_>) -> Result<ResultsPatch, MachineError> {
        Ok(ResultsPatch::none().proposal(build_proposal(ctx).await?))
    }
}

/// `OP_GENERATE`: propose unless a proposal already exists, then stage the
/// commitment of the requested channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenerateMiddleware;

#[async_trait]
impl Middleware for GenerateMiddleware {
    fn name(&self) -> &str {
        "op_generate"
    }

    async fn handle(&self, ctx: &HandlerContext<'_>) -> Result<ResultsPatch, MachineError> {
        let multisig = ctx.message.client_message.multisig_address;
        let mut patch = ResultsPatch::none();
        let proposal: &StateProposal = match &ctx.results.proposal {
            Some(existing) => existing,
            None => patch.proposal.insert(build_proposal(ctx).await?),
        };
        let commitment = proposal
            .commitment_for(&multisig)
            .cloned()
            .ok_or(MachineError::NoActiveCommitment(multisig))?;
        Ok(patch.operation(commitment))
    }
}
