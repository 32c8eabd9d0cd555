use async_trait::async_trait;

use crate::error::MachineError;
use crate::middleware::{HandlerContext, ResultsPatch};
use crate::traits::Middleware;

/// `STATE_TRANSITION_COMMIT`: swap the proposed snapshots into the
/// executor's channel map. The only step that mutates channel state.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommitMiddleware;

#[async_trait]
impl Middleware for CommitMiddleware {
    fn name(&self) -> &str {
        "state_transition_commit"
    }

    async fn handle(&self, ctx: &HandlerContext<'_>) -> Result<ResultsPatch, MachineError> {
        let proposal = ctx.proposal()?;
        ctx.env.channels.apply(proposal.state.clone()).await?;
        Ok(ResultsPatch::none())
    }
}
