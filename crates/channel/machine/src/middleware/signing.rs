use std::sync::Arc;

use async_trait::async_trait;
use channel_commitment::EthereumCommitment;
use tracing::debug;

use crate::error::MachineError;
use crate::middleware::{HandlerContext, ResultsPatch};
use crate::traits::{Middleware, Signer};

/// Built-in `OP_SIGN` step: stage the commitment of the channel shared with
/// the next message's recipient.
#[derive(Debug, Clone, Copy, Default)]
pub struct OperationMiddleware;

#[async_trait]
impl Middleware for OperationMiddleware {
    fn name(&self) -> &str {
        "op_sign_select"
    }

    async fn handle(&self, ctx: &HandlerContext<'_>) -> Result<ResultsPatch, MachineError> {
        let route = ctx.route()?;
        let commitment = ctx
            .proposal()?
            .commitment_for(&route.multisig)
            .cloned()
            .ok_or(MachineError::NoActiveCommitment(route.multisig))?;
        Ok(ResultsPatch::none().operation(commitment))
    }
}

/// `OP_SIGN` adapter over a [`Signer`]: signs the staged commitment with
/// this party's key for it (an app key for state updates, the owner key
/// otherwise).
pub struct SignMiddleware {
    signer: Arc<dyn Signer>,
}

impl SignMiddleware {
    pub fn new(signer: Arc<dyn Signer>) -> Self {
        Self { signer }
    }
}

#[async_trait]
impl Middleware for SignMiddleware {
    fn name(&self) -> &str {
        "op_sign"
    }

    async fn handle(&self, ctx: &HandlerContext<'_>) -> Result<ResultsPatch, MachineError> {
        let operation = ctx.results.operation.as_ref().ok_or(
            MachineError::NoActiveCommitment(ctx.message.client_message.multisig_address),
        )?;
        let key = ctx.proposal()?.signing_key_of(&ctx.message.self_address);
        let digest = operation.hash_to_sign();
        let signature = self.signer.sign(&key, &digest).await?;
        debug!(
            commitment = operation.kind(),
            key = %key,
            digest = %digest,
            "Commitment signed"
        );
        Ok(ResultsPatch::none().signature(signature))
    }
}

/// `KEY_GENERATE` adapter: derive an ephemeral app key.
pub struct KeyGenerateMiddleware {
    signer: Arc<dyn Signer>,
}

impl KeyGenerateMiddleware {
    pub fn new(signer: Arc<dyn Signer>) -> Self {
        Self { signer }
    }
}

#[async_trait]
impl Middleware for KeyGenerateMiddleware {
    fn name(&self) -> &str {
        "key_generate"
    }

    async fn handle(&self, _ctx: &HandlerContext<'_>) -> Result<ResultsPatch, MachineError> {
        let key = self.signer.generate_key().await?;
        debug!(key = %key, "App signing key generated");
        Ok(ResultsPatch::none().app_signing_key(key))
    }
}
