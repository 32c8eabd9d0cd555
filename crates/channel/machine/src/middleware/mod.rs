//! Middleware pipeline: ordered handlers per opcode.
//!
//! The built-in handlers cover the mechanics every protocol shares (propose,
//! pick the commitment to sign, validate the peer's signature, prepare the
//! outbound message, commit). Anything that needs a real key or a real
//! network is contributed by collaborators through [`MiddlewarePipeline::register`];
//! see [`signing`] and [`io`] for the adapters over [`Signer`](crate::traits::Signer)
//! and [`Transport`](crate::traits::Transport).

pub mod commit;
pub mod context;
pub mod generate;
pub mod io;
pub mod signing;
pub mod validate;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::MachineError;
use crate::protocol::Opcode;
use crate::traits::{Middleware, SignatureValidator};

pub use commit::CommitMiddleware;
pub use context::{
    ChannelStore, ExecutionEnv, HandlerContext, IntermediateResults, InternalMessage,
    ResultsPatch, Route,
};
pub use generate::{GenerateMiddleware, ProposeMiddleware};
pub use io::{PrepareSendMiddleware, TransportSendMiddleware, TransportWaitMiddleware};
pub use signing::{KeyGenerateMiddleware, OperationMiddleware, SignMiddleware};
pub use validate::ValidateMiddleware;

/// Handlers registered per opcode, run in registration order.
#[derive(Default)]
pub struct MiddlewarePipeline {
    handlers: HashMap<Opcode, Vec<Arc<dyn Middleware>>>,
}

impl MiddlewarePipeline {
    /// Empty pipeline: every opcode is a no-op.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pipeline with the built-in handlers installed.
    pub fn with_builtins(validator: Arc<dyn SignatureValidator>) -> Self {
        let mut pipeline = Self::new();
        pipeline.register(Opcode::StateTransitionPropose, Arc::new(ProposeMiddleware));
        pipeline.register(Opcode::OpGenerate, Arc::new(GenerateMiddleware));
        pipeline.register(Opcode::OpSign, Arc::new(OperationMiddleware));
        pipeline.register(
            Opcode::OpSignValidate,
            Arc::new(ValidateMiddleware::new(validator)),
        );
        pipeline.register(Opcode::IoPrepareSend, Arc::new(PrepareSendMiddleware));
        pipeline.register(Opcode::StateTransitionCommit, Arc::new(CommitMiddleware));
        pipeline
    }

    /// Append `handler` to the handlers of `opcode`.
    pub fn register(&mut self, opcode: Opcode, handler: Arc<dyn Middleware>) {
        debug!(opcode = ?opcode, handler = handler.name(), "Middleware registered");
        self.handlers.entry(opcode).or_default().push(handler);
    }

    pub fn handler_count(&self, opcode: Opcode) -> usize {
        self.handlers.get(&opcode).map_or(0, Vec::len)
    }

    /// Run every handler of `message.opcode` over `results`.
    ///
    /// Each handler sees the results as merged so far; a field it sets
    /// replaces the earlier value. The first failure aborts the step.
    pub async fn run(
        &self,
        message: &InternalMessage,
        mut results: IntermediateResults,
        env: &ExecutionEnv,
    ) -> Result<IntermediateResults, MachineError> {
        let Some(handlers) = self.handlers.get(&message.opcode) else {
            debug!(opcode = ?message.opcode, "No handlers registered");
            return Ok(results);
        };
        for handler in handlers {
            let patch = {
                let ctx = HandlerContext {
                    message,
                    results: &results,
                    env,
                };
                handler.handle(&ctx).await?
            };
            debug!(opcode = ?message.opcode, handler = handler.name(), "Handler applied");
            results = results.apply(patch);
        }
        Ok(results)
    }
}

impl std::fmt::Debug for MiddlewarePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut counts: Vec<_> = self
            .handlers
            .iter()
            .map(|(opcode, handlers)| (*opcode, handlers.len()))
            .collect();
        counts.sort();
        f.debug_struct("MiddlewarePipeline")
            .field("handlers", &counts)
            .finish()
    }
}
