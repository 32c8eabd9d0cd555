use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{MachineError, TransportError};
use crate::middleware::{HandlerContext, ResultsPatch};
use crate::protocol::{Protocol, ProtocolParams, Role};
use crate::traits::{MessageKey, Middleware, Transport};

/// `IO_PREPARE_SEND`: build the next outbound message from the latest one.
///
/// The clone is re-addressed from this party to the route's peer and channel,
/// its seq is one past the last message exchanged with that peer and it
/// carries this party's latest signature. The
/// opening install message goes unsigned, since the app keys are still being
/// exchanged. A generated app key is written into this party's install slot.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrepareSendMiddleware;

#[async_trait]
impl Middleware for PrepareSendMiddleware {
    fn name(&self) -> &str {
        "io_prepare_send"
    }

    async fn handle(&self, ctx: &HandlerContext<'_>) -> Result<ResultsPatch, MachineError> {
        let base = ctx.base_message();
        let route = ctx.route()?;
        let me = ctx.message.self_address;

        let mut outbound = base.clone();
        outbound.from_address = me;
        outbound.to_address = route.to;
        outbound.multisig_address = route.multisig;
        // the intermediary's answer to the initiator continues the opening exchange
        let prior = match (ctx.message.role, &ctx.results.inbox) {
            (Role::Intermediary, Some(_)) => ctx.message.client_message.seq,
            _ => base.seq,
        };
        outbound.seq = prior + 1;
        outbound.signature = if outbound.action == Protocol::Install && base.seq == 0 {
            None
        } else {
            ctx.results.signature
        };
        if let (ProtocolParams::Install(install), Some(key)) =
            (&mut outbound.data, ctx.results.app_signing_key)
        {
            if install.initiator == me {
                install.initiator_signing_key = Some(key);
            } else if install.responder == me {
                install.responder_signing_key = Some(key);
            }
        }

        Ok(ResultsPatch::none().outbox(outbound))
    }
}

/// `IO_SEND` adapter: hand the prepared message to the transport.
pub struct TransportSendMiddleware {
    transport: Arc<dyn Transport>,
}

impl TransportSendMiddleware {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl Middleware for TransportSendMiddleware {
    fn name(&self) -> &str {
        "io_send"
    }

    async fn handle(&self, ctx: &HandlerContext<'_>) -> Result<ResultsPatch, MachineError> {
        let outbound = ctx
            .results
            .outbox
            .clone()
            .ok_or_else(|| TransportError::Malformed("no message prepared".into()))?;
        debug!(
            request_id = %outbound.request_id,
            to = %outbound.to_address,
            seq = outbound.seq,
            "Sending protocol message"
        );
        self.transport.send_message(outbound).await?;
        Ok(ResultsPatch::none())
    }
}

/// `IO_WAIT` adapter: suspend until the peer replies to the last message sent.
///
/// The reply must come from the address the message went to and carry the
/// next seq.
pub struct TransportWaitMiddleware {
    transport: Arc<dyn Transport>,
}

impl TransportWaitMiddleware {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl Middleware for TransportWaitMiddleware {
    fn name(&self) -> &str {
        "io_wait"
    }

    async fn handle(&self, ctx: &HandlerContext<'_>) -> Result<ResultsPatch, MachineError> {
        let sent = ctx
            .results
            .outbox
            .as_ref()
            .ok_or_else(|| TransportError::Malformed("waiting without a sent message".into()))?;
        let key = MessageKey {
            request_id: sent.request_id,
            from_address: sent.to_address,
        };
        let reply = self.transport.wait_for(key).await?;

        if reply.from_address != sent.to_address {
            return Err(TransportError::UnexpectedSender {
                expected: sent.to_address,
                actual: reply.from_address,
            }
            .into());
        }
        if reply.seq != sent.seq + 1 {
            return Err(TransportError::OutOfOrder {
                last_sent: sent.seq,
                received: reply.seq,
            }
            .into());
        }
        if reply.action != sent.action {
            return Err(TransportError::Malformed(format!(
                "expected {} reply, got {}",
                sent.action, reply.action
            ))
            .into());
        }
        debug!(
            request_id = %reply.request_id,
            from = %reply.from_address,
            seq = reply.seq,
            "Protocol message received"
        );
        Ok(ResultsPatch::none().inbox(reply))
    }
}
