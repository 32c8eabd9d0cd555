use async_trait::async_trait;
use channel_types::{recover_address, Address, Signature, B256};
use uuid::Uuid;

use crate::error::{MachineError, PersistenceError, TransportError};
use crate::executor::Response;
use crate::middleware::{HandlerContext, ResultsPatch};
use crate::model::{ChannelState, ChannelStates};
use crate::protocol::{AppInstanceProposal, ClientActionMessage};

/// Middleware: one handler registered against an opcode.
///
/// Handlers for an opcode run in registration order. Each sees the results
/// left by the handlers before it and returns the fields it contributes.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    async fn handle(&self, ctx: &HandlerContext<'_>) -> Result<ResultsPatch, MachineError>;
}

/// Access to this party's private keys.
///
/// Local key, hardware wallet or remote signer: the executor only ever sees
/// addresses and signatures.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Address of the owner key.
    fn address(&self) -> Address;

    /// Derive a fresh app signing key and return its address.
    async fn generate_key(&self) -> Result<Address, MachineError>;

    /// Sign `digest` with the key whose address is `key`.
    async fn sign(&self, key: &Address, digest: &B256) -> Result<Signature, MachineError>;
}

/// Correlates an inbound reply with the run waiting for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageKey {
    pub request_id: Uuid,
    pub from_address: Address,
}

/// Message delivery between parties.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_message(&self, message: ClientActionMessage) -> Result<(), TransportError>;

    /// Suspend until a message matching `key` arrives. No timeout is applied.
    async fn wait_for(&self, key: MessageKey) -> Result<ClientActionMessage, TransportError>;
}

/// Recovers the address that produced a signature.
pub trait SignatureValidator: Send + Sync {
    fn recover(&self, digest: &B256, signature: &Signature) -> Result<Address, MachineError>;
}

/// secp256k1 public-key recovery.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecoveringValidator;

impl SignatureValidator for RecoveringValidator {
    fn recover(&self, digest: &B256, signature: &Signature) -> Result<Address, MachineError> {
        Ok(recover_address(digest, signature)?)
    }
}

/// Receives the terminal status of every run.
#[async_trait]
pub trait ResponseSink: Send + Sync {
    async fn send_response(&self, response: Response);
}

/// Durable mirror of the executor's channel map.
#[async_trait]
pub trait StateChannelPersistence: Send + Sync {
    async fn save_state_channel(&self, channel: &ChannelState) -> Result<(), PersistenceError>;

    async fn get_all_channels(&self) -> Result<ChannelStates, PersistenceError>;

    async fn get_app_instance_proposal(
        &self,
        id: &B256,
    ) -> Result<AppInstanceProposal, PersistenceError>;
}
