use std::sync::Arc;

use channel_commitment::ProtocolCommitment;
use channel_types::{Address, NetworkContext, Signature};
use tokio::sync::RwLock;
use tracing::info;

use crate::apps::AppRegistry;
use crate::error::{MachineError, ValidationError};
use crate::model::{channel_between, ChannelState, ChannelStates};
use crate::proposer::StateProposal;
use crate::protocol::{ClientActionMessage, Opcode, Protocol, ProtocolParams, Role};

/// Per-run state threaded through the opcode sequence.
#[derive(Debug, Clone, Default)]
pub struct IntermediateResults {
    /// Last message prepared for sending.
    pub outbox: Option<ClientActionMessage>,
    /// Last message received from the peer.
    pub inbox: Option<ClientActionMessage>,
    pub proposal: Option<StateProposal>,
    /// Commitment currently being signed.
    pub operation: Option<ProtocolCommitment>,
    /// This party's latest signature.
    pub signature: Option<Signature>,
    /// Ephemeral app key from `KEY_GENERATE`.
    pub app_signing_key: Option<Address>,
}

impl IntermediateResults {
    /// Merge a handler's contribution. A field set in `patch` replaces the
    /// current value; unset fields are left alone.
    pub fn apply(mut self, patch: ResultsPatch) -> Self {
        if patch.outbox.is_some() {
            self.outbox = patch.outbox;
        }
        if patch.inbox.is_some() {
            self.inbox = patch.inbox;
        }
        if patch.proposal.is_some() {
            self.proposal = patch.proposal;
        }
        if patch.operation.is_some() {
            self.operation = patch.operation;
        }
        if patch.signature.is_some() {
            self.signature = patch.signature;
        }
        if patch.app_signing_key.is_some() {
            self.app_signing_key = patch.app_signing_key;
        }
        self
    }
}

/// Fields a handler contributes to [`IntermediateResults`].
#[derive(Debug, Clone, Default)]
pub struct ResultsPatch {
    pub outbox: Option<ClientActionMessage>,
    pub inbox: Option<ClientActionMessage>,
    pub proposal: Option<StateProposal>,
    pub operation: Option<ProtocolCommitment>,
    pub signature: Option<Signature>,
    pub app_signing_key: Option<Address>,
}

impl ResultsPatch {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn outbox(mut self, message: ClientActionMessage) -> Self {
        self.outbox = Some(message);
        self
    }

    pub fn inbox(mut self, message: ClientActionMessage) -> Self {
        self.inbox = Some(message);
        self
    }

    pub fn proposal(mut self, proposal: StateProposal) -> Self {
        self.proposal = Some(proposal);
        self
    }

    pub fn operation(mut self, commitment: ProtocolCommitment) -> Self {
        self.operation = Some(commitment);
        self
    }

    pub fn signature(mut self, signature: Signature) -> Self {
        self.signature = Some(signature);
        self
    }

    pub fn app_signing_key(mut self, key: Address) -> Self {
        self.app_signing_key = Some(key);
        self
    }
}

/// Authoritative channel map shared by the executor and its commit handler.
#[derive(Debug, Clone, Default)]
pub struct ChannelStore {
    inner: Arc<RwLock<ChannelStates>>,
}

impl ChannelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> ChannelStates {
        self.inner.read().await.clone()
    }

    pub async fn get(&self, multisig: &Address) -> Option<ChannelState> {
        self.inner.read().await.get(multisig).cloned()
    }

    /// Swap in new snapshots for every channel in `next`. Either all are
    /// applied or none: a root nonce may never decrease.
    pub async fn apply(&self, next: ChannelStates) -> Result<(), ValidationError> {
        let mut channels = self.inner.write().await;
        for (multisig, proposed) in &next {
            if let Some(current) = channels.get(multisig) {
                if proposed.root_nonce < current.root_nonce {
                    return Err(ValidationError::StaleRootNonce {
                        multisig: *multisig,
                        current: current.root_nonce,
                        proposed: proposed.root_nonce,
                    });
                }
            }
        }
        for (multisig, proposed) in next {
            info!(
                multisig = %multisig,
                root_nonce = proposed.root_nonce,
                apps = proposed.app_instances.len(),
                "Channel state committed"
            );
            channels.insert(multisig, proposed);
        }
        Ok(())
    }
}

/// Shared collaborators every handler can reach.
#[derive(Debug, Clone)]
pub struct ExecutionEnv {
    pub channels: ChannelStore,
    pub network: NetworkContext,
    pub apps: AppRegistry,
}

/// What the pipeline is asked to process for one opcode step.
#[derive(Debug, Clone)]
pub struct InternalMessage {
    pub protocol: Protocol,
    pub opcode: Opcode,
    pub role: Role,
    /// Address of the party running this execution.
    pub self_address: Address,
    /// The request that started the run: the outgoing request on the
    /// initiating side, the first inbound message on the others.
    pub client_message: ClientActionMessage,
}

/// Where the next outgoing message goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub to: Address,
    pub multisig: Address,
}

/// Borrowed view handed to each handler.
pub struct HandlerContext<'a> {
    pub message: &'a InternalMessage,
    pub results: &'a IntermediateResults,
    pub env: &'a ExecutionEnv,
}

impl<'a> HandlerContext<'a> {
    /// Most recent message received, or the initial request on the
    /// acknowledging sides.
    pub fn last_received(&self) -> Option<&'a ClientActionMessage> {
        let results: &'a IntermediateResults = self.results;
        let message: &'a InternalMessage = self.message;
        match (&results.inbox, message.role) {
            (Some(inbox), _) => Some(inbox),
            (None, Role::Initiator) => None,
            (None, _) => Some(&message.client_message),
        }
    }

    /// Message the next outbound one is cloned from.
    pub fn base_message(&self) -> &'a ClientActionMessage {
        let message: &'a InternalMessage = self.message;
        self.last_received().unwrap_or(&message.client_message)
    }

    pub fn proposal(&self) -> Result<&'a StateProposal, MachineError> {
        let results: &'a IntermediateResults = self.results;
        results.proposal.as_ref().ok_or(MachineError::NoProposal)
    }

    /// Peer and channel of the next outgoing message.
    pub fn route(&self) -> Result<Route, MachineError> {
        let client = &self.message.client_message;
        match (self.message.role, &self.results.inbox) {
            (Role::Initiator, None) => Ok(Route {
                to: client.to_address,
                multisig: client.multisig_address,
            }),
            (Role::Intermediary, None) => {
                let responder = match &client.data {
                    ProtocolParams::InstallVirtualApp(p) => p.responder,
                    _ => {
                        return Err(MachineError::ParamsMismatch {
                            protocol: self.message.protocol,
                        })
                    }
                };
                let me = self.message.self_address;
                let channels = &self.proposal()?.state;
                let multisig = channel_between(channels, &me, &responder)
                    .map(|ch| ch.multisig_address)
                    .ok_or(ValidationError::NoChannelBetween(me, responder))?;
                Ok(Route {
                    to: responder,
                    multisig,
                })
            }
            (Role::Intermediary, Some(_)) => Ok(Route {
                to: client.from_address,
                multisig: client.multisig_address,
            }),
            (_, _) => {
                let last = self.base_message();
                Ok(Route {
                    to: last.from_address,
                    multisig: last.multisig_address,
                })
            }
        }
    }
}
