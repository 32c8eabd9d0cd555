//! State transition proposers.
//!
//! One pure function per protocol: given the current channels and the
//! protocol parameters, compute the next snapshot of every channel the run
//! touches plus the commitment each channel's owners must sign. Nothing is
//! mutated here; the proposal only takes effect at `STATE_TRANSITION_COMMIT`.

pub mod install;
pub mod install_virtual;
pub mod setup;
pub mod uninstall;
pub mod update;

use std::collections::BTreeMap;

use channel_commitment::ProtocolCommitment;
use channel_types::{Address, NetworkContext, B256};
use tracing::debug;

use crate::apps::AppRegistry;
use crate::error::MachineError;
use crate::model::{ChannelState, ChannelStates};
use crate::protocol::ProtocolParams;

/// Candidate next state of every channel a run touches, plus the
/// commitments that enforce it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateProposal {
    pub state: ChannelStates,
    /// One commitment per channel whose owners must sign.
    pub commitments: BTreeMap<Address, ProtocolCommitment>,
    pub app_identity_hash: Option<B256>,
    /// Participant to delegated signing key, for commitments signed by app
    /// keys instead of owners.
    pub signing_keys: BTreeMap<Address, Address>,
}

impl StateProposal {
    /// Proposal touching a single channel.
    pub fn single(channel: ChannelState, commitment: ProtocolCommitment) -> Self {
        let multisig = channel.multisig_address;
        Self {
            state: [(multisig, channel)].into_iter().collect(),
            commitments: [(multisig, commitment)].into_iter().collect(),
            app_identity_hash: None,
            signing_keys: BTreeMap::new(),
        }
    }

    pub fn commitment_for(&self, multisig: &Address) -> Option<&ProtocolCommitment> {
        self.commitments.get(multisig)
    }

    pub fn signing_key_of(&self, participant: &Address) -> Address {
        self.signing_keys
            .get(participant)
            .copied()
            .unwrap_or(*participant)
    }
}

/// Inputs every proposer may consult besides the channels themselves.
#[derive(Debug, Clone, Copy)]
pub struct ProposerContext<'a> {
    pub network: &'a NetworkContext,
    pub apps: &'a AppRegistry,
    /// Party computing the proposal.
    pub self_address: Address,
    /// Party whose request started the run.
    pub requested_by: Address,
    /// Channel named by the request.
    pub multisig: Address,
}

/// Dispatch to the proposer for `params`.
pub fn propose(
    params: &ProtocolParams,
    channels: &ChannelStates,
    ctx: &ProposerContext<'_>,
) -> Result<StateProposal, MachineError> {
    let proposal = match params {
        ProtocolParams::Setup(p) => setup::propose(p, channels, ctx.network)?,
        ProtocolParams::Install(p) => install::propose(p, channels, ctx)?,
        ProtocolParams::Uninstall(p) => uninstall::propose(p, channels, ctx)?,
        ProtocolParams::Update(p) => update::propose(p, channels, ctx)?,
        ProtocolParams::InstallVirtualApp(p) => install_virtual::propose(p, channels, ctx)?,
    };
    debug!(
        protocol = %params.protocol(),
        channels = proposal.state.len(),
        app = ?proposal.app_identity_hash,
        "State transition proposed"
    );
    Ok(proposal)
}
