use channel_commitment::{ProtocolCommitment, SetupCommitment};
use channel_types::{AssetType, NetworkContext};

use crate::error::{MachineError, ValidationError};
use crate::model::{ChannelState, ChannelStates};
use crate::proposer::StateProposal;
use crate::protocol::SetupParams;

/// A new channel with a zero ETH free balance for both parties.
pub fn propose(
    params: &SetupParams,
    channels: &ChannelStates,
    network: &NetworkContext,
) -> Result<StateProposal, MachineError> {
    if params.initiator == params.responder {
        return Err(ValidationError::IdenticalParticipants(params.initiator).into());
    }
    if channels.contains_key(&params.multisig_address) {
        return Err(ValidationError::ChannelExists(params.multisig_address).into());
    }

    let channel = ChannelState::new(
        params.multisig_address,
        vec![params.initiator, params.responder],
    );
    let free_balance = channel.free_balance(AssetType::Eth)?;
    let commitment = SetupCommitment::new(
        network,
        channel.multisig_address,
        channel.multisig_owners.clone(),
        free_balance
            .identity(channel.multisig_address, &channel.multisig_owners, network)
            .hash(),
        &free_balance.terms(),
    );

    Ok(StateProposal::single(
        channel,
        ProtocolCommitment::Setup(commitment),
    ))
}
