use std::collections::BTreeMap;

use channel_commitment::{InstallCommitment, ProtocolCommitment};

use crate::error::{MachineError, ValidationError};
use crate::model::{AppInstance, AppInstanceSpec, ChannelStates};
use crate::proposer::{ProposerContext, StateProposal};
use crate::protocol::InstallParams;

/// Move both deposits out of the free balance into a new app instance.
pub fn propose(
    params: &InstallParams,
    channels: &ChannelStates,
    ctx: &ProposerContext<'_>,
) -> Result<StateProposal, MachineError> {
    let channel = channels
        .get(&ctx.multisig)
        .ok_or(ValidationError::ChannelNotFound(ctx.multisig))?;
    if params.initiator == params.responder {
        return Err(ValidationError::IdenticalParticipants(params.initiator).into());
    }
    if !channel.has_owners(&params.initiator, &params.responder) {
        return Err(ValidationError::OwnerMismatch {
            expected: channel.multisig_owners.clone(),
            actual: vec![params.initiator, params.responder],
        }
        .into());
    }

    let deposit = params
        .initiator_deposit
        .checked_add(params.responder_deposit)
        .ok_or(ValidationError::AmountOverflow("app deposits"))?;
    if deposit > params.terms.limit {
        return Err(ValidationError::DepositExceedsLimit {
            deposit,
            limit: params.terms.limit,
        }
        .into());
    }

    let signing_keys: BTreeMap<_, _> = [
        (
            params.initiator,
            params.initiator_signing_key.unwrap_or(params.initiator),
        ),
        (
            params.responder,
            params.responder_signing_key.unwrap_or(params.responder),
        ),
    ]
    .into_iter()
    .collect();

    let app = AppInstance::new(AppInstanceSpec {
        multisig_address: channel.multisig_address,
        participants: vec![params.initiator, params.responder],
        signing_keys,
        app_interface: params.app_interface.clone(),
        terms: params.terms,
        default_timeout: params.default_timeout,
        is_virtual: false,
        app_sequence_number: channel.num_installed_apps + 1,
        root_nonce_value: channel.root_nonce + 1,
        initial_state: params.initial_state.clone(),
        deposits: [
            (params.initiator, params.initiator_deposit),
            (params.responder, params.responder_deposit),
        ]
        .into_iter()
        .collect(),
    });
    let identity_hash = app.identity_hash;
    let terms = app.terms;
    let dependency_nonce = app.dependency_nonce;

    let next = channel.install_app(app)?;
    let commitment = InstallCommitment::new(
        ctx.network,
        next.multisig_address,
        next.multisig_owners.clone(),
        next.free_balance_update(terms.asset_type, ctx.network)?,
        identity_hash,
        &terms,
        &dependency_nonce,
        next.root_nonce,
    )
    .map_err(ValidationError::from)?;

    let mut proposal = StateProposal::single(next, ProtocolCommitment::Install(commitment));
    proposal.app_identity_hash = Some(identity_hash);
    Ok(proposal)
}
