use std::collections::BTreeMap;

use channel_commitment::{
    ProtocolCommitment, VirtualAppAgreement as AgreementTerms, VirtualAppAgreementCommitment,
};
use channel_types::{Address, AssetType, DependencyNonce, Terms};

use crate::error::{MachineError, ValidationError};
use crate::model::{
    channel_between, virtual_channel_address, AppInstance, AppInstanceSpec, ChannelState,
    ChannelStates, VirtualAgreement,
};
use crate::proposer::{ProposerContext, StateProposal};
use crate::protocol::InstallVirtualAppParams;

/// Install an app between two parties without a shared channel.
///
/// The intermediary shares a channel with each of them. In each of those
/// legs the capital is locked against the target app's identity: in the
/// initiator's leg by initiator and intermediary, in the responder's leg by
/// intermediary and responder. Only legs this party owns are proposed. The
/// initiator and responder also record the app in their virtual channel.
pub fn propose(
    params: &InstallVirtualAppParams,
    channels: &ChannelStates,
    ctx: &ProposerContext<'_>,
) -> Result<StateProposal, MachineError> {
    if params.initiator_deposit_token != params.responder_deposit_token {
        return Err(ValidationError::TokenMismatch {
            initiator: params.initiator_deposit_token,
            responder: params.responder_deposit_token,
        }
        .into());
    }

    let (initiator, responder, intermediary) =
        (params.initiator, params.responder, params.intermediary);
    if initiator == responder || initiator == intermediary {
        return Err(ValidationError::IdenticalParticipants(initiator).into());
    }
    if responder == intermediary {
        return Err(ValidationError::IdenticalParticipants(responder).into());
    }
    let token = params.initiator_deposit_token;
    let capital = params
        .initiator_deposit
        .checked_add(params.responder_deposit)
        .ok_or(ValidationError::AmountOverflow("virtual app capital"))?;
    let asset_type = if token.is_zero() {
        AssetType::Eth
    } else {
        AssetType::Erc20
    };
    let terms = Terms::new(asset_type, capital, token);

    let virtual_address = virtual_channel_address(&initiator, &responder, &intermediary);
    let virtual_channel = channels
        .get(&virtual_address)
        .cloned()
        .unwrap_or_else(|| ChannelState::new_virtual(virtual_address, vec![initiator, responder]));

    let target = AppInstance::new(AppInstanceSpec {
        multisig_address: virtual_address,
        participants: vec![initiator, responder],
        signing_keys: [(initiator, initiator), (responder, responder)]
            .into_iter()
            .collect(),
        app_interface: params.app_interface.clone(),
        terms,
        default_timeout: params.default_timeout,
        is_virtual: true,
        app_sequence_number: virtual_channel.num_installed_apps + 1,
        root_nonce_value: virtual_channel.root_nonce + 1,
        initial_state: params.initial_state.clone(),
        deposits: [
            (initiator, params.initiator_deposit),
            (responder, params.responder_deposit),
        ]
        .into_iter()
        .collect(),
    });
    let target_hash = target.identity_hash;

    let legs = [
        (
            initiator,
            intermediary,
            [
                (initiator, params.initiator_deposit),
                (intermediary, params.responder_deposit),
            ],
        ),
        (
            intermediary,
            responder,
            [
                (intermediary, params.initiator_deposit),
                (responder, params.responder_deposit),
            ],
        ),
    ];

    let mut proposal = StateProposal {
        app_identity_hash: Some(target_hash),
        ..StateProposal::default()
    };
    for (a, b, deposits) in legs {
        if ctx.self_address != a && ctx.self_address != b {
            continue;
        }
        let channel =
            channel_between(channels, &a, &b).ok_or(ValidationError::NoChannelBetween(a, b))?;
        let dependency_nonce = DependencyNonce::new(channel.num_installed_apps + 1);
        let root_nonce_value = channel.root_nonce + 1;
        let locked = VirtualAgreement {
            target_app_identity_hash: target_hash,
            capital,
            beneficiaries: vec![initiator, responder],
            expiry: params.expiry,
            terms,
            dependency_nonce,
            root_nonce_value,
            deposits: deposits.into_iter().collect::<BTreeMap<_, _>>(),
        };

        let next = channel.lock_virtual(locked)?;
        let commitment = VirtualAppAgreementCommitment::new(
            ctx.network,
            next.multisig_address,
            next.multisig_owners.clone(),
            next.free_balance_update(asset_type, ctx.network)?,
            AgreementTerms {
                target_app_identity_hash: target_hash,
                capital,
                beneficiaries: vec![initiator, responder],
                expiry: params.expiry,
                uninstall_key: dependency_nonce.uninstall_key(&next.multisig_address),
                root_nonce_value,
                terms,
            },
            params.initiator_deposit_token,
            params.responder_deposit_token,
        )
        .map_err(ValidationError::from)?;

        proposal.commitments.insert(
            next.multisig_address,
            ProtocolCommitment::VirtualAppAgreement(commitment),
        );
        proposal.state.insert(next.multisig_address, next);
    }

    if ctx.self_address == initiator || ctx.self_address == responder {
        let next = virtual_channel.add_virtual_app(target)?;
        proposal.state.insert(virtual_address, next);
    }
    Ok(proposal)
}
