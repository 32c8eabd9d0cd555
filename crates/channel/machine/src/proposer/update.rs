use channel_commitment::{ProtocolCommitment, SetStateCommitment};
use channel_types::keccak256;

use crate::error::{MachineError, ValidationError};
use crate::model::ChannelStates;
use crate::proposer::{ProposerContext, StateProposal};
use crate::protocol::UpdateParams;

/// Advance an app to `params.new_state` at the next nonce.
///
/// A registered app definition decides whether the current state is terminal
/// and whose turn it is; apps without one accept any update.
pub fn propose(
    params: &UpdateParams,
    channels: &ChannelStates,
    ctx: &ProposerContext<'_>,
) -> Result<StateProposal, MachineError> {
    let channel = channels
        .get(&ctx.multisig)
        .ok_or(ValidationError::ChannelNotFound(ctx.multisig))?;
    let app = channel.app(&params.app_identity_hash)?;

    if let Some(definition) = ctx.apps.get(&app.app_interface.addr) {
        let terminal = definition
            .is_state_terminal(&app.latest_state)
            .map_err(ValidationError::App)?;
        if terminal {
            return Err(ValidationError::TerminalState(app.identity_hash).into());
        }
        let turn_taker = definition
            .turn_taker(&app.latest_state, &app.participants)
            .map_err(ValidationError::App)?;
        if turn_taker != ctx.requested_by {
            return Err(ValidationError::NotTurnTaker {
                expected: turn_taker,
                actual: ctx.requested_by,
            }
            .into());
        }
    }

    let nonce = app.latest_nonce + 1;
    if let Some(version) = params.version_number {
        if version != nonce {
            return Err(ValidationError::StaleNonce {
                expected: nonce,
                actual: version,
            }
            .into());
        }
    }
    let timeout = params.timeout.unwrap_or(app.default_timeout);

    let commitment = SetStateCommitment::new(
        ctx.network,
        app.identity(),
        keccak256(&params.new_state),
        nonce,
        timeout,
    );
    let signing_keys = app.signing_keys.clone();
    let next = channel.update_app(
        &params.app_identity_hash,
        params.new_state.clone(),
        nonce,
        timeout,
    )?;

    let mut proposal = StateProposal::single(next, ProtocolCommitment::SetState(commitment));
    proposal.app_identity_hash = Some(params.app_identity_hash);
    proposal.signing_keys = signing_keys;
    Ok(proposal)
}
