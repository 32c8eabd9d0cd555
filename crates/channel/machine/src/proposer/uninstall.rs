use std::collections::BTreeMap;

use channel_commitment::{ProtocolCommitment, UninstallCommitment};
use channel_types::{Address, U256};

use crate::error::{MachineError, ValidationError};
use crate::model::{AppInstance, ChannelStates};
use crate::proposer::{ProposerContext, StateProposal};
use crate::protocol::UninstallParams;

/// Remove an app and credit its resolved value back to the free balance.
///
/// With a registered app definition the payout is `resolve(latest_state)`,
/// settled against what was locked at install. Without one the original
/// deposits are returned.
pub fn propose(
    params: &UninstallParams,
    channels: &ChannelStates,
    ctx: &ProposerContext<'_>,
) -> Result<StateProposal, MachineError> {
    let channel = channels
        .get(&ctx.multisig)
        .ok_or(ValidationError::ChannelNotFound(ctx.multisig))?;
    let app = channel.app(&params.app_identity_hash)?;
    if app.is_virtual {
        return Err(ValidationError::VirtualUninstallUnsupported(app.identity_hash).into());
    }

    let payouts = match ctx.apps.get(&app.app_interface.addr) {
        Some(definition) => {
            let resolved = definition
                .resolve(&app.latest_state, &app.participants, &app.terms)
                .map_err(ValidationError::App)?;
            settle(app, resolved)?
        }
        None => app.deposits.clone(),
    };

    let next = channel.uninstall_app(&params.app_identity_hash, &payouts)?;
    let commitment = UninstallCommitment::new(
        ctx.network,
        next.multisig_address,
        next.multisig_owners.clone(),
        next.free_balance_update(app.terms.asset_type, ctx.network)?,
        &app.terms,
        &app.dependency_nonce,
    )
    .map_err(ValidationError::from)?;

    let mut proposal = StateProposal::single(next, ProtocolCommitment::Uninstall(commitment));
    proposal.app_identity_hash = Some(params.app_identity_hash);
    Ok(proposal)
}

/// Payout per participant for a resolution of `app`.
///
/// Only participants may be paid, and never more than was locked. Whatever
/// the resolution leaves unpaid goes back in proportion to each deposit; the
/// rounding remainder goes to the last depositor.
fn settle(
    app: &AppInstance,
    resolved: BTreeMap<Address, u128>,
) -> Result<BTreeMap<Address, u128>, ValidationError> {
    if let Some(stranger) = resolved.keys().find(|p| !app.participants.contains(p)) {
        return Err(ValidationError::PayoutToNonParticipant(*stranger));
    }
    let total = resolved
        .values()
        .try_fold(0u128, |acc, amount| acc.checked_add(*amount))
        .ok_or(ValidationError::AmountOverflow("resolution"))?;
    let locked = app.locked_value();
    if total > locked {
        return Err(ValidationError::ResolutionExceedsLocked {
            resolved: total,
            locked,
        });
    }

    let unpaid = locked - total;
    let mut payouts = resolved;
    if unpaid == 0 {
        return Ok(payouts);
    }
    let depositors: Vec<_> = app.deposits.iter().filter(|(_, d)| **d > 0).collect();
    let mut left = unpaid;
    for (index, (participant, deposit)) in depositors.iter().enumerate() {
        let share = if index + 1 == depositors.len() {
            left
        } else {
            let exact = U256::from(unpaid) * U256::from(**deposit) / U256::from(locked);
            u128::try_from(exact)
                .map_err(|_| ValidationError::AmountOverflow("refund share"))?
                .min(left)
        };
        left -= share;
        let paid = payouts.entry(**participant).or_insert(0);
        *paid = paid
            .checked_add(share)
            .ok_or(ValidationError::AmountOverflow("resolution"))?;
    }
    Ok(payouts)
}
