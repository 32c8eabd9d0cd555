use std::collections::BTreeMap;

use alloy_sol_types::SolValue;
use channel_commitment::FreeBalanceUpdate;
use channel_types::{
    keccak256, Address, AppIdentity, AppInterface, AssetType, NetworkContext, Terms, B256, U256,
};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Dispute timeout of every free-balance app, in blocks.
pub const FREE_BALANCE_TIMEOUT: u64 = 100;

/// Unencumbered per-participant balance of one asset in a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreeBalance {
    pub asset_type: AssetType,
    pub balances: BTreeMap<Address, u128>,
    /// Total ever deposited for this asset.
    pub deposited: u128,
    pub nonce: u64,
    pub timeout: u64,
}

impl FreeBalance {
    /// Zero balance for each owner.
    pub fn new(asset_type: AssetType, owners: &[Address]) -> Self {
        Self {
            asset_type,
            balances: owners.iter().map(|o| (*o, 0)).collect(),
            deposited: 0,
            nonce: 0,
            timeout: FREE_BALANCE_TIMEOUT,
        }
    }

    pub fn balance_of(&self, participant: &Address) -> u128 {
        self.balances.get(participant).copied().unwrap_or(0)
    }

    /// Saturates at `u128::MAX`, which always exceeds what was deposited.
    pub fn total(&self) -> u128 {
        self.balances
            .values()
            .fold(0u128, |acc, amount| acc.saturating_add(*amount))
    }

    pub fn terms(&self) -> Terms {
        Terms::new(self.asset_type, u128::MAX, Address::ZERO)
    }

    pub fn identity(&self, multisig: Address, owners: &[Address], network: &NetworkContext) -> AppIdentity {
        AppIdentity::new(
            multisig,
            owners.to_vec(),
            AppInterface::free_balance(network).hash(),
            self.terms().hash(),
            self.timeout,
        )
    }

    /// Encoded `(address[],uint256[])` state.
    pub fn encoded_state(&self) -> Vec<u8> {
        let owners: Vec<Address> = self.balances.keys().copied().collect();
        let amounts: Vec<U256> = self.balances.values().map(|v| U256::from(*v)).collect();
        (owners, amounts).abi_encode_params()
    }

    pub fn state_hash(&self) -> B256 {
        keccak256(&self.encoded_state())
    }

    /// What a multisig commitment writes on-chain for this balance.
    pub fn update(&self, multisig: Address, owners: &[Address], network: &NetworkContext) -> FreeBalanceUpdate {
        FreeBalanceUpdate {
            identity_hash: self.identity(multisig, owners, network).hash(),
            state_hash: self.state_hash(),
            nonce: self.nonce,
            timeout: self.timeout,
            terms: self.terms(),
        }
    }

    pub(crate) fn debit(&mut self, participant: Address, amount: u128) -> Result<(), ValidationError> {
        let available = self.balance_of(&participant);
        if available < amount {
            return Err(ValidationError::InsufficientBalance {
                participant,
                available,
                required: amount,
            });
        }
        self.balances.insert(participant, available - amount);
        Ok(())
    }

    pub(crate) fn credit(&mut self, participant: Address, amount: u128) -> Result<(), ValidationError> {
        let balance = self.balances.entry(participant).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or(ValidationError::AmountOverflow("free balance"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debit_never_goes_negative() {
        let a = Address::new([1; 20]);
        let mut fb = FreeBalance::new(AssetType::Eth, &[a]);
        fb.credit(a, 4).unwrap();
        assert!(fb.debit(a, 3).is_ok());
        assert_eq!(
            fb.debit(a, 2).unwrap_err(),
            ValidationError::InsufficientBalance {
                participant: a,
                available: 1,
                required: 2
            }
        );
        assert_eq!(fb.balance_of(&a), 1);
    }

    #[test]
    fn state_hash_tracks_balances() {
        let a = Address::new([1; 20]);
        let mut fb = FreeBalance::new(AssetType::Eth, &[a]);
        let before = fb.state_hash();
        fb.credit(a, 1).unwrap();
        assert_ne!(before, fb.state_hash());
    }

    #[test]
    fn credit_rejects_overflow() {
        let a = Address::new([1; 20]);
        let mut fb = FreeBalance::new(AssetType::Eth, &[a]);
        fb.credit(a, u128::MAX).unwrap();
        assert_eq!(
            fb.credit(a, 1).unwrap_err(),
            ValidationError::AmountOverflow("free balance")
        );
        assert_eq!(fb.balance_of(&a), u128::MAX);
    }
}
