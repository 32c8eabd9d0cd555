//! Descriptors identifying an app instance on-chain.

use alloy_primitives::Selector;
use alloy_sol_types::{sol_data, SolType, SolValue};
use serde::{Deserialize, Serialize};

use crate::abi;
use crate::crypto::keccak256;
use crate::network::NetworkContext;
use crate::primitives::{Address, FixedBytes, B256, U256};
use crate::DOMAIN_SEPARATOR;

/// Asset class locked by an app. The discriminant is the on-chain code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AssetType {
    Eth = 0,
    Erc20 = 1,
    Any = 2,
}

impl AssetType {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// What an app may move: asset class, upper bound and token contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Terms {
    pub asset_type: AssetType,
    pub limit: u128,
    pub token: Address,
}

impl Terms {
    pub fn new(asset_type: AssetType, limit: u128, token: Address) -> Self {
        Self {
            asset_type,
            limit,
            token,
        }
    }

    pub fn hash(&self) -> B256 {
        keccak256(
            <(
                sol_data::FixedBytes<1>,
                sol_data::Uint<8>,
                sol_data::Uint<256>,
                sol_data::Address,
            ) as SolType>::abi_encode_params(&(
                FixedBytes([DOMAIN_SEPARATOR]),
                self.asset_type.code(),
                U256::from(self.limit),
                self.token,
            )),
        )
    }

    /// The `(uint8,uint256,address)` tuple the contracts take.
    pub fn to_abi(&self) -> abi::Terms {
        abi::Terms {
            assetType: self.asset_type.code(),
            limit: U256::from(self.limit),
            token: self.token,
        }
    }
}

/// Canonical tuple type of [`Terms`] inside function signatures.
pub const TERMS_ENCODING: &str = "(uint8,uint256,address)";

/// The app definition contract and the encodings its functions take.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppInterface {
    pub addr: Address,
    /// Canonical ABI type of the app state, e.g. `(address[],uint256[])`.
    pub state_encoding: String,
    /// `None` for apps that take no actions.
    pub action_encoding: Option<String>,
}

impl AppInterface {
    pub fn new(
        addr: Address,
        state_encoding: impl Into<String>,
        action_encoding: Option<String>,
    ) -> Self {
        Self {
            addr,
            state_encoding: state_encoding.into(),
            action_encoding,
        }
    }

    /// The free-balance app of a network.
    pub fn free_balance(network: &NetworkContext) -> Self {
        Self::new(network.eth_bucket, "(address[],uint256[])", None)
    }

    fn selectors(&self) -> [Selector; 4] {
        let state = &self.state_encoding;
        let apply_action = match &self.action_encoding {
            Some(action) => abi::selector(&format!("applyAction({state},{action})")),
            None => Selector::ZERO,
        };
        [
            apply_action,
            abi::selector(&format!("resolve({state},{TERMS_ENCODING})")),
            abi::selector(&format!("getTurnTaker({state})")),
            abi::selector(&format!("isStateTerminal({state})")),
        ]
    }

    /// Hash of `(address addr, bytes4 applyAction, bytes4 resolve,
    /// bytes4 getTurnTaker, bytes4 isStateTerminal)`.
    pub fn hash(&self) -> B256 {
        let [apply_action, resolve, turn_taker, terminal] = self.selectors();
        keccak256((self.addr, apply_action, resolve, turn_taker, terminal).abi_encode_params())
    }
}

/// Everything that pins an app instance down on-chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppIdentity {
    /// The multisig owning the instance.
    pub owner: Address,
    /// Keys that sign app state, in canonical (sorted) order.
    pub signing_keys: Vec<Address>,
    pub app_interface_hash: B256,
    pub terms_hash: B256,
    pub default_timeout: u64,
}

impl AppIdentity {
    pub fn new(
        owner: Address,
        mut signing_keys: Vec<Address>,
        app_interface_hash: B256,
        terms_hash: B256,
        default_timeout: u64,
    ) -> Self {
        signing_keys.sort();
        Self {
            owner,
            signing_keys,
            app_interface_hash,
            terms_hash,
            default_timeout,
        }
    }

    pub fn hash(&self) -> B256 {
        keccak256(
            (
                self.owner,
                self.signing_keys.clone(),
                self.app_interface_hash,
                self.terms_hash,
                U256::from(self.default_timeout),
            )
                .abi_encode_params(),
        )
    }

    pub fn to_abi(&self) -> abi::AppIdentity {
        abi::AppIdentity {
            owner: self.owner,
            signingKeys: self.signing_keys.clone(),
            appInterfaceHash: self.app_interface_hash,
            termsHash: self.terms_hash,
            defaultTimeout: U256::from(self.default_timeout),
        }
    }
}

/// Per-instance anti-replay nonce tracked by the nonce registry.
///
/// An app's conditional transfer is only executable while its nonce is
/// unchanged; uninstalling bumps it, invalidating every earlier commitment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyNonce {
    pub salt: B256,
    pub nonce_value: u64,
}

impl DependencyNonce {
    /// Nonce for the `unique_id`-th app installed in a channel.
    pub fn new(unique_id: u64) -> Self {
        Self {
            salt: keccak256(U256::from(unique_id).abi_encode_packed()),
            nonce_value: 0,
        }
    }

    /// Registry key `keccak(packed(multisig, timeout = 0, salt))`.
    pub fn uninstall_key(&self, multisig: &Address) -> B256 {
        keccak256((*multisig, U256::ZERO, self.salt).abi_encode_packed())
    }

    pub fn bumped(&self) -> Self {
        Self {
            salt: self.salt,
            nonce_value: self.nonce_value + 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        Address::new([n; 20])
    }

    #[test]
    fn terms_hash_depends_on_every_field() {
        let base = Terms::new(AssetType::Eth, 8, addr(9));
        assert_ne!(base.hash(), Terms::new(AssetType::Erc20, 8, addr(9)).hash());
        assert_ne!(base.hash(), Terms::new(AssetType::Eth, 9, addr(9)).hash());
        assert_ne!(base.hash(), Terms::new(AssetType::Eth, 8, addr(7)).hash());
        assert_eq!(base.hash(), Terms::new(AssetType::Eth, 8, addr(9)).hash());
    }

    #[test]
    fn interface_without_actions_has_zero_apply_selector() {
        let iface = AppInterface::new(addr(1), "(uint8)", None);
        let selectors = iface.selectors();
        assert_eq!(selectors[0], Selector::ZERO);
        assert_ne!(selectors[1], Selector::ZERO);

        let with_actions = AppInterface::new(addr(1), "(uint8)", Some("(uint8)".into()));
        assert_ne!(iface.hash(), with_actions.hash());
    }

    #[test]
    fn identity_hash_ignores_key_order() {
        let a = AppIdentity::new(addr(5), vec![addr(2), addr(1)], B256::repeat_byte(1), B256::repeat_byte(2), 10);
        let b = AppIdentity::new(addr(5), vec![addr(1), addr(2)], B256::repeat_byte(1), B256::repeat_byte(2), 10);
        assert_eq!(a.signing_keys, vec![addr(1), addr(2)]);
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn identity_hash_changes_with_timeout() {
        let a = AppIdentity::new(addr(5), vec![addr(1)], B256::repeat_byte(1), B256::repeat_byte(2), 10);
        let b = AppIdentity::new(addr(5), vec![addr(1)], B256::repeat_byte(1), B256::repeat_byte(2), 11);
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn dependency_nonce_salts_are_distinct_per_app() {
        let first = DependencyNonce::new(1);
        let second = DependencyNonce::new(2);
        assert_ne!(first.salt, second.salt);
        assert_eq!(first.nonce_value, 0);
        assert_eq!(first.bumped().nonce_value, 1);
        assert_eq!(first.bumped().salt, first.salt);
        assert_ne!(first.uninstall_key(&addr(1)), first.uninstall_key(&addr(2)));
    }
}
