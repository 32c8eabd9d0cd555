use std::collections::BTreeMap;

use channel_types::{Address, AppIdentity, AppInterface, Bytes, DependencyNonce, Terms, B256};
use serde::{Deserialize, Serialize};

/// An installed app. Present in its channel means installed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppInstance {
    /// Fixed at install, never recomputed.
    pub identity_hash: B256,
    pub multisig_address: Address,
    /// `[initiator, responder]` as installed.
    pub participants: Vec<Address>,
    /// Participant to the key that signs app state for it.
    pub signing_keys: BTreeMap<Address, Address>,
    pub app_interface: AppInterface,
    pub terms: Terms,
    pub default_timeout: u64,
    pub is_virtual: bool,
    pub app_sequence_number: u64,
    /// Root nonce the install commitment is conditioned on.
    pub root_nonce_value: u64,
    pub latest_state: Bytes,
    pub latest_nonce: u64,
    pub latest_timeout: u64,
    pub dependency_nonce: DependencyNonce,
    /// Value each participant locked at install.
    pub deposits: BTreeMap<Address, u128>,
}

/// Inputs to [`AppInstance::new`].
#[derive(Debug, Clone)]
pub struct AppInstanceSpec {
    pub multisig_address: Address,
    pub participants: Vec<Address>,
    pub signing_keys: BTreeMap<Address, Address>,
    pub app_interface: AppInterface,
    pub terms: Terms,
    pub default_timeout: u64,
    pub is_virtual: bool,
    pub app_sequence_number: u64,
    pub root_nonce_value: u64,
    pub initial_state: Bytes,
    pub deposits: BTreeMap<Address, u128>,
}

impl AppInstance {
    pub fn new(spec: AppInstanceSpec) -> Self {
        let mut app = Self {
            identity_hash: B256::ZERO,
            multisig_address: spec.multisig_address,
            participants: spec.participants,
            signing_keys: spec.signing_keys,
            app_interface: spec.app_interface,
            terms: spec.terms,
            default_timeout: spec.default_timeout,
            is_virtual: spec.is_virtual,
            app_sequence_number: spec.app_sequence_number,
            root_nonce_value: spec.root_nonce_value,
            latest_state: spec.initial_state,
            latest_nonce: 0,
            latest_timeout: spec.default_timeout,
            dependency_nonce: DependencyNonce::new(spec.app_sequence_number),
            deposits: spec.deposits,
        };
        app.identity_hash = app.identity().hash();
        app
    }

    pub fn identity(&self) -> AppIdentity {
        AppIdentity::new(
            self.multisig_address,
            self.signing_keys.values().copied().collect(),
            self.app_interface.hash(),
            self.terms.hash(),
            self.default_timeout,
        )
    }

    /// Saturates rather than wrapping.
    pub fn locked_value(&self) -> u128 {
        self.deposits
            .values()
            .fold(0u128, |acc, amount| acc.saturating_add(*amount))
    }

    /// Key that signs app state for `participant`.
    pub fn signing_key_of(&self, participant: &Address) -> Address {
        self.signing_keys.get(participant).copied().unwrap_or(*participant)
    }

    pub(crate) fn with_state(&self, state: Bytes, nonce: u64, timeout: u64) -> Self {
        let mut next = self.clone();
        next.latest_state = state;
        next.latest_nonce = nonce;
        next.latest_timeout = timeout;
        next
    }
}
