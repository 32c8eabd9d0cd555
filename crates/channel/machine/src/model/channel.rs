use std::collections::BTreeMap;

use alloy_sol_types::SolValue;
use channel_commitment::FreeBalanceUpdate;
use channel_types::{keccak256, Address, AssetType, DependencyNonce, NetworkContext, Terms, B256};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::model::{AppInstance, FreeBalance};

/// Value one underlying channel locks for a virtual app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualAgreement {
    pub target_app_identity_hash: B256,
    pub capital: u128,
    pub beneficiaries: Vec<Address>,
    pub expiry: u64,
    pub terms: Terms,
    pub dependency_nonce: DependencyNonce,
    pub root_nonce_value: u64,
    /// What each owner of this channel locked.
    pub deposits: BTreeMap<Address, u128>,
}

/// Snapshot of one multisig-governed channel.
///
/// Mutators never modify in place: each returns the next snapshot after
/// checking that no free balance exceeds what was deposited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelState {
    pub multisig_address: Address,
    /// Sorted.
    pub multisig_owners: Vec<Address>,
    pub free_balances: BTreeMap<AssetType, FreeBalance>,
    pub app_instances: BTreeMap<B256, AppInstance>,
    pub virtual_agreements: BTreeMap<B256, VirtualAgreement>,
    pub root_nonce: u64,
    pub num_installed_apps: u64,
    /// Holds virtual apps only; no multisig backs it.
    pub is_virtual: bool,
}

impl ChannelState {
    /// A freshly set up channel with a zero ETH free balance.
    pub fn new(multisig_address: Address, mut owners: Vec<Address>) -> Self {
        owners.sort();
        let mut free_balances = BTreeMap::new();
        free_balances.insert(AssetType::Eth, FreeBalance::new(AssetType::Eth, &owners));
        Self {
            multisig_address,
            multisig_owners: owners,
            free_balances,
            app_instances: BTreeMap::new(),
            virtual_agreements: BTreeMap::new(),
            root_nonce: 0,
            num_installed_apps: 0,
            is_virtual: false,
        }
    }

    /// Container for virtual apps between two parties without a channel.
    pub fn new_virtual(address: Address, mut owners: Vec<Address>) -> Self {
        owners.sort();
        Self {
            multisig_address: address,
            multisig_owners: owners,
            free_balances: BTreeMap::new(),
            app_instances: BTreeMap::new(),
            virtual_agreements: BTreeMap::new(),
            root_nonce: 0,
            num_installed_apps: 0,
            is_virtual: true,
        }
    }

    /// Whether `a` and `b` are the two distinct owners of this channel.
    pub fn has_owners(&self, a: &Address, b: &Address) -> bool {
        a != b
            && self.multisig_owners.len() == 2
            && self.multisig_owners.contains(a)
            && self.multisig_owners.contains(b)
    }

    pub fn free_balance(&self, asset: AssetType) -> Result<&FreeBalance, ValidationError> {
        self.free_balances
            .get(&asset)
            .ok_or(ValidationError::NoFreeBalance(asset))
    }

    pub fn app(&self, identity_hash: &B256) -> Result<&AppInstance, ValidationError> {
        self.app_instances
            .get(identity_hash)
            .ok_or(ValidationError::AppNotFound(*identity_hash))
    }

    /// Commitment view of the free balance of `asset`.
    pub fn free_balance_update(
        &self,
        asset: AssetType,
        network: &NetworkContext,
    ) -> Result<FreeBalanceUpdate, ValidationError> {
        Ok(self
            .free_balance(asset)?
            .update(self.multisig_address, &self.multisig_owners, network))
    }

    /// Sum of free balances never exceeds the deposited total.
    pub fn check_invariants(&self) -> Result<(), ValidationError> {
        for fb in self.free_balances.values() {
            let total = fb.total();
            if total > fb.deposited {
                return Err(ValidationError::InvariantViolation {
                    asset: fb.asset_type,
                    total,
                    deposited: fb.deposited,
                });
            }
        }
        Ok(())
    }

    fn checked(self) -> Result<Self, ValidationError> {
        self.check_invariants()?;
        Ok(self)
    }

    fn free_balance_mut(&mut self, asset: AssetType) -> Result<&mut FreeBalance, ValidationError> {
        self.free_balances
            .get_mut(&asset)
            .ok_or(ValidationError::NoFreeBalance(asset))
    }

    /// Credit an observed on-chain deposit.
    pub fn deposit(
        &self,
        asset: AssetType,
        participant: Address,
        amount: u128,
    ) -> Result<Self, ValidationError> {
        let mut next = self.clone();
        let owners = next.multisig_owners.clone();
        let fb = next
            .free_balances
            .entry(asset)
            .or_insert_with(|| FreeBalance::new(asset, &owners));
        fb.credit(participant, amount)?;
        fb.deposited = fb
            .deposited
            .checked_add(amount)
            .ok_or(ValidationError::AmountOverflow("deposited total"))?;
        next.checked()
    }

    fn debit_all(
        &mut self,
        asset: AssetType,
        deposits: &BTreeMap<Address, u128>,
    ) -> Result<(), ValidationError> {
        let fb = self.free_balance_mut(asset)?;
        for (participant, amount) in deposits {
            fb.debit(*participant, *amount)?;
        }
        fb.nonce += 1;
        Ok(())
    }

    /// Move each participant's deposit out of the free balance into `app`.
    pub fn install_app(&self, app: AppInstance) -> Result<Self, ValidationError> {
        if self.app_instances.contains_key(&app.identity_hash) {
            return Err(ValidationError::DuplicateAppInstance(app.identity_hash));
        }
        let mut next = self.clone();
        next.debit_all(app.terms.asset_type, &app.deposits)?;
        next.root_nonce += 1;
        next.num_installed_apps += 1;
        next.app_instances.insert(app.identity_hash, app);
        next.checked()
    }

    /// Remove an app, crediting `payouts` back to the free balance.
    pub fn uninstall_app(
        &self,
        identity_hash: &B256,
        payouts: &BTreeMap<Address, u128>,
    ) -> Result<Self, ValidationError> {
        let app = self.app(identity_hash)?;
        let mut next = self.clone();
        let fb = next.free_balance_mut(app.terms.asset_type)?;
        for (participant, amount) in payouts {
            fb.credit(*participant, *amount)?;
        }
        fb.nonce += 1;
        next.root_nonce += 1;
        next.app_instances.remove(identity_hash);
        next.checked()
    }

    /// Record a new app state.
    pub fn update_app(
        &self,
        identity_hash: &B256,
        state: channel_types::Bytes,
        nonce: u64,
        timeout: u64,
    ) -> Result<Self, ValidationError> {
        let updated = self.app(identity_hash)?.with_state(state, nonce, timeout);
        let mut next = self.clone();
        next.app_instances.insert(*identity_hash, updated);
        next.checked()
    }

    /// Lock value for a virtual app routed through this channel.
    pub fn lock_virtual(&self, agreement: VirtualAgreement) -> Result<Self, ValidationError> {
        let target = agreement.target_app_identity_hash;
        if self.virtual_agreements.contains_key(&target) {
            return Err(ValidationError::DuplicateVirtualAgreement(target));
        }
        let mut next = self.clone();
        next.debit_all(agreement.terms.asset_type, &agreement.deposits)?;
        next.root_nonce += 1;
        next.num_installed_apps += 1;
        next.virtual_agreements.insert(target, agreement);
        next.checked()
    }

    /// Add a virtual app to a virtual channel.
    pub fn add_virtual_app(&self, app: AppInstance) -> Result<Self, ValidationError> {
        if self.app_instances.contains_key(&app.identity_hash) {
            return Err(ValidationError::DuplicateAppInstance(app.identity_hash));
        }
        let mut next = self.clone();
        next.num_installed_apps += 1;
        next.root_nonce += 1;
        next.app_instances.insert(app.identity_hash, app);
        Ok(next)
    }
}

/// Deterministic address of the virtual channel between `initiator` and
/// `responder` through `intermediary`.
pub fn virtual_channel_address(
    initiator: &Address,
    responder: &Address,
    intermediary: &Address,
) -> Address {
    Address::from_word(keccak256(
        (*initiator, *responder, *intermediary).abi_encode_packed(),
    ))
}
