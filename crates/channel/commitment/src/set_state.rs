use alloy_sol_types::{SolCall, SolValue};
use channel_types::abi::{IAppRegistry, SignedStateHashUpdate};
use channel_types::{
    keccak256, Address, AppIdentity, FixedBytes, NetworkContext, Signature, B256,
    DOMAIN_SEPARATOR, U256,
};

use crate::error::CommitmentError;
use crate::{concat_signatures, verify_signatures, EthereumCommitment, Operation, Transaction};

/// Advances an app's state on the app registry.
///
/// Unlike the other variants this is signed by the app's signing keys and
/// submitted to the registry directly, not through the multisig.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetStateCommitment {
    pub app_registry: Address,
    pub app_identity: AppIdentity,
    pub app_state_hash: B256,
    pub app_nonce: u64,
    pub timeout: u64,
}

impl SetStateCommitment {
    pub fn new(
        network: &NetworkContext,
        app_identity: AppIdentity,
        app_state_hash: B256,
        app_nonce: u64,
        timeout: u64,
    ) -> Self {
        Self {
            app_registry: network.app_registry,
            app_identity,
            app_state_hash,
            app_nonce,
            timeout,
        }
    }
}

impl EthereumCommitment for SetStateCommitment {
    fn hash_to_sign(&self) -> B256 {
        keccak256(
            (
                FixedBytes([DOMAIN_SEPARATOR]),
                self.app_identity.hash(),
                U256::from(self.app_nonce),
                U256::from(self.timeout),
                self.app_state_hash,
            )
                .abi_encode_packed(),
        )
    }

    fn signers(&self) -> &[Address] {
        &self.app_identity.signing_keys
    }

    fn transaction(&self, signatures: &[Signature]) -> Result<Transaction, CommitmentError> {
        verify_signatures(&self.hash_to_sign(), self.signers(), signatures)?;
        let data = IAppRegistry::setStateCall {
            appIdentity: self.app_identity.to_abi(),
            req: SignedStateHashUpdate {
                stateHash: self.app_state_hash,
                nonce: U256::from(self.app_nonce),
                timeout: U256::from(self.timeout),
                signatures: concat_signatures(signatures).into(),
            },
        }
        .abi_encode();
        Ok(Transaction {
            to: self.app_registry,
            value: U256::ZERO,
            data: data.into(),
            operation: Operation::Call,
        })
    }
}
