use alloy_sol_types::SolCall;
use channel_types::abi::INonceRegistry;
use channel_types::{Address, DependencyNonce, NetworkContext, Signature, Terms, B256, U256};

use crate::error::CommitmentError;
use crate::multisend::MultiSend;
use crate::multisig::{MultisigInput, MultisigTransaction};
use crate::{EthereumCommitment, FreeBalanceUpdate, Operation, Transaction};

/// Credits an app's value back to the free balance and bumps its dependency
/// nonce, so the install commitment can never be replayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UninstallCommitment {
    tx: MultisigTransaction,
}

impl UninstallCommitment {
    pub fn new(
        network: &NetworkContext,
        multisig: Address,
        owners: Vec<Address>,
        free_balance: FreeBalanceUpdate,
        app_terms: &Terms,
        dependency_nonce: &DependencyNonce,
    ) -> Result<Self, CommitmentError> {
        if app_terms.asset_type != free_balance.terms.asset_type {
            return Err(CommitmentError::AssetMismatch {
                expected: free_balance.terms.asset_type,
                actual: app_terms.asset_type,
            });
        }

        let batch = MultiSend::new(vec![
            free_balance.input(network),
            set_nonce(network, &dependency_nonce.bumped()),
        ]);
        Ok(Self {
            tx: MultisigTransaction::new(multisig, owners, batch.input(network.multi_send)),
        })
    }

    pub fn multisig_transaction(&self) -> &MultisigTransaction {
        &self.tx
    }
}

/// `NonceRegistry.setNonce(timeout, salt, value)`.
fn set_nonce(network: &NetworkContext, nonce: &DependencyNonce) -> MultisigInput {
    MultisigInput {
        to: network.nonce_registry,
        value: U256::ZERO,
        data: INonceRegistry::setNonceCall {
            timeout: U256::ZERO,
            salt: nonce.salt,
            nonceValue: U256::from(nonce.nonce_value),
        }
        .abi_encode()
        .into(),
        operation: Operation::Call,
    }
}

impl EthereumCommitment for UninstallCommitment {
    fn hash_to_sign(&self) -> B256 {
        self.tx.hash_to_sign()
    }

    fn signers(&self) -> &[Address] {
        &self.tx.owners
    }

    fn transaction(&self, signatures: &[Signature]) -> Result<Transaction, CommitmentError> {
        self.tx.transaction(signatures)
    }
}
