use channel_types::{Address, DependencyNonce, NetworkContext, Signature, Terms, B256};

use crate::error::CommitmentError;
use crate::multisend::MultiSend;
use crate::multisig::MultisigTransaction;
use crate::{conditional_transaction, EthereumCommitment, FreeBalanceUpdate, Transaction};

/// Moves deposits out of the free balance and makes the new app's
/// resolution payable by the multisig.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallCommitment {
    pub app_identity_hash: B256,
    tx: MultisigTransaction,
}

impl InstallCommitment {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        network: &NetworkContext,
        multisig: Address,
        owners: Vec<Address>,
        free_balance: FreeBalanceUpdate,
        app_identity_hash: B256,
        app_terms: &Terms,
        dependency_nonce: &DependencyNonce,
        root_nonce_value: u64,
    ) -> Result<Self, CommitmentError> {
        if app_terms.asset_type != free_balance.terms.asset_type {
            return Err(CommitmentError::AssetMismatch {
                expected: free_balance.terms.asset_type,
                actual: app_terms.asset_type,
            });
        }

        let batch = MultiSend::new(vec![
            free_balance.input(network),
            conditional_transaction(
                network,
                dependency_nonce.uninstall_key(&multisig),
                root_nonce_value,
                app_identity_hash,
                app_terms,
            ),
        ]);
        Ok(Self {
            app_identity_hash,
            tx: MultisigTransaction::new(multisig, owners, batch.input(network.multi_send)),
        })
    }

    pub fn multisig_transaction(&self) -> &MultisigTransaction {
        &self.tx
    }
}

impl EthereumCommitment for InstallCommitment {
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
