use channel_types::{Address, NetworkContext, Signature, Terms, B256};

use crate::error::CommitmentError;
use crate::multisig::MultisigTransaction;
use crate::{conditional_transaction, EthereumCommitment, Transaction};

/// Binds a freshly funded multisig to its free-balance app.
///
/// The conditional transaction uses a zero uninstall key, so the free balance
/// itself can never be uninstalled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupCommitment {
    tx: MultisigTransaction,
}

impl SetupCommitment {
    pub fn new(
        network: &NetworkContext,
        multisig: Address,
        owners: Vec<Address>,
        free_balance_identity_hash: B256,
        free_balance_terms: &Terms,
    ) -> Self {
        let input = conditional_transaction(
            network,
            B256::ZERO,
            0,
            free_balance_identity_hash,
            free_balance_terms,
        );
        Self {
            tx: MultisigTransaction::new(multisig, owners, input),
        }
    }

    pub fn multisig_transaction(&self) -> &MultisigTransaction {
        &self.tx
    }
}

impl EthereumCommitment for SetupCommitment {
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
