use alloy_sol_types::SolCall;
use channel_types::abi::{self, IVirtualAppAgreement};
use channel_types::{Address, NetworkContext, Signature, Terms, B256, U256};
use serde::{Deserialize, Serialize};

use crate::error::CommitmentError;
use crate::multisend::MultiSend;
use crate::multisig::{MultisigInput, MultisigTransaction};
use crate::{EthereumCommitment, FreeBalanceUpdate, Operation, Transaction};

/// Value locked in one underlying channel on behalf of a virtual app.
///
/// Once the target app resolves (or `expiry` passes) the locked capital is
/// paid out to the beneficiaries according to the resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualAppAgreement {
    pub target_app_identity_hash: B256,
    pub capital: u128,
    /// `[initiator, responder]` of the virtual app.
    pub beneficiaries: Vec<Address>,
    pub expiry: u64,
    pub uninstall_key: B256,
    pub root_nonce_value: u64,
    pub terms: Terms,
}

impl VirtualAppAgreement {
    fn delegate_target(&self, network: &NetworkContext) -> MultisigInput {
        let agreement = abi::VirtualAppAgreement {
            registry: network.app_registry,
            nonceRegistry: network.nonce_registry,
            expiry: U256::from(self.expiry),
            capital: U256::from(self.capital),
            beneficiaries: self.beneficiaries.clone(),
            uninstallKey: self.uninstall_key,
            rootNonceValue: U256::from(self.root_nonce_value),
            target: self.target_app_identity_hash,
            terms: self.terms.to_abi(),
        };
        MultisigInput {
            to: network.eth_virtual_app_agreement,
            value: U256::ZERO,
            data: IVirtualAppAgreement::delegateTargetCall { agreement }
                .abi_encode()
                .into(),
            operation: Operation::Delegatecall,
        }
    }
}

/// One leg of a virtual app install: updates the free balance of an
/// underlying channel and locks the agreed capital.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualAppAgreementCommitment {
    pub agreement: VirtualAppAgreement,
    tx: MultisigTransaction,
}

impl VirtualAppAgreementCommitment {
    pub fn new(
        network: &NetworkContext,
        multisig: Address,
        owners: Vec<Address>,
        free_balance: FreeBalanceUpdate,
        agreement: VirtualAppAgreement,
        initiator_deposit_token: Address,
        responder_deposit_token: Address,
    ) -> Result<Self, CommitmentError> {
        if initiator_deposit_token != responder_deposit_token {
            return Err(CommitmentError::TokenMismatch {
                initiator: initiator_deposit_token,
                responder: responder_deposit_token,
            });
        }

        let batch = MultiSend::new(vec![
            free_balance.input(network),
            agreement.delegate_target(network),
        ]);
        Ok(Self {
            agreement,
            tx: MultisigTransaction::new(multisig, owners, batch.input(network.multi_send)),
        })
    }

    pub fn multisig_transaction(&self) -> &MultisigTransaction {
        &self.tx
    }
}

impl EthereumCommitment for VirtualAppAgreementCommitment {
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
