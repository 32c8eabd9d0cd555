//! Transactions executed by the channel multisig.
//!
//! The multisig signs over `keccak(packed(0x19, owners, to, value, data, op))`
//! and is invoked through `execTransaction` with the owners' signatures
//! concatenated in owner order.

use alloy_sol_types::{sol_data, SolCall, SolType};
use channel_types::abi::IMultisig;
use channel_types::{
    keccak256, Address, Bytes, FixedBytes, Signature, B256, DOMAIN_SEPARATOR, U256,
};
use serde::{Deserialize, Serialize};

use crate::error::CommitmentError;
use crate::{concat_signatures, verify_signatures, Operation, Transaction};

/// One call the multisig is asked to make.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultisigInput {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub operation: Operation,
}

/// A [`MultisigInput`] bound to a specific multisig and its owners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultisigTransaction {
    pub multisig: Address,
    /// Sorted owner addresses.
    pub owners: Vec<Address>,
    pub input: MultisigInput,
}

impl MultisigTransaction {
    pub fn new(multisig: Address, mut owners: Vec<Address>, input: MultisigInput) -> Self {
        owners.sort();
        Self {
            multisig,
            owners,
            input,
        }
    }

    pub fn hash_to_sign(&self) -> B256 {
        keccak256(
            <(
                sol_data::FixedBytes<1>,
                sol_data::Array<sol_data::Address>,
                sol_data::Address,
                sol_data::Uint<256>,
                sol_data::Bytes,
                sol_data::Uint<8>,
            ) as SolType>::abi_encode_packed(&(
                FixedBytes([DOMAIN_SEPARATOR]),
                self.owners.clone(),
                self.input.to,
                self.input.value,
                self.input.data.clone(),
                self.input.operation.code(),
            )),
        )
    }

    pub fn transaction(&self, signatures: &[Signature]) -> Result<Transaction, CommitmentError> {
        verify_signatures(&self.hash_to_sign(), &self.owners, signatures)?;
        let data = IMultisig::execTransactionCall {
            to: self.input.to,
            value: self.input.value,
            data: self.input.data.clone(),
            operation: self.input.operation.code(),
            signatures: concat_signatures(signatures).into(),
        }
        .abi_encode();
        Ok(Transaction {
            to: self.multisig,
            value: U256::ZERO,
            data: data.into(),
            operation: Operation::Call,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::owners;

    fn input(data: Vec<u8>) -> MultisigInput {
        MultisigInput {
            to: Address::new([0x55; 20]),
            value: U256::ZERO,
            data: data.into(),
            operation: Operation::Call,
        }
    }

    #[test]
    fn owners_are_sorted_on_construction() {
        let (a, b) = owners();
        let tx = MultisigTransaction::new(Address::new([1; 20]), vec![b.address(), a.address()], input(vec![]));
        assert_eq!(tx.owners, vec![a.address(), b.address()]);
    }

    #[test]
    fn digest_covers_call_data() {
        let (a, b) = owners();
        let keys = vec![a.address(), b.address()];
        let one = MultisigTransaction::new(Address::new([1; 20]), keys.clone(), input(vec![1]));
        let two = MultisigTransaction::new(Address::new([1; 20]), keys, input(vec![2]));
        assert_ne!(one.hash_to_sign(), two.hash_to_sign());
    }

    #[test]
    fn transaction_targets_multisig() {
        let (a, b) = owners();
        let multisig = Address::new([9; 20]);
        let tx = MultisigTransaction::new(multisig, vec![a.address(), b.address()], input(vec![7]));
        let digest = tx.hash_to_sign();
        let out = tx
            .transaction(&[a.sign_digest(&digest), b.sign_digest(&digest)])
            .unwrap();
        assert_eq!(out.to, multisig);
        assert_eq!(out.operation, Operation::Call);
        assert_eq!(&out.data[..4], &IMultisig::execTransactionCall::SELECTOR);
        let decoded = IMultisig::execTransactionCall::abi_decode(&out.data, true).unwrap();
        assert_eq!(decoded.to, tx.input.to);
        assert_eq!(decoded.data, tx.input.data);
        assert_eq!(decoded.signatures.len(), 2 * Signature::LEN);
    }
}
