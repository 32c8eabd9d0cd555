use alloy_sol_types::{SolCall, SolValue};
use channel_types::abi::IMultiSend;
use channel_types::{Address, U256};

use crate::multisig::MultisigInput;
use crate::Operation;

/// Batch of calls executed atomically through the MultiSend library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiSend {
    pub transactions: Vec<MultisigInput>,
}

impl MultiSend {
    pub fn new(transactions: Vec<MultisigInput>) -> Self {
        Self { transactions }
    }

    /// Delegatecall to `multi_send` executing every batched call in order.
    ///
    /// Each call is laid out as `abi.encode(uint256 op, address to,
    /// uint256 value, bytes data)`; the layouts are concatenated.
    pub fn input(&self, multi_send: Address) -> MultisigInput {
        let mut batch = Vec::new();
        for tx in &self.transactions {
            batch.extend(
                (
                    U256::from(tx.operation.code()),
                    tx.to,
                    tx.value,
                    tx.data.clone(),
                )
                    .abi_encode_params(),
            );
        }
        MultisigInput {
            to: multi_send,
            value: U256::ZERO,
            data: IMultiSend::multiSendCall {
                transactions: batch.into(),
            }
            .abi_encode()
            .into(),
            operation: Operation::Delegatecall,
        }
    }
}
