//! Commitments: unsigned, deterministically derived on-chain transactions.
//!
//! Every commitment exposes a digest to sign ([`EthereumCommitment::hash_to_sign`])
//! and, once all parties have signed it, a transaction descriptor ready for
//! submission ([`EthereumCommitment::transaction`]). Nothing here holds state
//! or performs I/O: two parties building a commitment from the same inputs get
//! byte-identical digests.
//!
//! ## Variants
//!
//! - [`SetupCommitment`]: binds the multisig to the channel's free balance
//! - [`InstallCommitment`]: moves deposits out of the free balance into an app
//! - [`UninstallCommitment`]: credits an app's value back and burns its nonce
//! - [`SetStateCommitment`]: advances an app's state on the app registry
//! - [`VirtualAppAgreementCommitment`]: locks value in one leg of a virtual app
//!
//! All but `SetState` are executed by the multisig; see [`multisig`].

pub mod error;
pub mod install;
pub mod multisend;
pub mod multisig;
pub mod set_state;
pub mod setup;
pub mod uninstall;
pub mod virtual_app;

use alloy_sol_types::SolCall;
use channel_types::abi::{IAppRegistryOwner, IStateChannelTransaction};
use channel_types::{recover_address, Address, Bytes, NetworkContext, Signature, Terms, B256, U256};
use serde::{Deserialize, Serialize};

pub use error::CommitmentError;
pub use install::InstallCommitment;
pub use multisend::MultiSend;
pub use multisig::{MultisigInput, MultisigTransaction};
pub use set_state::SetStateCommitment;
pub use setup::SetupCommitment;
pub use uninstall::UninstallCommitment;
pub use virtual_app::{VirtualAppAgreement, VirtualAppAgreementCommitment};

/// How the multisig invokes its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Call = 0,
    Delegatecall = 1,
}

impl Operation {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// A transaction ready for on-chain submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub operation: Operation,
}

/// Behaviour shared by every commitment variant.
pub trait EthereumCommitment {
    /// Digest each signer signs.
    fn hash_to_sign(&self) -> B256;

    /// Required signers, in the order their signatures are attached.
    fn signers(&self) -> &[Address];

    /// Attach `signatures` (one per signer, in signer order) and produce the
    /// transaction.
    fn transaction(&self, signatures: &[Signature]) -> Result<Transaction, CommitmentError>;
}

/// Check that `signatures` are exactly the signers' signatures over `digest`,
/// in signer order.
pub fn verify_signatures(
    digest: &B256,
    signers: &[Address],
    signatures: &[Signature],
) -> Result<(), CommitmentError> {
    if signatures.len() != signers.len() {
        return Err(CommitmentError::SignatureCount {
            expected: signers.len(),
            actual: signatures.len(),
        });
    }
    for (index, (expected, signature)) in signers.iter().zip(signatures).enumerate() {
        let recovered = recover_address(digest, signature)?;
        if recovered != *expected {
            return Err(CommitmentError::SignerMismatch {
                index,
                expected: *expected,
                recovered,
            });
        }
    }
    Ok(())
}

fn concat_signatures(signatures: &[Signature]) -> Vec<u8> {
    signatures.iter().flat_map(|s| s.to_bytes()).collect()
}

/// The free-balance state a multisig commitment writes to the app registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreeBalanceUpdate {
    pub identity_hash: B256,
    /// Hash of the encoded `(address[],uint256[])` balances.
    pub state_hash: B256,
    pub nonce: u64,
    pub timeout: u64,
    pub terms: Terms,
}

impl FreeBalanceUpdate {
    /// `AppRegistry.setState` call the multisig makes to record the balances.
    pub fn input(&self, network: &NetworkContext) -> MultisigInput {
        MultisigInput {
            to: network.app_registry,
            value: U256::ZERO,
            data: IAppRegistryOwner::setStateCall {
                appIdentityHash: self.identity_hash,
                stateHash: self.state_hash,
                nonce: U256::from(self.nonce),
                timeout: U256::from(self.timeout),
            }
            .abi_encode()
            .into(),
            operation: Operation::Call,
        }
    }
}

/// Delegatecall into the conditional-transaction library: pays out the
/// resolution of `app_identity_hash` while `uninstall_key` is unchanged and
/// the root nonce equals `root_nonce_value`.
pub(crate) fn conditional_transaction(
    network: &NetworkContext,
    uninstall_key: B256,
    root_nonce_value: u64,
    app_identity_hash: B256,
    terms: &Terms,
) -> MultisigInput {
    MultisigInput {
        to: network.state_channel_transaction,
        value: U256::ZERO,
        data: IStateChannelTransaction::executeAppConditionalTransactionCall {
            appRegistry: network.app_registry,
            nonceRegistry: network.nonce_registry,
            uninstallKey: uninstall_key,
            rootNonceExpectedValue: U256::from(root_nonce_value),
            appIdentityHash: app_identity_hash,
            terms: terms.to_abi(),
        }
        .abi_encode()
        .into(),
        operation: Operation::Delegatecall,
    }
}

/// Closed union over the commitment variants a protocol can produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolCommitment {
    Setup(SetupCommitment),
    Install(InstallCommitment),
    Uninstall(UninstallCommitment),
    SetState(SetStateCommitment),
    VirtualAppAgreement(VirtualAppAgreementCommitment),
}

impl ProtocolCommitment {
    fn inner(&self) -> &dyn EthereumCommitment {
        match self {
            ProtocolCommitment::Setup(c) => c,
            ProtocolCommitment::Install(c) => c,
            ProtocolCommitment::Uninstall(c) => c,
            ProtocolCommitment::SetState(c) => c,
            ProtocolCommitment::VirtualAppAgreement(c) => c,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ProtocolCommitment::Setup(_) => "setup",
            ProtocolCommitment::Install(_) => "install",
            ProtocolCommitment::Uninstall(_) => "uninstall",
            ProtocolCommitment::SetState(_) => "set_state",
            ProtocolCommitment::VirtualAppAgreement(_) => "virtual_app_agreement",
        }
    }
}

impl EthereumCommitment for ProtocolCommitment {
    fn hash_to_sign(&self) -> B256 {
        self.inner().hash_to_sign()
    }

    fn signers(&self) -> &[Address] {
        self.inner().signers()
    }

    fn transaction(&self, signatures: &[Signature]) -> Result<Transaction, CommitmentError> {
        self.inner().transaction(signatures)
    }
}
