use channel_commitment::CommitmentError;
use channel_types::{Address, AssetType, TypesError, B256};
use thiserror::Error;

use crate::protocol::{Opcode, Protocol, Role};

/// A proposed transition violates a channel or app rule.
///
/// Raised by proposers and model mutators before anything is committed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("channel already exists: {0}")]
    ChannelExists(Address),

    #[error("channel not found: {0}")]
    ChannelNotFound(Address),

    #[error("no channel between {0} and {1}")]
    NoChannelBetween(Address, Address),

    #[error("initiator and responder are both {0}")]
    IdenticalParticipants(Address),

    #[error("participants {actual:?} do not match channel owners {expected:?}")]
    OwnerMismatch {
        expected: Vec<Address>,
        actual: Vec<Address>,
    },

    #[error("no free balance for asset {0:?}")]
    NoFreeBalance(AssetType),

    #[error("deposits {deposit} exceed terms limit {limit}")]
    DepositExceedsLimit { deposit: u128, limit: u128 },

    #[error("insufficient free balance for {participant}: available {available}, required {required}")]
    InsufficientBalance {
        participant: Address,
        available: u128,
        required: u128,
    },

    #[error("app instance already installed: {0}")]
    DuplicateAppInstance(B256),

    #[error("virtual agreement for {0} already locked in this channel")]
    DuplicateVirtualAgreement(B256),

    #[error("app instance not found: {0}")]
    AppNotFound(B256),

    #[error("uninstalling virtual app {0} is not supported")]
    VirtualUninstallUnsupported(B256),

    #[error("resolution pays out {resolved}, only {locked} is locked")]
    ResolutionExceedsLocked { resolved: u128, locked: u128 },

    #[error("resolution pays {0}, who is not a participant")]
    PayoutToNonParticipant(Address),

    #[error("{0} overflows")]
    AmountOverflow(&'static str),

    #[error("app {0} is in a terminal state")]
    TerminalState(B256),

    #[error("not the turn taker: expected {expected}, got {actual}")]
    NotTurnTaker { expected: Address, actual: Address },

    #[error("stale version number: expected {expected}, got {actual}")]
    StaleNonce { expected: u64, actual: u64 },

    #[error("root nonce for {multisig} would decrease from {current} to {proposed}")]
    StaleRootNonce {
        multisig: Address,
        current: u64,
        proposed: u64,
    },

    #[error("deposit token mismatch: initiator uses {initiator}, responder uses {responder}")]
    TokenMismatch {
        initiator: Address,
        responder: Address,
    },

    #[error("proposal has no intermediary")]
    MissingIntermediary,

    #[error("free balance of {asset:?} sums to {total}, only {deposited} deposited")]
    InvariantViolation {
        asset: AssetType,
        total: u128,
        deposited: u128,
    },

    #[error("app logic error: {0}")]
    App(#[from] AppError),

    #[error("commitment error: {0}")]
    Commitment(#[from] CommitmentError),
}

/// Errors reported by an app definition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    #[error("state is {actual} bytes, expected {expected}")]
    StateLength { expected: usize, actual: usize },

    #[error("expected {expected} participants, got {actual}")]
    ParticipantCount { expected: usize, actual: usize },

    #[error("{0}")]
    Logic(String),
}

/// Errors surfaced by a transport collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("transport closed")]
    Closed,

    #[error("out-of-order message: sent seq {last_sent}, received seq {received}")]
    OutOfOrder { last_sent: u32, received: u32 },

    #[error("reply from {actual}, expected {expected}")]
    UnexpectedSender { expected: Address, actual: Address },

    #[error("malformed message: {0}")]
    Malformed(String),
}

/// Errors from a persistence collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    #[error("storage failure: {0}")]
    Storage(String),

    #[error("app instance proposal not found: {0}")]
    ProposalNotFound(B256),
}

/// Errors from the instruction executor and its pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MachineError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("signature from {recovered}, expected {expected}")]
    Authorization { expected: Address, recovered: Address },

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("message from {from} to {to} does not involve {local}")]
    NotAddressed {
        local: Address,
        from: Address,
        to: Address,
    },

    #[error("unknown protocol: {0}")]
    UnknownProtocol(String),

    #[error("protocol {protocol:?} has no opcode sequence for role {role:?}")]
    RoleMismatch { protocol: Protocol, role: Role },

    #[error("parameters do not belong to protocol {protocol:?}")]
    ParamsMismatch { protocol: Protocol },

    #[error("no active commitment for channel {0}")]
    NoActiveCommitment(Address),

    #[error("no proposed state transition")]
    NoProposal,

    #[error("message seq {seq} carries no signature")]
    MissingSignature { seq: u32 },

    #[error("signer error: {0}")]
    Signer(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] TypesError),

    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{protocol:?} failed at {opcode:?} (seq {seq}): {source}")]
    Execution {
        protocol: Protocol,
        opcode: Opcode,
        seq: u32,
        #[source]
        source: Box<MachineError>,
    },
}

impl MachineError {
    /// The innermost error, skipping execution context.
    pub fn root_cause(&self) -> &MachineError {
        match self {
            MachineError::Execution { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
