//! Protocols, their opcode sequences and the wire message.

use std::fmt;
use std::str::FromStr;

use channel_types::{Address, AppInterface, AssetType, Bytes, Signature, Terms, B256};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{MachineError, ValidationError};

/// One step of a protocol run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Opcode {
    KeyGenerate,
    OpGenerate,
    OpSign,
    OpSignValidate,
    IoPrepareSend,
    IoSend,
    IoWait,
    StateTransitionPropose,
    StateTransitionCommit,
}

impl Opcode {
    pub const ALL: [Opcode; 9] = [
        Opcode::KeyGenerate,
        Opcode::OpGenerate,
        Opcode::OpSign,
        Opcode::OpSignValidate,
        Opcode::IoPrepareSend,
        Opcode::IoSend,
        Opcode::IoWait,
        Opcode::StateTransitionPropose,
        Opcode::StateTransitionCommit,
    ];
}

/// Which side of a protocol run this party plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Started the run.
    Initiator,
    /// Forwards a virtual install between initiator and responder.
    Intermediary,
    /// Acknowledges the initiator's (or intermediary's) request.
    Responder,
}

use Opcode::*;

const TWO_PARTY_INITIATING: &[Opcode] = &[
    OpGenerate,
    OpSign,
    IoPrepareSend,
    IoSend,
    IoWait,
    OpSignValidate,
    StateTransitionCommit,
];

const TWO_PARTY_ACK: &[Opcode] = &[
    OpGenerate,
    OpSignValidate,
    OpSign,
    IoPrepareSend,
    IoSend,
    StateTransitionCommit,
];

const INSTALL_INITIATING: &[Opcode] = &[
    KeyGenerate,
    IoPrepareSend,
    IoSend,
    IoWait,
    StateTransitionPropose,
    OpGenerate,
    OpSignValidate,
    OpSign,
    IoPrepareSend,
    IoSend,
    StateTransitionCommit,
];

const INSTALL_ACK: &[Opcode] = &[
    KeyGenerate,
    StateTransitionPropose,
    OpGenerate,
    OpSign,
    IoPrepareSend,
    IoSend,
    IoWait,
    OpSignValidate,
    StateTransitionCommit,
];

const VIRTUAL_INITIATOR: &[Opcode] = TWO_PARTY_INITIATING;

const VIRTUAL_INTERMEDIARY: &[Opcode] = &[
    OpGenerate,
    OpSignValidate,
    OpSign,
    IoPrepareSend,
    IoSend,
    IoWait,
    OpSignValidate,
    OpSign,
    IoPrepareSend,
    IoSend,
    StateTransitionCommit,
];

const VIRTUAL_RESPONDER: &[Opcode] = TWO_PARTY_ACK;

/// The closed set of protocols the executor runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Protocol {
    Setup,
    Install,
    Uninstall,
    Update,
    InstallVirtualApp,
}

impl Protocol {
    pub fn name(self) -> &'static str {
        match self {
            Protocol::Setup => "setup",
            Protocol::Install => "install",
            Protocol::Uninstall => "uninstall",
            Protocol::Update => "update",
            Protocol::InstallVirtualApp => "installVirtualApp",
        }
    }

    /// Opcode sequence `role` walks for this protocol.
    pub fn opcodes(self, role: Role) -> Result<&'static [Opcode], MachineError> {
        let ops = match (self, role) {
            (Protocol::Install, Role::Initiator) => INSTALL_INITIATING,
            (Protocol::Install, Role::Responder) => INSTALL_ACK,
            (Protocol::InstallVirtualApp, Role::Initiator) => VIRTUAL_INITIATOR,
            (Protocol::InstallVirtualApp, Role::Intermediary) => VIRTUAL_INTERMEDIARY,
            (Protocol::InstallVirtualApp, Role::Responder) => VIRTUAL_RESPONDER,
            (Protocol::Setup | Protocol::Uninstall | Protocol::Update, Role::Initiator) => {
                TWO_PARTY_INITIATING
            }
            (Protocol::Setup | Protocol::Uninstall | Protocol::Update, Role::Responder) => {
                TWO_PARTY_ACK
            }
            (protocol, role) => return Err(MachineError::RoleMismatch { protocol, role }),
        };
        Ok(ops)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Protocol {
    type Err = MachineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "setup" => Ok(Protocol::Setup),
            "install" => Ok(Protocol::Install),
            "uninstall" => Ok(Protocol::Uninstall),
            "update" => Ok(Protocol::Update),
            "installVirtualApp" => Ok(Protocol::InstallVirtualApp),
            other => Err(MachineError::UnknownProtocol(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupParams {
    pub multisig_address: Address,
    pub initiator: Address,
    pub responder: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallParams {
    pub initiator: Address,
    pub responder: Address,
    pub initiator_deposit: u128,
    pub responder_deposit: u128,
    pub app_interface: AppInterface,
    pub terms: Terms,
    pub default_timeout: u64,
    pub initial_state: Bytes,
    /// Ephemeral app keys, filled in during the key exchange.
    pub initiator_signing_key: Option<Address>,
    pub responder_signing_key: Option<Address>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UninstallParams {
    pub app_identity_hash: B256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateParams {
    pub app_identity_hash: B256,
    pub new_state: Bytes,
    pub timeout: Option<u64>,
    /// Must equal the app's current nonce plus one when present.
    pub version_number: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallVirtualAppParams {
    pub initiator: Address,
    pub responder: Address,
    pub intermediary: Address,
    pub initiator_deposit: u128,
    pub responder_deposit: u128,
    pub initiator_deposit_token: Address,
    pub responder_deposit_token: Address,
    pub app_interface: AppInterface,
    pub default_timeout: u64,
    pub initial_state: Bytes,
    /// Block after which the locked capital may be reclaimed.
    pub expiry: u64,
}

/// Protocol-specific payload of a [`ClientActionMessage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProtocolParams {
    Setup(SetupParams),
    Install(InstallParams),
    Uninstall(UninstallParams),
    Update(UpdateParams),
    InstallVirtualApp(InstallVirtualAppParams),
}

impl ProtocolParams {
    pub fn protocol(&self) -> Protocol {
        match self {
            ProtocolParams::Setup(_) => Protocol::Setup,
            ProtocolParams::Install(_) => Protocol::Install,
            ProtocolParams::Uninstall(_) => Protocol::Uninstall,
            ProtocolParams::Update(_) => Protocol::Update,
            ProtocolParams::InstallVirtualApp(_) => Protocol::InstallVirtualApp,
        }
    }
}

/// Message exchanged between parties, and the request that starts a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientActionMessage {
    pub request_id: Uuid,
    pub app_id: Option<B256>,
    pub action: Protocol,
    pub data: ProtocolParams,
    pub multisig_address: Address,
    pub from_address: Address,
    pub to_address: Address,
    pub signature: Option<Signature>,
    /// Increments by one per message within a run.
    pub seq: u32,
}

impl ClientActionMessage {
    /// A fresh request from `from` to `to` with seq 0.
    pub fn new(
        data: ProtocolParams,
        multisig_address: Address,
        from_address: Address,
        to_address: Address,
    ) -> Self {
        let app_id = match &data {
            ProtocolParams::Uninstall(p) => Some(p.app_identity_hash),
            ProtocolParams::Update(p) => Some(p.app_identity_hash),
            _ => None,
        };
        Self {
            request_id: Uuid::new_v4(),
            app_id,
            action: data.protocol(),
            data,
            multisig_address,
            from_address,
            to_address,
            signature: None,
            seq: 0,
        }
    }

    /// Structural check run before any execution starts.
    pub fn validate(&self) -> Result<(), MachineError> {
        if self.data.protocol() != self.action {
            return Err(MachineError::ParamsMismatch {
                protocol: self.action,
            });
        }
        Ok(())
    }
}

/// Stored record of an app a party proposed to install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppInstanceProposal {
    pub initiator: Address,
    pub responder: Address,
    pub intermediary: Option<Address>,
    pub initiator_deposit: u128,
    pub responder_deposit: u128,
    pub initiator_deposit_token: Address,
    pub responder_deposit_token: Address,
    pub app_interface: AppInterface,
    pub default_timeout: u64,
    pub initial_state: Bytes,
    pub expiry: u64,
}

impl AppInstanceProposal {
    fn check_tokens(&self) -> Result<(), ValidationError> {
        if self.initiator_deposit_token != self.responder_deposit_token {
            return Err(ValidationError::TokenMismatch {
                initiator: self.initiator_deposit_token,
                responder: self.responder_deposit_token,
            });
        }
        Ok(())
    }

    fn terms(&self) -> Result<Terms, ValidationError> {
        let asset_type = if self.initiator_deposit_token.is_zero() {
            AssetType::Eth
        } else {
            AssetType::Erc20
        };
        let limit = self
            .initiator_deposit
            .checked_add(self.responder_deposit)
            .ok_or(ValidationError::AmountOverflow("proposal deposits"))?;
        Ok(Terms::new(asset_type, limit, self.initiator_deposit_token))
    }

    pub fn into_install_params(self) -> Result<InstallParams, ValidationError> {
        self.check_tokens()?;
        let terms = self.terms()?;
        Ok(InstallParams {
            initiator: self.initiator,
            responder: self.responder,
            initiator_deposit: self.initiator_deposit,
            responder_deposit: self.responder_deposit,
            app_interface: self.app_interface,
            terms,
            default_timeout: self.default_timeout,
            initial_state: self.initial_state,
            initiator_signing_key: None,
            responder_signing_key: None,
        })
    }

    pub fn into_virtual_params(self) -> Result<InstallVirtualAppParams, ValidationError> {
        self.check_tokens()?;
        let intermediary = self.intermediary.ok_or(ValidationError::MissingIntermediary)?;
        Ok(InstallVirtualAppParams {
            initiator: self.initiator,
            responder: self.responder,
            intermediary,
            initiator_deposit: self.initiator_deposit,
            responder_deposit: self.responder_deposit,
            initiator_deposit_token: self.initiator_deposit_token,
            responder_deposit_token: self.responder_deposit_token,
            app_interface: self.app_interface,
            default_timeout: self.default_timeout,
            initial_state: self.initial_state,
            expiry: self.expiry,
        })
    }

    /// Parameters for whichever install protocol this proposal needs.
    pub fn into_params(self) -> Result<ProtocolParams, ValidationError> {
        if self.intermediary.is_some() {
            self.into_virtual_params().map(ProtocolParams::InstallVirtualApp)
        } else {
            self.into_install_params().map(ProtocolParams::Install)
        }
    }
}
