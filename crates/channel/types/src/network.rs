use serde::{Deserialize, Serialize};

use crate::primitives::Address;

/// Addresses of the deployed contracts every commitment refers to.
///
/// Both parties of a channel must use the same context, otherwise their
/// digests diverge and signatures fail to validate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkContext {
    /// Registry holding app state and resolutions.
    pub app_registry: Address,
    /// Free-balance app definition.
    pub eth_bucket: Address,
    pub multi_send: Address,
    pub nonce_registry: Address,
    /// Library delegatecalled to execute conditional transactions.
    pub state_channel_transaction: Address,
    pub eth_virtual_app_agreement: Address,
}
