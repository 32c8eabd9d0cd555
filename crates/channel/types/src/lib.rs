//! Core type definitions for the channel protocol engine.
//!
//! This crate holds the shared vocabulary every other channel crate speaks:
//!
//! - **Primitives**: [`Address`], [`B256`], [`U256`] and [`Bytes`] from
//!   `alloy-primitives`, plus the recoverable [`Signature`]
//! - **ABI**: `sol!` bindings for the contracts commitments call
//! - **Crypto**: Keccak-256, secp256k1 signing with signer-address recovery
//! - **App descriptors**: [`Terms`], [`AppInterface`], [`AppIdentity`] and the
//!   anti-replay [`DependencyNonce`]
//!
//! No protocol logic lives here. Everything is deterministic: two parties
//! computing a hash from the same logical inputs obtain byte-identical output.

pub mod abi;
pub mod app;
pub mod crypto;
pub mod error;
pub mod network;
pub mod primitives;

pub use app::{AppIdentity, AppInterface, AssetType, DependencyNonce, Terms};
pub use crypto::{keccak256, recover_address, SigningKey};
pub use error::TypesError;
pub use network::NetworkContext;
pub use primitives::{Address, Bytes, FixedBytes, Signature, B256, U256};

/// Leading byte of every signed digest, separating channel commitments from
/// any other message a key might sign.
pub const DOMAIN_SEPARATOR: u8 = 0x19;
