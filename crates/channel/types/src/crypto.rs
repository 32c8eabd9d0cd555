//! Keccak-256 hashing and secp256k1 recoverable signatures.

use std::fmt;

pub use alloy_primitives::keccak256;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, PublicKey, SecretKey, SECP256K1};

use crate::error::TypesError;
use crate::primitives::{Address, Signature, B256};

fn address_of(public: &PublicKey) -> Address {
    let uncompressed = public.serialize_uncompressed();
    Address::from_word(keccak256(&uncompressed[1..]))
}

/// A secp256k1 private key together with its derived address.
#[derive(Clone)]
pub struct SigningKey {
    secret: SecretKey,
    address: Address,
}

impl SigningKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TypesError> {
        let secret =
            SecretKey::from_slice(bytes).map_err(|e| TypesError::InvalidKey(e.to_string()))?;
        Ok(Self::from_secret(secret))
    }

    /// Fresh key from the thread-local RNG.
    pub fn random() -> Self {
        Self::from_secret(SecretKey::new(&mut rand::thread_rng()))
    }

    fn from_secret(secret: SecretKey) -> Self {
        let public = PublicKey::from_secret_key(SECP256K1, &secret);
        Self {
            secret,
            address: address_of(&public),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Sign a 32-byte digest. The digest is signed as-is, no message prefix
    /// is applied.
    pub fn sign_digest(&self, digest: &B256) -> Signature {
        let message = Message::from_digest(digest.0);
        let signature = SECP256K1.sign_ecdsa_recoverable(&message, &self.secret);
        let (recovery_id, compact) = signature.serialize_compact();
        Signature {
            r: B256::from_slice(&compact[..32]),
            s: B256::from_slice(&compact[32..]),
            v: 27 + recovery_id.to_i32() as u8,
        }
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Recover the address that produced `signature` over `digest`.
pub fn recover_address(digest: &B256, signature: &Signature) -> Result<Address, TypesError> {
    let recovery = match signature.v {
        27 | 28 => i32::from(signature.v - 27),
        other => {
            return Err(TypesError::InvalidSignature(format!(
                "recovery byte must be 27 or 28, got {other}"
            )))
        }
    };
    let recovery_id =
        RecoveryId::from_i32(recovery).map_err(|e| TypesError::InvalidSignature(e.to_string()))?;

    let mut compact = [0u8; 64];
    compact[..32].copy_from_slice(signature.r.as_slice());
    compact[32..].copy_from_slice(signature.s.as_slice());
    let recoverable = RecoverableSignature::from_compact(&compact, recovery_id)
        .map_err(|e| TypesError::InvalidSignature(e.to_string()))?;

    let public = SECP256K1
        .recover_ecdsa(&Message::from_digest(digest.0), &recoverable)
        .map_err(|e| TypesError::Recovery(e.to_string()))?;
    Ok(address_of(&public))
}
