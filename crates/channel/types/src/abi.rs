//! Bindings for the contracts channel commitments call.
//!
//! Structs and functions are declared with `sol!`, so call data, selectors
//! and canonical signatures come from `alloy-sol-types`. The struct names
//! follow their on-chain counterparts; the Rust-side descriptors in
//! [`crate::app`] convert into them with `to_abi`.

use alloy_primitives::{keccak256, Selector};
use alloy_sol_types::sol;

sol! {
    /// `(uint8,uint256,address)`: asset class, limit and token of an app.
    struct Terms {
        uint8 assetType;
        uint256 limit;
        address token;
    }

    struct AppIdentity {
        address owner;
        address[] signingKeys;
        bytes32 appInterfaceHash;
        bytes32 termsHash;
        uint256 defaultTimeout;
    }

    struct SignedStateHashUpdate {
        bytes32 stateHash;
        uint256 nonce;
        uint256 timeout;
        bytes signatures;
    }

    struct VirtualAppAgreement {
        address registry;
        address nonceRegistry;
        uint256 expiry;
        uint256 capital;
        address[] beneficiaries;
        bytes32 uninstallKey;
        uint256 rootNonceValue;
        bytes32 target;
        Terms terms;
    }

    interface IMultisig {
        function execTransaction(
            address to,
            uint256 value,
            bytes data,
            uint8 operation,
            bytes signatures
        ) external;
    }

    interface IMultiSend {
        function multiSend(bytes transactions) external;
    }

    /// Registry entry point guarded by the app's signing keys.
    interface IAppRegistry {
        function setState(AppIdentity appIdentity, SignedStateHashUpdate req) external;
    }

    /// Registry entry point the owning multisig calls directly.
    interface IAppRegistryOwner {
        function setState(
            bytes32 appIdentityHash,
            bytes32 stateHash,
            uint256 nonce,
            uint256 timeout
        ) external;
    }

    interface INonceRegistry {
        function setNonce(uint256 timeout, bytes32 salt, uint256 nonceValue) external;
    }

    interface IStateChannelTransaction {
        function executeAppConditionalTransaction(
            address appRegistry,
            address nonceRegistry,
            bytes32 uninstallKey,
            uint256 rootNonceExpectedValue,
            bytes32 appIdentityHash,
            Terms terms
        ) external;
    }

    interface IVirtualAppAgreement {
        function delegateTarget(VirtualAppAgreement agreement) external;
    }
}

/// Selector of a signature only known at runtime, such as the functions of
/// an app definition whose state encoding is configured per app.
pub fn selector(signature: &str) -> Selector {
    let hash = keccak256(signature.as_bytes());
    Selector::new([hash[0], hash[1], hash[2], hash[3]])
}

#[cfg(test)]
mod tests {
    use alloy_sol_types::SolCall;

    use super::*;

    #[test]
    fn known_selector() {
        assert_eq!(
            selector("transfer(address,uint256)"),
            Selector::new([0xa9, 0x05, 0x9c, 0xbb])
        );
    }

    #[test]
    fn runtime_selectors_match_bindings() {
        let sig = IMultisig::execTransactionCall::SIGNATURE;
        assert_eq!(sig, "execTransaction(address,uint256,bytes,uint8,bytes)");
        assert_eq!(selector(sig).0, IMultisig::execTransactionCall::SELECTOR);
    }

    #[test]
    fn struct_arguments_expand_to_tuples() {
        assert_eq!(
            IStateChannelTransaction::executeAppConditionalTransactionCall::SIGNATURE,
            "executeAppConditionalTransaction(address,address,bytes32,uint256,bytes32,(uint8,uint256,address))"
        );
        assert_eq!(
            IAppRegistry::setStateCall::SIGNATURE,
            "setState((address,address[],bytes32,bytes32,uint256),(bytes32,uint256,uint256,bytes))"
        );
    }
}
