//! Property tests: install conserves value, identities are deterministic.

use channel_machine::model::AppInstanceSpec;
use channel_machine::proposer::{propose, ProposerContext};
use channel_machine::{AppInstance, AppRegistry, ChannelState, InstallParams, ProtocolParams};
use channel_types::{Address, AppInterface, AssetType, Bytes, NetworkContext, Terms};
use proptest::prelude::*;

const MULTISIG: Address = Address::new([7; 20]);
const ALICE: Address = Address::new([1; 20]);
const BOB: Address = Address::new([2; 20]);

fn funded(amount: u128) -> ChannelState {
    ChannelState::new(MULTISIG, vec![ALICE, BOB])
        .deposit(AssetType::Eth, ALICE, amount)
        .and_then(|ch| ch.deposit(AssetType::Eth, BOB, amount))
        .unwrap()
}

fn install(initiator_deposit: u128, responder_deposit: u128) -> ProtocolParams {
    ProtocolParams::Install(InstallParams {
        initiator: ALICE,
        responder: BOB,
        initiator_deposit,
        responder_deposit,
        app_interface: AppInterface::new(Address::new([9; 20]), "(uint8)", None),
        terms: Terms::new(
            AssetType::Eth,
            initiator_deposit + responder_deposit,
            Address::ZERO,
        ),
        default_timeout: 10,
        initial_state: Bytes::from(vec![0]),
        initiator_signing_key: None,
        responder_signing_key: None,
    })
}

fn spec(keys: (u8, u8), timeout: u64, sequence: u64) -> AppInstanceSpec {
    AppInstanceSpec {
        multisig_address: MULTISIG,
        participants: vec![ALICE, BOB],
        signing_keys: [(ALICE, Address::new([keys.0; 20])), (BOB, Address::new([keys.1; 20]))]
            .into_iter()
            .collect(),
        app_interface: AppInterface::new(Address::new([9; 20]), "(uint8)", None),
        terms: Terms::new(AssetType::Eth, 8, Address::ZERO),
        default_timeout: timeout,
        is_virtual: false,
        app_sequence_number: sequence,
        root_nonce_value: sequence,
        initial_state: Bytes::from(vec![0]),
        deposits: Default::default(),
    }
}

proptest! {
    #[test]
    fn install_balance_law(funding in 0u128..1_000, a in 0u128..1_200, b in 0u128..1_200) {
        let network = NetworkContext::default();
        let apps = AppRegistry::new();
        let ctx = ProposerContext {
            network: &network,
            apps: &apps,
            self_address: ALICE,
            requested_by: ALICE,
            multisig: MULTISIG,
        };
        let channels = [(MULTISIG, funded(funding))].into_iter().collect();

        match propose(&install(a, b), &channels, &ctx) {
            Ok(proposal) => {
                prop_assert!(a <= funding && b <= funding);
                let next = &proposal.state[&MULTISIG];
                let fb = next.free_balance(AssetType::Eth).unwrap();
                prop_assert_eq!(fb.balance_of(&ALICE), funding - a);
                prop_assert_eq!(fb.balance_of(&BOB), funding - b);
                let locked: u128 = next.app_instances.values().map(AppInstance::locked_value).sum();
                prop_assert_eq!(fb.total() + locked, 2 * funding);
                prop_assert_eq!(next.root_nonce, 1);
            }
            Err(_) => prop_assert!(a > funding || b > funding),
        }
    }

    #[test]
    fn identity_hash_is_deterministic(
        k0 in 1u8..=255,
        k1 in 1u8..=255,
        timeout in 1u64..10_000,
        sequence in 1u64..100,
    ) {
        let first = AppInstance::new(spec((k0, k1), timeout, sequence));
        let second = AppInstance::new(spec((k0, k1), timeout, sequence));
        prop_assert_eq!(first.identity_hash, second.identity_hash);

        let other_timeout = AppInstance::new(spec((k0, k1), timeout + 1, sequence));
        prop_assert_ne!(first.identity_hash, other_timeout.identity_hash);
    }
}
