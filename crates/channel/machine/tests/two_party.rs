mod common;

use std::sync::Arc;

use async_trait::async_trait;
use channel_machine::{
    ClientActionMessage, InMemoryNetwork, InstallParams, MachineError, NotificationType,
    ProtocolParams, ResponseStatus, Signer, TurnTakingApp, UninstallParams, UpdateParams,
    ValidationError,
};
use channel_types::{Address, AppInterface, AssetType, Bytes, Signature, SigningKey, Terms, B256};

use common::{balance, open_channel, settled, spawn_party, spawn_party_with, Party, TURN_TAKING};

const MULTISIG: Address = Address::new([0x5a; 20]);

fn install_request(
    a: &Party,
    b: &Party,
    initiator_deposit: u128,
    responder_deposit: u128,
    state: Bytes,
) -> ClientActionMessage {
    ClientActionMessage::new(
        ProtocolParams::Install(InstallParams {
            initiator: a.address,
            responder: b.address,
            initiator_deposit,
            responder_deposit,
            app_interface: AppInterface::new(TURN_TAKING, "(uint8,uint8,uint128)", None),
            terms: Terms::new(
                AssetType::Eth,
                initiator_deposit + responder_deposit,
                Address::ZERO,
            ),
            default_timeout: 10,
            initial_state: state,
            initiator_signing_key: None,
            responder_signing_key: None,
        }),
        MULTISIG,
        a.address,
        b.address,
    )
}

/// Install an app from `a` and wait until `b` committed it too.
async fn install(a: &Party, b: &Party, state: Bytes) -> B256 {
    let request = install_request(a, b, 5, 3, state);
    let request_id = request.request_id;
    let proposal = a
        .executor
        .receive_client_action_message(request)
        .await
        .unwrap();
    assert_eq!(settled(b, request_id).await.status, ResponseStatus::Completed);
    proposal.app_identity_hash.unwrap()
}

async fn update(from: &Party, to: &Party, app: B256, state: Bytes) -> Result<(), MachineError> {
    let request = ClientActionMessage::new(
        ProtocolParams::Update(UpdateParams {
            app_identity_hash: app,
            new_state: state,
            timeout: None,
            version_number: None,
        }),
        MULTISIG,
        from.address,
        to.address,
    );
    let request_id = request.request_id;
    from.executor.receive_client_action_message(request).await?;
    assert_eq!(settled(to, request_id).await.status, ResponseStatus::Completed);
    Ok(())
}

#[tokio::test]
async fn setup_creates_identical_channels() {
    let network = InMemoryNetwork::new();
    let alice = spawn_party(&network).await;
    let bob = spawn_party(&network).await;
    let mut completed = alice
        .executor
        .subscribe(NotificationType::ProtocolCompleted)
        .await;

    open_channel(&alice, &bob, MULTISIG, 0).await;

    let ours = alice.executor.channel(&MULTISIG).await.unwrap();
    let theirs = bob.executor.channel(&MULTISIG).await.unwrap();
    assert_eq!(ours, theirs);
    assert_eq!(ours.root_nonce, 0);
    assert!(ours.has_owners(&alice.address, &bob.address));

    let notification = completed.recv().await.unwrap();
    assert_eq!(notification.channels, vec![MULTISIG]);
    assert_eq!(alice.sink.responses().await.len(), 1);
}

#[tokio::test]
async fn install_moves_deposits_on_both_sides() {
    let network = InMemoryNetwork::new();
    let alice = spawn_party(&network).await;
    let bob = spawn_party(&network).await;
    open_channel(&alice, &bob, MULTISIG, 20).await;

    let app = install(&alice, &bob, TurnTakingApp::encode_state(0, false, 0)).await;

    for party in [&alice, &bob] {
        assert_eq!(balance(party, MULTISIG, alice.address).await, 15);
        assert_eq!(balance(party, MULTISIG, bob.address).await, 17);
        let channel = party.executor.channel(&MULTISIG).await.unwrap();
        assert_eq!(channel.root_nonce, 1);
        let installed = &channel.app_instances[&app];
        assert_eq!(installed.latest_nonce, 0);
        assert_eq!(installed.terms.limit, 8);
    }

    let installed = alice.executor.channel(&MULTISIG).await.unwrap().app_instances[&app].clone();
    assert_ne!(installed.signing_key_of(&alice.address), alice.address);
    assert_ne!(installed.signing_key_of(&bob.address), bob.address);
    assert_eq!(
        installed,
        bob.executor.channel(&MULTISIG).await.unwrap().app_instances[&app]
    );
}

#[tokio::test]
async fn overdrawn_install_changes_nothing() {
    let network = InMemoryNetwork::new();
    let alice = spawn_party(&network).await;
    let bob = spawn_party(&network).await;
    open_channel(&alice, &bob, MULTISIG, 20).await;
    let before = alice.executor.channel(&MULTISIG).await.unwrap();

    let request = install_request(&alice, &bob, 21, 0, Bytes::from(vec![0]));
    let request_id = request.request_id;
    let initiator = alice.executor.clone();
    let run = tokio::spawn(async move { initiator.receive_client_action_message(request).await });

    let response = settled(&bob, request_id).await;
    assert_eq!(response.status, ResponseStatus::Error);
    assert!(response.error.unwrap().contains("insufficient free balance"));
    run.abort();

    assert_eq!(alice.executor.channel(&MULTISIG).await.unwrap(), before);
    assert_eq!(bob.executor.channel(&MULTISIG).await.unwrap(), before);
}

#[tokio::test]
async fn uninstall_returns_resolved_value() {
    let network = InMemoryNetwork::new();
    let alice = spawn_party(&network).await;
    let bob = spawn_party(&network).await;
    open_channel(&alice, &bob, MULTISIG, 20).await;
    let app = install(&alice, &bob, TurnTakingApp::encode_state(0, false, 6)).await;

    let request = ClientActionMessage::new(
        ProtocolParams::Uninstall(UninstallParams {
            app_identity_hash: app,
        }),
        MULTISIG,
        alice.address,
        bob.address,
    );
    let request_id = request.request_id;
    alice
        .executor
        .receive_client_action_message(request.clone())
        .await
        .unwrap();
    assert_eq!(settled(&bob, request_id).await.status, ResponseStatus::Completed);

    for party in [&alice, &bob] {
        let channel = party.executor.channel(&MULTISIG).await.unwrap();
        assert!(channel.app_instances.is_empty());
        assert_eq!(channel.root_nonce, 2);
        assert_eq!(balance(party, MULTISIG, alice.address).await, 21);
        assert_eq!(balance(party, MULTISIG, bob.address).await, 19);
    }

    let mut again = request;
    again.request_id = uuid::Uuid::new_v4();
    let err = alice
        .executor
        .receive_client_action_message(again)
        .await
        .unwrap_err();
    assert_eq!(
        err.root_cause(),
        &MachineError::Validation(ValidationError::AppNotFound(app))
    );
}

#[tokio::test]
async fn updates_alternate_until_terminal() {
    let network = InMemoryNetwork::new();
    let alice = spawn_party(&network).await;
    let bob = spawn_party(&network).await;
    open_channel(&alice, &bob, MULTISIG, 20).await;
    let app = install(&alice, &bob, TurnTakingApp::encode_state(0, false, 0)).await;

    update(&alice, &bob, app, TurnTakingApp::encode_state(1, false, 2))
        .await
        .unwrap();
    let err = update(&alice, &bob, app, TurnTakingApp::encode_state(2, false, 2))
        .await
        .unwrap_err();
    assert_eq!(
        err.root_cause(),
        &MachineError::Validation(ValidationError::NotTurnTaker {
            expected: bob.address,
            actual: alice.address,
        })
    );

    let terminal = TurnTakingApp::encode_state(2, true, 5);
    update(&bob, &alice, app, terminal.clone()).await.unwrap();
    for party in [&alice, &bob] {
        let installed = &party.executor.channel(&MULTISIG).await.unwrap().app_instances[&app];
        assert_eq!(installed.latest_nonce, 2);
        assert_eq!(installed.latest_state, terminal);
    }

    let err = update(&alice, &bob, app, TurnTakingApp::encode_state(3, false, 5))
        .await
        .unwrap_err();
    assert_eq!(
        err.root_cause(),
        &MachineError::Validation(ValidationError::TerminalState(app))
    );
}

/// Claims one address but signs with another key.
struct ForgingSigner {
    claimed: Address,
    actual: SigningKey,
}

#[async_trait]
impl Signer for ForgingSigner {
    fn address(&self) -> Address {
        self.claimed
    }

    async fn generate_key(&self) -> Result<Address, MachineError> {
        Ok(self.actual.address())
    }

    async fn sign(&self, _key: &Address, digest: &B256) -> Result<Signature, MachineError> {
        Ok(self.actual.sign_digest(digest))
    }
}

#[tokio::test]
async fn forged_signature_is_never_committed() {
    let network = InMemoryNetwork::new();
    let alice = spawn_party(&network).await;
    let mallory_key = SigningKey::random();
    let mallory = mallory_key.address();
    let forger = spawn_party_with(
        &network,
        Arc::new(ForgingSigner {
            claimed: SigningKey::random().address(),
            actual: mallory_key,
        }),
    )
    .await;
    let mut failed = alice.executor.subscribe(NotificationType::ProtocolFailed).await;

    let request = ClientActionMessage::new(
        ProtocolParams::Setup(channel_machine::SetupParams {
            multisig_address: MULTISIG,
            initiator: alice.address,
            responder: forger.address,
        }),
        MULTISIG,
        alice.address,
        forger.address,
    );
    let request_id = request.request_id;
    let err = alice
        .executor
        .receive_client_action_message(request)
        .await
        .unwrap_err();

    assert_eq!(
        err.root_cause(),
        &MachineError::Authorization {
            expected: forger.address,
            recovered: mallory,
        }
    );
    assert!(alice.executor.channel(&MULTISIG).await.is_none());
    assert_eq!(
        alice.sink.find(request_id).await.unwrap().status,
        ResponseStatus::Error
    );
    let notification = failed.recv().await.unwrap();
    assert_eq!(notification.request_id, request_id);
    assert!(notification.error.is_some());
}
