#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use channel_machine::{
    serve_inbound, ClientActionMessage, ExecutorConfig, InMemoryNetwork, InstructionExecutor,
    LocalSigner, ProtocolParams, RecordingResponseSink, Response, SetupParams, Signer,
    TurnTakingApp,
};
use channel_types::{Address, AssetType};
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Definition address `TurnTakingApp` is registered under.
pub const TURN_TAKING: Address = Address::new([0x99; 20]);

pub struct Party {
    pub address: Address,
    pub executor: Arc<InstructionExecutor>,
    pub sink: Arc<RecordingResponseSink>,
    inbound: JoinHandle<()>,
}

impl Drop for Party {
    fn drop(&mut self) {
        self.inbound.abort();
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub async fn spawn_party(network: &InMemoryNetwork) -> Party {
    spawn_party_with(network, Arc::new(LocalSigner::random())).await
}

/// Party signing with `signer`, reachable at `signer.address()`.
pub async fn spawn_party_with(network: &InMemoryNetwork, signer: Arc<dyn Signer>) -> Party {
    init_tracing();
    let address = signer.address();
    let (transport, inbound) = network.endpoint(address).await;
    let sink = Arc::new(RecordingResponseSink::new());

    let mut executor = InstructionExecutor::new(ExecutorConfig::default(), sink.clone());
    executor.register_capabilities(signer, Arc::new(transport));
    executor.register_app(TURN_TAKING, Arc::new(TurnTakingApp));
    let executor = Arc::new(executor);
    let inbound = serve_inbound(executor.clone(), inbound);

    Party {
        address,
        executor,
        sink,
        inbound,
    }
}

/// The response `party` sent for `request_id`, once its run has ended.
pub async fn settled(party: &Party, request_id: Uuid) -> Response {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let Some(response) = party.sink.find(request_id).await {
                return response;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("party did not finish the run")
}

/// Set up `multisig` between `a` and `b` and credit each with `amount` ETH.
pub async fn open_channel(a: &Party, b: &Party, multisig: Address, amount: u128) {
    let request = ClientActionMessage::new(
        ProtocolParams::Setup(SetupParams {
            multisig_address: multisig,
            initiator: a.address,
            responder: b.address,
        }),
        multisig,
        a.address,
        b.address,
    );
    let request_id = request.request_id;
    a.executor
        .receive_client_action_message(request)
        .await
        .expect("setup failed");
    settled(b, request_id).await;

    for party in [a, b] {
        let funded = party
            .executor
            .channel(&multisig)
            .await
            .expect("channel set up")
            .deposit(AssetType::Eth, a.address, amount)
            .and_then(|ch| ch.deposit(AssetType::Eth, b.address, amount))
            .expect("deposit");
        party
            .executor
            .mutate_state([(multisig, funded)].into_iter().collect())
            .await
            .expect("funding");
    }
}

pub async fn balance(party: &Party, multisig: Address, who: Address) -> u128 {
    party
        .executor
        .channel(&multisig)
        .await
        .expect("channel exists")
        .free_balance(AssetType::Eth)
        .expect("eth free balance")
        .balance_of(&who)
}
