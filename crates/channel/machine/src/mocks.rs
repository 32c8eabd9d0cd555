//! In-process collaborators for tests and local wiring.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use channel_types::{Address, Bytes, Signature, SigningKey, Terms, B256};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

use crate::apps::AppDefinition;
use crate::error::{AppError, MachineError, PersistenceError, TransportError};
use crate::executor::{InstructionExecutor, Response};
use crate::model::{ChannelState, ChannelStates};
use crate::protocol::{AppInstanceProposal, ClientActionMessage};
use crate::traits::{MessageKey, ResponseSink, Signer, StateChannelPersistence, Transport};

const INBOUND_CAPACITY: usize = 64;

/// (recipient, request, sender)
type Slot = (Address, Uuid, Address);

#[derive(Default)]
struct NetworkInner {
    inbound: HashMap<Address, mpsc::Sender<ClientActionMessage>>,
    waiters: HashMap<Slot, oneshot::Sender<ClientActionMessage>>,
    mailbox: HashMap<Slot, VecDeque<ClientActionMessage>>,
    /// Parties already taking part in a request.
    active: HashSet<(Address, Uuid)>,
}

/// Message router shared by every in-process party.
///
/// The first message a party receives for a request goes to its inbound
/// queue, where it starts an acknowledging run. Later messages for the same
/// request go to whoever waits for them, or are held until they do.
#[derive(Clone, Default)]
pub struct InMemoryNetwork {
    inner: Arc<Mutex<NetworkInner>>,
}

impl InMemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport for `address` without an inbound queue.
    pub fn transport(&self, address: Address) -> InMemoryTransport {
        InMemoryTransport {
            network: self.clone(),
            address,
        }
    }

    /// Transport for `address` plus the queue of requests addressed to it.
    pub async fn endpoint(
        &self,
        address: Address,
    ) -> (InMemoryTransport, mpsc::Receiver<ClientActionMessage>) {
        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
        self.inner.lock().await.inbound.insert(address, tx);
        (self.transport(address), rx)
    }
}

#[derive(Clone)]
pub struct InMemoryTransport {
    network: InMemoryNetwork,
    address: Address,
}

impl InMemoryTransport {
    pub fn address(&self) -> Address {
        self.address
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn send_message(&self, message: ClientActionMessage) -> Result<(), TransportError> {
        let mut inner = self.network.inner.lock().await;
        let request_id = message.request_id;
        let to = message.to_address;
        inner.active.insert((message.from_address, request_id));

        let slot = (to, request_id, message.from_address);
        if let Some(waiter) = inner.waiters.remove(&slot) {
            return waiter.send(message).map_err(|_| TransportError::Closed);
        }
        if inner.active.contains(&(to, request_id)) {
            inner.mailbox.entry(slot).or_default().push_back(message);
            return Ok(());
        }

        let inbound = inner
            .inbound
            .get(&to)
            .ok_or_else(|| TransportError::Delivery(format!("no endpoint for {to}")))?;
        inbound.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                TransportError::Delivery(format!("inbound queue of {to} is full"))
            }
            mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
        })?;
        inner.active.insert((to, request_id));
        debug!(request_id = %request_id, to = %to, "Request delivered to inbound queue");
        Ok(())
    }

    async fn wait_for(&self, key: MessageKey) -> Result<ClientActionMessage, TransportError> {
        let receiver = {
            let mut inner = self.network.inner.lock().await;
            let slot = (self.address, key.request_id, key.from_address);
            if let Some(message) = inner.mailbox.get_mut(&slot).and_then(VecDeque::pop_front) {
                return Ok(message);
            }
            let (tx, rx) = oneshot::channel();
            inner.waiters.insert(slot, tx);
            rx
        };
        receiver.await.map_err(|_| TransportError::Closed)
    }
}

/// Answer every inbound request with an acknowledging run on its own task.
pub fn serve_inbound(
    executor: Arc<InstructionExecutor>,
    mut inbound: mpsc::Receiver<ClientActionMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = inbound.recv().await {
            let executor = executor.clone();
            tokio::spawn(async move {
                // Outcome reaches the response sink and observers.
                let _ = executor.receive_client_action_message_ack(message).await;
            });
        }
    })
}

/// Owner key plus any app keys generated during installs.
pub struct LocalSigner {
    owner: SigningKey,
    keyring: Mutex<HashMap<Address, SigningKey>>,
}

impl LocalSigner {
    pub fn new(owner: SigningKey) -> Self {
        Self {
            owner,
            keyring: Mutex::new(HashMap::new()),
        }
    }

    pub fn random() -> Self {
        Self::new(SigningKey::random())
    }
}

impl std::fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSigner")
            .field("address", &self.owner.address())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Signer for LocalSigner {
    fn address(&self) -> Address {
        self.owner.address()
    }

    async fn generate_key(&self) -> Result<Address, MachineError> {
        let key = SigningKey::random();
        let address = key.address();
        self.keyring.lock().await.insert(address, key);
        Ok(address)
    }

    async fn sign(&self, key: &Address, digest: &B256) -> Result<Signature, MachineError> {
        if *key == self.owner.address() {
            return Ok(self.owner.sign_digest(digest));
        }
        self.keyring
            .lock()
            .await
            .get(key)
            .map(|k| k.sign_digest(digest))
            .ok_or_else(|| MachineError::Signer(format!("no key for {key}")))
    }
}

/// Keeps every response it receives.
#[derive(Debug, Default)]
pub struct RecordingResponseSink {
    responses: Mutex<Vec<Response>>,
}

impl RecordingResponseSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn responses(&self) -> Vec<Response> {
        self.responses.lock().await.clone()
    }

    pub async fn find(&self, request_id: Uuid) -> Option<Response> {
        self.responses
            .lock()
            .await
            .iter()
            .find(|r| r.request_id == request_id)
            .cloned()
    }
}

#[async_trait]
impl ResponseSink for RecordingResponseSink {
    async fn send_response(&self, response: Response) {
        self.responses.lock().await.push(response);
    }
}

#[derive(Debug, Default)]
pub struct MemoryPersistence {
    channels: Mutex<ChannelStates>,
    proposals: Mutex<HashMap<B256, AppInstanceProposal>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_proposal(&self, id: B256, proposal: AppInstanceProposal) {
        self.proposals.lock().await.insert(id, proposal);
    }

    pub async fn saved(&self, multisig: &Address) -> Option<ChannelState> {
        self.channels.lock().await.get(multisig).cloned()
    }
}

#[async_trait]
impl StateChannelPersistence for MemoryPersistence {
    async fn save_state_channel(&self, channel: &ChannelState) -> Result<(), PersistenceError> {
        self.channels
            .lock()
            .await
            .insert(channel.multisig_address, channel.clone());
        Ok(())
    }

    async fn get_all_channels(&self) -> Result<ChannelStates, PersistenceError> {
        Ok(self.channels.lock().await.clone())
    }

    async fn get_app_instance_proposal(
        &self,
        id: &B256,
    ) -> Result<AppInstanceProposal, PersistenceError> {
        self.proposals
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or(PersistenceError::ProposalNotFound(*id))
    }
}

/// Two-player app used to exercise update and uninstall rules.
///
/// State: `turn: u8 ‖ terminal: u8 ‖ payout: u128 (big-endian)`. The
/// participant at `turn % 2` moves next. On resolution the first participant
/// receives `payout` (capped at the terms limit) and the second the rest.
#[derive(Debug, Clone, Copy, Default)]
pub struct TurnTakingApp;

impl TurnTakingApp {
    const STATE_LEN: usize = 18;

    pub fn encode_state(turn: u8, terminal: bool, payout: u128) -> Bytes {
        let mut state = Vec::with_capacity(Self::STATE_LEN);
        state.push(turn);
        state.push(u8::from(terminal));
        state.extend_from_slice(&payout.to_be_bytes());
        Bytes::from(state)
    }

    fn decode(state: &[u8]) -> Result<(u8, bool, u128), AppError> {
        if state.len() != Self::STATE_LEN {
            return Err(AppError::StateLength {
                expected: Self::STATE_LEN,
                actual: state.len(),
            });
        }
        let mut payout = [0u8; 16];
        payout.copy_from_slice(&state[2..]);
        Ok((state[0], state[1] != 0, u128::from_be_bytes(payout)))
    }

    fn pair(participants: &[Address]) -> Result<(Address, Address), AppError> {
        match participants {
            [first, second] => Ok((*first, *second)),
            other => Err(AppError::ParticipantCount {
                expected: 2,
                actual: other.len(),
            }),
        }
    }
}

impl AppDefinition for TurnTakingApp {
    fn is_state_terminal(&self, state: &[u8]) -> Result<bool, AppError> {
        Self::decode(state).map(|(_, terminal, _)| terminal)
    }

    fn turn_taker(&self, state: &[u8], participants: &[Address]) -> Result<Address, AppError> {
        let (turn, _, _) = Self::decode(state)?;
        let (first, second) = Self::pair(participants)?;
        Ok(if turn % 2 == 0 { first } else { second })
    }

    fn resolve(
        &self,
        state: &[u8],
        participants: &[Address],
        terms: &Terms,
    ) -> Result<BTreeMap<Address, u128>, AppError> {
        let (_, _, payout) = Self::decode(state)?;
        let (first, second) = Self::pair(participants)?;
        let paid = payout.min(terms.limit);
        Ok([(first, paid), (second, terms.limit - paid)]
            .into_iter()
            .collect())
    }
}
