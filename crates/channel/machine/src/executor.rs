//! Instruction executor: owner of the channel map and the middleware pipeline.

use std::sync::Arc;

use channel_types::{Address, B256};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::action::ActionExecution;
use crate::apps::AppDefinition;
use crate::config::ExecutorConfig;
use crate::error::MachineError;
use crate::middleware::{
    ChannelStore, ExecutionEnv, KeyGenerateMiddleware, MiddlewarePipeline, SignMiddleware,
    TransportSendMiddleware, TransportWaitMiddleware,
};
use crate::model::{ChannelState, ChannelStates};
use crate::observer::{Notification, NotificationType, ObserverRegistry};
use crate::proposer::StateProposal;
use crate::protocol::{ClientActionMessage, Opcode, Protocol, ProtocolParams, Role};
use crate::traits::{
    Middleware, RecoveringValidator, ResponseSink, SignatureValidator, Signer,
    StateChannelPersistence, Transport,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStatus {
    Completed,
    Error,
}

/// Terminal status of one protocol run, sent to the response sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub request_id: Uuid,
    pub status: ResponseStatus,
    pub error: Option<String>,
}

/// Runs protocols for one party.
///
/// The party is the signer handed to
/// [`register_capabilities`](Self::register_capabilities), or the address
/// given to [`with_identity`](Self::with_identity). Messages that do not
/// start from or arrive at that address are refused. Channels are only ever changed by the commit step of a successful run or
/// by [`mutate_state`](Self::mutate_state). Runs against the same multisig
/// must be serialized by the caller; the executor takes no per-channel lock.
pub struct InstructionExecutor {
    config: ExecutorConfig,
    identity: Option<Address>,
    pipeline: MiddlewarePipeline,
    env: ExecutionEnv,
    observers: ObserverRegistry,
    responses: Arc<dyn ResponseSink>,
    persistence: Option<Arc<dyn StateChannelPersistence>>,
}

impl InstructionExecutor {
    /// Executor with the built-in handlers and secp256k1 signature recovery.
    pub fn new(config: ExecutorConfig, responses: Arc<dyn ResponseSink>) -> Self {
        let env = ExecutionEnv {
            channels: ChannelStore::new(),
            network: config.network.clone(),
            apps: Default::default(),
        };
        Self {
            identity: None,
            observers: ObserverRegistry::new(config.observer_capacity),
            pipeline: MiddlewarePipeline::with_builtins(Arc::new(RecoveringValidator)),
            env,
            responses,
            persistence: None,
            config,
        }
    }

    /// Replace the signature validator.
    ///
    /// Rebuilds the pipeline, so call it before registering any handler.
    pub fn with_validator(mut self, validator: Arc<dyn SignatureValidator>) -> Self {
        self.pipeline = MiddlewarePipeline::with_builtins(validator);
        self
    }

    pub fn with_persistence(mut self, persistence: Arc<dyn StateChannelPersistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Run as `address` without a signer, for pipelines whose signing
    /// handlers are registered by hand.
    pub fn with_identity(mut self, address: Address) -> Self {
        self.identity = Some(address);
        self
    }

    pub fn identity(&self) -> Option<Address> {
        self.identity
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &MiddlewarePipeline {
        &self.pipeline
    }

    /// Append a handler for `opcode`.
    pub fn register(&mut self, opcode: Opcode, handler: Arc<dyn Middleware>) {
        self.pipeline.register(opcode, handler);
    }

    /// Register the key and network handlers a party needs to run protocols
    /// against real peers. The executor acts as `signer.address()` from now on.
    pub fn register_capabilities(&mut self, signer: Arc<dyn Signer>, transport: Arc<dyn Transport>) {
        self.identity = Some(signer.address());
        self.register(
            Opcode::KeyGenerate,
            Arc::new(KeyGenerateMiddleware::new(signer.clone())),
        );
        self.register(Opcode::OpSign, Arc::new(SignMiddleware::new(signer)));
        self.register(
            Opcode::IoSend,
            Arc::new(TransportSendMiddleware::new(transport.clone())),
        );
        self.register(Opcode::IoWait, Arc::new(TransportWaitMiddleware::new(transport)));
    }

    /// Make the rules of the app at `addr` available to Update and Uninstall.
    pub fn register_app(&mut self, addr: Address, app: Arc<dyn AppDefinition>) {
        info!(definition = %addr, "App definition registered");
        self.env.apps.register(addr, app);
    }

    /// Start `message.action` as the initiating party, which must be this
    /// executor's identity.
    pub async fn receive_client_action_message(
        &self,
        message: ClientActionMessage,
    ) -> Result<StateProposal, MachineError> {
        let self_address = self.identity.unwrap_or(message.from_address);
        let role = self
            .addressed(&message, message.from_address)
            .map(|()| Role::Initiator);
        self.execute(message, self_address, role).await
    }

    /// Answer a protocol message addressed to this executor's identity.
    ///
    /// A virtual install is run as intermediary or responder depending on
    /// which of the two this party is.
    pub async fn receive_client_action_message_ack(
        &self,
        message: ClientActionMessage,
    ) -> Result<StateProposal, MachineError> {
        let self_address = self.identity.unwrap_or(message.to_address);
        let role = self
            .addressed(&message, message.to_address)
            .and_then(|()| ack_role(&message, &self_address));
        self.execute(message, self_address, role).await
    }

    fn addressed(&self, message: &ClientActionMessage, party: Address) -> Result<(), MachineError> {
        let local = self
            .identity
            .ok_or_else(|| MachineError::Config("no identity bound".into()))?;
        if party != local {
            return Err(MachineError::NotAddressed {
                local,
                from: message.from_address,
                to: message.to_address,
            });
        }
        Ok(())
    }

    async fn execute(
        &self,
        message: ClientActionMessage,
        self_address: Address,
        role: Result<Role, MachineError>,
    ) -> Result<StateProposal, MachineError> {
        let request_id = message.request_id;
        let protocol = message.action;
        let known_role = role.as_ref().ok().copied();
        info!(
            request_id = %request_id,
            protocol = %protocol,
            role = ?known_role,
            party = %self_address,
            seq = message.seq,
            "Protocol run started"
        );

        let outcome = match self.run_protocol(message, self_address, role).await {
            Ok(proposal) => self.persist(&proposal.state).await.map(|()| proposal),
            Err(e) => Err(e),
        };

        let (response, notification) = match &outcome {
            Ok(proposal) => {
                info!(
                    request_id = %request_id,
                    protocol = %protocol,
                    channels = proposal.state.len(),
                    "Protocol run completed"
                );
                (
                    Response {
                        request_id,
                        status: ResponseStatus::Completed,
                        error: None,
                    },
                    Notification {
                        kind: NotificationType::ProtocolCompleted,
                        request_id,
                        protocol,
                        role: known_role,
                        channels: proposal.state.keys().copied().collect(),
                        error: None,
                        timestamp: Utc::now(),
                    },
                )
            }
            Err(e) => {
                warn!(
                    request_id = %request_id,
                    protocol = %protocol,
                    error = %e,
                    "Protocol run failed"
                );
                (
                    Response {
                        request_id,
                        status: ResponseStatus::Error,
                        error: Some(e.to_string()),
                    },
                    Notification {
                        kind: NotificationType::ProtocolFailed,
                        request_id,
                        protocol,
                        role: known_role,
                        channels: Vec::new(),
                        error: Some(e.to_string()),
                        timestamp: Utc::now(),
                    },
                )
            }
        };

        self.responses.send_response(response).await;
        self.observers.notify(&notification).await;
        outcome
    }

    async fn run_protocol(
        &self,
        message: ClientActionMessage,
        self_address: Address,
        role: Result<Role, MachineError>,
    ) -> Result<StateProposal, MachineError> {
        message.validate()?;
        let execution = ActionExecution::new(message, role?, self_address, &self.pipeline, &self.env)?;
        let results = execution.run_all().await?;
        results.proposal.ok_or(MachineError::NoProposal)
    }

    async fn persist(&self, committed: &ChannelStates) -> Result<(), MachineError> {
        let Some(persistence) = self.persistence.as_ref() else {
            return Ok(());
        };
        if !self.config.persist_on_commit {
            return Ok(());
        }
        for channel in committed.values() {
            if let Err(e) = persistence.save_state_channel(channel).await {
                error!(
                    multisig = %channel.multisig_address,
                    error = %e,
                    "Committed channel could not be persisted"
                );
                return Err(e.into());
            }
        }
        Ok(())
    }

    /// Apply an already agreed set of channel snapshots.
    pub async fn mutate_state(&self, states: ChannelStates) -> Result<(), MachineError> {
        self.env.channels.apply(states).await?;
        Ok(())
    }

    pub async fn channel(&self, multisig: &Address) -> Option<ChannelState> {
        self.env.channels.get(multisig).await
    }

    pub async fn channels(&self) -> ChannelStates {
        self.env.channels.snapshot().await
    }

    /// Hydrate the channel map from persistence. Returns how many channels
    /// were loaded.
    pub async fn load_channels(&self) -> Result<usize, MachineError> {
        let persistence = self.require_persistence()?;
        let stored = persistence.get_all_channels().await?;
        let count = stored.len();
        self.env.channels.apply(stored).await?;
        info!(channels = count, "Channels loaded from persistence");
        Ok(count)
    }

    /// Install parameters for a stored app instance proposal.
    pub async fn params_for_proposal(&self, id: &B256) -> Result<ProtocolParams, MachineError> {
        let persistence = self.require_persistence()?;
        let proposal = persistence.get_app_instance_proposal(id).await?;
        Ok(proposal.into_params()?)
    }

    pub async fn subscribe(&self, kind: NotificationType) -> mpsc::Receiver<Notification> {
        self.observers.subscribe(kind).await
    }

    fn require_persistence(&self) -> Result<&Arc<dyn StateChannelPersistence>, MachineError> {
        self.persistence
            .as_ref()
            .ok_or_else(|| MachineError::Config("no persistence configured".into()))
    }
}

impl std::fmt::Debug for InstructionExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstructionExecutor")
            .field("config", &self.config)
            .field("identity", &self.identity)
            .field("pipeline", &self.pipeline)
            .field("apps", &self.env.apps)
            .field("persistence", &self.persistence.is_some())
            .finish()
    }
}

fn ack_role(message: &ClientActionMessage, self_address: &Address) -> Result<Role, MachineError> {
    if message.action != Protocol::InstallVirtualApp {
        return Ok(Role::Responder);
    }
    let ProtocolParams::InstallVirtualApp(params) = &message.data else {
        return Err(MachineError::ParamsMismatch {
            protocol: message.action,
        });
    };
    if *self_address == params.intermediary {
        Ok(Role::Intermediary)
    } else if *self_address == params.responder {
        Ok(Role::Responder)
    } else {
        Err(MachineError::RoleMismatch {
            protocol: message.action,
            role: Role::Responder,
        })
    }
}

#[cfg(test)]
mod tests {
    use channel_types::{AppInterface, Bytes};

    use super::*;
    use crate::error::ValidationError;
    use crate::mocks::{MemoryPersistence, RecordingResponseSink};
    use crate::protocol::{AppInstanceProposal, InstallVirtualAppParams, SetupParams, UninstallParams};

    fn executor() -> (InstructionExecutor, Arc<RecordingResponseSink>) {
        let sink = Arc::new(RecordingResponseSink::new());
        (
            InstructionExecutor::new(ExecutorConfig::default(), sink.clone())
                .with_identity(Address::new([1; 20])),
            sink,
        )
    }

    fn setup_request(from: Address, to: Address) -> ClientActionMessage {
        ClientActionMessage::new(
            ProtocolParams::Setup(SetupParams {
                multisig_address: Address::new([7; 20]),
                initiator: from,
                responder: to,
            }),
            Address::new([7; 20]),
            from,
            to,
        )
    }

    fn virtual_request(intermediary: Address) -> ClientActionMessage {
        ClientActionMessage::new(
            ProtocolParams::InstallVirtualApp(InstallVirtualAppParams {
                initiator: Address::new([1; 20]),
                responder: Address::new([2; 20]),
                intermediary,
                initiator_deposit: 1,
                responder_deposit: 1,
                initiator_deposit_token: Address::ZERO,
                responder_deposit_token: Address::ZERO,
                app_interface: AppInterface::new(Address::new([9; 20]), "(uint8)", None),
                default_timeout: 10,
                initial_state: Bytes::default(),
                expiry: 100,
            }),
            Address::new([7; 20]),
            Address::new([1; 20]),
            intermediary,
        )
    }

    #[test]
    fn ack_role_follows_virtual_position() {
        let m = Address::new([3; 20]);
        let request = virtual_request(m);
        assert_eq!(ack_role(&request, &m).unwrap(), Role::Intermediary);
        assert_eq!(ack_role(&request, &Address::new([2; 20])).unwrap(), Role::Responder);
        assert!(matches!(
            ack_role(&request, &Address::new([5; 20])),
            Err(MachineError::RoleMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn structural_error_reports_error_status() {
        let (executor, sink) = executor();
        let mut failed = executor.subscribe(NotificationType::ProtocolFailed).await;
        let mut request = setup_request(Address::new([1; 20]), Address::new([2; 20]));
        request.action = Protocol::Update;

        let err = executor
            .receive_client_action_message(request.clone())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            MachineError::ParamsMismatch {
                protocol: Protocol::Update
            }
        );

        let response = sink.find(request.request_id).await.unwrap();
        assert_eq!(response.status, ResponseStatus::Error);
        let notification = failed.recv().await.unwrap();
        assert_eq!(notification.request_id, request.request_id);
        assert!(notification.channels.is_empty());
        assert!(executor.channels().await.is_empty());
    }

    #[tokio::test]
    async fn failed_run_leaves_channels_untouched() {
        let (executor, sink) = executor();
        let channel = ChannelState::new(Address::new([7; 20]), vec![Address::new([1; 20]), Address::new([2; 20])]);
        executor
            .mutate_state([(channel.multisig_address, channel.clone())].into_iter().collect())
            .await
            .unwrap();

        let request = ClientActionMessage::new(
            ProtocolParams::Uninstall(UninstallParams {
                app_identity_hash: B256::new([4; 32]),
            }),
            Address::new([7; 20]),
            Address::new([1; 20]),
            Address::new([2; 20]),
        );
        let err = executor
            .receive_client_action_message(request.clone())
            .await
            .unwrap_err();
        assert_eq!(
            err.root_cause(),
            &MachineError::Validation(ValidationError::AppNotFound(B256::new([4; 32])))
        );
        assert_eq!(executor.channel(&Address::new([7; 20])).await, Some(channel));
        assert_eq!(
            sink.find(request.request_id).await.unwrap().status,
            ResponseStatus::Error
        );
    }

    #[tokio::test]
    async fn persistence_backs_loading_and_proposals() {
        let persistence = Arc::new(MemoryPersistence::new());
        let channel = ChannelState::new(Address::new([7; 20]), vec![Address::new([1; 20]), Address::new([2; 20])]);
        persistence.save_state_channel(&channel).await.unwrap();
        persistence
            .insert_proposal(
                B256::new([5; 32]),
                AppInstanceProposal {
                    initiator: Address::new([1; 20]),
                    responder: Address::new([2; 20]),
                    intermediary: None,
                    initiator_deposit: 2,
                    responder_deposit: 3,
                    initiator_deposit_token: Address::ZERO,
                    responder_deposit_token: Address::ZERO,
                    app_interface: AppInterface::new(Address::new([9; 20]), "(uint8)", None),
                    default_timeout: 10,
                    initial_state: Bytes::default(),
                    expiry: 0,
                },
            )
            .await;

        let (executor, _) = executor();
        assert!(matches!(
            executor.load_channels().await,
            Err(MachineError::Config(_))
        ));

        let executor = executor.with_persistence(persistence);
        assert_eq!(executor.load_channels().await.unwrap(), 1);
        assert_eq!(executor.channel(&Address::new([7; 20])).await, Some(channel));

        let ProtocolParams::Install(params) =
            executor.params_for_proposal(&B256::new([5; 32])).await.unwrap()
        else {
            panic!("install params expected");
        };
        assert_eq!(params.terms.limit, 5);
    }

    #[test]
    fn capabilities_extend_the_builtin_pipeline() {
        let (mut executor, _) = executor();
        assert_eq!(executor.pipeline().handler_count(Opcode::OpSign), 1);

        let network = crate::mocks::InMemoryNetwork::new();
        let transport = Arc::new(network.transport(Address::new([1; 20])));
        let signer = Arc::new(crate::mocks::LocalSigner::random());
        let address = signer.address();
        executor.register_capabilities(signer, transport);
        assert_eq!(executor.identity(), Some(address));
        assert_eq!(executor.pipeline().handler_count(Opcode::OpSign), 2);
        assert_eq!(executor.pipeline().handler_count(Opcode::KeyGenerate), 1);
        assert_eq!(executor.pipeline().handler_count(Opcode::IoSend), 1);
        assert_eq!(executor.pipeline().handler_count(Opcode::IoWait), 1);
    }

    #[tokio::test]
    async fn runs_for_other_parties_are_refused() {
        let (executor, sink) = executor();
        let me = Address::new([1; 20]);
        let (bob, carol) = (Address::new([2; 20]), Address::new([3; 20]));

        let request = setup_request(bob, carol);
        let err = executor
            .receive_client_action_message(request.clone())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            MachineError::NotAddressed {
                local: me,
                from: bob,
                to: carol
            }
        );
        assert_eq!(
            sink.find(request.request_id).await.unwrap().status,
            ResponseStatus::Error
        );

        // initiating as ourselves does not make us the recipient
        let err = executor
            .receive_client_action_message_ack(setup_request(me, bob))
            .await
            .unwrap_err();
        assert!(matches!(err, MachineError::NotAddressed { .. }));
        assert!(executor.channels().await.is_empty());
    }

    #[tokio::test]
    async fn unbound_executor_runs_nothing() {
        let sink = Arc::new(RecordingResponseSink::new());
        let executor = InstructionExecutor::new(ExecutorConfig::default(), sink);
        assert_eq!(executor.identity(), None);
        assert!(matches!(
            executor
                .receive_client_action_message(setup_request(Address::new([1; 20]), Address::new([2; 20])))
                .await,
            Err(MachineError::Config(_))
        ));
    }
}
