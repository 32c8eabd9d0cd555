//! Instruction executor for off-chain state channels.
//!
//! A protocol run walks a fixed opcode sequence through a middleware
//! pipeline: propose the next channel state, build the commitment that
//! enforces it on chain, exchange signatures with the peer and, only once
//! every signature checks out, commit the new state.
//!
//! ## Protocols
//!
//! - **Setup**: bind a fresh multisig to an empty free balance
//! - **Install**: move deposits from the free balance into an app
//! - **Uninstall**: credit an app's resolved value back
//! - **Update**: advance an app to a new state
//! - **InstallVirtualApp**: install an app between two parties without a
//!   shared channel, locking value in both channels of an intermediary
//!
//! ## Guarantees
//!
//! - `STATE_TRANSITION_COMMIT` is the only step that changes a channel, and
//!   it always runs last. A run that fails anywhere leaves every channel as
//!   it was.
//! - Nothing is committed until the peer's signature recovers to the key
//!   expected for the commitment.
//! - Every run ends with exactly one `COMPLETED` or `ERROR` response.
//!
//! Signing keys and the network are collaborators: see [`Signer`] and
//! [`Transport`], registered through
//! [`InstructionExecutor::register_capabilities`].

pub mod action;
pub mod apps;
pub mod config;
pub mod error;
pub mod executor;
pub mod middleware;
pub mod mocks;
pub mod model;
pub mod observer;
pub mod proposer;
pub mod protocol;
pub mod traits;

pub use action::ActionExecution;
pub use apps::{AppDefinition, AppRegistry};
pub use config::ExecutorConfig;
pub use error::{AppError, MachineError, PersistenceError, TransportError, ValidationError};
pub use executor::{InstructionExecutor, Response, ResponseStatus};
pub use middleware::{HandlerContext, IntermediateResults, MiddlewarePipeline, ResultsPatch};
pub use mocks::{
    serve_inbound, InMemoryNetwork, InMemoryTransport, LocalSigner, MemoryPersistence,
    RecordingResponseSink, TurnTakingApp,
};
pub use model::{
    all_app_instances, channel_between, virtual_channel_address, AppInstance, ChannelState,
    ChannelStates, FreeBalance, VirtualAgreement,
};
pub use observer::{Notification, NotificationType, ObserverRegistry};
pub use proposer::StateProposal;
pub use protocol::{
    AppInstanceProposal, ClientActionMessage, InstallParams, InstallVirtualAppParams, Opcode,
    Protocol, ProtocolParams, Role, SetupParams, UninstallParams, UpdateParams,
};
pub use traits::{
    MessageKey, Middleware, RecoveringValidator, ResponseSink, SignatureValidator, Signer,
    StateChannelPersistence, Transport,
};
