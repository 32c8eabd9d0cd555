use std::sync::Arc;

use async_trait::async_trait;
use channel_commitment::EthereumCommitment;
use tracing::{debug, warn};

use crate::error::{MachineError, TransportError};
use crate::middleware::{HandlerContext, ResultsPatch};
use crate::traits::{Middleware, SignatureValidator};

/// `OP_SIGN_VALIDATE`: the latest received message must come from the other
/// owner of its channel and carry a signature over that channel's commitment,
/// made by that owner's key for it.
pub struct ValidateMiddleware {
    validator: Arc<dyn SignatureValidator>,
}

impl ValidateMiddleware {
    pub fn new(validator: Arc<dyn SignatureValidator>) -> Self {
        Self { validator }
    }
}

#[async_trait]
impl Middleware for ValidateMiddleware {
    fn name(&self) -> &str {
        "op_sign_validate"
    }

    async fn handle(&self, ctx: &HandlerContext<'_>) -> Result<ResultsPatch, MachineError> {
        let received = ctx.last_received().ok_or(MachineError::MissingSignature {
            seq: ctx.base_message().seq,
        })?;
        let signature = received
            .signature
            .ok_or(MachineError::MissingSignature { seq: received.seq })?;

        let proposal = ctx.proposal()?;
        let multisig = received.multisig_address;
        let commitment = proposal
            .commitment_for(&multisig)
            .ok_or(MachineError::NoActiveCommitment(multisig))?;

        let me = ctx.message.self_address;
        let counterparty = proposal
            .state
            .get(&multisig)
            .filter(|channel| channel.multisig_owners.contains(&me))
            .and_then(|channel| channel.multisig_owners.iter().find(|o| **o != me))
            .copied()
            .ok_or(MachineError::NoActiveCommitment(multisig))?;
        if received.from_address != counterparty {
            warn!(
                from = %received.from_address,
                expected = %counterparty,
                seq = received.seq,
                "Message from outside the channel"
            );
            return Err(TransportError::UnexpectedSender {
                expected: counterparty,
                actual: received.from_address,
            }
            .into());
        }

        let expected = proposal.signing_key_of(&counterparty);
        let recovered = self
            .validator
            .recover(&commitment.hash_to_sign(), &signature)?;
        if recovered != expected || !commitment.signers().contains(&expected) {
            warn!(
                from = %received.from_address,
                expected = %expected,
                recovered = %recovered,
                seq = received.seq,
                "Signature rejected"
            );
            return Err(MachineError::Authorization {
                expected,
                recovered,
            });
        }

        debug!(from = %received.from_address, seq = received.seq, "Signature accepted");
        Ok(ResultsPatch::none())
    }
}

#[cfg(test)]
mod tests {
    use channel_types::{Address, NetworkContext, SigningKey};

    use super::*;
    use crate::apps::AppRegistry;
    use crate::middleware::{
        ChannelStore, ExecutionEnv, GenerateMiddleware, IntermediateResults, InternalMessage,
    };
    use crate::protocol::{ClientActionMessage, Opcode, ProtocolParams, Role, SetupParams};
    use crate::traits::RecoveringValidator;

    struct Fixture {
        env: ExecutionEnv,
        message: InternalMessage,
        results: IntermediateResults,
    }

    /// Responder-side context for a setup request from `initiator`.
    async fn fixture(initiator: Address, responder: Address) -> Fixture {
        let env = ExecutionEnv {
            channels: ChannelStore::new(),
            network: NetworkContext::default(),
            apps: AppRegistry::new(),
        };
        let multisig = Address::new([7; 20]);
        let client_message = ClientActionMessage::new(
            ProtocolParams::Setup(SetupParams {
                multisig_address: multisig,
                initiator,
                responder,
            }),
            multisig,
            initiator,
            responder,
        );
        let message = InternalMessage {
            protocol: client_message.action,
            opcode: Opcode::OpSignValidate,
            role: Role::Responder,
            self_address: responder,
            client_message,
        };
        let patch = GenerateMiddleware
            .handle(&HandlerContext {
                message: &message,
                results: &IntermediateResults::default(),
                env: &env,
            })
            .await
            .unwrap();
        Fixture {
            env,
            message,
            results: IntermediateResults::default().apply(patch),
        }
    }

    async fn validate(fixture: &Fixture) -> Result<ResultsPatch, MachineError> {
        ValidateMiddleware::new(Arc::new(RecoveringValidator))
            .handle(&HandlerContext {
                message: &fixture.message,
                results: &fixture.results,
                env: &fixture.env,
            })
            .await
    }

    #[tokio::test]
    async fn accepts_the_counterpartys_signature() {
        let alice = SigningKey::random();
        let bob = SigningKey::random();
        let mut fixture = fixture(alice.address(), bob.address()).await;
        let digest = fixture.results.operation.as_ref().unwrap().hash_to_sign();
        fixture.message.client_message.signature = Some(alice.sign_digest(&digest));

        assert!(validate(&fixture).await.is_ok());
    }

    #[tokio::test]
    async fn rejects_any_other_key() {
        let alice = SigningKey::random();
        let bob = SigningKey::random();
        let mallory = SigningKey::random();
        let mut fixture = fixture(alice.address(), bob.address()).await;
        let digest = fixture.results.operation.as_ref().unwrap().hash_to_sign();
        fixture.message.client_message.signature = Some(mallory.sign_digest(&digest));

        assert_eq!(
            validate(&fixture).await.unwrap_err(),
            MachineError::Authorization {
                expected: alice.address(),
                recovered: mallory.address()
            }
        );
    }

    #[tokio::test]
    async fn unsigned_message_is_rejected() {
        let fixture = fixture(Address::new([1; 20]), Address::new([2; 20])).await;
        assert_eq!(
            validate(&fixture).await.unwrap_err(),
            MachineError::MissingSignature { seq: 0 }
        );
    }

    #[tokio::test]
    async fn own_message_echoed_back_is_rejected() {
        let alice = SigningKey::random();
        let bob = SigningKey::random();
        let mut fixture = fixture(alice.address(), bob.address()).await;
        let digest = fixture.results.operation.as_ref().unwrap().hash_to_sign();
        fixture.message.client_message.from_address = bob.address();
        fixture.message.client_message.to_address = alice.address();
        fixture.message.client_message.signature = Some(bob.sign_digest(&digest));

        assert_eq!(
            validate(&fixture).await.unwrap_err(),
            MachineError::Transport(TransportError::UnexpectedSender {
                expected: alice.address(),
                actual: bob.address()
            })
        );
    }

    #[tokio::test]
    async fn third_party_signing_for_itself_is_rejected() {
        let alice = SigningKey::random();
        let bob = SigningKey::random();
        let mallory = SigningKey::random();
        let mut fixture = fixture(alice.address(), bob.address()).await;
        let digest = fixture.results.operation.as_ref().unwrap().hash_to_sign();
        fixture.message.client_message.from_address = mallory.address();
        fixture.message.client_message.signature = Some(mallory.sign_digest(&digest));

        assert!(matches!(
            validate(&fixture).await.unwrap_err(),
            MachineError::Transport(TransportError::UnexpectedSender { .. })
        ));
    }
}
