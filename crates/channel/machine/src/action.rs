//! One run of a protocol's opcode sequence.

use channel_types::Address;
use tracing::{debug, warn};

use crate::error::MachineError;
use crate::middleware::{ExecutionEnv, IntermediateResults, InternalMessage, MiddlewarePipeline};
use crate::protocol::{ClientActionMessage, Opcode, Protocol, Role};

/// Walks the opcode list of one protocol and role through the pipeline.
///
/// The instruction pointer only advances after a step succeeds. The first
/// failure ends the run; since `STATE_TRANSITION_COMMIT` is always the last
/// opcode, a failed run leaves every channel as it was.
pub struct ActionExecution<'a> {
    protocol: Protocol,
    role: Role,
    opcodes: &'static [Opcode],
    instruction_pointer: usize,
    message: InternalMessage,
    results: IntermediateResults,
    pipeline: &'a MiddlewarePipeline,
    env: &'a ExecutionEnv,
}

impl<'a> ActionExecution<'a> {
    pub fn new(
        client_message: ClientActionMessage,
        role: Role,
        self_address: Address,
        pipeline: &'a MiddlewarePipeline,
        env: &'a ExecutionEnv,
    ) -> Result<Self, MachineError> {
        let protocol = client_message.action;
        let opcodes = protocol.opcodes(role)?;
        let first = opcodes
            .first()
            .copied()
            .ok_or(MachineError::RoleMismatch { protocol, role })?;
        Ok(Self {
            protocol,
            role,
            opcodes,
            instruction_pointer: 0,
            message: InternalMessage {
                protocol,
                opcode: first,
                role,
                self_address,
                client_message,
            },
            results: IntermediateResults::default(),
            pipeline,
            env,
        })
    }

    pub fn instruction_pointer(&self) -> usize {
        self.instruction_pointer
    }

    /// Run every remaining opcode and return the final results.
    pub async fn run_all(mut self) -> Result<IntermediateResults, MachineError> {
        while let Some(&opcode) = self.opcodes.get(self.instruction_pointer) {
            self.message.opcode = opcode;
            let results = std::mem::take(&mut self.results);
            let seq = in_flight_seq(&self.message.client_message, &results);
            debug!(
                protocol = %self.protocol,
                role = ?self.role,
                opcode = ?opcode,
                step = self.instruction_pointer,
                seq,
                "Executing opcode"
            );

            match self.pipeline.run(&self.message, results, self.env).await {
                Ok(next) => self.results = next,
                Err(source) => {
                    warn!(
                        protocol = %self.protocol,
                        role = ?self.role,
                        opcode = ?opcode,
                        seq,
                        error = %source,
                        "Opcode failed"
                    );
                    return Err(MachineError::Execution {
                        protocol: self.protocol,
                        opcode,
                        seq,
                        source: Box::new(source),
                    });
                }
            }
            self.instruction_pointer += 1;
        }
        Ok(self.results)
    }
}

/// Highest message seq seen so far in the run.
fn in_flight_seq(client: &ClientActionMessage, results: &IntermediateResults) -> u32 {
    [
        Some(client.seq),
        results.outbox.as_ref().map(|m| m.seq),
        results.inbox.as_ref().map(|m| m.seq),
    ]
    .into_iter()
    .flatten()
    .max()
    .unwrap_or(client.seq)
}
