//! # Application Engine
//!
//! Stack machine that runs witness and invocation scripts against a ledger
//! snapshot. Every instruction is priced before it executes; running past
//! the gas limit faults the script.
//!
//! ## Execution model
//!
//! - Scripts run in invocation contexts; `APPCALL` pushes a new context with
//!   a deployed contract's script, `RET` or running off the end pops one.
//! - All contexts share one evaluation stack, so an invocation script's
//!   pushes are the verification script's arguments.
//! - The engine halts once no context is left and faults on the first error.

use super::errors::{VmError, VmResult};
use super::prices::{self, RATIO};
use super::stack::EvaluationStack;
use super::stack_item::{StackItem, MAX_INTEGER_SIZE};
use dc_02_ledger::{Snapshot, Verifiable};
use num_bigint::BigInt;
use shared_crypto::contract::MAX_MULTISIG_KEYS;
use shared_crypto::{hash160, hash256, opcode, script_hash, sha256, verify_signature};
use shared_types::{Fixed8, UInt160};
use tracing::debug;

pub const MAX_INVOCATION_DEPTH: usize = 1024;

/// What caused a script to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TriggerType {
    /// Witness check; storage is read-only.
    Verification = 0x00,
    /// Invocation transaction persisted in a block.
    Application = 0x10,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmState {
    Running,
    Halt,
    Fault,
}

/// Outcome of [`ApplicationEngine::run`].
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub state: VmState,
    pub stack: Vec<StackItem>,
    pub gas_consumed: Fixed8,
    pub fault: Option<VmError>,
    pub logs: Vec<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct ExecutionContext {
    script: Vec<u8>,
    pub(crate) script_hash: UInt160,
    ip: usize,
}

#[derive(Debug)]
struct Instruction {
    opcode: u8,
    offset: usize,
    operand: Vec<u8>,
}

pub struct ApplicationEngine<'a> {
    pub(crate) trigger: TriggerType,
    pub(crate) container: &'a dyn Verifiable,
    pub(crate) snapshot: &'a mut Snapshot,
    pub(crate) invocation_stack: Vec<ExecutionContext>,
    pub(crate) evaluation_stack: EvaluationStack,
    pub(crate) logs: Vec<String>,
    state: VmState,
    gas_limit: i64,
    gas_consumed: i64,
    fault: Option<VmError>,
}

impl<'a> ApplicationEngine<'a> {
    /// Engine allowed to spend the free allowance plus `gas`.
    pub fn new(
        trigger: TriggerType,
        container: &'a dyn Verifiable,
        snapshot: &'a mut Snapshot,
        gas: Fixed8,
    ) -> Self {
        let gas_limit = snapshot.settings().free_gas.raw().saturating_add(gas.raw());
        Self {
            trigger,
            container,
            snapshot,
            invocation_stack: Vec::new(),
            evaluation_stack: EvaluationStack::new(),
            logs: Vec::new(),
            state: VmState::Running,
            gas_limit,
            gas_consumed: 0,
            fault: None,
        }
    }

    /// Load `script`, execute it to completion and collect the outcome.
    pub fn run(
        script: Vec<u8>,
        trigger: TriggerType,
        container: &'a dyn Verifiable,
        snapshot: &'a mut Snapshot,
        gas: Fixed8,
    ) -> ExecutionResult {
        let mut engine = Self::new(trigger, container, snapshot, gas);
        engine.load_script(script);
        engine.execute();
        engine.into_result()
    }

    /// Push a context for `script`; it runs before any already loaded.
    pub fn load_script(&mut self, script: Vec<u8>) {
        let script_hash = script_hash(&script);
        self.invocation_stack.push(ExecutionContext {
            script,
            script_hash,
            ip: 0,
        });
    }

    pub fn execute(&mut self) -> VmState {
        while self.state == VmState::Running {
            if self.invocation_stack.is_empty() {
                self.state = VmState::Halt;
                break;
            }
            if let Err(error) = self.step() {
                debug!(trigger = ?self.trigger, %error, "Script faulted");
                self.fault = Some(error);
                self.state = VmState::Fault;
            }
        }
        self.state
    }

    pub fn state(&self) -> VmState {
        self.state
    }

    pub fn trigger(&self) -> TriggerType {
        self.trigger
    }

    /// Evaluation stack, bottom first.
    pub fn result_stack(&self) -> &[StackItem] {
        self.evaluation_stack.as_slice()
    }

    pub fn gas_consumed(&self) -> Fixed8 {
        Fixed8::from_raw(self.gas_consumed)
    }

    pub fn fault(&self) -> Option<&VmError> {
        self.fault.as_ref()
    }

    pub fn into_result(self) -> ExecutionResult {
        ExecutionResult {
            state: self.state,
            gas_consumed: Fixed8::from_raw(self.gas_consumed),
            stack: self.evaluation_stack.as_slice().to_vec(),
            fault: self.fault,
            logs: self.logs,
        }
    }

    pub(crate) fn current_script_hash(&self) -> VmResult<UInt160> {
        self.invocation_stack
            .last()
            .map(|context| context.script_hash)
            .ok_or(VmError::StackUnderflow)
    }

    fn step(&mut self) -> VmResult<()> {
        let Some(context) = self.invocation_stack.last() else {
            return Ok(());
        };
        if context.ip >= context.script.len() {
            self.invocation_stack.pop();
            return Ok(());
        }
        let (instruction, next) = decode(&context.script, context.ip)?;
        let price = self.price(&instruction)?;
        self.charge(price)?;
        if let Some(context) = self.invocation_stack.last_mut() {
            context.ip = next;
        }
        self.dispatch(instruction)
    }

    fn price(&self, instruction: &Instruction) -> VmResult<i64> {
        Ok(match instruction.opcode {
            opcode::CHECKMULTISIG => {
                let keys = self.evaluation_stack.peek(0)?.to_integer()?;
                prices::multisig_price(i64::try_from(&keys).unwrap_or(i64::MAX))
            }
            opcode::SYSCALL => self.syscall_price(&instruction.operand),
            op => prices::opcode_price(op),
        })
    }

    fn charge(&mut self, price: i64) -> VmResult<()> {
        self.gas_consumed = self.gas_consumed.saturating_add(price.saturating_mul(RATIO));
        if self.gas_consumed > self.gas_limit {
            return Err(VmError::OutOfGas);
        }
        Ok(())
    }

    fn dispatch(&mut self, instruction: Instruction) -> VmResult<()> {
        let Instruction {
            opcode: op,
            offset,
            operand,
        } = instruction;

        match op {
            opcode::PUSH0 => self.evaluation_stack.push(Vec::<u8>::new()),
            opcode::PUSHBYTES1..=opcode::PUSHDATA4 => self.evaluation_stack.push(operand),
            opcode::PUSHM1 => self.push_int(BigInt::from(-1)),
            opcode::PUSH1..=opcode::PUSH16 => self.push_int(BigInt::from(op - opcode::PUSH1 + 1)),
            opcode::NOP => Ok(()),

            opcode::JMP | opcode::JMPIF | opcode::JMPIFNOT => {
                let taken = match op {
                    opcode::JMP => true,
                    opcode::JMPIF => self.pop_bool()?,
                    _ => !self.pop_bool()?,
                };
                if taken {
                    self.jump(offset, &operand)?;
                }
                Ok(())
            }
            opcode::RET => {
                self.invocation_stack.pop();
                Ok(())
            }
            opcode::APPCALL => self.app_call(&operand),
            opcode::SYSCALL => self.syscall(&operand),

            opcode::DEPTH => self.push_int(BigInt::from(self.evaluation_stack.len())),
            opcode::DROP => self.evaluation_stack.pop().map(drop),
            opcode::DUP => {
                let top = self.evaluation_stack.peek(0)?.clone();
                self.evaluation_stack.push(top)
            }
            opcode::NIP => self.evaluation_stack.remove(1).map(drop),
            opcode::OVER => {
                let second = self.evaluation_stack.peek(1)?.clone();
                self.evaluation_stack.push(second)
            }
            opcode::SWAP => {
                let second = self.evaluation_stack.remove(1)?;
                self.evaluation_stack.push(second)
            }

            opcode::SIZE => {
                let bytes = self.pop_bytes()?;
                self.push_int(BigInt::from(bytes.len()))
            }
            opcode::EQUAL => {
                let b = self.evaluation_stack.pop()?;
                let a = self.evaluation_stack.pop()?;
                self.evaluation_stack.push(a.equals(&b))
            }

            opcode::INC => {
                let value = self.pop_int()?;
                self.push_int(value + 1)
            }
            opcode::DEC => {
                let value = self.pop_int()?;
                self.push_int(value - 1)
            }
            opcode::NOT => {
                let value = self.pop_bool()?;
                self.evaluation_stack.push(!value)
            }
            opcode::NZ => {
                let value = self.pop_int()?;
                self.evaluation_stack.push(value != BigInt::from(0))
            }
            opcode::ADD | opcode::SUB => {
                let b = self.pop_int()?;
                let a = self.pop_int()?;
                self.push_int(if op == opcode::ADD { a + b } else { a - b })
            }
            opcode::BOOLAND | opcode::BOOLOR => {
                let b = self.pop_bool()?;
                let a = self.pop_bool()?;
                self.evaluation_stack
                    .push(if op == opcode::BOOLAND { a && b } else { a || b })
            }
            opcode::NUMEQUAL | opcode::NUMNOTEQUAL | opcode::LT | opcode::GT => {
                let b = self.pop_int()?;
                let a = self.pop_int()?;
                let result = match op {
                    opcode::NUMEQUAL => a == b,
                    opcode::NUMNOTEQUAL => a != b,
                    opcode::LT => a < b,
                    _ => a > b,
                };
                self.evaluation_stack.push(result)
            }

            opcode::SHA256 => {
                let data = self.pop_bytes()?;
                self.evaluation_stack.push(sha256(&data).to_vec())
            }
            opcode::HASH160 => {
                let data = self.pop_bytes()?;
                self.evaluation_stack.push(hash160(&data).to_vec())
            }
            opcode::HASH256 => {
                let data = self.pop_bytes()?;
                self.evaluation_stack.push(hash256(&data).to_vec())
            }
            opcode::CHECKSIG => {
                let public_key = self.pop_bytes()?;
                let signature = self.pop_bytes()?;
                let message = self.container.hash_data();
                self.evaluation_stack
                    .push(verify_signature(&message, &signature, &public_key))
            }
            opcode::VERIFY => {
                let public_key = self.pop_bytes()?;
                let signature = self.pop_bytes()?;
                let message = self.pop_bytes()?;
                self.evaluation_stack
                    .push(verify_signature(&message, &signature, &public_key))
            }
            opcode::CHECKMULTISIG => self.check_multisig(),

            opcode::THROW => Err(VmError::Throw),
            opcode::THROWIFNOT => {
                if self.pop_bool()? {
                    Ok(())
                } else {
                    Err(VmError::Throw)
                }
            }
            _ => Err(VmError::InvalidOpcode(op)),
        }
    }

    /// Jumps are relative to the jump instruction's own offset.
    fn jump(&mut self, offset: usize, operand: &[u8]) -> VmResult<()> {
        let delta: [u8; 2] = operand
            .try_into()
            .map_err(|_| VmError::TruncatedScript(offset))?;
        let target = offset as i64 + i64::from(i16::from_le_bytes(delta));
        let context = self
            .invocation_stack
            .last_mut()
            .ok_or(VmError::StackUnderflow)?;
        match usize::try_from(target) {
            Ok(ip) if ip <= context.script.len() => {
                context.ip = ip;
                Ok(())
            }
            _ => Err(VmError::InvalidJump(target)),
        }
    }

    fn app_call(&mut self, operand: &[u8]) -> VmResult<()> {
        if self.invocation_stack.len() >= MAX_INVOCATION_DEPTH {
            return Err(VmError::DepthExceeded);
        }
        let script_hash =
            UInt160::from_slice(operand).map_err(|_| VmError::WrongType("script hash"))?;
        let contract = self
            .snapshot
            .contracts
            .try_get(&script_hash)?
            .ok_or(VmError::UnknownContract(script_hash))?;
        self.load_script(contract.script);
        Ok(())
    }

    /// Pops `n`, `n` keys, `m`, then `m` signatures. Signatures must match
    /// keys in the same relative order.
    fn check_multisig(&mut self) -> VmResult<()> {
        let n = self.pop_count()?;
        let keys = (0..n)
            .map(|_| self.pop_bytes())
            .collect::<VmResult<Vec<_>>>()?;
        let m = self.pop_count()?;
        if m > n {
            return Err(VmError::InvalidMultisig);
        }
        let signatures = (0..m)
            .map(|_| self.pop_bytes())
            .collect::<VmResult<Vec<_>>>()?;

        let message = self.container.hash_data();
        let (mut i, mut j) = (0, 0);
        let mut success = true;
        while success && i < m && j < n {
            if verify_signature(&message, &signatures[i], &keys[j]) {
                i += 1;
            }
            j += 1;
            if m - i > n - j {
                success = false;
            }
        }
        self.evaluation_stack.push(success)
    }

    fn pop_count(&mut self) -> VmResult<usize> {
        let value = self.pop_int()?;
        usize::try_from(&value)
            .ok()
            .filter(|count| (1..=MAX_MULTISIG_KEYS).contains(count))
            .ok_or(VmError::InvalidMultisig)
    }

    pub(crate) fn pop_bytes(&mut self) -> VmResult<Vec<u8>> {
        self.evaluation_stack.pop()?.to_bytes()
    }

    pub(crate) fn pop_int(&mut self) -> VmResult<BigInt> {
        self.evaluation_stack.pop()?.to_integer()
    }

    pub(crate) fn pop_bool(&mut self) -> VmResult<bool> {
        Ok(self.evaluation_stack.pop()?.to_bool())
    }

    pub(crate) fn push_int(&mut self, value: BigInt) -> VmResult<()> {
        if value.to_signed_bytes_le().len() > MAX_INTEGER_SIZE {
            return Err(VmError::IntegerTooLarge);
        }
        self.evaluation_stack.push(value)
    }
}

/// Decode the instruction at `ip`; returns it with the offset of the next one.
fn decode(script: &[u8], ip: usize) -> VmResult<(Instruction, usize)> {
    let op = *script.get(ip).ok_or(VmError::TruncatedScript(ip))?;
    let mut pos = ip + 1;
    let operand_len = match op {
        opcode::PUSHBYTES1..=opcode::PUSHBYTES75 => usize::from(op),
        opcode::PUSHDATA1 => usize::from(read(script, &mut pos, 1, ip)?[0]),
        opcode::PUSHDATA2 => {
            let len = read(script, &mut pos, 2, ip)?;
            usize::from(u16::from_le_bytes([len[0], len[1]]))
        }
        opcode::PUSHDATA4 => {
            let len = read(script, &mut pos, 4, ip)?;
            let len = u32::from_le_bytes([len[0], len[1], len[2], len[3]]);
            usize::try_from(len).map_err(|_| VmError::TruncatedScript(ip))?
        }
        opcode::JMP | opcode::JMPIF | opcode::JMPIFNOT => 2,
        opcode::APPCALL => UInt160::LEN,
        opcode::SYSCALL => usize::from(read(script, &mut pos, 1, ip)?[0]),
        _ => 0,
    };
    let operand = read(script, &mut pos, operand_len, ip)?.to_vec();
    Ok((
        Instruction {
            opcode: op,
            offset: ip,
            operand,
        },
        pos,
    ))
}

fn read<'s>(script: &'s [u8], pos: &mut usize, len: usize, ip: usize) -> VmResult<&'s [u8]> {
    let end = pos.checked_add(len).ok_or(VmError::TruncatedScript(ip))?;
    let bytes = script.get(*pos..end).ok_or(VmError::TruncatedScript(ip))?;
    *pos = end;
    Ok(bytes)
}
