//! Deterministic scripted inferior.
//!
//! The program is a map from address to [`Effect`]. Execution starts at the
//! entry address and falls through to the next scripted address unless the
//! effect transfers control. Memory is a set of byte regions; accesses outside
//! them raise `SIGSEGV` in the inferior.

use std::collections::BTreeMap;
use std::ops::Bound;

use tracing::trace;

use super::{Inferior, InferiorEvent, MemoryReader, RawFrame, StopEvent, TrapHit, TrapSet};
use crate::error::{Result, SnareError};
use crate::types::{Address, Architecture, ProcessId, ThreadId};
use crate::watchpoints::AccessKind;

const SCRIPTED_PID: u32 = 4242;
const DEFAULT_INSTRUCTION_BUDGET: usize = 1_000_000;

/// What one scripted instruction does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect
{
    /// Nothing observable.
    Nop,
    /// Read `size` bytes.
    Load
    {
        address: Address,
        size: usize,
    },
    /// Write `bytes`.
    Store
    {
        address: Address,
        bytes: Vec<u8>,
    },
    /// Enter `target` with a new frame base; returns to the next instruction.
    Call
    {
        target: Address,
        frame_base: Address,
    },
    /// Return to the caller; returning from the outermost frame exits with 0.
    Return,
    /// Continue at `target`.
    Jump(Address),
    /// Raise a signal; execution continues after the instruction on resume.
    Signal(i32),
    /// Exit the process.
    Exit(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle
{
    NotStarted,
    Live,
    Exited(i32),
}

/// Result of executing one instruction.
enum Outcome
{
    Next(Vec<TrapHit>),
    Signalled(i32),
    Exited(i32),
}

/// Builder for [`ScriptedInferior`].
///
/// ## Example
///
/// ```rust
/// use snare_core::inferior::{Effect, ScriptedInferior};
/// use snare_core::types::{Address, Architecture};
///
/// let inferior = ScriptedInferior::builder(Architecture::X86_64)
///     .entry(0x1000, 0x7fff_0000)
///     .region(0x4000, vec![0; 8])
///     .at(0x1000, Effect::Store { address: Address::new(0x4000), bytes: vec![1, 0, 0, 0] })
///     .at(0x1004, Effect::Exit(0))
///     .build();
/// assert_eq!(inferior.pc().value(), 0x1000);
/// ```
#[derive(Debug, Clone)]
pub struct ScriptedInferiorBuilder
{
    architecture: Architecture,
    entry: Address,
    frame_base: Address,
    program: BTreeMap<Address, Effect>,
    regions: Vec<(Address, Vec<u8>)>,
    instruction_budget: usize,
}

impl ScriptedInferiorBuilder
{
    /// Entry pc and the frame base of the outermost frame.
    #[must_use]
    pub fn entry(mut self, pc: u64, frame_base: u64) -> Self
    {
        self.entry = Address::new(pc);
        self.frame_base = Address::new(frame_base);
        self
    }

    /// Script the instruction at `address`.
    #[must_use]
    pub fn at(mut self, address: u64, effect: Effect) -> Self
    {
        self.program.insert(Address::new(address), effect);
        self
    }

    /// Map readable and writable bytes at `address`.
    #[must_use]
    pub fn region(mut self, address: u64, bytes: Vec<u8>) -> Self
    {
        self.regions.push((Address::new(address), bytes));
        self
    }

    /// Instructions one resume may execute before giving up.
    #[must_use]
    pub fn instruction_budget(mut self, budget: usize) -> Self
    {
        self.instruction_budget = budget;
        self
    }

    #[must_use]
    pub fn build(self) -> ScriptedInferior
    {
        ScriptedInferior {
            architecture: self.architecture,
            program: self.program,
            regions: self.regions,
            instruction_budget: self.instruction_budget,
            lifecycle: Lifecycle::NotStarted,
            pc: self.entry,
            frame_base: self.frame_base,
            call_stack: Vec::new(),
            resume_at: None,
            skip_trap_at: None,
        }
    }
}

/// Inferior executing a scripted program.
#[derive(Debug, Clone)]
pub struct ScriptedInferior
{
    architecture: Architecture,
    program: BTreeMap<Address, Effect>,
    regions: Vec<(Address, Vec<u8>)>,
    instruction_budget: usize,
    lifecycle: Lifecycle,
    pc: Address,
    frame_base: Address,
    /// Return address and frame base of each caller, outermost first.
    call_stack: Vec<(Address, Address)>,
    /// Where execution continues after a signal stop.
    resume_at: Option<Address>,
    /// Pc of the last reported stop; resuming does not trap there again.
    skip_trap_at: Option<Address>,
}

impl ScriptedInferior
{
    /// Start building a program for `architecture`.
    #[must_use]
    pub fn builder(architecture: Architecture) -> ScriptedInferiorBuilder
    {
        ScriptedInferiorBuilder {
            architecture,
            entry: Address::ZERO,
            frame_base: Address::ZERO,
            program: BTreeMap::new(),
            regions: Vec::new(),
            instruction_budget: DEFAULT_INSTRUCTION_BUDGET,
        }
    }

    /// Current program counter.
    #[must_use]
    pub fn pc(&self) -> Address
    {
        self.pc
    }

    /// Overwrite inferior memory, as a debugger `memory write` would.
    ///
    /// ## Errors
    ///
    /// `MemoryAccess` if any byte is unmapped.
    pub fn write_memory(&mut self, address: Address, bytes: &[u8]) -> Result<()>
    {
        for (offset, byte) in (0u64..).zip(bytes) {
            let target = address.saturating_add(offset);
            let slot = self.byte_mut(target).ok_or(SnareError::MemoryAccess {
                address: target,
                len: bytes.len(),
            })?;
            *slot = *byte;
        }
        Ok(())
    }

    fn byte(&self, address: Address) -> Option<u8>
    {
        self.regions.iter().find_map(|(start, bytes)| {
            let offset = usize::try_from(address.offset_from(*start)?).ok()?;
            bytes.get(offset).copied()
        })
    }

    fn byte_mut(&mut self, address: Address) -> Option<&mut u8>
    {
        self.regions.iter_mut().find_map(|(start, bytes)| {
            let offset = usize::try_from(address.offset_from(*start)?).ok()?;
            bytes.get_mut(offset)
        })
    }

    fn is_mapped(&self, address: Address, len: usize) -> bool
    {
        (0..len as u64).all(|offset| self.byte(address.saturating_add(offset)).is_some())
    }

    fn next_address(&self, pc: Address) -> Address
    {
        self.program
            .range((Bound::Excluded(pc), Bound::Unbounded))
            .next()
            .map_or(pc.saturating_add(1), |(address, _)| *address)
    }

    fn ensure_live(&self) -> Result<()>
    {
        match self.lifecycle {
            Lifecycle::Live => Ok(()),
            Lifecycle::NotStarted => Err(SnareError::invalid_state("scripted inferior has not been started")),
            Lifecycle::Exited(code) => Err(SnareError::invalid_state(format!(
                "scripted inferior exited with status {code}"
            ))),
        }
    }

    fn exit(&mut self, code: i32) -> InferiorEvent
    {
        trace!(code, "scripted inferior exited");
        self.lifecycle = Lifecycle::Exited(code);
        InferiorEvent::Exited { code }
    }

    /// Report a stop at the pc. The next resume starts past any code trap there.
    fn stopped(&mut self, hits: Vec<TrapHit>, signal: Option<i32>, step_completed: bool) -> InferiorEvent
    {
        self.skip_trap_at = Some(self.pc);
        InferiorEvent::Stopped(StopEvent {
            pc: self.pc,
            hits,
            signal,
            step_completed,
        })
    }

    /// Execute the instruction at the pc and advance.
    fn execute(&mut self, traps: &TrapSet) -> Outcome
    {
        if let Some(target) = self.resume_at.take() {
            self.pc = target;
        }
        let pc = self.pc;
        let Some(effect) = self.program.get(&pc).cloned() else {
            return Outcome::Signalled(libc::SIGSEGV);
        };
        trace!(%pc, ?effect, "executing");

        let fallthrough = self.next_address(pc);
        let mut hits = Vec::new();
        match effect {
            Effect::Nop => self.pc = fallthrough,
            Effect::Load { address, size } => {
                if !self.is_mapped(address, size) {
                    return Outcome::Signalled(libc::SIGSEGV);
                }
                if traps.data_triggered(address, size, AccessKind::Read) {
                    hits.push(TrapHit::Data {
                        address,
                        size,
                        kind: AccessKind::Read,
                    });
                }
                self.pc = fallthrough;
            }
            Effect::Store { address, bytes } => {
                if !self.is_mapped(address, bytes.len()) || self.write_memory(address, &bytes).is_err() {
                    return Outcome::Signalled(libc::SIGSEGV);
                }
                if traps.data_triggered(address, bytes.len(), AccessKind::Write) {
                    hits.push(TrapHit::Data {
                        address,
                        size: bytes.len(),
                        kind: AccessKind::Write,
                    });
                }
                self.pc = fallthrough;
            }
            Effect::Call { target, frame_base } => {
                self.call_stack.push((fallthrough, self.frame_base));
                self.frame_base = frame_base;
                self.pc = target;
            }
            Effect::Return => match self.call_stack.pop() {
                Some((return_address, frame_base)) => {
                    self.pc = return_address;
                    self.frame_base = frame_base;
                }
                None => return Outcome::Exited(0),
            },
            Effect::Jump(target) => self.pc = target,
            Effect::Signal(signal) => {
                self.resume_at = Some(fallthrough);
                return Outcome::Signalled(signal);
            }
            Effect::Exit(code) => return Outcome::Exited(code),
        }

        // Landing on a code trap after a data hit reports both.
        if !hits.is_empty() && traps.has_code_trap(self.pc) {
            hits.push(TrapHit::Code { address: self.pc });
        }
        Outcome::Next(hits)
    }
}

impl MemoryReader for ScriptedInferior
{
    fn read_memory(&self, address: Address, len: usize) -> Result<Vec<u8>>
    {
        (0..len as u64)
            .map(|offset| {
                self.byte(address.saturating_add(offset))
                    .ok_or(SnareError::MemoryAccess { address, len })
            })
            .collect()
    }
}

impl Inferior for ScriptedInferior
{
    fn architecture(&self) -> Architecture
    {
        self.architecture
    }

    fn pid(&self) -> Option<ProcessId>
    {
        match self.lifecycle {
            Lifecycle::NotStarted => None,
            _ => Some(ProcessId(SCRIPTED_PID)),
        }
    }

    fn thread_id(&self) -> ThreadId
    {
        ThreadId(u64::from(SCRIPTED_PID))
    }

    fn start(&mut self) -> Result<()>
    {
        if self.lifecycle != Lifecycle::NotStarted {
            return Err(SnareError::invalid_state("scripted inferior was already started"));
        }
        self.lifecycle = Lifecycle::Live;
        trace!(pc = %self.pc, "scripted inferior started");
        Ok(())
    }

    fn resume(&mut self, traps: &TrapSet) -> Result<InferiorEvent>
    {
        self.ensure_live()?;
        let mut skip = self.skip_trap_at.take();
        for _ in 0..self.instruction_budget {
            let pc = self.resume_at.unwrap_or(self.pc);
            if traps.has_code_trap(pc) && skip != Some(pc) {
                self.resume_at = None;
                self.pc = pc;
                return Ok(self.stopped(vec![TrapHit::Code { address: pc }], None, false));
            }
            skip = None;

            match self.execute(traps) {
                Outcome::Next(hits) if hits.is_empty() => {}
                Outcome::Next(hits) => return Ok(self.stopped(hits, None, false)),
                Outcome::Signalled(signal) => return Ok(self.stopped(Vec::new(), Some(signal), false)),
                Outcome::Exited(code) => return Ok(self.exit(code)),
            }
        }
        Err(SnareError::ResourceExhausted(format!(
            "scripted inferior ran {} instructions without stopping",
            self.instruction_budget
        )))
    }

    fn single_step(&mut self, traps: &TrapSet) -> Result<InferiorEvent>
    {
        self.ensure_live()?;
        self.skip_trap_at = None;
        match self.execute(traps) {
            Outcome::Next(mut hits) => {
                if !hits.iter().any(|hit| matches!(hit, TrapHit::Code { .. })) && traps.has_code_trap(self.pc) {
                    hits.push(TrapHit::Code { address: self.pc });
                }
                Ok(self.stopped(hits, None, true))
            }
            Outcome::Signalled(signal) => Ok(self.stopped(Vec::new(), Some(signal), false)),
            Outcome::Exited(code) => Ok(self.exit(code)),
        }
    }

    fn frames(&self) -> Result<Vec<RawFrame>>
    {
        self.ensure_live()?;
        let mut frames = vec![RawFrame {
            pc: self.pc,
            frame_base: self.frame_base,
        }];
        frames.extend(
            self.call_stack
                .iter()
                .rev()
                .map(|(return_address, frame_base)| RawFrame {
                    pc: *return_address,
                    frame_base: *frame_base,
                }),
        );
        Ok(frames)
    }

    fn kill(&mut self) -> Result<()>
    {
        if self.lifecycle == Lifecycle::Live {
            self.lifecycle = Lifecycle::Exited(libc::SIGKILL);
        }
        Ok(())
    }

    fn memory(&self) -> &dyn MemoryReader
    {
        self
    }
}
