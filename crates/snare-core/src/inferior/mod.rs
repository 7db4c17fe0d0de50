//! # Inferior backends
//!
//! The engine never talks to the operating system directly. Everything it
//! needs from the process under control goes through the [`Inferior`] trait:
//! start it, run it with a set of armed traps until something happens, single
//! step it, walk its frames, read its memory, kill it.
//!
//! [`ScriptedInferior`] is a deterministic backend that executes a scripted
//! instruction stream over an in-memory image. It is what the test suite and
//! offline tooling drive; a ptrace or Mach backend would implement the same
//! trait.

mod scripted;

use std::collections::BTreeSet;

pub use scripted::{Effect, ScriptedInferior, ScriptedInferiorBuilder};

use crate::error::Result;
use crate::types::{Address, Architecture, ProcessId, ThreadId};
use crate::watchpoints::{AccessKind, WatchpointAccess};

/// Read access to inferior memory.
pub trait MemoryReader
{
    /// Read `len` bytes starting at `address`.
    ///
    /// ## Errors
    ///
    /// `MemoryAccess` if any byte of the range is not readable.
    fn read_memory(&self, address: Address, len: usize) -> Result<Vec<u8>>;
}

/// A data trap armed for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataTrap
{
    pub address: Address,
    pub size: usize,
    pub access: WatchpointAccess,
}

impl DataTrap
{
    /// Returns `true` if an access of `kind` to `[address, address + len)` triggers the trap.
    #[must_use]
    pub fn triggered_by(&self, address: Address, len: usize, kind: AccessKind) -> bool
    {
        self.access.matches(kind)
            && crate::types::AddressRange::with_len(self.address, self.size as u64).overlaps(address, len as u64)
    }
}

/// Traps armed while the inferior runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrapSet
{
    /// Code addresses that stop the inferior before the instruction executes.
    pub code: BTreeSet<Address>,
    /// Data ranges that stop the inferior after an access.
    pub data: Vec<DataTrap>,
}

impl TrapSet
{
    #[must_use]
    pub fn has_code_trap(&self, address: Address) -> bool
    {
        self.code.contains(&address)
    }

    /// Returns `true` if any data trap fires for the access.
    #[must_use]
    pub fn data_triggered(&self, address: Address, len: usize, kind: AccessKind) -> bool
    {
        self.data.iter().any(|trap| trap.triggered_by(address, len, kind))
    }
}

/// One trap satisfied during a stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapHit
{
    /// The pc reached an armed code address.
    Code
    {
        address: Address
    },
    /// An instruction accessed an armed data range.
    Data
    {
        /// First byte accessed.
        address: Address,
        /// Bytes accessed.
        size: usize,
        kind: AccessKind,
    },
}

/// Raw description of a stop, before arbitration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopEvent
{
    /// Program counter of the stopped thread.
    pub pc: Address,
    /// Every trap satisfied by this stop.
    pub hits: Vec<TrapHit>,
    /// Signal delivered to the inferior, if any.
    pub signal: Option<i32>,
    /// A requested single step finished.
    pub step_completed: bool,
}

/// What the inferior reports after running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InferiorEvent
{
    Stopped(StopEvent),
    Exited
    {
        code: i32
    },
}

/// Minimal frame record produced by a backend's unwinder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawFrame
{
    /// Program counter (return address for caller frames).
    pub pc: Address,
    /// Base that frame-relative variable offsets apply to.
    pub frame_base: Address,
}

/// A process under debugger control.
pub trait Inferior
{
    /// Architecture of the process.
    fn architecture(&self) -> Architecture;

    /// Process id once started.
    fn pid(&self) -> Option<ProcessId>;

    /// Id of the (single) controlled thread.
    fn thread_id(&self) -> ThreadId;

    /// Create the process, stopped before its first instruction.
    ///
    /// ## Errors
    ///
    /// `InvalidState` if it was already started.
    fn start(&mut self) -> Result<()>;

    /// Run until a trap, a signal or exit.
    ///
    /// A code trap at the current pc does not fire again; the instruction
    /// under it executes first.
    ///
    /// ## Errors
    ///
    /// `InvalidState` if the process is not started or has exited.
    fn resume(&mut self, traps: &TrapSet) -> Result<InferiorEvent>;

    /// Execute exactly one instruction.
    ///
    /// ## Errors
    ///
    /// `InvalidState` if the process is not started or has exited.
    fn single_step(&mut self, traps: &TrapSet) -> Result<InferiorEvent>;

    /// Frames of the stopped thread, innermost first.
    ///
    /// ## Errors
    ///
    /// `InvalidState` if the process is not stopped.
    fn frames(&self) -> Result<Vec<RawFrame>>;

    /// Terminate the process.
    ///
    /// ## Errors
    ///
    /// Backend specific.
    fn kill(&mut self) -> Result<()>;

    /// Memory of the process.
    fn memory(&self) -> &dyn MemoryReader;
}
