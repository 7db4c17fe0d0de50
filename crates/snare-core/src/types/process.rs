//! Process, thread, lifecycle and stop reason types.

use std::fmt;

use super::Address;
use crate::breakpoints::BreakpointId;
use crate::watchpoints::{AccessKind, WatchpointId};

/// Process identifier (PID)
///
/// ## Example
///
/// ```rust
/// use snare_core::types::ProcessId;
///
/// let pid = ProcessId::from(12345);
/// assert_eq!(u32::from(pid), 12345);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessId(pub u32);

impl From<u32> for ProcessId
{
    fn from(pid: u32) -> Self
    {
        ProcessId(pid)
    }
}

impl From<ProcessId> for u32
{
    fn from(pid: ProcessId) -> Self
    {
        pid.0
    }
}

impl fmt::Display for ProcessId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0)
    }
}

/// Thread identifier as reported by the inferior backend (a TID on Linux).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadId(pub u64);

impl ThreadId
{
    /// Raw `u64` representation of the thread identifier
    #[must_use]
    pub fn raw(&self) -> u64
    {
        self.0
    }
}

impl From<u64> for ThreadId
{
    fn from(value: u64) -> Self
    {
        Self(value)
    }
}

/// CPU architecture of a module or inferior
///
/// The architecture is the single source of truth for pointer width: pointer
/// types never carry a byte size of their own.
///
/// ## Example
///
/// ```rust
/// use snare_core::types::Architecture;
///
/// assert_eq!(Architecture::X86.pointer_size_bytes(), 4);
/// assert_eq!(Architecture::X86_64.pointer_size_bytes(), 8);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Architecture
{
    /// 32-bit x86 (i386).
    X86,
    /// x86-64 / AMD64.
    X86_64,
    /// 32-bit ARM.
    Arm,
    /// ARM64 / AArch64.
    Arm64,
    /// Anything else; treated as a 64-bit target.
    Unknown(&'static str),
}

impl Architecture
{
    /// Architecture the engine itself was compiled for.
    #[must_use]
    pub const fn current() -> Self
    {
        #[cfg(target_arch = "aarch64")]
        {
            Architecture::Arm64
        }
        #[cfg(target_arch = "x86_64")]
        {
            Architecture::X86_64
        }
        #[cfg(target_arch = "x86")]
        {
            Architecture::X86
        }
        #[cfg(target_arch = "arm")]
        {
            Architecture::Arm
        }
        #[cfg(not(any(
            target_arch = "aarch64",
            target_arch = "x86_64",
            target_arch = "x86",
            target_arch = "arm"
        )))]
        {
            Architecture::Unknown(std::env::consts::ARCH)
        }
    }

    /// Size of a pointer in bytes for this architecture.
    #[must_use]
    pub const fn pointer_size_bytes(self) -> u8
    {
        match self {
            Architecture::X86 | Architecture::Arm => 4,
            Architecture::Arm64 | Architecture::X86_64 | Architecture::Unknown(_) => 8,
        }
    }

    /// Name used in target triples and `image list` style output.
    #[must_use]
    pub const fn name(self) -> &'static str
    {
        match self {
            Architecture::X86 => "i386",
            Architecture::X86_64 => "x86_64",
            Architecture::Arm => "arm",
            Architecture::Arm64 => "arm64",
            Architecture::Unknown(name) => name,
        }
    }
}

impl fmt::Display for Architecture
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(self.name())
    }
}

/// Lifecycle state of the inferior process
///
/// ```text
/// NotLaunched -> Running -> Stopped -> { Running | Exited }
/// ```
///
/// `Exited` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState
{
    /// Session exists but `launch()` has not been called.
    NotLaunched,
    /// The inferior is executing.
    Running,
    /// The inferior is halted with an authoritative stop reason.
    Stopped,
    /// The inferior terminated with the given exit status.
    Exited(i32),
}

impl ProcessState
{
    /// Returns `true` while the process is halted.
    #[must_use]
    pub const fn is_stopped(self) -> bool
    {
        matches!(self, ProcessState::Stopped)
    }

    /// Returns `true` once the process has terminated.
    #[must_use]
    pub const fn is_exited(self) -> bool
    {
        matches!(self, ProcessState::Exited(_))
    }
}

impl fmt::Display for ProcessState
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            ProcessState::NotLaunched => f.write_str("not launched"),
            ProcessState::Running => f.write_str("running"),
            ProcessState::Stopped => f.write_str("stopped"),
            ProcessState::Exited(code) => write!(f, "exited with status = {code}"),
        }
    }
}

/// Why the process is stopped
///
/// Exactly one reason is reported per stop, even when several traps were
/// satisfied by the same instruction. See [`StopReason::precedence`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason
{
    /// A breakpoint location was reached.
    Breakpoint
    {
        /// Breakpoint that owns the location.
        id: BreakpointId,
        /// 1-based location index within the breakpoint.
        location: u32,
    },
    /// A watched memory range was accessed.
    Watchpoint
    {
        /// Watchpoint that fired.
        id: WatchpointId,
        /// Start of the access that triggered it.
        address: Address,
        /// Kind of access observed.
        access: AccessKind,
    },
    /// The inferior received a signal.
    Signal(i32),
    /// A step operation requested by the client completed.
    PlannedStep,
}

impl StopReason
{
    /// Rank used to pick the authoritative reason; higher wins
    ///
    /// Data traps are the most specific cause, then code traps, then signals,
    /// then completed steps.
    #[must_use]
    pub const fn precedence(&self) -> u8
    {
        match self {
            StopReason::Watchpoint { .. } => 3,
            StopReason::Breakpoint { .. } => 2,
            StopReason::Signal(_) => 1,
            StopReason::PlannedStep => 0,
        }
    }
}

impl fmt::Display for StopReason
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            StopReason::Breakpoint { id, location } => write!(f, "breakpoint {}.{location}", id.raw()),
            StopReason::Watchpoint { id, .. } => write!(f, "watchpoint {}", id.raw()),
            StopReason::Signal(sig) => match signal_name(*sig) {
                Some(name) => write!(f, "signal {name}"),
                None => write!(f, "signal {sig}"),
            },
            StopReason::PlannedStep => f.write_str("step over"),
        }
    }
}

/// Stop-event counter used to invalidate frames and values
///
/// Bumped on every transition out of `Stopped` and on exit. Anything tagged
/// with an older generation is stale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation
{
    /// Generation of a freshly created session.
    pub const INITIAL: Self = Generation(0);

    /// Raw counter value.
    #[must_use]
    pub const fn raw(self) -> u64
    {
        self.0
    }

    /// The following generation.
    #[must_use]
    pub const fn next(self) -> Self
    {
        Generation(self.0.wrapping_add(1))
    }
}

impl fmt::Display for Generation
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "#{}", self.0)
    }
}

/// Conventional name of a POSIX signal number, if it is a well-known one.
#[must_use]
pub fn signal_name(signal: i32) -> Option<&'static str>
{
    let name = match signal {
        libc::SIGHUP => "SIGHUP",
        libc::SIGINT => "SIGINT",
        libc::SIGQUIT => "SIGQUIT",
        libc::SIGILL => "SIGILL",
        libc::SIGTRAP => "SIGTRAP",
        libc::SIGABRT => "SIGABRT",
        libc::SIGBUS => "SIGBUS",
        libc::SIGFPE => "SIGFPE",
        libc::SIGKILL => "SIGKILL",
        libc::SIGUSR1 => "SIGUSR1",
        libc::SIGSEGV => "SIGSEGV",
        libc::SIGUSR2 => "SIGUSR2",
        libc::SIGPIPE => "SIGPIPE",
        libc::SIGALRM => "SIGALRM",
        libc::SIGTERM => "SIGTERM",
        libc::SIGCHLD => "SIGCHLD",
        libc::SIGSTOP => "SIGSTOP",
        _ => return None,
    };
    Some(name)
}
