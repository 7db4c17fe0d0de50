//! Session event types and helpers.
//!
//! Observers (a CLI, a test harness, a UI) subscribe to a session and receive
//! lifecycle events without polling `state()` / `stop_reason()`. Events are
//! published by the process controller on every launch, stop, resume and exit.

use std::sync::mpsc;

use crate::types::{Generation, ProcessId, StopReason, ThreadId};

/// Event emitted by the process controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebuggerEvent
{
    /// The inferior was created.
    ProcessLaunched
    {
        /// Process id reported by the backend, if any.
        pid: Option<ProcessId>,
    },
    /// The inferior stopped with one authoritative reason.
    TargetStopped
    {
        reason: StopReason,
        /// Thread responsible for the stop.
        thread: ThreadId,
        /// Generation that frames and values of this stop carry.
        generation: Generation,
    },
    /// The inferior resumed; everything from older generations is stale.
    TargetResumed
    {
        generation: Generation,
    },
    /// The inferior terminated.
    ProcessExited
    {
        code: i32,
    },
}

impl DebuggerEvent
{
    /// Human-readable description of the event.
    #[must_use]
    pub fn describe(&self) -> String
    {
        match self {
            Self::ProcessLaunched { pid: Some(pid) } => format!("Process {pid} launched"),
            Self::ProcessLaunched { pid: None } => "Process launched".to_string(),
            Self::TargetStopped { reason, thread, .. } => {
                format!("Process stopped: thread {}, stop reason = {reason}", thread.raw())
            }
            Self::TargetResumed { .. } => "Process resuming".to_string(),
            Self::ProcessExited { code } => format!("Process exited with status = {code}"),
        }
    }
}

/// Sender side of the event channel.
pub type DebuggerEventSender = mpsc::Sender<DebuggerEvent>;
/// Receiver side of the event channel.
pub type DebuggerEventReceiver = mpsc::Receiver<DebuggerEvent>;

/// Create a new event channel.
#[must_use]
pub fn event_channel() -> (DebuggerEventSender, DebuggerEventReceiver)
{
    mpsc::channel()
}
