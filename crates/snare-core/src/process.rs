//! # Process Controller
//!
//! Lifecycle state machine over an [`Inferior`]:
//!
//! ```text
//! NotLaunched --launch--> Running --stop--> Stopped --resume/step--> Running
//!                                    \                      \
//!                                     `--exit--> Exited <----`--kill
//! ```
//!
//! Each stop may satisfy several traps at once (a store that hits a watched
//! range and lands on a breakpoint, a signal raised at a breakpoint, ...).
//! Every satisfied trap records its hit, but exactly one authoritative
//! [`StopReason`] is reported: the highest [`StopReason::precedence`], and the
//! lowest id within a class.
//!
//! The controller also owns the generation counter. It moves forward on every
//! transition out of `Stopped` and on exit, which is how frames and values
//! taken during an earlier stop are recognised as stale.

use std::cmp::Reverse;

use tracing::{debug, info, trace, warn};

use crate::breakpoints::BreakpointStore;
use crate::debuginfo::Module;
use crate::error::{Result, SnareError};
use crate::events::{event_channel, DebuggerEvent, DebuggerEventReceiver, DebuggerEventSender};
use crate::inferior::{DataTrap, Inferior, InferiorEvent, RawFrame, StopEvent, TrapHit, TrapSet};
use crate::types::{AddressRange, Generation, ProcessState, StopReason, ThreadId};
use crate::watchpoints::{AccessKind, WatchpointManager};

/// Drives one inferior through its lifecycle.
pub struct ProcessController
{
    inferior: Box<dyn Inferior>,
    state: ProcessState,
    generation: Generation,
    stop_reason: Option<StopReason>,
    subscribers: Vec<DebuggerEventSender>,
}

impl std::fmt::Debug for ProcessController
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("ProcessController")
            .field("state", &self.state)
            .field("generation", &self.generation)
            .field("stop_reason", &self.stop_reason)
            .field("subscribers", &self.subscribers.len())
            .finish_non_exhaustive()
    }
}

impl ProcessController
{
    #[must_use]
    pub fn new(inferior: Box<dyn Inferior>) -> Self
    {
        Self {
            inferior,
            state: ProcessState::NotLaunched,
            generation: Generation::INITIAL,
            stop_reason: None,
            subscribers: Vec::new(),
        }
    }

    #[must_use]
    pub fn state(&self) -> ProcessState
    {
        self.state
    }

    #[must_use]
    pub fn generation(&self) -> Generation
    {
        self.generation
    }

    /// Authoritative reason of the current stop; `None` unless `Stopped`.
    #[must_use]
    pub fn stop_reason(&self) -> Option<StopReason>
    {
        self.stop_reason
    }

    #[must_use]
    pub fn inferior(&self) -> &dyn Inferior
    {
        self.inferior.as_ref()
    }

    #[must_use]
    pub fn thread_id(&self) -> ThreadId
    {
        self.inferior.thread_id()
    }

    /// Register an observer. Receivers that hang up are dropped silently.
    pub fn subscribe(&mut self) -> DebuggerEventReceiver
    {
        let (sender, receiver) = event_channel();
        self.subscribers.push(sender);
        receiver
    }

    fn publish(&mut self, event: &DebuggerEvent)
    {
        trace!("publishing event: {}", event.describe());
        self.subscribers.retain(|sender| sender.send(event.clone()).is_ok());
    }

    fn require(&self, expected: ProcessState, action: &str) -> Result<()>
    {
        if self.state == expected {
            Ok(())
        } else {
            Err(SnareError::invalid_state(format!("cannot {action}: process is {}", self.state)))
        }
    }

    /// Create the inferior. The process is `Running` afterwards; call
    /// [`ProcessController::wait_for_stop`] to run it to its first stop.
    ///
    /// ## Errors
    ///
    /// `InvalidState` unless the process is `NotLaunched`.
    pub fn launch(&mut self) -> Result<()>
    {
        self.require(ProcessState::NotLaunched, "launch")?;
        self.inferior.start()?;
        self.state = ProcessState::Running;
        let pid = self.inferior.pid();
        info!("Launched inferior (pid {:?})", pid.map(|pid| pid.0));
        self.publish(&DebuggerEvent::ProcessLaunched { pid });
        Ok(())
    }

    /// Let a stopped process run again. Values and frames of the current
    /// stop become stale.
    ///
    /// ## Errors
    ///
    /// `InvalidState` unless the process is `Stopped`.
    pub fn resume(&mut self) -> Result<()>
    {
        self.require(ProcessState::Stopped, "resume")?;
        self.leave_stopped();
        Ok(())
    }

    fn leave_stopped(&mut self)
    {
        self.generation = self.generation.next();
        self.state = ProcessState::Running;
        self.stop_reason = None;
        debug!("Resuming inferior, generation {}", self.generation);
        self.publish(&DebuggerEvent::TargetResumed {
            generation: self.generation,
        });
    }

    /// Run the inferior until the next stop or exit.
    ///
    /// ## Errors
    ///
    /// `InvalidState` unless the process is `Running`; backend errors.
    pub fn wait_for_stop(&mut self, breakpoints: &mut BreakpointStore, watchpoints: &mut WatchpointManager)
        -> Result<ProcessState>
    {
        self.require(ProcessState::Running, "wait for a stop")?;
        loop {
            let traps = trap_set(breakpoints, watchpoints);
            let event = self.inferior.resume(&traps)?;
            if self.handle_event(event, breakpoints, watchpoints)? {
                return Ok(self.state);
            }
            debug!("Ignoring stop with no armed cause");
        }
    }

    /// Execute one instruction of a stopped process.
    ///
    /// ## Errors
    ///
    /// `InvalidState` unless the process is `Stopped`.
    pub fn step_instruction(&mut self, breakpoints: &mut BreakpointStore, watchpoints: &mut WatchpointManager)
        -> Result<ProcessState>
    {
        self.require(ProcessState::Stopped, "step")?;
        self.leave_stopped();
        let traps = trap_set(breakpoints, watchpoints);
        let event = self.inferior.single_step(&traps)?;
        self.handle_event(event, breakpoints, watchpoints)?;
        Ok(self.state)
    }

    /// Step over the current source line.
    ///
    /// Single-steps until the pc reaches the start of a different line in the
    /// same frame, or returns to a caller. Calls made from the line are
    /// stepped through. A breakpoint, watchpoint, signal or exit on the way
    /// ends the step early with that reason. After `max_instructions` the step
    /// gives up and stops where it is.
    ///
    /// ## Errors
    ///
    /// `InvalidState` unless the process is `Stopped`.
    pub fn step_over(
        &mut self,
        module: &Module,
        breakpoints: &mut BreakpointStore,
        watchpoints: &mut WatchpointManager,
        max_instructions: usize,
    ) -> Result<ProcessState>
    {
        self.require(ProcessState::Stopped, "step over")?;
        let frames = self.inferior.frames()?;
        let Some(start) = frames.first().copied() else {
            return Err(SnareError::invalid_state("stopped thread has no frames"));
        };
        let start_depth = frames.len();
        let range = module
            .line_entry_for_address(start.pc)
            .map_or_else(|| AddressRange::with_len(start.pc, 1), |entry| entry.range);
        debug!("Stepping over {range} from {}", start.pc);

        self.leave_stopped();
        for _ in 0..max_instructions {
            let traps = trap_set(breakpoints, watchpoints);
            let event = self.inferior.single_step(&traps)?;
            let InferiorEvent::Stopped(mut stop) = event else {
                self.handle_event(event, breakpoints, watchpoints)?;
                return Ok(self.state);
            };

            let depth = self.inferior.frames()?.len();
            let done = depth < start_depth
                || (depth == start_depth
                    && !range.contains(stop.pc)
                    && module
                        .line_entry_for_address(stop.pc)
                        .map_or(true, |entry| entry.address() == stop.pc));
            stop.step_completed = done;
            if done || !stop.hits.is_empty() || stop.signal.is_some() {
                self.handle_event(InferiorEvent::Stopped(stop), breakpoints, watchpoints)?;
                return Ok(self.state);
            }
        }

        warn!("Step over gave up after {max_instructions} instructions");
        let pc = self.inferior.frames()?.first().map_or(start.pc, |frame| frame.pc);
        let stop = StopEvent {
            pc,
            hits: Vec::new(),
            signal: None,
            step_completed: true,
        };
        self.handle_event(InferiorEvent::Stopped(stop), breakpoints, watchpoints)?;
        Ok(self.state)
    }

    /// Terminate the inferior.
    ///
    /// ## Errors
    ///
    /// `InvalidState` if the process was never launched or already exited.
    pub fn kill(&mut self, watchpoints: &mut WatchpointManager) -> Result<()>
    {
        if matches!(self.state, ProcessState::NotLaunched | ProcessState::Exited(_)) {
            return Err(SnareError::invalid_state(format!("cannot kill: process is {}", self.state)));
        }
        self.inferior.kill()?;
        info!("Killed inferior");
        self.exited(libc::SIGKILL, watchpoints);
        Ok(())
    }

    /// Frames of the stopped thread.
    ///
    /// ## Errors
    ///
    /// `InvalidState` unless the process is `Stopped`.
    pub fn frames(&self) -> Result<Vec<RawFrame>>
    {
        self.require(ProcessState::Stopped, "read frames")?;
        self.inferior.frames()
    }

    fn exited(&mut self, code: i32, watchpoints: &mut WatchpointManager)
    {
        self.state = ProcessState::Exited(code);
        self.stop_reason = None;
        self.generation = self.generation.next();
        watchpoints.retire_all();
        info!("Inferior exited with status {code}");
        self.publish(&DebuggerEvent::ProcessExited { code });
    }

    /// Apply a backend event. Returns `false` for a stop with nothing to report.
    fn handle_event(
        &mut self,
        event: InferiorEvent,
        breakpoints: &mut BreakpointStore,
        watchpoints: &mut WatchpointManager,
    ) -> Result<bool>
    {
        let stop = match event {
            InferiorEvent::Exited { code } => {
                self.exited(code, watchpoints);
                return Ok(true);
            }
            InferiorEvent::Stopped(stop) => stop,
        };

        let mut candidates: Vec<StopReason> = Vec::new();
        for hit in &stop.hits {
            match *hit {
                TrapHit::Code { address } => {
                    candidates.extend(
                        breakpoints
                            .record_hits(address)
                            .into_iter()
                            .map(|(id, location)| StopReason::Breakpoint { id, location }),
                    );
                }
                TrapHit::Data { address, size, kind } => {
                    for id in watchpoints.record_hits(address, size, kind) {
                        if let Some(watched) = watchpoints.get(id).map(|w| (w.address, w.size)) {
                            if let Ok(bytes) = self.inferior.memory().read_memory(watched.0, watched.1) {
                                watchpoints.record_value(id, kind, bytes);
                            }
                        }
                        candidates.push(StopReason::Watchpoint {
                            id,
                            address,
                            access: kind,
                        });
                    }
                }
            }
        }
        if let Some(signal) = stop.signal {
            candidates.push(StopReason::Signal(signal));
        }
        if stop.step_completed {
            candidates.push(StopReason::PlannedStep);
        }

        let Some(reason) = arbitrate(&candidates) else {
            return Ok(false);
        };
        if candidates.len() > 1 {
            debug!("{} causes for this stop, reporting {reason}", candidates.len());
        }

        self.state = ProcessState::Stopped;
        self.stop_reason = Some(reason);
        info!("Inferior stopped at {}: {reason}", stop.pc);
        let thread = self.inferior.thread_id();
        self.publish(&DebuggerEvent::TargetStopped {
            reason,
            thread,
            generation: self.generation,
        });
        Ok(true)
    }
}

/// Pick the authoritative stop reason: highest precedence, then lowest id.
#[must_use]
pub fn arbitrate(candidates: &[StopReason]) -> Option<StopReason>
{
    candidates
        .iter()
        .copied()
        .max_by_key(|reason| (reason.precedence(), Reverse(tie_break_key(reason))))
}

fn tie_break_key(reason: &StopReason) -> (u64, u64)
{
    match reason {
        StopReason::Breakpoint { id, location } => (id.raw(), u64::from(*location)),
        StopReason::Watchpoint { id, .. } => (id.raw(), 0),
        StopReason::Signal(signal) => (u64::from(signal.unsigned_abs()), 0),
        StopReason::PlannedStep => (0, 0),
    }
}

fn trap_set(breakpoints: &BreakpointStore, watchpoints: &WatchpointManager) -> TrapSet
{
    TrapSet {
        code: breakpoints.armed_addresses(),
        data: watchpoints
            .armed()
            .map(|watchpoint| DataTrap {
                address: watchpoint.address,
                size: watchpoint.size,
                access: watchpoint.access,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::breakpoints::BreakpointId;
    use crate::types::Address;
    use crate::watchpoints::WatchpointId;

    #[test]
    fn test_watchpoint_beats_breakpoint_and_signal()
    {
        let reasons = [
            StopReason::Signal(libc::SIGSEGV),
            StopReason::Breakpoint {
                id: BreakpointId::from_raw(1),
                location: 1,
            },
            StopReason::Watchpoint {
                id: WatchpointId::from_raw(2),
                address: Address::new(0x10),
                access: AccessKind::Write,
            },
            StopReason::PlannedStep,
        ];
        assert!(matches!(arbitrate(&reasons), Some(StopReason::Watchpoint { .. })));
        assert_eq!(arbitrate(&reasons[..2]), Some(reasons[1]));
        assert_eq!(arbitrate(&[StopReason::PlannedStep]), Some(StopReason::PlannedStep));
        assert_eq!(arbitrate(&[]), None);
    }

    #[test]
    fn test_lowest_id_wins_within_class()
    {
        let low = StopReason::Breakpoint {
            id: BreakpointId::from_raw(2),
            location: 1,
        };
        let high = StopReason::Breakpoint {
            id: BreakpointId::from_raw(5),
            location: 1,
        };
        assert_eq!(arbitrate(&[high, low]), Some(low));
        assert_eq!(arbitrate(&[low, high]), Some(low));
    }
}
