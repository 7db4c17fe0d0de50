//! # Debug Session
//!
//! A [`Session`] is the explicitly constructed owner of everything needed to
//! debug one process: the [`Module`] with its debug information, the inferior
//! backend, breakpoints, watchpoints and the process controller.
//!
//! ```text
//! Session::new(module, inferior, config)
//!   ├─ breakpoint_create_by_location("main.c", 14)   (before or after launch)
//!   ├─ launch()                                        -> Stopped at breakpoint 1.1
//!   ├─ frames() / inspector() / watch_value(...)       (only while Stopped)
//!   ├─ continue_process()                              -> Stopped | Exited
//!   └─ teardown()                                      (also on drop)
//! ```
//!
//! There is no global debugger state: two sessions never share anything.

use tracing::{debug, info, warn};

use crate::breakpoints::{Breakpoint, BreakpointBuilder, BreakpointId, BreakpointStore};
use crate::config::EngineConfig;
use crate::debuginfo::Module;
use crate::error::{Result, SnareError};
use crate::events::DebuggerEventReceiver;
use crate::frames::{Frame, ThreadSnapshot};
use crate::inferior::Inferior;
use crate::memory::{format_memory, MemoryReadOptions};
use crate::process::ProcessController;
use crate::types::{Address, Generation, ProcessId, ProcessState, StopReason, Symbol};
use crate::values::Inspector;
use crate::watchpoints::{Watchpoint, WatchpointAccess, WatchpointId, WatchpointManager};

/// One debugged process and its debug information.
#[derive(Debug)]
pub struct Session
{
    module: Module,
    controller: ProcessController,
    breakpoints: BreakpointStore,
    watchpoints: WatchpointManager,
    config: EngineConfig,
    torn_down: bool,
}

impl Session
{
    /// Create a session over `module` and an inferior that has not started yet.
    ///
    /// ## Errors
    ///
    /// `ArchitectureMismatch` if the inferior and the module disagree on the
    /// architecture.
    pub fn new(module: Module, inferior: Box<dyn Inferior>, config: EngineConfig) -> Result<Self>
    {
        if inferior.architecture() != module.architecture() {
            return Err(SnareError::ArchitectureMismatch(format!(
                "module {} is {}, inferior is {}",
                module.name(),
                module.architecture(),
                inferior.architecture()
            )));
        }
        info!("Created session for {} ({})", module.name(), module.architecture());
        let watchpoints = WatchpointManager::new(config.hardware_watchpoint_slots);
        Ok(Self {
            module,
            controller: ProcessController::new(inferior),
            breakpoints: BreakpointStore::new(),
            watchpoints,
            config,
            torn_down: false,
        })
    }

    #[must_use]
    pub fn module(&self) -> &Module
    {
        &self.module
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig
    {
        &self.config
    }

    fn require_stopped(&self, action: &str) -> Result<()>
    {
        let state = self.controller.state();
        if state.is_stopped() {
            Ok(())
        } else {
            Err(SnareError::invalid_state(format!("cannot {action}: process is {state}")))
        }
    }

    // ---- breakpoints ----

    /// Breakpoint on `file:line`, moved to the next line with code when
    /// the configuration allows it.
    ///
    /// ## Errors
    ///
    /// `NotFound` for an unknown file, `Unresolvable` when no code can be bound.
    pub fn breakpoint_create_by_location(&mut self, file: &str, line: u32) -> Result<BreakpointId>
    {
        self.add_breakpoint(BreakpointBuilder::source_line(file, line))
    }

    /// Breakpoint after the prologue of the function `name`.
    ///
    /// ## Errors
    ///
    /// `NotFound` for an unknown function.
    pub fn breakpoint_create_by_name(&mut self, name: &str) -> Result<BreakpointId>
    {
        self.add_breakpoint(BreakpointBuilder::function(name))
    }

    /// Breakpoint at a code address.
    ///
    /// ## Errors
    ///
    /// None at present; the signature matches the other constructors.
    pub fn breakpoint_create_by_address(&mut self, address: Address) -> Result<BreakpointId>
    {
        self.add_breakpoint(BreakpointBuilder::address(address))
    }

    /// Resolve and store a configured breakpoint.
    ///
    /// ## Errors
    ///
    /// Resolution errors; nothing is stored on failure.
    pub fn add_breakpoint(&mut self, builder: BreakpointBuilder) -> Result<BreakpointId>
    {
        let resolution = builder.resolve(&self.module, self.config.move_to_nearest_code)?;
        let (spec, enabled) = builder.into_parts();
        let id = self.breakpoints.insert(spec, resolution, enabled);
        if let Some(breakpoint) = self.breakpoints.get(id) {
            info!(
                "Breakpoint {}: {}, {} location(s)",
                id,
                breakpoint.spec(),
                breakpoint.num_locations()
            );
        }
        Ok(id)
    }

    /// ## Errors
    ///
    /// `NotFound` for an unknown id.
    pub fn breakpoint(&self, id: BreakpointId) -> Result<&Breakpoint>
    {
        self.breakpoints
            .get(id)
            .ok_or_else(|| SnareError::not_found(format!("breakpoint {id}")))
    }

    /// All breakpoints in id order.
    pub fn breakpoints(&self) -> impl Iterator<Item = &Breakpoint>
    {
        self.breakpoints.list()
    }

    /// `breakpoint list` text for one breakpoint.
    ///
    /// ## Errors
    ///
    /// `NotFound` for an unknown id.
    pub fn describe_breakpoint(&self, id: BreakpointId) -> Result<String>
    {
        Ok(self.breakpoint(id)?.describe(&self.module))
    }

    /// `breakpoint list` text for every breakpoint.
    #[must_use]
    pub fn describe_breakpoints(&self) -> String
    {
        if self.breakpoints.is_empty() {
            return "No breakpoints currently set.".to_string();
        }
        let mut text = String::from("Current breakpoints:");
        for breakpoint in self.breakpoints.list() {
            text.push('\n');
            text.push_str(&breakpoint.describe(&self.module));
        }
        text
    }

    /// ## Errors
    ///
    /// `NotFound` for an unknown id.
    pub fn set_breakpoint_enabled(&mut self, id: BreakpointId, enabled: bool) -> Result<()>
    {
        self.breakpoints.set_enabled(id, enabled)
    }

    /// ## Errors
    ///
    /// `NotFound` for an unknown id.
    pub fn remove_breakpoint(&mut self, id: BreakpointId) -> Result<()>
    {
        self.breakpoints
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| SnareError::not_found(format!("breakpoint {id}")))
    }

    // ---- watchpoints ----

    /// Watch `size` bytes at `address`.
    ///
    /// ## Errors
    ///
    /// - `InvalidState` unless the process is stopped
    /// - `InvalidArgument` for sizes other than 1, 2, 4 or 8
    /// - `ResourceExhausted` when every hardware slot is in use
    /// - `MemoryAccess` if the range is not readable
    pub fn watch_address(&mut self, address: Address, size: usize, access: WatchpointAccess) -> Result<WatchpointId>
    {
        self.arm_watchpoint(address, size, access, None)
    }

    /// Watch the storage of the variable `name` as seen from `frame`.
    ///
    /// ## Errors
    ///
    /// As [`Session::watch_address`], plus `NotFound` for an unknown variable
    /// and `InvalidState` for a stale frame.
    pub fn watch_value(&mut self, frame: &Frame, name: &str, access: WatchpointAccess) -> Result<WatchpointId>
    {
        let (address, size) = {
            let inspector = self.inspector()?;
            let value = inspector.find_variable(frame, name)?;
            let size = usize::try_from(inspector.byte_size(&value)?)
                .map_err(|_| SnareError::invalid_argument(format!("'{name}' is too large to watch")))?;
            (value.address(), size)
        };
        self.arm_watchpoint(address, size, access, Some(name.to_string()))
    }

    /// Watch `size` bytes at the address held by the pointer variable `pointer`.
    ///
    /// ## Errors
    ///
    /// As [`Session::watch_value`], plus `InvalidArgument` if the variable is
    /// not a pointer.
    pub fn watch_location(&mut self, frame: &Frame, pointer: &str, access: WatchpointAccess, size: usize)
        -> Result<WatchpointId>
    {
        let address = {
            let inspector = self.inspector()?;
            let value = inspector.find_variable(frame, pointer)?;
            if !inspector.is_pointer(&value)? {
                return Err(SnareError::invalid_argument(format!("'{pointer}' is not a pointer")));
            }
            inspector.dereference(&value)?.address()
        };
        self.arm_watchpoint(address, size, access, Some(format!("*{pointer}")))
    }

    fn arm_watchpoint(&mut self, address: Address, size: usize, access: WatchpointAccess, variable: Option<String>)
        -> Result<WatchpointId>
    {
        self.require_stopped("set a watchpoint")?;
        let current = self
            .controller
            .inferior()
            .memory()
            .read_memory(address, size)
            .ok();
        if current.is_none() && size > 0 {
            return Err(SnareError::MemoryAccess { address, len: size });
        }
        self.watchpoints.create(address, size, access, variable, current)
    }

    /// ## Errors
    ///
    /// `NotFound` for an unknown id.
    pub fn watchpoint(&self, id: WatchpointId) -> Result<&Watchpoint>
    {
        self.watchpoints
            .get(id)
            .ok_or_else(|| SnareError::not_found(format!("watchpoint {id}")))
    }

    /// All watchpoints in id order.
    pub fn watchpoints(&self) -> impl Iterator<Item = &Watchpoint>
    {
        self.watchpoints.list()
    }

    /// `watchpoint list` text for one watchpoint.
    ///
    /// ## Errors
    ///
    /// `NotFound` for an unknown id.
    pub fn describe_watchpoint(&self, id: WatchpointId) -> Result<String>
    {
        Ok(self
            .watchpoint(id)?
            .describe(self.module.architecture().pointer_size_bytes()))
    }

    /// ## Errors
    ///
    /// `NotFound` for an unknown id.
    pub fn remove_watchpoint(&mut self, id: WatchpointId) -> Result<()>
    {
        self.watchpoints
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| SnareError::not_found(format!("watchpoint {id}")))
    }

    // ---- process control ----

    /// Start the inferior and run it to its first stop (or exit).
    ///
    /// ## Errors
    ///
    /// `InvalidState` if the process was already launched.
    pub fn launch(&mut self) -> Result<ProcessState>
    {
        self.controller.launch()?;
        self.wait_for_stop()
    }

    /// Let a stopped process run; pair with [`Session::wait_for_stop`].
    ///
    /// ## Errors
    ///
    /// `InvalidState` unless the process is stopped.
    pub fn resume(&mut self) -> Result<()>
    {
        self.controller.resume()
    }

    /// Block until the running process stops or exits.
    ///
    /// ## Errors
    ///
    /// `InvalidState` unless the process is running.
    pub fn wait_for_stop(&mut self) -> Result<ProcessState>
    {
        self.controller
            .wait_for_stop(&mut self.breakpoints, &mut self.watchpoints)
    }

    /// Resume and wait for the next stop.
    ///
    /// ## Errors
    ///
    /// `InvalidState` unless the process is stopped; continuing an exited
    /// process is an error.
    pub fn continue_process(&mut self) -> Result<ProcessState>
    {
        self.resume()?;
        self.wait_for_stop()
    }

    /// Step over the current source line.
    ///
    /// ## Errors
    ///
    /// `InvalidState` unless the process is stopped.
    pub fn step_over(&mut self) -> Result<ProcessState>
    {
        self.controller.step_over(
            &self.module,
            &mut self.breakpoints,
            &mut self.watchpoints,
            self.config.max_step_instructions,
        )
    }

    /// Execute a single instruction.
    ///
    /// ## Errors
    ///
    /// `InvalidState` unless the process is stopped.
    pub fn step_instruction(&mut self) -> Result<ProcessState>
    {
        self.controller
            .step_instruction(&mut self.breakpoints, &mut self.watchpoints)
    }

    /// Terminate the process.
    ///
    /// ## Errors
    ///
    /// `InvalidState` if it never ran or already exited.
    pub fn kill(&mut self) -> Result<()>
    {
        self.controller.kill(&mut self.watchpoints)
    }

    #[must_use]
    pub fn state(&self) -> ProcessState
    {
        self.controller.state()
    }

    #[must_use]
    pub fn stop_reason(&self) -> Option<StopReason>
    {
        self.controller.stop_reason()
    }

    #[must_use]
    pub fn generation(&self) -> Generation
    {
        self.controller.generation()
    }

    #[must_use]
    pub fn pid(&self) -> Option<ProcessId>
    {
        self.controller.inferior().pid()
    }

    /// Receive launch, stop, resume and exit events.
    pub fn subscribe(&mut self) -> DebuggerEventReceiver
    {
        self.controller.subscribe()
    }

    // ---- introspection ----

    /// Frames of the stopped thread, innermost first.
    ///
    /// ## Errors
    ///
    /// `InvalidState` unless the process is stopped.
    pub fn frames(&self) -> Result<Vec<Frame>>
    {
        let raw = self.controller.frames()?;
        let thread = self.controller.thread_id();
        let generation = self.generation();
        Ok(raw
            .into_iter()
            .enumerate()
            .map(|(index, frame)| Frame::from_raw(&self.module, frame, index, thread, generation))
            .collect())
    }

    /// Frame `index` of the stopped thread.
    ///
    /// ## Errors
    ///
    /// `InvalidState` unless stopped, `NotFound` past the outermost frame.
    pub fn frame(&self, index: usize) -> Result<Frame>
    {
        self.frames()?
            .into_iter()
            .nth(index)
            .ok_or_else(|| SnareError::not_found(format!("frame #{index}")))
    }

    /// The innermost frame.
    ///
    /// ## Errors
    ///
    /// See [`Session::frame`].
    pub fn selected_frame(&self) -> Result<Frame>
    {
        self.frame(0)
    }

    /// Threads of the stopped process.
    ///
    /// ## Errors
    ///
    /// `InvalidState` unless the process is stopped.
    pub fn threads(&self) -> Result<Vec<ThreadSnapshot>>
    {
        let frames = self.frames()?;
        Ok(vec![ThreadSnapshot {
            id: self.controller.thread_id(),
            index: 1,
            stop_reason: self.stop_reason(),
            frames,
        }])
    }

    /// `bt all` style listing.
    ///
    /// ## Errors
    ///
    /// `InvalidState` unless the process is stopped.
    pub fn backtrace(&self) -> Result<String>
    {
        Ok(self
            .threads()?
            .iter()
            .map(|thread| thread.backtrace(&self.module))
            .collect::<Vec<_>>()
            .join("\n"))
    }

    /// Value reader for the current stop.
    ///
    /// ## Errors
    ///
    /// `InvalidState` unless the process is stopped.
    pub fn inspector(&self) -> Result<Inspector<'_>>
    {
        self.require_stopped("inspect values")?;
        Ok(Inspector::new(
            &self.module,
            self.controller.inferior().memory(),
            self.generation(),
            &self.config,
        ))
    }

    /// Symbol containing a load address.
    #[must_use]
    pub fn resolve_load_address(&self, address: Address) -> Option<&Symbol>
    {
        self.module.symbol_for_address(address)
    }

    /// Raw inferior memory.
    ///
    /// ## Errors
    ///
    /// `InvalidState` unless stopped, `InvalidArgument` above the configured
    /// read limit, `MemoryAccess` if unreadable.
    pub fn read_memory(&self, address: Address, len: usize) -> Result<Vec<u8>>
    {
        self.require_stopped("read memory")?;
        if len > self.config.max_memory_read {
            return Err(SnareError::invalid_argument(format!(
                "memory read of {len} bytes exceeds the {} byte limit",
                self.config.max_memory_read
            )));
        }
        self.controller.inferior().memory().read_memory(address, len)
    }

    /// `memory read` style rendering.
    ///
    /// ## Errors
    ///
    /// As [`Session::read_memory`], plus option validation errors.
    pub fn format_memory(&self, address: Address, options: &MemoryReadOptions) -> Result<String>
    {
        self.require_stopped("read memory")?;
        format_memory(
            self.controller.inferior().memory(),
            address,
            options,
            self.module.architecture(),
            self.config.max_memory_read,
        )
    }

    // ---- teardown ----

    /// Kill a live process and release every breakpoint and watchpoint.
    ///
    /// Calling it again is a no-op.
    ///
    /// ## Errors
    ///
    /// Backend errors while killing the process.
    pub fn teardown(&mut self) -> Result<()>
    {
        if self.torn_down {
            return Ok(());
        }
        self.torn_down = true;
        if matches!(self.state(), ProcessState::Running | ProcessState::Stopped) {
            self.kill()?;
        }
        let ids: Vec<WatchpointId> = self.watchpoints.list().map(|watchpoint| watchpoint.id).collect();
        for id in ids {
            self.watchpoints.remove(id);
        }
        let ids: Vec<BreakpointId> = self.breakpoints.list().map(Breakpoint::id).collect();
        for id in ids {
            self.breakpoints.remove(id);
        }
        debug!("Session for {} torn down", self.module.name());
        Ok(())
    }
}

impl Drop for Session
{
    fn drop(&mut self)
    {
        if let Err(err) = self.teardown() {
            warn!("Session teardown failed: {err}");
        }
    }
}
