//! Tests for the process lifecycle: launch, stops, stepping, events and teardown

mod common;

use common::*;
use snare_core::config::EngineConfig;
use snare_core::debuginfo::{Module, ModuleBuilder};
use snare_core::error::SnareError;
use snare_core::events::DebuggerEvent;
use snare_core::inferior::{Effect, ScriptedInferior};
use snare_core::session::Session;
use snare_core::types::{Address, Architecture, Generation, ProcessId, ProcessState, StopReason, ThreadId};
use snare_core::watchpoints::{WatchpointAccess, WatchpointState};

fn two_line_module() -> Module
{
    let mut builder = ModuleBuilder::new("a.out", Architecture::X86_64);
    builder.compile_unit("loop.c");
    builder.function("main", 0x1000, 0x1010, "loop.c", 1);
    builder.lines("loop.c", &[(1, 0x1000, 0x1008), (2, 0x1008, 0x1010)]);
    builder.build().unwrap()
}

#[test]
fn test_session_rejects_architecture_mismatch()
{
    let result = Session::new(
        value_api_module(Architecture::X86_64),
        Box::new(value_api_inferior(Architecture::X86)),
        EngineConfig::default(),
    );
    match result {
        Err(SnareError::ArchitectureMismatch(message)) => assert!(message.contains("i386")),
        _ => panic!("Expected ArchitectureMismatch"),
    }
}

#[test]
fn test_lifecycle_transitions()
{
    let mut session = value_api_session(Architecture::X86_64);
    assert_eq!(session.state(), ProcessState::NotLaunched);
    assert_eq!(session.pid(), None);
    assert!(matches!(session.continue_process(), Err(SnareError::InvalidState(_))));
    assert!(matches!(session.kill(), Err(SnareError::InvalidState(_))));

    session
        .breakpoint_create_by_location("main.c", VALUE_API_BREAK_LINE)
        .unwrap();
    assert_eq!(session.launch().unwrap(), ProcessState::Stopped);
    assert_eq!(session.pid(), Some(ProcessId(4242)));
    assert!(matches!(session.launch(), Err(SnareError::InvalidState(_))));

    assert_eq!(session.continue_process().unwrap(), ProcessState::Exited(0));
    assert_eq!(session.stop_reason(), None);
    match session.continue_process() {
        Err(SnareError::InvalidState(message)) => assert!(message.contains("exited with status = 0")),
        _ => panic!("Expected InvalidState after exit"),
    }
    assert!(matches!(session.step_over(), Err(SnareError::InvalidState(_))));
}

#[test]
fn test_events_follow_the_lifecycle()
{
    let mut session = value_api_session(Architecture::X86_64);
    let events = session.subscribe();
    let id = session
        .breakpoint_create_by_location("main.c", VALUE_API_BREAK_LINE)
        .unwrap();
    session.launch().unwrap();
    session.continue_process().unwrap();

    let received: Vec<DebuggerEvent> = events.try_iter().collect();
    assert_eq!(
        received,
        vec![
            DebuggerEvent::ProcessLaunched {
                pid: Some(ProcessId(4242))
            },
            DebuggerEvent::TargetStopped {
                reason: StopReason::Breakpoint { id, location: 1 },
                thread: ThreadId(4242),
                generation: Generation::INITIAL,
            },
            DebuggerEvent::TargetResumed {
                generation: Generation::INITIAL.next()
            },
            DebuggerEvent::ProcessExited { code: 0 },
        ]
    );
    assert_eq!(received[1].describe(), "Process stopped: thread 4242, stop reason = breakpoint 1.1");
}

#[test]
fn test_dropped_subscriber_does_not_block()
{
    let mut session = value_api_session(Architecture::X86_64);
    drop(session.subscribe());
    assert_eq!(session.launch().unwrap(), ProcessState::Exited(0));
}

#[test]
fn test_step_over_steps_through_calls()
{
    let mut session = watchlocation_session(Architecture::X86_64);
    session
        .breakpoint_create_by_location("main.cpp", WATCHLOCATION_BREAK_LINE)
        .unwrap();
    session.launch().unwrap();

    assert_eq!(session.step_over().unwrap(), ProcessState::Stopped);
    assert_eq!(session.stop_reason(), Some(StopReason::PlannedStep));
    let frame = session.selected_frame().unwrap();
    assert_eq!(frame.pc(), Address::new(0x3010));
    assert_eq!(frame.line_entry().map(|entry| entry.line), Some(25));
    assert_eq!(session.frames().unwrap().len(), 1);
}

#[test]
fn test_breakpoint_added_at_step_stop_does_not_refire()
{
    let mut session = watchlocation_session(Architecture::X86_64);
    session
        .breakpoint_create_by_location("main.cpp", WATCHLOCATION_BREAK_LINE)
        .unwrap();
    session.launch().unwrap();
    session.step_over().unwrap();
    assert_eq!(session.stop_reason(), Some(StopReason::PlannedStep));

    let pc = session.selected_frame().unwrap().pc();
    assert_eq!(pc, Address::new(0x3010));
    let here = session.breakpoint_create_by_address(pc).unwrap();

    assert_eq!(session.continue_process().unwrap(), ProcessState::Exited(0));
    assert_eq!(session.breakpoint(here).unwrap().hit_count(), 0);
}

#[test]
fn test_step_over_stops_at_breakpoint_in_callee()
{
    let mut session = watchlocation_session(Architecture::X86_64);
    session
        .breakpoint_create_by_location("main.cpp", WATCHLOCATION_BREAK_LINE)
        .unwrap();
    let inner = session.breakpoint_create_by_location("main.cpp", 12).unwrap();
    session.launch().unwrap();

    session.step_over().unwrap();
    assert_eq!(
        session.stop_reason(),
        Some(StopReason::Breakpoint {
            id: inner,
            location: 1
        })
    );
    assert_eq!(
        session.selected_frame().unwrap().function_name(),
        Some("do_bad_thing_with_location")
    );
    assert_eq!(session.frames().unwrap().len(), 2);
}

#[test]
fn test_step_instruction_enters_call()
{
    let mut session = watchlocation_session(Architecture::X86_64);
    session
        .breakpoint_create_by_location("main.cpp", WATCHLOCATION_BREAK_LINE)
        .unwrap();
    session.launch().unwrap();
    let before = session.generation();

    session.step_instruction().unwrap();
    assert_eq!(session.stop_reason(), Some(StopReason::PlannedStep));
    assert!(session.generation() > before);

    let frames = session.frames().unwrap();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].pc(), Address::new(0x3100));
    assert_eq!(frames[0].frame_base(), Address::new(CALLEE_FRAME));
    assert_eq!(frames[1].function_name(), Some("main"));
    assert_eq!(frames[1].line_entry().map(|entry| entry.line), Some(WATCHLOCATION_BREAK_LINE));

    let backtrace = session.backtrace().unwrap();
    assert!(backtrace.starts_with("* thread #1: tid = 4242, 0x0000000000003100 a.out`do_bad_thing_with_location"));
    assert!(backtrace.contains("stop reason = step over"));
    assert!(backtrace.contains("\n    frame #1: 0x0000000000003010 a.out`main"));
}

#[test]
fn test_signal_stop_and_exit_status()
{
    let module = two_line_module();
    let inferior = ScriptedInferior::builder(Architecture::X86_64)
        .entry(0x1000, STACK_BASE)
        .at(0x1000, Effect::Nop)
        .at(0x1004, Effect::Signal(libc::SIGUSR1))
        .at(0x1008, Effect::Exit(3))
        .build();
    let mut session = session(module, inferior);

    assert_eq!(session.launch().unwrap(), ProcessState::Stopped);
    assert_eq!(session.stop_reason(), Some(StopReason::Signal(libc::SIGUSR1)));
    assert_eq!(session.continue_process().unwrap(), ProcessState::Exited(3));
}

#[test]
fn test_step_over_gives_up_on_endless_line()
{
    let module = two_line_module();
    let inferior = ScriptedInferior::builder(Architecture::X86_64)
        .entry(0x1000, STACK_BASE)
        .at(0x1000, Effect::Nop)
        .at(0x1004, Effect::Jump(Address::new(0x1000)))
        .at(0x1008, Effect::Exit(0))
        .build();
    let config = EngineConfig {
        max_step_instructions: 50,
        ..EngineConfig::default()
    };
    let mut session = Session::new(module, Box::new(inferior), config).unwrap();
    let id = session
        .breakpoint_create_by_address(Address::new(0x1004))
        .unwrap();
    session.launch().unwrap();
    session.remove_breakpoint(id).unwrap();

    assert_eq!(session.step_over().unwrap(), ProcessState::Stopped);
    assert_eq!(session.stop_reason(), Some(StopReason::PlannedStep));
    let pc = session.selected_frame().unwrap().pc();
    assert!(pc == Address::new(0x1000) || pc == Address::new(0x1004));
}

#[test]
fn test_kill_retires_watchpoints()
{
    let mut session = watchpoint_session(Architecture::X86_64);
    session
        .breakpoint_create_by_location("main.c", WATCH_BREAK_LINE)
        .unwrap();
    session.launch().unwrap();
    let id = session
        .watch_address(Address::new(GLOBAL), 4, WatchpointAccess::Write)
        .unwrap();

    session.kill().unwrap();
    assert_eq!(session.state(), ProcessState::Exited(libc::SIGKILL));
    assert_eq!(session.watchpoint(id).unwrap().state, WatchpointState::Retired);
    assert!(matches!(session.kill(), Err(SnareError::InvalidState(_))));
    assert!(matches!(session.resume(), Err(SnareError::InvalidState(_))));
}

#[test]
fn test_teardown_is_idempotent()
{
    let mut session = watchpoint_session(Architecture::X86_64);
    session
        .breakpoint_create_by_location("main.c", WATCH_BREAK_LINE)
        .unwrap();
    session.launch().unwrap();
    session
        .watch_address(Address::new(GLOBAL), 4, WatchpointAccess::Write)
        .unwrap();

    session.teardown().unwrap();
    assert!(session.state().is_exited());
    assert_eq!(session.breakpoints().count(), 0);
    assert_eq!(session.watchpoints().count(), 0);
    session.teardown().unwrap();
}

#[test]
fn test_resume_and_wait_separately()
{
    let mut session = value_api_session(Architecture::X86_64);
    session
        .breakpoint_create_by_location("main.c", VALUE_API_BREAK_LINE)
        .unwrap();
    session.launch().unwrap();

    session.resume().unwrap();
    assert_eq!(session.state(), ProcessState::Running);
    assert!(matches!(session.inspector(), Err(SnareError::InvalidState(_))));
    assert!(matches!(session.resume(), Err(SnareError::InvalidState(_))));
    assert_eq!(session.wait_for_stop().unwrap(), ProcessState::Exited(0));
}
