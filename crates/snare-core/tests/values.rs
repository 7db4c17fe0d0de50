//! Tests for value introspection: children, summaries, expression paths,
//! formatters and staleness

mod common;

use common::*;
use snare_core::error::SnareError;
use snare_core::session::Session;
use snare_core::types::{Address, Architecture, ProcessState};
use snare_core::values::format::{BasicFormatter, ChildVisitingFormatter, RecursiveFormatter, ValueFormatter};
use snare_core::values::ValueOrigin;

fn stopped_at_break_line(arch: Architecture) -> Session
{
    let mut session = value_api_session(arch);
    session
        .breakpoint_create_by_location("main.c", VALUE_API_BREAK_LINE)
        .unwrap();
    assert_eq!(session.launch().unwrap(), ProcessState::Stopped);
    session
}

#[test]
fn test_value_api_walkthrough()
{
    for arch in [Architecture::X86_64, Architecture::X86] {
        let session = stopped_at_break_line(arch);
        let width = u64::from(arch.pointer_size_bytes());
        let frame = session.selected_frame().unwrap();
        let inspector = session.inspector().unwrap();

        let days_of_week = inspector.find_variable(&frame, "days_of_week").unwrap();
        assert_eq!(inspector.child_count(&days_of_week).unwrap(), 7);
        assert_eq!(inspector.type_name(&days_of_week).unwrap(), "char *[7]");
        let saturday = inspector.child_at(&days_of_week, 6).unwrap();
        assert_eq!(saturday.name(), "[6]");
        assert_eq!(inspector.summary(&saturday).unwrap().as_deref(), Some("\"Saturday\""));

        let weekdays = inspector.find_variable(&frame, "weekdays").unwrap();
        assert_eq!(inspector.child_count(&weekdays).unwrap(), 5);
        let monday = inspector.child_at(&weekdays, 0).unwrap();
        assert_eq!(inspector.summary(&monday).unwrap().as_deref(), Some("\"Monday\""));

        let g_table = inspector.find_variable(&frame, "g_table").unwrap();
        assert_eq!(inspector.child_count(&g_table).unwrap(), 2);
        let cell = inspector.value_for_expression_path(&g_table, "[1][0].b").unwrap();
        assert_eq!(inspector.raw_value(&cell).unwrap().as_deref(), Some("6"));

        let my_int_ptr = inspector.find_variable(&frame, "my_int_ptr").unwrap();
        assert!(matches!(my_int_ptr.origin(), ValueOrigin::Variable(_)));
        assert_eq!(
            inspector.raw_value(&my_int_ptr).unwrap(),
            Some(Address::new(G_MY_INT).to_padded_hex(arch.pointer_size_bytes()))
        );
        let pointee = inspector.child_at(&my_int_ptr, 0).unwrap();
        assert_eq!(pointee.name(), "*my_int_ptr");
        assert_eq!(inspector.raw_value(&pointee).unwrap().as_deref(), Some("100"));
        assert_eq!(inspector.load_address(&pointee).unwrap(), Address::new(G_MY_INT));
        let symbol = inspector.backing_symbol(&pointee).unwrap().unwrap();
        assert_eq!(symbol.display_name(), "g_my_int");

        let str_ptr = inspector.find_variable(&frame, "str_ptr").unwrap();
        assert!(inspector.is_pointer(&str_ptr).unwrap());
        assert_eq!(inspector.byte_size(&str_ptr).unwrap(), width);
        assert_eq!(inspector.type_name(&str_ptr).unwrap(), "char **");

        let friday = inspector.child_at(&str_ptr, 5).unwrap();
        assert_eq!(friday.name(), "[5]");
        assert_eq!(inspector.summary(&friday).unwrap().as_deref(), Some("\"Friday\""));
        let by_path = inspector.value_for_expression_path(&str_ptr, "[5]").unwrap();
        assert_eq!(by_path.address(), friday.address());
        assert_eq!(inspector.summary(&by_path).unwrap().as_deref(), Some("\"Friday\""));
        assert_eq!(inspector.raw_value(&by_path).unwrap(), inspector.raw_value(&friday).unwrap());
        assert_eq!(inspector.summary(&by_path).unwrap(), inspector.summary(&friday).unwrap());
        assert!(inspector.raw_value(&friday).unwrap().is_some());

        let i = inspector.find_variable(&frame, "i").unwrap();
        assert_eq!(inspector.raw_value(&i).unwrap().as_deref(), Some("0"));
    }
}

#[test]
fn test_leading_star_dereferences_the_result()
{
    let session = stopped_at_break_line(Architecture::X86_64);
    let frame = session.selected_frame().unwrap();
    let inspector = session.inspector().unwrap();
    let str_ptr = inspector.find_variable(&frame, "str_ptr").unwrap();

    let first_letter = inspector.value_for_expression_path(&str_ptr, "*[1]").unwrap();
    assert_eq!(inspector.type_name(&first_letter).unwrap(), "char");
    assert_eq!(inspector.raw_value(&first_letter).unwrap().as_deref(), Some("'M'"));
}

#[test]
fn test_bad_paths_are_rejected()
{
    let session = stopped_at_break_line(Architecture::X86_64);
    let frame = session.selected_frame().unwrap();
    let inspector = session.inspector().unwrap();
    let g_table = inspector.find_variable(&frame, "g_table").unwrap();
    let i = inspector.find_variable(&frame, "i").unwrap();
    let my_int_ptr = inspector.find_variable(&frame, "my_int_ptr").unwrap();

    assert!(matches!(
        inspector.value_for_expression_path(&g_table, "[2]"),
        Err(SnareError::NotFound(_))
    ));
    assert!(matches!(
        inspector.value_for_expression_path(&g_table, "[0][0].c"),
        Err(SnareError::NotFound(_))
    ));
    assert!(matches!(
        inspector.value_for_expression_path(&i, "[0]"),
        Err(SnareError::InvalidArgument(_))
    ));
    assert!(matches!(
        inspector.value_for_expression_path(&g_table, "[0"),
        Err(SnareError::InvalidArgument(_))
    ));
    assert!(matches!(inspector.dereference(&i), Err(SnareError::InvalidArgument(_))));
    assert!(matches!(
        inspector.value_for_expression_path(&my_int_ptr, ".a"),
        Err(SnareError::InvalidArgument(_))
    ));
}

#[test]
fn test_globals_and_typed_addresses()
{
    let session = stopped_at_break_line(Architecture::X86_64);
    let inspector = session.inspector().unwrap();

    let globals = inspector.global_variables("g_my_int").unwrap();
    assert_eq!(globals.len(), 1);
    assert_eq!(inspector.location(&globals[0]).unwrap(), "0x00000000000040a0");

    let viewed = inspector
        .value_at_address(Address::new(G_MY_INT), "int")
        .unwrap();
    assert_eq!(inspector.raw_value(&viewed).unwrap().as_deref(), Some("100"));
    assert!(matches!(
        inspector.value_at_address(Address::new(G_MY_INT), "integer"),
        Err(SnareError::NotFound(_))
    ));
    assert!(matches!(inspector.global_variables("g_my"), Err(SnareError::NotFound(_))));
}

#[test]
fn test_formatters()
{
    let session = stopped_at_break_line(Architecture::X86_64);
    let frame = session.selected_frame().unwrap();
    let inspector = session.inspector().unwrap();
    let days_of_week = inspector.find_variable(&frame, "days_of_week").unwrap();

    let basic = BasicFormatter.format(&inspector, &days_of_week).unwrap();
    assert_eq!(basic, "(char *[7]) days_of_week = 0x0000000000004000 (location)\n");

    let listing = ChildVisitingFormatter::default()
        .format(&inspector, &days_of_week)
        .unwrap();
    assert_eq!(listing.lines().count(), 8);
    assert!(listing.contains("\n  (char *) [0] = \"Sunday\"\n"));
    assert!(listing.ends_with("  (char *) [6] = \"Saturday\"\n"));

    let g_table = inspector.find_variable(&frame, "g_table").unwrap();
    let tree = RecursiveFormatter::default().format(&inspector, &g_table).unwrap();
    assert!(tree.starts_with("(MyStruct [2][2]) g_table = 0x0000000000004080 (location)\n"));
    assert!(tree.contains("\n  (MyStruct [2]) [0] = 0x0000000000004080 (location)\n"));
    assert!(tree.contains("\n      (int) a = 1\n"));
    assert!(tree.ends_with("      (int) b = 8\n"));

    let my_int_ptr = inspector.find_variable(&frame, "my_int_ptr").unwrap();
    let pointer = RecursiveFormatter::default().format(&inspector, &my_int_ptr).unwrap();
    assert_eq!(
        pointer,
        "(int *) my_int_ptr = 0x00000000000040a0\n  (int) *my_int_ptr = 100\n"
    );
}

#[test]
fn test_values_go_stale_after_resume()
{
    let mut session = stopped_at_break_line(Architecture::X86_64);
    session
        .breakpoint_create_by_address(Address::new(0x1028))
        .unwrap();
    let frame = session.selected_frame().unwrap();
    let before = session.generation();
    let value = {
        let inspector = session.inspector().unwrap();
        inspector.find_variable(&frame, "i").unwrap()
    };

    session.continue_process().unwrap();
    assert!(session.generation() > before);

    let inspector = session.inspector().unwrap();
    assert!(matches!(inspector.raw_value(&value), Err(SnareError::InvalidState(_))));
    assert!(matches!(inspector.child_count(&value), Err(SnareError::InvalidState(_))));
    assert!(matches!(
        inspector.find_variable(&frame, "i"),
        Err(SnareError::InvalidState(_))
    ));

    let fresh = session.selected_frame().unwrap();
    let again = inspector.find_variable(&fresh, "i").unwrap();
    assert_eq!(inspector.raw_value(&again).unwrap().as_deref(), Some("0"));
}

#[test]
fn test_no_introspection_while_not_stopped()
{
    let mut session = value_api_session(Architecture::X86_64);
    assert!(matches!(session.inspector(), Err(SnareError::InvalidState(_))));
    assert!(matches!(session.frames(), Err(SnareError::InvalidState(_))));

    assert_eq!(session.launch().unwrap(), ProcessState::Exited(0));
    assert!(matches!(session.inspector(), Err(SnareError::InvalidState(_))));
    assert!(matches!(session.backtrace(), Err(SnareError::InvalidState(_))));
}

#[test]
fn test_struct_members_after_step()
{
    let mut session = struct_types_session(Architecture::X86_64);
    session
        .breakpoint_create_by_location("main.c", STRUCT_DECL_LINE)
        .unwrap();
    session.launch().unwrap();
    session.step_over().unwrap();
    session.step_over().unwrap();

    let frame = session.selected_frame().unwrap();
    assert_eq!(frame.line_entry().map(|entry| entry.line), Some(16));
    let inspector = session.inspector().unwrap();

    let pt = inspector.find_variable(&frame, "pt").unwrap();
    assert_eq!(inspector.child_count(&pt).unwrap(), 3);
    let y = inspector.child_by_name(&pt, "y").unwrap();
    assert_eq!(inspector.raw_value(&y).unwrap().as_deref(), Some("3"));
    let padding = inspector.child_by_name(&pt, "padding").unwrap();
    assert_eq!(inspector.child_count(&padding).unwrap(), 0);

    let rect = inspector.find_variable(&frame, "rect").unwrap();
    let top_right_x = inspector.value_for_expression_path(&rect, ".top_right.x").unwrap();
    assert_eq!(inspector.raw_value(&top_right_x).unwrap().as_deref(), Some("3"));
}
