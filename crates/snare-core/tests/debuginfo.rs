//! Tests for module lookups: types, globals, line tables and symbols

mod common;

use common::*;
use snare_core::debuginfo::{ModuleBuilder, ScalarEncoding, TypeKind};
use snare_core::error::SnareError;
use snare_core::types::{Address, Architecture};

#[test]
fn test_struct_declaration_keeps_zero_length_array()
{
    let module = struct_types_module(Architecture::X86_64);
    let point = module.find_type("point_tag").unwrap();
    let text = module.describe_type(point);
    assert!(text.starts_with("struct point_tag {"));
    assert!(text.contains("int x;"));
    assert!(text.contains("int y;"));
    assert!(text.contains("char padding[0];"));
    assert_eq!(module.byte_size(point).unwrap(), 8);

    let rect = module.find_type("struct rect_tag").unwrap();
    assert!(module.describe_type(rect).contains("point_tag top_right;"));
    assert_eq!(module.byte_size(rect).unwrap(), 16);
}

#[test]
fn test_type_lookup_is_exact()
{
    let module = struct_types_module(Architecture::X86_64);
    match module.find_type("point") {
        Err(SnareError::NotFound(message)) => assert!(message.contains("point")),
        _ => panic!("Expected NotFound for a partial type name"),
    }
}

#[test]
fn test_type_spelling()
{
    let module = value_api_module(Architecture::X86_64);
    let days = &module.find_globals("days_of_week").unwrap()[0];
    assert_eq!(module.type_name(days.ty), "char *[7]");
    let table = &module.find_globals("g_table").unwrap()[0];
    assert_eq!(module.type_name(table.ty), "MyStruct [2][2]");
    assert_eq!(module.byte_size(table.ty).unwrap(), 32);
}

#[test]
fn test_pointer_size_follows_architecture()
{
    for (arch, width) in [(Architecture::X86, 4), (Architecture::X86_64, 8)] {
        let module = value_api_module(arch);
        let days = &module.find_globals("days_of_week").unwrap()[0];
        assert_eq!(module.byte_size(days.ty).unwrap(), 7 * width);
        match &module.type_info(days.ty).unwrap().kind {
            TypeKind::Array { count, .. } => assert_eq!(*count, 7),
            _ => panic!("Expected an array type"),
        }
    }
}

#[test]
fn test_mismatched_pointer_size_is_rejected()
{
    let mut builder = ModuleBuilder::new("a.out", Architecture::X86);
    builder.compile_unit("main.c");
    let int = builder.scalar("int", ScalarEncoding::Signed, 4);
    let wide = builder.pointer_with_size(Some(int), 8);
    builder.global("p", wide, 0x4000);

    match builder.build() {
        Err(SnareError::ArchitectureMismatch(_)) => {}
        _ => panic!("Expected ArchitectureMismatch"),
    }
}

#[test]
fn test_line_entries()
{
    let module = value_api_module(Architecture::X86_64);
    let entries = module.line_entries_for("main.c", 24).unwrap();
    assert_eq!(entries.len(), 2);
    assert!(module.line_entries_for("main.c", 21).unwrap().is_empty());
    assert!(matches!(
        module.line_entries_for("other.c", 1),
        Err(SnareError::NotFound(_))
    ));

    let entry = module.line_entry_for_address(Address::new(0x1024)).unwrap();
    assert_eq!(entry.line, VALUE_API_BREAK_LINE);
    assert_eq!(entry.to_string(), "main.c:25");
}

#[test]
fn test_query_longer_than_recorded_path_does_not_match()
{
    let module = value_api_module(Architecture::X86_64);
    assert!(module.line_entries_for("/src/project/main.c", 25).is_err());
    assert_eq!(module.line_entries_for("main.c", 25).unwrap().len(), 1);
}

#[test]
fn test_scope_for_declaration_line()
{
    let module = struct_types_module(Architecture::X86_64);
    let scope = module.scope_for_line("main.c", STRUCT_DECL_LINE).unwrap();
    assert_eq!(scope.name, "main");
    assert!(module.scope_for_line("main.c", 40).is_none());
}

#[test]
fn test_symbolication()
{
    let module = value_api_module(Architecture::X86_64);
    assert_eq!(module.symbolicate(Address::new(0x1020)), "a.out`main + 32 at main.c:25");
    assert_eq!(module.symbolicate(Address::new(0x1000)), "a.out`main at main.c:20");

    let symbol = module.symbol_for_address(Address::new(G_MY_INT + 2)).unwrap();
    assert_eq!(symbol.display_name(), "g_my_int");
    assert!(module.symbol_named("weekdays").is_some());
}

#[test]
fn test_globals_and_functions()
{
    let module = watchlocation_module(Architecture::X86_64);
    assert_eq!(module.find_globals("g_char_ptr").unwrap().len(), 1);
    assert!(matches!(module.find_globals("g_char"), Err(SnareError::NotFound(_))));

    let callee = module.function_named("do_bad_thing_with_location").unwrap();
    let names: Vec<&str> = callee.variables().map(|variable| variable.name.as_str()).collect();
    assert_eq!(names, vec!["char_ptr", "new_val"]);
    assert_eq!(
        module.function_at(Address::new(0x3104)).map(|function| function.name.as_str()),
        Some("do_bad_thing_with_location")
    );
}
