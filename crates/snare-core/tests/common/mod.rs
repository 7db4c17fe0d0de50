//! Shared fixtures: modules and scripted inferiors modelled on small C programs.
//!
//! Each fixture comes as a `*_module` (debug information) and a `*_inferior`
//! (the program's behaviour), plus a `*_session` that wires both together.

#![allow(dead_code)]

use snare_core::config::EngineConfig;
use snare_core::debuginfo::{Module, ModuleBuilder, ScalarEncoding};
use snare_core::inferior::{Effect, ScriptedInferior};
use snare_core::session::Session;
use snare_core::types::{Address, Architecture};

pub const STACK_BASE: u64 = 0x7000;
pub const STACK_REGION: u64 = 0x6000;

pub fn session(module: Module, inferior: ScriptedInferior) -> Session
{
    Session::new(module, Box::new(inferior), EngineConfig::default()).expect("session")
}

fn pointer_bytes(value: u64, arch: Architecture) -> Vec<u8>
{
    value.to_le_bytes()[..usize::from(arch.pointer_size_bytes())].to_vec()
}

fn put(buffer: &mut [u8], offset: usize, bytes: &[u8])
{
    buffer[offset..offset + bytes.len()].copy_from_slice(bytes);
}

// ---------------------------------------------------------------------------
// value API program
//
// char *days_of_week[7] = { "Sunday", ..., "Saturday" };
// char *weekdays[5] = { "Monday", ..., "Friday" };
// struct MyStruct { int a; int b; };
// struct MyStruct g_table[2][2] = { { {1, 2}, {3, 4} }, { {5, 6}, {7, 8} } };
// int g_my_int = 100;
//
// int main (int argc, char const *argv[])          // line 20
// {
//     int *my_int_ptr = &g_my_int;                  // line 22
//     char **str_ptr = days_of_week;                // line 23
//     for (int i = 0; i < 7; ++i)                   // line 24
//         printf("%s\n", str_ptr[i]); // Break at this line   (line 25)
//     return 0;                                     // line 27
// }
// ---------------------------------------------------------------------------

pub const VALUE_API_BREAK_LINE: u32 = 25;
pub const DAYS: [&str; 7] = ["Sunday", "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday"];
pub const STRINGS_BASE: u64 = 0x3000;
pub const DAYS_OF_WEEK: u64 = 0x4000;
pub const WEEKDAYS: u64 = 0x4040;
pub const G_TABLE: u64 = 0x4080;
pub const G_MY_INT: u64 = 0x40a0;
pub const DATA_BASE: u64 = 0x4000;

pub fn value_api_module(arch: Architecture) -> Module
{
    let mut builder = ModuleBuilder::new("a.out", arch);
    builder.compile_unit("main.c");
    let int = builder.scalar("int", ScalarEncoding::Signed, 4);
    let char_ty = builder.scalar("char", ScalarEncoding::SignedChar, 1);
    let char_ptr = builder.pointer(char_ty);
    let char_ptr_ptr = builder.pointer(char_ptr);
    let int_ptr = builder.pointer(int);
    let days = builder.array(char_ptr, 7);
    let weekdays = builder.array(char_ptr, 5);
    let my_struct = builder.structure("MyStruct", &[("a", int), ("b", int)]);
    let row = builder.array(my_struct, 2);
    let table = builder.array(row, 2);

    builder.global("days_of_week", days, DAYS_OF_WEEK);
    builder.global("weekdays", weekdays, WEEKDAYS);
    builder.global("g_table", table, G_TABLE);
    builder.global("g_my_int", int, G_MY_INT);

    let main = builder.function("main", 0x1000, 0x1040, "main.c", 20);
    builder
        .parameter(main, "argc", int, -32)
        .local(main, "i", int, -4)
        .local(main, "my_int_ptr", int_ptr, -16)
        .local(main, "str_ptr", char_ptr_ptr, -24);
    builder.lines(
        "main.c",
        &[
            (20, 0x1000, 0x1008),
            (22, 0x1008, 0x1010),
            (23, 0x1010, 0x1018),
            (24, 0x1018, 0x1020),
            (25, 0x1020, 0x1028),
            (24, 0x1028, 0x1030),
            (27, 0x1030, 0x1040),
        ],
    );
    builder.build().expect("value API module")
}

/// Address of each day name in the string pool.
pub fn day_addresses() -> Vec<u64>
{
    let mut addresses = Vec::new();
    let mut cursor = STRINGS_BASE;
    for day in DAYS {
        addresses.push(cursor);
        cursor += day.len() as u64 + 1;
    }
    addresses
}

pub fn value_api_inferior(arch: Architecture) -> ScriptedInferior
{
    let width = usize::from(arch.pointer_size_bytes());

    let mut strings = Vec::new();
    for day in DAYS {
        strings.extend_from_slice(day.as_bytes());
        strings.push(0);
    }

    let days = day_addresses();
    let mut data = vec![0u8; 0x100];
    for (index, address) in days.iter().enumerate() {
        put(&mut data, index * width, &pointer_bytes(*address, arch));
    }
    for (index, address) in days[1..6].iter().enumerate() {
        put(&mut data, (WEEKDAYS - DATA_BASE) as usize + index * width, &pointer_bytes(*address, arch));
    }
    for (index, value) in (1i32..=8).enumerate() {
        put(&mut data, (G_TABLE - DATA_BASE) as usize + index * 4, &value.to_le_bytes());
    }
    put(&mut data, (G_MY_INT - DATA_BASE) as usize, &100i32.to_le_bytes());

    ScriptedInferior::builder(arch)
        .entry(0x1000, STACK_BASE)
        .region(STRINGS_BASE, strings)
        .region(DATA_BASE, data)
        .region(STACK_REGION, vec![0; 0x1000])
        .at(0x1000, Effect::Nop)
        .at(
            0x1008,
            Effect::Store {
                address: Address::new(STACK_BASE - 16),
                bytes: pointer_bytes(G_MY_INT, arch),
            },
        )
        .at(
            0x1010,
            Effect::Store {
                address: Address::new(STACK_BASE - 24),
                bytes: pointer_bytes(DAYS_OF_WEEK, arch),
            },
        )
        .at(
            0x1018,
            Effect::Store {
                address: Address::new(STACK_BASE - 4),
                bytes: 0i32.to_le_bytes().to_vec(),
            },
        )
        .at(
            0x1020,
            Effect::Load {
                address: Address::new(STACK_BASE - 24),
                size: width,
            },
        )
        .at(0x1028, Effect::Nop)
        .at(0x1030, Effect::Return)
        .build()
}

pub fn value_api_session(arch: Architecture) -> Session
{
    session(value_api_module(arch), value_api_inferior(arch))
}

// ---------------------------------------------------------------------------
// watchpoint program
//
// int32_t global = 10;
//
// int main (int argc, char const *argv[])          // line 10
// {
//     int32_t local = 0;                            // line 11
//     printf("&global=%p\n", &global); // Set break point at this line.   (line 12)
//     global = 20;                                  // line 13
//     local += argc;                                // line 14
//     printf("local: %d\n", local + global);        // line 15
//     return 0;                                     // line 16
// }
// ---------------------------------------------------------------------------

pub const WATCH_BREAK_LINE: u32 = 12;
pub const GLOBAL: u64 = 0x4000;

pub fn watchpoint_module(arch: Architecture) -> Module
{
    let mut builder = ModuleBuilder::new("a.out", arch);
    builder.compile_unit("main.c");
    let int32 = builder.scalar("int32_t", ScalarEncoding::Signed, 4);
    builder.global("global", int32, GLOBAL);
    let main = builder.function("main", 0x2000, 0x2020, "main.c", 10);
    builder.local(main, "local", int32, -4);
    builder.lines(
        "main.c",
        &[
            (10, 0x2000, 0x2004),
            (11, 0x2004, 0x2008),
            (12, 0x2008, 0x200c),
            (13, 0x200c, 0x2010),
            (14, 0x2010, 0x2014),
            (15, 0x2014, 0x2018),
            (16, 0x2018, 0x2020),
        ],
    );
    builder.build().expect("watchpoint module")
}

pub fn watchpoint_inferior(arch: Architecture) -> ScriptedInferior
{
    let mut data = vec![0u8; 0x40];
    put(&mut data, 0, &10i32.to_le_bytes());
    ScriptedInferior::builder(arch)
        .entry(0x2000, STACK_BASE)
        .region(GLOBAL, data)
        .region(STACK_REGION, vec![0; 0x1000])
        .at(0x2000, Effect::Nop)
        .at(
            0x2004,
            Effect::Store {
                address: Address::new(STACK_BASE - 4),
                bytes: 0i32.to_le_bytes().to_vec(),
            },
        )
        .at(0x2008, Effect::Nop)
        .at(
            0x200c,
            Effect::Store {
                address: Address::new(GLOBAL),
                bytes: 20i32.to_le_bytes().to_vec(),
            },
        )
        .at(
            0x2010,
            Effect::Store {
                address: Address::new(STACK_BASE - 4),
                bytes: 1i32.to_le_bytes().to_vec(),
            },
        )
        .at(
            0x2014,
            Effect::Load {
                address: Address::new(GLOBAL),
                size: 4,
            },
        )
        .at(0x2018, Effect::Return)
        .build()
}

pub fn watchpoint_session(arch: Architecture) -> Session
{
    session(watchpoint_module(arch), watchpoint_inferior(arch))
}

// ---------------------------------------------------------------------------
// watch location program
//
// char *g_char_ptr = NULL;
//
// void do_bad_thing_with_location(char *char_ptr, char new_val)   // line 10
// {
//     *char_ptr = new_val;                                         // line 12
// }                                                                // line 13
//
// int main (int argc, char const *argv[])                         // line 20
// {
//     g_char_ptr = (char *)malloc(1);                             // line 21
//     *g_char_ptr = 0;                                            // line 22
//     // Set break point at this line.
//     do_bad_thing_with_location(g_char_ptr, 'a');                // line 24
//     return 0;                                                   // line 25
// }
// ---------------------------------------------------------------------------

pub const WATCHLOCATION_BREAK_LINE: u32 = 24;
pub const G_CHAR_PTR: u64 = 0x4000;
pub const HEAP: u64 = 0x5000;
pub const CALLEE_FRAME: u64 = 0x6e00;

pub fn watchlocation_module(arch: Architecture) -> Module
{
    let mut builder = ModuleBuilder::new("a.out", arch);
    builder.compile_unit("main.cpp");
    let char_ty = builder.scalar("char", ScalarEncoding::SignedChar, 1);
    let char_ptr = builder.pointer(char_ty);
    builder.global("g_char_ptr", char_ptr, G_CHAR_PTR);

    let bad = builder.function("do_bad_thing_with_location", 0x3100, 0x3110, "main.cpp", 10);
    builder
        .parameter(bad, "char_ptr", char_ptr, -8)
        .parameter(bad, "new_val", char_ty, -9);
    builder.function("main", 0x3000, 0x3018, "main.cpp", 20);
    builder.lines(
        "main.cpp",
        &[
            (10, 0x3100, 0x3104),
            (12, 0x3104, 0x3108),
            (13, 0x3108, 0x3110),
            (20, 0x3000, 0x3004),
            (21, 0x3004, 0x3008),
            (22, 0x3008, 0x300c),
            (24, 0x300c, 0x3010),
            (25, 0x3010, 0x3018),
        ],
    );
    builder.build().expect("watch location module")
}

pub fn watchlocation_inferior(arch: Architecture) -> ScriptedInferior
{
    ScriptedInferior::builder(arch)
        .entry(0x3000, STACK_BASE)
        .region(G_CHAR_PTR, vec![0; 0x10])
        .region(HEAP, vec![0xff; 0x10])
        .region(STACK_REGION, vec![0; 0x1000])
        .at(0x3000, Effect::Nop)
        .at(
            0x3004,
            Effect::Store {
                address: Address::new(G_CHAR_PTR),
                bytes: pointer_bytes(HEAP, arch),
            },
        )
        .at(
            0x3008,
            Effect::Store {
                address: Address::new(HEAP),
                bytes: vec![0],
            },
        )
        .at(
            0x300c,
            Effect::Call {
                target: Address::new(0x3100),
                frame_base: Address::new(CALLEE_FRAME),
            },
        )
        .at(0x3010, Effect::Return)
        .at(
            0x3100,
            Effect::Store {
                address: Address::new(CALLEE_FRAME - 8),
                bytes: pointer_bytes(HEAP, arch),
            },
        )
        .at(
            0x3104,
            Effect::Store {
                address: Address::new(HEAP),
                bytes: vec![b'a'],
            },
        )
        .at(0x3108, Effect::Return)
        .build()
}

pub fn watchlocation_session(arch: Architecture) -> Session
{
    session(watchlocation_module(arch), watchlocation_inferior(arch))
}

// ---------------------------------------------------------------------------
// struct types program
//
// int main (int argc, char const *argv[])        // line 2
// {                                               // line 3
//     struct point_tag {
//         int x;
//         int y;
//         char padding[0];
//     }; // Set break point at this line.         // line 8
//
//     struct rect_tag {
//         struct point_tag bottom_left;
//         struct point_tag top_right;
//     };                                          // line 13
//     struct point_tag pt = { 2, 3, {} }; // This is the first executable statement.   (line 14)
//     struct rect_tag rect = {{1, 2}, {3, 4}};    // line 15
//     return 0;                                   // line 16
// }
// ---------------------------------------------------------------------------

pub const STRUCT_DECL_LINE: u32 = 8;
pub const FIRST_EXECUTABLE_LINE: u32 = 14;

pub fn struct_types_module(arch: Architecture) -> Module
{
    let mut builder = ModuleBuilder::new("a.out", arch);
    builder.compile_unit("main.c");
    let int = builder.scalar("int", ScalarEncoding::Signed, 4);
    let char_ty = builder.scalar("char", ScalarEncoding::SignedChar, 1);
    let padding = builder.array(char_ty, 0);
    let point = builder.structure("point_tag", &[("x", int), ("y", int), ("padding", padding)]);
    let rect = builder.structure("rect_tag", &[("bottom_left", point), ("top_right", point)]);
    let main = builder.function("main", 0x1000, 0x1030, "main.c", 2);
    builder.local(main, "pt", point, -8).local(main, "rect", rect, -24);
    builder.lines(
        "main.c",
        &[
            (3, 0x1000, 0x1008),
            (14, 0x1008, 0x1010),
            (15, 0x1010, 0x1020),
            (16, 0x1020, 0x1030),
        ],
    );
    builder.build().expect("struct types module")
}

pub fn struct_types_inferior(arch: Architecture) -> ScriptedInferior
{
    let rect: Vec<u8> = [1i32, 2, 3, 4].iter().flat_map(|v| v.to_le_bytes()).collect();
    let point: Vec<u8> = [2i32, 3].iter().flat_map(|v| v.to_le_bytes()).collect();
    ScriptedInferior::builder(arch)
        .entry(0x1000, STACK_BASE)
        .region(STACK_REGION, vec![0; 0x1000])
        .at(0x1000, Effect::Nop)
        .at(
            0x1008,
            Effect::Store {
                address: Address::new(STACK_BASE - 8),
                bytes: point,
            },
        )
        .at(
            0x1010,
            Effect::Store {
                address: Address::new(STACK_BASE - 24),
                bytes: rect,
            },
        )
        .at(0x1020, Effect::Return)
        .build()
}

pub fn struct_types_session(arch: Architecture) -> Session
{
    session(struct_types_module(arch), struct_types_inferior(arch))
}
