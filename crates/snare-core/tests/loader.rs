//! Tests for loading modules from object files on disk

use std::fs;

use snare_core::debuginfo::load_module;
use snare_core::error::SnareError;

#[test]
fn test_missing_file()
{
    match load_module("/nonexistent/snare/a.out") {
        Err(SnareError::LoadError { path, reason }) => {
            assert!(path.ends_with("a.out"));
            assert!(reason.contains("cannot read file"));
        }
        _ => panic!("Expected LoadError"),
    }
}

#[test]
fn test_not_an_object_file()
{
    let path = std::env::temp_dir().join(format!("snare-loader-{}.txt", std::process::id()));
    fs::write(&path, b"int main(void) { return 0; }\n").unwrap();
    let result = load_module(&path);
    let _ = fs::remove_file(&path);

    match result {
        Err(SnareError::LoadError { reason, .. }) => assert!(reason.contains("not a recognised object file")),
        _ => panic!("Expected LoadError"),
    }
}

/// ELF64 header of a big-endian AArch64 executable with no sections.
fn big_endian_elf_header() -> Vec<u8>
{
    let mut header = vec![0x7f, b'E', b'L', b'F', 2, 2, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0];
    header.extend_from_slice(&2u16.to_be_bytes()); // e_type: EXEC
    header.extend_from_slice(&183u16.to_be_bytes()); // e_machine: AArch64
    header.extend_from_slice(&1u32.to_be_bytes()); // e_version
    header.extend_from_slice(&[0; 24]); // e_entry, e_phoff, e_shoff
    header.extend_from_slice(&0u32.to_be_bytes()); // e_flags
    header.extend_from_slice(&64u16.to_be_bytes()); // e_ehsize
    header.extend_from_slice(&56u16.to_be_bytes()); // e_phentsize
    header.extend_from_slice(&0u16.to_be_bytes()); // e_phnum
    header.extend_from_slice(&64u16.to_be_bytes()); // e_shentsize
    header.extend_from_slice(&[0; 4]); // e_shnum, e_shstrndx
    header
}

#[test]
fn test_big_endian_object_is_rejected()
{
    let path = std::env::temp_dir().join(format!("snare-loader-be-{}.elf", std::process::id()));
    fs::write(&path, big_endian_elf_header()).unwrap();
    let result = load_module(&path);
    let _ = fs::remove_file(&path);

    match result {
        Err(SnareError::ArchitectureMismatch(message)) => assert!(message.contains("big-endian arm64")),
        other => panic!("Expected ArchitectureMismatch, got {other:?}"),
    }
}

#[cfg(target_os = "linux")]
#[test]
fn test_loads_running_test_binary()
{
    let exe = std::env::current_exe().unwrap();
    let module = load_module(&exe).unwrap();
    assert_eq!(module.architecture(), snare_core::types::Architecture::current());
    assert!(!module.symbols().is_empty());
    assert!(module.symbol_named("main").is_some());

    // Functions carry their declaration line from DW_AT_decl_line.
    if !module.functions().is_empty() {
        assert!(module
            .functions()
            .iter()
            .any(|function| function.decl.as_ref().and_then(|decl| decl.line).is_some()));
    }
}
