//! Build script for snare-core
//!
//! Checks the compiler before building:
//! - Minimum Rust version (1.73, for `u64::next_multiple_of`)
//!
//! The engine has no platform requirements of its own; inferior backends
//! bring theirs.

const MIN_RUST_VERSION: &str = "1.73.0";

fn main()
{
    println!("cargo:rerun-if-changed=build.rs");

    let Ok(found) = rustc_version::version() else {
        // Some build environments hide the compiler version
        println!("cargo:warning=could not verify Rust version");
        return;
    };
    match rustc_version::Version::parse(MIN_RUST_VERSION) {
        Ok(minimum) if found < minimum => {
            panic!("snare-core requires Rust {minimum} or newer, found {found}");
        }
        Ok(_) => {}
        Err(err) => println!("cargo:warning=bad minimum Rust version {MIN_RUST_VERSION}: {err}"),
    }
}
