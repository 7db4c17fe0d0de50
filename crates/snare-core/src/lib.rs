//! # snare-core
//!
//! Breakpoint and watchpoint resolution, process control and value
//! introspection for the snare debugger.
//!
//! The crate is organised leaves first:
//!
//! - [`debuginfo`]: the [`Module`](debuginfo::Module) store of types,
//!   functions, globals, symbols and line tables, loaded from ELF/DWARF or
//!   built programmatically
//! - [`breakpoints`]: source line, function and address breakpoints, resolved
//!   to concrete locations
//! - [`watchpoints`]: data traps on read, write or both
//! - [`process`]: the lifecycle state machine and stop reason arbitration
//! - [`values`]: typed views of inferior memory and their rendering
//! - [`session`]: the object a client drives, owning all of the above
//!
//! The process under control is reached through the
//! [`Inferior`](inferior::Inferior) trait. [`ScriptedInferior`](inferior::ScriptedInferior)
//! is a deterministic implementation used by the test suite.
//!
//! ## Example
//!
//! ```rust
//! use snare_core::config::EngineConfig;
//! use snare_core::debuginfo::{ModuleBuilder, ScalarEncoding};
//! use snare_core::inferior::{Effect, ScriptedInferior};
//! use snare_core::session::Session;
//! use snare_core::types::{Address, Architecture, ProcessState};
//!
//! let mut builder = ModuleBuilder::new("a.out", Architecture::X86_64);
//! let int = builder.scalar("int", ScalarEncoding::Signed, 4);
//! let main = builder.function("main", 0x1000, 0x1010, "main.c", 3);
//! builder.local(main, "x", int, -4);
//! builder.lines("main.c", &[(3, 0x1000, 0x1004), (4, 0x1004, 0x1008), (5, 0x1008, 0x1010)]);
//! let module = builder.build()?;
//!
//! let inferior = ScriptedInferior::builder(Architecture::X86_64)
//!     .entry(0x1000, 0x7000)
//!     .region(0x6f00, vec![0; 0x100])
//!     .at(0x1000, Effect::Nop)
//!     .at(0x1004, Effect::Store { address: Address::new(0x6ffc), bytes: 7i32.to_le_bytes().to_vec() })
//!     .at(0x1008, Effect::Return)
//!     .build();
//!
//! let mut session = Session::new(module, Box::new(inferior), EngineConfig::default())?;
//! session.breakpoint_create_by_location("main.c", 5)?;
//! assert_eq!(session.launch()?, ProcessState::Stopped);
//!
//! let frame = session.selected_frame()?;
//! let inspector = session.inspector()?;
//! let x = inspector.find_variable(&frame, "x")?;
//! assert_eq!(inspector.raw_value(&x)?.as_deref(), Some("7"));
//! # Ok::<(), snare_core::error::SnareError>(())
//! ```

pub mod breakpoints;
pub mod config;
pub mod debuginfo;
pub mod error;
pub mod events;
pub mod frames;
pub mod inferior;
pub mod memory;
pub mod process;
pub mod session;
pub mod types;
pub mod values;
pub mod watchpoints;

// Re-export commonly used types
pub use error::{Result, SnareError};
pub use session::Session;
pub use types::{Address, Architecture, ProcessState, StopReason};
