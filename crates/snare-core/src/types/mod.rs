//! # Types
//!
//! Plain data types shared by every component of the engine: addresses,
//! process and thread identifiers, architectures, lifecycle states, stop
//! reasons and symbols.

pub mod address;
pub mod process;
pub mod symbols;

pub use address::{Address, AddressRange};
pub use process::{signal_name, Architecture, Generation, ProcessId, ProcessState, StopReason, ThreadId};
pub use symbols::{SourceLocation, Symbol, SymbolKind, SymbolLanguage, SymbolName};
