//! # Error Types
//!
//! General error handling for the engine.
//!
//! We use `thiserror` to generate the `Error` trait implementations and the
//! user-facing messages. Every failure is returned to the caller; nothing in
//! this crate aborts the host process, so a harness can keep running scenarios
//! after an individual one fails.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::Address;

/// Main error type for engine operations
///
/// ## Error Categories
///
/// 1. **Lookup errors**: NotFound, Unresolvable
/// 2. **State errors**: InvalidState (wrong process state or stale generation)
/// 3. **Loading errors**: LoadError, ArchitectureMismatch
/// 4. **Request errors**: InvalidArgument, ResourceExhausted
/// 5. **Memory errors**: MemoryAccess
/// 6. **I/O errors**: Io
#[derive(Error, Debug)]
pub enum SnareError
{
    /// A symbol, type, variable, file or id does not exist
    ///
    /// Lookups never fall back to a partial match, so a misspelled name always
    /// ends up here.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A source line has no reachable executable code in its scope
    ///
    /// Returned by the breakpoint resolver when neither the requested line nor
    /// any later line of the same function emits code, or when moving to the
    /// nearest code line has been disabled.
    #[error("Unresolvable location: {0}")]
    Unresolvable(String),

    /// Operation issued in the wrong process state or against stale data
    ///
    /// Examples:
    /// - Reading variables while the process is running
    /// - Continuing a process that has exited
    /// - Using a `Value` obtained before the last resume
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The module or executable could not be loaded
    #[error("Failed to load {}: {reason}", path.display())]
    LoadError
    {
        /// Path that was being loaded
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// Size or format assumptions of the target architecture were violated
    ///
    /// For instance a pointer type whose byte size differs from the pointer
    /// width of the module architecture.
    #[error("Architecture mismatch: {0}")]
    ArchitectureMismatch(String),

    /// Invalid argument passed to an engine function
    ///
    /// Examples:
    /// - A watchpoint size the hardware cannot express
    /// - A malformed expression path
    /// - A memory read larger than the configured limit
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A required resource has been exhausted
    ///
    /// Hardware watchpoints are backed by a small number of debug registers
    /// (four on x86-64). Remove an existing watchpoint before adding a new one.
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Inferior memory could not be read
    #[error("Cannot access {len} bytes of memory at {address}")]
    MemoryAccess
    {
        /// Start of the failed access
        address: Address,
        /// Number of bytes requested
        len: usize,
    },

    /// I/O error (for file operations, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SnareError
{
    /// Shorthand for [`SnareError::NotFound`].
    pub fn not_found(what: impl Into<String>) -> Self
    {
        Self::NotFound(what.into())
    }

    /// Shorthand for [`SnareError::InvalidState`].
    pub fn invalid_state(what: impl Into<String>) -> Self
    {
        Self::InvalidState(what.into())
    }

    /// Shorthand for [`SnareError::InvalidArgument`].
    pub fn invalid_argument(what: impl Into<String>) -> Self
    {
        Self::InvalidArgument(what.into())
    }
}

/// Convenience type alias for `Result<T, SnareError>`
///
/// ```rust
/// use snare_core::error::Result;
/// fn foo() -> Result<()>
/// {
///     Ok(())
/// }
/// ```
pub type Result<T> = std::result::Result<T, SnareError>;
