//! # Breakpoint Builder
//!
//! Fluent configuration of a breakpoint before it is resolved and installed
//! into a [`Session`].

use crate::breakpoints::resolver::{self, Resolution};
use crate::breakpoints::{BreakpointId, BreakpointSpec};
use crate::debuginfo::Module;
use crate::error::Result;
use crate::session::Session;
use crate::types::Address;

/// Builder for configuring breakpoints before installation.
///
/// ## Example
///
/// ```rust,no_run
/// use snare_core::breakpoints::BreakpointBuilder;
/// # fn demo(session: &mut snare_core::session::Session) -> snare_core::error::Result<()> {
/// let id = BreakpointBuilder::source_line("main.c", 12)
///     .move_to_nearest_code(false)
///     .install(session)?;
/// println!("{}", session.describe_breakpoint(id)?);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct BreakpointBuilder
{
    spec: BreakpointSpec,
    move_to_nearest_code: Option<bool>,
    enabled: bool,
}

impl BreakpointBuilder
{
    /// Break at `line` of `file`.
    pub fn source_line(file: impl Into<String>, line: u32) -> Self
    {
        Self::new(BreakpointSpec::SourceLine {
            file: file.into(),
            line,
        })
    }

    /// Break at the first line of `name` after its prologue.
    pub fn function(name: impl Into<String>) -> Self
    {
        Self::new(BreakpointSpec::FunctionName(name.into()))
    }

    /// Break at a raw code address.
    #[must_use]
    pub fn address(address: Address) -> Self
    {
        Self::new(BreakpointSpec::Address(address))
    }

    fn new(spec: BreakpointSpec) -> Self
    {
        Self {
            spec,
            move_to_nearest_code: None,
            enabled: true,
        }
    }

    /// Override the session default for moving a line without code to the
    /// next line with code.
    #[must_use]
    pub fn move_to_nearest_code(mut self, allow: bool) -> Self
    {
        self.move_to_nearest_code = Some(allow);
        self
    }

    /// Create the breakpoint disabled.
    #[must_use]
    pub fn disabled(mut self) -> Self
    {
        self.enabled = false;
        self
    }

    #[must_use]
    pub fn spec(&self) -> &BreakpointSpec
    {
        &self.spec
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool
    {
        self.enabled
    }

    /// Resolve and install the breakpoint.
    ///
    /// ## Errors
    ///
    /// Resolution errors (`NotFound`, `Unresolvable`) from the session.
    pub fn install(self, session: &mut Session) -> Result<BreakpointId>
    {
        session.add_breakpoint(self)
    }

    pub(crate) fn resolve(&self, module: &Module, default_move: bool) -> Result<Resolution>
    {
        match &self.spec {
            BreakpointSpec::SourceLine { file, line } => resolver::resolve_source_line(
                module,
                file,
                *line,
                self.move_to_nearest_code.unwrap_or(default_move),
            ),
            BreakpointSpec::FunctionName(name) => resolver::resolve_function(module, name),
            BreakpointSpec::Address(address) => Ok(resolver::resolve_address(module, *address)),
        }
    }

    pub(crate) fn into_parts(self) -> (BreakpointSpec, bool)
    {
        (self.spec, self.enabled)
    }
}
