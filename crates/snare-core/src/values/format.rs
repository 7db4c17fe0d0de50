//! Text rendering of value trees.
//!
//! Each formatter prints one line per value:
//!
//! ```text
//! (char *[7]) days_of_week = 0x0000000000404040 (location)
//!   (char *) [0] = "Sunday"
//!   (char *) [1] = "Monday"
//! ```
//!
//! The value column is the summary when there is one, else the raw value,
//! else the location of an aggregate.

use std::fmt::Write as _;

use super::{Inspector, Value};
use crate::error::{Result, SnareError};

const DEFAULT_MAX_DEPTH: usize = 8;

/// Renders a value (and possibly its descendants) as text.
pub trait ValueFormatter
{
    /// ## Errors
    ///
    /// Stale values and unreadable memory.
    fn format(&self, inspector: &Inspector<'_>, value: &Value) -> Result<String>;
}

/// One line for the value itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicFormatter;

impl BasicFormatter
{
    fn render(inspector: &Inspector<'_>, value: &Value) -> Result<String>
    {
        if let Some(summary) = inspector.summary(value)? {
            return Ok(summary);
        }
        Ok(match inspector.raw_value(value)? {
            Some(raw) => raw,
            None if inspector.child_count(value)? > 0 => format!("{} (location)", inspector.location(value)?),
            None => "{}".to_string(),
        })
    }

    fn line(inspector: &Inspector<'_>, value: &Value, indent: usize, out: &mut String) -> Result<()>
    {
        let rendered = match Self::render(inspector, value) {
            Ok(text) => text,
            Err(SnareError::MemoryAccess { address, .. }) => format!("<unreadable at {address}>"),
            Err(err) => return Err(err),
        };
        let _ = writeln!(
            out,
            "{:indent$}({}) {} = {rendered}",
            "",
            inspector.type_name(value)?,
            value.name()
        );
        Ok(())
    }
}

impl ValueFormatter for BasicFormatter
{
    fn format(&self, inspector: &Inspector<'_>, value: &Value) -> Result<String>
    {
        let mut out = String::new();
        Self::line(inspector, value, 0, &mut out)?;
        Ok(out)
    }
}

/// The value and its immediate children.
#[derive(Debug, Clone, Copy)]
pub struct ChildVisitingFormatter
{
    /// Spaces before each child line.
    pub indent_child: usize,
}

impl Default for ChildVisitingFormatter
{
    fn default() -> Self
    {
        Self { indent_child: 2 }
    }
}

impl ValueFormatter for ChildVisitingFormatter
{
    fn format(&self, inspector: &Inspector<'_>, value: &Value) -> Result<String>
    {
        let mut out = String::new();
        BasicFormatter::line(inspector, value, 0, &mut out)?;
        for child in inspector.children(value, inspector.config().max_children_rendered)? {
            BasicFormatter::line(inspector, &child, self.indent_child, &mut out)?;
        }
        Ok(out)
    }
}

/// The whole tree below the value.
///
/// Children with a summary are printed as leaves. Recursion stops at
/// `max_depth`, so self-referential structures terminate.
#[derive(Debug, Clone, Copy)]
pub struct RecursiveFormatter
{
    /// Extra indentation per level.
    pub indent_child: usize,
    /// Deepest level expanded.
    pub max_depth: usize,
}

impl Default for RecursiveFormatter
{
    fn default() -> Self
    {
        Self {
            indent_child: 2,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl RecursiveFormatter
{
    fn visit(&self, inspector: &Inspector<'_>, value: &Value, indent: usize, depth: usize, out: &mut String)
        -> Result<()>
    {
        BasicFormatter::line(inspector, value, indent, out)?;
        if depth >= self.max_depth {
            return Ok(());
        }
        let nested = indent + self.indent_child;
        let children = match inspector.children(value, inspector.config().max_children_rendered) {
            Ok(children) => children,
            Err(SnareError::MemoryAccess { .. }) => return Ok(()),
            Err(err) => return Err(err),
        };
        for child in children {
            let expandable = inspector.summary(&child).ok().flatten().is_none()
                && inspector.child_count(&child)? > 0
                && !Self::is_null_pointer(inspector, &child);
            if expandable {
                self.visit(inspector, &child, nested, depth + 1, out)?;
            } else {
                BasicFormatter::line(inspector, &child, nested, out)?;
            }
        }
        Ok(())
    }

    fn is_null_pointer(inspector: &Inspector<'_>, value: &Value) -> bool
    {
        inspector.is_pointer(value).unwrap_or(false)
            && inspector
                .read_bytes(value)
                .map_or(true, |bytes| bytes.iter().all(|&byte| byte == 0))
    }
}

impl ValueFormatter for RecursiveFormatter
{
    fn format(&self, inspector: &Inspector<'_>, value: &Value) -> Result<String>
    {
        let mut out = String::new();
        self.visit(inspector, value, 0, 0, &mut out)?;
        Ok(out)
    }
}
