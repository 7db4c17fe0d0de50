//! Expression path parsing.
//!
//! An expression path navigates from a value to one of its descendants:
//!
//! ```text
//! [5]            element 5 (or pointer arithmetic on a pointer)
//! .field         struct member
//! ->field        member of the pointee
//! *[2].next      leading `*` dereferences the final result
//! ```

use std::fmt;

use crate::error::{Result, SnareError};

/// One navigation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathComponent
{
    /// `[N]`
    Index(u64),
    /// `.name`
    Field(String),
    /// `->name`
    Arrow(String),
}

impl fmt::Display for PathComponent
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            PathComponent::Index(index) => write!(f, "[{index}]"),
            PathComponent::Field(name) => write!(f, ".{name}"),
            PathComponent::Arrow(name) => write!(f, "->{name}"),
        }
    }
}

/// A parsed expression path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpressionPath
{
    /// Dereference the value reached by the components.
    pub dereference: bool,
    /// Steps, applied left to right.
    pub components: Vec<PathComponent>,
}

impl fmt::Display for ExpressionPath
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        if self.dereference {
            f.write_str("*")?;
        }
        for component in &self.components {
            write!(f, "{component}")?;
        }
        Ok(())
    }
}

/// Parse an expression path.
///
/// An empty path names the value itself.
///
/// ## Example
///
/// ```rust
/// use snare_core::values::path::{parse, PathComponent};
///
/// let path = parse("[1].name")?;
/// assert_eq!(path.components, vec![PathComponent::Index(1), PathComponent::Field("name".into())]);
/// # Ok::<(), snare_core::error::SnareError>(())
/// ```
///
/// ## Errors
///
/// `InvalidArgument` pointing at the first character that cannot be parsed.
pub fn parse(text: &str) -> Result<ExpressionPath>
{
    let trimmed = text.trim();
    let mut path = ExpressionPath::default();
    let mut rest = trimmed;
    if let Some(after) = rest.strip_prefix('*') {
        path.dereference = true;
        rest = after.trim_start();
    }

    while !rest.is_empty() {
        let position = trimmed.len() - rest.len();
        if let Some(after) = rest.strip_prefix('[') {
            let close = after
                .find(']')
                .ok_or_else(|| syntax_error(trimmed, position, "missing ']'"))?;
            let index = parse_index(after[..close].trim()).ok_or_else(|| syntax_error(trimmed, position, "bad index"))?;
            path.components.push(PathComponent::Index(index));
            rest = &after[close + 1..];
        } else if let Some(after) = rest.strip_prefix("->") {
            let (name, remaining) = split_identifier(after).ok_or_else(|| syntax_error(trimmed, position + 2, "expected a member name"))?;
            path.components.push(PathComponent::Arrow(name.to_string()));
            rest = remaining;
        } else if let Some(after) = rest.strip_prefix('.') {
            let (name, remaining) = split_identifier(after).ok_or_else(|| syntax_error(trimmed, position + 1, "expected a member name"))?;
            path.components.push(PathComponent::Field(name.to_string()));
            rest = remaining;
        } else {
            return Err(syntax_error(trimmed, position, "expected '[', '.' or '->'"));
        }
    }
    Ok(path)
}

fn parse_index(text: &str) -> Option<u64>
{
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

fn split_identifier(text: &str) -> Option<(&str, &str)>
{
    let end = text
        .char_indices()
        .find(|&(index, c)| !(c == '_' || c.is_ascii_alphabetic() || (index > 0 && c.is_ascii_digit())))
        .map_or(text.len(), |(index, _)| index);
    (end > 0).then(|| text.split_at(end))
}

fn syntax_error(path: &str, position: usize, what: &str) -> SnareError
{
    SnareError::invalid_argument(format!("expression path '{path}': {what} at offset {position}"))
}
