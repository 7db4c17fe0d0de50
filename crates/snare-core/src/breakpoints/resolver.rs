//! Breakpoint resolution: requests to concrete code addresses.
//!
//! Source lines resolve through the line table. A line with code gets one
//! location per function that emits code for it (the lowest address in each).
//! A line without code (a declaration, a comment, a closing brace) moves to the
//! smallest later line of the same function that has code, unless moving is
//! disabled.

use std::collections::BTreeMap;

use tracing::debug;

use crate::debuginfo::{file_matches, LineEntry, Module};
use crate::error::{Result, SnareError};
use crate::types::{Address, SymbolKind};

/// A concrete address chosen for a breakpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLocation
{
    /// Trap address.
    pub address: Address,
    /// Line entry containing the address.
    pub line_entry: Option<LineEntry>,
    /// Function containing the address.
    pub function: Option<String>,
}

/// Outcome of resolving a breakpoint request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution
{
    /// Line the breakpoint bound to, when known.
    pub line: Option<u32>,
    /// Locations in address order.
    pub locations: Vec<ResolvedLocation>,
}

/// Resolve `file:line`.
///
/// ## Errors
///
/// - `NotFound` if the line table has no entries for `file`.
/// - `Unresolvable` if the line has no code and either `move_to_nearest_code`
///   is off, the line is outside every function, or no later line of the
///   enclosing function has code.
pub fn resolve_source_line(module: &Module, file: &str, line: u32, move_to_nearest_code: bool) -> Result<Resolution>
{
    let exact = module.line_entries_for(file, line)?;
    if !exact.is_empty() {
        debug!(file, line, entries = exact.len(), "line has code");
        return Ok(Resolution {
            line: Some(line),
            locations: locations_per_function(module, exact),
        });
    }

    if !move_to_nearest_code {
        return Err(SnareError::Unresolvable(format!(
            "{file}:{line} has no code and moving to the nearest code line is disabled"
        )));
    }

    let scope = module
        .scope_for_line(file, line)
        .ok_or_else(|| SnareError::Unresolvable(format!("{file}:{line} is not inside any function")))?;
    let in_scope: Vec<&LineEntry> = module
        .line_table()
        .entries_in_range(scope.range)
        .filter(|entry| file_matches(&entry.file, file) && entry.line > line)
        .collect();
    let target = in_scope
        .iter()
        .map(|entry| entry.line)
        .min()
        .ok_or_else(|| {
            SnareError::Unresolvable(format!("no line after {file}:{line} has code in '{}'", scope.name))
        })?;

    debug!(file, line, moved_to = target, function = %scope.name, "moved breakpoint to nearest code line");
    let entries = in_scope
        .into_iter()
        .filter(|entry| entry.line == target)
        .cloned()
        .collect();
    Ok(Resolution {
        line: Some(target),
        locations: locations_per_function(module, entries),
    })
}

/// Resolve a function name to the first line after its prologue.
///
/// Names without debug information fall back to a code symbol of that name.
///
/// ## Errors
///
/// `NotFound` if neither a function nor a code symbol has that name.
pub fn resolve_function(module: &Module, name: &str) -> Result<Resolution>
{
    let address = match module.function_named(name) {
        Ok(function) => function.prologue_end(module.line_table()),
        Err(err) => module
            .symbol_named(name)
            .filter(|symbol| symbol.kind == SymbolKind::Code)
            .map(|symbol| symbol.address)
            .ok_or(err)?,
    };
    let location = location_at(module, address);
    debug!(name, %address, "resolved function breakpoint");
    Ok(Resolution {
        line: location.line_entry.as_ref().map(|entry| entry.line),
        locations: vec![location],
    })
}

/// Bind to `address` as given.
#[must_use]
pub fn resolve_address(module: &Module, address: Address) -> Resolution
{
    let location = location_at(module, address);
    Resolution {
        line: location.line_entry.as_ref().map(|entry| entry.line),
        locations: vec![location],
    }
}

fn location_at(module: &Module, address: Address) -> ResolvedLocation
{
    ResolvedLocation {
        address,
        line_entry: module.line_entry_for_address(address).cloned(),
        function: module.function_at(address).map(|function| function.name.clone()),
    }
}

/// One location per containing function, at the lowest address in each.
fn locations_per_function(module: &Module, entries: Vec<LineEntry>) -> Vec<ResolvedLocation>
{
    let mut lowest: BTreeMap<Address, LineEntry> = BTreeMap::new();
    for entry in entries {
        let key = module
            .function_at(entry.address())
            .map_or(entry.address(), |function| function.range.start);
        match lowest.get(&key) {
            Some(existing) if existing.address() <= entry.address() => {}
            _ => {
                lowest.insert(key, entry);
            }
        }
    }

    let mut locations: Vec<ResolvedLocation> = lowest
        .into_values()
        .map(|entry| ResolvedLocation {
            address: entry.address(),
            function: module
                .function_at(entry.address())
                .map(|function| function.name.clone()),
            line_entry: Some(entry),
        })
        .collect();
    locations.sort_by_key(|location| location.address);
    locations
}
