//! Breakpoint bookkeeping.
//!
//! A breakpoint is created from a [`BreakpointSpec`] (source line, function
//! name or raw address). The [`resolver`] turns the spec into concrete
//! [`BreakpointLocation`]s against a [`Module`]; the [`BreakpointStore`] keeps
//! ids, enablement and hit counts, and tells the process controller which code
//! addresses to arm.

pub mod builder;
pub mod resolver;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::fmt::Write as _;

use smallvec::SmallVec;
use tracing::debug;

pub use builder::BreakpointBuilder;
pub use resolver::{Resolution, ResolvedLocation};

use crate::debuginfo::{LineEntry, Module};
use crate::error::{Result, SnareError};
use crate::types::Address;

/// Unique identifier for a breakpoint. Ids start at 1 and are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BreakpointId(u64);

impl BreakpointId
{
    /// Create a new identifier from a raw value.
    #[must_use]
    pub const fn from_raw(value: u64) -> Self
    {
        Self(value)
    }

    /// Get the raw numeric representation (useful for logging / errors).
    #[must_use]
    pub const fn raw(self) -> u64
    {
        self.0
    }
}

impl fmt::Display for BreakpointId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0)
    }
}

/// What the user asked to stop at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakpointSpec
{
    /// A line of a source file.
    SourceLine
    {
        /// File name or trailing path.
        file: String,
        /// Requested 1-based line.
        line: u32,
    },
    /// Entry of a function, past its prologue.
    FunctionName(String),
    /// A raw code address.
    Address(Address),
}

impl fmt::Display for BreakpointSpec
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Self::SourceLine { file, line } => write!(f, "file = '{file}', line = {line}, exact_match = 0"),
            Self::FunctionName(name) => write!(f, "name = '{name}'"),
            Self::Address(address) => write!(f, "address = {address}"),
        }
    }
}

/// One concrete address a breakpoint is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointLocation
{
    /// 1-based index within the breakpoint (`1.1`, `1.2`, ...).
    pub index: u32,
    /// Trap address.
    pub address: Address,
    /// Line entry containing the address.
    pub line_entry: Option<LineEntry>,
    /// Function containing the address.
    pub function: Option<String>,
    /// Stops attributed to this location.
    pub hit_count: u64,
}

/// A resolved breakpoint.
#[derive(Debug, Clone)]
pub struct Breakpoint
{
    id: BreakpointId,
    spec: BreakpointSpec,
    resolved_line: Option<u32>,
    locations: Vec<BreakpointLocation>,
    enabled: bool,
    hit_count: u64,
}

impl Breakpoint
{
    #[must_use]
    pub fn id(&self) -> BreakpointId
    {
        self.id
    }

    #[must_use]
    pub fn spec(&self) -> &BreakpointSpec
    {
        &self.spec
    }

    /// Concrete locations in address order.
    #[must_use]
    pub fn locations(&self) -> &[BreakpointLocation]
    {
        &self.locations
    }

    /// Number of locations; more than one means the request was ambiguous.
    #[must_use]
    pub fn num_locations(&self) -> usize
    {
        self.locations.len()
    }

    /// Location by 1-based index.
    #[must_use]
    pub fn location(&self, index: u32) -> Option<&BreakpointLocation>
    {
        self.locations.iter().find(|location| location.index == index)
    }

    /// Whether the breakpoint is armed while the process runs.
    #[must_use]
    pub fn is_enabled(&self) -> bool
    {
        self.enabled
    }

    /// Total stops attributed to this breakpoint. Never decreases.
    #[must_use]
    pub fn hit_count(&self) -> u64
    {
        self.hit_count
    }

    /// Line the user asked for, for source-line breakpoints.
    #[must_use]
    pub fn requested_line(&self) -> Option<u32>
    {
        match self.spec {
            BreakpointSpec::SourceLine { line, .. } => Some(line),
            _ => None,
        }
    }

    /// Line the breakpoint actually bound to.
    ///
    /// Differs from [`Breakpoint::requested_line`] when the requested line had
    /// no code and the breakpoint moved to the next line that does.
    #[must_use]
    pub fn resolved_line(&self) -> Option<u32>
    {
        self.resolved_line
    }

    /// Returns `true` if the breakpoint has at least one location.
    #[must_use]
    pub fn is_resolved(&self) -> bool
    {
        !self.locations.is_empty()
    }

    /// Multi-line listing in the style of `breakpoint list`.
    ///
    /// ```text
    /// 1: file = 'main.c', line = 12, exact_match = 0, locations = 1, resolved, hit count = 1
    ///   1.1: where = a.out`main + 20 at main.c:14, address = 0x0000000000401134, resolved, hit count = 1
    /// ```
    #[must_use]
    pub fn describe(&self, module: &Module) -> String
    {
        let mut text = format!(
            "{}: {}, locations = {}{}, hit count = {}",
            self.id,
            self.spec,
            self.locations.len(),
            if self.is_resolved() { ", resolved" } else { "" },
            self.hit_count
        );
        if !self.enabled {
            text.push_str(" Options: disabled");
        }
        let width = module.architecture().pointer_size_bytes();
        for location in &self.locations {
            let _ = write!(
                text,
                "\n  {}.{}: where = {}, address = {}, resolved, hit count = {}",
                self.id,
                location.index,
                module.symbolicate(location.address),
                location.address.to_padded_hex(width),
                location.hit_count
            );
        }
        text
    }
}

/// Owner of every breakpoint of a session.
#[derive(Debug, Default)]
pub struct BreakpointStore
{
    next_id: u64,
    by_id: BTreeMap<BreakpointId, Breakpoint>,
    by_address: HashMap<Address, SmallVec<[(BreakpointId, u32); 2]>>,
}

impl BreakpointStore
{
    /// Create a new empty breakpoint store.
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    fn allocate_id(&mut self) -> BreakpointId
    {
        self.next_id = self.next_id.wrapping_add(1);
        BreakpointId::from_raw(self.next_id)
    }

    /// Record a resolved breakpoint and return its id.
    pub fn insert(&mut self, spec: BreakpointSpec, resolution: Resolution, enabled: bool) -> BreakpointId
    {
        let id = self.allocate_id();
        let locations: Vec<BreakpointLocation> = resolution
            .locations
            .into_iter()
            .zip(1u32..)
            .map(|(resolved, index)| BreakpointLocation {
                index,
                address: resolved.address,
                line_entry: resolved.line_entry,
                function: resolved.function,
                hit_count: 0,
            })
            .collect();
        for location in &locations {
            self.by_address
                .entry(location.address)
                .or_default()
                .push((id, location.index));
        }
        debug!(id = id.raw(), %spec, locations = locations.len(), enabled, "breakpoint created");
        self.by_id.insert(
            id,
            Breakpoint {
                id,
                spec,
                resolved_line: resolution.line,
                locations,
                enabled,
                hit_count: 0,
            },
        );
        id
    }

    /// Retrieve a breakpoint by id.
    #[must_use]
    pub fn get(&self, id: BreakpointId) -> Option<&Breakpoint>
    {
        self.by_id.get(&id)
    }

    /// Remove a breakpoint, returning it if it was present.
    pub fn remove(&mut self, id: BreakpointId) -> Option<Breakpoint>
    {
        let breakpoint = self.by_id.remove(&id)?;
        for location in &breakpoint.locations {
            if let Some(ids) = self.by_address.get_mut(&location.address) {
                ids.retain(|(owner, _)| *owner != id);
                if ids.is_empty() {
                    self.by_address.remove(&location.address);
                }
            }
        }
        debug!(id = id.raw(), "breakpoint removed");
        Some(breakpoint)
    }

    /// Enable or disable a breakpoint.
    ///
    /// ## Errors
    ///
    /// `NotFound` for an unknown id.
    pub fn set_enabled(&mut self, id: BreakpointId, enabled: bool) -> Result<()>
    {
        let breakpoint = self
            .by_id
            .get_mut(&id)
            .ok_or_else(|| SnareError::not_found(format!("breakpoint {id}")))?;
        breakpoint.enabled = enabled;
        Ok(())
    }

    /// All breakpoints in id order.
    pub fn list(&self) -> impl Iterator<Item = &Breakpoint>
    {
        self.by_id.values()
    }

    /// Number of breakpoints.
    #[must_use]
    pub fn len(&self) -> usize
    {
        self.by_id.len()
    }

    /// Returns `true` if there are no breakpoints.
    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.by_id.is_empty()
    }

    /// Code addresses that must be trapped while the process runs.
    #[must_use]
    pub fn armed_addresses(&self) -> BTreeSet<Address>
    {
        self.by_address
            .iter()
            .filter(|(_, owners)| owners.iter().any(|(id, _)| self.is_enabled(*id)))
            .map(|(address, _)| *address)
            .collect()
    }

    fn is_enabled(&self, id: BreakpointId) -> bool
    {
        self.by_id.get(&id).is_some_and(|breakpoint| breakpoint.enabled)
    }

    /// Count a stop at `address` for every enabled breakpoint located there.
    ///
    /// Returns the `(id, location)` pairs that were hit, lowest id first.
    pub fn record_hits(&mut self, address: Address) -> SmallVec<[(BreakpointId, u32); 2]>
    {
        let mut hits: SmallVec<[(BreakpointId, u32); 2]> = self
            .by_address
            .get(&address)
            .map(|owners| owners.iter().copied().collect())
            .unwrap_or_default();
        hits.retain(|(id, _)| self.is_enabled(*id));
        hits.sort_unstable();

        for (id, index) in &hits {
            if let Some(breakpoint) = self.by_id.get_mut(id) {
                breakpoint.hit_count = breakpoint.hit_count.saturating_add(1);
                if let Some(location) = breakpoint.locations.iter_mut().find(|l| l.index == *index) {
                    location.hit_count = location.hit_count.saturating_add(1);
                }
                debug!(id = id.raw(), location = index, hits = breakpoint.hit_count, "breakpoint hit");
            }
        }
        hits
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn resolution(addresses: &[u64]) -> Resolution
    {
        Resolution {
            line: Some(10),
            locations: addresses
                .iter()
                .map(|&address| ResolvedLocation {
                    address: Address::new(address),
                    line_entry: None,
                    function: None,
                })
                .collect(),
        }
    }

    fn line_spec() -> BreakpointSpec
    {
        BreakpointSpec::SourceLine {
            file: "main.c".to_string(),
            line: 10,
        }
    }

    #[test]
    fn test_ids_are_sequential_and_not_reused()
    {
        let mut store = BreakpointStore::new();
        let first = store.insert(line_spec(), resolution(&[0x10]), true);
        let second = store.insert(line_spec(), resolution(&[0x20]), true);
        assert_eq!(first.raw(), 1);
        assert_eq!(second.raw(), 2);
        store.remove(second);
        let third = store.insert(line_spec(), resolution(&[0x30]), true);
        assert_eq!(third.raw(), 3);
    }

    #[test]
    fn test_disabled_breakpoints_are_not_armed_or_hit()
    {
        let mut store = BreakpointStore::new();
        let id = store.insert(line_spec(), resolution(&[0x10, 0x40]), false);
        assert!(store.armed_addresses().is_empty());
        assert!(store.record_hits(Address::new(0x10)).is_empty());

        store.set_enabled(id, true).unwrap();
        let armed: Vec<u64> = store.armed_addresses().iter().map(|a| a.value()).collect();
        assert_eq!(armed, vec![0x10, 0x40]);
    }

    #[test]
    fn test_hits_count_per_location()
    {
        let mut store = BreakpointStore::new();
        let id = store.insert(line_spec(), resolution(&[0x10, 0x40]), true);
        let hits = store.record_hits(Address::new(0x40));
        assert_eq!(hits.as_slice(), &[(id, 2)]);
        store.record_hits(Address::new(0x40));

        let breakpoint = store.get(id).unwrap();
        assert_eq!(breakpoint.hit_count(), 2);
        assert_eq!(breakpoint.location(1).unwrap().hit_count, 0);
        assert_eq!(breakpoint.location(2).unwrap().hit_count, 2);
    }

    #[test]
    fn test_shared_address_hits_every_owner()
    {
        let mut store = BreakpointStore::new();
        let first = store.insert(line_spec(), resolution(&[0x10]), true);
        let other = store.insert(BreakpointSpec::Address(Address::new(0x10)), resolution(&[0x10]), true);
        let hits = store.record_hits(Address::new(0x10));
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, first);
        assert_eq!(hits[1].0, other);
    }

    #[test]
    fn test_remove_unarms_address()
    {
        let mut store = BreakpointStore::new();
        let id = store.insert(line_spec(), resolution(&[0x10]), true);
        assert!(store.remove(id).is_some());
        assert!(store.armed_addresses().is_empty());
        assert!(store.remove(id).is_none());
        assert!(store.set_enabled(id, false).is_err());
    }
}
