//! # Watchpoints
//!
//! Data traps on a small memory range. The manager validates sizes, enforces
//! the number of hardware slots, counts hits and remembers the old and new
//! bytes of the last write. Watchpoints are retired when the process exits
//! and retired watchpoints are never armed again.

use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write as _;

use tracing::{debug, info};

use crate::error::{Result, SnareError};
use crate::types::{Address, AddressRange};

/// Unique identifier for a watchpoint. Ids start at 1 and are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchpointId(u64);

impl WatchpointId
{
    /// Create a new identifier from a raw value.
    #[must_use]
    pub const fn from_raw(value: u64) -> Self
    {
        Self(value)
    }

    /// Get the raw numeric representation.
    #[must_use]
    pub const fn raw(self) -> u64
    {
        self.0
    }
}

impl fmt::Display for WatchpointId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0)
    }
}

/// Access type for data watchpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchpointAccess
{
    /// Trigger on read access to the watched memory region.
    Read,
    /// Trigger on write access to the watched memory region.
    Write,
    /// Trigger on either read or write access to the watched memory region.
    ReadWrite,
}

impl WatchpointAccess
{
    /// Returns `true` if an access of `kind` triggers this mode.
    #[must_use]
    pub const fn matches(self, kind: AccessKind) -> bool
    {
        matches!(
            (self, kind),
            (Self::ReadWrite, _) | (Self::Read, AccessKind::Read) | (Self::Write, AccessKind::Write)
        )
    }
}

impl fmt::Display for WatchpointAccess
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(match self {
            Self::Read => "r",
            Self::Write => "w",
            Self::ReadWrite => "rw",
        })
    }
}

/// Kind of a single memory access performed by the inferior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessKind
{
    Read,
    Write,
}

impl fmt::Display for AccessKind
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(match self {
            Self::Read => "read",
            Self::Write => "write",
        })
    }
}

/// Lifecycle of a watchpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchpointState
{
    /// Trapping while the process runs.
    Armed,
    /// The process exited; kept for inspection only.
    Retired,
}

/// A data watchpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watchpoint
{
    pub id: WatchpointId,
    /// First watched byte.
    pub address: Address,
    /// Watched length: 1, 2, 4 or 8 bytes.
    pub size: usize,
    pub access: WatchpointAccess,
    pub hit_count: u64,
    pub state: WatchpointState,
    /// Variable (or expression) the watchpoint was created from.
    pub variable: Option<String>,
    /// Contents of the range when the watchpoint was created or last hit.
    pub last_value: Option<Vec<u8>>,
    /// Contents before the last write hit.
    pub old_value: Option<Vec<u8>>,
    /// Contents after the last write hit.
    pub new_value: Option<Vec<u8>>,
}

impl Watchpoint
{
    /// Watched byte range.
    #[must_use]
    pub fn range(&self) -> AddressRange
    {
        AddressRange::with_len(self.address, self.size as u64)
    }

    #[must_use]
    pub fn is_armed(&self) -> bool
    {
        self.state == WatchpointState::Armed
    }

    /// One-line listing in the style of `watchpoint list`.
    ///
    /// ```text
    /// Watchpoint 1: addr = 0x0000000000404028 size = 4 state = enabled type = rw
    /// ```
    #[must_use]
    pub fn describe(&self, pointer_width: u8) -> String
    {
        let mut text = format!(
            "Watchpoint {}: addr = {} size = {} state = {} type = {}",
            self.id,
            self.address.to_padded_hex(pointer_width),
            self.size,
            match self.state {
                WatchpointState::Armed => "enabled",
                WatchpointState::Retired => "disabled",
            },
            self.access
        );
        if let Some(variable) = &self.variable {
            text.push_str("\n    declare @ '");
            text.push_str(variable);
            text.push('\'');
        }
        if let (Some(old), Some(new)) = (&self.old_value, &self.new_value) {
            let _ = write!(text, "\n    old value: {}\n    new value: {}", hex_bytes(old), hex_bytes(new));
        }
        text
    }
}

fn hex_bytes(bytes: &[u8]) -> String
{
    let mut value: u64 = 0;
    for (shift, byte) in bytes.iter().take(8).enumerate() {
        value |= u64::from(*byte) << (shift * 8);
    }
    format!("{value:#x}")
}

/// Sizes a hardware data trap can cover.
pub const VALID_SIZES: [usize; 4] = [1, 2, 4, 8];

/// Owner of every watchpoint of a session.
#[derive(Debug)]
pub struct WatchpointManager
{
    slots: usize,
    next_id: u64,
    by_id: BTreeMap<WatchpointId, Watchpoint>,
}

impl WatchpointManager
{
    /// Create a manager with `slots` hardware data-trap slots.
    #[must_use]
    pub fn new(slots: usize) -> Self
    {
        Self {
            slots,
            next_id: 0,
            by_id: BTreeMap::new(),
        }
    }

    /// Number of hardware slots.
    #[must_use]
    pub fn slots(&self) -> usize
    {
        self.slots
    }

    /// Create and arm a watchpoint.
    ///
    /// The caller is responsible for checking the process is stopped.
    ///
    /// ## Errors
    ///
    /// - `InvalidArgument` if `size` is not 1, 2, 4 or 8.
    /// - `ResourceExhausted` if every hardware slot is in use.
    pub fn create(
        &mut self,
        address: Address,
        size: usize,
        access: WatchpointAccess,
        variable: Option<String>,
        current: Option<Vec<u8>>,
    ) -> Result<WatchpointId>
    {
        if !VALID_SIZES.contains(&size) {
            return Err(SnareError::invalid_argument(format!(
                "watchpoint size must be 1, 2, 4 or 8 bytes, got {size}"
            )));
        }
        let armed = self.armed().count();
        if armed >= self.slots {
            return Err(SnareError::ResourceExhausted(format!(
                "all {} hardware watchpoint slots are in use",
                self.slots
            )));
        }

        self.next_id = self.next_id.wrapping_add(1);
        let id = WatchpointId::from_raw(self.next_id);
        info!(id = id.raw(), %address, size, %access, "watchpoint armed");
        self.by_id.insert(
            id,
            Watchpoint {
                id,
                address,
                size,
                access,
                hit_count: 0,
                state: WatchpointState::Armed,
                variable,
                last_value: current,
                old_value: None,
                new_value: None,
            },
        );
        Ok(id)
    }

    /// Delete a watchpoint, freeing its slot.
    pub fn remove(&mut self, id: WatchpointId) -> Option<Watchpoint>
    {
        let removed = self.by_id.remove(&id);
        if removed.is_some() {
            debug!(id = id.raw(), "watchpoint removed");
        }
        removed
    }

    #[must_use]
    pub fn get(&self, id: WatchpointId) -> Option<&Watchpoint>
    {
        self.by_id.get(&id)
    }

    /// All watchpoints in id order, retired ones included.
    pub fn list(&self) -> impl Iterator<Item = &Watchpoint>
    {
        self.by_id.values()
    }

    /// Watchpoints currently trapping.
    pub fn armed(&self) -> impl Iterator<Item = &Watchpoint>
    {
        self.by_id.values().filter(|watchpoint| watchpoint.is_armed())
    }

    /// Count an access of `kind` to `[address, address + size)` against every
    /// armed watchpoint it triggers. Returns the triggered ids, lowest first.
    pub fn record_hits(&mut self, address: Address, size: usize, kind: AccessKind) -> Vec<WatchpointId>
    {
        let mut hits = Vec::new();
        for watchpoint in self.by_id.values_mut() {
            if watchpoint.is_armed()
                && watchpoint.access.matches(kind)
                && watchpoint.range().overlaps(address, size as u64)
            {
                watchpoint.hit_count = watchpoint.hit_count.saturating_add(1);
                debug!(id = watchpoint.id.raw(), %address, %kind, hits = watchpoint.hit_count, "watchpoint hit");
                hits.push(watchpoint.id);
            }
        }
        hits
    }

    /// Store the contents observed after a hit; a write hit also records the
    /// previous contents as the old value.
    pub fn record_value(&mut self, id: WatchpointId, kind: AccessKind, current: Vec<u8>)
    {
        if let Some(watchpoint) = self.by_id.get_mut(&id) {
            if kind == AccessKind::Write {
                watchpoint.old_value = watchpoint.last_value.take();
                watchpoint.new_value = Some(current.clone());
            }
            watchpoint.last_value = Some(current);
        }
    }

    /// Retire every watchpoint. Called when the process exits.
    pub fn retire_all(&mut self)
    {
        let mut retired = 0usize;
        for watchpoint in self.by_id.values_mut() {
            if watchpoint.is_armed() {
                watchpoint.state = WatchpointState::Retired;
                retired += 1;
            }
        }
        if retired > 0 {
            info!(retired, "watchpoints retired");
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_access_matching()
    {
        assert!(WatchpointAccess::ReadWrite.matches(AccessKind::Read));
        assert!(WatchpointAccess::ReadWrite.matches(AccessKind::Write));
        assert!(WatchpointAccess::Read.matches(AccessKind::Read));
        assert!(!WatchpointAccess::Read.matches(AccessKind::Write));
        assert!(!WatchpointAccess::Write.matches(AccessKind::Read));
    }

    #[test]
    fn test_size_validation()
    {
        let mut manager = WatchpointManager::new(4);
        for size in [0, 3, 16] {
            let err = manager
                .create(Address::new(0x1000), size, WatchpointAccess::Write, None, None)
                .unwrap_err();
            assert!(matches!(err, SnareError::InvalidArgument(_)));
        }
        assert!(manager.create(Address::new(0x1000), 8, WatchpointAccess::Write, None, None).is_ok());
    }

    #[test]
    fn test_slot_exhaustion_and_release()
    {
        let mut manager = WatchpointManager::new(2);
        let first = manager.create(Address::new(0x10), 4, WatchpointAccess::Read, None, None).unwrap();
        manager.create(Address::new(0x20), 4, WatchpointAccess::Read, None, None).unwrap();
        let err = manager
            .create(Address::new(0x30), 4, WatchpointAccess::Read, None, None)
            .unwrap_err();
        assert!(matches!(err, SnareError::ResourceExhausted(_)));

        manager.remove(first);
        assert!(manager.create(Address::new(0x30), 4, WatchpointAccess::Read, None, None).is_ok());
    }

    #[test]
    fn test_overlapping_access_hits()
    {
        let mut manager = WatchpointManager::new(4);
        let id = manager.create(Address::new(0x100), 4, WatchpointAccess::Write, None, None).unwrap();
        assert!(manager.record_hits(Address::new(0x100), 4, AccessKind::Read).is_empty());
        assert!(manager.record_hits(Address::new(0x104), 4, AccessKind::Write).is_empty());
        assert_eq!(manager.record_hits(Address::new(0x0fe), 4, AccessKind::Write), vec![id]);
        assert_eq!(manager.get(id).unwrap().hit_count, 1);
    }

    #[test]
    fn test_write_hit_records_old_and_new_value()
    {
        let mut manager = WatchpointManager::new(4);
        let id = manager
            .create(Address::new(0x100), 4, WatchpointAccess::ReadWrite, None, Some(vec![1, 0, 0, 0]))
            .unwrap();
        manager.record_value(id, AccessKind::Write, vec![2, 0, 0, 0]);
        let watchpoint = manager.get(id).unwrap();
        assert_eq!(watchpoint.old_value.as_deref(), Some(&[1, 0, 0, 0][..]));
        assert_eq!(watchpoint.new_value.as_deref(), Some(&[2, 0, 0, 0][..]));
        assert!(watchpoint.describe(8).contains("old value: 0x1"));
    }

    #[test]
    fn test_retired_watchpoints_stop_trapping()
    {
        let mut manager = WatchpointManager::new(1);
        let id = manager.create(Address::new(0x100), 1, WatchpointAccess::Read, None, None).unwrap();
        manager.retire_all();
        assert_eq!(manager.get(id).unwrap().state, WatchpointState::Retired);
        assert_eq!(manager.armed().count(), 0);
        assert!(manager.record_hits(Address::new(0x100), 1, AccessKind::Read).is_empty());
        assert!(manager.get(id).unwrap().describe(8).contains("state = disabled"));
    }
}
