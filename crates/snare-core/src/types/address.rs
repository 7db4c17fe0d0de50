//! Memory address type.

use std::fmt;
use std::ops::{Add, Sub};

/// Strongly typed address in the inferior's address space
///
/// Module file addresses and load addresses share this type; the engine
/// loads modules at their linked addresses, so the two coincide.
///
/// ## Example
///
/// ```rust
/// use snare_core::types::Address;
///
/// let addr = Address::from(0x1000);
/// let next_addr = addr + 0x100;
/// assert_eq!(next_addr.value(), 0x1100);
/// assert_eq!(addr.checked_offset(-0x10), Some(Address::new(0xff0)));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(u64);

impl Address
{
    /// The null address
    pub const ZERO: Self = Address(0);

    /// Create a new address from a `u64` value
    ///
    /// Usable in const contexts, unlike `Address::from`.
    #[must_use]
    pub const fn new(value: u64) -> Self
    {
        Address(value)
    }

    /// Raw `u64` value of this address
    #[must_use]
    pub const fn value(self) -> u64
    {
        self.0
    }

    /// Returns `true` for the null address.
    #[must_use]
    pub const fn is_null(self) -> bool
    {
        self.0 == 0
    }

    /// Add an unsigned offset, returning `None` on overflow
    #[must_use]
    pub fn checked_add(self, offset: u64) -> Option<Self>
    {
        self.0.checked_add(offset).map(Address)
    }

    /// Subtract an offset, returning `None` on underflow
    #[must_use]
    pub fn checked_sub(self, offset: u64) -> Option<Self>
    {
        self.0.checked_sub(offset).map(Address)
    }

    /// Apply a signed offset (frame-base relative locations use negative ones)
    #[must_use]
    pub fn checked_offset(self, offset: i64) -> Option<Self>
    {
        self.0.checked_add_signed(offset).map(Address)
    }

    /// Add an offset, saturating at `u64::MAX`
    #[must_use]
    pub fn saturating_add(self, offset: u64) -> Self
    {
        Address(self.0.saturating_add(offset))
    }

    /// Distance in bytes from `base` to this address, if this address is not below it
    #[must_use]
    pub fn offset_from(self, base: Address) -> Option<u64>
    {
        self.0.checked_sub(base.0)
    }

    /// Render zero-padded to the given pointer width (4 or 8 bytes)
    ///
    /// ```rust
    /// use snare_core::types::Address;
    ///
    /// assert_eq!(Address::new(0x1234).to_padded_hex(4), "0x00001234");
    /// ```
    #[must_use]
    pub fn to_padded_hex(self, width_bytes: u8) -> String
    {
        let digits = usize::from(width_bytes) * 2;
        format!("0x{:0digits$x}", self.0)
    }
}

impl From<u64> for Address
{
    fn from(value: u64) -> Self
    {
        Address(value)
    }
}

impl From<Address> for u64
{
    fn from(address: Address) -> Self
    {
        address.0
    }
}

impl fmt::Display for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "0x{:016x}", self.0)
    }
}

impl fmt::LowerHex for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl Add<u64> for Address
{
    type Output = Address;

    fn add(self, rhs: u64) -> Self::Output
    {
        Address(self.0.wrapping_add(rhs))
    }
}

impl Sub<u64> for Address
{
    type Output = Address;

    fn sub(self, rhs: u64) -> Self::Output
    {
        Address(self.0.wrapping_sub(rhs))
    }
}

/// Half-open address range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressRange
{
    /// First address in the range.
    pub start: Address,
    /// One past the last address.
    pub end: Address,
}

impl AddressRange
{
    /// Build a range from its bounds.
    #[must_use]
    pub const fn new(start: Address, end: Address) -> Self
    {
        Self { start, end }
    }

    /// Build a range from a start and a length in bytes.
    #[must_use]
    pub fn with_len(start: Address, len: u64) -> Self
    {
        Self {
            start,
            end: start.saturating_add(len),
        }
    }

    /// Returns `true` if `address` lies inside the range.
    #[must_use]
    pub fn contains(&self, address: Address) -> bool
    {
        address >= self.start && address < self.end
    }

    /// Returns `true` if `[start, start + len)` shares at least one byte with the range.
    #[must_use]
    pub fn overlaps(&self, start: Address, len: u64) -> bool
    {
        let end = start.saturating_add(len);
        start < self.end && self.start < end
    }

    /// Number of bytes covered.
    #[must_use]
    pub fn len(&self) -> u64
    {
        self.end.value().saturating_sub(self.start.value())
    }

    /// Returns `true` if the range covers no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.len() == 0
    }
}

impl fmt::Display for AddressRange
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "[0x{:x}-0x{:x})", self.start.0, self.end.0)
    }
}
