//! # Formatted memory reads
//!
//! `memory read` style rendering of inferior memory. A read is described by
//! [`MemoryReadOptions`]: a display format, the size of one item, how many
//! items to read and how many to print per line.
//!
//! ```text
//! 0x0000000000404040: 48 65 6c 6c 6f 00 00 00 01 00 00 00 02 00 00 00  Hello...........
//! ```

use std::fmt;
use std::fmt::Write as _;

use crate::error::{Result, SnareError};
use crate::inferior::MemoryReader;
use crate::types::{Address, Architecture};

/// How each item of a memory read is displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryFormat
{
    /// `0x48 0x65 ...`
    Bytes,
    /// `48 65 ...` followed by an ASCII column.
    BytesWithAscii,
    /// Zero-padded hex of the item size.
    Hex,
    /// Signed decimal.
    Decimal,
    /// Unsigned decimal.
    Unsigned,
    /// Characters, escaped where not printable.
    Char,
    /// NUL-terminated strings, one per line.
    CString,
    /// Pointer-sized hex.
    Pointer,
}

impl MemoryFormat
{
    fn default_item_size(self, arch: Architecture) -> usize
    {
        match self {
            MemoryFormat::Bytes | MemoryFormat::BytesWithAscii | MemoryFormat::Char | MemoryFormat::CString => 1,
            MemoryFormat::Hex | MemoryFormat::Decimal | MemoryFormat::Unsigned => 4,
            MemoryFormat::Pointer => usize::from(arch.pointer_size_bytes()),
        }
    }

    fn default_count(self) -> usize
    {
        match self {
            MemoryFormat::Bytes | MemoryFormat::BytesWithAscii | MemoryFormat::Char => 32,
            MemoryFormat::CString => 1,
            MemoryFormat::Hex | MemoryFormat::Decimal | MemoryFormat::Unsigned | MemoryFormat::Pointer => 8,
        }
    }

    fn default_items_per_line(self) -> usize
    {
        match self {
            MemoryFormat::Bytes | MemoryFormat::BytesWithAscii => 16,
            MemoryFormat::Char => 32,
            MemoryFormat::CString => 1,
            MemoryFormat::Hex | MemoryFormat::Decimal | MemoryFormat::Unsigned => 4,
            MemoryFormat::Pointer => 2,
        }
    }
}

impl fmt::Display for MemoryFormat
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let name = match self {
            MemoryFormat::Bytes => "bytes",
            MemoryFormat::BytesWithAscii => "bytes with ASCII",
            MemoryFormat::Hex => "hex",
            MemoryFormat::Decimal => "decimal",
            MemoryFormat::Unsigned => "unsigned decimal",
            MemoryFormat::Char => "char",
            MemoryFormat::CString => "c-string",
            MemoryFormat::Pointer => "pointer",
        };
        f.write_str(name)
    }
}

/// Parameters of a formatted memory read.
///
/// Unset fields take the format's defaults.
///
/// ## Example
///
/// ```rust
/// use snare_core::memory::{MemoryFormat, MemoryReadOptions};
/// use snare_core::types::Architecture;
///
/// let options = MemoryReadOptions::new(MemoryFormat::Hex).item_size(8).count(2);
/// assert_eq!(options.validate(Architecture::X86_64, 1024)?, 16);
/// # Ok::<(), snare_core::error::SnareError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryReadOptions
{
    format: MemoryFormat,
    item_size: Option<usize>,
    count: Option<usize>,
    items_per_line: Option<usize>,
}

impl MemoryReadOptions
{
    #[must_use]
    pub fn new(format: MemoryFormat) -> Self
    {
        Self {
            format,
            item_size: None,
            count: None,
            items_per_line: None,
        }
    }

    #[must_use]
    pub fn item_size(mut self, size: usize) -> Self
    {
        self.item_size = Some(size);
        self
    }

    /// Number of items to read (strings, for [`MemoryFormat::CString`]).
    #[must_use]
    pub fn count(mut self, count: usize) -> Self
    {
        self.count = Some(count);
        self
    }

    #[must_use]
    pub fn items_per_line(mut self, items: usize) -> Self
    {
        self.items_per_line = Some(items);
        self
    }

    #[must_use]
    pub fn format(&self) -> MemoryFormat
    {
        self.format
    }

    fn resolved(&self, arch: Architecture) -> (usize, usize, usize)
    {
        (
            self.item_size.unwrap_or_else(|| self.format.default_item_size(arch)),
            self.count.unwrap_or_else(|| self.format.default_count()),
            self.items_per_line
                .unwrap_or_else(|| self.format.default_items_per_line()),
        )
    }

    /// Check the options and return the number of bytes the read covers.
    ///
    /// C-string reads have no fixed size; they are bounded by `max_read`.
    ///
    /// ## Errors
    ///
    /// `InvalidArgument` for an item size the format cannot display, a zero
    /// count, or a read or output line larger than `max_read`.
    pub fn validate(&self, arch: Architecture, max_read: usize) -> Result<usize>
    {
        let (size, count, per_line) = self.resolved(arch);
        if count == 0 {
            return Err(SnareError::invalid_argument("memory read item count must be greater than zero"));
        }
        if per_line == 0 {
            return Err(SnareError::invalid_argument("items per line must be greater than zero"));
        }
        let size_ok = match self.format {
            MemoryFormat::Bytes | MemoryFormat::BytesWithAscii | MemoryFormat::Char | MemoryFormat::CString => {
                size == 1
            }
            MemoryFormat::Hex | MemoryFormat::Decimal | MemoryFormat::Unsigned => matches!(size, 1 | 2 | 4 | 8),
            MemoryFormat::Pointer => size == usize::from(arch.pointer_size_bytes()),
        };
        if !size_ok {
            return Err(SnareError::invalid_argument(format!(
                "invalid item size {size} for {} format",
                self.format
            )));
        }
        if self.format == MemoryFormat::CString {
            return Ok(max_read);
        }
        if size.checked_mul(per_line).map_or(true, |line| line > max_read) {
            return Err(SnareError::invalid_argument(format!(
                "{per_line} items per line exceeds the {max_read} byte limit"
            )));
        }
        let total = size
            .checked_mul(count)
            .filter(|total| *total <= max_read)
            .ok_or_else(|| {
                SnareError::invalid_argument(format!(
                    "memory read of {size} x {count} bytes exceeds the {max_read} byte limit"
                ))
            })?;
        Ok(total)
    }
}

/// Read and render memory.
///
/// ## Errors
///
/// Validation errors from [`MemoryReadOptions::validate`]; `MemoryAccess` if
/// the range is not readable.
pub fn format_memory(
    memory: &dyn MemoryReader,
    address: Address,
    options: &MemoryReadOptions,
    arch: Architecture,
    max_read: usize,
) -> Result<String>
{
    let total = options.validate(arch, max_read)?;
    let (size, count, per_line) = options.resolved(arch);
    if options.format == MemoryFormat::CString {
        return format_cstrings(memory, address, count, total);
    }

    let bytes = memory.read_memory(address, total)?;
    let mut lines = Vec::new();
    for (line_index, line) in bytes.chunks(size * per_line).enumerate() {
        let line_address = address + (line_index * size * per_line) as u64;
        let mut text = format!("{line_address}: ");
        let items: Vec<String> = line
            .chunks(size)
            .map(|item| format_item(options.format, item, arch))
            .collect();
        let separator = if options.format == MemoryFormat::Char { "" } else { " " };
        text.push_str(&items.join(separator));
        if options.format == MemoryFormat::BytesWithAscii {
            let missing = per_line.saturating_sub(line.len());
            text.push_str(&"   ".repeat(missing));
            text.push_str("  ");
            text.extend(line.iter().map(|&byte| {
                if byte.is_ascii_graphic() || byte == b' ' {
                    char::from(byte)
                } else {
                    '.'
                }
            }));
        }
        lines.push(text);
    }
    Ok(lines.join("\n"))
}

fn format_item(format: MemoryFormat, item: &[u8], arch: Architecture) -> String
{
    let value = read_uint_le(item);
    match format {
        MemoryFormat::Bytes => format!("0x{value:02x}"),
        MemoryFormat::BytesWithAscii => format!("{value:02x}"),
        MemoryFormat::Hex => format!("0x{value:0width$x}", width = item.len() * 2),
        MemoryFormat::Decimal => sign_extend(value, item.len()).to_string(),
        MemoryFormat::Unsigned => value.to_string(),
        MemoryFormat::Char | MemoryFormat::CString => item.iter().map(|&byte| escape_byte(byte, '\'')).collect(),
        MemoryFormat::Pointer => Address::new(value).to_padded_hex(arch.pointer_size_bytes()),
    }
}

fn format_cstrings(memory: &dyn MemoryReader, address: Address, count: usize, budget: usize) -> Result<String>
{
    let mut lines = Vec::new();
    let mut cursor = address;
    let mut remaining = budget;
    for _ in 0..count {
        if remaining == 0 {
            break;
        }
        let (bytes, terminated) = read_c_string(memory, cursor, remaining)?;
        let consumed = bytes.len() + usize::from(terminated);
        lines.push(format!("{cursor}: {}", quote_bytes(&bytes, terminated)));
        cursor = cursor + consumed as u64;
        remaining = remaining.saturating_sub(consumed);
    }
    Ok(lines.join("\n"))
}

/// Read bytes at `address` up to (not including) the first NUL, at most `limit` bytes.
///
/// Returns the bytes and whether a NUL was found.
///
/// ## Errors
///
/// `MemoryAccess` if the first byte is unreadable. A string that runs into
/// unreadable memory later is cut off there.
pub(crate) fn read_c_string(memory: &dyn MemoryReader, address: Address, limit: usize) -> Result<(Vec<u8>, bool)>
{
    const CHUNK: usize = 64;
    let mut text = Vec::new();
    let mut cursor = address;
    while text.len() < limit {
        let wanted = CHUNK.min(limit - text.len());
        let chunk = match memory.read_memory(cursor, wanted) {
            Ok(chunk) => chunk,
            // Retry byte by byte in case the chunk straddles the end of a mapping.
            Err(err) => match memory.read_memory(cursor, 1) {
                Ok(byte) => byte,
                Err(_) if !text.is_empty() => return Ok((text, false)),
                Err(_) => return Err(err),
            },
        };
        if let Some(nul) = chunk.iter().position(|&byte| byte == 0) {
            text.extend_from_slice(&chunk[..nul]);
            return Ok((text, true));
        }
        cursor = cursor + chunk.len() as u64;
        text.extend_from_slice(&chunk);
    }
    Ok((text, false))
}

/// `"text"` with C escapes; unterminated strings get a trailing `...`.
pub(crate) fn quote_bytes(bytes: &[u8], terminated: bool) -> String
{
    let mut quoted = String::with_capacity(bytes.len() + 2);
    quoted.push('"');
    for &byte in bytes {
        quoted.push_str(&escape_byte(byte, '"'));
    }
    quoted.push('"');
    if !terminated {
        quoted.push_str("...");
    }
    quoted
}

/// C escape of one byte inside a literal delimited by `quote`.
pub(crate) fn escape_byte(byte: u8, quote: char) -> String
{
    match byte {
        0 => "\\0".to_string(),
        b'\n' => "\\n".to_string(),
        b'\t' => "\\t".to_string(),
        b'\r' => "\\r".to_string(),
        b'\\' => "\\\\".to_string(),
        b if char::from(b) == quote => format!("\\{quote}"),
        b if b.is_ascii_graphic() || b == b' ' => char::from(b).to_string(),
        b => format!("\\x{b:02x}"),
    }
}

/// Little-endian unsigned value of up to 8 bytes.
pub(crate) fn read_uint_le(bytes: &[u8]) -> u64
{
    bytes
        .iter()
        .take(8)
        .enumerate()
        .fold(0u64, |value, (shift, &byte)| value | (u64::from(byte) << (shift * 8)))
}

/// Interpret the low `size` bytes of `value` as two's complement.
#[allow(clippy::cast_possible_wrap)]
pub(crate) fn sign_extend(value: u64, size: usize) -> i64
{
    if size == 0 || size >= 8 {
        return value as i64;
    }
    let shift = 64 - size * 8;
    ((value << shift) as i64) >> shift
}
