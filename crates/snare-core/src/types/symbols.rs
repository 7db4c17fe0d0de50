//! Symbol and source location types.

use std::fmt;

use super::{Address, AddressRange};

/// Programming language associated with a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolLanguage
{
    /// Rust symbol (detected via mangling).
    Rust,
    /// C++ symbol (Itanium mangling without Rust extensions).
    Cpp,
    /// C symbol or unmangled global.
    C,
}

impl fmt::Display for SymbolLanguage
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let label = match self {
            SymbolLanguage::Rust => "rust",
            SymbolLanguage::Cpp => "c++",
            SymbolLanguage::C => "c",
        };
        write!(f, "{label}")
    }
}

/// A linkage name with demangling metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolName
{
    raw: String,
    demangled: Option<String>,
    language: SymbolLanguage,
}

impl SymbolName
{
    /// Construct from a raw linkage name.
    #[must_use]
    pub fn new(raw: String, demangled: Option<String>, language: SymbolLanguage) -> Self
    {
        Self {
            raw,
            demangled,
            language,
        }
    }

    /// Plain C name that needs no demangling.
    #[must_use]
    pub fn plain(raw: impl Into<String>) -> Self
    {
        Self::new(raw.into(), None, SymbolLanguage::C)
    }

    /// Build from a raw linkage name, demangling Rust symbols.
    ///
    /// ```rust
    /// use snare_core::types::{SymbolLanguage, SymbolName};
    ///
    /// let name = SymbolName::demangle("g_my_int");
    /// assert_eq!(name.display_name(), "g_my_int");
    /// assert_eq!(name.language(), SymbolLanguage::C);
    /// ```
    #[must_use]
    pub fn demangle(raw: impl Into<String>) -> Self
    {
        let raw = raw.into();
        let demangled = rustc_demangle::try_demangle(&raw)
            .ok()
            .map(|d| format!("{d:#}"));
        let language = if demangled.is_some() {
            SymbolLanguage::Rust
        } else if raw.starts_with("_Z") {
            SymbolLanguage::Cpp
        } else {
            SymbolLanguage::C
        };
        Self::new(raw, demangled, language)
    }

    /// Raw (mangled) name emitted in the object file.
    #[must_use]
    pub fn raw(&self) -> &str
    {
        &self.raw
    }

    /// Demangled human-friendly name if available.
    #[must_use]
    pub fn demangled(&self) -> Option<&str>
    {
        self.demangled.as_deref()
    }

    /// Preferred presentation (demangled, falling back to raw).
    #[must_use]
    pub fn display_name(&self) -> &str
    {
        self.demangled.as_deref().unwrap_or(&self.raw)
    }

    /// Language classification for the symbol.
    #[must_use]
    pub fn language(&self) -> SymbolLanguage
    {
        self.language
    }

    /// Returns `true` if either the raw or the demangled form equals `name`.
    #[must_use]
    pub fn matches(&self, name: &str) -> bool
    {
        self.raw == name || self.demangled.as_deref() == Some(name)
    }
}

impl fmt::Display for SymbolName
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.display_name())
    }
}

/// Source code location for a declaration or frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceLocation
{
    /// Path as recorded in the debug information.
    pub file: String,
    /// Line number, if known.
    pub line: Option<u32>,
    /// Column number, if known.
    pub column: Option<u32>,
}

impl SourceLocation
{
    /// Location with a known file and line.
    pub fn new(file: impl Into<String>, line: u32) -> Self
    {
        Self {
            file: file.into(),
            line: Some(line),
            column: None,
        }
    }

    /// Helper to build a location when only a file is known.
    pub fn from_file(file: impl Into<String>) -> Self
    {
        Self {
            file: file.into(),
            line: None,
            column: None,
        }
    }

    /// Final path component of the file.
    #[must_use]
    pub fn file_name(&self) -> &str
    {
        file_name(&self.file)
    }
}

impl fmt::Display for SourceLocation
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.file_name())?;
        if let Some(line) = self.line {
            write!(f, ":{line}")?;
            if let Some(column) = self.column {
                write!(f, ":{column}")?;
            }
        }
        Ok(())
    }
}

/// Final component of a `/` or `\` separated path.
#[must_use]
pub fn file_name(path: &str) -> &str
{
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Whether a symbol names code or data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind
{
    /// Function or other executable text.
    Code,
    /// Global or static object.
    Data,
}

/// Entry of a module's symbol table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol
{
    /// Linkage name.
    pub name: SymbolName,
    /// Start address.
    pub address: Address,
    /// Size in bytes (0 when the object file does not record one).
    pub size: u64,
    /// Code or data.
    pub kind: SymbolKind,
}

impl Symbol
{
    /// Address range covered by the symbol; zero-sized symbols cover one byte.
    #[must_use]
    pub fn range(&self) -> AddressRange
    {
        AddressRange::with_len(self.address, self.size.max(1))
    }

    /// Name used for display and lookups.
    #[must_use]
    pub fn display_name(&self) -> &str
    {
        self.name.display_name()
    }
}
