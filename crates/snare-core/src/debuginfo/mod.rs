//! # Debug Information Store
//!
//! A [`Module`] holds everything the engine knows about one executable: its
//! architecture, compile units, types, functions with their variables,
//! globals, the symbol table and the line table.
//!
//! Modules come from two places:
//!
//! - [`load_module`] reads an ELF (or other `object`-supported) file and its
//!   DWARF with `gimli`.
//! - [`ModuleBuilder`] assembles one programmatically, which is how tests and
//!   alternative debug-info front ends supply pre-parsed data.
//!
//! Lookups are exact: asking for a type, global or function that does not
//! exist fails with [`SnareError::NotFound`] instead of returning the closest
//! match.

mod builder;
mod lines;
mod loader;
mod types;

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;

pub use builder::{FunctionHandle, ModuleBuilder};
pub use lines::{file_matches, LineEntry, LineTable};
pub use loader::load_module;
pub use types::{Enumerator, Field, ScalarEncoding, Type, TypeId, TypeKind, TypeTable};

use crate::error::{Result, SnareError};
use crate::types::symbols::file_name;
use crate::types::{Address, AddressRange, Architecture, SourceLocation, Symbol};

/// A compilation unit contributing to the module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileUnit
{
    /// Primary source file (`DW_AT_name`).
    pub name: String,
    /// Compiler identification (`DW_AT_producer`), if recorded.
    pub producer: Option<String>,
}

/// Where a variable's storage lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableLocation
{
    /// Fixed address (globals and statics).
    Static(Address),
    /// Signed offset from the frame base of the owning function.
    FrameOffset(i64),
}

/// Visibility class of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableScope
{
    /// External global.
    Global,
    /// `static` at file scope.
    FileStatic,
    /// Function parameter.
    Parameter,
    /// Function local.
    Local,
}

/// A named variable with a type and a location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable
{
    /// Source name.
    pub name: String,
    /// Declared type.
    pub ty: TypeId,
    /// Storage location.
    pub location: VariableLocation,
    /// Visibility class.
    pub scope: VariableScope,
    /// Declaration site, if recorded.
    pub decl: Option<SourceLocation>,
}

/// A function with code in the module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function
{
    /// Source name.
    pub name: String,
    /// Code range `[low_pc, high_pc)`.
    pub range: AddressRange,
    /// Declaration site, if recorded.
    pub decl: Option<SourceLocation>,
    /// Parameters in declaration order.
    pub parameters: Vec<Variable>,
    /// Locals, including those of nested lexical blocks.
    pub locals: Vec<Variable>,
}

impl Function
{
    /// Parameters followed by locals.
    pub fn variables(&self) -> impl Iterator<Item = &Variable>
    {
        self.parameters.iter().chain(self.locals.iter())
    }

    /// First and last source line covered by this function in `file`
    ///
    /// The span starts at the declaration line (which may emit no code) and
    /// ends at the last line with code inside the function's range.
    #[must_use]
    pub fn line_span(&self, lines: &LineTable, file: &str) -> Option<(u32, u32)>
    {
        let mut min = None::<u32>;
        let mut max = None::<u32>;
        for entry in lines.entries_in_range(self.range) {
            if !file_matches(&entry.file, file) {
                continue;
            }
            min = Some(min.map_or(entry.line, |m| m.min(entry.line)));
            max = Some(max.map_or(entry.line, |m| m.max(entry.line)));
        }
        let last = max?;
        let first = match &self.decl {
            Some(SourceLocation { file: decl_file, line: Some(line), .. }) if file_matches(decl_file, file) => {
                (*line).min(min.unwrap_or(*line))
            }
            _ => min?,
        };
        Some((first, last))
    }

    /// Address of the first line after the prologue
    ///
    /// This is the first line entry in the function whose line differs from the
    /// line at the entry point, or the entry point itself for single-line
    /// functions.
    #[must_use]
    pub fn prologue_end(&self, lines: &LineTable) -> Address
    {
        let mut entries = lines.entries_in_range(self.range);
        let Some(first) = entries.next() else {
            return self.range.start;
        };
        entries
            .find(|entry| entry.line != first.line && entry.line != 0)
            .map_or(self.range.start, LineEntry::address)
    }
}

/// Parts of a module, handed to [`Module::from_parts`].
#[derive(Debug, Default)]
pub(crate) struct ModuleParts
{
    pub path: PathBuf,
    pub architecture: Option<Architecture>,
    pub compile_units: Vec<CompileUnit>,
    pub types: TypeTable,
    pub functions: Vec<Function>,
    pub globals: Vec<Variable>,
    pub symbols: Vec<Symbol>,
    pub lines: Vec<LineEntry>,
}

/// A loaded binary and its debug information.
#[derive(Debug)]
pub struct Module
{
    path: PathBuf,
    architecture: Architecture,
    compile_units: Vec<CompileUnit>,
    types: TypeTable,
    functions: Vec<Function>,
    globals: Vec<Variable>,
    symbols: Vec<Symbol>,
    line_table: LineTable,
    globals_by_name: OnceCell<HashMap<String, Vec<usize>>>,
    functions_by_name: OnceCell<HashMap<String, usize>>,
}

impl Module
{
    pub(crate) fn from_parts(parts: ModuleParts) -> Result<Self>
    {
        let architecture = parts
            .architecture
            .ok_or_else(|| SnareError::invalid_argument("module architecture is unknown"))?;
        parts.types.validate()?;

        let mut functions = parts.functions;
        functions.sort_by_key(|function| function.range.start);
        let mut symbols = parts.symbols;
        symbols.sort_by(|a, b| a.address.cmp(&b.address).then_with(|| b.size.cmp(&a.size)));

        Ok(Self {
            path: parts.path,
            architecture,
            compile_units: parts.compile_units,
            types: parts.types,
            functions,
            globals: parts.globals,
            symbols,
            line_table: LineTable::new(parts.lines),
            globals_by_name: OnceCell::new(),
            functions_by_name: OnceCell::new(),
        })
    }

    /// Path the module was loaded from (or named after).
    #[must_use]
    pub fn path(&self) -> &Path
    {
        &self.path
    }

    /// File name of the module, e.g. `a.out`.
    #[must_use]
    pub fn name(&self) -> &str
    {
        self.path
            .to_str()
            .map_or("<module>", file_name)
    }

    /// Target architecture.
    #[must_use]
    pub fn architecture(&self) -> Architecture
    {
        self.architecture
    }

    /// Compile units in load order.
    #[must_use]
    pub fn compile_units(&self) -> &[CompileUnit]
    {
        &self.compile_units
    }

    /// The module's type table.
    #[must_use]
    pub fn types(&self) -> &TypeTable
    {
        &self.types
    }

    /// Functions sorted by address.
    #[must_use]
    pub fn functions(&self) -> &[Function]
    {
        &self.functions
    }

    /// Globals and file statics in declaration order.
    #[must_use]
    pub fn globals(&self) -> &[Variable]
    {
        &self.globals
    }

    /// Symbols sorted by address.
    #[must_use]
    pub fn symbols(&self) -> &[Symbol]
    {
        &self.symbols
    }

    /// The line table.
    #[must_use]
    pub fn line_table(&self) -> &LineTable
    {
        &self.line_table
    }

    /// Find a type by exact name
    ///
    /// A leading `struct `, `union ` or `enum ` keyword is accepted, so both
    /// `point_tag` and `struct point_tag` work.
    ///
    /// ## Errors
    ///
    /// `NotFound` when no type has exactly that name.
    pub fn find_type(&self, name: &str) -> Result<TypeId>
    {
        let trimmed = name.trim();
        let bare = ["struct ", "union ", "enum ", "class "]
            .iter()
            .find_map(|keyword| trimmed.strip_prefix(keyword))
            .map_or(trimmed, str::trim);
        self.types
            .find(bare)
            .ok_or_else(|| SnareError::not_found(format!("type '{name}'")))
    }

    /// Look up a type by id.
    ///
    /// ## Errors
    ///
    /// `NotFound` for ids from another module.
    pub fn type_info(&self, id: TypeId) -> Result<&Type>
    {
        self.types.ty(id)
    }

    /// C spelling of a type.
    #[must_use]
    pub fn type_name(&self, id: TypeId) -> String
    {
        self.types.name_of(id)
    }

    /// Byte size of a type on this module's architecture.
    ///
    /// ## Errors
    ///
    /// See [`TypeTable::byte_size`].
    pub fn byte_size(&self, id: TypeId) -> Result<u64>
    {
        self.types.byte_size(id, self.architecture)
    }

    /// Declaration text of a type, as printed by `image lookup -t`.
    #[must_use]
    pub fn describe_type(&self, id: TypeId) -> String
    {
        self.types.describe(id)
    }

    /// All globals and statics named `name`, in declaration order.
    ///
    /// ## Errors
    ///
    /// `NotFound` when there are none.
    pub fn find_globals(&self, name: &str) -> Result<Vec<&Variable>>
    {
        let index = self.globals_by_name.get_or_init(|| {
            let mut index: HashMap<String, Vec<usize>> = HashMap::new();
            for (position, global) in self.globals.iter().enumerate() {
                index.entry(global.name.clone()).or_default().push(position);
            }
            index
        });
        let found: Vec<&Variable> = index
            .get(name)
            .map(|positions| positions.iter().filter_map(|&p| self.globals.get(p)).collect())
            .unwrap_or_default();
        if found.is_empty() {
            return Err(SnareError::not_found(format!("global variable '{name}'")));
        }
        Ok(found)
    }

    /// Line entries for exactly `line` of `file`
    ///
    /// The result may be empty when the line exists but emits no code.
    ///
    /// ## Errors
    ///
    /// `NotFound` when the line table has no entry at all for `file`.
    pub fn line_entries_for(&self, file: &str, line: u32) -> Result<Vec<LineEntry>>
    {
        if !self.line_table.knows_file(file) {
            return Err(SnareError::not_found(format!("source file '{file}'")));
        }
        Ok(self
            .line_table
            .entries_for_line(file, line)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Line entry containing `address`.
    #[must_use]
    pub fn line_entry_for_address(&self, address: Address) -> Option<&LineEntry>
    {
        self.line_table.entry_for_address(address)
    }

    /// Function named `name`.
    ///
    /// ## Errors
    ///
    /// `NotFound` if no function has that name.
    pub fn function_named(&self, name: &str) -> Result<&Function>
    {
        let index = self.functions_by_name.get_or_init(|| {
            let mut index = HashMap::new();
            for (position, function) in self.functions.iter().enumerate() {
                index.entry(function.name.clone()).or_insert(position);
            }
            index
        });
        index
            .get(name)
            .and_then(|&position| self.functions.get(position))
            .ok_or_else(|| SnareError::not_found(format!("function '{name}'")))
    }

    /// Function whose code range contains `address`.
    #[must_use]
    pub fn function_at(&self, address: Address) -> Option<&Function>
    {
        let upper = self
            .functions
            .partition_point(|function| function.range.start <= address);
        self.functions[..upper]
            .iter()
            .rev()
            .find(|function| function.range.contains(address))
    }

    /// Function whose source span in `file` includes `line`
    ///
    /// This is the scope used to move a breakpoint off a line that emits no
    /// code. When spans nest, the innermost (latest-starting) one wins.
    #[must_use]
    pub fn scope_for_line(&self, file: &str, line: u32) -> Option<&Function>
    {
        self.functions
            .iter()
            .filter_map(|function| {
                let (first, last) = function.line_span(&self.line_table, file)?;
                (first <= line && line <= last).then_some((first, function))
            })
            .max_by_key(|(first, _)| *first)
            .map(|(_, function)| function)
    }

    /// Symbol whose range contains `address`, preferring the closest start.
    #[must_use]
    pub fn symbol_for_address(&self, address: Address) -> Option<&Symbol>
    {
        let upper = self.symbols.partition_point(|symbol| symbol.address <= address);
        self.symbols[..upper]
            .iter()
            .rev()
            .find(|symbol| symbol.range().contains(address))
    }

    /// `a.out`main + 20 at main.c:14` style description of a code address.
    ///
    /// Falls back to the containing symbol, then to the bare address.
    #[must_use]
    pub fn symbolicate(&self, address: Address) -> String
    {
        let (name, start) = if let Some(function) = self.function_at(address) {
            (function.name.clone(), function.range.start)
        } else if let Some(symbol) = self.symbol_for_address(address) {
            (symbol.display_name().to_string(), symbol.address)
        } else {
            return format!("{}`{address}", self.name());
        };

        let mut text = format!("{}`{name}", self.name());
        if let Some(offset) = address.offset_from(start).filter(|&offset| offset > 0) {
            let _ = write!(text, " + {offset}");
        }
        if let Some(entry) = self.line_entry_for_address(address) {
            let _ = write!(text, " at {entry}");
        }
        text
    }

    /// Symbol with the given raw or demangled name.
    #[must_use]
    pub fn symbol_named(&self, name: &str) -> Option<&Symbol>
    {
        self.symbols.iter().find(|symbol| symbol.name.matches(name))
    }
}
