//! ELF/DWARF ingestion.
//!
//! [`load_module`] parses the object file with `object`, reads the symbol
//! table, then walks every DWARF compile unit with `gimli` to collect types,
//! functions (with parameters and locals), globals and the line table.
//!
//! Only what the engine needs is kept: location lists, register locations and
//! inlined subroutines are skipped rather than rejected.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use gimli::{
    constants, AttributeValue, DebuggingInformationEntry, Dwarf, EndianArcSlice, EntriesTreeIter, EntriesTreeNode,
    Operation, Reader, RunTimeEndian, SectionId, Unit, UnitOffset, UnitSectionOffset,
};
use object::{Object, ObjectSection, ObjectSymbol};
use tracing::{debug, info};

use super::types::{Enumerator, Field, ScalarEncoding, Type, TypeId, TypeKind, TypeTable};
use super::{CompileUnit, Function, LineEntry, Module, ModuleParts, Variable, VariableLocation, VariableScope};
use crate::error::{Result, SnareError};
use crate::types::{Address, AddressRange, Architecture, SourceLocation, Symbol, SymbolKind, SymbolName};

type OwnedReader = EndianArcSlice<RunTimeEndian>;
type OwnedDwarf = Dwarf<OwnedReader>;
type OwnedEntry<'abbrev, 'unit> = DebuggingInformationEntry<'abbrev, 'unit, OwnedReader>;

/// Typedef and qualifier chains longer than this are treated as `void`.
const MAX_TYPE_DEPTH: usize = 64;

/// Load an executable and its debug information.
///
/// Addresses are the file's link-time addresses; no load slide is applied.
///
/// ## Example
///
/// ```rust,no_run
/// use snare_core::debuginfo::load_module;
///
/// let module = load_module("./a.out")?;
/// let point = module.find_type("point_tag")?;
/// println!("{}", module.describe_type(point));
/// # Ok::<(), snare_core::error::SnareError>(())
/// ```
///
/// ## Errors
///
/// - `LoadError` if the file cannot be read, is not an object file, targets an
///   unsupported architecture, or carries malformed DWARF.
/// - `ArchitectureMismatch` for big-endian objects, or if a pointer type's
///   recorded size disagrees with the architecture's pointer width.
pub fn load_module(path: impl AsRef<Path>) -> Result<Module>
{
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|err| load_error(path, format!("cannot read file: {err}")))?;
    let file =
        object::File::parse(&*bytes).map_err(|err| load_error(path, format!("not a recognised object file: {err}")))?;

    let architecture = match file.architecture() {
        object::Architecture::I386 | object::Architecture::X86_64_X32 => Architecture::X86,
        object::Architecture::X86_64 => Architecture::X86_64,
        object::Architecture::Arm | object::Architecture::Aarch64_Ilp32 => Architecture::Arm,
        object::Architecture::Aarch64 => Architecture::Arm64,
        other => return Err(load_error(path, format!("unsupported architecture {other:?}"))),
    };
    if !file.is_little_endian() {
        return Err(SnareError::ArchitectureMismatch(format!(
            "{} is a big-endian {architecture} object; only little-endian targets are supported",
            path.display()
        )));
    }
    let endian = RunTimeEndian::Little;

    let symbols = read_symbols(&file);
    let dwarf = Dwarf::load(|id: SectionId| -> Result<OwnedReader> {
        let data = load_section_bytes(path, &file, id)?;
        Ok(EndianArcSlice::new(data, endian))
    })?;

    let mut units = Vec::new();
    let mut headers = dwarf.units();
    while let Some(header) = headers
        .next()
        .map_err(|err| map_dwarf_error(path, "reading unit headers", err))?
    {
        let unit = dwarf
            .unit(header)
            .map_err(|err| map_dwarf_error(path, "parsing compile unit", err))?;
        units.push(unit);
    }

    let loader = DwarfLoader {
        path,
        dwarf: &dwarf,
        units: &units,
        architecture,
    };
    let mut state = LoadState::default();
    for index in 0..units.len() {
        loader.load_unit(index, &mut state)?;
    }

    info!(
        path = %path.display(),
        %architecture,
        units = units.len(),
        functions = state.functions.len(),
        globals = state.globals.len(),
        line_entries = state.lines.len(),
        symbols = symbols.len(),
        "loaded module"
    );

    Module::from_parts(ModuleParts {
        path: path.to_path_buf(),
        architecture: Some(architecture),
        compile_units: state.compile_units,
        types: state.types,
        functions: state.functions,
        globals: state.globals,
        symbols,
        lines: state.lines,
    })
}

fn load_error(path: &Path, reason: impl Into<String>) -> SnareError
{
    SnareError::LoadError {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

fn map_dwarf_error(path: &Path, context: &str, err: gimli::Error) -> SnareError
{
    load_error(path, format!("{context}: {err}"))
}

fn load_section_bytes(path: &Path, file: &object::File<'_>, id: SectionId) -> Result<Arc<[u8]>>
{
    let name = id.name();
    let macho_name = format!("__{}", name.trim_start_matches('.'));
    for candidate in [name, macho_name.as_str()] {
        if let Some(section) = file.section_by_name(candidate) {
            let data = section
                .uncompressed_data()
                .map_err(|err| load_error(path, format!("failed to read {candidate}: {err}")))?;
            return Ok(match data {
                Cow::Borrowed(bytes) => Arc::<[u8]>::from(bytes),
                Cow::Owned(vec) => vec.into(),
            });
        }
    }
    Ok(Arc::<[u8]>::from(Vec::new()))
}

fn read_symbols(file: &object::File<'_>) -> Vec<Symbol>
{
    let mut symbols: Vec<Symbol> = file.symbols().filter_map(|symbol| convert_symbol(&symbol)).collect();
    if symbols.is_empty() {
        // Stripped binaries still export their dynamic symbols.
        symbols = file
            .dynamic_symbols()
            .filter_map(|symbol| convert_symbol(&symbol))
            .collect();
    }
    symbols
}

fn convert_symbol<'data, S: ObjectSymbol<'data>>(symbol: &S) -> Option<Symbol>
{
    let kind = match symbol.kind() {
        object::SymbolKind::Text => SymbolKind::Code,
        object::SymbolKind::Data => SymbolKind::Data,
        _ => return None,
    };
    if symbol.is_undefined() || symbol.address() == 0 {
        return None;
    }
    let name = symbol.name().ok().filter(|name| !name.is_empty())?;
    Some(Symbol {
        name: SymbolName::demangle(name),
        address: Address::new(symbol.address()),
        size: symbol.size(),
        kind,
    })
}

/// Everything collected while walking the units.
#[derive(Default)]
struct LoadState
{
    compile_units: Vec<CompileUnit>,
    types: TypeTable,
    type_cache: HashMap<(usize, UnitOffset), Option<TypeId>>,
    functions: Vec<Function>,
    globals: Vec<Variable>,
    lines: Vec<LineEntry>,
}

/// Read-only view of the parsed DWARF; mutable results live in [`LoadState`].
struct DwarfLoader<'a>
{
    path: &'a Path,
    dwarf: &'a OwnedDwarf,
    units: &'a [Unit<OwnedReader>],
    architecture: Architecture,
}

impl<'a> DwarfLoader<'a>
{
    fn error(&self, context: &str, err: gimli::Error) -> SnareError
    {
        map_dwarf_error(self.path, context, err)
    }

    fn load_unit(&self, index: usize, state: &mut LoadState) -> Result<()>
    {
        let unit = &self.units[index];
        let name = match &unit.name {
            Some(name) => self.reader_string(name)?,
            None => String::from("<unknown>"),
        };
        debug!(unit = %name, "loading compile unit");

        self.load_lines(unit, state)?;

        let mut tree = unit
            .entries_tree(None)
            .map_err(|err| self.error("building entry tree", err))?;
        let root = tree.root().map_err(|err| self.error("reading unit root", err))?;
        let producer = self.string_attr(unit, root.entry(), constants::DW_AT_producer)?;
        state.compile_units.push(CompileUnit { name, producer });

        self.load_scope(index, root.children(), state)
    }

    /// Walk the children of a unit or namespace.
    fn load_scope(&self, index: usize, mut children: EntriesTreeIter<'_, '_, '_, OwnedReader>, state: &mut LoadState)
        -> Result<()>
    {
        while let Some(child) = children
            .next()
            .map_err(|err| self.error("walking entries", err))?
        {
            let entry = child.entry().clone();
            match entry.tag() {
                constants::DW_TAG_subprogram => self.load_function(index, child, state)?,
                constants::DW_TAG_variable => self.load_global(index, &entry, state)?,
                constants::DW_TAG_namespace => self.load_scope(index, child.children(), state)?,
                constants::DW_TAG_base_type
                | constants::DW_TAG_structure_type
                | constants::DW_TAG_class_type
                | constants::DW_TAG_union_type
                | constants::DW_TAG_enumeration_type
                | constants::DW_TAG_typedef => {
                    self.resolve_type_at(index, entry.offset(), state, 0)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn load_lines(&self, unit: &Unit<OwnedReader>, state: &mut LoadState) -> Result<()>
    {
        let Some(program) = unit.line_program.clone() else {
            return Ok(());
        };

        let mut file_names: HashMap<u64, String> = HashMap::new();
        let mut open: Option<(String, u32, Option<u32>, u64)> = None;
        let mut rows = program.rows();
        while let Some((header, row)) = rows
            .next_row()
            .map_err(|err| self.error("reading line program", err))?
        {
            let address = row.address();
            let line = row
                .line()
                .and_then(|line| u32::try_from(line.get()).ok())
                .unwrap_or(0);

            let file = if row.end_sequence() || line == 0 {
                None
            } else if let Some(name) = file_names.get(&row.file_index()) {
                Some(name.clone())
            } else if let Some(entry) = row.file(header) {
                let mut path = PathBuf::new();
                if let Some(comp_dir) = &unit.comp_dir {
                    path.push(self.reader_string(comp_dir)?);
                }
                if let Some(directory) = entry.directory(header) {
                    path.push(self.attr_string(unit, directory)?);
                }
                path.push(self.attr_string(unit, entry.path_name())?);
                let name = path.to_string_lossy().into_owned();
                file_names.insert(row.file_index(), name.clone());
                Some(name)
            } else {
                None
            };

            let continues = matches!(
                (&open, &file),
                (Some((open_file, open_line, _, _)), Some(file)) if *open_line == line && open_file == file
            );
            if continues || (!row.is_stmt() && !row.end_sequence() && open.is_some()) {
                continue;
            }

            if let Some((open_file, open_line, column, start)) = open.take() {
                if address > start {
                    state.lines.push(LineEntry {
                        file: open_file,
                        line: open_line,
                        column,
                        range: AddressRange::new(Address::new(start), Address::new(address)),
                    });
                }
            }

            if let Some(file) = file {
                if row.is_stmt() {
                    let column = match row.column() {
                        gimli::ColumnType::LeftEdge => None,
                        gimli::ColumnType::Column(column) => u32::try_from(column.get()).ok(),
                    };
                    open = Some((file, line, column, address));
                }
            }
        }
        Ok(())
    }

    fn load_function(&self, index: usize, node: EntriesTreeNode<'_, '_, '_, OwnedReader>, state: &mut LoadState)
        -> Result<()>
    {
        let entry = node.entry().clone();
        if self.flag(&entry, constants::DW_AT_declaration)? {
            return Ok(());
        }
        let Some(range) = self.die_range(index, &entry)? else {
            return Ok(());
        };
        let Some(name) = self.die_name(index, &entry, 0)? else {
            return Ok(());
        };

        let mut function = Function {
            name,
            range,
            decl: self.decl_location(index, &entry)?,
            parameters: Vec::new(),
            locals: Vec::new(),
        };
        self.load_frame_variables(index, node.children(), &mut function, state)?;
        debug!(function = %function.name, range = %function.range, "loaded function");
        state.functions.push(function);
        Ok(())
    }

    fn load_frame_variables(
        &self,
        index: usize,
        mut children: EntriesTreeIter<'_, '_, '_, OwnedReader>,
        function: &mut Function,
        state: &mut LoadState,
    ) -> Result<()>
    {
        while let Some(child) = children
            .next()
            .map_err(|err| self.error("walking function body", err))?
        {
            let entry = child.entry().clone();
            match entry.tag() {
                constants::DW_TAG_formal_parameter => {
                    if let Some(variable) = self.variable(index, &entry, VariableScope::Parameter, state)? {
                        function.parameters.push(variable);
                    }
                }
                constants::DW_TAG_variable => {
                    if let Some(variable) = self.variable(index, &entry, VariableScope::Local, state)? {
                        function.locals.push(variable);
                    }
                }
                constants::DW_TAG_lexical_block => {
                    self.load_frame_variables(index, child.children(), function, state)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn load_global(&self, index: usize, entry: &OwnedEntry<'_, '_>, state: &mut LoadState) -> Result<()>
    {
        let scope = if self.flag(entry, constants::DW_AT_external)? {
            VariableScope::Global
        } else if let Some(origin) = self.origin(index, entry)? {
            if self.flag(&origin, constants::DW_AT_external)? {
                VariableScope::Global
            } else {
                VariableScope::FileStatic
            }
        } else {
            VariableScope::FileStatic
        };

        match self.variable(index, entry, scope, state)? {
            Some(variable) if matches!(variable.location, VariableLocation::Static(_)) => {
                state.globals.push(variable);
            }
            _ => {}
        }
        Ok(())
    }

    /// Build a variable, following `DW_AT_specification` for its name and type.
    fn variable(&self, index: usize, entry: &OwnedEntry<'_, '_>, scope: VariableScope, state: &mut LoadState)
        -> Result<Option<Variable>>
    {
        let Some(location) = self.location(index, entry)? else {
            return Ok(None);
        };
        let Some(name) = self.die_name(index, entry, 0)? else {
            return Ok(None);
        };

        let mut ty = self.resolve_type_attr(index, entry, state, 0)?;
        let mut decl = self.decl_location(index, entry)?;
        if ty.is_none() || decl.is_none() {
            if let Some(origin) = self.origin(index, entry)? {
                if ty.is_none() {
                    ty = self.resolve_type_attr(index, &origin, state, 0)?;
                }
                if decl.is_none() {
                    decl = self.decl_location(index, &origin)?;
                }
            }
        }

        Ok(ty.map(|ty| Variable {
            name,
            ty,
            location,
            scope,
            decl,
        }))
    }

    fn location(&self, index: usize, entry: &OwnedEntry<'_, '_>) -> Result<Option<VariableLocation>>
    {
        let Some(attr) = entry
            .attr(constants::DW_AT_location)
            .map_err(|err| self.error("reading DW_AT_location", err))?
        else {
            return Ok(None);
        };
        // Location lists describe optimised code; only single expressions are kept.
        let Some(expression) = attr.exprloc_value() else {
            return Ok(None);
        };

        let unit = &self.units[index];
        let mut operations = expression.operations(unit.encoding());
        let first = operations
            .next()
            .map_err(|err| self.error("decoding location expression", err))?;
        let trailing = operations
            .next()
            .map_err(|err| self.error("decoding location expression", err))?;
        if trailing.is_some() {
            return Ok(None);
        }

        Ok(match first {
            Some(Operation::Address { address }) => Some(VariableLocation::Static(Address::new(address))),
            Some(Operation::AddressIndex { index: address_index }) => {
                let address = self
                    .dwarf
                    .address(unit, address_index)
                    .map_err(|err| self.error("resolving DW_OP_addrx", err))?;
                Some(VariableLocation::Static(Address::new(address)))
            }
            Some(Operation::FrameOffset { offset }) => Some(VariableLocation::FrameOffset(offset)),
            _ => None,
        })
    }

    fn die_range(&self, index: usize, entry: &OwnedEntry<'_, '_>) -> Result<Option<AddressRange>>
    {
        let unit = &self.units[index];
        let mut ranges = self
            .dwarf
            .die_ranges(unit, entry)
            .map_err(|err| self.error("reading function ranges", err))?;
        let mut bounds: Option<(u64, u64)> = None;
        while let Some(range) = ranges
            .next()
            .map_err(|err| self.error("reading function ranges", err))?
        {
            if range.begin >= range.end {
                continue;
            }
            bounds = Some(match bounds {
                Some((low, high)) => (low.min(range.begin), high.max(range.end)),
                None => (range.begin, range.end),
            });
        }
        Ok(bounds.map(|(low, high)| AddressRange::new(Address::new(low), Address::new(high))))
    }

    /// `DW_AT_name`, falling back to the specification or abstract origin.
    fn die_name(&self, index: usize, entry: &OwnedEntry<'_, '_>, depth: usize) -> Result<Option<String>>
    {
        let unit = &self.units[index];
        if let Some(name) = self.string_attr(unit, entry, constants::DW_AT_name)? {
            return Ok(Some(name));
        }
        if depth >= MAX_TYPE_DEPTH {
            return Ok(None);
        }
        match self.origin(index, entry)? {
            Some(origin) => self.die_name(index, &origin, depth + 1),
            None => Ok(None),
        }
    }

    /// The entry named by `DW_AT_specification` or `DW_AT_abstract_origin`.
    fn origin(&self, index: usize, entry: &OwnedEntry<'_, '_>) -> Result<Option<OwnedEntry<'a, 'a>>>
    {
        let unit: &'a Unit<OwnedReader> = &self.units[index];
        for name in [constants::DW_AT_specification, constants::DW_AT_abstract_origin] {
            let value = entry
                .attr_value(name)
                .map_err(|err| self.error("reading entry reference", err))?;
            if let Some(AttributeValue::UnitRef(offset)) = value {
                let origin = unit
                    .entry(offset)
                    .map_err(|err| self.error("following entry reference", err))?;
                return Ok(Some(origin));
            }
        }
        Ok(None)
    }

    fn decl_location(&self, index: usize, entry: &OwnedEntry<'_, '_>) -> Result<Option<SourceLocation>>
    {
        let unit = &self.units[index];
        let file_index = match entry
            .attr_value(constants::DW_AT_decl_file)
            .map_err(|err| self.error("reading DW_AT_decl_file", err))?
        {
            Some(AttributeValue::FileIndex(file) | AttributeValue::Udata(file)) => file,
            _ => return Ok(None),
        };
        let Some(program) = &unit.line_program else {
            return Ok(None);
        };
        let header = program.header();
        let Some(file) = header.file(file_index) else {
            return Ok(None);
        };

        let mut path = PathBuf::new();
        if let Some(comp_dir) = &unit.comp_dir {
            path.push(self.reader_string(comp_dir)?);
        }
        if let Some(directory) = file.directory(header) {
            path.push(self.attr_string(unit, directory)?);
        }
        path.push(self.attr_string(unit, file.path_name())?);

        let line = entry
            .attr(constants::DW_AT_decl_line)
            .map_err(|err| self.error("reading DW_AT_decl_line", err))?
            .and_then(|attr| attr.udata_value())
            .and_then(|line| u32::try_from(line).ok());
        Ok(Some(SourceLocation {
            line,
            ..SourceLocation::from_file(path.to_string_lossy().into_owned())
        }))
    }

    fn resolve_type_attr(&self, index: usize, entry: &OwnedEntry<'_, '_>, state: &mut LoadState, depth: usize)
        -> Result<Option<TypeId>>
    {
        let value = entry
            .attr_value(constants::DW_AT_type)
            .map_err(|err| self.error("reading DW_AT_type", err))?;
        match value {
            Some(AttributeValue::UnitRef(offset)) => self.resolve_type_at(index, offset, state, depth),
            Some(AttributeValue::DebugInfoRef(offset)) => {
                let target = UnitSectionOffset::from(offset);
                let found = self
                    .units
                    .iter()
                    .enumerate()
                    .find_map(|(unit_index, unit)| target.to_unit_offset(unit).map(|offset| (unit_index, offset)));
                match found {
                    Some((unit_index, offset)) => self.resolve_type_at(unit_index, offset, state, depth),
                    None => Ok(None),
                }
            }
            // No DW_AT_type means `void`.
            _ => Ok(None),
        }
    }

    /// Convert the type entry at `offset`, memoised per unit and offset.
    ///
    /// `None` stands for `void` and for type shapes the engine does not model
    /// (function types, `nullptr_t`).
    fn resolve_type_at(&self, index: usize, offset: UnitOffset, state: &mut LoadState, depth: usize)
        -> Result<Option<TypeId>>
    {
        if let Some(cached) = state.type_cache.get(&(index, offset)) {
            return Ok(*cached);
        }
        if depth >= MAX_TYPE_DEPTH {
            return Ok(None);
        }

        let unit = &self.units[index];
        let entry = unit
            .entry(offset)
            .map_err(|err| self.error("reading type entry", err))?;
        let name = self.string_attr(unit, &entry, constants::DW_AT_name)?;
        let byte_size = entry
            .attr(constants::DW_AT_byte_size)
            .map_err(|err| self.error("reading DW_AT_byte_size", err))?
            .and_then(|attr| attr.udata_value());

        let resolved = match entry.tag() {
            constants::DW_TAG_base_type => {
                let encoding = match entry
                    .attr_value(constants::DW_AT_encoding)
                    .map_err(|err| self.error("reading DW_AT_encoding", err))?
                {
                    Some(AttributeValue::Encoding(constants::DW_ATE_signed)) => ScalarEncoding::Signed,
                    Some(AttributeValue::Encoding(constants::DW_ATE_boolean)) => ScalarEncoding::Boolean,
                    Some(AttributeValue::Encoding(constants::DW_ATE_float)) => ScalarEncoding::Float,
                    Some(AttributeValue::Encoding(constants::DW_ATE_signed_char)) => ScalarEncoding::SignedChar,
                    Some(AttributeValue::Encoding(constants::DW_ATE_unsigned_char | constants::DW_ATE_UTF)) => {
                        ScalarEncoding::UnsignedChar
                    }
                    _ => ScalarEncoding::Unsigned,
                };
                Some(state.types.push(Type {
                    name,
                    kind: TypeKind::Scalar {
                        encoding,
                        size: byte_size.unwrap_or(0),
                    },
                }))
            }
            constants::DW_TAG_pointer_type
            | constants::DW_TAG_reference_type
            | constants::DW_TAG_rvalue_reference_type => {
                let width = u64::from(self.architecture.pointer_size_bytes());
                if let Some(size) = byte_size.filter(|&size| size != width) {
                    return Err(SnareError::ArchitectureMismatch(format!(
                        "pointer type at {:#x} is {size} bytes but {} pointers are {width} bytes",
                        offset.0, self.architecture
                    )));
                }
                // Reserve first so self-referential pointers terminate.
                let id = state.types.push_unindexed(Type {
                    name: None,
                    kind: TypeKind::Pointer { pointee: None },
                });
                state.type_cache.insert((index, offset), Some(id));
                let pointee = self.resolve_type_attr(index, &entry, state, depth + 1)?;
                state.types.define(id, TypeKind::Pointer { pointee })?;
                Some(id)
            }
            constants::DW_TAG_array_type => match self.resolve_type_attr(index, &entry, state, depth + 1)? {
                Some(element) => {
                    let counts = self.subrange_counts(index, offset)?;
                    let mut id = element;
                    for count in counts.into_iter().rev() {
                        id = state.types.push(Type {
                            name: None,
                            kind: TypeKind::Array { element: id, count },
                        });
                    }
                    Some(id)
                }
                None => None,
            },
            constants::DW_TAG_structure_type | constants::DW_TAG_class_type | constants::DW_TAG_union_type => {
                let is_union = entry.tag() == constants::DW_TAG_union_type;
                let declaration_only = self.flag(&entry, constants::DW_AT_declaration)?;
                let id = if declaration_only {
                    state.types.push_unindexed(Type {
                        name,
                        kind: TypeKind::Struct {
                            size: 0,
                            fields: Vec::new(),
                            is_union,
                        },
                    })
                } else {
                    state.types.reserve(name)
                };
                state.type_cache.insert((index, offset), Some(id));
                if !declaration_only {
                    let fields = self.members(index, offset, is_union, state, depth)?;
                    state.types.define(
                        id,
                        TypeKind::Struct {
                            size: byte_size.unwrap_or(0),
                            fields,
                            is_union,
                        },
                    )?;
                }
                Some(id)
            }
            constants::DW_TAG_enumeration_type => {
                let enumerators = self.enumerators(index, offset)?;
                Some(state.types.push(Type {
                    name,
                    kind: TypeKind::Enum {
                        size: byte_size.unwrap_or(4),
                        enumerators,
                    },
                }))
            }
            constants::DW_TAG_typedef => {
                let target = self.resolve_type_attr(index, &entry, state, depth + 1)?;
                if let (Some(target), Some(name)) = (target, &name) {
                    state.types.alias(name, target);
                }
                target
            }
            constants::DW_TAG_const_type
            | constants::DW_TAG_volatile_type
            | constants::DW_TAG_restrict_type
            | constants::DW_TAG_atomic_type => self.resolve_type_attr(index, &entry, state, depth + 1)?,
            _ => None,
        };

        state.type_cache.insert((index, offset), resolved);
        Ok(resolved)
    }

    fn members(&self, index: usize, offset: UnitOffset, is_union: bool, state: &mut LoadState, depth: usize)
        -> Result<Vec<Field>>
    {
        let unit = &self.units[index];
        let mut tree = unit
            .entries_tree(Some(offset))
            .map_err(|err| self.error("reading aggregate members", err))?;
        let root = tree
            .root()
            .map_err(|err| self.error("reading aggregate members", err))?;
        let mut children = root.children();

        let mut fields = Vec::new();
        while let Some(child) = children
            .next()
            .map_err(|err| self.error("reading aggregate members", err))?
        {
            let entry = child.entry().clone();
            if entry.tag() != constants::DW_TAG_member || self.flag(&entry, constants::DW_AT_external)? {
                continue;
            }
            let Some(ty) = self.resolve_type_attr(index, &entry, state, depth + 1)? else {
                continue;
            };
            let name = self
                .string_attr(unit, &entry, constants::DW_AT_name)?
                .unwrap_or_default();
            let offset = if is_union {
                0
            } else {
                self.member_offset(index, &entry)?
            };
            fields.push(Field { name, ty, offset });
        }
        Ok(fields)
    }

    fn member_offset(&self, index: usize, entry: &OwnedEntry<'_, '_>) -> Result<u64>
    {
        if let Some(attr) = entry
            .attr(constants::DW_AT_data_member_location)
            .map_err(|err| self.error("reading member offset", err))?
        {
            if let Some(offset) = attr.udata_value() {
                return Ok(offset);
            }
            if let Some(expression) = attr.exprloc_value() {
                let mut operations = expression.operations(self.units[index].encoding());
                if let Some(Operation::PlusConstant { value }) = operations
                    .next()
                    .map_err(|err| self.error("decoding member offset", err))?
                {
                    return Ok(value);
                }
            }
            return Ok(0);
        }
        Ok(entry
            .attr(constants::DW_AT_data_bit_offset)
            .map_err(|err| self.error("reading member bit offset", err))?
            .and_then(|attr| attr.udata_value())
            .map_or(0, |bits| bits / 8))
    }

    /// Element counts of each array dimension, outermost first.
    ///
    /// A missing or `-1` upper bound is a zero-length (flexible) dimension.
    fn subrange_counts(&self, index: usize, offset: UnitOffset) -> Result<Vec<u64>>
    {
        let unit = &self.units[index];
        let mut tree = unit
            .entries_tree(Some(offset))
            .map_err(|err| self.error("reading array bounds", err))?;
        let root = tree.root().map_err(|err| self.error("reading array bounds", err))?;
        let mut children = root.children();

        let mut counts = Vec::new();
        while let Some(child) = children
            .next()
            .map_err(|err| self.error("reading array bounds", err))?
        {
            let entry = child.entry();
            if entry.tag() != constants::DW_TAG_subrange_type {
                continue;
            }
            if let Some(count) = entry
                .attr(constants::DW_AT_count)
                .map_err(|err| self.error("reading DW_AT_count", err))?
                .and_then(|attr| attr.udata_value())
            {
                counts.push(count);
                continue;
            }
            let upper = entry
                .attr(constants::DW_AT_upper_bound)
                .map_err(|err| self.error("reading DW_AT_upper_bound", err))?;
            let count = match upper {
                Some(attr) => match attr.value() {
                    AttributeValue::Sdata(bound) => u64::try_from(bound).map_or(0, |bound| bound + 1),
                    _ => match attr.udata_value() {
                        Some(bound) if bound == u64::MAX || bound == u64::from(u32::MAX) => 0,
                        Some(bound) => bound + 1,
                        None => 0,
                    },
                },
                None => 0,
            };
            counts.push(count);
        }
        if counts.is_empty() {
            counts.push(0);
        }
        Ok(counts)
    }

    fn enumerators(&self, index: usize, offset: UnitOffset) -> Result<Vec<Enumerator>>
    {
        let unit = &self.units[index];
        let mut tree = unit
            .entries_tree(Some(offset))
            .map_err(|err| self.error("reading enumerators", err))?;
        let root = tree.root().map_err(|err| self.error("reading enumerators", err))?;
        let mut children = root.children();

        let mut enumerators = Vec::new();
        while let Some(child) = children
            .next()
            .map_err(|err| self.error("reading enumerators", err))?
        {
            let entry = child.entry();
            if entry.tag() != constants::DW_TAG_enumerator {
                continue;
            }
            let Some(name) = self.string_attr(unit, entry, constants::DW_AT_name)? else {
                continue;
            };
            let value = entry
                .attr(constants::DW_AT_const_value)
                .map_err(|err| self.error("reading enumerator value", err))?
                .and_then(|attr| {
                    attr.sdata_value()
                        .or_else(|| attr.udata_value().and_then(|value| i64::try_from(value).ok()))
                })
                .unwrap_or(0);
            enumerators.push(Enumerator { name, value });
        }
        Ok(enumerators)
    }

    fn flag(&self, entry: &OwnedEntry<'_, '_>, name: constants::DwAt) -> Result<bool>
    {
        let value = entry
            .attr_value(name)
            .map_err(|err| self.error("reading flag attribute", err))?;
        Ok(matches!(value, Some(AttributeValue::Flag(true))))
    }

    fn string_attr(&self, unit: &Unit<OwnedReader>, entry: &OwnedEntry<'_, '_>, name: constants::DwAt)
        -> Result<Option<String>>
    {
        let value = entry
            .attr_value(name)
            .map_err(|err| self.error("reading string attribute", err))?;
        match value {
            Some(value) => self.attr_string(unit, value).map(Some),
            None => Ok(None),
        }
    }

    fn attr_string(&self, unit: &Unit<OwnedReader>, value: AttributeValue<OwnedReader>) -> Result<String>
    {
        let reader = self
            .dwarf
            .attr_string(unit, value)
            .map_err(|err| self.error("resolving string", err))?;
        self.reader_string(&reader)
    }

    fn reader_string(&self, reader: &OwnedReader) -> Result<String>
    {
        reader
            .to_string_lossy()
            .map(Cow::into_owned)
            .map_err(|err| self.error("decoding string", err))
    }
}
