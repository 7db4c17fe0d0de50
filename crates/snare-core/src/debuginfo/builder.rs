//! # Module Builder
//!
//! Programmatic construction of a [`Module`] from pre-parsed debug
//! information.
//!
//! Struct layouts are computed with natural C alignment for the module's
//! architecture unless explicit offsets are given, so fixtures read like the C
//! they describe.
//!
//! ## Example
//!
//! ```rust
//! use snare_core::debuginfo::{ModuleBuilder, ScalarEncoding};
//! use snare_core::types::Architecture;
//!
//! let mut builder = ModuleBuilder::new("a.out", Architecture::X86_64);
//! let int = builder.scalar("int", ScalarEncoding::Signed, 4);
//! let char_ty = builder.scalar("char", ScalarEncoding::SignedChar, 1);
//! let padding = builder.array(char_ty, 0);
//! let point = builder.structure("point_tag", &[("x", int), ("y", int), ("padding", padding)]);
//! builder.global("g_my_int", int, 0x4000);
//! let module = builder.build()?;
//!
//! assert_eq!(module.find_type("point_tag")?, point);
//! assert_eq!(module.byte_size(point)?, 8);
//! # Ok::<(), snare_core::error::SnareError>(())
//! ```

use std::path::PathBuf;

use super::types::{Enumerator, Field, ScalarEncoding, Type, TypeId, TypeKind, TypeTable};
use super::{CompileUnit, Function, LineEntry, Module, ModuleParts, Variable, VariableLocation, VariableScope};
use crate::error::{Result, SnareError};
use crate::types::{Address, AddressRange, Architecture, SourceLocation, Symbol, SymbolKind, SymbolName};

/// Handle to a function added with [`ModuleBuilder::function`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionHandle(usize);

/// Incrementally assembles a [`Module`].
#[derive(Debug)]
pub struct ModuleBuilder
{
    path: PathBuf,
    architecture: Architecture,
    compile_units: Vec<CompileUnit>,
    types: TypeTable,
    functions: Vec<Function>,
    globals: Vec<Variable>,
    symbols: Vec<Symbol>,
    lines: Vec<LineEntry>,
    errors: Vec<SnareError>,
}

impl ModuleBuilder
{
    /// Start a module named `path` for `architecture`.
    pub fn new(path: impl Into<PathBuf>, architecture: Architecture) -> Self
    {
        Self {
            path: path.into(),
            architecture,
            compile_units: Vec::new(),
            types: TypeTable::new(),
            functions: Vec::new(),
            globals: Vec::new(),
            symbols: Vec::new(),
            lines: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Architecture the module is being built for.
    #[must_use]
    pub fn architecture(&self) -> Architecture
    {
        self.architecture
    }

    /// Record a compile unit.
    pub fn compile_unit(&mut self, name: impl Into<String>) -> &mut Self
    {
        self.compile_units.push(CompileUnit {
            name: name.into(),
            producer: None,
        });
        self
    }

    /// Add a scalar type.
    pub fn scalar(&mut self, name: &str, encoding: ScalarEncoding, size: u64) -> TypeId
    {
        self.types.push(Type {
            name: Some(name.to_string()),
            kind: TypeKind::Scalar { encoding, size },
        })
    }

    /// Add a pointer to `pointee`.
    pub fn pointer(&mut self, pointee: TypeId) -> TypeId
    {
        self.types.push(Type {
            name: None,
            kind: TypeKind::Pointer { pointee: Some(pointee) },
        })
    }

    /// Add `void *`.
    pub fn void_pointer(&mut self) -> TypeId
    {
        self.types.push(Type {
            name: None,
            kind: TypeKind::Pointer { pointee: None },
        })
    }

    /// Add a pointer whose debug information declared an explicit byte size
    ///
    /// A size other than the architecture pointer width makes
    /// [`ModuleBuilder::build`] fail with `ArchitectureMismatch`.
    pub fn pointer_with_size(&mut self, pointee: Option<TypeId>, byte_size: u64) -> TypeId
    {
        let width = u64::from(self.architecture.pointer_size_bytes());
        if byte_size != width {
            self.errors.push(SnareError::ArchitectureMismatch(format!(
                "pointer declared with {byte_size} bytes on {} ({width}-byte pointers)",
                self.architecture
            )));
        }
        self.types.push(Type {
            name: None,
            kind: TypeKind::Pointer { pointee },
        })
    }

    /// Add an array of `count` elements; `count` may be 0.
    pub fn array(&mut self, element: TypeId, count: u64) -> TypeId
    {
        self.types.push(Type {
            name: None,
            kind: TypeKind::Array { element, count },
        })
    }

    /// Add a struct laid out with natural alignment.
    pub fn structure(&mut self, name: &str, fields: &[(&str, TypeId)]) -> TypeId
    {
        let id = self.declare_struct(name);
        self.define_struct(id, fields);
        id
    }

    /// Add an anonymous struct laid out with natural alignment.
    pub fn anonymous_structure(&mut self, fields: &[(&str, TypeId)]) -> TypeId
    {
        let id = self.types.reserve(None);
        self.define_struct(id, fields);
        id
    }

    /// Add a struct with explicit member offsets and size.
    pub fn structure_with_layout(&mut self, name: &str, size: u64, fields: &[(&str, TypeId, u64)]) -> TypeId
    {
        let fields = fields
            .iter()
            .map(|(field_name, ty, offset)| Field {
                name: (*field_name).to_string(),
                ty: *ty,
                offset: *offset,
            })
            .collect();
        self.types.push(Type {
            name: Some(name.to_string()),
            kind: TypeKind::Struct {
                size,
                fields,
                is_union: false,
            },
        })
    }

    /// Reserve a named struct so members can point back at it.
    pub fn declare_struct(&mut self, name: &str) -> TypeId
    {
        self.types.reserve(Some(name.to_string()))
    }

    /// Fill in a struct reserved with [`ModuleBuilder::declare_struct`].
    pub fn define_struct(&mut self, id: TypeId, fields: &[(&str, TypeId)]) -> &mut Self
    {
        let kind = self.layout(fields, false);
        if let Err(err) = self.types.define(id, kind) {
            self.errors.push(err);
        }
        self
    }

    /// Add a union; every member sits at offset 0.
    pub fn union(&mut self, name: &str, fields: &[(&str, TypeId)]) -> TypeId
    {
        let kind = self.layout(fields, true);
        self.types.push(Type {
            name: Some(name.to_string()),
            kind,
        })
    }

    /// Add an enumeration backed by an integer of `size` bytes.
    pub fn enumeration(&mut self, name: &str, size: u64, enumerators: &[(&str, i64)]) -> TypeId
    {
        let enumerators = enumerators
            .iter()
            .map(|(enumerator, value)| Enumerator {
                name: (*enumerator).to_string(),
                value: *value,
            })
            .collect();
        self.types.push(Type {
            name: Some(name.to_string()),
            kind: TypeKind::Enum { size, enumerators },
        })
    }

    /// Add an external global at `address`, with a data symbol of the same name.
    pub fn global(&mut self, name: &str, ty: TypeId, address: u64) -> Address
    {
        self.static_variable(name, ty, address, VariableScope::Global)
    }

    /// Add a file-scope `static` at `address`, with a data symbol of the same name.
    pub fn file_static(&mut self, name: &str, ty: TypeId, address: u64) -> Address
    {
        self.static_variable(name, ty, address, VariableScope::FileStatic)
    }

    fn static_variable(&mut self, name: &str, ty: TypeId, address: u64, scope: VariableScope) -> Address
    {
        let address = Address::new(address);
        self.globals.push(Variable {
            name: name.to_string(),
            ty,
            location: VariableLocation::Static(address),
            scope,
            decl: None,
        });
        // Size is filled in by `build`, once every type is defined.
        self.symbols.push(Symbol {
            name: SymbolName::plain(name),
            address,
            size: 0,
            kind: SymbolKind::Data,
        });
        address
    }

    /// Add a function covering `[low, high)` declared at `file:decl_line`.
    pub fn function(&mut self, name: &str, low: u64, high: u64, file: &str, decl_line: u32) -> FunctionHandle
    {
        let range = AddressRange::new(Address::new(low), Address::new(high));
        self.functions.push(Function {
            name: name.to_string(),
            range,
            decl: Some(SourceLocation::new(file, decl_line)),
            parameters: Vec::new(),
            locals: Vec::new(),
        });
        self.symbols.push(Symbol {
            name: SymbolName::plain(name),
            address: range.start,
            size: range.len(),
            kind: SymbolKind::Code,
        });
        FunctionHandle(self.functions.len() - 1)
    }

    /// Add a parameter stored at `frame_offset` from the frame base.
    pub fn parameter(&mut self, function: FunctionHandle, name: &str, ty: TypeId, frame_offset: i64) -> &mut Self
    {
        self.frame_variable(function, name, ty, frame_offset, VariableScope::Parameter)
    }

    /// Add a local stored at `frame_offset` from the frame base.
    pub fn local(&mut self, function: FunctionHandle, name: &str, ty: TypeId, frame_offset: i64) -> &mut Self
    {
        self.frame_variable(function, name, ty, frame_offset, VariableScope::Local)
    }

    fn frame_variable(
        &mut self,
        function: FunctionHandle,
        name: &str,
        ty: TypeId,
        frame_offset: i64,
        scope: VariableScope,
    ) -> &mut Self
    {
        let Some(target) = self.functions.get_mut(function.0) else {
            self.errors
                .push(SnareError::invalid_argument(format!("unknown function handle for '{name}'")));
            return self;
        };
        let variable = Variable {
            name: name.to_string(),
            ty,
            location: VariableLocation::FrameOffset(frame_offset),
            scope,
            decl: None,
        };
        if scope == VariableScope::Parameter {
            target.parameters.push(variable);
        } else {
            target.locals.push(variable);
        }
        self
    }

    /// Add a line entry `file:line` covering `[start, end)`.
    pub fn line(&mut self, file: &str, line: u32, start: u64, end: u64) -> &mut Self
    {
        self.lines.push(LineEntry {
            file: file.to_string(),
            line,
            column: None,
            range: AddressRange::new(Address::new(start), Address::new(end)),
        });
        self
    }

    /// Add a run of line entries for one file: `(line, start, end)` triples.
    pub fn lines(&mut self, file: &str, rows: &[(u32, u64, u64)]) -> &mut Self
    {
        for (line, start, end) in rows {
            self.line(file, *line, *start, *end);
        }
        self
    }

    /// Add a raw symbol table entry.
    pub fn symbol(&mut self, name: &str, address: u64, size: u64, kind: SymbolKind) -> &mut Self
    {
        self.symbols.push(Symbol {
            name: SymbolName::demangle(name),
            address: Address::new(address),
            size,
            kind,
        });
        self
    }

    /// Finish the module.
    ///
    /// ## Errors
    ///
    /// - `ArchitectureMismatch` for pointer sizes that disagree with the architecture
    /// - `InvalidArgument` for dangling type references or bad handles
    pub fn build(self) -> Result<Module>
    {
        if let Some(err) = self.errors.into_iter().next() {
            return Err(err);
        }
        self.types.validate()?;

        let mut symbols = self.symbols;
        for symbol in &mut symbols {
            if symbol.kind != SymbolKind::Data || symbol.size != 0 {
                continue;
            }
            if let Some(global) = self.globals.iter().find(|global| {
                global.name == symbol.name.raw() && global.location == VariableLocation::Static(symbol.address)
            }) {
                symbol.size = self.types.byte_size(global.ty, self.architecture)?;
            }
        }

        let mut compile_units = self.compile_units;
        if compile_units.is_empty() {
            let mut seen: Vec<&str> = Vec::new();
            for entry in &self.lines {
                if !seen.contains(&entry.file.as_str()) {
                    seen.push(&entry.file);
                }
            }
            compile_units = seen
                .into_iter()
                .map(|name| CompileUnit {
                    name: name.to_string(),
                    producer: None,
                })
                .collect();
        }

        Module::from_parts(ModuleParts {
            path: self.path,
            architecture: Some(self.architecture),
            compile_units,
            types: self.types,
            functions: self.functions,
            globals: self.globals,
            symbols,
            lines: self.lines,
        })
    }

    fn alignment(&self, id: TypeId, depth: usize) -> u64
    {
        if depth > 16 {
            return 1;
        }
        match self.types.get(id).map(|ty| &ty.kind) {
            Some(TypeKind::Scalar { size, .. } | TypeKind::Enum { size, .. }) => (*size).clamp(1, 8),
            Some(TypeKind::Pointer { .. }) => u64::from(self.architecture.pointer_size_bytes()),
            Some(TypeKind::Array { element, .. }) => self.alignment(*element, depth + 1),
            Some(TypeKind::Struct { fields, .. }) => fields
                .iter()
                .map(|field| self.alignment(field.ty, depth + 1))
                .max()
                .unwrap_or(1),
            None => 1,
        }
    }

    fn layout(&mut self, fields: &[(&str, TypeId)], is_union: bool) -> TypeKind
    {
        let mut offset = 0u64;
        let mut size = 0u64;
        let mut max_align = 1u64;
        let mut laid_out = Vec::with_capacity(fields.len());
        for (name, ty) in fields {
            let align = self.alignment(*ty, 0);
            max_align = max_align.max(align);
            let field_size = match self.types.byte_size(*ty, self.architecture) {
                Ok(field_size) => field_size,
                Err(err) => {
                    self.errors.push(err);
                    0
                }
            };
            let field_offset = if is_union { 0 } else { offset.next_multiple_of(align) };
            laid_out.push(Field {
                name: (*name).to_string(),
                ty: *ty,
                offset: field_offset,
            });
            offset = field_offset + field_size;
            size = size.max(offset);
        }
        TypeKind::Struct {
            size: size.next_multiple_of(max_align),
            fields: laid_out,
            is_union,
        }
    }
}
