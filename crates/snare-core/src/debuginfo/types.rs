//! Type descriptors.
//!
//! The set of type kinds is closed: scalars, pointers, arrays, structs (and
//! unions) and enums. Typedefs and cv-qualifiers are collapsed when types are
//! loaded, so every [`TypeId`] points straight at one of these shapes.
//! Aggregates refer to their members by [`TypeId`], which keeps
//! self-referential structs (`struct node { struct node *next; }`) finite.

use std::collections::HashMap;
use std::fmt::Write as _;

use crate::error::{Result, SnareError};
use crate::types::Architecture;

const MAX_TYPE_DEPTH: usize = 32;

/// Index of a type inside its module's [`TypeTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(usize);

impl TypeId
{
    /// Position in the owning table.
    #[must_use]
    pub const fn index(self) -> usize
    {
        self.0
    }
}

/// How the bits of a scalar are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarEncoding
{
    /// Two's complement integer.
    Signed,
    /// Unsigned integer.
    Unsigned,
    /// `_Bool` / `bool`.
    Boolean,
    /// IEEE 754 binary floating point.
    Float,
    /// `char` / `signed char`.
    SignedChar,
    /// `unsigned char`.
    UnsignedChar,
}

impl ScalarEncoding
{
    /// Returns `true` for the character encodings.
    #[must_use]
    pub const fn is_char(self) -> bool
    {
        matches!(self, ScalarEncoding::SignedChar | ScalarEncoding::UnsignedChar)
    }
}

/// Struct or union member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field
{
    /// Member name; anonymous members get an empty name.
    pub name: String,
    /// Member type.
    pub ty: TypeId,
    /// Byte offset from the start of the aggregate.
    pub offset: u64,
}

/// Named constant of an enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enumerator
{
    /// Constant name.
    pub name: String,
    /// Constant value.
    pub value: i64,
}

/// Shape of a type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind
{
    /// Integer, boolean, character or floating point value.
    Scalar
    {
        /// Bit interpretation.
        encoding: ScalarEncoding,
        /// Size in bytes.
        size: u64,
    },
    /// Pointer; its size is the architecture pointer width.
    Pointer
    {
        /// Pointee type, `None` for `void *`.
        pointee: Option<TypeId>,
    },
    /// Fixed-length array. A count of 0 is valid (`char padding[0]`).
    Array
    {
        /// Element type.
        element: TypeId,
        /// Number of elements.
        count: u64,
    },
    /// Struct, class or union with ordered members.
    Struct
    {
        /// Size in bytes.
        size: u64,
        /// Members in declaration order.
        fields: Vec<Field>,
        /// All members share offset 0.
        is_union: bool,
    },
    /// Enumeration.
    Enum
    {
        /// Size in bytes of the underlying integer.
        size: u64,
        /// Constants in declaration order.
        enumerators: Vec<Enumerator>,
    },
}

/// A named or anonymous type descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Type
{
    /// Declared name (`int`, `point_tag`, ...), `None` for anonymous types.
    pub name: Option<String>,
    /// Shape of the type.
    pub kind: TypeKind,
}

impl Type
{
    /// Returns `true` for pointer types.
    #[must_use]
    pub fn is_pointer(&self) -> bool
    {
        matches!(self.kind, TypeKind::Pointer { .. })
    }

    /// Returns `true` for character scalars.
    #[must_use]
    pub fn is_char(&self) -> bool
    {
        matches!(self.kind, TypeKind::Scalar { encoding, .. } if encoding.is_char())
    }
}

/// Owner of every type of a module.
#[derive(Debug, Clone, Default)]
pub struct TypeTable
{
    types: Vec<Type>,
    by_name: HashMap<String, TypeId>,
}

impl TypeTable
{
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Append a type and return its id. The first type defined under a given
    /// name is the one [`TypeTable::find`] returns.
    pub fn push(&mut self, ty: Type) -> TypeId
    {
        let id = TypeId(self.types.len());
        if let Some(name) = &ty.name {
            self.by_name.entry(name.clone()).or_insert(id);
        }
        self.types.push(ty);
        id
    }

    /// Append a type without making its name visible to [`TypeTable::find`].
    ///
    /// Used for forward declarations, so that a later full definition wins the
    /// name.
    pub fn push_unindexed(&mut self, ty: Type) -> TypeId
    {
        let id = TypeId(self.types.len());
        self.types.push(ty);
        id
    }

    /// Make `alias` (a typedef name) resolve to `target`.
    ///
    /// An anonymous target also takes the alias as its display name, which is
    /// how `typedef struct { ... } point;` ends up spelled `point`.
    pub fn alias(&mut self, alias: &str, target: TypeId)
    {
        self.by_name.entry(alias.to_string()).or_insert(target);
        if let Some(ty) = self.types.get_mut(target.0) {
            if ty.name.is_none() && matches!(ty.kind, TypeKind::Struct { .. } | TypeKind::Enum { .. }) {
                ty.name = Some(alias.to_string());
            }
        }
    }

    /// Reserve an id for an aggregate whose members are not known yet.
    ///
    /// The slot holds an empty struct until [`TypeTable::define`] fills it in.
    pub fn reserve(&mut self, name: Option<String>) -> TypeId
    {
        self.push(Type {
            name,
            kind: TypeKind::Struct {
                size: 0,
                fields: Vec::new(),
                is_union: false,
            },
        })
    }

    /// Replace the shape of a previously reserved type.
    ///
    /// ## Errors
    ///
    /// `NotFound` if `id` does not belong to this table.
    pub fn define(&mut self, id: TypeId, kind: TypeKind) -> Result<()>
    {
        let slot = self
            .types
            .get_mut(id.0)
            .ok_or_else(|| SnareError::not_found(format!("type #{}", id.0)))?;
        slot.kind = kind;
        Ok(())
    }

    /// Look up a type by id.
    #[must_use]
    pub fn get(&self, id: TypeId) -> Option<&Type>
    {
        self.types.get(id.0)
    }

    /// Look up a type by id, failing with `NotFound`.
    ///
    /// ## Errors
    ///
    /// `NotFound` if `id` does not belong to this table.
    pub fn ty(&self, id: TypeId) -> Result<&Type>
    {
        self.get(id)
            .ok_or_else(|| SnareError::not_found(format!("type #{}", id.0)))
    }

    /// Exact-name lookup. Never matches partially.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<TypeId>
    {
        self.by_name.get(name).copied()
    }

    /// Number of types.
    #[must_use]
    pub fn len(&self) -> usize
    {
        self.types.len()
    }

    /// Returns `true` if the table holds no types.
    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.types.is_empty()
    }

    /// Iterate over `(id, type)` pairs in definition order.
    pub fn iter(&self) -> impl Iterator<Item = (TypeId, &Type)>
    {
        self.types.iter().enumerate().map(|(index, ty)| (TypeId(index), ty))
    }

    /// Every id referenced by a type must exist in the table.
    ///
    /// ## Errors
    ///
    /// `InvalidArgument` naming the first dangling reference.
    pub fn validate(&self) -> Result<()>
    {
        let check = |owner: usize, target: TypeId| {
            if target.0 < self.types.len() {
                Ok(())
            } else {
                Err(SnareError::invalid_argument(format!(
                    "type #{owner} refers to unknown type #{}",
                    target.0
                )))
            }
        };
        for (index, ty) in self.types.iter().enumerate() {
            match &ty.kind {
                TypeKind::Pointer { pointee: Some(target) } => check(index, *target)?,
                TypeKind::Array { element, .. } => check(index, *element)?,
                TypeKind::Struct { fields, .. } => {
                    for field in fields {
                        check(index, field.ty)?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Size in bytes of a value of type `id` on `arch`.
    ///
    /// Pointers are always exactly the architecture pointer width, whatever
    /// they point to.
    ///
    /// ## Errors
    ///
    /// `NotFound` for unknown ids, `ArchitectureMismatch` if array sizes overflow.
    pub fn byte_size(&self, id: TypeId, arch: Architecture) -> Result<u64>
    {
        self.byte_size_at_depth(id, arch, 0)
    }

    fn byte_size_at_depth(&self, id: TypeId, arch: Architecture, depth: usize) -> Result<u64>
    {
        if depth >= MAX_TYPE_DEPTH {
            return Err(SnareError::ArchitectureMismatch(format!("type #{} nests too deeply", id.0)));
        }
        Ok(match &self.ty(id)?.kind {
            TypeKind::Scalar { size, .. } | TypeKind::Struct { size, .. } | TypeKind::Enum { size, .. } => *size,
            TypeKind::Pointer { .. } => u64::from(arch.pointer_size_bytes()),
            TypeKind::Array { element, count } => {
                let element_size = self.byte_size_at_depth(*element, arch, depth + 1)?;
                element_size.checked_mul(*count).ok_or_else(|| {
                    SnareError::ArchitectureMismatch(format!("array type #{} overflows the address space", id.0))
                })?
            }
        })
    }

    /// C spelling of a type: `int`, `char *`, `char *[7]`, `int [2][3]`.
    #[must_use]
    pub fn name_of(&self, id: TypeId) -> String
    {
        self.name_at_depth(id, 0)
    }

    fn name_at_depth(&self, id: TypeId, depth: usize) -> String
    {
        let Some(ty) = self.get(id) else {
            return "<invalid type>".to_string();
        };
        if depth >= MAX_TYPE_DEPTH {
            return "...".to_string();
        }
        match &ty.kind {
            TypeKind::Scalar { .. } => ty.name.clone().unwrap_or_else(|| "<anonymous scalar>".to_string()),
            TypeKind::Struct { is_union, .. } => ty.name.clone().unwrap_or_else(|| {
                if *is_union {
                    "(anonymous union)".to_string()
                } else {
                    "(anonymous struct)".to_string()
                }
            }),
            TypeKind::Enum { .. } => ty.name.clone().unwrap_or_else(|| "(anonymous enum)".to_string()),
            TypeKind::Pointer { pointee } => {
                let Some(pointee) = pointee else {
                    return "void *".to_string();
                };
                let (base, dims) = self.split_array(*pointee, depth + 1);
                if dims.is_empty() {
                    join_pointer(&base)
                } else {
                    format!("{base} (*){dims}")
                }
            }
            TypeKind::Array { .. } => {
                let (base, dims) = self.split_array(id, depth + 1);
                if base.ends_with('*') {
                    format!("{base}{dims}")
                } else {
                    format!("{base} {dims}")
                }
            }
        }
    }

    /// Split nested arrays into the innermost element spelling and the `[N]...` suffix.
    fn split_array(&self, id: TypeId, depth: usize) -> (String, String)
    {
        let mut dims = String::new();
        let mut current = id;
        let mut guard = depth;
        while let Some(Type {
            kind: TypeKind::Array { element, count },
            ..
        }) = self.get(current)
        {
            let _ = write!(dims, "[{count}]");
            current = *element;
            guard += 1;
            if guard >= MAX_TYPE_DEPTH {
                break;
            }
        }
        (self.name_at_depth(current, guard), dims)
    }

    /// Declaration of a member or variable named `name` of type `id`
    ///
    /// ```rust
    /// use snare_core::debuginfo::{ScalarEncoding, Type, TypeKind, TypeTable};
    ///
    /// let mut table = TypeTable::new();
    /// let char_ty = table.push(Type {
    ///     name: Some("char".into()),
    ///     kind: TypeKind::Scalar { encoding: ScalarEncoding::SignedChar, size: 1 },
    /// });
    /// let padding = table.push(Type { name: None, kind: TypeKind::Array { element: char_ty, count: 0 } });
    /// assert_eq!(table.declaration(padding, "padding"), "char padding[0]");
    /// ```
    #[must_use]
    pub fn declaration(&self, id: TypeId, name: &str) -> String
    {
        let (base, dims) = self.split_array(id, 0);
        if base.ends_with('*') {
            format!("{base}{name}{dims}")
        } else {
            format!("{base} {name}{dims}")
        }
    }

    /// Multi-line C declaration of a type, as printed by `image lookup -t`.
    ///
    /// Aggregates list their members, enums their constants; every other
    /// kind renders as its spelling.
    #[must_use]
    pub fn describe(&self, id: TypeId) -> String
    {
        let Some(ty) = self.get(id) else {
            return "<invalid type>".to_string();
        };
        match &ty.kind {
            TypeKind::Struct { fields, is_union, .. } => {
                let keyword = if *is_union { "union" } else { "struct" };
                let mut out = match &ty.name {
                    Some(name) => format!("{keyword} {name} {{\n"),
                    None => format!("{keyword} {{\n"),
                };
                for field in fields {
                    let _ = writeln!(out, "    {};", self.declaration(field.ty, &field.name));
                }
                out.push('}');
                out
            }
            TypeKind::Enum { enumerators, .. } => {
                let mut out = match &ty.name {
                    Some(name) => format!("enum {name} {{\n"),
                    None => "enum {\n".to_string(),
                };
                for enumerator in enumerators {
                    let _ = writeln!(out, "    {} = {},", enumerator.name, enumerator.value);
                }
                out.push('}');
                out
            }
            _ => self.name_of(id),
        }
    }

    /// Type reached by dereferencing pointers and stripping arrays until a
    /// non-pointer, non-array type remains.
    #[must_use]
    pub fn innermost(&self, id: TypeId) -> TypeId
    {
        let mut current = id;
        for _ in 0..MAX_TYPE_DEPTH {
            match self.get(current).map(|ty| &ty.kind) {
                Some(TypeKind::Pointer { pointee: Some(next) } | TypeKind::Array { element: next, .. }) => {
                    current = *next;
                }
                _ => break,
            }
        }
        current
    }
}

fn join_pointer(base: &str) -> String
{
    if base.ends_with('*') {
        format!("{base}*")
    } else {
        format!("{base} *")
    }
}
