//! # Value Introspection
//!
//! An [`Inspector`] turns variables of a stopped frame into [`Value`]s and
//! navigates them: children by index or name, pointer dereference, expression
//! paths. It also renders scalars ([`Inspector::raw_value`]) and strings
//! ([`Inspector::summary`]).
//!
//! Every value is backed by inferior memory at a fixed address; nothing is
//! cached, so reading a value twice during one stop gives the same answer and
//! reading it after a resume is refused. Values and frames carry the
//! generation of the stop they were created in, and every call checks it.
//!
//! Child resolution is index based over the closed set of type kinds:
//!
//! | kind        | children                                               |
//! |-------------|--------------------------------------------------------|
//! | array       | `[0] .. [count)`                                       |
//! | struct      | fields in declaration order                            |
//! | pointer     | `*name` at index 0; `[i]` (pointer arithmetic) beyond  |
//! | `void *`    | none                                                   |
//! | scalar/enum | none                                                   |

pub mod format;
pub mod path;

use crate::config::EngineConfig;
use crate::debuginfo::{Module, ScalarEncoding, TypeId, TypeKind, Variable, VariableLocation, VariableScope};
use crate::error::{Result, SnareError};
use crate::frames::Frame;
use crate::inferior::MemoryReader;
use crate::memory::{escape_byte, quote_bytes, read_c_string, read_uint_le, sign_extend};
use crate::types::{Address, Generation, Symbol};
use path::PathComponent;

/// How a value was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueOrigin
{
    /// A variable found by name.
    Variable(VariableScope),
    /// A struct member.
    Member,
    /// An array element.
    Element,
    /// The target of a pointer, including synthetic `[i]` children.
    Pointee,
    /// Memory reinterpreted at a raw address.
    Address,
}

/// A typed view of inferior memory at one stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value
{
    name: String,
    ty: TypeId,
    address: Address,
    generation: Generation,
    origin: ValueOrigin,
}

impl Value
{
    #[must_use]
    pub fn name(&self) -> &str
    {
        &self.name
    }

    #[must_use]
    pub fn type_id(&self) -> TypeId
    {
        self.ty
    }

    /// Address of the value's storage.
    #[must_use]
    pub fn address(&self) -> Address
    {
        self.address
    }

    #[must_use]
    pub fn generation(&self) -> Generation
    {
        self.generation
    }

    #[must_use]
    pub fn origin(&self) -> ValueOrigin
    {
        self.origin
    }
}

/// Reads values of a stopped process.
///
/// Obtained from [`crate::session::Session::inspector`].
pub struct Inspector<'a>
{
    module: &'a Module,
    memory: &'a dyn MemoryReader,
    generation: Generation,
    config: &'a EngineConfig,
}

impl std::fmt::Debug for Inspector<'_>
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("Inspector")
            .field("module", &self.module.name())
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl<'a> Inspector<'a>
{
    pub(crate) fn new(
        module: &'a Module,
        memory: &'a dyn MemoryReader,
        generation: Generation,
        config: &'a EngineConfig,
    ) -> Self
    {
        Self {
            module,
            memory,
            generation,
            config,
        }
    }

    /// Generation values produced by this inspector carry.
    #[must_use]
    pub fn generation(&self) -> Generation
    {
        self.generation
    }

    #[must_use]
    pub fn module(&self) -> &'a Module
    {
        self.module
    }

    fn check(&self, generation: Generation, what: &str) -> Result<()>
    {
        if generation == self.generation {
            Ok(())
        } else {
            Err(SnareError::invalid_state(format!(
                "{what} belongs to stop {generation}, the process is at {}",
                self.generation
            )))
        }
    }

    fn check_value(&self, value: &Value) -> Result<()>
    {
        self.check(value.generation, &format!("value '{}'", value.name))
    }

    fn make(&self, name: String, ty: TypeId, address: Address, origin: ValueOrigin) -> Value
    {
        Value {
            name,
            ty,
            address,
            generation: self.generation,
            origin,
        }
    }

    fn pointer_width(&self) -> u8
    {
        self.module.architecture().pointer_size_bytes()
    }

    fn kind(&self, value: &Value) -> Result<&'a TypeKind>
    {
        Ok(&self.module.type_info(value.ty)?.kind)
    }

    fn bind(&self, variable: &Variable, frame_base: Option<Address>) -> Result<Value>
    {
        let address = match (variable.location, frame_base) {
            (VariableLocation::Static(address), _) => address,
            (VariableLocation::FrameOffset(offset), Some(base)) => base.checked_offset(offset).ok_or_else(|| {
                SnareError::invalid_argument(format!("frame offset {offset} of '{}' overflows", variable.name))
            })?,
            (VariableLocation::FrameOffset(_), None) => {
                return Err(SnareError::invalid_state(format!("'{}' needs a frame", variable.name)));
            }
        };
        Ok(self.make(
            variable.name.clone(),
            variable.ty,
            address,
            ValueOrigin::Variable(variable.scope),
        ))
    }

    /// Find a variable visible from `frame`: its function's parameters and
    /// locals first, then globals.
    ///
    /// ## Errors
    ///
    /// `InvalidState` for a stale frame, `NotFound` if nothing has that name.
    pub fn find_variable(&self, frame: &Frame, name: &str) -> Result<Value>
    {
        self.check(frame.generation(), &format!("frame #{}", frame.index()))?;
        if let Some(function) = self.module.function_at(frame.lookup_address()) {
            if let Some(variable) = function.variables().find(|variable| variable.name == name) {
                return self.bind(variable, Some(frame.frame_base()));
            }
        }
        match self.module.find_globals(name) {
            Ok(globals) => match globals.first() {
                Some(global) => self.bind(global, None),
                None => Err(SnareError::not_found(format!("variable '{name}'"))),
            },
            Err(SnareError::NotFound(_)) => Err(SnareError::not_found(format!(
                "variable '{name}' in frame #{}",
                frame.index()
            ))),
            Err(err) => Err(err),
        }
    }

    /// Every global or file static named `name`, in declaration order.
    ///
    /// ## Errors
    ///
    /// `NotFound` if there is none.
    pub fn global_variables(&self, name: &str) -> Result<Vec<Value>>
    {
        self.module
            .find_globals(name)?
            .into_iter()
            .map(|global| self.bind(global, None))
            .collect()
    }

    /// Number of children; see the module documentation.
    ///
    /// ## Errors
    ///
    /// `InvalidState` for a stale value.
    pub fn child_count(&self, value: &Value) -> Result<usize>
    {
        self.check_value(value)?;
        Ok(match self.kind(value)? {
            TypeKind::Array { count, .. } => usize::try_from(*count).unwrap_or(usize::MAX),
            TypeKind::Struct { fields, .. } => fields.len(),
            TypeKind::Pointer { pointee: Some(_) } => 1,
            TypeKind::Pointer { pointee: None } | TypeKind::Scalar { .. } | TypeKind::Enum { .. } => 0,
        })
    }

    /// Child at `index`.
    ///
    /// For a pointer, index 0 is the pointee and any larger index is the
    /// element that far past it, as if the pointer were an array.
    ///
    /// ## Errors
    ///
    /// `InvalidState` for a stale value; `NotFound` when there is no such
    /// child; `MemoryAccess` if a pointer cannot be read.
    pub fn child_at(&self, value: &Value, index: usize) -> Result<Value>
    {
        self.check_value(value)?;
        let missing = || SnareError::not_found(format!("child {index} of '{}'", value.name));
        match self.kind(value)? {
            TypeKind::Array { element, count } => {
                if index as u64 >= *count {
                    return Err(missing());
                }
                let address = self.element_address(value.address, *element, index)?;
                Ok(self.make(format!("[{index}]"), *element, address, ValueOrigin::Element))
            }
            TypeKind::Struct { fields, .. } => {
                let field = fields.get(index).ok_or_else(missing)?;
                Ok(self.make(
                    field.name.clone(),
                    field.ty,
                    value.address + field.offset,
                    ValueOrigin::Member,
                ))
            }
            TypeKind::Pointer { pointee: Some(pointee) } => {
                let target = self.read_pointer(value.address)?;
                let address = self.element_address(target, *pointee, index)?;
                let name = if index == 0 {
                    format!("*{}", value.name)
                } else {
                    format!("[{index}]")
                };
                Ok(self.make(name, *pointee, address, ValueOrigin::Pointee))
            }
            _ => Err(missing()),
        }
    }

    fn element_address(&self, base: Address, element: TypeId, index: usize) -> Result<Address>
    {
        let stride = self.module.byte_size(element)?;
        stride
            .checked_mul(index as u64)
            .and_then(|offset| base.checked_add(offset))
            .ok_or_else(|| SnareError::invalid_argument(format!("element {index} lies outside the address space")))
    }

    /// Member named `name`. Pointers to structs are looked through, and
    /// members of anonymous nested structs and unions are found too.
    ///
    /// ## Errors
    ///
    /// `InvalidState` for a stale value, `NotFound` if there is no such member.
    pub fn child_by_name(&self, value: &Value, name: &str) -> Result<Value>
    {
        self.check_value(value)?;
        let base = match self.kind(value)? {
            TypeKind::Pointer { pointee: Some(_) } => self.child_at(value, 0)?,
            _ => value.clone(),
        };
        self.find_member(&base, name, 0)?
            .ok_or_else(|| SnareError::not_found(format!("member '{name}' of '{}'", value.name)))
    }

    fn find_member(&self, value: &Value, name: &str, depth: usize) -> Result<Option<Value>>
    {
        let TypeKind::Struct { fields, .. } = self.kind(value)? else {
            return Ok(None);
        };
        if let Some(field) = fields.iter().find(|field| field.name == name) {
            return Ok(Some(self.make(
                field.name.clone(),
                field.ty,
                value.address + field.offset,
                ValueOrigin::Member,
            )));
        }
        if depth >= 8 {
            return Ok(None);
        }
        for field in fields.iter().filter(|field| field.name.is_empty()) {
            let anonymous = self.make(String::new(), field.ty, value.address + field.offset, ValueOrigin::Member);
            if let Some(found) = self.find_member(&anonymous, name, depth + 1)? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    /// The pointee of a pointer value.
    ///
    /// ## Errors
    ///
    /// `InvalidArgument` if `value` is not a typed pointer; see [`Inspector::child_at`].
    pub fn dereference(&self, value: &Value) -> Result<Value>
    {
        self.check_value(value)?;
        match self.kind(value)? {
            TypeKind::Pointer { pointee: Some(_) } => self.child_at(value, 0),
            TypeKind::Pointer { pointee: None } => Err(SnareError::invalid_argument(format!(
                "cannot dereference '{}': it is a void pointer",
                value.name
            ))),
            _ => Err(SnareError::invalid_argument(format!(
                "cannot dereference '{}': it is not a pointer",
                value.name
            ))),
        }
    }

    /// Navigate an expression path such as `[5]`, `.field`, `->next` or `*[1]`.
    ///
    /// `[N]` on a pointer is the same child as `child_at(value, N)`.
    ///
    /// ## Errors
    ///
    /// `InvalidArgument` for malformed paths or steps that do not apply to
    /// the current type; `NotFound` for missing members or indexes.
    pub fn value_for_expression_path(&self, value: &Value, expression: &str) -> Result<Value>
    {
        self.check_value(value)?;
        let parsed = path::parse(expression)?;
        let mut current = value.clone();
        for component in &parsed.components {
            current = match component {
                PathComponent::Index(index) => {
                    let index = usize::try_from(*index)
                        .map_err(|_| SnareError::invalid_argument(format!("index {index} is too large")))?;
                    match self.kind(&current)? {
                        TypeKind::Array { .. } | TypeKind::Pointer { pointee: Some(_) } => {
                            self.child_at(&current, index)?
                        }
                        _ => {
                            return Err(SnareError::invalid_argument(format!(
                                "'{}' cannot be indexed",
                                current.name
                            )));
                        }
                    }
                }
                PathComponent::Field(name) => {
                    if self.module.type_info(current.ty)?.is_pointer() {
                        return Err(SnareError::invalid_argument(format!(
                            "'{}' is a pointer; use '->{name}'",
                            current.name
                        )));
                    }
                    self.child_by_name(&current, name)?
                }
                PathComponent::Arrow(name) => {
                    let pointee = self.dereference(&current)?;
                    self.child_by_name(&pointee, name)?
                }
            };
        }
        if parsed.dereference {
            current = self.dereference(&current)?;
        }
        Ok(current)
    }

    /// Size of the value; pointers are exactly the architecture pointer width.
    ///
    /// ## Errors
    ///
    /// `InvalidState` for a stale value.
    pub fn byte_size(&self, value: &Value) -> Result<u64>
    {
        self.check_value(value)?;
        self.module.byte_size(value.ty)
    }

    /// Bytes of the value.
    ///
    /// ## Errors
    ///
    /// `InvalidState` for a stale value, `MemoryAccess` if unreadable.
    pub fn read_bytes(&self, value: &Value) -> Result<Vec<u8>>
    {
        let size = self.byte_size(value)?;
        let len = usize::try_from(size)
            .map_err(|_| SnareError::invalid_argument(format!("'{}' is too large to read", value.name)))?;
        if len == 0 {
            return Ok(Vec::new());
        }
        self.memory.read_memory(value.address, len)
    }

    fn read_pointer(&self, address: Address) -> Result<Address>
    {
        let bytes = self
            .memory
            .read_memory(address, usize::from(self.pointer_width()))?;
        Ok(Address::new(read_uint_le(&bytes)))
    }

    /// Scalar rendering of the value; `None` for structs and arrays.
    ///
    /// Integers are decimal, booleans `true`/`false`, characters quoted,
    /// enums by enumerator name and pointers as zero-padded hex.
    ///
    /// ## Errors
    ///
    /// `InvalidState` for a stale value, `MemoryAccess` if unreadable.
    pub fn raw_value(&self, value: &Value) -> Result<Option<String>>
    {
        self.check_value(value)?;
        let kind = self.kind(value)?;
        if matches!(kind, TypeKind::Array { .. } | TypeKind::Struct { .. }) {
            return Ok(None);
        }
        let bytes = self.read_bytes(value)?;
        let raw = read_uint_le(&bytes);
        let text = match kind {
            TypeKind::Pointer { .. } => Address::new(raw).to_padded_hex(self.pointer_width()),
            TypeKind::Enum { enumerators, .. } => {
                let signed = sign_extend(raw, bytes.len());
                enumerators
                    .iter()
                    .find(|enumerator| enumerator.value == signed)
                    .map_or_else(|| signed.to_string(), |enumerator| enumerator.name.clone())
            }
            TypeKind::Scalar { encoding, .. } => render_scalar(*encoding, &bytes, raw),
            TypeKind::Array { .. } | TypeKind::Struct { .. } => return Ok(None),
        };
        Ok(Some(text))
    }

    /// String summary for `char *` and `char[N]` values.
    ///
    /// Pointers are followed up to the first NUL, bounded by the configured
    /// summary length; arrays stop at their first NUL or their end.
    /// Null and unreadable pointers have no summary.
    ///
    /// ## Errors
    ///
    /// `InvalidState` for a stale value, `MemoryAccess` if a char array is unreadable.
    pub fn summary(&self, value: &Value) -> Result<Option<String>>
    {
        self.check_value(value)?;
        let types = self.module.types();
        match self.kind(value)? {
            TypeKind::Pointer { pointee: Some(pointee) } if types.get(*pointee).is_some_and(|ty| ty.is_char()) => {
                let target = match self.read_pointer(value.address) {
                    Ok(target) if !target.is_null() => target,
                    _ => return Ok(None),
                };
                match read_c_string(self.memory, target, self.config.max_summary_length) {
                    Ok((bytes, terminated)) => Ok(Some(quote_bytes(&bytes, terminated))),
                    Err(_) => Ok(None),
                }
            }
            TypeKind::Array { element, .. } if types.get(*element).is_some_and(|ty| ty.is_char()) => {
                let bytes = self.read_bytes(value)?;
                let end = bytes.iter().position(|&byte| byte == 0).unwrap_or(bytes.len());
                Ok(Some(quote_bytes(&bytes[..end], true)))
            }
            _ => Ok(None),
        }
    }

    /// C spelling of the value's type.
    ///
    /// ## Errors
    ///
    /// `InvalidState` for a stale value.
    pub fn type_name(&self, value: &Value) -> Result<String>
    {
        self.check_value(value)?;
        Ok(self.module.type_name(value.ty))
    }

    /// ## Errors
    ///
    /// `InvalidState` for a stale value.
    pub fn is_pointer(&self, value: &Value) -> Result<bool>
    {
        self.check_value(value)?;
        Ok(self.module.type_info(value.ty)?.is_pointer())
    }

    /// Address of the value's storage as zero-padded hex, e.g. `0x0000000000404028`.
    ///
    /// ## Errors
    ///
    /// `InvalidState` for a stale value.
    pub fn location(&self, value: &Value) -> Result<String>
    {
        Ok(self.load_address(value)?.to_padded_hex(self.pointer_width()))
    }

    /// ## Errors
    ///
    /// `InvalidState` for a stale value.
    pub fn load_address(&self, value: &Value) -> Result<Address>
    {
        self.check_value(value)?;
        Ok(value.address)
    }

    /// Symbol whose range contains the value's storage, e.g. the global it lives in.
    ///
    /// ## Errors
    ///
    /// `InvalidState` for a stale value.
    pub fn backing_symbol(&self, value: &Value) -> Result<Option<&'a Symbol>>
    {
        self.check_value(value)?;
        Ok(self.module.symbol_for_address(value.address))
    }

    /// View the memory at `address` as a value of the named type.
    ///
    /// ## Errors
    ///
    /// `NotFound` for an unknown type name.
    pub fn value_at_address(&self, address: Address, type_name: &str) -> Result<Value>
    {
        let ty = self.module.find_type(type_name)?;
        Ok(self.make(
            format!("({type_name}){}", address.to_padded_hex(self.pointer_width())),
            ty,
            address,
            ValueOrigin::Address,
        ))
    }

    /// All children, bounded by `limit`.
    ///
    /// ## Errors
    ///
    /// See [`Inspector::child_at`].
    pub fn children(&self, value: &Value, limit: usize) -> Result<Vec<Value>>
    {
        let count = self.child_count(value)?.min(limit);
        (0..count).map(|index| self.child_at(value, index)).collect()
    }

    pub(crate) fn config(&self) -> &EngineConfig
    {
        self.config
    }
}

#[allow(clippy::cast_possible_truncation)]
fn render_scalar(encoding: ScalarEncoding, bytes: &[u8], raw: u64) -> String
{
    match encoding {
        ScalarEncoding::Signed => sign_extend(raw, bytes.len()).to_string(),
        ScalarEncoding::Unsigned => raw.to_string(),
        ScalarEncoding::Boolean => (raw != 0).to_string(),
        ScalarEncoding::Float => match bytes.len() {
            4 => f32::from_bits(raw as u32).to_string(),
            8 => f64::from_bits(raw).to_string(),
            _ => format!("{raw:#x}"),
        },
        ScalarEncoding::SignedChar | ScalarEncoding::UnsignedChar if bytes.len() == 1 => {
            format!("'{}'", escape_byte(raw as u8, '\''))
        }
        ScalarEncoding::SignedChar => sign_extend(raw, bytes.len()).to_string(),
        ScalarEncoding::UnsignedChar => raw.to_string(),
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_render_scalars()
    {
        assert_eq!(render_scalar(ScalarEncoding::Signed, &[0xfe, 0xff, 0xff, 0xff], 0xffff_fffe), "-2");
        assert_eq!(render_scalar(ScalarEncoding::Unsigned, &[0xfe], 0xfe), "254");
        assert_eq!(render_scalar(ScalarEncoding::Boolean, &[1], 1), "true");
        assert_eq!(render_scalar(ScalarEncoding::SignedChar, &[b'A'], u64::from(b'A')), "'A'");
        assert_eq!(render_scalar(ScalarEncoding::SignedChar, &[0], 0), "'\\0'");
        let bits = u64::from(3.5f32.to_bits());
        assert_eq!(render_scalar(ScalarEncoding::Float, &bits.to_le_bytes()[..4], bits), "3.5");
    }
}
