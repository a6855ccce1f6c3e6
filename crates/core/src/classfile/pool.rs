use std::collections::HashMap;

use crate::classfile::{ByteReader, ClassFormatError};

const TAG_UTF8: u8 = 1;
const TAG_INTEGER: u8 = 3;
const TAG_FLOAT: u8 = 4;
const TAG_LONG: u8 = 5;
const TAG_DOUBLE: u8 = 6;
const TAG_CLASS: u8 = 7;
const TAG_STRING: u8 = 8;
const TAG_FIELD_REF: u8 = 9;
const TAG_METHOD_REF: u8 = 10;
const TAG_INTERFACE_METHOD_REF: u8 = 11;
const TAG_NAME_AND_TYPE: u8 = 12;
const TAG_METHOD_HANDLE: u8 = 15;
const TAG_METHOD_TYPE: u8 = 16;
const TAG_DYNAMIC: u8 = 17;
const TAG_INVOKE_DYNAMIC: u8 = 18;
const TAG_MODULE: u8 = 19;
const TAG_PACKAGE: u8 = 20;

/// Largest number of slots a constant pool may hold (`constant_pool_count` is a u2).
const MAX_POOL_SLOTS: usize = u16::MAX as usize;

/// One constant pool entry. Index fields point into the same pool.
///
/// Utf8 entries keep their raw modified UTF-8 bytes so that strings which do
/// not survive a round trip through `String` are still written back verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Constant {
    /// Slot 0 and the second slot of long/double entries.
    Unusable,
    Utf8(Vec<u8>),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class(u16),
    String(u16),
    FieldRef { class: u16, name_and_type: u16 },
    MethodRef { class: u16, name_and_type: u16 },
    InterfaceMethodRef { class: u16, name_and_type: u16 },
    NameAndType { name: u16, descriptor: u16 },
    MethodHandle { kind: u8, reference: u16 },
    MethodType(u16),
    Dynamic { bootstrap: u16, name_and_type: u16 },
    InvokeDynamic { bootstrap: u16, name_and_type: u16 },
    Module(u16),
    Package(u16),
}

impl Constant {
    fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }
}

/// Kind of member reference stored in the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    Field,
    Method,
    InterfaceMethod,
}

/// Constant pool with an interning lookup table.
///
/// Entries are never removed or reordered, so indices held by bytecode and
/// raw attributes stay valid; rewrites either replace an entry in place or
/// append a new one.
#[derive(Debug, Clone)]
pub struct ConstantPool {
    entries: Vec<Constant>,
    lookup: HashMap<Constant, u16>,
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantPool {
    /// Create an empty pool holding only the reserved slot 0.
    pub fn new() -> Self {
        Self { entries: vec![Constant::Unusable], lookup: HashMap::new() }
    }

    pub(crate) fn parse(reader: &mut ByteReader<'_>) -> Result<Self, ClassFormatError> {
        let count = reader.u2()? as usize;
        let mut pool = Self::new();
        let mut index = 1;
        while index < count {
            let tag = reader.u1()?;
            let constant = match tag {
                TAG_UTF8 => {
                    let len = reader.u2()? as usize;
                    Constant::Utf8(reader.bytes(len)?.to_vec())
                }
                TAG_INTEGER => Constant::Integer(reader.u4()? as i32),
                TAG_FLOAT => Constant::Float(reader.u4()?),
                TAG_LONG => Constant::Long(reader.u8()? as i64),
                TAG_DOUBLE => Constant::Double(reader.u8()?),
                TAG_CLASS => Constant::Class(reader.u2()?),
                TAG_STRING => Constant::String(reader.u2()?),
                TAG_FIELD_REF => {
                    Constant::FieldRef { class: reader.u2()?, name_and_type: reader.u2()? }
                }
                TAG_METHOD_REF => {
                    Constant::MethodRef { class: reader.u2()?, name_and_type: reader.u2()? }
                }
                TAG_INTERFACE_METHOD_REF => Constant::InterfaceMethodRef {
                    class: reader.u2()?,
                    name_and_type: reader.u2()?,
                },
                TAG_NAME_AND_TYPE => {
                    Constant::NameAndType { name: reader.u2()?, descriptor: reader.u2()? }
                }
                TAG_METHOD_HANDLE => {
                    Constant::MethodHandle { kind: reader.u1()?, reference: reader.u2()? }
                }
                TAG_METHOD_TYPE => Constant::MethodType(reader.u2()?),
                TAG_DYNAMIC => {
                    Constant::Dynamic { bootstrap: reader.u2()?, name_and_type: reader.u2()? }
                }
                TAG_INVOKE_DYNAMIC => Constant::InvokeDynamic {
                    bootstrap: reader.u2()?,
                    name_and_type: reader.u2()?,
                },
                TAG_MODULE => Constant::Module(reader.u2()?),
                TAG_PACKAGE => Constant::Package(reader.u2()?),
                other => return Err(ClassFormatError::BadConstantTag { tag: other, index }),
            };
            let wide = constant.is_wide();
            pool.lookup.entry(constant.clone()).or_insert(index as u16);
            pool.entries.push(constant);
            index += 1;
            if wide {
                pool.entries.push(Constant::Unusable);
                index += 1;
            }
        }
        Ok(pool)
    }

    pub(crate) fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.entries.len() as u16).to_be_bytes());
        for constant in &self.entries[1..] {
            match constant {
                Constant::Unusable => {}
                Constant::Utf8(bytes) => {
                    out.push(TAG_UTF8);
                    out.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
                    out.extend_from_slice(bytes);
                }
                Constant::Integer(v) => {
                    out.push(TAG_INTEGER);
                    out.extend_from_slice(&v.to_be_bytes());
                }
                Constant::Float(bits) => {
                    out.push(TAG_FLOAT);
                    out.extend_from_slice(&bits.to_be_bytes());
                }
                Constant::Long(v) => {
                    out.push(TAG_LONG);
                    out.extend_from_slice(&v.to_be_bytes());
                }
                Constant::Double(bits) => {
                    out.push(TAG_DOUBLE);
                    out.extend_from_slice(&bits.to_be_bytes());
                }
                Constant::Class(i) => push_tagged(out, TAG_CLASS, &[*i]),
                Constant::String(i) => push_tagged(out, TAG_STRING, &[*i]),
                Constant::FieldRef { class, name_and_type } => {
                    push_tagged(out, TAG_FIELD_REF, &[*class, *name_and_type])
                }
                Constant::MethodRef { class, name_and_type } => {
                    push_tagged(out, TAG_METHOD_REF, &[*class, *name_and_type])
                }
                Constant::InterfaceMethodRef { class, name_and_type } => {
                    push_tagged(out, TAG_INTERFACE_METHOD_REF, &[*class, *name_and_type])
                }
                Constant::NameAndType { name, descriptor } => {
                    push_tagged(out, TAG_NAME_AND_TYPE, &[*name, *descriptor])
                }
                Constant::MethodHandle { kind, reference } => {
                    out.push(TAG_METHOD_HANDLE);
                    out.push(*kind);
                    out.extend_from_slice(&reference.to_be_bytes());
                }
                Constant::MethodType(i) => push_tagged(out, TAG_METHOD_TYPE, &[*i]),
                Constant::Dynamic { bootstrap, name_and_type } => {
                    push_tagged(out, TAG_DYNAMIC, &[*bootstrap, *name_and_type])
                }
                Constant::InvokeDynamic { bootstrap, name_and_type } => {
                    push_tagged(out, TAG_INVOKE_DYNAMIC, &[*bootstrap, *name_and_type])
                }
                Constant::Module(i) => push_tagged(out, TAG_MODULE, &[*i]),
                Constant::Package(i) => push_tagged(out, TAG_PACKAGE, &[*i]),
            }
        }
    }

    /// Number of slots including the reserved slot 0.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the pool holds nothing but the reserved slot.
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    pub fn get(&self, index: u16) -> Option<&Constant> {
        match self.entries.get(index as usize) {
            Some(Constant::Unusable) | None => None,
            Some(constant) => Some(constant),
        }
    }

    /// Iterate over every usable entry with its index.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &Constant)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, c)| !matches!(c, Constant::Unusable))
            .map(|(i, c)| (i as u16, c))
    }

    fn entry(&self, index: u16, expected: &'static str) -> Result<&Constant, ClassFormatError> {
        self.get(index).ok_or(ClassFormatError::BadConstantIndex { index, expected })
    }

    /// Decode the Utf8 entry at `index`.
    pub fn utf8(&self, index: u16) -> Result<String, ClassFormatError> {
        match self.entry(index, "Utf8")? {
            Constant::Utf8(bytes) => Ok(decode_modified_utf8(bytes)),
            _ => Err(ClassFormatError::BadConstantIndex { index, expected: "Utf8" }),
        }
    }

    /// Internal name of the Class entry at `index`.
    pub fn class_name(&self, index: u16) -> Result<String, ClassFormatError> {
        match self.entry(index, "Class")? {
            Constant::Class(name) => self.utf8(*name),
            _ => Err(ClassFormatError::BadConstantIndex { index, expected: "Class" }),
        }
    }

    /// `(name, descriptor)` of the NameAndType entry at `index`.
    pub fn name_and_type(&self, index: u16) -> Result<(String, String), ClassFormatError> {
        match self.entry(index, "NameAndType")? {
            Constant::NameAndType { name, descriptor } => {
                Ok((self.utf8(*name)?, self.utf8(*descriptor)?))
            }
            _ => Err(ClassFormatError::BadConstantIndex { index, expected: "NameAndType" }),
        }
    }

    /// `(kind, owner, name, descriptor)` of a field or method reference.
    pub fn member_ref(
        &self,
        index: u16,
    ) -> Result<(RefKind, String, String, String), ClassFormatError> {
        let (kind, class, name_and_type) = match self.entry(index, "member reference")? {
            Constant::FieldRef { class, name_and_type } => (RefKind::Field, class, name_and_type),
            Constant::MethodRef { class, name_and_type } => {
                (RefKind::Method, class, name_and_type)
            }
            Constant::InterfaceMethodRef { class, name_and_type } => {
                (RefKind::InterfaceMethod, class, name_and_type)
            }
            _ => {
                return Err(ClassFormatError::BadConstantIndex {
                    index,
                    expected: "member reference",
                })
            }
        };
        let owner = self.class_name(*class)?;
        let (name, desc) = self.name_and_type(*name_and_type)?;
        Ok((kind, owner, name, desc))
    }

    /// Text of a String constant, if `index` points at one.
    pub fn string_literal(&self, index: u16) -> Option<String> {
        match self.get(index) {
            Some(Constant::String(utf8)) => self.utf8(*utf8).ok(),
            _ => None,
        }
    }

    fn push(&mut self, constant: Constant) -> Result<u16, ClassFormatError> {
        let slots = if constant.is_wide() { 2 } else { 1 };
        if self.entries.len() + slots > MAX_POOL_SLOTS {
            return Err(ClassFormatError::PoolOverflow);
        }
        let index = self.entries.len() as u16;
        let wide = constant.is_wide();
        self.lookup.insert(constant.clone(), index);
        self.entries.push(constant);
        if wide {
            self.entries.push(Constant::Unusable);
        }
        Ok(index)
    }

    fn intern(&mut self, constant: Constant) -> Result<u16, ClassFormatError> {
        match self.lookup.get(&constant) {
            Some(index) => Ok(*index),
            None => self.push(constant),
        }
    }

    pub fn intern_utf8(&mut self, text: &str) -> Result<u16, ClassFormatError> {
        let bytes = encode_modified_utf8(text);
        if bytes.len() > u16::MAX as usize {
            return Err(ClassFormatError::StringTooLong(bytes.len()));
        }
        self.intern(Constant::Utf8(bytes))
    }

    pub fn intern_class(&mut self, name: &str) -> Result<u16, ClassFormatError> {
        let utf8 = self.intern_utf8(name)?;
        self.intern(Constant::Class(utf8))
    }

    pub fn intern_string(&mut self, text: &str) -> Result<u16, ClassFormatError> {
        let utf8 = self.intern_utf8(text)?;
        self.intern(Constant::String(utf8))
    }

    pub fn intern_name_and_type(&mut self, name: &str, desc: &str) -> Result<u16, ClassFormatError> {
        let name = self.intern_utf8(name)?;
        let descriptor = self.intern_utf8(desc)?;
        self.intern(Constant::NameAndType { name, descriptor })
    }

    pub fn intern_member_ref(
        &mut self,
        kind: RefKind,
        owner: &str,
        name: &str,
        desc: &str,
    ) -> Result<u16, ClassFormatError> {
        let class = self.intern_class(owner)?;
        let name_and_type = self.intern_name_and_type(name, desc)?;
        self.intern(match kind {
            RefKind::Field => Constant::FieldRef { class, name_and_type },
            RefKind::Method => Constant::MethodRef { class, name_and_type },
            RefKind::InterfaceMethod => Constant::InterfaceMethodRef { class, name_and_type },
        })
    }

    /// Replace the entry at `index`, keeping the interning table coherent.
    pub fn set(&mut self, index: u16, constant: Constant) {
        let slot = index as usize;
        if slot == 0 || slot >= self.entries.len() {
            return;
        }
        let previous = std::mem::replace(&mut self.entries[slot], constant.clone());
        if self.lookup.get(&previous) == Some(&index) {
            self.lookup.remove(&previous);
        }
        self.lookup.entry(constant).or_insert(index);
    }
}

fn push_tagged(out: &mut Vec<u8>, tag: u8, values: &[u16]) {
    out.push(tag);
    for value in values {
        out.extend_from_slice(&value.to_be_bytes());
    }
}

/// Decode the JVM's modified UTF-8 (two-byte NUL, surrogate pairs) into a `String`.
///
/// Malformed sequences and unpaired surrogates decode to U+FFFD.
pub fn decode_modified_utf8(bytes: &[u8]) -> String {
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b & 0x80 == 0 {
            units.push(b as u16);
            i += 1;
        } else if b & 0xE0 == 0xC0 && i + 1 < bytes.len() {
            units.push(((b as u16 & 0x1F) << 6) | (bytes[i + 1] as u16 & 0x3F));
            i += 2;
        } else if b & 0xF0 == 0xE0 && i + 2 < bytes.len() {
            units.push(
                ((b as u16 & 0x0F) << 12)
                    | ((bytes[i + 1] as u16 & 0x3F) << 6)
                    | (bytes[i + 2] as u16 & 0x3F),
            );
            i += 3;
        } else {
            units.push(0xFFFD);
            i += 1;
        }
    }
    String::from_utf16_lossy(&units)
}

/// Encode a `String` as modified UTF-8.
pub fn encode_modified_utf8(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for unit in text.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | ((unit >> 6) as u8 & 0x1F));
                out.push(0x80 | (unit as u8 & 0x3F));
            }
            _ => {
                out.push(0xE0 | ((unit >> 12) as u8 & 0x0F));
                out.push(0x80 | ((unit >> 6) as u8 & 0x3F));
                out.push(0x80 | (unit as u8 & 0x3F));
            }
        }
    }
    out
}
