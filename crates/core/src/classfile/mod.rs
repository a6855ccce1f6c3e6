//! Reading and writing of JVM class files.
//!
//! Only the parts of a class file the pipeline needs to reason about are
//! decoded into fields: names, access flags, member declarations and the
//! `Signature`, `SourceFile` and `InnerClasses` attributes. Everything else
//! (bytecode, stack maps, annotations, ...) is carried as raw attribute bytes
//! and written back unchanged.

pub mod code;
pub mod descriptor;
pub mod pool;

use thiserror::Error;

pub use pool::{Constant, ConstantPool, RefKind};

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_PRIVATE: u16 = 0x0002;
pub const ACC_PROTECTED: u16 = 0x0004;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_FINAL: u16 = 0x0010;
pub const ACC_SUPER: u16 = 0x0020;
pub const ACC_INTERFACE: u16 = 0x0200;
pub const ACC_ABSTRACT: u16 = 0x0400;
pub const ACC_SYNTHETIC: u16 = 0x1000;
pub const ACC_ENUM: u16 = 0x4000;

const MAGIC: u32 = 0xCAFE_BABE;

const ATTR_SIGNATURE: &str = "Signature";
const ATTR_SOURCE_FILE: &str = "SourceFile";
const ATTR_INNER_CLASSES: &str = "InnerClasses";

/// Errors raised while decoding or encoding a class file.
#[derive(Debug, Error)]
pub enum ClassFormatError {
    #[error("Unexpected end of class data at offset {offset}")]
    UnexpectedEof { offset: usize },

    #[error("Bad magic number {0:#010x}")]
    BadMagic(u32),

    #[error("Unknown constant pool tag {tag} at index {index}")]
    BadConstantTag { tag: u8, index: usize },

    #[error("Constant pool index {index} is not a valid {expected} entry")]
    BadConstantIndex { index: u16, expected: &'static str },

    #[error("Constant pool exceeds 65535 entries")]
    PoolOverflow,

    #[error("String constant of {0} bytes does not fit in a class file")]
    StringTooLong(usize),

    #[error("Malformed {attribute} attribute: {message}")]
    BadAttribute { attribute: &'static str, message: String },

    #[error("Trailing bytes after class data ({0} bytes)")]
    TrailingBytes(usize),
}

/// Big-endian cursor over class file bytes.
pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub(crate) fn bytes(&mut self, len: usize) -> Result<&'a [u8], ClassFormatError> {
        if self.remaining() < len {
            return Err(ClassFormatError::UnexpectedEof { offset: self.pos });
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub(crate) fn u1(&mut self) -> Result<u8, ClassFormatError> {
        Ok(self.bytes(1)?[0])
    }

    pub(crate) fn u2(&mut self) -> Result<u16, ClassFormatError> {
        let b = self.bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub(crate) fn u4(&mut self) -> Result<u32, ClassFormatError> {
        let b = self.bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn u8(&mut self) -> Result<u64, ClassFormatError> {
        let b = self.bytes(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(b);
        Ok(u64::from_be_bytes(buf))
    }
}

/// An attribute kept as opaque bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAttribute {
    pub name: String,
    pub info: Vec<u8>,
}

/// A field declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRecord {
    pub access: u16,
    pub name: String,
    pub desc: String,
    pub signature: Option<String>,
    pub attributes: Vec<RawAttribute>,
}

/// A method declaration. Its `Code` attribute stays in `attributes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodRecord {
    pub access: u16,
    pub name: String,
    pub desc: String,
    pub signature: Option<String>,
    pub attributes: Vec<RawAttribute>,
}

impl MethodRecord {
    /// Raw bytes of the `Code` attribute, if the method has a body.
    pub fn code(&self) -> Option<&[u8]> {
        self.attributes.iter().find(|a| a.name == "Code").map(|a| a.info.as_slice())
    }
}

/// One entry of the `InnerClasses` attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InnerClassRecord {
    pub name: String,
    pub outer_name: Option<String>,
    pub inner_name: Option<String>,
    pub access: u16,
}

/// A decoded class file.
#[derive(Debug, Clone)]
pub struct ClassRecord {
    pub minor_version: u16,
    pub major_version: u16,
    pub access: u16,
    pub name: String,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub signature: Option<String>,
    pub source_file: Option<String>,
    pub fields: Vec<FieldRecord>,
    pub methods: Vec<MethodRecord>,
    pub inner_classes: Vec<InnerClassRecord>,
    pub attributes: Vec<RawAttribute>,
    pool: ConstantPool,
}

impl ClassRecord {
    /// Create an empty Java 8 class with the given name and superclass.
    pub fn new(name: impl Into<String>, super_name: Option<&str>) -> Self {
        Self {
            minor_version: 0,
            major_version: 52,
            access: ACC_PUBLIC | ACC_SUPER,
            name: name.into(),
            super_name: super_name.map(str::to_string),
            interfaces: Vec::new(),
            signature: None,
            source_file: None,
            fields: Vec::new(),
            methods: Vec::new(),
            inner_classes: Vec::new(),
            attributes: Vec::new(),
            pool: ConstantPool::new(),
        }
    }

    /// Decode a class file.
    pub fn parse(data: &[u8]) -> Result<Self, ClassFormatError> {
        let mut r = ByteReader::new(data);
        let magic = r.u4()?;
        if magic != MAGIC {
            return Err(ClassFormatError::BadMagic(magic));
        }
        let minor_version = r.u2()?;
        let major_version = r.u2()?;
        let pool = ConstantPool::parse(&mut r)?;
        let access = r.u2()?;
        let name = pool.class_name(r.u2()?)?;
        let super_index = r.u2()?;
        let super_name = if super_index == 0 { None } else { Some(pool.class_name(super_index)?) };
        let interface_count = r.u2()?;
        let mut interfaces = Vec::with_capacity(interface_count as usize);
        for _ in 0..interface_count {
            interfaces.push(pool.class_name(r.u2()?)?);
        }

        let field_count = r.u2()?;
        let mut fields = Vec::with_capacity(field_count as usize);
        for _ in 0..field_count {
            let (access, name, desc, signature, attributes) = parse_member(&mut r, &pool)?;
            fields.push(FieldRecord { access, name, desc, signature, attributes });
        }

        let method_count = r.u2()?;
        let mut methods = Vec::with_capacity(method_count as usize);
        for _ in 0..method_count {
            let (access, name, desc, signature, attributes) = parse_member(&mut r, &pool)?;
            methods.push(MethodRecord { access, name, desc, signature, attributes });
        }

        let mut signature = None;
        let mut source_file = None;
        let mut inner_classes = Vec::new();
        let mut attributes = Vec::new();
        let attr_count = r.u2()?;
        for _ in 0..attr_count {
            let attr_name = pool.utf8(r.u2()?)?;
            let len = r.u4()? as usize;
            let info = r.bytes(len)?;
            match attr_name.as_str() {
                ATTR_SIGNATURE => signature = Some(utf8_attribute(&pool, info, ATTR_SIGNATURE)?),
                ATTR_SOURCE_FILE => {
                    source_file = Some(utf8_attribute(&pool, info, ATTR_SOURCE_FILE)?)
                }
                ATTR_INNER_CLASSES => inner_classes = parse_inner_classes(&pool, info)?,
                _ => attributes.push(RawAttribute { name: attr_name, info: info.to_vec() }),
            }
        }
        if r.remaining() > 0 {
            return Err(ClassFormatError::TrailingBytes(r.remaining()));
        }

        Ok(Self {
            minor_version,
            major_version,
            access,
            name,
            super_name,
            interfaces,
            signature,
            source_file,
            fields,
            methods,
            inner_classes,
            attributes,
            pool,
        })
    }

    /// Encode the class. The stored pool is cloned and extended with any
    /// names introduced since parsing; existing indices are preserved.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ClassFormatError> {
        let mut pool = self.pool.clone();
        let mut body = Vec::new();

        put_u2(&mut body, self.access);
        put_u2(&mut body, pool.intern_class(&self.name)?);
        match &self.super_name {
            Some(super_name) => put_u2(&mut body, pool.intern_class(super_name)?),
            None => put_u2(&mut body, 0),
        }
        put_u2(&mut body, self.interfaces.len() as u16);
        for interface in &self.interfaces {
            put_u2(&mut body, pool.intern_class(interface)?);
        }

        put_u2(&mut body, self.fields.len() as u16);
        for field in &self.fields {
            write_member(
                &mut body,
                &mut pool,
                field.access,
                &field.name,
                &field.desc,
                field.signature.as_deref(),
                &field.attributes,
            )?;
        }
        put_u2(&mut body, self.methods.len() as u16);
        for method in &self.methods {
            write_member(
                &mut body,
                &mut pool,
                method.access,
                &method.name,
                &method.desc,
                method.signature.as_deref(),
                &method.attributes,
            )?;
        }

        let mut attrs: Vec<(u16, Vec<u8>)> = Vec::new();
        if let Some(source_file) = &self.source_file {
            let value = pool.intern_utf8(source_file)?;
            attrs.push((pool.intern_utf8(ATTR_SOURCE_FILE)?, value.to_be_bytes().to_vec()));
        }
        if let Some(signature) = &self.signature {
            let value = pool.intern_utf8(signature)?;
            attrs.push((pool.intern_utf8(ATTR_SIGNATURE)?, value.to_be_bytes().to_vec()));
        }
        if !self.inner_classes.is_empty() {
            let mut info = Vec::new();
            put_u2(&mut info, self.inner_classes.len() as u16);
            for icn in &self.inner_classes {
                put_u2(&mut info, pool.intern_class(&icn.name)?);
                match &icn.outer_name {
                    Some(outer) => put_u2(&mut info, pool.intern_class(outer)?),
                    None => put_u2(&mut info, 0),
                }
                match &icn.inner_name {
                    Some(inner) => put_u2(&mut info, pool.intern_utf8(inner)?),
                    None => put_u2(&mut info, 0),
                }
                put_u2(&mut info, icn.access);
            }
            attrs.push((pool.intern_utf8(ATTR_INNER_CLASSES)?, info));
        }
        for attr in &self.attributes {
            attrs.push((pool.intern_utf8(&attr.name)?, attr.info.clone()));
        }
        put_u2(&mut body, attrs.len() as u16);
        for (name, info) in attrs {
            put_u2(&mut body, name);
            put_u4(&mut body, info.len() as u32);
            body.extend_from_slice(&info);
        }

        let mut out = Vec::with_capacity(body.len() + 1024);
        put_u4(&mut out, MAGIC);
        put_u2(&mut out, self.minor_version);
        put_u2(&mut out, self.major_version);
        pool.write(&mut out);
        out.extend_from_slice(&body);
        Ok(out)
    }

    pub fn pool(&self) -> &ConstantPool {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut ConstantPool {
        &mut self.pool
    }

    pub fn field(&self, name: &str, desc: &str) -> Option<&FieldRecord> {
        self.fields.iter().find(|f| f.name == name && f.desc == desc)
    }

    pub fn method(&self, name: &str, desc: &str) -> Option<&MethodRecord> {
        self.methods.iter().find(|m| m.name == name && m.desc == desc)
    }

    pub fn method_mut(&mut self, name: &str, desc: &str) -> Option<&mut MethodRecord> {
        self.methods.iter_mut().find(|m| m.name == name && m.desc == desc)
    }

    /// Package prefix including the trailing slash, or `""` for the default package.
    pub fn package(&self) -> &str {
        match self.name.rfind('/') {
            Some(idx) => &self.name[..=idx],
            None => "",
        }
    }

    /// Name without its package.
    pub fn simple_name(&self) -> &str {
        match self.name.rfind('/') {
            Some(idx) => &self.name[idx + 1..],
            None => &self.name,
        }
    }

    pub fn is_enum(&self) -> bool {
        self.access & ACC_ENUM != 0
    }

    pub fn is_interface(&self) -> bool {
        self.access & ACC_INTERFACE != 0
    }
}

type MemberParts = (u16, String, String, Option<String>, Vec<RawAttribute>);

fn parse_member(r: &mut ByteReader<'_>, pool: &ConstantPool) -> Result<MemberParts, ClassFormatError> {
    let access = r.u2()?;
    let name = pool.utf8(r.u2()?)?;
    let desc = pool.utf8(r.u2()?)?;
    let mut signature = None;
    let mut attributes = Vec::new();
    let count = r.u2()?;
    for _ in 0..count {
        let attr_name = pool.utf8(r.u2()?)?;
        let len = r.u4()? as usize;
        let info = r.bytes(len)?;
        if attr_name == ATTR_SIGNATURE {
            signature = Some(utf8_attribute(pool, info, ATTR_SIGNATURE)?);
        } else {
            attributes.push(RawAttribute { name: attr_name, info: info.to_vec() });
        }
    }
    Ok((access, name, desc, signature, attributes))
}

fn write_member(
    out: &mut Vec<u8>,
    pool: &mut ConstantPool,
    access: u16,
    name: &str,
    desc: &str,
    signature: Option<&str>,
    attributes: &[RawAttribute],
) -> Result<(), ClassFormatError> {
    put_u2(out, access);
    put_u2(out, pool.intern_utf8(name)?);
    put_u2(out, pool.intern_utf8(desc)?);
    let count = attributes.len() + usize::from(signature.is_some());
    put_u2(out, count as u16);
    if let Some(signature) = signature {
        put_u2(out, pool.intern_utf8(ATTR_SIGNATURE)?);
        put_u4(out, 2);
        put_u2(out, pool.intern_utf8(signature)?);
    }
    for attr in attributes {
        put_u2(out, pool.intern_utf8(&attr.name)?);
        put_u4(out, attr.info.len() as u32);
        out.extend_from_slice(&attr.info);
    }
    Ok(())
}

fn utf8_attribute(
    pool: &ConstantPool,
    info: &[u8],
    attribute: &'static str,
) -> Result<String, ClassFormatError> {
    if info.len() != 2 {
        return Err(ClassFormatError::BadAttribute {
            attribute,
            message: format!("expected 2 bytes, found {}", info.len()),
        });
    }
    pool.utf8(u16::from_be_bytes([info[0], info[1]]))
}

fn parse_inner_classes(
    pool: &ConstantPool,
    info: &[u8],
) -> Result<Vec<InnerClassRecord>, ClassFormatError> {
    let mut r = ByteReader::new(info);
    let count = r.u2()?;
    let mut records = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name = pool.class_name(r.u2()?)?;
        let outer = r.u2()?;
        let inner = r.u2()?;
        let access = r.u2()?;
        records.push(InnerClassRecord {
            name,
            outer_name: if outer == 0 { None } else { Some(pool.class_name(outer)?) },
            inner_name: if inner == 0 { None } else { Some(pool.utf8(inner)?) },
            access,
        });
    }
    if r.remaining() > 0 {
        return Err(ClassFormatError::BadAttribute {
            attribute: ATTR_INNER_CLASSES,
            message: format!("{} trailing bytes", r.remaining()),
        });
    }
    Ok(records)
}

pub(crate) fn put_u2(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

pub(crate) fn put_u4(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}
