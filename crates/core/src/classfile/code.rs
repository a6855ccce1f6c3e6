//! `Code` attribute decoding and a linear instruction walker.

use crate::classfile::{put_u2, put_u4, ByteReader, ClassFormatError, RawAttribute};

/// Opcodes the built-in stages look for.
pub mod opcodes {
    pub const ACONST_NULL: u8 = 0x01;
    pub const ICONST_0: u8 = 0x03;
    pub const BIPUSH: u8 = 0x10;
    pub const SIPUSH: u8 = 0x11;
    pub const LDC: u8 = 0x12;
    pub const LDC_W: u8 = 0x13;
    pub const LDC2_W: u8 = 0x14;
    pub const ALOAD_0: u8 = 0x2a;
    pub const IALOAD: u8 = 0x2e;
    pub const IASTORE: u8 = 0x4f;
    pub const POP: u8 = 0x57;
    pub const DUP: u8 = 0x59;
    pub const TABLESWITCH: u8 = 0xaa;
    pub const LOOKUPSWITCH: u8 = 0xab;
    pub const IRETURN: u8 = 0xac;
    pub const LRETURN: u8 = 0xad;
    pub const FRETURN: u8 = 0xae;
    pub const DRETURN: u8 = 0xaf;
    pub const ARETURN: u8 = 0xb0;
    pub const RETURN: u8 = 0xb1;
    pub const GETSTATIC: u8 = 0xb2;
    pub const PUTSTATIC: u8 = 0xb3;
    pub const GETFIELD: u8 = 0xb4;
    pub const PUTFIELD: u8 = 0xb5;
    pub const INVOKEVIRTUAL: u8 = 0xb6;
    pub const INVOKESPECIAL: u8 = 0xb7;
    pub const INVOKESTATIC: u8 = 0xb8;
    pub const INVOKEINTERFACE: u8 = 0xb9;
    pub const INVOKEDYNAMIC: u8 = 0xba;
    pub const NEW: u8 = 0xbb;
    pub const NEWARRAY: u8 = 0xbc;
    pub const ANEWARRAY: u8 = 0xbd;
    pub const ARRAYLENGTH: u8 = 0xbe;
    pub const CHECKCAST: u8 = 0xc0;
    pub const WIDE: u8 = 0xc4;
    pub const MULTIANEWARRAY: u8 = 0xc5;
}

use opcodes::*;

/// Decoded `Code` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    /// Raw exception table entries, 8 bytes each.
    pub exception_table: Vec<u8>,
    /// Nested attributes, written with already-interned name indices.
    pub attributes: Vec<(u16, Vec<u8>)>,
}

impl CodeAttribute {
    /// A body with no exception handlers or nested attributes.
    pub fn new(max_stack: u16, max_locals: u16, code: Vec<u8>) -> Self {
        Self { max_stack, max_locals, code, exception_table: Vec::new(), attributes: Vec::new() }
    }

    pub fn parse(info: &[u8]) -> Result<Self, ClassFormatError> {
        let mut r = ByteReader::new(info);
        let max_stack = r.u2()?;
        let max_locals = r.u2()?;
        let code_len = r.u4()? as usize;
        let code = r.bytes(code_len)?.to_vec();
        let handlers = r.u2()? as usize;
        let exception_table = r.bytes(handlers * 8)?.to_vec();
        let attr_count = r.u2()?;
        let mut attributes = Vec::with_capacity(attr_count as usize);
        for _ in 0..attr_count {
            let name = r.u2()?;
            let len = r.u4()? as usize;
            attributes.push((name, r.bytes(len)?.to_vec()));
        }
        Ok(Self { max_stack, max_locals, code, exception_table, attributes })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.code.len() + 16);
        put_u2(&mut out, self.max_stack);
        put_u2(&mut out, self.max_locals);
        put_u4(&mut out, self.code.len() as u32);
        out.extend_from_slice(&self.code);
        put_u2(&mut out, (self.exception_table.len() / 8) as u16);
        out.extend_from_slice(&self.exception_table);
        put_u2(&mut out, self.attributes.len() as u16);
        for (name, info) in &self.attributes {
            put_u2(&mut out, *name);
            put_u4(&mut out, info.len() as u32);
            out.extend_from_slice(info);
        }
        out
    }

    /// Wrap as a method attribute named `Code`.
    pub fn into_attribute(self) -> RawAttribute {
        RawAttribute { name: "Code".to_string(), info: self.to_bytes() }
    }

    pub fn instructions(&self) -> Instructions<'_> {
        Instructions { code: &self.code, pos: 0 }
    }
}

/// One decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction<'a> {
    pub offset: usize,
    pub opcode: u8,
    /// Operand bytes following the opcode (padding included for switches).
    pub operands: &'a [u8],
}

impl Instruction<'_> {
    /// The u2 constant pool index of `ldc_w`, field, method, type and
    /// invokedynamic instructions, or the u1 index of `ldc`.
    pub fn pool_index(&self) -> Option<u16> {
        match self.opcode {
            LDC => self.operands.first().map(|b| *b as u16),
            LDC_W | LDC2_W | GETSTATIC | PUTSTATIC | GETFIELD | PUTFIELD | INVOKEVIRTUAL
            | INVOKESPECIAL | INVOKESTATIC | INVOKEINTERFACE | INVOKEDYNAMIC | NEW | ANEWARRAY
            | CHECKCAST | MULTIANEWARRAY => {
                if self.operands.len() >= 2 {
                    Some(u16::from_be_bytes([self.operands[0], self.operands[1]]))
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}

/// Walks a bytecode array instruction by instruction. Stops at the first
/// truncated or unknown instruction.
pub struct Instructions<'a> {
    code: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for Instructions<'a> {
    type Item = Instruction<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let offset = self.pos;
        let opcode = *self.code.get(offset)?;
        let len = instruction_length(self.code, offset)?;
        if offset + len > self.code.len() {
            self.pos = self.code.len();
            return None;
        }
        self.pos += len;
        Some(Instruction { offset, opcode, operands: &self.code[offset + 1..offset + len] })
    }
}

fn read_i32(code: &[u8], at: usize) -> Option<i32> {
    let bytes = code.get(at..at + 4)?;
    Some(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Total length in bytes of the instruction at `offset`, opcode included.
pub fn instruction_length(code: &[u8], offset: usize) -> Option<usize> {
    let opcode = *code.get(offset)?;
    let len = match opcode {
        0x00..=0x0f => 1,
        BIPUSH => 2,
        SIPUSH => 3,
        LDC => 2,
        LDC_W | LDC2_W => 3,
        0x15..=0x19 => 2,
        0x1a..=0x35 => 1,
        0x36..=0x3a => 2,
        0x3b..=0x83 => 1,
        0x84 => 3,
        0x85..=0x98 => 1,
        0x99..=0xa8 => 3,
        0xa9 => 2,
        TABLESWITCH => {
            let pad = (4 - (offset + 1) % 4) % 4;
            let base = offset + 1 + pad;
            let low = read_i32(code, base + 4)?;
            let high = read_i32(code, base + 8)?;
            if high < low {
                return None;
            }
            let count = (high as i64 - low as i64 + 1) as usize;
            1 + pad + 12 + count * 4
        }
        LOOKUPSWITCH => {
            let pad = (4 - (offset + 1) % 4) % 4;
            let base = offset + 1 + pad;
            let pairs = read_i32(code, base + 4)?;
            if pairs < 0 {
                return None;
            }
            1 + pad + 8 + pairs as usize * 8
        }
        0xac..=0xb1 => 1,
        0xb2..=0xb8 => 3,
        INVOKEINTERFACE | INVOKEDYNAMIC => 5,
        NEW => 3,
        NEWARRAY => 2,
        ANEWARRAY => 3,
        0xbe | 0xbf => 1,
        CHECKCAST | 0xc1 => 3,
        0xc2 | 0xc3 => 1,
        WIDE => {
            if *code.get(offset + 1)? == 0x84 {
                6
            } else {
                4
            }
        }
        MULTIANEWARRAY => 4,
        0xc6 | 0xc7 => 3,
        0xc8 | 0xc9 => 5,
        _ => return None,
    };
    Some(len)
}
