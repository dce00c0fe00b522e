use std::{fs, path::Path};

use bytes::Buf;

use crate::collections::OrderedSet;

use super::{
    Body, FieldDef, FieldRef, FieldRefIdx, InstrId, MethodDef, MethodRef, MethodRefIdx, Module,
    Op, Operand, OperandKind, Scope, TypeDef, TypeRef, TypeRefIdx, Unresolved, FORMAT_VERSION,
    MAGIC,
};

pub(super) const NO_TYPE: u32 = u32::MAX;
pub(super) const FLAG_STATIC: u8 = 0b01;
pub(super) const FLAG_BODY: u8 = 0b10;
pub(super) const FLAG_HAS_THIS: u8 = 0b01;

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum ParseError {
    #[error("not a binary module (bad magic)")]
    BadMagic,
    #[error("unsupported format version: {0} (expected {FORMAT_VERSION})")]
    UnsupportedVersion(u16),
    #[error("unexpected end of input: needed {needed} byte(s), {remaining} left")]
    UnexpectedEof { needed: usize, remaining: usize },
    #[error("invalid UTF-8 in string")]
    InvalidUtf8,
    #[error("unknown opcode: 0x{0:02x}")]
    UnknownOpcode(u8),
    #[error("branch at instruction {position} targets {target}, body has {len} instruction(s)")]
    BranchOutOfRange {
        position: usize,
        target: u32,
        len: usize,
    },
    #[error("{0} trailing byte(s) after module")]
    TrailingBytes(usize),
    #[error("{0}")]
    Unresolved(#[from] Unresolved),
}

#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("I/O error: {0}")]
    IO(#[from] std::io::Error),
    #[error("ParseError: {0}")]
    Parse(#[from] ParseError),
}

struct Decoder<'a> {
    buff: &'a [u8],
}

impl<'a> Decoder<'a> {
    fn new(buff: &'a [u8]) -> Self {
        Self { buff }
    }

    fn need(&self, needed: usize) -> Result<(), ParseError> {
        let remaining = self.buff.remaining();

        if remaining < needed {
            return Err(ParseError::UnexpectedEof { needed, remaining });
        }

        Ok(())
    }

    fn u8(&mut self) -> Result<u8, ParseError> {
        self.need(1)?;
        Ok(self.buff.get_u8())
    }

    fn u16(&mut self) -> Result<u16, ParseError> {
        self.need(2)?;
        Ok(self.buff.get_u16())
    }

    fn u32(&mut self) -> Result<u32, ParseError> {
        self.need(4)?;
        Ok(self.buff.get_u32())
    }

    fn i32(&mut self) -> Result<i32, ParseError> {
        self.need(4)?;
        Ok(self.buff.get_i32())
    }

    fn i64(&mut self) -> Result<i64, ParseError> {
        self.need(8)?;
        Ok(self.buff.get_i64())
    }

    fn str(&mut self) -> Result<String, ParseError> {
        let len = self.u16()? as usize;
        self.need(len)?;

        let (bytes, rest) = self.buff.split_at(len);
        self.buff = rest;

        String::from_utf8(bytes.to_vec()).map_err(|_| ParseError::InvalidUtf8)
    }

    fn type_idx(&mut self) -> Result<TypeRefIdx, ParseError> {
        Ok(TypeRefIdx(self.u32()?))
    }

    fn ret(&mut self) -> Result<Option<TypeRefIdx>, ParseError> {
        Ok(match self.u32()? {
            NO_TYPE => None,
            idx => Some(TypeRefIdx(idx)),
        })
    }

    fn params(&mut self) -> Result<Vec<TypeRefIdx>, ParseError> {
        let count = self.u16()?;
        (0..count).map(|_| self.type_idx()).collect()
    }

    fn header(&mut self) -> Result<String, ParseError> {
        self.need(MAGIC.len())?;

        if &self.buff[..MAGIC.len()] != MAGIC {
            return Err(ParseError::BadMagic);
        }

        self.buff.advance(MAGIC.len());

        match self.u16()? {
            FORMAT_VERSION => self.str(),
            version => Err(ParseError::UnsupportedVersion(version)),
        }
    }

    fn type_ref(&mut self) -> Result<TypeRef, ParseError> {
        let scope = match self.u16()? {
            0 => Scope::Local,
            n => Scope::Module(n - 1),
        };

        Ok(TypeRef {
            scope,
            name: self.str()?,
        })
    }

    fn field_ref(&mut self) -> Result<FieldRef, ParseError> {
        Ok(FieldRef {
            owner: self.type_idx()?,
            name: self.str()?,
            ty: self.type_idx()?,
        })
    }

    fn method_ref(&mut self) -> Result<MethodRef, ParseError> {
        let owner = self.type_idx()?;
        let name = self.str()?;
        let flags = self.u8()?;

        Ok(MethodRef {
            owner,
            name,
            has_this: flags & FLAG_HAS_THIS != 0,
            params: self.params()?,
            ret: self.ret()?,
        })
    }

    fn operand(&mut self, kind: OperandKind) -> Result<Operand, ParseError> {
        Ok(match kind {
            OperandKind::None => Operand::None,
            OperandKind::I4 => Operand::Int(self.i32()? as i64),
            OperandKind::I8 => Operand::Int(self.i64()?),
            OperandKind::Str => Operand::Str(self.str()?),
            OperandKind::Arg => Operand::Arg(self.u16()?),
            OperandKind::Local => Operand::Local(self.u16()?),
            OperandKind::Type => Operand::Type(self.type_idx()?),
            OperandKind::Field => Operand::Field(FieldRefIdx(self.u32()?)),
            OperandKind::Method => Operand::Method(MethodRefIdx(self.u32()?)),
            // Positions equal identities in a freshly decoded body
            OperandKind::Target => Operand::Target(InstrId(self.u32()?)),
        })
    }

    fn body(&mut self) -> Result<Body, ParseError> {
        let mut body = Body::new(self.u16()?);
        body.locals = self.params()?;

        let count = self.u32()?;

        for _ in 0..count {
            let code = self.u8()?;
            let op = Op::try_from(code).map_err(|_| ParseError::UnknownOpcode(code))?;
            let operand = self.operand(op.operand_kind())?;

            body.push(op, operand);
        }

        for (position, instr) in body.instructions().iter().enumerate() {
            if let Operand::Target(target) = instr.operand {
                if target.0 >= count {
                    return Err(ParseError::BranchOutOfRange {
                        position,
                        target: target.0,
                        len: body.len(),
                    });
                }
            }
        }

        Ok(body)
    }

    fn method(&mut self) -> Result<MethodDef, ParseError> {
        let name = self.str()?;
        let flags = self.u8()?;
        let params = self.params()?;
        let ret = self.ret()?;
        let body = if flags & FLAG_BODY != 0 {
            Some(self.body()?)
        } else {
            None
        };

        Ok(MethodDef {
            name,
            is_static: flags & FLAG_STATIC != 0,
            params,
            ret,
            body,
        })
    }

    fn type_def(&mut self) -> Result<TypeDef, ParseError> {
        let mut ty = TypeDef::new(self.str()?);

        for _ in 0..self.u16()? {
            let name = self.str()?;
            let field_ty = self.type_idx()?;
            let flags = self.u8()?;

            ty.fields.push(FieldDef {
                name,
                ty: field_ty,
                is_static: flags & FLAG_STATIC != 0,
            });
        }

        for _ in 0..self.u16()? {
            ty.methods.push(self.method()?);
        }

        Ok(ty)
    }

    fn module(&mut self) -> Result<Module, ParseError> {
        let mut module = Module::new(self.header()?);

        let modules = (0..self.u16()?)
            .map(|_| self.str())
            .collect::<Result<Vec<_>, _>>()?;
        let type_refs = (0..self.u32()?)
            .map(|_| self.type_ref())
            .collect::<Result<Vec<_>, _>>()?;
        let field_refs = (0..self.u32()?)
            .map(|_| self.field_ref())
            .collect::<Result<Vec<_>, _>>()?;
        let method_refs = (0..self.u32()?)
            .map(|_| self.method_ref())
            .collect::<Result<Vec<_>, _>>()?;

        module.modules = OrderedSet::from_vec(modules);
        module.type_refs = OrderedSet::from_vec(type_refs);
        module.field_refs = OrderedSet::from_vec(field_refs);
        module.method_refs = OrderedSet::from_vec(method_refs);

        for _ in 0..self.u32()? {
            let ty = self.type_def()?;
            module.types.push(ty);
        }

        if self.buff.has_remaining() {
            return Err(ParseError::TrailingBytes(self.buff.remaining()));
        }

        module.check_references()?;

        Ok(module)
    }
}

impl Module {
    pub fn decode(bytes: &[u8]) -> Result<Self, ParseError> {
        Decoder::new(bytes).module()
    }

    /// Reads only the declared module name.
    pub fn peek_name(bytes: &[u8]) -> Result<String, ParseError> {
        Decoder::new(bytes).header()
    }

    pub fn read(path: impl AsRef<Path>) -> Result<Self, ReadError> {
        let bytes = fs::read(path)?;
        Ok(Self::decode(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    fn header(version: u16, name: &str) -> Vec<u8> {
        let mut buff = MAGIC.to_vec();
        buff.extend_from_slice(&version.to_be_bytes());
        buff.extend_from_slice(&(name.len() as u16).to_be_bytes());
        buff.extend_from_slice(name.as_bytes());
        buff
    }

    fn empty_module(name: &str) -> Vec<u8> {
        let mut buff = header(FORMAT_VERSION, name);
        buff.extend_from_slice(&[0, 0]);
        buff.extend_from_slice(&[0; 16]);
        buff
    }

    #[test]
    fn test_decode_empty() {
        let module = Module::decode(&empty_module("Game")).unwrap();

        assert_eq!(module.name, "Game");
        assert!(module.types.is_empty());
    }

    #[test]
    fn test_peek_name() {
        assert_eq!(Module::peek_name(&header(FORMAT_VERSION, "Game")), Ok("Game".to_string()));
    }

    #[test_case(b"MZ\x90\x00".to_vec(), ParseError::BadMagic; "bad magic")]
    #[test_case(header(7, "Game"), ParseError::UnsupportedVersion(7); "unsupported version")]
    #[test_case(b"BM".to_vec(), ParseError::UnexpectedEof { needed: 4, remaining: 2 }; "truncated magic")]
    #[test_case(header(FORMAT_VERSION, "Game"), ParseError::UnexpectedEof { needed: 2, remaining: 0 }; "truncated tables")]
    #[test_case({ let mut m = empty_module("Game"); m.push(0); m }, ParseError::TrailingBytes(1); "trailing bytes")]
    fn test_decode_failure(bytes: Vec<u8>, expected: ParseError) {
        assert_eq!(Module::decode(&bytes), Err(expected));
    }

    fn push_str(buff: &mut Vec<u8>, value: &str) {
        buff.extend_from_slice(&(value.len() as u16).to_be_bytes());
        buff.extend_from_slice(value.as_bytes());
    }

    /// `Game.Boot::Run` with a body of `count` instructions encoded as `code`.
    fn with_body(count: u32, code: &[u8]) -> Vec<u8> {
        let mut buff = header(FORMAT_VERSION, "Game");
        buff.extend_from_slice(&[0, 0]);
        buff.extend_from_slice(&[0; 12]);
        buff.extend_from_slice(&1u32.to_be_bytes());
        push_str(&mut buff, "Game.Boot");
        buff.extend_from_slice(&[0, 0, 0, 1]);
        push_str(&mut buff, "Run");
        buff.push(FLAG_STATIC | FLAG_BODY);
        buff.extend_from_slice(&[0, 0]);
        buff.extend_from_slice(&NO_TYPE.to_be_bytes());
        buff.extend_from_slice(&[0, 0, 0, 0]);
        buff.extend_from_slice(&count.to_be_bytes());
        buff.extend_from_slice(code);
        buff
    }

    fn instr(op: Op, operand: u32) -> Vec<u8> {
        let mut buff = vec![u8::from(op)];
        buff.extend_from_slice(&operand.to_be_bytes());
        buff
    }

    #[test]
    fn test_decode_body() {
        let module = Module::decode(&with_body(1, &[u8::from(Op::Ret)])).unwrap();
        let body = module.types[0].methods[0].body.as_ref().unwrap();

        assert_eq!(body.instructions()[0].op, Op::Ret);
    }

    #[test_case(with_body(1, &[0xee]), ParseError::UnknownOpcode(0xee); "unknown opcode")]
    #[test_case(
        with_body(1, &instr(Op::Br, 5)),
        ParseError::BranchOutOfRange { position: 0, target: 5, len: 1 };
        "branch past the end"
    )]
    #[test_case(
        with_body(1, &instr(Op::Call, 0)),
        ParseError::Unresolved(Unresolved::Method { site: "Game.Boot::Run".to_string(), index: 0 });
        "missing method reference"
    )]
    #[test_case(
        with_body(1, &instr(Op::Ldsfld, 3)),
        ParseError::Unresolved(Unresolved::Field { site: "Game.Boot::Run".to_string(), index: 3 });
        "missing field reference"
    )]
    #[test_case(
        with_body(1, &instr(Op::Castclass, 1)),
        ParseError::Unresolved(Unresolved::Type { site: "Game.Boot::Run".to_string(), index: 1 });
        "missing type reference"
    )]
    fn test_decode_body_failure(bytes: Vec<u8>, expected: ParseError) {
        assert_eq!(Module::decode(&bytes), Err(expected));
    }

    #[test]
    fn test_invalid_utf8() {
        let mut buff = MAGIC.to_vec();
        buff.extend_from_slice(&FORMAT_VERSION.to_be_bytes());
        buff.extend_from_slice(&[0, 2, 0xff, 0xfe]);

        assert_eq!(Module::decode(&buff), Err(ParseError::InvalidUtf8));
    }
}
