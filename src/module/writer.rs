use std::{collections::HashMap, fs, path::Path};

use bytes::{BufMut, Bytes, BytesMut};
use wyhash2::WyHash;

use super::{
    reader::{FLAG_BODY, FLAG_HAS_THIS, FLAG_STATIC, NO_TYPE},
    Body, InstrId, MethodDef, Module, Op, Operand, Scope, TypeDef, TypeRefIdx, Unresolved,
    FORMAT_VERSION, MAGIC,
};

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("unresolved reference: {0}")]
    Unresolved(#[from] Unresolved),
    #[error("too many {what} ({len}) for the binary format")]
    TooLarge { what: &'static str, len: usize },
    #[error("I/O error: {0}")]
    IO(#[from] std::io::Error),
}

fn len_u16(what: &'static str, len: usize) -> Result<u16, WriteError> {
    u16::try_from(len).map_err(|_| WriteError::TooLarge { what, len })
}

fn len_u32(what: &'static str, len: usize) -> Result<u32, WriteError> {
    u32::try_from(len).map_err(|_| WriteError::TooLarge { what, len })
}

struct Encoder {
    buff: BytesMut,
}

impl Encoder {
    fn str(&mut self, value: &str) -> Result<(), WriteError> {
        self.buff.put_u16(len_u16("string bytes", value.len())?);
        self.buff.put_slice(value.as_bytes());
        Ok(())
    }

    fn ret(&mut self, ret: Option<TypeRefIdx>) {
        self.buff.put_u32(ret.map(|idx| idx.0).unwrap_or(NO_TYPE));
    }

    fn params(&mut self, params: &[TypeRefIdx]) -> Result<(), WriteError> {
        self.buff.put_u16(len_u16("parameters", params.len())?);

        for param in params {
            self.buff.put_u32(param.0);
        }

        Ok(())
    }

    fn body(&mut self, body: &Body) -> Result<(), WriteError> {
        let positions = body
            .instructions()
            .iter()
            .enumerate()
            .map(|(pos, instr)| (instr.id(), pos as u32))
            .collect::<HashMap<InstrId, u32, WyHash>>();

        self.buff.put_u16(body.max_stack);
        self.params(&body.locals)?;
        self.buff.put_u32(len_u32("instructions", body.len())?);

        for instr in body.instructions() {
            self.buff.put_u8(instr.op.into());

            match &instr.operand {
                Operand::None => {}
                // check_references guarantees the operand fits its opcode
                Operand::Int(n) => match instr.op {
                    Op::LdcI4 => self.buff.put_i32(*n as i32),
                    _ => self.buff.put_i64(*n),
                },
                Operand::Str(s) => self.str(s)?,
                Operand::Arg(n) | Operand::Local(n) => self.buff.put_u16(*n),
                Operand::Type(idx) => self.buff.put_u32(idx.0),
                Operand::Field(idx) => self.buff.put_u32(idx.0),
                Operand::Method(idx) => self.buff.put_u32(idx.0),
                Operand::Target(target) => {
                    let pos = positions.get(target).copied().unwrap_or(u32::MAX);
                    self.buff.put_u32(pos);
                }
            }
        }

        Ok(())
    }

    fn method(&mut self, method: &MethodDef) -> Result<(), WriteError> {
        let mut flags = 0;

        if method.is_static {
            flags |= FLAG_STATIC;
        }

        if method.has_body() {
            flags |= FLAG_BODY;
        }

        self.str(&method.name)?;
        self.buff.put_u8(flags);
        self.params(&method.params)?;
        self.ret(method.ret);

        if let Some(body) = &method.body {
            self.body(body)?;
        }

        Ok(())
    }

    fn type_def(&mut self, ty: &TypeDef) -> Result<(), WriteError> {
        self.str(&ty.name)?;
        self.buff.put_u16(len_u16("fields", ty.fields.len())?);

        for field in ty.fields.iter() {
            self.str(&field.name)?;
            self.buff.put_u32(field.ty.0);
            self.buff
                .put_u8(if field.is_static { FLAG_STATIC } else { 0 });
        }

        self.buff.put_u16(len_u16("methods", ty.methods.len())?);

        for method in ty.methods.iter() {
            self.method(method)?;
        }

        Ok(())
    }

    fn module(&mut self, module: &Module) -> Result<(), WriteError> {
        self.buff.put_slice(MAGIC);
        self.buff.put_u16(FORMAT_VERSION);
        self.str(&module.name)?;

        self.buff
            .put_u16(len_u16("module references", module.modules.len())?);

        for name in module.modules.iter() {
            self.str(name)?;
        }

        self.buff
            .put_u32(len_u32("type references", module.type_refs.len())?);

        for ty in module.type_refs.iter() {
            self.buff.put_u16(match ty.scope {
                Scope::Local => 0,
                Scope::Module(idx) => idx + 1,
            });
            self.str(&ty.name)?;
        }

        self.buff
            .put_u32(len_u32("field references", module.field_refs.len())?);

        for field in module.field_refs.iter() {
            self.buff.put_u32(field.owner.0);
            self.str(&field.name)?;
            self.buff.put_u32(field.ty.0);
        }

        self.buff
            .put_u32(len_u32("method references", module.method_refs.len())?);

        for method in module.method_refs.iter() {
            self.buff.put_u32(method.owner.0);
            self.str(&method.name)?;
            self.buff
                .put_u8(if method.has_this { FLAG_HAS_THIS } else { 0 });
            self.params(&method.params)?;
            self.ret(method.ret);
        }

        self.buff.put_u32(len_u32("types", module.types.len())?);

        for ty in module.types.iter() {
            self.type_def(ty)?;
        }

        Ok(())
    }
}

impl Module {
    /// Validates every reference, then encodes the module.
    pub fn encode(&self) -> Result<Bytes, WriteError> {
        self.check_references()?;

        // Scope indices are written off by one
        len_u16("module references", self.modules.len() + 1)?;

        let mut encoder = Encoder {
            buff: BytesMut::new(),
        };
        encoder.module(self)?;

        Ok(encoder.buff.freeze())
    }

    /// Overwrites `path`, which is only touched once encoding succeeded.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), WriteError> {
        let bytes = self.encode()?;
        fs::write(path, &bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{FieldDef, FieldRef, FieldRefIdx, MethodRef, TypeRef};

    fn sample() -> Module {
        let mut module = Module::new("Game");
        let scope = module.scope_for("mscorlib");
        let string = module.add_type_ref(TypeRef {
            scope,
            name: "System.String".to_string(),
        });
        let console = module.add_type_ref(TypeRef {
            scope,
            name: "System.Console".to_string(),
        });
        let local = module.add_type_ref(TypeRef {
            scope: Scope::Local,
            name: "Game.Main".to_string(),
        });
        let write_line = module.add_method_ref(MethodRef {
            owner: console,
            name: "WriteLine".to_string(),
            has_this: false,
            params: vec![string],
            ret: None,
        });
        let greeting = module.add_field_ref(FieldRef {
            owner: local,
            name: "Greeting".to_string(),
            ty: string,
        });

        let mut body = Body::new(1);
        body.push(Op::Ldsfld, Operand::Field(greeting));
        body.push(Op::Brfalse, Operand::Target(InstrId(6)));
        body.push(Op::Ldstr, Operand::Str("hello".to_string()));
        body.push(Op::Call, Operand::Method(write_line));
        body.push(Op::LdcI8, Operand::Int(i64::MIN));
        body.push(Op::Pop, Operand::None);
        body.push(Op::Ret, Operand::None);

        let mut ty = TypeDef::new("Game.Main");
        ty.fields.push(FieldDef {
            name: "Greeting".to_string(),
            ty: string,
            is_static: true,
        });
        ty.methods.push(MethodDef {
            name: "Start".to_string(),
            is_static: true,
            params: vec![],
            ret: None,
            body: Some(body),
        });
        ty.methods.push(MethodDef {
            name: "Extern".to_string(),
            is_static: false,
            params: vec![string, string],
            ret: Some(string),
            body: None,
        });
        module.types.push(ty);
        module
    }

    #[test]
    fn test_encode_decode_identical() {
        let module = sample();
        let bytes = module.encode().unwrap();
        let decoded = Module::decode(&bytes).unwrap();

        assert_eq!(decoded, module);
        assert_eq!(decoded.encode().unwrap(), bytes);
    }

    #[test]
    fn test_encode_rejects_unresolved() {
        let mut module = sample();
        let body = module.types[0].methods[0].body.as_mut().unwrap();
        body.push(Op::Stsfld, Operand::Field(FieldRefIdx(99)));

        assert!(matches!(
            module.encode(),
            Err(WriteError::Unresolved(Unresolved::Field { index: 99, .. }))
        ));
    }

    #[test]
    fn test_write_failure_keeps_file() {
        let dir = temp_dir::TempDir::new().unwrap();
        let path = dir.child("Game.bmod");
        fs::write(&path, b"original").unwrap();

        let mut module = sample();
        module.type_refs = crate::collections::OrderedSet::from_vec(vec![]);

        assert!(module.write(&path).is_err());
        assert_eq!(fs::read(&path).unwrap(), b"original");
    }
}
