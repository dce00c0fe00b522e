use serde::Serialize;

use crate::collections::OrderedSet;

mod body;
mod check;
mod opcode;
mod reader;
mod writer;

pub use body::{Body, BodyError};
pub use check::Unresolved;
pub use opcode::{InstrId, Instruction, Op, Operand, OperandKind, StackEffect};
pub use reader::{ParseError, ReadError};
pub use writer::WriteError;

pub const MAGIC: &[u8; 4] = b"BMOD";
pub const FORMAT_VERSION: u16 = 1;
pub const MODULE_EXTENSION: &str = "bmod";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TypeRefIdx(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct FieldRefIdx(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct MethodRefIdx(pub u32);

/// Where a referenced type lives: this module or one of its external module references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Scope {
    Local,
    Module(u16),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TypeRef {
    pub scope: Scope,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FieldRef {
    pub owner: TypeRefIdx,
    pub name: String,
    pub ty: TypeRefIdx,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MethodRef {
    pub owner: TypeRefIdx,
    pub name: String,
    pub has_this: bool,
    pub params: Vec<TypeRefIdx>,
    pub ret: Option<TypeRefIdx>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDef {
    pub name: String,
    pub ty: TypeRefIdx,
    pub is_static: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodDef {
    pub name: String,
    pub is_static: bool,
    pub params: Vec<TypeRefIdx>,
    pub ret: Option<TypeRefIdx>,
    pub body: Option<Body>,
}

impl MethodDef {
    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeDef {
    pub name: String,
    pub fields: Vec<FieldDef>,
    pub methods: Vec<MethodDef>,
}

impl TypeDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: vec![],
            methods: vec![],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Module {
    pub name: String,
    pub modules: OrderedSet<String>,
    pub type_refs: OrderedSet<TypeRef>,
    pub field_refs: OrderedSet<FieldRef>,
    pub method_refs: OrderedSet<MethodRef>,
    pub types: Vec<TypeDef>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            modules: OrderedSet::default(),
            type_refs: OrderedSet::default(),
            field_refs: OrderedSet::default(),
            method_refs: OrderedSet::default(),
            types: vec![],
        }
    }

    pub fn type_position(&self, name: &str) -> Option<usize> {
        self.types.iter().position(|ty| ty.name == name)
    }

    /// Name of the module a scope points at, `None` for a dangling module reference.
    pub fn scope_name(&self, scope: Scope) -> Option<&str> {
        match scope {
            Scope::Local => Some(&self.name),
            Scope::Module(idx) => self.modules.get(idx as u32).map(String::as_str),
        }
    }

    pub fn scope_for(&mut self, module: &str) -> Scope {
        if module == self.name {
            Scope::Local
        } else {
            Scope::Module(self.modules.insert(module.to_string()) as u16)
        }
    }

    pub fn type_ref(&self, idx: TypeRefIdx) -> Option<&TypeRef> {
        self.type_refs.get(idx.0)
    }

    pub fn field_ref(&self, idx: FieldRefIdx) -> Option<&FieldRef> {
        self.field_refs.get(idx.0)
    }

    pub fn method_ref(&self, idx: MethodRefIdx) -> Option<&MethodRef> {
        self.method_refs.get(idx.0)
    }

    pub fn type_name(&self, idx: TypeRefIdx) -> Option<&str> {
        self.type_ref(idx).map(|ty| ty.name.as_str())
    }

    pub fn add_type_ref(&mut self, ty: TypeRef) -> TypeRefIdx {
        TypeRefIdx(self.type_refs.insert(ty))
    }

    pub fn add_field_ref(&mut self, field: FieldRef) -> FieldRefIdx {
        FieldRefIdx(self.field_refs.insert(field))
    }

    pub fn add_method_ref(&mut self, method: MethodRef) -> MethodRefIdx {
        MethodRefIdx(self.method_refs.insert(method))
    }

    /// `None` for a dangling reference or an argument count beyond `u16::MAX`.
    pub fn call_effect(&self, idx: MethodRefIdx) -> Option<StackEffect> {
        let method = self.method_ref(idx)?;
        let pops = u16::try_from(method.params.len())
            .ok()?
            .checked_add(method.has_this as u16)?;
        let pushes = method.ret.is_some() as u16;

        Some(StackEffect::new(pops, pushes))
    }
}
