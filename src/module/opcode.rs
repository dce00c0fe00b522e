use std::fmt::Display;

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::Serialize;

use super::{FieldRefIdx, MethodRefIdx, Module, TypeRefIdx};

#[derive(TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Op {
    Nop,
    Ldarg,
    Ldloc,
    Stloc,
    Ldnull,
    LdcI4,
    LdcI8,
    Ldstr,
    Ldfld,
    Stfld,
    Ldsfld,
    Stsfld,
    Ldftn,
    Newobj,
    Call,
    Callvirt,
    Castclass,
    Isinst,
    Box,
    Pop,
    Dup,
    Br,
    Brtrue,
    Brfalse,
    Ret,
    Add,
    Sub,
    Ceq,
    Throw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    None,
    I4,
    I8,
    Str,
    Arg,
    Local,
    Type,
    Field,
    Method,
    Target,
}

impl Op {
    pub fn operand_kind(self) -> OperandKind {
        match self {
            Op::Ldarg => OperandKind::Arg,
            Op::Ldloc | Op::Stloc => OperandKind::Local,
            Op::LdcI4 => OperandKind::I4,
            Op::LdcI8 => OperandKind::I8,
            Op::Ldstr => OperandKind::Str,
            Op::Ldfld | Op::Stfld | Op::Ldsfld | Op::Stsfld => OperandKind::Field,
            Op::Ldftn | Op::Newobj | Op::Call | Op::Callvirt => OperandKind::Method,
            Op::Castclass | Op::Isinst | Op::Box => OperandKind::Type,
            Op::Br | Op::Brtrue | Op::Brfalse => OperandKind::Target,
            Op::Nop
            | Op::Ldnull
            | Op::Pop
            | Op::Dup
            | Op::Ret
            | Op::Add
            | Op::Sub
            | Op::Ceq
            | Op::Throw => OperandKind::None,
        }
    }

    /// Control never falls through to the next instruction.
    pub fn ends_flow(self) -> bool {
        matches!(self, Op::Br | Op::Ret | Op::Throw)
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Op::Nop => "nop",
            Op::Ldarg => "ldarg",
            Op::Ldloc => "ldloc",
            Op::Stloc => "stloc",
            Op::Ldnull => "ldnull",
            Op::LdcI4 => "ldc.i4",
            Op::LdcI8 => "ldc.i8",
            Op::Ldstr => "ldstr",
            Op::Ldfld => "ldfld",
            Op::Stfld => "stfld",
            Op::Ldsfld => "ldsfld",
            Op::Stsfld => "stsfld",
            Op::Ldftn => "ldftn",
            Op::Newobj => "newobj",
            Op::Call => "call",
            Op::Callvirt => "callvirt",
            Op::Castclass => "castclass",
            Op::Isinst => "isinst",
            Op::Box => "box",
            Op::Pop => "pop",
            Op::Dup => "dup",
            Op::Br => "br",
            Op::Brtrue => "brtrue",
            Op::Brfalse => "brfalse",
            Op::Ret => "ret",
            Op::Add => "add",
            Op::Sub => "sub",
            Op::Ceq => "ceq",
            Op::Throw => "throw",
        }
    }
}

impl Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Identity of an instruction within its body, stable across insertions and removals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct InstrId(pub(super) u32);

impl Display for InstrId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "@{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Operand {
    None,
    Int(i64),
    Str(String),
    Arg(u16),
    Local(u16),
    Type(TypeRefIdx),
    Field(FieldRefIdx),
    Method(MethodRefIdx),
    Target(InstrId),
}

impl Operand {
    pub fn fits(&self, kind: OperandKind) -> bool {
        match (self, kind) {
            (Operand::None, OperandKind::None) => true,
            (Operand::Int(n), OperandKind::I4) => i32::try_from(*n).is_ok(),
            (Operand::Int(_), OperandKind::I8) => true,
            (Operand::Str(_), OperandKind::Str) => true,
            (Operand::Arg(_), OperandKind::Arg) => true,
            (Operand::Local(_), OperandKind::Local) => true,
            (Operand::Type(_), OperandKind::Type) => true,
            (Operand::Field(_), OperandKind::Field) => true,
            (Operand::Method(_), OperandKind::Method) => true,
            (Operand::Target(_), OperandKind::Target) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackEffect {
    pub pops: u16,
    pub pushes: u16,
}

impl StackEffect {
    pub const fn new(pops: u16, pushes: u16) -> Self {
        Self { pops, pushes }
    }

    pub fn net(&self) -> i32 {
        self.pushes as i32 - self.pops as i32
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Instruction {
    pub(super) id: InstrId,
    pub op: Op,
    pub operand: Operand,
}

impl Instruction {
    pub fn id(&self) -> InstrId {
        self.id
    }

    /// Returns `None` for `ret`, whose effect depends on the enclosing method, and for
    /// calls through a method reference that is not in the module's tables.
    pub fn stack_effect(&self, module: &Module) -> Option<StackEffect> {
        let effect = match self.op {
            Op::Nop | Op::Br => StackEffect::new(0, 0),
            Op::Ldarg
            | Op::Ldloc
            | Op::Ldnull
            | Op::LdcI4
            | Op::LdcI8
            | Op::Ldstr
            | Op::Ldsfld
            | Op::Ldftn => StackEffect::new(0, 1),
            Op::Stloc | Op::Stsfld | Op::Pop | Op::Brtrue | Op::Brfalse | Op::Throw => {
                StackEffect::new(1, 0)
            }
            Op::Ldfld | Op::Castclass | Op::Isinst | Op::Box => StackEffect::new(1, 1),
            Op::Stfld => StackEffect::new(2, 0),
            Op::Dup => StackEffect::new(1, 2),
            Op::Add | Op::Sub | Op::Ceq => StackEffect::new(2, 1),
            Op::Call | Op::Callvirt => match self.operand {
                Operand::Method(idx) => module.call_effect(idx)?,
                _ => return None,
            },
            Op::Newobj => match self.operand {
                Operand::Method(idx) => {
                    let method = module.method_ref(idx)?;
                    StackEffect::new(u16::try_from(method.params.len()).ok()?, 1)
                }
                _ => return None,
            },
            Op::Ret => return None,
        };

        Some(effect)
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.operand {
            Operand::None => write!(f, "{}", self.op),
            Operand::Int(n) => write!(f, "{} {n}", self.op),
            Operand::Str(s) => write!(f, "{} {s:?}", self.op),
            Operand::Arg(n) | Operand::Local(n) => write!(f, "{} {n}", self.op),
            Operand::Type(idx) => write!(f, "{} type#{}", self.op, idx.0),
            Operand::Field(idx) => write!(f, "{} field#{}", self.op, idx.0),
            Operand::Method(idx) => write!(f, "{} method#{}", self.op, idx.0),
            Operand::Target(id) => write!(f, "{} {id}", self.op),
        }
    }
}
