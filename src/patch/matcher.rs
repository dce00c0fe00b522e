use std::fmt::Display;

use crate::module::{InstrId, Instruction, Module, Operand};

use super::CallSignature;

/// A matched call, addressed by type and method position and instruction identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSite {
    pub ty: usize,
    pub method: usize,
    pub instr: InstrId,
}

impl Display for CallSite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "type #{}, method #{}, {}", self.ty, self.method, self.instr)
    }
}

impl CallSignature {
    /// Nominal match on the declaring type and method name of the operand.
    pub fn matches(&self, module: &Module, instr: &Instruction) -> bool {
        if instr.op != self.kind.op() {
            return false;
        }

        let Operand::Method(idx) = instr.operand else {
            return false;
        };

        match module.method_ref(idx) {
            Some(method) => {
                method.name == self.method
                    && module.type_name(method.owner) == Some(self.declaring_type.as_str())
            }
            None => false,
        }
    }
}

pub fn find_matches<'a>(
    module: &'a Module,
    signature: &'a CallSignature,
) -> impl Iterator<Item = CallSite> + 'a {
    module
        .types
        .iter()
        .enumerate()
        .flat_map(move |(ty, type_def)| {
            type_def
                .methods
                .iter()
                .enumerate()
                .filter_map(|(method, def)| def.body.as_ref().map(|body| (method, body)))
                .flat_map(move |(method, body)| {
                    body.instructions()
                        .iter()
                        .filter(move |instr| signature.matches(module, instr))
                        .map(move |instr| CallSite {
                            ty,
                            method,
                            instr: instr.id(),
                        })
                })
        })
}
