use super::{Module, Op, Operand, Scope, TypeRefIdx};

/// First reference in a module that does not point at an entry of its tables.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum Unresolved {
    #[error("type reference #{index} is scoped to unknown module reference {scope}")]
    Scope { index: u32, scope: u16 },
    #[error("{site} refers to missing type reference #{index}")]
    Type { site: String, index: u32 },
    #[error("{site} refers to missing field reference #{index}")]
    Field { site: String, index: u32 },
    #[error("{site} refers to missing method reference #{index}")]
    Method { site: String, index: u32 },
    #[error("{site}: operand of instruction {position} does not fit '{op}'")]
    Operand { site: String, position: usize, op: Op },
    #[error("{site}: branch at instruction {position} targets a removed instruction")]
    Branch { site: String, position: usize },
}

impl Module {
    fn check_type(&self, idx: TypeRefIdx, site: impl FnOnce() -> String) -> Result<(), Unresolved> {
        match self.type_ref(idx) {
            Some(_) => Ok(()),
            None => Err(Unresolved::Type {
                site: site(),
                index: idx.0,
            }),
        }
    }

    /// Verifies that every operand and table entry resolves within the module.
    pub fn check_references(&self) -> Result<(), Unresolved> {
        for (index, ty) in self.type_refs.iter().enumerate() {
            if let Scope::Module(scope) = ty.scope {
                if self.modules.get(scope as u32).is_none() {
                    return Err(Unresolved::Scope {
                        index: index as u32,
                        scope,
                    });
                }
            }
        }

        for (index, field) in self.field_refs.iter().enumerate() {
            let site = || format!("field reference #{index}");
            self.check_type(field.owner, site)?;
            self.check_type(field.ty, site)?;
        }

        for (index, method) in self.method_refs.iter().enumerate() {
            let site = || format!("method reference #{index}");
            self.check_type(method.owner, site)?;

            for param in method.params.iter().chain(method.ret.iter()) {
                self.check_type(*param, site)?;
            }
        }

        for ty in self.types.iter() {
            for field in ty.fields.iter() {
                self.check_type(field.ty, || format!("{}::{}", ty.name, field.name))?;
            }

            for method in ty.methods.iter() {
                let site = || format!("{}::{}", ty.name, method.name);

                for param in method.params.iter().chain(method.ret.iter()) {
                    self.check_type(*param, site)?;
                }

                let Some(body) = &method.body else {
                    continue;
                };

                for local in body.locals.iter() {
                    self.check_type(*local, site)?;
                }

                for (position, instr) in body.instructions().iter().enumerate() {
                    if !instr.operand.fits(instr.op.operand_kind()) {
                        return Err(Unresolved::Operand {
                            site: site(),
                            position,
                            op: instr.op,
                        });
                    }

                    match instr.operand {
                        Operand::Type(idx) => self.check_type(idx, site)?,
                        Operand::Field(idx) if self.field_ref(idx).is_none() => {
                            return Err(Unresolved::Field {
                                site: site(),
                                index: idx.0,
                            })
                        }
                        Operand::Method(idx) if self.method_ref(idx).is_none() => {
                            return Err(Unresolved::Method {
                                site: site(),
                                index: idx.0,
                            })
                        }
                        Operand::Target(target) if body.position(target).is_none() => {
                            return Err(Unresolved::Branch {
                                site: site(),
                                position,
                            })
                        }
                        _ => {}
                    }
                }
            }
        }

        Ok(())
    }
}
