use crate::{
    module::{FieldRef, FieldRefIdx, MethodRef, MethodRefIdx, Module, TypeRef, TypeRefIdx},
    resolver::{Definition, SymbolKind},
};

use super::PatchError;

/// Adds references to definitions of other modules to a module's tables.
///
/// Entries are deduplicated, importing the same definition twice yields the same index.
pub struct Importer<'a> {
    target: &'a mut Module,
}

impl<'a> Importer<'a> {
    pub fn new(target: &'a mut Module) -> Self {
        Self { target }
    }

    pub fn named_type(&mut self, module: &str, name: &str) -> TypeRefIdx {
        let scope = self.target.scope_for(module);

        self.target.add_type_ref(TypeRef {
            scope,
            name: name.to_string(),
        })
    }

    /// Imports type reference `idx` of `source`.
    pub fn type_ref(&mut self, source: &Module, idx: TypeRefIdx) -> Result<TypeRefIdx, PatchError> {
        let dangling = || PatchError::Import {
            module: source.name.clone(),
            index: idx.0,
        };
        let ty = source.type_ref(idx).ok_or_else(dangling)?;
        let module = source.scope_name(ty.scope).ok_or_else(dangling)?;

        Ok(self.named_type(module, &ty.name))
    }

    fn owner(&mut self, def: &Definition) -> TypeRefIdx {
        self.named_type(&def.module().name, &def.type_def().name)
    }

    pub fn field(&mut self, def: &Definition) -> Result<FieldRefIdx, PatchError> {
        let field = def.field().ok_or(PatchError::WrongKind {
            expected: SymbolKind::Field,
            found: def.kind(),
        })?;

        let owner = self.owner(def);
        let ty = self.type_ref(def.module(), field.ty)?;

        Ok(self.target.add_field_ref(FieldRef {
            owner,
            name: field.name.clone(),
            ty,
        }))
    }

    pub fn method(&mut self, def: &Definition) -> Result<MethodRefIdx, PatchError> {
        let method = def.method().ok_or(PatchError::WrongKind {
            expected: SymbolKind::Method,
            found: def.kind(),
        })?;

        let owner = self.owner(def);
        let params = method
            .params
            .iter()
            .map(|param| self.type_ref(def.module(), *param))
            .collect::<Result<Vec<_>, _>>()?;
        let ret = match method.ret {
            Some(ret) => Some(self.type_ref(def.module(), ret)?),
            None => None,
        };

        Ok(self.target.add_method_ref(MethodRef {
            owner,
            name: method.name.clone(),
            has_this: !method.is_static,
            params,
            ret,
        }))
    }
}
