use tracing::{debug, info};

use crate::{
    module::{Body, Module, Op, Operand, TypeRefIdx},
    resolver::{Definition, Resolve, Symbol},
};

use super::{CallSite, Importer, PatchError, PatchRule};

/// Rewrites matched calls into `field = (FieldType) combinator(argument, field)`.
pub struct Patcher {
    field: Definition,
    combinator: Definition,
}

impl Patcher {
    /// Resolves the shared field of the bridge module and the combinator of the runtime
    /// module, checking both have the expected shape.
    pub fn new(resolver: &mut impl Resolve, rule: &PatchRule) -> Result<Self, PatchError> {
        let field = resolver.resolve(&Symbol::Field {
            module: &rule.bridge_module,
            owner: &rule.bridge_type,
            name: &rule.bridge_field,
        })?;

        if !field.field().is_some_and(|field| field.is_static) {
            return Err(PatchError::FieldNotStatic(format!(
                "{}::{}",
                rule.bridge_type, rule.bridge_field
            )));
        }

        let combinator = resolver.resolve(&Symbol::Method {
            module: &rule.runtime_module,
            owner: &rule.combinator_type,
            name: &rule.combinator,
            arity: 2,
        })?;

        let module = combinator.module();
        let same_type = |lhs: TypeRefIdx, rhs: TypeRefIdx| {
            module.type_ref(lhs).is_some() && module.type_ref(lhs) == module.type_ref(rhs)
        };
        let is_combinator = combinator.method().is_some_and(|method| {
            method.is_static
                && match (method.params.as_slice(), method.ret) {
                    ([lhs, rhs], Some(ret)) => same_type(*lhs, *rhs) && same_type(*lhs, ret),
                    _ => false,
                }
        });

        if !is_combinator {
            return Err(PatchError::BadCombinator(format!(
                "{}::{}",
                rule.combinator_type, rule.combinator
            )));
        }

        debug!(
            field = %rule.bridge_field,
            combinator = %rule.combinator,
            "bridge ready"
        );

        Ok(Self { field, combinator })
    }

    pub fn bridge_module(&self) -> &str {
        &self.field.module().name
    }

    pub fn patch(&self, module: &mut Module, site: CallSite) -> Result<(), PatchError> {
        let method = module
            .types
            .get_mut(site.ty)
            .and_then(|ty| ty.methods.get_mut(site.method))
            .ok_or(PatchError::StaleSite(site))?;
        let returns = method.ret.is_some();
        let mut body = method.body.take().ok_or(PatchError::MissingBody(site))?;

        let result = self.rewrite(module, &mut body, site, returns);

        module.types[site.ty].methods[site.method].body = Some(body);
        result
    }

    fn rewrite(
        &self,
        module: &mut Module,
        body: &mut Body,
        site: CallSite,
        returns: bool,
    ) -> Result<(), PatchError> {
        let call = body.get(site.instr).ok_or(PatchError::StaleSite(site))?;
        let expected = call
            .stack_effect(module)
            .ok_or(PatchError::UnknownStackEffect(site))?
            .net();

        let mut importer = Importer::new(module);
        let field = importer.field(&self.field)?;
        let combine = importer.method(&self.combinator)?;
        let field_ty = match self.field.field() {
            Some(def) => importer.type_ref(self.field.module(), def.ty)?,
            None => return Err(PatchError::StaleSite(site)),
        };

        let sequence = vec![
            body.create(Op::Ldsfld, Operand::Field(field)),
            body.create(Op::Call, Operand::Method(combine)),
            body.create(Op::Castclass, Operand::Type(field_ty)),
            body.create(Op::Stsfld, Operand::Field(field)),
        ];

        let actual = sequence
            .iter()
            .map(|instr| instr.stack_effect(module).map(|effect| effect.net()))
            .sum::<Option<i32>>()
            .ok_or(PatchError::UnknownStackEffect(site))?;

        if actual != expected {
            return Err(PatchError::StackImbalance { expected, actual });
        }

        body.replace(site.instr, sequence)?;

        let max_stack = body.compute_max_stack(module, returns)?;
        body.max_stack = body.max_stack.max(max_stack);

        info!(module = %module.name, site = %site, "patched call site");

        Ok(())
    }
}
