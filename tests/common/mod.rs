#![allow(dead_code)]

use std::{
    fs,
    path::{Path, PathBuf},
};

use ureglog::{
    discover,
    module::{
        Body, FieldDef, MethodDef, MethodRef, Module, Op, Operand, TypeDef, TypeRef, TypeRefIdx,
    },
    Driver, Error, PatchRule, Report, SearchPathResolver,
};

pub const UNITY: &str = "UnityEngine";
pub const APPLICATION: &str = "UnityEngine.Application";
pub const LOG_CALLBACK: &str = "UnityEngine.Application/LogCallback";

fn type_ref(module: &mut Module, scope: &str, name: &str) -> TypeRefIdx {
    let scope = module.scope_for(scope);
    module.add_type_ref(TypeRef {
        scope,
        name: name.to_string(),
    })
}

fn method(name: &str, is_static: bool, params: Vec<TypeRefIdx>, ret: Option<TypeRefIdx>) -> MethodDef {
    MethodDef {
        name: name.to_string(),
        is_static,
        params,
        ret,
        body: None,
    }
}

/// Base runtime module defining `System.Delegate::Combine`.
pub fn runtime(static_combine: bool) -> Module {
    let mut module = Module::new("mscorlib");
    let delegate = type_ref(&mut module, "mscorlib", "System.Delegate");
    let array = type_ref(&mut module, "mscorlib", "System.Delegate[]");

    let mut ty = TypeDef::new("System.Delegate");
    ty.methods.push(method("Combine", static_combine, vec![delegate, delegate], Some(delegate)));
    ty.methods.push(method("Combine", true, vec![array], Some(delegate)));
    ty.methods.push(method("Remove", true, vec![delegate, delegate], Some(delegate)));
    module.types.push(ty);
    module
}

/// Bridge module owning the shared `LogCallback` field.
pub fn bridge(rule: &PatchRule, static_field: bool) -> Module {
    let mut module = Module::new(rule.bridge_module.clone());
    let callback = type_ref(&mut module, UNITY, LOG_CALLBACK);

    let mut ty = TypeDef::new(rule.bridge_type.clone());
    ty.fields.push(FieldDef {
        name: rule.bridge_field.clone(),
        ty: callback,
        is_static: static_field,
    });
    module.types.push(ty);
    module
}

/// A module whose `Awake` method calls `calls` times `Application.RegisterLogCallback`,
/// plus an `Install` method doing the same through `callvirt` that must not match.
pub fn game(name: &str, calls: usize) -> Module {
    let mut module = Module::new(name);
    let callback = type_ref(&mut module, UNITY, LOG_CALLBACK);
    let application = type_ref(&mut module, UNITY, APPLICATION);
    let register = module.add_method_ref(MethodRef {
        owner: application,
        name: "RegisterLogCallback".to_string(),
        has_this: false,
        params: vec![callback],
        ret: None,
    });

    let mut awake = Body::new(1);
    for _ in 0..calls {
        awake.push(Op::Ldarg, Operand::Arg(0));
        awake.push(Op::Call, Operand::Method(register));
    }
    awake.push(Op::Ret, Operand::None);

    let mut install = Body::new(1);
    install.push(Op::Ldarg, Operand::Arg(0));
    install.push(Op::Callvirt, Operand::Method(register));
    install.push(Op::Ret, Operand::None);

    let mut ty = TypeDef::new(format!("{name}.Boot"));
    ty.methods.push(MethodDef {
        body: Some(awake),
        ..method("Awake", true, vec![callback], None)
    });
    ty.methods.push(MethodDef {
        body: Some(install),
        ..method("Install", true, vec![callback], None)
    });
    ty.methods.push(method("Declared", true, vec![], None));
    module.types.push(ty);
    module
}

pub fn write(dir: &Path, file: &str, module: &Module) -> PathBuf {
    let path = dir.join(file);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }

    module.write(&path).unwrap();
    path
}

/// Runtime and bridge modules in `dir`, as shipped next to the game modules.
pub fn install(dir: &Path, rule: &PatchRule) {
    write(dir, "mscorlib.bmod", &runtime(true));
    write(
        dir,
        &format!("{}.bmod", rule.bridge_module),
        &bridge(rule, true),
    );
}

pub fn run_with(root: &Path, rule: PatchRule) -> (Result<Report, Error>, String, usize) {
    let modules = discover::module_files(root);
    let resolver = SearchPathResolver::for_modules(&modules);
    let mut driver = Driver::new(resolver, rule);
    let mut out = vec![];

    let result = driver.run(&modules, &mut out);
    let attempts = driver.resolver().attempts();

    (result, String::from_utf8(out).unwrap(), attempts)
}

pub fn run(root: &Path) -> (Result<Report, Error>, String, usize) {
    run_with(root, PatchRule::default())
}

/// Number of `call` instructions to the target signature.
pub fn target_calls(module: &Module, rule: &PatchRule) -> usize {
    ureglog::patch::find_matches(module, &rule.target).count()
}

/// Number of `ldsfld; call Combine; castclass; stsfld` sequences.
pub fn replacements(module: &Module, rule: &PatchRule) -> usize {
    module
        .types
        .iter()
        .flat_map(|ty| ty.methods.iter())
        .filter_map(|method| method.body.as_ref())
        .map(|body| {
            body.instructions()
                .windows(4)
                .filter(|window| {
                    let ops = window.iter().map(|instr| instr.op).collect::<Vec<_>>();
                    let combines = match window[1].operand {
                        Operand::Method(idx) => module
                            .method_ref(idx)
                            .is_some_and(|method| method.name == rule.combinator),
                        _ => false,
                    };

                    ops == [Op::Ldsfld, Op::Call, Op::Castclass, Op::Stsfld]
                        && combines
                        && window[0].operand == window[3].operand
                })
                .count()
        })
        .sum()
}
