use std::{fmt::Display, io, path::PathBuf, rc::Rc, sync::Arc};

use crate::module::{FieldDef, MethodDef, Module, ParseError, TypeDef};

mod search_path;

pub use search_path::SearchPathResolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Type,
    Field,
    Method,
}

impl Display for SymbolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SymbolKind::Type => "type",
            SymbolKind::Field => "field",
            SymbolKind::Method => "method",
        })
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ResolveError {
    #[error("module '{0}' was not found in any search directory")]
    ModuleNotFound(String),
    #[error("module '{name}' at {} is unreadable: {source}", path.display())]
    Parse {
        name: String,
        path: PathBuf,
        #[source]
        source: ParseError,
    },
    #[error("I/O error reading {}: {source}", path.display())]
    IO {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },
    #[error("no such type: {module}::{name}")]
    TypeNotFound { module: String, name: String },
    #[error("no such {kind} '{name}' in {module}::{owner}")]
    MemberNotFound {
        module: String,
        owner: String,
        name: String,
        kind: SymbolKind,
    },
    #[error("{count} methods named '{name}' take {arity} parameter(s) in {owner}")]
    Ambiguous {
        owner: String,
        name: String,
        arity: usize,
        count: usize,
    },
}

/// A fully qualified symbol in a named module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol<'a> {
    Type {
        module: &'a str,
        name: &'a str,
    },
    Field {
        module: &'a str,
        owner: &'a str,
        name: &'a str,
    },
    /// Methods are looked up by name and parameter count, not by full signature.
    Method {
        module: &'a str,
        owner: &'a str,
        name: &'a str,
        arity: usize,
    },
}

impl Symbol<'_> {
    pub fn kind(&self) -> SymbolKind {
        match self {
            Symbol::Type { .. } => SymbolKind::Type,
            Symbol::Field { .. } => SymbolKind::Field,
            Symbol::Method { .. } => SymbolKind::Method,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Item {
    Type,
    Field(usize),
    Method(usize),
}

/// A resolved symbol: a position inside a shared, read-only module.
#[derive(Debug, Clone)]
pub struct Definition {
    module: Rc<Module>,
    ty: usize,
    item: Item,
}

impl Definition {
    pub fn module(&self) -> &Rc<Module> {
        &self.module
    }

    pub fn type_def(&self) -> &TypeDef {
        &self.module.types[self.ty]
    }

    pub fn field(&self) -> Option<&FieldDef> {
        match self.item {
            Item::Field(idx) => self.type_def().fields.get(idx),
            _ => None,
        }
    }

    pub fn method(&self) -> Option<&MethodDef> {
        match self.item {
            Item::Method(idx) => self.type_def().methods.get(idx),
            _ => None,
        }
    }

    pub fn kind(&self) -> SymbolKind {
        match self.item {
            Item::Type => SymbolKind::Type,
            Item::Field(_) => SymbolKind::Field,
            Item::Method(_) => SymbolKind::Method,
        }
    }
}

pub trait Resolve {
    fn resolve_module(&mut self, name: &str) -> Result<Rc<Module>, ResolveError>;

    fn resolve(&mut self, symbol: &Symbol) -> Result<Definition, ResolveError> {
        let (module_name, owner) = match *symbol {
            Symbol::Type { module, name } => (module, name),
            Symbol::Field { module, owner, .. } | Symbol::Method { module, owner, .. } => {
                (module, owner)
            }
        };

        let module = self.resolve_module(module_name)?;
        let ty = module
            .type_position(owner)
            .ok_or_else(|| ResolveError::TypeNotFound {
                module: module_name.to_string(),
                name: owner.to_string(),
            })?;
        let type_def = &module.types[ty];
        let not_found = |name: &str| ResolveError::MemberNotFound {
            module: module_name.to_string(),
            owner: owner.to_string(),
            name: name.to_string(),
            kind: symbol.kind(),
        };

        let item = match *symbol {
            Symbol::Type { .. } => Item::Type,
            Symbol::Field { name, .. } => type_def
                .fields
                .iter()
                .position(|field| field.name == name)
                .map(Item::Field)
                .ok_or_else(|| not_found(name))?,
            Symbol::Method { name, arity, .. } => {
                let candidates = type_def
                    .methods
                    .iter()
                    .enumerate()
                    .filter(|(_, method)| method.name == name && method.params.len() == arity)
                    .map(|(idx, _)| idx)
                    .collect::<Vec<_>>();

                match candidates.as_slice() {
                    [] => return Err(not_found(name)),
                    [idx] => Item::Method(*idx),
                    _ => {
                        return Err(ResolveError::Ambiguous {
                            owner: owner.to_string(),
                            name: name.to_string(),
                            arity,
                            count: candidates.len(),
                        })
                    }
                }
            }
        };

        Ok(Definition { module, ty, item })
    }
}
