mod import;
mod matcher;
mod patcher;
mod rule;

pub use import::Importer;
pub use matcher::{find_matches, CallSite};
pub use patcher::Patcher;
pub use rule::{CallKind, CallSignature, PatchRule};

use crate::{
    module::BodyError,
    resolver::{ResolveError, SymbolKind},
};

#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    #[error("{0}")]
    Resolve(#[from] ResolveError),
    #[error("expected a {expected}, found a {found}")]
    WrongKind {
        expected: SymbolKind,
        found: SymbolKind,
    },
    #[error("field '{0}' is not a shared (static) field")]
    FieldNotStatic(String),
    #[error("'{0}' is not a static two-parameter method returning its parameter type")]
    BadCombinator(String),
    #[error("module '{module}' has no type reference #{index}")]
    Import { module: String, index: u32 },
    #[error("call site {0} no longer exists")]
    StaleSite(CallSite),
    #[error("method of call site {0} has no body")]
    MissingBody(CallSite),
    #[error("unknown stack effect at call site {0}")]
    UnknownStackEffect(CallSite),
    #[error("replacement changes the stack by {actual}, the original call by {expected}")]
    StackImbalance { expected: i32, actual: i32 },
    #[error("{0}")]
    Body(#[from] BodyError),
}
