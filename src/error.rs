use std::path::PathBuf;

use crate::{
    module::{ReadError, WriteError},
    patch::PatchError,
    resolver::ResolveError,
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("usage: {0}")]
    Usage(String),
    #[error("I/O error: {0}")]
    IO(#[from] std::io::Error),
    #[error("ResolveError: {0}")]
    Resolve(#[from] ResolveError),
    #[error("PatchError: {0}")]
    Patch(#[from] PatchError),
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: ReadError,
    },
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: WriteError,
    },
    #[error("RuleError: {0}")]
    Rule(#[from] ron::error::SpannedError),
    #[error("SerializeError: {0}")]
    Serialize(#[from] ron::Error),
}
