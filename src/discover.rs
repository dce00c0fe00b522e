use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
};

use tracing::warn;
use walkdir::WalkDir;

use crate::module::MODULE_EXTENSION;

/// Every module file beneath `root`, as absolute paths in sorted order.
pub fn module_files(root: impl AsRef<Path>) -> Vec<PathBuf> {
    let mut paths = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("skipping directory entry: {e}");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension() == Some(OsStr::new(MODULE_EXTENSION)))
        .map(|entry| std::path::absolute(entry.path()).unwrap_or_else(|_| entry.into_path()))
        .collect::<Vec<_>>();

    paths.sort();
    paths
}
