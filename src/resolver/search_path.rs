use std::{
    collections::HashMap,
    ffi::OsStr,
    fs, io,
    path::{Path, PathBuf},
    rc::Rc,
    sync::Arc,
};

use tracing::{debug, warn};
use wyhash2::WyHash;

use crate::{
    collections::OrderedSet,
    module::{Module, MODULE_EXTENSION},
};

use super::{Resolve, ResolveError};

/// Resolves modules by declared name from a list of directories.
///
/// Every lookup, failed ones included, is cached for the lifetime of the resolver.
pub struct SearchPathResolver {
    search_dirs: OrderedSet<PathBuf>,
    cache: HashMap<String, Result<Rc<Module>, ResolveError>, WyHash>,
    attempts: usize,
}

impl Default for SearchPathResolver {
    fn default() -> Self {
        Self {
            search_dirs: OrderedSet::default(),
            cache: HashMap::with_hasher(WyHash::default()),
            attempts: 0,
        }
    }
}

impl SearchPathResolver {
    /// Search directories are the distinct parent folders of `modules`.
    pub fn for_modules<P: AsRef<Path>>(modules: impl IntoIterator<Item = P>) -> Self {
        let mut resolver = Self::default();

        for path in modules {
            if let Some(dir) = path.as_ref().parent() {
                let dir = fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf());
                resolver.add_search_dir(dir);
            }
        }

        resolver
    }

    pub fn add_search_dir(&mut self, dir: PathBuf) {
        self.search_dirs.insert(dir);
    }

    pub fn search_dirs(&self) -> impl Iterator<Item = &PathBuf> {
        self.search_dirs.iter()
    }

    /// Number of lookups that went to disk.
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    /// `<name>.bmod` first, then every other module file in the directory.
    fn candidates(dir: &Path, name: &str) -> Vec<PathBuf> {
        let exact = dir.join(format!("{name}.{MODULE_EXTENSION}"));
        let mut others = fs::read_dir(dir)
            .map(|entries| {
                entries
                    .flatten()
                    .map(|entry| entry.path())
                    .filter(|path| path.extension() == Some(OsStr::new(MODULE_EXTENSION)))
                    .filter(|path| path != &exact && path.is_file())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        others.sort();

        let mut candidates = vec![];

        if exact.is_file() {
            candidates.push(exact);
        }

        candidates.extend(others);
        candidates
    }

    fn find_module(&self, name: &str) -> Result<Rc<Module>, ResolveError> {
        let reads = self
            .search_dirs
            .iter()
            .flat_map(|dir| Self::candidates(dir, name))
            .map(|path| {
                let bytes = fs::read(&path);
                (path, bytes)
            });

        Self::select(name, reads)
    }

    /// First candidate whose header declares `name`.
    ///
    /// Unreadable candidates are skipped. If nothing matches and `<name>.bmod` itself was
    /// unreadable, that I/O error is returned instead of `ModuleNotFound`.
    fn select(
        name: &str,
        reads: impl IntoIterator<Item = (PathBuf, io::Result<Vec<u8>>)>,
    ) -> Result<Rc<Module>, ResolveError> {
        let exact = format!("{name}.{MODULE_EXTENSION}");
        let mut unreadable = None;

        for (path, bytes) in reads {
            let bytes = match bytes {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(path = %path.display(), "skipping unreadable module candidate: {e}");

                    if unreadable.is_none() && path.file_name() == Some(OsStr::new(&exact)) {
                        unreadable = Some(ResolveError::IO {
                            path,
                            source: Arc::new(e),
                        });
                    }

                    continue;
                }
            };

            match Module::peek_name(&bytes) {
                Ok(declared) if declared == name => {}
                _ => continue,
            }

            let module = Module::decode(&bytes).map_err(|source| ResolveError::Parse {
                name: name.to_string(),
                path: path.clone(),
                source,
            })?;

            debug!(module = name, path = %path.display(), "resolved module");

            return Ok(Rc::new(module));
        }

        Err(unreadable.unwrap_or_else(|| ResolveError::ModuleNotFound(name.to_string())))
    }
}

impl Resolve for SearchPathResolver {
    fn resolve_module(&mut self, name: &str) -> Result<Rc<Module>, ResolveError> {
        if let Some(cached) = self.cache.get(name) {
            debug!(module = name, "module cache hit");
            return cached.clone();
        }

        self.attempts += 1;

        let result = self.find_module(name);
        self.cache.insert(name.to_string(), result.clone());
        result
    }
}
