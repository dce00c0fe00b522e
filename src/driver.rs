use std::{
    io::Write,
    path::{Path, PathBuf},
};

use tracing::{debug, info, warn};

use crate::{
    error::Error,
    module::Module,
    patch::{find_matches, PatchRule, Patcher},
    resolver::Resolve,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Patched { sites: usize },
    /// Dry run: the module has matches but was left untouched.
    Matched { sites: usize },
    NoMatches,
    Unreadable(String),
    Bridge,
    /// File name matches one of the rule's exclusions.
    Excluded,
}

#[derive(Debug, Default)]
pub struct Report {
    pub modules: Vec<(PathBuf, Outcome)>,
}

impl Report {
    pub fn patched(&self) -> impl Iterator<Item = &Path> {
        self.modules
            .iter()
            .filter(|(_, outcome)| matches!(outcome, Outcome::Patched { .. }))
            .map(|(path, _)| path.as_path())
    }

    pub fn outcome(&self, path: impl AsRef<Path>) -> Option<&Outcome> {
        self.modules
            .iter()
            .find(|(p, _)| p == path.as_ref())
            .map(|(_, outcome)| outcome)
    }
}

/// Runs one patch rule over a batch of module files, strictly one module at a time.
pub struct Driver<R: Resolve> {
    resolver: R,
    rule: PatchRule,
    dry_run: bool,
}

impl<R: Resolve> Driver<R> {
    pub fn new(resolver: R, rule: PatchRule) -> Self {
        Self {
            resolver,
            rule,
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Resolves the bridge once, then patches every module in `paths`.
    ///
    /// Unreadable modules are skipped, any other failure aborts the run. One line is
    /// written to `out` per patched module.
    pub fn run(&mut self, paths: &[PathBuf], out: &mut impl Write) -> Result<Report, Error> {
        self.resolver.resolve_module(&self.rule.bridge_module)?;
        let patcher = Patcher::new(&mut self.resolver, &self.rule)?;

        let mut report = Report::default();

        for path in paths {
            let outcome = match self.excluded(path) {
                Some(outcome) => outcome,
                None => self.process(path, &patcher, out)?,
            };

            debug!(path = %path.display(), ?outcome, "module done");
            report.modules.push((path.clone(), outcome));
        }

        Ok(report)
    }

    fn excluded(&self, path: &Path) -> Option<Outcome> {
        if path
            .file_stem()
            .is_some_and(|stem| stem.to_string_lossy() == self.rule.bridge_module)
        {
            return Some(Outcome::Bridge);
        }

        let name = path.file_name()?.to_string_lossy();

        self.rule
            .exclude_files
            .iter()
            .any(|pattern| name.contains(pattern.as_str()))
            .then_some(Outcome::Excluded)
    }

    fn process(
        &self,
        path: &Path,
        patcher: &Patcher,
        out: &mut impl Write,
    ) -> Result<Outcome, Error> {
        let mut module = match Module::read(path) {
            Ok(module) => module,
            Err(e) => {
                warn!(path = %path.display(), "skipping unreadable module: {e}");
                return Ok(Outcome::Unreadable(e.to_string()));
            }
        };

        if module.name == patcher.bridge_module() {
            return Ok(Outcome::Bridge);
        }

        let sites = find_matches(&module, &self.rule.target).collect::<Vec<_>>();

        if sites.is_empty() {
            return Ok(Outcome::NoMatches);
        }

        if self.dry_run {
            writeln!(out, "Would patch {} ({} call site(s))", path.display(), sites.len())?;
            return Ok(Outcome::Matched { sites: sites.len() });
        }

        for site in sites.iter() {
            patcher.patch(&mut module, *site)?;
        }

        module.write(path).map_err(|source| Error::Write {
            path: path.to_path_buf(),
            source,
        })?;

        info!(path = %path.display(), sites = sites.len(), "module patched");
        writeln!(out, "Successfully patched {}", path.display())?;

        Ok(Outcome::Patched { sites: sites.len() })
    }
}
