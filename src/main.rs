use std::{
    io,
    path::{Path, PathBuf},
    process::exit,
};

use argh::FromArgs;
use ron::ser::PrettyConfig;
use tracing_subscriber::EnvFilter;
use ureglog::{discover, Driver, Error, Module, PatchRule, SearchPathResolver};

/// Redirects log callback registrations in compiled modules to the bridge module
#[derive(FromArgs)]
struct Opts {
    #[argh(subcommand)]
    cmd: Cmd,
}

/// Command
#[derive(FromArgs)]
#[argh(subcommand)]
enum Cmd {
    Patch(PatchCmd),
    Dump(DumpCmd),
}

/// Patch every module beneath a folder
#[derive(FromArgs)]
#[argh(subcommand, name = "patch")]
struct PatchCmd {
    #[argh(positional)]
    assets: PathBuf,
    #[argh(option, description = "RON file overriding the default patch rule")]
    rule: Option<PathBuf>,
    #[argh(switch, description = "report matches without writing")]
    dry_run: bool,
}

/// Print a module
#[derive(FromArgs)]
#[argh(subcommand, name = "dump")]
struct DumpCmd {
    #[argh(positional)]
    module: PathBuf,
}

const USAGE: &str = "ureglog patch <assets> [--rule <file>] [--dry-run]";

fn patch(cmd: PatchCmd) -> Result<(), Error> {
    if !cmd.assets.is_dir() {
        return Err(Error::Usage(format!(
            "'{}' is not a folder\n{USAGE}",
            cmd.assets.display()
        )));
    }

    let rule = match cmd.rule {
        Some(path) => PatchRule::load(path)?,
        None => PatchRule::default(),
    };

    let modules = discover::module_files(&cmd.assets);
    let resolver = SearchPathResolver::for_modules(&modules);
    let mut driver = Driver::new(resolver, rule).dry_run(cmd.dry_run);

    driver.run(&modules, &mut io::stdout().lock())?;

    Ok(())
}

fn dump(path: &Path) -> Result<(), Error> {
    let module = Module::read(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;

    println!(
        "{}",
        ron::ser::to_string_pretty(
            &module,
            PrettyConfig::default()
                .struct_names(true)
                .indentor("  ")
                .compact_arrays(true)
        )?
    );

    Ok(())
}

fn cmd(opts: Opts) -> Result<(), Error> {
    match opts.cmd {
        Cmd::Patch(cmd) => patch(cmd),
        Cmd::Dump(DumpCmd { module }) => dump(&module),
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let opts = argh::from_env();

    match cmd(opts) {
        Ok(()) => {}
        Err(Error::Usage(message)) => {
            eprintln!("{message}");
            exit(1);
        }
        Err(e) => eprintln!("Fatal error: {e}"),
    }
}
