use std::{
    io::{self, Write},
    path::PathBuf,
    process::ExitCode,
};

use anyhow::{Result, bail};
use clap::Parser;
use log::{LevelFilter, error};
use pyfold::{
    BundleOrchestrator, Config, OutputMode, config::parse_python_version, write_bundle,
};

#[derive(Parser, Debug)]
#[command(name = "pyfold", version, about, long_about = None)]
struct Cli {
    /// Entry point Python script
    #[arg(short, long)]
    entry: PathBuf,

    /// Output file for the bundle
    #[arg(short, long, required_unless_present = "stdout", conflicts_with = "stdout")]
    output: Option<PathBuf>,

    /// Write the bundle to standard output
    #[arg(long)]
    stdout: bool,

    /// Additional directory to search for modules (repeatable)
    #[arg(long = "add-python-path", value_name = "DIR")]
    python_paths: Vec<PathBuf>,

    /// Module to bundle even if no static import names it (repeatable)
    #[arg(long = "add-python-module", value_name = "NAME")]
    python_modules: Vec<String>,

    /// Interpreter whose default sys.path is appended to the search roots
    #[arg(long, value_name = "PATH")]
    python_binary: Option<PathBuf>,

    /// Python 3 minor version for stdlib classification (e.g. 12 or 3.12)
    #[arg(long, value_name = "VERSION", value_parser = parse_python_version)]
    python_version: Option<u8>,

    /// Copy the entry script's own `#!` line instead of the default one
    #[arg(long)]
    copy_shebang: bool,

    /// Interpreter directive written at the top of the bundle
    #[arg(long, value_name = "COMMAND")]
    shebang: Option<String>,

    /// Shape of the produced bundle
    #[arg(long, value_enum)]
    mode: Option<OutputMode>,

    /// Configuration file replacing project config discovery
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    /// Command-line values are the last configuration layer.
    fn apply_to(&self, config: &mut Config) {
        config.src.extend(self.python_paths.iter().cloned());
        config
            .python_modules
            .extend(self.python_modules.iter().cloned());
        if let Some(binary) = &self.python_binary {
            config.python_binary = Some(binary.clone());
        }
        if let Some(version) = self.python_version {
            config.python_version = version;
        }
        if self.copy_shebang {
            config.copy_shebang = true;
        }
        if let Some(shebang) = &self.shebang {
            config.shebang.clone_from(shebang);
        }
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    let project_dir = std::env::current_dir()?;
    let mut config = Config::load(cli.config.as_deref(), &project_dir)?;
    cli.apply_to(&mut config);

    if cli.stdout && config.mode == OutputMode::Archive {
        bail!("Archive bundles are binary and cannot be written to stdout; use --output");
    }

    let bundle = BundleOrchestrator::new(config).bundle(&cli.entry)?;

    match &cli.output {
        Some(output) => {
            write_bundle(&bundle, output)?;
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(&bundle.contents)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
