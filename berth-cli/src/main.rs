//! berth - reproducible dev containers from a versioned catalog
//!
//! Thin command layer over `berth-core`: parses flags, loads settings,
//! drives the resolver/validator/reconciler and renders their results.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use berth_core::catalog::{AutoFetcher, CatalogResolver, GitFetcher};
use berth_core::settings::SettingsManager;
use berth_core::template::BaselineSchema;
use berth_core::{BerthError, Version};

mod catalog_cli;
mod config_cli;
mod project_cli;
mod template_cli;

/// Log levels
#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Parser, Debug)]
#[clap(
    name = "berth",
    about = "Provision dev containers from a versioned catalog and keep projects in sync",
    version
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,

    /// Set log level
    #[clap(long, default_value = "warn", global = true)]
    log_level: LogLevel,

    /// Structured JSON logs with file and line (stderr)
    #[clap(long, global = true)]
    trace: bool,

    /// Use this settings file instead of the default location
    #[clap(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Parser, Debug)]
enum Command {
    /// Browse and validate catalogs
    Catalog(catalog_cli::CatalogCommand),

    /// Materialize a collection into a project
    Init(project_cli::InitArgs),

    /// Report what a project is missing (never writes)
    Check(project_cli::CheckArgs),

    /// Append template keys the project is missing to its env file
    Sync(project_cli::SyncArgs),

    /// Validate or upgrade the developer template
    Template(template_cli::TemplateCommand),

    /// Show or change settings
    Config(config_cli::ConfigCommand),
}

/// Settings and tool version shared by every command
pub(crate) struct Session {
    pub settings: SettingsManager,
    pub version: Version,
    pub schema: BaselineSchema,
}

impl Session {
    fn load(config: Option<PathBuf>) -> Result<Self> {
        let settings = match config {
            Some(path) => SettingsManager::load_from_path(path)?,
            None => SettingsManager::load()?,
        };
        let version = Version::parse(env!("CARGO_PKG_VERSION"))
            .context("Invalid package version")?;
        Ok(Self {
            settings,
            version,
            schema: BaselineSchema::current(),
        })
    }

    /// Resolver over git or local catalogs, configured from settings
    pub fn resolver(&self) -> Result<CatalogResolver<AutoFetcher>> {
        let options = self.settings.resolver_options(self.version)?;
        Ok(CatalogResolver::new(
            AutoFetcher::new(GitFetcher::new()),
            options,
        ))
    }
}

/// Initialize tracing with CLI flags
///
/// Logs always go to stderr so stdout stays parseable for `--json`.
fn initialize_tracing(log_level: &LogLevel, trace: bool) {
    let filter = EnvFilter::new(log_level.to_filter_directive());

    if trace {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn main() {
    let cli = Cli::parse();
    initialize_tracing(&cli.log_level, cli.trace);

    if let Err(err) = run(cli) {
        report(&err);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut session = Session::load(cli.config)?;

    match cli.command {
        Command::Catalog(command) => command.execute(&session),
        Command::Init(args) => project_cli::execute_init(&session, args),
        Command::Check(args) => project_cli::execute_check(&session, args),
        Command::Sync(args) => project_cli::execute_sync(&session, args),
        Command::Template(command) => command.execute(&session),
        Command::Config(command) => command.execute(&mut session),
    }
}

/// Print a fault with its kind so scripts can match on it
fn report(err: &anyhow::Error) {
    match err.downcast_ref::<BerthError>() {
        Some(fault) => eprintln!("Error [{}]: {fault}", fault.kind()),
        None => eprintln!("Error: {err:#}"),
    }
}
