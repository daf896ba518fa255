//! Project commands: init, check and sync

use anyhow::{bail, Result};
use clap::Args;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use berth_core::project::{DriftState, FileDrift, Materializer, ProjectManifest};
use berth_core::reconcile::{reconcile, EnvFileSet, ReconciliationReport};
use berth_core::template::ValidatedTemplate;

use crate::template_cli::load_validated;
use crate::Session;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Collection name
    pub name: String,

    /// Catalog descriptor: <clone-url>[@<ref>] or a local directory
    #[clap(long)]
    pub source: Option<String>,

    /// Project root to materialize into
    #[clap(long, default_value = ".")]
    pub project_dir: PathBuf,

    /// Overwrite files in an existing .devcontainer/
    #[clap(long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Project root
    #[clap(long, default_value = ".")]
    pub project_dir: PathBuf,

    /// Output the report as JSON
    #[clap(long)]
    pub json: bool,

    /// Exit non-zero when anything is missing or modified
    #[clap(long)]
    pub strict: bool,
}

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Project root
    #[clap(long, default_value = ".")]
    pub project_dir: PathBuf,
}

pub fn execute_init(session: &Session, args: InitArgs) -> Result<()> {
    let resolved = session
        .resolver()?
        .select(args.source.as_deref(), &args.name)?;

    let manifest = Materializer::new(&args.project_dir, session.version)
        .force(args.force)
        .materialize(&resolved)?;

    println!(
        "✓ Materialized '{}' from {} ({} files)",
        manifest.collection,
        manifest.source,
        manifest.files.len()
    );
    println!();
    println!("Next steps:");
    println!("  1. Run 'berth sync' to fill .devcontainer/.env from your template");
    println!("  2. Run 'berth check' to confirm nothing is missing");
    Ok(())
}

/// Everything `check` and `sync` need about a project
struct ProjectState {
    env: EnvFileSet,
    manifest: Option<ProjectManifest>,
    template: Option<ValidatedTemplate>,
    report: ReconciliationReport,
}

impl ProjectState {
    fn load(session: &Session, project_dir: &Path) -> Result<Self> {
        let env = EnvFileSet::load(project_dir)?;
        let manifest = ProjectManifest::load(project_dir)?;

        // The template only matters once the project says which one it used
        let template = match &manifest {
            Some(m) if m.identifies_template() => load_validated(session, None)?,
            _ => None,
        };

        let report = reconcile(
            &env,
            manifest.as_ref(),
            &session.schema,
            template.as_ref(),
        );

        Ok(Self {
            env,
            manifest,
            template,
            report,
        })
    }
}

pub fn execute_check(session: &Session, args: CheckArgs) -> Result<()> {
    let state = ProjectState::load(session, &args.project_dir)?;
    let drift = match &state.manifest {
        Some(manifest) => manifest.drift(&args.project_dir)?,
        None => Vec::new(),
    };

    if args.json {
        let output = serde_json::json!({
            "report": state.report,
            "modifiedFiles": drift,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_report(&state.report, &drift);
    }

    if args.strict && (!state.report.is_clean() || !drift.is_empty()) {
        bail!("Project is not in sync");
    }
    Ok(())
}

fn print_report(report: &ReconciliationReport, drift: &[FileDrift]) {
    if !report.metadata_present {
        println!("✗ No usable .devcontainer/berth.lock; the project's template cannot be located.");
        println!("  Run 'berth init <collection>' to materialize the project.");
    } else if !report.template_located {
        println!("! No valid developer template found; template keys were not compared.");
        println!("  Run 'berth template validate' for details.");
    }

    if report.missing_baseline_keys.is_empty() {
        println!("✓ All required keys are present");
    } else {
        println!("✗ Missing required keys:");
        for key in &report.missing_baseline_keys {
            println!("    {key}");
        }
    }

    if !report.missing_template_keys.is_empty() {
        println!("✗ Keys your template defines that the project lacks:");
        for (key, value) in &report.missing_template_keys {
            println!("    {key}={value}");
        }
        println!("  Run 'berth sync' to add them.");
    }

    if !drift.is_empty() {
        println!("! Materialized files changed since init:");
        for file in drift {
            let state = match file.state {
                DriftState::Modified => "modified",
                DriftState::Deleted => "deleted",
            };
            println!("    {} ({state})", file.path);
        }
    }
}

pub fn execute_sync(session: &Session, args: SyncArgs) -> Result<()> {
    let mut state = ProjectState::load(session, &args.project_dir)?;

    if !state.report.metadata_present {
        bail!(
            "{} has no usable berth.lock. Run 'berth init <collection>' first",
            args.project_dir.display()
        );
    }
    if state.template.is_none() {
        bail!(
            "No developer template at {}. Create one, then run 'berth template validate'",
            session.settings.template_path().display()
        );
    }

    let written = state.env.append_missing(&state.report.missing_template_keys)?;
    info!("Appended {} key(s) to {}", written, state.env.primary_path().display());
    println!(
        "✓ Added {written} key(s) to {}",
        state.env.primary_path().display()
    );

    let remaining = reconcile(
        &state.env,
        state.manifest.as_ref(),
        &session.schema,
        state.template.as_ref(),
    );
    for key in &remaining.missing_baseline_keys {
        warn!("Required key {} is still missing", key);
        println!("! {key} is still missing; add it to your template or .devcontainer/.env");
    }
    Ok(())
}
