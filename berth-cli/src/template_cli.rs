//! berth template commands

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::warn;

use berth_core::template::{
    upgrade_in_place, Template, TemplateRejected, TemplateValidator, ValidatedTemplate,
    CURRENT_FORMAT_VERSION,
};
use berth_core::{BerthError, ErrorKind};

use crate::Session;

#[derive(Parser, Debug)]
pub struct TemplateCommand {
    #[clap(subcommand)]
    pub command: TemplateSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum TemplateSubcommand {
    /// Check the template against the current schema
    Validate {
        /// Template file (defaults to the configured template path)
        #[clap(long)]
        path: Option<PathBuf>,
    },

    /// Rewrite the template at the current format version
    Upgrade {
        /// Template file (defaults to the configured template path)
        #[clap(long)]
        path: Option<PathBuf>,
    },
}

impl TemplateCommand {
    pub fn execute(self, session: &Session) -> Result<()> {
        match self.command {
            TemplateSubcommand::Validate { path } => execute_validate(session, path.as_deref()),
            TemplateSubcommand::Upgrade { path } => execute_upgrade(session, path.as_deref()),
        }
    }
}

fn validator(session: &Session) -> TemplateValidator {
    TemplateValidator::new(session.schema.clone(), CURRENT_FORMAT_VERSION)
}

fn template_path(session: &Session, path: Option<&Path>) -> PathBuf {
    path.map(Path::to_path_buf)
        .unwrap_or_else(|| session.settings.template_path())
}

/// Load and validate the developer template, `None` when there is no file
pub(crate) fn load_validated(
    session: &Session,
    path: Option<&Path>,
) -> Result<Option<ValidatedTemplate>> {
    let path = template_path(session, path);
    if !path.exists() {
        warn!("No developer template at {}", path.display());
        return Ok(None);
    }

    let template = Template::load(&path)?;
    Ok(Some(validator(session).validate(template)?))
}

fn execute_validate(session: &Session, path: Option<&Path>) -> Result<()> {
    let location = template_path(session, path);
    let validated = match load_validated(session, Some(&location)) {
        Ok(Some(validated)) => validated,
        Ok(None) => bail!("No developer template at {}", location.display()),
        Err(err) => {
            if let Some(BerthError::Template(rejected)) = err.downcast_ref::<BerthError>() {
                print_rejection(&location, rejected);
            }
            return Err(err);
        }
    };

    println!(
        "✓ Template {} is valid (format {})",
        location.display(),
        validated.format_version()
    );
    if validated.format_version() != &CURRENT_FORMAT_VERSION {
        println!("  Run 'berth template upgrade' to move it to format {CURRENT_FORMAT_VERSION}");
    }
    Ok(())
}

/// List violations a value prompt could resolve apart from the ones that
/// need the file edited by hand
fn print_rejection(location: &Path, rejected: &TemplateRejected) {
    let (fixable, manual): (Vec<_>, Vec<_>) = rejected
        .violations()
        .iter()
        .partition(|v| v.is_fixable());

    println!("✗ Template {} is invalid", location.display());
    if !fixable.is_empty() {
        println!("  Missing or out-of-range values:");
        for violation in &fixable {
            println!("    - {violation}");
        }
    }
    if !manual.is_empty() {
        println!("  Needs a manual edit:");
        for violation in &manual {
            println!("    - {violation}");
        }
    }
    if rejected.has_kind(ErrorKind::ObsoleteFormat) {
        println!("  Recreate the template at format {CURRENT_FORMAT_VERSION}; it cannot be upgraded");
    }
}

fn execute_upgrade(session: &Session, path: Option<&Path>) -> Result<()> {
    let location = template_path(session, path);
    if !location.exists() {
        bail!("No developer template at {}", location.display());
    }

    if upgrade_in_place(&location, &validator(session))? {
        println!(
            "✓ Upgraded {} to format {CURRENT_FORMAT_VERSION}",
            location.display()
        );
    } else {
        println!(
            "✓ {} is already at format {CURRENT_FORMAT_VERSION}",
            location.display()
        );
    }
    Ok(())
}
