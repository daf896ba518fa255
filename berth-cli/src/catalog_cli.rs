//! berth catalog commands
//!
//! `list` browses with the skip policy, `show` selects one collection (a
//! faulty collection surfaces its own error) and `lint` validates a local
//! catalog checkout, failing on the first fault.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

use berth_core::catalog::{validate_collections, CollectionEntry};
use berth_core::BerthError;

use crate::Session;

#[derive(Parser, Debug)]
pub struct CatalogCommand {
    #[clap(subcommand)]
    pub command: CatalogSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum CatalogSubcommand {
    /// List the collections a catalog offers
    List {
        /// Catalog descriptor: <clone-url>[@<ref>] or a local directory
        #[clap(long)]
        source: Option<String>,

        /// Output results as JSON
        #[clap(long)]
        json: bool,
    },

    /// Show one collection
    Show {
        /// Collection name
        name: String,

        /// Catalog descriptor: <clone-url>[@<ref>] or a local directory
        #[clap(long)]
        source: Option<String>,

        /// Output as JSON
        #[clap(long)]
        json: bool,
    },

    /// Validate a local catalog before publishing
    Lint {
        /// Path to the catalog root
        path: PathBuf,
    },
}

impl CatalogCommand {
    pub fn execute(self, session: &Session) -> Result<()> {
        match self.command {
            CatalogSubcommand::List { source, json } => {
                execute_list(session, source.as_deref(), json)
            }
            CatalogSubcommand::Show { name, source, json } => {
                execute_show(session, &name, source.as_deref(), json)
            }
            CatalogSubcommand::Lint { path } => execute_lint(session, &path),
        }
    }
}

/// Table row for a collection
#[derive(Tabled)]
struct CollectionRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Path")]
    path: String,
    #[tabled(rename = "Tags")]
    tags: String,
    #[tabled(rename = "Description")]
    description: String,
}

impl From<&CollectionEntry> for CollectionRow {
    fn from(entry: &CollectionEntry) -> Self {
        let description = if entry.description.chars().count() > 50 {
            let head: String = entry.description.chars().take(47).collect();
            format!("{head}...")
        } else {
            entry.description.clone()
        };

        Self {
            name: entry.name.clone(),
            path: entry.relative_path.display().to_string(),
            tags: entry.tags.join(", "),
            description,
        }
    }
}

fn render_table(entries: &[CollectionEntry]) -> String {
    let rows: Vec<CollectionRow> = entries.iter().map(CollectionRow::from).collect();
    Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()))
        .to_string()
}

fn execute_list(session: &Session, source: Option<&str>, json_output: bool) -> Result<()> {
    let listing = session.resolver()?.browse(source)?;
    let descriptor = listing.source.descriptor();

    if listing.discovery.is_empty() && listing.discovery.skipped.is_empty() {
        return Err(BerthError::NoCollectionsFound { descriptor }.into());
    }

    if json_output {
        let skipped: Vec<serde_json::Value> = listing
            .discovery
            .skipped
            .iter()
            .map(|s| {
                serde_json::json!({
                    "name": s.name,
                    "manifest": s.manifest.display().to_string(),
                    "kind": s.reason.kind().to_string(),
                    "reason": s.reason.to_string(),
                })
            })
            .collect();
        let output = serde_json::json!({
            "source": descriptor,
            "collections": listing.discovery.entries,
            "skipped": skipped,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!(
        "Found {} collection(s) in {}:\n",
        listing.discovery.entries.len(),
        descriptor
    );
    if !listing.discovery.entries.is_empty() {
        println!("{}", render_table(&listing.discovery.entries));
    }

    if !listing.discovery.skipped.is_empty() {
        println!(
            "\n{} collection(s) skipped (rerun with --log-level warn for details)",
            listing.discovery.skipped.len()
        );
    }

    Ok(())
}

fn execute_show(
    session: &Session,
    name: &str,
    source: Option<&str>,
    json_output: bool,
) -> Result<()> {
    let resolved = session.resolver()?.select(source, name)?;
    let entry = &resolved.entry;

    if json_output {
        let output = serde_json::json!({
            "source": resolved.source.descriptor(),
            "collection": entry,
            "files": resolved.files.iter().map(|f| f.display().to_string()).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!();
    println!("Collection:  {}", entry.name);
    println!("Source:      {}", resolved.source);
    println!("Path:        {}", entry.relative_path.display());
    if !entry.tags.is_empty() {
        println!("Tags:        {}", entry.tags.join(", "));
    }
    if let Some(maintainer) = &entry.maintainer {
        println!("Maintainer:  {maintainer}");
    }
    if let Some(min) = &entry.min_required_version {
        println!("Requires:    berth >= {min}");
    }
    println!();
    println!("{}", entry.description);
    println!();
    println!("Files:");
    for file in &resolved.files {
        println!("  {}", file.display());
    }
    println!();
    println!("To use: berth init {} --source {}", entry.name, resolved.source);

    Ok(())
}

fn execute_lint(session: &Session, path: &std::path::Path) -> Result<()> {
    println!("Validating catalog at {}...\n", path.display());

    let entries = validate_collections(path, &session.version)?;
    if entries.is_empty() {
        return Err(BerthError::NoCollectionsFound {
            descriptor: path.display().to_string(),
        }
        .into());
    }

    println!("{}", render_table(&entries));
    println!("\n✓ Catalog is valid ({} collection(s))", entries.len());
    Ok(())
}
