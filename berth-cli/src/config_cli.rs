//! berth config commands

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::Session;

#[derive(Parser, Debug)]
pub struct ConfigCommand {
    #[clap(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigSubcommand {
    /// Print the effective settings
    Show,

    /// Set the catalog used when no --source is given
    SetSource {
        /// Catalog descriptor: <clone-url>[@<ref>]
        descriptor: String,
    },
}

impl ConfigCommand {
    pub fn execute(self, session: &mut Session) -> Result<()> {
        match self.command {
            ConfigSubcommand::Show => {
                let effective = session.settings.effective()?;
                println!("# {}", session.settings.settings_path().display());
                print!("{}", serde_yaml_ng::to_string(&effective)?);
            }
            ConfigSubcommand::SetSource { descriptor } => {
                session.settings.set_default_source(&descriptor)?;
                println!(
                    "Default catalog set to {} ({})",
                    session.settings.stored().default_source,
                    session.settings.settings_path().display()
                );
            }
        }
        Ok(())
    }
}
