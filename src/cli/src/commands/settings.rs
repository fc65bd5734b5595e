//! `nodebox settings` command: show the persisted settings or apply a
//! sparse update.

use clap::{Args, Subcommand};
use nodebox_core::SettingsPatch;
use nodebox_runtime::Manager;

#[derive(Args)]
pub struct SettingsArgs {
    #[command(subcommand)]
    pub action: SettingsAction,
}

#[derive(Subcommand)]
pub enum SettingsAction {
    /// Print the current settings as JSON
    Show,
    /// Apply a JSON update, e.g. '{"lnd": {"lndNodeAlias": "home"}}'
    Save {
        /// Update document; only the listed fields change
        patch: String,
    },
}

pub async fn execute(
    manager: Manager,
    args: SettingsArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    match args.action {
        SettingsAction::Show => {
            let settings = manager.ensure_settings()?;
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        SettingsAction::Save { patch } => {
            let patch = parse_patch(&patch)?;
            let saved = manager.save_settings(patch).await?;
            println!("{}", serde_json::to_string_pretty(&saved)?);
        }
    }
    Ok(())
}

fn parse_patch(raw: &str) -> Result<SettingsPatch, String> {
    serde_json::from_str(raw).map_err(|e| format!("Invalid settings update: {e}"))
}
