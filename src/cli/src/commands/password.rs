//! `nodebox change-password` command.

use std::path::PathBuf;

use clap::Args;
use nodebox_runtime::Manager;

#[derive(Args)]
pub struct ChangePasswordArgs {
    /// File holding the current password
    #[arg(long)]
    pub current_file: PathBuf,

    /// File holding the new password
    #[arg(long)]
    pub new_file: PathBuf,
}

pub async fn execute(
    manager: Manager,
    args: ChangePasswordArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let current = read_secret(&args.current_file)?;
    let new = read_secret(&args.new_file)?;

    let token = manager.refresh()?;
    manager.change_password(&current, &new, &token).await?;

    let status = manager.change_password_status();
    if status.forbidden == Some(true) {
        return Err("Current password is incorrect".into());
    }
    println!("Password changed.");
    Ok(())
}

fn read_secret(path: &std::path::Path) -> Result<String, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    Ok(raw.trim_end_matches(['\r', '\n']).to_string())
}
