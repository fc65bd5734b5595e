//! `nodebox versions` command.

use clap::Args;
use nodebox_runtime::Manager;

use crate::output;

#[derive(Args)]
pub struct VersionsArgs {
    /// Only show services with an update available
    #[arg(short, long)]
    pub updatable: bool,
}

pub async fn execute(
    manager: Manager,
    args: VersionsArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let versions = manager.filtered_versions().await?;

    let mut table = output::new_table(&["SERVICE", "RUNNING", "AVAILABLE", "UPDATABLE"]);
    for (service, info) in &versions {
        if args.updatable && !info.updatable {
            continue;
        }
        table.add_row([
            service.as_str(),
            short_digest(&info.container_version),
            short_digest(&info.image_version),
            output::flag(info.updatable),
        ]);
    }

    println!("{table}");
    if manager.versions_filtered() {
        println!("Updates are hidden while images are being fetched.");
    }
    Ok(())
}

/// First 12 hex digits of an image digest.
fn short_digest(version: &str) -> &str {
    let hex = version.strip_prefix("sha256:").unwrap_or(version);
    if hex.len() > 12 && hex.is_ascii() {
        &hex[..12]
    } else {
        hex
    }
}
