//! `nodebox volumes` command.

use clap::Args;
use nodebox_runtime::Manager;

use crate::output;

#[derive(Args)]
pub struct VolumesArgs;

pub async fn execute(manager: Manager, _args: VolumesArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut table = output::new_table(&["VOLUME", "SIZE"]);
    for volume in manager.volume_usage().await? {
        table.add_row([volume.name, output::format_bytes(volume.usage)]);
    }
    println!("{table}");
    Ok(())
}
