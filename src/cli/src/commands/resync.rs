//! `nodebox resync` command.

use clap::Args;
use nodebox_runtime::Manager;

#[derive(Args)]
pub struct ResyncArgs {
    /// Delete the chain data and sync from scratch
    #[arg(long)]
    pub full: bool,

    /// Seed the chain from the remote archive before restarting
    #[arg(long)]
    pub from_remote: bool,
}

pub async fn execute(manager: Manager, args: ResyncArgs) -> Result<(), Box<dyn std::error::Error>> {
    manager.resync_chain(args.full, args.from_remote).await?;
    println!("Chain resync complete.");
    Ok(())
}
