//! `nodebox reset` command.

use clap::Args;
use nodebox_runtime::Manager;

#[derive(Args)]
pub struct ResetArgs {
    /// Also delete and re-download every image
    #[arg(long, conflicts_with = "user")]
    pub factory: bool,

    /// Only forget the user and the lightning wallet; keep the chain
    #[arg(long)]
    pub user: bool,
}

pub async fn execute(manager: Manager, args: ResetArgs) -> Result<(), Box<dyn std::error::Error>> {
    if args.user {
        manager.user_reset().await?;
        println!("User reset complete.");
    } else {
        manager.reset(args.factory).await?;
        println!("Device reset complete.");
    }
    // Reset restarts the scheduler; this process is about to exit.
    manager.stop_scheduler();
    Ok(())
}
