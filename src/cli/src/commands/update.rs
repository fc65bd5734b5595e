//! `nodebox update` command.

use clap::Args;
use nodebox_runtime::Manager;

#[derive(Args)]
pub struct UpdateArgs {
    /// Services to recreate (lnd, bitcoind, lnapi, space-fleet, syslog, papertrail, logspout)
    #[arg(required = true)]
    pub services: Vec<String>,
}

pub async fn execute(manager: Manager, args: UpdateArgs) -> Result<(), Box<dyn std::error::Error>> {
    manager.update_services(&args.services).await?;
    println!("Updated {}.", args.services.join(", "));
    Ok(())
}
