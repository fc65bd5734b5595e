//! `nodebox shutdown` command.

use clap::Args;
use nodebox_runtime::Manager;

#[derive(Args)]
pub struct ShutdownArgs;

pub async fn execute(manager: Manager, _args: ShutdownArgs) -> Result<(), Box<dyn std::error::Error>> {
    manager.shutdown().await?;
    println!("Node services stopped. It is safe to power off.");
    Ok(())
}
