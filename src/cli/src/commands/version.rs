//! `nodebox version` command.

use clap::Args;

#[derive(Args)]
pub struct VersionArgs;

pub async fn execute(_args: VersionArgs) -> Result<(), Box<dyn std::error::Error>> {
    println!("nodebox version {}", nodebox_core::VERSION);
    println!("runtime version {}", nodebox_runtime::VERSION);
    Ok(())
}
