//! `nodebox containers` command.

use clap::Args;
use nodebox_runtime::Manager;

use crate::output;

#[derive(Args)]
pub struct ContainersArgs {
    /// Only display service names
    #[arg(short, long)]
    pub quiet: bool,
}

pub async fn execute(
    manager: Manager,
    args: ContainersArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let containers = manager.container_statuses().await?;

    if args.quiet {
        for container in &containers {
            println!("{}", container.service);
        }
        return Ok(());
    }

    let mut table = output::new_table(&["SERVICE", "IMAGE", "STATE", "STATUS"]);
    for container in &containers {
        table.add_row([
            &container.service,
            &container.image,
            &container.state,
            &container.status_message,
        ]);
    }
    println!("{table}");
    Ok(())
}
