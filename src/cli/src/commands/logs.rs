//! `nodebox logs` command: recent output of every container.

use clap::Args;
use nodebox_runtime::Manager;

#[derive(Args)]
pub struct LogsArgs {
    /// Only show this service
    pub service: Option<String>,
}

pub async fn execute(manager: Manager, args: LogsArgs) -> Result<(), Box<dyn std::error::Error>> {
    let logs = manager.container_logs().await?;

    let mut shown = 0;
    for entry in logs {
        if args.service.as_deref().is_some_and(|s| s != entry.container) {
            continue;
        }
        println!("==> {} <==", entry.container);
        print!("{}", entry.logs);
        if !entry.logs.ends_with('\n') {
            println!();
        }
        shown += 1;
    }

    if shown == 0 {
        if let Some(service) = args.service {
            return Err(format!("No container for service {service}").into());
        }
    }
    Ok(())
}
