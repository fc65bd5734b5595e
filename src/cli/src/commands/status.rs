//! `nodebox status` command.

use clap::Args;
use nodebox_runtime::Manager;

#[derive(Args)]
pub struct StatusArgs {
    /// Print the raw status record as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(manager: Manager, args: StatusArgs) -> Result<(), Box<dyn std::error::Error>> {
    let status = manager.system_status().await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("Serial: {}", manager.serial());
    let workflow = status
        .active_workflow()
        .map(|w| w.name().to_string())
        .unwrap_or_else(|| "idle".to_string());
    println!("Workflow: {workflow}");
    if status.has_failed() {
        println!("Last workflow failed: {}", status.details.as_deref().unwrap_or(""));
    } else if let Some(details) = &status.details {
        println!("Details: {details}");
    }
    if let (Some(done), Some(unit), Some(total), Some(total_unit)) = (
        &status.downloaded_amount,
        &status.downloaded_amount_unit,
        &status.total_amount,
        &status.total_amount_unit,
    ) {
        let speed = status.speed.as_deref().unwrap_or("-");
        println!("Download: {done} {unit} of {total} {total_unit} ({speed})");
    }

    for address in manager.addresses()? {
        println!("Address: {address}");
    }
    Ok(())
}
