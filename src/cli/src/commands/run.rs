//! `nodebox run` command: boot the device and keep it healthy.

use std::path::PathBuf;

use clap::Args;
use nodebox_runtime::{CredentialStore, JsonCredentialStore, Manager};
use tokio::sync::broadcast::error::RecvError;

use crate::auth::verify_password;

#[derive(Args)]
pub struct RunArgs {
    /// File holding the device password; the wallet is unlocked after boot
    #[arg(long)]
    pub password_file: Option<PathBuf>,
}

pub async fn execute(manager: Manager, args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut events = manager.events().subscribe();
    let event_log = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => tracing::info!(event = %event.key, "Workflow event"),
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Event log lagging");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    tracing::info!(serial = %manager.serial(), "Booting device");
    tokio::select! {
        _ = manager.startup() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted during boot");
            manager.stop_scheduler();
            event_log.abort();
            return Ok(());
        }
    }

    if let Some(path) = &args.password_file {
        let password = std::fs::read_to_string(path)?;
        let password = password.trim();
        check_password(&manager, password)?;
        manager.login(password).await?;
    }

    println!("Device ready. Press Ctrl-C to stop.");
    tokio::signal::ctrl_c().await?;

    tracing::info!("Stopping health scheduler");
    manager.stop_scheduler();
    event_log.abort();
    Ok(())
}

/// Refuse a password that does not match the registered user.
fn check_password(manager: &Manager, password: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = JsonCredentialStore::new(&manager.config().credential_file);
    if !store.exists() {
        return Err("device has no registered user".into());
    }
    if !verify_password(&store.read()?, password) {
        return Err("password does not match the registered user".into());
    }
    Ok(())
}
