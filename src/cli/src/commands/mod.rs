//! CLI command definitions and dispatch.

mod containers;
mod logs;
mod password;
mod reset;
mod resync;
mod run;
mod settings;
mod shutdown;
mod status;
mod update;
mod version;
mod versions;
mod volumes;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use nodebox_core::ManagerConfig;
use nodebox_runtime::{Collaborators, Manager};

use crate::auth::TokenIssuer;

/// Nodebox - node appliance device manager.
#[derive(Parser)]
#[command(name = "nodebox", version, about)]
pub struct Cli {
    /// JSON configuration file, overlaid by the environment
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Boot the device and run the health scheduler until interrupted
    Run(run::RunArgs),
    /// Show the workflow status
    Status(status::StatusArgs),
    /// Show running and available service versions
    Versions(versions::VersionsArgs),
    /// List service containers
    Containers(containers::ContainersArgs),
    /// Show recent container logs
    Logs(logs::LogsArgs),
    /// Show volume disk usage
    Volumes(volumes::VolumesArgs),
    /// Show or change device settings
    Settings(settings::SettingsArgs),
    /// Resync the blockchain
    Resync(resync::ResyncArgs),
    /// Reset the device
    Reset(reset::ResetArgs),
    /// Recreate services on their newest local image
    Update(update::UpdateArgs),
    /// Stop the node ahead of a power-off
    Shutdown(shutdown::ShutdownArgs),
    /// Change the wallet and device password
    ChangePassword(password::ChangePasswordArgs),
    /// Show version information
    Version(version::VersionArgs),
}

/// Load the configuration file if given, then apply the environment.
pub(crate) fn load_config(path: Option<&Path>) -> Result<ManagerConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => ManagerConfig::from_file(path)?,
        None => ManagerConfig::default(),
    };
    Ok(config.with_env())
}

/// Wire the production collaborators into a manager.
pub(crate) fn open_manager(config: ManagerConfig) -> Result<Manager, Box<dyn std::error::Error>> {
    let issuer = TokenIssuer::from_config(&config)?;
    let collaborators = Collaborators::standard(&config, Arc::new(issuer));
    Ok(Manager::new(config, collaborators))
}

/// Dispatch a parsed CLI to the appropriate command handler.
pub async fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Command::Version(args) = cli.command {
        return version::execute(args).await;
    }

    let config = load_config(cli.config.as_deref())?;
    let manager = open_manager(config)?;

    match cli.command {
        Command::Run(args) => run::execute(manager, args).await,
        Command::Status(args) => status::execute(manager, args).await,
        Command::Versions(args) => versions::execute(manager, args).await,
        Command::Containers(args) => containers::execute(manager, args).await,
        Command::Logs(args) => logs::execute(manager, args).await,
        Command::Volumes(args) => volumes::execute(manager, args).await,
        Command::Settings(args) => settings::execute(manager, args).await,
        Command::Resync(args) => resync::execute(manager, args).await,
        Command::Reset(args) => reset::execute(manager, args).await,
        Command::Update(args) => update::execute(manager, args).await,
        Command::Shutdown(args) => shutdown::execute(manager, args).await,
        Command::ChangePassword(args) => password::execute(manager, args).await,
        Command::Version(_) => Ok(()),
    }
}
