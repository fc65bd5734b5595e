//! Persistent storage for the device settings and the user credential.
//!
//! Both files are JSON written atomically (write to tmp file, then rename)
//! so a power loss never leaves a truncated file behind.

use std::path::{Path, PathBuf};

use nodebox_core::error::{NodeError, Result};
use nodebox_core::host::Credential;
use nodebox_core::settings::Settings;
use serde::Serialize;

/// Settings persistence.
pub trait SettingsStore: Send + Sync {
    fn exists(&self) -> bool;
    fn read(&self) -> Result<Settings>;
    fn write(&self, settings: &Settings) -> Result<()>;
    fn delete(&self) -> Result<()>;
}

/// Device user credential persistence. A present credential means the
/// device has been registered.
pub trait CredentialStore: Send + Sync {
    fn exists(&self) -> bool;
    fn read(&self) -> Result<Credential>;
    fn write(&self, credential: &Credential) -> Result<()>;
    fn delete(&self) -> Result<()>;
}

/// Settings stored as JSON.
#[derive(Debug, Clone)]
pub struct JsonSettingsStore {
    path: PathBuf,
}

impl JsonSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for JsonSettingsStore {
    fn exists(&self) -> bool {
        self.path.exists()
    }

    fn read(&self) -> Result<Settings> {
        let data = read_file(&self.path)?;
        serde_json::from_str(&data).map_err(|e| {
            NodeError::SerializationError(format!(
                "failed to parse settings file {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    fn write(&self, settings: &Settings) -> Result<()> {
        write_json_atomic(&self.path, settings)
    }

    fn delete(&self) -> Result<()> {
        remove_if_exists(&self.path)
    }
}

/// Credential stored as JSON.
#[derive(Debug, Clone)]
pub struct JsonCredentialStore {
    path: PathBuf,
}

impl JsonCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for JsonCredentialStore {
    fn exists(&self) -> bool {
        self.path.exists()
    }

    /// A present but unparsable file is a fatal [`NodeError::Credential`].
    fn read(&self) -> Result<Credential> {
        let data = read_file(&self.path)?;
        serde_json::from_str(&data).map_err(|e| {
            NodeError::Credential(format!(
                "credential file {} is corrupt: {}",
                self.path.display(),
                e
            ))
        })
    }

    fn write(&self, credential: &Credential) -> Result<()> {
        write_json_atomic(&self.path, credential)
    }

    fn delete(&self) -> Result<()> {
        remove_if_exists(&self.path)
    }
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        NodeError::IoError(std::io::Error::new(
            e.kind(),
            format!("failed to read {}: {}", path.display(), e),
        ))
    })
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Serialize `value` and replace `path` atomically.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let json = serde_json::to_string_pretty(value)?;

    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &json)?;
    std::fs::rename(&tmp_path, path).map_err(|e| {
        NodeError::Other(format!(
            "failed to rename {} -> {}: {}",
            tmp_path.display(),
            path.display(),
            e
        ))
    })?;

    Ok(())
}
