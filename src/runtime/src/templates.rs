//! Keeps the working compose templates and the launch script identical to
//! the canonical copies shipped with the manager image.

use std::path::{Path, PathBuf};

use nodebox_core::config::ManagerConfig;
use nodebox_core::error::{NodeError, Result};
use nodebox_core::service::compose_files;
use sha2::{Digest, Sha256};

/// Compares and copies templates between the canonical and working directories.
#[derive(Debug, Clone)]
pub struct TemplateSync {
    canonical_dir: PathBuf,
    working_dir: PathBuf,
    launch_dir: PathBuf,
    launch_script: String,
}

impl TemplateSync {
    pub fn new(
        canonical_dir: impl Into<PathBuf>,
        working_dir: impl Into<PathBuf>,
        launch_dir: impl Into<PathBuf>,
        launch_script: impl Into<String>,
    ) -> Self {
        Self {
            canonical_dir: canonical_dir.into(),
            working_dir: working_dir.into(),
            launch_dir: launch_dir.into(),
            launch_script: launch_script.into(),
        }
    }

    pub fn from_config(config: &ManagerConfig) -> Self {
        Self::new(
            &config.canonical_dir,
            &config.working_dir,
            &config.launch_dir,
            &config.launch_script,
        )
    }

    /// Templates whose working copy is missing or differs from the canonical one.
    pub fn outdated_templates(&self) -> Vec<&'static str> {
        compose_files::ALL
            .iter()
            .copied()
            .filter(|name| {
                !same_contents(&self.canonical_dir.join(name), &self.working_dir.join(name))
            })
            .collect()
    }

    /// Copy the named templates into the working directory.
    pub fn copy_templates(&self, names: &[&str]) -> Result<()> {
        std::fs::create_dir_all(&self.working_dir)?;
        for name in names {
            copy(&self.canonical_dir.join(name), &self.working_dir.join(name))?;
            tracing::info!(template = name, "Updated compose template");
        }
        Ok(())
    }

    /// Replace the launch script if it changed. Returns true if it was copied.
    pub fn sync_launch_script(&self) -> Result<bool> {
        let canonical = self.canonical_dir.join(&self.launch_script);
        let installed = self.launch_dir.join(&self.launch_script);
        if same_contents(&canonical, &installed) {
            return Ok(false);
        }
        std::fs::create_dir_all(&self.launch_dir)?;
        copy(&canonical, &installed)?;
        tracing::info!(path = %installed.display(), "Updated launch script");
        Ok(true)
    }
}

fn copy(from: &Path, to: &Path) -> Result<()> {
    std::fs::copy(from, to).map(|_| ()).map_err(|e| {
        NodeError::Other(format!(
            "failed to copy {} -> {}: {}",
            from.display(),
            to.display(),
            e
        ))
    })
}

/// SHA-256 digest of a file, hex encoded.
pub fn file_digest(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// Unreadable files never compare equal.
fn same_contents(a: &Path, b: &Path) -> bool {
    match (file_digest(a), file_digest(b)) {
        (Ok(x), Ok(y)) => x == y,
        _ => false,
    }
}
