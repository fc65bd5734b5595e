//! Container runtime data model and image version comparison.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::service::Service;

/// Label that keeps a container alive across resets.
pub const PERSIST_LABEL: (&str, &str) = ("casa", "persist");

/// Label carrying the compose service name.
pub const COMPOSE_SERVICE_LABEL: &str = "com.docker.compose.service";

/// Image version reported when no image of the expected org/tag exists.
pub const OLD_SERVICE_VERSION: &str = "old-service";

/// One container as reported by the runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSummary {
    pub id: String,
    /// Compose service name, empty for containers not started by compose.
    pub service: String,
    pub image: String,
    pub image_id: String,
    /// Runtime state (`running`, `exited`, ...).
    pub state: String,
    /// Creation time, seconds since the epoch.
    pub created: i64,
    /// Human readable status (`Up 2 hours`).
    pub status_message: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl ContainerSummary {
    pub fn is_running(&self) -> bool {
        self.state == "running"
    }

    /// Whether the container survives resets.
    pub fn is_persistent(&self) -> bool {
        self.labels.get(PERSIST_LABEL.0).map(String::as_str) == Some(PERSIST_LABEL.1)
    }

    /// Service this container runs, derived from its image reference.
    ///
    /// When two images exist for a service the runtime reports the container
    /// image as a bare digest, so the compose service name is used instead.
    pub fn lookup_service(&self) -> &str {
        service_from_image(&self.image).unwrap_or(&self.service)
    }
}

/// One image as reported by the runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSummary {
    pub id: String,
    #[serde(default)]
    pub repo_tags: Vec<String>,
}

/// Disk usage of one volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeUsage {
    pub name: String,
    pub usage: i64,
}

/// Captured output of one container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerLogs {
    pub container: String,
    pub logs: String,
}

/// Running and available image versions of one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceVersionInfo {
    pub container_version: String,
    pub image_version: String,
    pub updatable: bool,
    #[serde(default)]
    pub filtered: bool,
}

/// Versions keyed by compose service name.
pub type VersionMap = BTreeMap<String, ServiceVersionInfo>;

/// Extract the repository name from `org/name:tag`.
///
/// Returns `None` for digest references (`sha256:...`).
pub fn service_from_image(image: &str) -> Option<&str> {
    let start = image.find('/').map(|i| i + 1).unwrap_or(0);
    let rest = &image[start..];
    let name = match rest.find(':') {
        Some(end) => &rest[..end],
        None => rest,
    };
    if name == "sha256" || name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Whether any image is tagged `<org>/<service>:<tag>` for some org.
pub fn has_image_for(images: &[ImageSummary], service: Service) -> bool {
    images.iter().flat_map(|i| i.repo_tags.iter()).any(|tag| {
        tag.split_once('/')
            .map(|(_, rest)| rest.split(':').next() == Some(service.as_str()))
            .unwrap_or(false)
    })
}

/// Compare every container's image to the newest local image of the same service.
///
/// Only images tagged `tag` under an organisation containing `org` count.
/// The welcome service is omitted.
pub fn compute_versions(
    containers: &[ContainerSummary],
    images: &[ImageSummary],
    org: &str,
    tag: &str,
) -> VersionMap {
    let mut latest: HashMap<&str, &ImageSummary> = HashMap::new();
    for image in images {
        for repo_tag in &image.repo_tags {
            let Some((repo, image_tag)) = repo_tag.split_once(':') else {
                continue;
            };
            if !repo.contains('/') || image_tag != tag || !repo.contains(org) {
                continue;
            }
            if let Some(service) = service_from_image(repo_tag) {
                latest.insert(service, image);
            }
        }
    }

    let mut versions = VersionMap::new();
    for container in containers {
        if container.service == Service::Welcome.as_str() {
            continue;
        }
        let (image_version, updatable) = match latest.get(container.lookup_service()) {
            Some(image) => (image.id.clone(), container.image_id != image.id),
            None => (OLD_SERVICE_VERSION.to_string(), false),
        };
        versions.insert(
            container.service.clone(),
            ServiceVersionInfo {
                container_version: container.image_id.clone(),
                image_version,
                updatable,
                filtered: false,
            },
        );
    }
    versions
}

/// Suppress update availability while `filtered` holds.
pub fn apply_filter(versions: &mut VersionMap, filtered: bool) {
    for info in versions.values_mut() {
        info.filtered = filtered;
        if filtered {
            info.updatable = false;
        }
    }
}
