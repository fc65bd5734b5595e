//! Decoding of `docker inspect` and `docker system df` JSON output.

use std::collections::HashMap;

use nodebox_core::container::{
    ContainerSummary, ImageSummary, VolumeUsage, COMPOSE_SERVICE_LABEL,
};
use nodebox_core::error::{NodeError, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectedContainer {
    id: String,
    #[serde(default)]
    created: String,
    #[serde(default)]
    image: String,
    state: ContainerState,
    config: ContainerConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerState {
    status: String,
    #[serde(default)]
    exit_code: i64,
    #[serde(default)]
    started_at: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerConfig {
    #[serde(default)]
    image: String,
    #[serde(default)]
    labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectedImage {
    id: String,
    #[serde(default)]
    repo_tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DiskUsage {
    #[serde(default)]
    volumes: Option<Vec<DiskUsageVolume>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DiskUsageVolume {
    name: String,
    #[serde(default)]
    size: String,
}

fn decode<T: for<'de> Deserialize<'de>>(what: &str, raw: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|e| {
        NodeError::runtime(format!("decode {}", what), e.to_string())
    })
}

/// Decode `docker container inspect` output.
pub(crate) fn parse_containers(raw: &str) -> Result<Vec<ContainerSummary>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    let inspected: Vec<InspectedContainer> = decode("containers", raw)?;
    Ok(inspected.into_iter().map(into_summary).collect())
}

fn into_summary(c: InspectedContainer) -> ContainerSummary {
    let labels = c.config.labels.unwrap_or_default();
    let status_message = if c.state.status == "running" {
        format!("Up since {}", c.state.started_at)
    } else {
        format!("{} ({})", capitalize(&c.state.status), c.state.exit_code)
    };
    ContainerSummary {
        id: c.id,
        service: labels
            .get(COMPOSE_SERVICE_LABEL)
            .cloned()
            .unwrap_or_default(),
        image: c.config.image,
        image_id: c.image,
        state: c.state.status,
        created: chrono::DateTime::parse_from_rfc3339(&c.created)
            .map(|t| t.timestamp())
            .unwrap_or_default(),
        status_message,
        labels,
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Decode `docker image inspect` output.
pub(crate) fn parse_images(raw: &str) -> Result<Vec<ImageSummary>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    let inspected: Vec<InspectedImage> = decode("images", raw)?;
    Ok(inspected
        .into_iter()
        .map(|i| ImageSummary {
            id: i.id,
            repo_tags: i.repo_tags.unwrap_or_default(),
        })
        .collect())
}

/// Decode `docker system df -v --format '{{json .}}'` output.
pub(crate) fn parse_disk_usage(raw: &str) -> Result<Vec<VolumeUsage>> {
    let usage: DiskUsage = decode("disk usage", raw)?;
    Ok(usage
        .volumes
        .unwrap_or_default()
        .into_iter()
        .map(|v| VolumeUsage {
            usage: parse_size(&v.size).unwrap_or(0),
            name: v.name,
        })
        .collect())
}

/// Parse a human-readable docker size (`12.3kB`, `1.2GB`, `0B`) into bytes.
pub fn parse_size(text: &str) -> Option<i64> {
    let text = text.trim();
    let split = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(text.len());
    let (number, unit) = text.split_at(split);
    let value: f64 = number.parse().ok()?;
    let multiplier: f64 = match unit.trim() {
        "" | "B" => 1.0,
        "kB" | "KB" => 1e3,
        "MB" => 1e6,
        "GB" => 1e9,
        "TB" => 1e12,
        "KiB" => 1024.0,
        "MiB" => 1024.0 * 1024.0,
        "GiB" => 1024.0 * 1024.0 * 1024.0,
        _ => return None,
    };
    Some((value * multiplier).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTAINERS: &str = r#"[
        {
            "Id": "abc123",
            "Created": "2024-03-01T12:00:00.123456789Z",
            "Image": "sha256:img1",
            "State": {"Status": "running", "ExitCode": 0, "StartedAt": "2024-03-01T12:00:01Z"},
            "Config": {
                "Image": "casanode/lnd:arm",
                "Labels": {"com.docker.compose.service": "lnd"}
            }
        },
        {
            "Id": "def456",
            "Created": "2024-03-01T12:00:00Z",
            "Image": "sha256:img2",
            "State": {"Status": "exited", "ExitCode": 137},
            "Config": {
                "Image": "casanode/device-host:arm",
                "Labels": {"com.docker.compose.service": "device-host", "casa": "persist"}
            }
        }
    ]"#;

    #[test]
    fn test_parse_containers() {
        let containers = parse_containers(CONTAINERS).unwrap();
        assert_eq!(containers.len(), 2);

        let lnd = &containers[0];
        assert_eq!(lnd.id, "abc123");
        assert_eq!(lnd.service, "lnd");
        assert_eq!(lnd.image, "casanode/lnd:arm");
        assert_eq!(lnd.image_id, "sha256:img1");
        assert!(lnd.is_running());
        assert_eq!(lnd.created, 1_709_294_400);

        let host = &containers[1];
        assert!(host.is_persistent());
        assert_eq!(host.status_message, "Exited (137)");
    }

    #[test]
    fn test_parse_containers_null_labels() {
        let raw = r#"[{"Id": "x", "State": {"Status": "created"}, "Config": {"Labels": null}}]"#;
        let containers = parse_containers(raw).unwrap();
        assert_eq!(containers[0].service, "");
        assert!(containers[0].labels.is_empty());
    }

    #[test]
    fn test_parse_empty_output() {
        assert!(parse_containers("").unwrap().is_empty());
        assert!(parse_images("\n").unwrap().is_empty());
    }

    #[test]
    fn test_parse_images_null_tags() {
        let raw = r#"[{"Id": "sha256:a", "RepoTags": ["casanode/lnd:arm"]}, {"Id": "sha256:b", "RepoTags": null}]"#;
        let images = parse_images(raw).unwrap();
        assert_eq!(images[0].repo_tags, vec!["casanode/lnd:arm"]);
        assert!(images[1].repo_tags.is_empty());
    }

    #[test]
    fn test_parse_disk_usage() {
        let raw = r#"{"Images": [], "Volumes": [
            {"Name": "applications_bitcoind-data", "Size": "1.5GB"},
            {"Name": "applications_lnd-data", "Size": "N/A"}
        ]}"#;
        let volumes = parse_disk_usage(raw).unwrap();
        assert_eq!(volumes[0].name, "applications_bitcoind-data");
        assert_eq!(volumes[0].usage, 1_500_000_000);
        assert_eq!(volumes[1].usage, 0);
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("0B"), Some(0));
        assert_eq!(parse_size("12.3kB"), Some(12_300));
        assert_eq!(parse_size("2MiB"), Some(2 * 1024 * 1024));
        assert_eq!(parse_size("N/A"), None);
    }

    #[test]
    fn test_invalid_json_is_runtime_error() {
        let err = parse_containers("not json").unwrap_err();
        assert!(matches!(err, NodeError::Runtime { .. }));
    }
}
