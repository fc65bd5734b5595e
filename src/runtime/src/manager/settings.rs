//! Settings reconciler.
//!
//! Merges sparse updates onto the persisted settings and recreates only the
//! services whose configuration changed. Side effects run in order and are
//! not rolled back when a later step fails.

use nodebox_core::container::VersionMap;
use nodebox_core::error::{NodeError, Result};
use nodebox_core::event::{events, NodeEvent};
use nodebox_core::service::Service;
use nodebox_core::settings::{RecreatePlan, Settings, SettingsPatch};

use super::Manager;
use crate::retry::RetryPolicy;

impl Manager {
    /// Load the persisted settings, creating defaults and RPC credentials
    /// when missing.
    pub fn ensure_settings(&self) -> Result<Settings> {
        let store = &self.inner.settings;
        let created = !store.exists();
        let mut settings = if created {
            tracing::info!("No settings found, creating defaults");
            Settings::default()
        } else {
            store.read()?
        };

        let generated = settings.ensure_rpc_credentials();
        settings.validate()?;
        if created || generated {
            store.write(&settings)?;
        }
        Ok(settings)
    }

    /// Apply a sparse settings update.
    ///
    /// Refused while bitcoind or lnd has a pending image update. Returns the
    /// merged settings.
    pub async fn save_settings(&self, patch: SettingsPatch) -> Result<Settings> {
        let versions = self.versions().await?;
        ensure_no_pending_update(&versions)?;

        let current = self.ensure_settings()?;
        let next = current.merged(&patch);
        next.validate()?;

        let plan = RecreatePlan::between(&current, &next);
        self.inner.settings.write(&next)?;
        tracing::info!(
            tor = plan.tor,
            bitcoind = plan.bitcoind,
            lnd = plan.lnd,
            "Settings saved"
        );

        if let Err(e) = self.apply_plan(plan, &next).await {
            tracing::error!(error = %e, "Failed to apply settings");
            self.inner.status.fail(e.to_string());
            self.emit(NodeEvent::with_string(events::SETTINGS_FAILED, e.to_string()));
            return Err(e);
        }

        self.emit(NodeEvent::empty(events::SETTINGS_SAVED));
        Ok(next)
    }

    async fn apply_plan(&self, plan: RecreatePlan, settings: &Settings) -> Result<()> {
        let runtime = &self.inner.runtime;

        if plan.tor {
            self.start_tor_as_needed(settings).await?;
            // The gateway publishes the hidden-service address.
            runtime.stop(Service::SpaceFleet).await?;
            runtime.up(Service::SpaceFleet, false).await?;
        }

        if plan.bitcoind {
            runtime.stop(Service::Bitcoind).await?;
            runtime.up(Service::Bitcoind, false).await?;
        }

        if plan.lnd {
            runtime.stop(Service::Lnd).await?;
            runtime.up(Service::Lnd, false).await?;
            self.unlock_with_cached_password().await?;
        }

        Ok(())
    }

    /// Run tor when either tor flag is set, otherwise stop and remove it.
    pub async fn start_tor_as_needed(&self, settings: &Settings) -> Result<()> {
        let runtime = &self.inner.runtime;

        if !settings.wants_tor() {
            runtime.stop(Service::Tor).await?;
            runtime.remove(Service::Tor).await?;
            return Ok(());
        }

        let images = runtime.list_images().await?;
        if !nodebox_core::container::has_image_for(&images, Service::Tor) {
            tracing::info!("Tor image missing, pulling");
            runtime.pull(Service::Tor).await?;
        }
        runtime.up(Service::Tor, false).await?;

        match self.discover_hidden_service().await {
            Ok(address) => {
                tracing::info!(address = %address, "Hidden service published");
                self.inner.host.set_hidden_service(address);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Hidden service address not available");
            }
        }
        Ok(())
    }

    /// Poll the tor hostname file until it appears.
    async fn discover_hidden_service(&self) -> Result<String> {
        let path = &self.inner.config.hidden_service_file;
        RetryPolicy::hidden_service(&self.inner.config.timings)
            .run("hidden service", move |_| async move {
                let contents = tokio::fs::read_to_string(path).await?;
                let host = contents.trim();
                if host.is_empty() {
                    return Err(NodeError::Other(format!(
                        "{} is empty",
                        path.display()
                    )));
                }
                Ok(format!("http://{}", host))
            })
            .await
    }
}

fn ensure_no_pending_update(versions: &VersionMap) -> Result<()> {
    for service in [Service::Bitcoind, Service::Lnd] {
        if versions
            .get(service.as_str())
            .map_or(false, |info| info.updatable)
        {
            return Err(NodeError::Precondition(format!(
                "{} has a pending update; update it before changing settings",
                service
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use nodebox_core::settings::{BitcoindPatch, LndPatch, SystemPatch};

    use super::super::testing::{container, image, Harness};
    use super::*;
    use crate::store::SettingsStore;

    fn lnd_patch(patch: LndPatch) -> SettingsPatch {
        SettingsPatch {
            lnd: Some(patch),
            ..Default::default()
        }
    }

    fn recreations(h: &Harness) -> Vec<String> {
        h.runtime
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("up ") || c.starts_with("stop "))
            .collect()
    }

    #[test]
    fn test_ensure_settings_creates_defaults_once() {
        let h = Harness::new();
        let first = h.manager.ensure_settings().unwrap();
        assert!(first.bitcoind.rpc_user.is_some());
        assert!(first.bitcoind.rpc_password.is_some());

        let second = h.manager.ensure_settings().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_ensure_settings_keeps_existing_credentials() {
        let h = Harness::new().provisioned();
        let stored = h.settings.read().unwrap();
        let loaded = h.manager.ensure_settings().unwrap();
        assert_eq!(loaded.bitcoind.rpc_user, stored.bitcoind.rpc_user);
    }

    #[tokio::test(start_paused = true)]
    async fn test_identical_payload_recreates_nothing() {
        let h = Harness::new().provisioned();
        let current = h.settings.read().unwrap();
        let patch = SettingsPatch {
            lnd: Some(LndPatch {
                network: Some(current.lnd.network),
                external_ip: Some(current.lnd.external_ip.clone()),
                tor: Some(current.lnd.tor),
                ..Default::default()
            }),
            bitcoind: Some(BitcoindPatch {
                listen: Some(current.bitcoind.listen),
                ..Default::default()
            }),
            system: None,
        };

        h.manager.save_settings(patch).await.unwrap();
        assert!(h.runtime.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lnd_change_recreates_only_lnd() {
        let h = Harness::new().provisioned();
        h.manager.login("secret").await.unwrap();

        let saved = h
            .manager
            .save_settings(lnd_patch(LndPatch {
                alias: Some("my-node".to_string()),
                ..Default::default()
            }))
            .await
            .unwrap();

        assert_eq!(saved.lnd.alias.as_deref(), Some("my-node"));
        assert_eq!(recreations(&h), vec!["stop lnd", "up lnd"]);
        assert!(h.node_api.unlock.calls() >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bitcoind_change_recreates_only_bitcoind() {
        let h = Harness::new().provisioned();
        h.manager
            .save_settings(SettingsPatch {
                bitcoind: Some(BitcoindPatch {
                    listen: Some(false),
                    ..Default::default()
                }),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(recreations(&h), vec!["stop bitcoind", "up bitcoind"]);
        assert_eq!(h.node_api.unlock.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_system_change_recreates_nothing() {
        let h = Harness::new().provisioned();
        let saved = h
            .manager
            .save_settings(SettingsPatch {
                system: Some(SystemPatch {
                    display_units: Some("sats".to_string()),
                }),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(saved.system.display_units, "sats");
        assert!(h.runtime.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tor_change_starts_tor_and_clears_external_ip() {
        let h = Harness::new().provisioned();
        let mut settings = h.settings.read().unwrap();
        settings.lnd.external_ip = "1.2.3.4".to_string();
        h.settings.write(&settings).unwrap();
        std::fs::write(h.dir.path().join("hostname"), "abcdef.onion\n").unwrap();

        let saved = h
            .manager
            .save_settings(lnd_patch(LndPatch {
                tor: Some(true),
                ..Default::default()
            }))
            .await
            .unwrap();

        assert_eq!(saved.lnd.external_ip, "");
        let calls = h.runtime.calls();
        assert!(calls.contains(&"pull tor".to_string()));
        assert!(calls.contains(&"up tor".to_string()));
        assert!(calls.contains(&"up space-fleet".to_string()));
        assert!(calls.contains(&"up lnd".to_string()));
        assert!(!calls.contains(&"up bitcoind".to_string()));
        assert_eq!(
            h.manager.host().hidden_service().as_deref(),
            Some("http://abcdef.onion")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_tor_off_stops_and_removes_tor() {
        let h = Harness::new().provisioned();
        let mut settings = h.settings.read().unwrap();
        settings.bitcoind.tor = true;
        h.settings.write(&settings).unwrap();

        h.manager
            .save_settings(SettingsPatch {
                bitcoind: Some(BitcoindPatch {
                    tor: Some(false),
                    ..Default::default()
                }),
                ..Default::default()
            })
            .await
            .unwrap();

        let calls = h.runtime.calls();
        assert_eq!(&calls[..2], &["stop tor", "remove tor"]);
        assert!(calls.contains(&"up bitcoind".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_update_rejects_without_change() {
        let h = Harness::new().provisioned();
        // Still inside the post-pull window; filtering must not hide the update.
        h.clock.advance(chrono::Duration::minutes(30));
        h.runtime
            .set_containers(vec![container("lnd", "casanode/lnd:arm", "sha256:old", true)]);
        h.runtime
            .set_images(vec![image("sha256:new", "casanode/lnd:arm")]);
        let before = h.settings.read().unwrap();

        let err = h
            .manager
            .save_settings(lnd_patch(LndPatch {
                alias: Some("x".to_string()),
                ..Default::default()
            }))
            .await
            .unwrap_err();

        assert!(matches!(err, NodeError::Precondition(_)));
        assert_eq!(h.settings.read().unwrap(), before);
        assert!(h.runtime.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_settings_rejected() {
        let h = Harness::new().provisioned();
        let err = h
            .manager
            .save_settings(lnd_patch(LndPatch {
                max_channels: Some(41),
                ..Default::default()
            }))
            .await
            .unwrap_err();

        assert!(matches!(err, NodeError::Validation(_)));
        assert!(h.runtime.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_recreation_marks_status() {
        let h = Harness::new().provisioned();
        h.runtime.fail_on("up bitcoind");

        let result = h
            .manager
            .save_settings(SettingsPatch {
                bitcoind: Some(BitcoindPatch {
                    listen: Some(false),
                    ..Default::default()
                }),
                ..Default::default()
            })
            .await;

        assert!(result.is_err());
        assert!(h.manager.system_status().await.has_failed());
        // The new settings stay persisted.
        assert!(!h.settings.read().unwrap().bitcoind.listen);
    }
}
