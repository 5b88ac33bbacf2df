//! Background tasks: confirm-token sweeping and policy reload.
//!
//! Policies reload on SIGHUP (`kill -HUP <pid>`). An invalid configuration is
//! logged and the previous policy table stays in force.

use crate::config::{ConfigError, GatewayConfig};
use aegis_core::{InMemoryConfirmTokenService, PolicyStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Periodically drop expired confirm tokens.
pub fn spawn_token_sweeper(
    tokens: Arc<InMemoryConfirmTokenService>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let purged = tokens.purge_expired();
            if purged > 0 {
                debug!(purged, remaining = tokens.len(), "expired confirm tokens purged");
            }
        }
    })
}

/// Re-read `config_path` and swap in its policy table.
///
/// Returns the number of policies loaded. On error the store is untouched.
pub fn reload_policies(store: &PolicyStore, config_path: &Path) -> Result<usize, ConfigError> {
    let config = GatewayConfig::load(config_path)?;
    let table = config.policy_table()?;
    let count = table.len();
    store.replace(table);
    info!(
        "Policies reloaded from {} ({} policies)",
        config_path.display(),
        count
    );
    Ok(count)
}

/// Reload policies whenever the process receives SIGHUP.
#[cfg(unix)]
pub fn spawn_sighup_reload(store: Arc<PolicyStore>, config_path: PathBuf) -> JoinHandle<()> {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to install SIGHUP handler: {}", e);
                return;
            }
        };
        info!("SIGHUP handler installed (kill -HUP <pid> to reload policies)");

        while hangup.recv().await.is_some() {
            info!("Received SIGHUP, reloading policies...");
            if let Err(e) = reload_policies(&store, &config_path) {
                warn!("Policy reload failed (keeping old policies): {}", e);
            }
        }
    })
}

#[cfg(not(unix))]
pub fn spawn_sighup_reload(_store: Arc<PolicyStore>, _config_path: PathBuf) -> JoinHandle<()> {
    tokio::spawn(async {})
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_core::{ConfirmTokenRequest, ConfirmTokenService, PolicyAction, PolicyTable};

    fn temp_config(contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("aegis-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_reload_replaces_policies() {
        let store = PolicyStore::new(PolicyTable::default());
        let path = temp_config("[policies.Strict]\ndefault_action = \"block\"\n");

        let count = reload_policies(&store, &path).unwrap();
        assert_eq!(count, 1);
        assert!(store.contains("strict"));
        assert_eq!(
            store.snapshot().get("Strict").unwrap().default_action,
            PolicyAction::Block
        );

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_invalid_reload_keeps_previous_policies() {
        let store = PolicyStore::new(PolicyTable::default());
        let good = temp_config("[policies.Strict]\ndefault_action = \"block\"\n");
        reload_policies(&store, &good).unwrap();

        let bad = temp_config("[policies.Strict]\ndefault_action = \"explode\"\n");
        assert!(reload_policies(&store, &bad).is_err());
        assert!(store.contains("strict"));

        std::fs::remove_file(good).ok();
        std::fs::remove_file(bad).ok();
    }

    #[tokio::test]
    async fn test_sweeper_purges_expired_tokens() {
        let tokens = Arc::new(InMemoryConfirmTokenService::default());
        let request = ConfirmTokenRequest::for_request("Default", None, None, b"{}", "hi");
        tokens.issue_token(request, Duration::ZERO);
        assert_eq!(tokens.len(), 1);

        let handle = spawn_token_sweeper(tokens.clone(), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(tokens.is_empty());
        handle.abort();
    }
}
