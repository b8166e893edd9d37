//! End to end: a config file on disk is edited, the debounced watcher
//! picks it up, and the fleet reconciles to match.

use std::sync::Arc;
use std::time::Duration;

use mxgate_core::config::GatewayConfig;
use mxgate_fleet::{ClientFleet, ConfigReloadPipeline, TemplateRegistry};

const INITIAL: &str = r#"{
    "mcpServers": {
        "files": { "command": "true", "args": [], "disabled": true }
    }
}"#;

const UPDATED: &str = r#"{
    "mcpServers": {
        "files": { "command": "true", "args": [], "disabled": true },
        "search": { "command": "true", "args": [], "disabled": true }
    }
}"#;

async fn wait_until<F: Fn() -> bool>(f: F, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if f() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn editing_the_config_file_reconciles_the_fleet() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mxgate.config.json");
    tokio::fs::write(&path, INITIAL).await.unwrap();

    let initial = GatewayConfig::parse(INITIAL).unwrap();
    let fleet = Arc::new(ClientFleet::new());
    fleet.reconcile(initial.servers.into_values().collect()).await;
    assert!(fleet.get("files").is_some());
    assert!(fleet.get("search").is_none());

    let templates = Arc::new(TemplateRegistry::new());
    let _pipeline = ConfigReloadPipeline::start_with_debounce(
        path.clone(),
        Arc::clone(&fleet),
        Arc::clone(&templates),
        Duration::from_millis(20),
    )
    .unwrap();

    tokio::fs::write(&path, UPDATED).await.unwrap();

    let reconciled = wait_until(|| fleet.get("search").is_some(), Duration::from_secs(3)).await;
    assert!(reconciled, "expected the fleet to pick up the newly added server after a debounced reload");
    assert!(fleet.get("files").is_some());
}
