//! Exercises `ClientFleet::reconcile` lifecycle transitions end to end:
//! add, tags-only in-place update, and removal, asserted through the
//! domain event stream rather than internal state.

use std::sync::Arc;
use std::time::Duration;

use mxgate_core::DomainEvent;
use mxgate_fleet::ClientFleet;
use tests::fixtures::disabled_stdio_spec;

#[tokio::test]
async fn reconcile_emits_added_then_removed() {
    let fleet = Arc::new(ClientFleet::new());
    let mut events = fleet.subscribe();

    fleet.reconcile(vec![disabled_stdio_spec("alpha", &["dev"])]).await;
    assert!(fleet.get("alpha").is_some());

    fleet.reconcile(vec![]).await;
    assert!(fleet.get("alpha").is_none());

    let seen = tests::events::collect_events(events.resubscribe(), Duration::from_millis(200)).await;
    drop(events);

    assert!(seen.iter().any(|e| matches!(e, DomainEvent::ServerAdded { server_name } if server_name == "alpha")));
    assert!(seen.iter().any(|e| matches!(e, DomainEvent::ServerRemoved { server_name } if server_name == "alpha")));
}

#[tokio::test]
async fn tags_only_change_updates_in_place_without_restart() {
    let fleet = Arc::new(ClientFleet::new());
    fleet.reconcile(vec![disabled_stdio_spec("beta", &["dev"])]).await;
    let before = fleet.get("beta").unwrap();

    let mut events = fleet.subscribe();
    fleet.reconcile(vec![disabled_stdio_spec("beta", &["prod", "staging"])]).await;

    let after = fleet.get("beta").unwrap();
    assert!(Arc::ptr_eq(&before, &after), "tags-only change must update the existing client in place, not restart it");

    let event = tests::events::wait_for_event(events, Duration::from_millis(200), |e| {
        matches!(e, DomainEvent::ServerModified { server_name, .. } if server_name == "beta")
    })
    .await
    .expect("expected a ServerModified event");

    match event {
        DomainEvent::ServerModified { fields, .. } => assert_eq!(fields, vec!["tags".to_string()]),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn disabling_a_server_restarts_instead_of_updating_in_place() {
    let fleet = Arc::new(ClientFleet::new());
    fleet.reconcile(vec![disabled_stdio_spec("delta", &["dev"])]).await;
    let before = fleet.get("delta").unwrap();

    let mut enabled = disabled_stdio_spec("delta", &["dev"]);
    enabled.disabled = false;
    let mut events = fleet.subscribe();
    fleet.reconcile(vec![enabled]).await;

    let after = fleet.get("delta").unwrap();
    assert!(!Arc::ptr_eq(&before, &after), "a disabled\u{2192}enabled flip must restart the client, not update it in place");

    let event = tests::events::wait_for_event(events.resubscribe(), Duration::from_millis(200), |e| {
        matches!(e, DomainEvent::ServerModified { server_name, .. } if server_name == "delta")
    })
    .await
    .expect("expected a ServerModified event");
    match event {
        DomainEvent::ServerModified { fields, .. } => assert!(fields.contains(&"disabled".to_string())),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn transport_change_restarts_the_client() {
    let fleet = Arc::new(ClientFleet::new());
    fleet.reconcile(vec![disabled_stdio_spec("gamma", &[])]).await;
    let before = fleet.get("gamma").unwrap();

    let mut changed = disabled_stdio_spec("gamma", &[]);
    changed.connect_timeout_secs = 99;
    fleet.reconcile(vec![changed]).await;

    let after = fleet.get("gamma").unwrap();
    assert!(!Arc::ptr_eq(&before, &after), "a connection-relevant change must restart the client");
}
