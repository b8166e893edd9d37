//! Session Router visibility and qualified-name routing, covering the
//! `NotFound` vs `NotPermitted` distinction the router is specifically
//! designed to preserve.

use std::sync::Arc;

use mxgate_core::domain::{GatewayError, InboundSession, TagFilterMode};
use mxgate_core::store::memory::shared_preset_store;
use mxgate_fleet::{ClientFleet, TemplateInstancePool, TemplateRegistry};
use mxgate_gateway::preset_resolver::PresetResolver;
use mxgate_gateway::router::{qualify_name, SessionRouter};
use std::collections::HashMap;
use tests::fixtures::disabled_stdio_spec;

async fn router_with_disabled_server(name: &str, tags: &[&str]) -> (Arc<ClientFleet>, Arc<SessionRouter>) {
    let fleet = Arc::new(ClientFleet::new());
    fleet.reconcile(vec![disabled_stdio_spec(name, tags)]).await;
    let presets = PresetResolver::new(shared_preset_store()).await.unwrap();
    let template_pool = Arc::new(TemplateInstancePool::new(fleet.events_sender()));
    let templates = Arc::new(TemplateRegistry::new());
    let router = Arc::new(SessionRouter::new(Arc::clone(&fleet), presets, template_pool, templates));
    (fleet, router)
}

#[tokio::test]
async fn unregistered_session_is_not_found() {
    let (_fleet, router) = router_with_disabled_server("alpha", &[]).await;
    let err = router.visible_servers("ghost-session").await.unwrap_err();
    assert!(matches!(err, GatewayError::NotFound(_)));
}

#[tokio::test]
async fn never_ready_server_is_invisible_to_every_filter_mode() {
    let (_fleet, router) = router_with_disabled_server("alpha", &["dev"]).await;
    router.register_session(InboundSession::new("s1".into(), TagFilterMode::None));

    let visible = router.visible_servers("s1").await.unwrap();
    assert!(visible.is_empty(), "a disabled server never reaches Ready and so is never visible");
}

#[tokio::test]
async fn resolve_distinguishes_unknown_server_from_invisible_server() {
    let (_fleet, router) = router_with_disabled_server("alpha", &[]).await;
    router.register_session(InboundSession::new("s1".into(), TagFilterMode::None));

    let unknown = router.resolve("s1", &qualify_name("nope", "tool")).await.unwrap_err();
    assert!(matches!(unknown, GatewayError::NotFound(_)));

    let invisible = router.resolve("s1", &qualify_name("alpha", "tool")).await.unwrap_err();
    assert!(matches!(invisible, GatewayError::NotPermitted(_)));
}

#[tokio::test]
async fn advanced_mode_without_tag_query_is_a_validation_error() {
    let (_fleet, router) = router_with_disabled_server("alpha", &[]).await;
    router.register_session(InboundSession::new("s1".into(), TagFilterMode::Advanced));

    let err = router.visible_servers("s1").await.unwrap_err();
    assert!(matches!(err, GatewayError::Validation(_)));
}

#[tokio::test]
async fn preset_mode_without_preset_name_is_a_validation_error() {
    let (_fleet, router) = router_with_disabled_server("alpha", &[]).await;
    router.register_session(InboundSession::new("s1".into(), TagFilterMode::Preset));

    let err = router.visible_servers("s1").await.unwrap_err();
    assert!(matches!(err, GatewayError::Validation(_)));
}

#[tokio::test]
async fn template_filtered_out_by_tags_never_reaches_instantiation() {
    use mxgate_core::{ServerSpec, TransportSpec};

    let fleet = Arc::new(ClientFleet::new());
    let presets = PresetResolver::new(shared_preset_store()).await.unwrap();
    let template_pool = Arc::new(TemplateInstancePool::new(fleet.events_sender()));
    let templates = Arc::new(TemplateRegistry::new());

    let mut sessions = HashMap::new();
    sessions.insert(
        "pg".to_string(),
        ServerSpec {
            name: "pg".to_string(),
            tags: vec!["db".to_string()],
            disabled: false,
            transport: TransportSpec::Http { url: "${DB_URL}".into(), headers: HashMap::new(), sse: false },
            connect_timeout_secs: 5,
            request_timeout_secs: 5,
            restart_policy: Default::default(),
        },
    );
    templates.set(sessions, HashMap::new());

    let router = Arc::new(SessionRouter::new(Arc::clone(&fleet), presets, Arc::clone(&template_pool), Arc::clone(&templates)));
    let mut session = InboundSession::new("s1".into(), TagFilterMode::SimpleOr);
    session.tags = vec!["web".to_string()];
    router.register_session(session);

    let visible = router.visible_servers("s1").await.unwrap();
    assert!(visible.is_empty(), "a template whose tags don't match the session's filter must not be instantiated");
    assert!(template_pool.is_empty().await, "a filtered-out template must never reach the instance pool");
}
