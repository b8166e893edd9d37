//! Shared application state handed to every axum route and every
//! `GatewayHandler` instance the streamable-HTTP transport spawns.

use std::sync::Arc;

use mxgate_fleet::{CapabilityCache, ClientFleet, TemplateInstancePool, TemplateRegistry};

use crate::preset_resolver::PresetResolver;
use crate::router::SessionRouter;

#[derive(Clone)]
pub struct AppState {
    pub fleet: Arc<ClientFleet>,
    pub router: Arc<SessionRouter>,
    pub cache: Arc<CapabilityCache>,
    pub presets: Arc<PresetResolver>,
    pub template_pool: Arc<TemplateInstancePool>,
    pub templates: Arc<TemplateRegistry>,
}
