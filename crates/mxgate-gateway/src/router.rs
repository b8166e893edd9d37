//! Session Router (C5): per-session tag/preset filtering over the
//! fleet's connected servers, and qualified-name routing of tool/
//! prompt/resource calls to the server that owns them.
//!
//! Qualified names use `serverName__itemName` (double underscore):
//! server names are validated against [`mxgate_core::config::validate_server_spec`]'s
//! ID grammar, which excludes underscores precisely so this separator
//! can never collide with a real server name.
//!
//! Template instances (C8) are materialized lazily here too: a
//! session's visible set is the union of the fleet's static, filter-
//! admitted servers and, for every declared template the session's
//! filter admits, a pooled instance rendered from that session's
//! context. A template name shadows a static server of the same name.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use mxgate_core::{GatewayError, GatewayResult, InboundSession, TagFilterMode, TagQuery};
use mxgate_fleet::{ClientFleet, OutboundClient, TemplateInstancePool, TemplateRegistry};
use serde_json::Value;
use tracing::debug;

use crate::preset_resolver::PresetResolver;

pub const QUALIFIED_SEPARATOR: &str = "__";

/// Splits `serverName__itemName` into its two halves. The server name
/// never contains the separator (enforced at config load), so splitting
/// on the first occurrence is unambiguous even when the item name itself
/// contains underscores.
pub fn split_qualified_name(qualified: &str) -> Option<(&str, &str)> {
    qualified.split_once(QUALIFIED_SEPARATOR)
}

pub fn qualify_name(server_name: &str, item_name: &str) -> String {
    format!("{server_name}{QUALIFIED_SEPARATOR}{item_name}")
}

/// Flattens a session's opaque `context` object into the string inputs
/// a template substitution understands. Only string-valued top-level
/// keys participate; template rendering itself stays out of scope, so
/// this is the full extent of "binding session context to a template".
fn context_to_inputs(context: &Value) -> HashMap<String, String> {
    context
        .as_object()
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

pub struct SessionRouter {
    fleet: Arc<ClientFleet>,
    sessions: DashMap<String, InboundSession>,
    presets: Arc<PresetResolver>,
    template_pool: Arc<TemplateInstancePool>,
    templates: Arc<TemplateRegistry>,
}

impl SessionRouter {
    pub fn new(
        fleet: Arc<ClientFleet>,
        presets: Arc<PresetResolver>,
        template_pool: Arc<TemplateInstancePool>,
        templates: Arc<TemplateRegistry>,
    ) -> Self {
        Self { fleet, sessions: DashMap::new(), presets, template_pool, templates }
    }

    pub fn register_session(&self, session: InboundSession) {
        debug!(session_id = %session.session_id, mode = ?session.tag_filter_mode, "session registered");
        self.sessions.insert(session.session_id.clone(), session);
    }

    pub fn remove_session(&self, session_id: &str) {
        self.sessions.remove(session_id);
    }

    pub fn touch_session(&self, session_id: &str) {
        if let Some(mut entry) = self.sessions.get_mut(session_id) {
            entry.touch();
        }
    }

    pub fn session(&self, session_id: &str) -> Option<InboundSession> {
        self.sessions.get(session_id).map(|e| e.clone())
    }

    /// Builds the tag-admission test for a session's filter mode once,
    /// so both the static-server pass and the template-materialization
    /// pass apply the exact same rule.
    fn admission_predicate(&self, session: &InboundSession) -> GatewayResult<Box<dyn Fn(&[String]) -> bool>> {
        match session.tag_filter_mode {
            TagFilterMode::None => Ok(Box::new(|_: &[String]| true)),
            TagFilterMode::SimpleOr => {
                let session_tags = session.tags.clone();
                Ok(Box::new(move |tags: &[String]| {
                    session_tags.iter().any(|t| tags.iter().any(|s| s.eq_ignore_ascii_case(t)))
                }))
            }
            TagFilterMode::Preset => {
                let preset_name = session.preset_name.as_deref().ok_or_else(|| {
                    GatewayError::Validation("preset tag-filter mode requires preset_name".into())
                })?;
                let query: TagQuery = self.presets.resolve(preset_name)?;
                Ok(Box::new(move |tags: &[String]| query.eval(tags)))
            }
            TagFilterMode::Advanced => {
                let query = session.tag_query.clone().ok_or_else(|| {
                    GatewayError::Validation("advanced tag-filter mode requires tag_query".into())
                })?;
                Ok(Box::new(move |tags: &[String]| query.eval(tags)))
            }
        }
    }

    /// The servers visible to a session: the fleet's filter-admitted
    /// static servers, minus any shadowed by a template of the same
    /// name, plus a pooled instance for every filter-admitted template.
    pub async fn visible_servers(&self, session_id: &str) -> GatewayResult<Vec<Arc<OutboundClient>>> {
        let session = self
            .sessions
            .get(session_id)
            .map(|e| e.clone())
            .ok_or_else(|| GatewayError::NotFound(format!("session '{session_id}'")))?;

        let admits = self.admission_predicate(&session)?;

        let template_names = self.templates.names();
        let mut visible: Vec<Arc<OutboundClient>> = self
            .fleet
            .ready_servers()
            .into_iter()
            .filter(|c| !template_names.contains(&c.name()))
            .filter(|c| admits(&c.spec.read().tags))
            .collect();

        let inputs = context_to_inputs(&session.context);
        for name in template_names {
            let Some(def) = self.templates.get(&name) else { continue };
            if !admits(&def.spec.tags) {
                continue;
            }
            let rendered = Arc::new(mxgate_core::config::instantiate_template(
                &name,
                &def.spec,
                &def.defaults,
                &inputs,
            ));
            let handle = self.template_pool.get_or_create(rendered).await;
            if handle.client.is_ready() {
                visible.push(handle.client);
            }
        }

        Ok(visible)
    }

    /// Union of qualified tool names visible to a session.
    pub async fn list_tool_names(&self, session_id: &str) -> GatewayResult<Vec<String>> {
        Ok(self
            .visible_servers(session_id)
            .await?
            .into_iter()
            .flat_map(|c| {
                let server_name = c.name();
                c.capabilities().tools.into_iter().map(move |t| qualify_name(&server_name, &t))
            })
            .collect())
    }

    pub async fn list_prompt_names(&self, session_id: &str) -> GatewayResult<Vec<String>> {
        Ok(self
            .visible_servers(session_id)
            .await?
            .into_iter()
            .flat_map(|c| {
                let server_name = c.name();
                c.capabilities().prompts.into_iter().map(move |p| qualify_name(&server_name, &p))
            })
            .collect())
    }

    pub async fn list_resource_uris(&self, session_id: &str) -> GatewayResult<Vec<String>> {
        Ok(self
            .visible_servers(session_id)
            .await?
            .into_iter()
            .flat_map(|c| c.capabilities().resources)
            .collect())
    }

    /// Resolves a qualified name to the owning, session-visible
    /// `OutboundClient`. Returns `NotPermitted` (not `NotFound`) when the
    /// server exists in the fleet but is filtered out of this session's
    /// view, so callers can distinguish "doesn't exist" from "exists but
    /// you can't see it".
    pub async fn resolve(&self, session_id: &str, qualified_name: &str) -> GatewayResult<(Arc<OutboundClient>, String)> {
        let (server_name, item_name) = split_qualified_name(qualified_name).ok_or_else(|| {
            GatewayError::Validation(format!(
                "'{qualified_name}' is not a qualified name (expected serverName{QUALIFIED_SEPARATOR}itemName)"
            ))
        })?;

        let visible = self.visible_servers(session_id).await?;
        let client = visible
            .into_iter()
            .find(|c| c.name() == server_name)
            .ok_or_else(|| {
                if self.fleet.get(server_name).is_some() || self.templates.contains(server_name) {
                    GatewayError::NotPermitted(format!(
                        "server '{server_name}' is not visible to this session"
                    ))
                } else {
                    GatewayError::NotFound(format!("server '{server_name}'"))
                }
            })?;

        if !client.is_ready() {
            return Err(GatewayError::NotReady(format!("server '{server_name}' is not ready")));
        }

        Ok((client, item_name.to_string()))
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn last_seen(&self, session_id: &str) -> Option<chrono::DateTime<Utc>> {
        self.sessions.get(session_id).map(|e| e.last_accessed_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_qualified_name_takes_first_separator() {
        assert_eq!(split_qualified_name("github__list_issues"), Some(("github", "list_issues")));
        assert_eq!(split_qualified_name("no-separator"), None);
    }

    #[test]
    fn qualify_roundtrips_through_split() {
        let q = qualify_name("postgres", "run_query");
        assert_eq!(split_qualified_name(&q), Some(("postgres", "run_query")));
    }

    #[test]
    fn context_to_inputs_keeps_only_string_values() {
        let context = serde_json::json!({ "db": "postgres://x", "count": 3, "flag": true });
        let inputs = context_to_inputs(&context);
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs.get("db").unwrap(), "postgres://x");
    }
}
