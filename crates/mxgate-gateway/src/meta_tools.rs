//! Lazy Meta-Tool Layer (C6): the three meta-tools an inbound session
//! actually calls — `tool_list`, `tool_schema`, `tool_invoke` — backed
//! by the capability cache so a session that never inspects a schema
//! never pays for the upstream round trip.
//!
//! Per the error-handling contract, these three never throw a transport
//! error for a business-logic failure (unknown tool, filtered-out
//! server, upstream timeout): callers get a `GatewayError` only for
//! protocol-level problems (missing session), and otherwise get back a
//! structured outcome embedding the failure.

use std::sync::Arc;

use mxgate_core::{CapabilityKind, GatewayError, GatewayResult};
use mxgate_fleet::{CapabilityCache, CapabilityEntry, CapabilityKey};
use rmcp::model::{
    CallToolRequestParams, CallToolResult, GetPromptRequestParams, GetPromptResult,
    ReadResourceRequestParams, ReadResourceResult,
};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::router::SessionRouter;

/// One tool's summary as surfaced in `tool_list`'s `tools` array.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSummary {
    pub server: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// `tool_list`'s response shape: the filter-admitted server set (clean
/// names, no hash suffixes) and the tools they expose.
#[derive(Debug, Clone, Serialize)]
pub struct ToolListResult {
    pub servers: Vec<String>,
    pub tools: Vec<ToolSummary>,
}

/// `{type, message}` payload for a meta-tool's structured error object.
/// `kind` is restricted to the four values the error-handling contract
/// allows a meta-tool to report: `not_found`, `validation`, `upstream`,
/// `timeout`.
#[derive(Debug, Clone, Serialize)]
pub struct MetaToolError {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub message: String,
}

impl MetaToolError {
    fn from_gateway_error(err: GatewayError) -> Self {
        let kind = match &err {
            GatewayError::Validation(_) => "validation",
            // NotPermitted has no dedicated slot in the four-value
            // meta-tool error domain; folded into not_found so a
            // filtered-out server doesn't leak its existence.
            GatewayError::NotFound(_) | GatewayError::NotPermitted(_) => "not_found",
            GatewayError::Timeout(_) => "timeout",
            GatewayError::NotReady(_)
            | GatewayError::AuthRequired { .. }
            | GatewayError::Transport(_)
            | GatewayError::Upstream(_) => "upstream",
        };
        Self { kind, message: err.to_string() }
    }
}

/// `tool_schema`'s response shape: the schema payload plus whether this
/// call was served from the capability cache.
pub struct ToolSchemaOutcome {
    pub description: Option<String>,
    pub input_schema: Value,
    pub from_cache: bool,
}

/// `tool_invoke`'s response shape: success carries the owning server,
/// the tool name, and the upstream result; failure carries a
/// [`MetaToolError`]. Either way the call always resolves — it never
/// reaches the transport as an error.
pub enum ToolInvokeOutcome {
    Ok { server: String, tool: String, result: CallToolResult },
    Err(MetaToolError),
}

pub struct LazyMetaToolLayer {
    router: Arc<SessionRouter>,
    cache: Arc<CapabilityCache>,
}

impl LazyMetaToolLayer {
    pub fn new(router: Arc<SessionRouter>, cache: Arc<CapabilityCache>) -> Self {
        Self { router, cache }
    }

    /// The filter-admitted server set and the qualified tools they
    /// expose. Cheap: just reads names the fleet already discovered on
    /// connect, no upstream call.
    pub async fn tool_list(&self, session_id: &str) -> GatewayResult<ToolListResult> {
        let visible = self.router.visible_servers(session_id).await?;
        let servers = visible.iter().map(|c| c.name()).collect();
        let tools = visible
            .into_iter()
            .flat_map(|c| {
                let server = c.name();
                c.capabilities()
                    .tools
                    .into_iter()
                    .map(move |name| ToolSummary { server: server.clone(), name, description: None })
            })
            .collect();
        Ok(ToolListResult { servers, tools })
    }

    pub async fn prompt_list(&self, session_id: &str) -> GatewayResult<Vec<String>> {
        self.router.list_prompt_names(session_id).await
    }

    pub async fn resource_list(&self, session_id: &str) -> GatewayResult<Vec<String>> {
        self.router.list_resource_uris(session_id).await
    }

    /// Fetches (and caches) a single tool's description and input
    /// schema. Only hits the upstream server on a cache miss, and
    /// reports whether this call was that miss.
    pub async fn tool_schema(&self, session_id: &str, qualified_name: &str) -> ToolSchemaOutcome {
        match self.try_tool_schema(session_id, qualified_name).await {
            Ok(outcome) => outcome,
            Err(err) => {
                let err = MetaToolError::from_gateway_error(err);
                ToolSchemaOutcome {
                    description: None,
                    input_schema: serde_json::json!({ "error": err }),
                    from_cache: false,
                }
            }
        }
    }

    async fn try_tool_schema(
        &self,
        session_id: &str,
        qualified_name: &str,
    ) -> GatewayResult<ToolSchemaOutcome> {
        let (client, item_name) = self.router.resolve(session_id, qualified_name).await?;
        let server_name = client.name();
        let key = CapabilityKey::new(&server_name, CapabilityKind::Tool, &item_name);

        if let Some(entry) = self.cache.get(&key).await {
            debug!(qualified_name, "tool schema cache hit");
            return Ok(ToolSchemaOutcome {
                description: entry.description.clone(),
                input_schema: entry.input_schema.clone(),
                from_cache: true,
            });
        }

        let peer = client
            .peer()
            .ok_or_else(|| GatewayError::NotReady(format!("server '{server_name}' is not ready")))?;
        let request_timeout = client.spec.read().request_timeout();
        let tools = tokio::time::timeout(request_timeout, peer.list_tools(Default::default()))
            .await
            .map_err(|_| GatewayError::Timeout(format!("list_tools on '{server_name}' timed out")))?
            .map_err(|e| GatewayError::Upstream(format!("list_tools on '{server_name}' failed: {e}")))?;

        let tool = tools
            .tools
            .into_iter()
            .find(|t| t.name == item_name)
            .ok_or_else(|| GatewayError::NotFound(format!("tool '{item_name}' on server '{server_name}'")))?;

        let entry = CapabilityEntry {
            description: tool.description.map(|d| d.to_string()),
            input_schema: serde_json::to_value(&tool.input_schema).unwrap_or(Value::Null),
        };
        self.cache.insert(key, entry.clone()).await;
        Ok(ToolSchemaOutcome {
            description: entry.description,
            input_schema: entry.input_schema,
            from_cache: false,
        })
    }

    /// Dispatches a tool call to the owning server, after verifying the
    /// qualified name resolves and is visible to the session. Never
    /// returns an `Err`: upstream/routing failures come back embedded in
    /// the outcome.
    pub async fn tool_invoke(
        &self,
        session_id: &str,
        qualified_name: &str,
        arguments: Option<Value>,
    ) -> ToolInvokeOutcome {
        match self.try_tool_invoke(session_id, qualified_name, arguments).await {
            Ok((server, tool, result)) => ToolInvokeOutcome::Ok { server, tool, result },
            Err(err) => ToolInvokeOutcome::Err(MetaToolError::from_gateway_error(err)),
        }
    }

    async fn try_tool_invoke(
        &self,
        session_id: &str,
        qualified_name: &str,
        arguments: Option<Value>,
    ) -> GatewayResult<(String, String, CallToolResult)> {
        let (client, item_name) = self.router.resolve(session_id, qualified_name).await?;
        let server_name = client.name();
        let peer = client
            .peer()
            .ok_or_else(|| GatewayError::NotReady(format!("server '{server_name}' is not ready")))?;
        let request_timeout = client.spec.read().request_timeout();

        let args = arguments.and_then(|v| v.as_object().cloned());
        let result = tokio::time::timeout(
            request_timeout,
            peer.call_tool(CallToolRequestParams {
                name: item_name.clone().into(),
                arguments: args,
                task: None,
                meta: None,
            }),
        )
        .await
        .map_err(|_| GatewayError::Timeout(format!("tool call on '{server_name}' timed out")))?
        .map_err(|e| GatewayError::Upstream(format!("tool call on '{server_name}' failed: {e}")))?;

        Ok((server_name, item_name, result))
    }

    /// Fetches a prompt from the server that owns its qualified name.
    /// Not cached: prompt results can carry per-call arguments, unlike
    /// tool schemas.
    pub async fn prompt_get(
        &self,
        session_id: &str,
        qualified_name: &str,
        arguments: Option<serde_json::Map<String, Value>>,
    ) -> GatewayResult<GetPromptResult> {
        let (client, item_name) = self.router.resolve(session_id, qualified_name).await?;
        let server_name = client.name();
        let peer = client
            .peer()
            .ok_or_else(|| GatewayError::NotReady(format!("server '{server_name}' is not ready")))?;
        let request_timeout = client.spec.read().request_timeout();

        tokio::time::timeout(request_timeout, peer.get_prompt(GetPromptRequestParams { name: item_name, arguments }))
            .await
            .map_err(|_| GatewayError::Timeout(format!("get_prompt on '{server_name}' timed out")))?
            .map_err(|e| GatewayError::Upstream(format!("get_prompt on '{server_name}' failed: {e}")))
    }

    /// Reads a resource by its raw URI. Resource URIs are not qualified
    /// with a server prefix (unlike tools/prompts): the owning server is
    /// resolved by scanning the session's visible servers for one whose
    /// discovered resource set contains the URI.
    pub async fn resource_read(&self, session_id: &str, uri: &str) -> GatewayResult<ReadResourceResult> {
        let visible = self.router.visible_servers(session_id).await?;
        let client = visible
            .into_iter()
            .find(|c| c.capabilities().resources.iter().any(|r| r.as_str() == uri))
            .ok_or_else(|| GatewayError::NotFound(format!("resource '{uri}'")))?;

        let server_name = client.name();
        let peer = client
            .peer()
            .ok_or_else(|| GatewayError::NotReady(format!("server '{server_name}' is not ready")))?;
        let request_timeout = client.spec.read().request_timeout();

        tokio::time::timeout(request_timeout, peer.read_resource(ReadResourceRequestParams { uri: uri.to_string() }))
            .await
            .map_err(|_| GatewayError::Timeout(format!("read_resource on '{server_name}' timed out")))?
            .map_err(|e| GatewayError::Upstream(format!("read_resource on '{server_name}' failed: {e}")))
    }

    pub fn cache(&self) -> &Arc<CapabilityCache> {
        &self.cache
    }
}
