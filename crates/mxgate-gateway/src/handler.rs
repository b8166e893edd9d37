//! Inbound `ServerHandler`: the gateway's own MCP surface.
//!
//! Rather than eagerly exposing every backend's tools with their full
//! JSON schemas, `list_tools` advertises exactly three meta-tools —
//! `tool_list`, `tool_schema`, `tool_invoke` — and `call_tool` dispatches
//! among them. A session that never calls `tool_schema` never pays for
//! the upstream `tools/list` round trip that schema would have required.
//! Prompts and resources are aggregated directly, since the protocol
//! doesn't carry a schema cost for those the way tool input schemas do.

use std::sync::Arc;

use mxgate_core::GatewayError;
use rmcp::model::*;
use rmcp::service::{NotificationContext, RequestContext};
use rmcp::{ErrorData as McpError, RoleServer, ServerHandler};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::meta_tools::{LazyMetaToolLayer, ToolInvokeOutcome};
use crate::router::SessionRouter;
use crate::session_context::SessionContext;

const TOOL_LIST: &str = "tool_list";
const TOOL_SCHEMA: &str = "tool_schema";
const TOOL_INVOKE: &str = "tool_invoke";

fn to_mcp_error(err: GatewayError) -> McpError {
    match err {
        GatewayError::NotFound(msg) => McpError::invalid_params(msg, None),
        GatewayError::NotPermitted(msg) => McpError::invalid_request(msg, None),
        GatewayError::Validation(msg) => McpError::invalid_params(msg, None),
        GatewayError::NotReady(msg) => McpError::internal_error(msg, None),
        GatewayError::AuthRequired { server_name, auth_url } => McpError::internal_error(
            format!("server '{server_name}' requires authentication (auth_url: {auth_url:?})"),
            None,
        ),
        GatewayError::Timeout(msg) => McpError::internal_error(msg, None),
        GatewayError::Transport(msg) => McpError::internal_error(msg, None),
        GatewayError::Upstream(msg) => McpError::internal_error(msg, None),
    }
}

fn session_context(extensions: &Extensions) -> Result<&SessionContext, McpError> {
    extensions
        .get::<SessionContext>()
        .ok_or_else(|| McpError::internal_error("missing session context", None))
}

fn meta_tool_descriptors() -> Vec<Tool> {
    vec![
        serde_json::from_value(json!({
            "name": TOOL_LIST,
            "description": "List the qualified names of every tool visible to this session.",
            "inputSchema": {"type": "object", "properties": {}},
        }))
        .expect("static tool descriptor"),
        serde_json::from_value(json!({
            "name": TOOL_SCHEMA,
            "description": "Fetch the description and input schema for one qualified tool name.",
            "inputSchema": {
                "type": "object",
                "properties": {"name": {"type": "string"}},
                "required": ["name"],
            },
        }))
        .expect("static tool descriptor"),
        serde_json::from_value(json!({
            "name": TOOL_INVOKE,
            "description": "Invoke one qualified tool name with arguments.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "arguments": {"type": "object"},
                },
                "required": ["name"],
            },
        }))
        .expect("static tool descriptor"),
    ]
}

#[derive(Clone)]
pub struct GatewayHandler {
    router: Arc<SessionRouter>,
    meta_tools: Arc<LazyMetaToolLayer>,
}

impl GatewayHandler {
    pub fn new(router: Arc<SessionRouter>, meta_tools: Arc<LazyMetaToolLayer>) -> Self {
        Self { router, meta_tools }
    }

    async fn dispatch_tool_list(&self, session_id: &str) -> Result<CallToolResult, McpError> {
        let result = self.meta_tools.tool_list(session_id).await.map_err(to_mcp_error)?;
        let payload = json!({ "servers": result.servers, "tools": result.tools });
        Ok(CallToolResult {
            content: vec![Content::text(payload.to_string())],
            structured_content: Some(payload),
            is_error: Some(false),
            meta: None,
        })
    }

    async fn dispatch_tool_schema(
        &self,
        session_id: &str,
        arguments: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<CallToolResult, McpError> {
        let name = arguments
            .as_ref()
            .and_then(|a| a.get("name"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| McpError::invalid_params("tool_schema requires 'name'", None))?;

        let outcome = self.meta_tools.tool_schema(session_id, name).await;
        let payload = json!({
            "schema": {
                "description": outcome.description,
                "inputSchema": outcome.input_schema,
            },
            "fromCache": outcome.from_cache,
        });
        Ok(CallToolResult {
            content: vec![Content::text(payload.to_string())],
            structured_content: Some(payload),
            is_error: Some(false),
            meta: None,
        })
    }

    async fn dispatch_tool_invoke(
        &self,
        session_id: &str,
        arguments: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<CallToolResult, McpError> {
        let mut arguments = arguments.unwrap_or_default();
        let name = arguments
            .remove("name")
            .and_then(|v| v.as_str().map(str::to_string))
            .ok_or_else(|| McpError::invalid_params("tool_invoke requires 'name'", None))?;
        let call_arguments = arguments.remove("arguments");

        let outcome = self.meta_tools.tool_invoke(session_id, &name, call_arguments).await;
        let (payload, is_error) = match outcome {
            ToolInvokeOutcome::Ok { server, tool, result } => {
                (json!({ "server": server, "tool": tool, "result": result }), false)
            }
            ToolInvokeOutcome::Err(err) => (json!({ "error": err }), true),
        };
        Ok(CallToolResult {
            content: vec![Content::text(payload.to_string())],
            structured_content: Some(payload),
            is_error: Some(is_error),
            meta: None,
        })
    }
}

impl ServerHandler for GatewayHandler {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: Default::default(),
            capabilities: ServerCapabilities::builder()
                .enable_tools_with(ToolsCapability { list_changed: Some(true) })
                .enable_prompts_with(PromptsCapability { list_changed: Some(true) })
                .enable_resources_with(ResourcesCapability {
                    subscribe: Some(false),
                    list_changed: Some(true),
                })
                .build(),
            server_info: Implementation {
                name: "mxgate-gateway".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(
                "mxgate multiplexes tool/prompt/resource calls across the configured MCP \
                 servers visible to this session. Call tool_list, then tool_schema, then \
                 tool_invoke to drive a tool; prompts and resources are listed directly."
                    .to_string(),
            ),
        }
    }

    async fn initialize(
        &self,
        _params: InitializeRequestParams,
        context: RequestContext<RoleServer>,
    ) -> Result<InitializeResult, McpError> {
        let ctx = session_context(&context.extensions)?;
        self.router.register_session(ctx.clone().into_inbound_session());
        info!(session_id = %ctx.session_id, "session initialized");

        Ok(InitializeResult {
            protocol_version: Default::default(),
            capabilities: self.get_info().capabilities,
            server_info: self.get_info().server_info,
            instructions: self.get_info().instructions,
        })
    }

    async fn on_initialized(&self, context: NotificationContext<RoleServer>) {
        if let Ok(ctx) = session_context(&context.extensions) {
            self.router.touch_session(&ctx.session_id);
        }
    }

    async fn list_tools(
        &self,
        _params: Option<PaginatedRequestParams>,
        context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        let ctx = session_context(&context.extensions)?;
        self.router.touch_session(&ctx.session_id);
        Ok(ListToolsResult::with_all_items(meta_tool_descriptors()))
    }

    async fn call_tool(
        &self,
        params: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let ctx = session_context(&context.extensions)?;
        let session_id = ctx.session_id.clone();
        self.router.touch_session(&session_id);

        debug!(session_id = %session_id, meta_tool = %params.name, "call_tool");
        match params.name.as_ref() {
            TOOL_LIST => self.dispatch_tool_list(&session_id).await,
            TOOL_SCHEMA => self.dispatch_tool_schema(&session_id, params.arguments).await,
            TOOL_INVOKE => self.dispatch_tool_invoke(&session_id, params.arguments).await,
            other => Err(McpError::invalid_params(format!("unknown meta-tool '{other}'"), None)),
        }
    }

    async fn list_prompts(
        &self,
        _params: Option<PaginatedRequestParams>,
        context: RequestContext<RoleServer>,
    ) -> Result<ListPromptsResult, McpError> {
        let ctx = session_context(&context.extensions)?;
        let names = self.router.list_prompt_names(&ctx.session_id).await.map_err(to_mcp_error)?;
        let prompts = names
            .into_iter()
            .filter_map(|name| serde_json::from_value(json!({ "name": name })).ok())
            .collect();
        Ok(ListPromptsResult::with_all_items(prompts))
    }

    async fn get_prompt(
        &self,
        params: GetPromptRequestParams,
        context: RequestContext<RoleServer>,
    ) -> Result<GetPromptResult, McpError> {
        let ctx = session_context(&context.extensions)?;
        self.meta_tools
            .prompt_get(&ctx.session_id, &params.name, params.arguments)
            .await
            .map_err(to_mcp_error)
    }

    async fn list_resources(
        &self,
        _params: Option<PaginatedRequestParams>,
        context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        let ctx = session_context(&context.extensions)?;
        let uris = self.router.list_resource_uris(&ctx.session_id).await.map_err(to_mcp_error)?;
        let resources = uris
            .into_iter()
            .filter_map(|uri| {
                serde_json::from_value(json!({ "uri": uri, "name": uri })).ok()
            })
            .collect();
        Ok(ListResourcesResult::with_all_items(resources))
    }

    async fn read_resource(
        &self,
        params: ReadResourceRequestParams,
        context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        let ctx = session_context(&context.extensions)?;
        self.meta_tools
            .resource_read(&ctx.session_id, &params.uri)
            .await
            .map_err(to_mcp_error)
    }

    async fn on_custom_request(
        &self,
        request: CustomRequest,
        _context: RequestContext<RoleServer>,
    ) -> Result<CustomResult, McpError> {
        warn!(method = %request.method, "unhandled custom request");
        Err(McpError::new(ErrorCode::METHOD_NOT_FOUND, request.method, None))
    }
}
