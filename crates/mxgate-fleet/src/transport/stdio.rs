//! STDIO transport: spawns a child process speaking MCP framing over
//! stdin/stdout.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use rmcp::transport::{ConfigureCommandExt, TokioChildProcess};
use rmcp::ServiceExt;
use tokio::process::Command;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use super::{new_client_handler, Transport, TransportConnectResult};

/// Places the child in its own process group / suppresses a console
/// window so parent-directed signals and terminal allocation don't leak
/// into spawned MCP servers.
fn configure_child_process_platform(cmd: &mut Command) {
    #[cfg(windows)]
    {
        const CREATE_NO_WINDOW: u32 = 0x08000000;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
    #[cfg(unix)]
    {
        cmd.process_group(0);
    }
}

fn command_hint(command: &str) -> &'static str {
    let cmd = command.rsplit(['/', '\\']).next().unwrap_or(command);
    if cmd == "docker" || cmd == "docker.exe" || cmd.starts_with("docker-") {
        " Ensure Docker Desktop is installed and running."
    } else {
        ""
    }
}

pub struct StdioTransport {
    server_name: String,
    command: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    cwd: Option<String>,
    connect_timeout: Duration,
    events: broadcast::Sender<mxgate_core::DomainEvent>,
}

impl StdioTransport {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        server_name: String,
        command: String,
        args: Vec<String>,
        env: HashMap<String, String>,
        cwd: Option<String>,
        connect_timeout: Duration,
        events: broadcast::Sender<mxgate_core::DomainEvent>,
    ) -> Self {
        Self {
            server_name,
            command,
            args,
            env,
            cwd,
            connect_timeout,
            events,
        }
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn connect(&self) -> TransportConnectResult {
        info!(server = %self.server_name, command = %self.command, "connecting stdio server");

        let command_path = match which::which(&self.command)
            .or_else(|_| which::which(format!("{}.exe", &self.command)))
        {
            Ok(path) => path,
            Err(_) => {
                let hint = command_hint(&self.command);
                let err = format!(
                    "command not found: {}. ensure it's installed and in PATH.{hint}",
                    self.command
                );
                error!(server = %self.server_name, "{err}");
                return TransportConnectResult::Failed(err);
            }
        };
        debug!(server = %self.server_name, path = ?command_path, "resolved command");

        let args = self.args.clone();
        let env = self.env.clone();
        let cwd = self.cwd.clone();

        let transport = match TokioChildProcess::new(Command::new(&command_path).configure(move |cmd| {
            cmd.args(&args).envs(&env).stderr(Stdio::piped()).kill_on_drop(true);
            if let Some(dir) = &cwd {
                cmd.current_dir(dir);
            }
            configure_child_process_platform(cmd);
        })) {
            Ok(t) => t,
            Err(e) => {
                let hint = command_hint(&self.command);
                let err = format!("failed to spawn process: {e}.{hint}");
                error!(server = %self.server_name, "{err}");
                return TransportConnectResult::Failed(err);
            }
        };

        let handler = new_client_handler(&self.server_name, self.events.clone());
        let connect_future = handler.serve(transport);
        let client = match tokio::time::timeout(self.connect_timeout, connect_future).await {
            Ok(Ok(client)) => client,
            Ok(Err(e)) => {
                let hint = command_hint(&self.command);
                return TransportConnectResult::Failed(format!("mcp handshake failed: {e}.{hint}"));
            }
            Err(_) => {
                return TransportConnectResult::Failed(format!(
                    "connection timeout ({:?})",
                    self.connect_timeout
                ));
            }
        };

        let tools = client
            .list_all_tools()
            .await
            .map(|v| v.into_iter().map(|t| t.name.to_string()).collect())
            .unwrap_or_default();
        let prompts = client
            .list_all_prompts()
            .await
            .map(|v| v.into_iter().map(|p| p.name).collect())
            .unwrap_or_default();
        let resources = client
            .list_all_resources()
            .await
            .map(|v| v.into_iter().map(|r| r.uri.to_string()).collect())
            .unwrap_or_default();

        info!(server = %self.server_name, "stdio server connected");
        TransportConnectResult::Connected { client, tools, prompts, resources }
    }

    fn transport_type(&self) -> &'static str {
        "stdio"
    }

    fn description(&self) -> String {
        format!("stdio:{}", self.command)
    }
}
