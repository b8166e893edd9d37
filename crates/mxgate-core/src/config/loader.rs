use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::{ServerSpec, TransportSpec};

use super::env_subst::substitute;
use super::validate::{validate_server_spec, validate_template_spec, ValidationIssue};

/// On-disk shape of the gateway config file:
///
/// ```json
/// {
///   "mcpServers": { "github": { "command": "npx", "args": ["-y", "gh-mcp"] } },
///   "mcpTemplates": { "postgres": { "url": "${DB_URL}" } },
///   "templateSettings": { "postgres": { "DB_URL": "postgres://localhost/app" } }
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawGatewayConfig {
    #[serde(default, rename = "mcpServers")]
    pub mcp_servers: HashMap<String, ServerSpec>,

    #[serde(default, rename = "mcpTemplates")]
    pub mcp_templates: HashMap<String, ServerSpec>,

    #[serde(default, rename = "templateSettings")]
    pub template_settings: HashMap<String, HashMap<String, String>>,
}

/// Config after env substitution and validation: the set of specs the
/// fleet reconciles against, the set of templates the template pool
/// instantiates on demand, and the issues for entries that were skipped.
#[derive(Debug, Clone, Default)]
pub struct GatewayConfig {
    pub servers: HashMap<String, ServerSpec>,
    pub templates: HashMap<String, ServerSpec>,
    pub template_settings: HashMap<String, HashMap<String, String>>,
    pub issues: Vec<ValidationIssue>,
}

impl GatewayConfig {
    pub fn parse(raw_json: &str) -> serde_json::Result<Self> {
        let raw: RawGatewayConfig = serde_json::from_str(raw_json)?;
        Ok(Self::from_raw(raw))
    }

    pub fn from_raw(raw: RawGatewayConfig) -> Self {
        let empty = HashMap::new();
        let mut servers = HashMap::new();
        let mut issues = Vec::new();

        for (name, spec) in raw.mcp_servers {
            let mut resolved = substitute_spec(&name, &spec, &empty);
            resolved.name = name.clone();
            match validate_server_spec(&name, &resolved) {
                Ok(()) => {
                    servers.insert(name, resolved);
                }
                Err(error) => issues.push(ValidationIssue {
                    server_name: name,
                    error,
                }),
            }
        }

        // Templates are validated against the name grammar and timeout
        // bounds only: a template's command/url may still carry
        // `${TOKEN}` placeholders that a session's own inputs resolve
        // later, layered on top of these declared defaults, at
        // instantiation time.
        let mut templates = HashMap::new();
        for (name, mut spec) in raw.mcp_templates {
            spec.name = name.clone();
            if let Err(error) = validate_template_spec(&name, &spec) {
                issues.push(ValidationIssue {
                    server_name: name.clone(),
                    error,
                });
                continue;
            }
            templates.insert(name, spec);
        }

        Self {
            servers,
            templates,
            template_settings: raw.template_settings,
            issues,
        }
    }
}

fn substitute_spec(_name: &str, spec: &ServerSpec, overrides: &HashMap<String, String>) -> ServerSpec {
    let mut resolved = spec.clone();
    resolved.transport = match &spec.transport {
        TransportSpec::Stdio { command, args, env, cwd } => TransportSpec::Stdio {
            command: substitute(command, overrides),
            args: args.iter().map(|a| substitute(a, overrides)).collect(),
            env: env
                .iter()
                .map(|(k, v)| (k.clone(), substitute(v, overrides)))
                .collect(),
            cwd: cwd.as_ref().map(|c| substitute(c, overrides)),
        },
        TransportSpec::Http { url, headers, sse } => TransportSpec::Http {
            url: substitute(url, overrides),
            headers: headers
                .iter()
                .map(|(k, v)| (k.clone(), substitute(v, overrides)))
                .collect(),
            sse: *sse,
        },
    };
    resolved
}

/// Re-substitute a template's raw spec with instance-specific inputs
/// layered over the template's declared defaults. Used by the Template
/// Instance Pool when it materializes a new instance.
pub fn instantiate_template(
    name: &str,
    template: &ServerSpec,
    defaults: &HashMap<String, String>,
    inputs: &HashMap<String, String>,
) -> ServerSpec {
    let mut merged = defaults.clone();
    merged.extend(inputs.clone());
    let mut instance = substitute_spec(name, template, &merged);
    instance.name = name.to_string();
    instance
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_servers_and_templates() {
        let json = r#"{
            "mcpServers": { "files": { "command": "mcp-files", "args": [] } },
            "mcpTemplates": { "pg": { "url": "${DB_URL}" } },
            "templateSettings": { "pg": { "DB_URL": "postgres://localhost/app" } }
        }"#;
        let cfg = GatewayConfig::parse(json).unwrap();
        assert!(cfg.servers.contains_key("files"));
        assert!(cfg.templates.contains_key("pg"));
        assert!(cfg.issues.is_empty());
    }

    #[test]
    fn template_with_no_declared_defaults_still_loads() {
        let json = r#"{
            "mcpTemplates": { "pg": { "url": "${DB_URL}" } }
        }"#;
        let cfg = GatewayConfig::parse(json).unwrap();
        assert!(cfg.issues.is_empty());
        assert!(cfg.templates.contains_key("pg"));
    }

    #[test]
    fn skips_invalid_entries_without_failing_whole_reload() {
        let json = r#"{
            "mcpServers": {
                "good": { "command": "mcp-good", "args": [] },
                "bad_name": { "command": "mcp-bad", "args": [] }
            }
        }"#;
        let cfg = GatewayConfig::parse(json).unwrap();
        assert!(cfg.servers.contains_key("good"));
        assert!(!cfg.servers.contains_key("bad_name"));
        assert_eq!(cfg.issues.len(), 1);
        assert_eq!(cfg.issues[0].server_name, "bad_name");
    }

    #[test]
    fn template_instantiation_merges_inputs_over_defaults() {
        let template = ServerSpec {
            name: "pg".into(),
            tags: vec![],
            disabled: false,
            transport: TransportSpec::Http {
                url: "${DB_URL}".into(),
                headers: HashMap::new(),
                sse: false,
            },
            connect_timeout_secs: 30,
            request_timeout_secs: 60,
            restart_policy: Default::default(),
        };
        let mut defaults = HashMap::new();
        defaults.insert("DB_URL".to_string(), "postgres://default/app".to_string());
        let mut inputs = HashMap::new();
        inputs.insert("DB_URL".to_string(), "postgres://override/app".to_string());

        let instance = instantiate_template("pg", &template, &defaults, &inputs);
        match instance.transport {
            TransportSpec::Http { url, .. } => assert_eq!(url, "postgres://override/app"),
            _ => panic!("expected http transport"),
        }
    }
}
