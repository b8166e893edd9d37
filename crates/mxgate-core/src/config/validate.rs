use lazy_static::lazy_static;
use regex::Regex;

use crate::domain::{GatewayError, ServerSpec, TransportSpec};

lazy_static! {
    /// Single grammar for server/template identifiers, enforced once at
    /// the config-loading boundary rather than re-checked piecemeal by
    /// every consumer. Underscore is excluded because the router uses
    /// `__` as the qualified-name separator between a server name and
    /// one of its tool/prompt/resource names. Letter-led and capped at
    /// 50 characters total.
    static ref ID_RE: Regex = Regex::new(r"^[A-Za-z][A-Za-z0-9-]{0,49}$").unwrap();
}

/// Validation issue for a single rejected config entry. Config loading
/// collects these and skips the offending entry rather than failing the
/// whole reload, per the gateway's tolerant-reload behavior.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub server_name: String,
    pub error: GatewayError,
}

/// Pure structural validation of one config entry. Does not touch the
/// filesystem or network; callers substitute env tokens before calling
/// this so command/url fields are already resolved.
pub fn validate_server_spec(name: &str, spec: &ServerSpec) -> Result<(), GatewayError> {
    validate_name_and_timeouts(name, spec)?;

    match &spec.transport {
        TransportSpec::Stdio { command, .. } => {
            if command.trim().is_empty() {
                return Err(GatewayError::Validation(format!(
                    "server '{name}': stdio transport requires a non-empty command"
                )));
            }
        }
        TransportSpec::Http { url, .. } => {
            if url::Url::parse(url).is_err() {
                return Err(GatewayError::Validation(format!(
                    "server '{name}': invalid URL '{url}'"
                )));
            }
        }
    }

    Ok(())
}

/// Validation for a declared template entry. A template's `command`/`url`
/// may still contain `${TOKEN}` placeholders that only resolve once a
/// session supplies its own inputs at instantiation time, so the
/// transport-shape checks `validate_server_spec` applies (non-empty
/// command, parseable URL) don't apply here — only the name grammar and
/// timeout bounds, which a template can't defer to instantiation time.
pub fn validate_template_spec(name: &str, spec: &ServerSpec) -> Result<(), GatewayError> {
    validate_name_and_timeouts(name, spec)
}

fn validate_name_and_timeouts(name: &str, spec: &ServerSpec) -> Result<(), GatewayError> {
    if name.trim().is_empty() {
        return Err(GatewayError::Validation("server name must not be empty".into()));
    }
    if !ID_RE.is_match(name) {
        return Err(GatewayError::Validation(format!(
            "server name '{name}' must be 1-50 chars, start with a letter, and contain only \
             letters, digits, and hyphens (no underscores, which are reserved for qualified names)"
        )));
    }

    if spec.connect_timeout_secs == 0 {
        return Err(GatewayError::Validation(format!(
            "server '{name}': connect_timeout_secs must be > 0"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn stdio_spec(name: &str) -> ServerSpec {
        ServerSpec {
            name: name.to_string(),
            tags: vec![],
            disabled: false,
            transport: TransportSpec::Stdio {
                command: "echo".into(),
                args: vec![],
                env: HashMap::new(),
                cwd: None,
            },
            connect_timeout_secs: 30,
            request_timeout_secs: 60,
            restart_policy: Default::default(),
        }
    }

    #[test]
    fn rejects_underscore_in_name() {
        let spec = stdio_spec("my_server");
        assert!(validate_server_spec("my_server", &spec).is_err());
    }

    #[test]
    fn accepts_hyphenated_name() {
        let spec = stdio_spec("my-server");
        assert!(validate_server_spec("my-server", &spec).is_ok());
    }

    #[test]
    fn rejects_empty_stdio_command() {
        let mut spec = stdio_spec("server1");
        spec.transport = TransportSpec::Stdio {
            command: "".into(),
            args: vec![],
            env: HashMap::new(),
            cwd: None,
        };
        assert!(validate_server_spec("server1", &spec).is_err());
    }

    #[test]
    fn rejects_digit_led_name() {
        let spec = stdio_spec("1abc");
        assert!(validate_server_spec("1abc", &spec).is_err());
    }

    #[test]
    fn rejects_name_over_fifty_chars() {
        let name = "a".repeat(51);
        let spec = stdio_spec(&name);
        assert!(validate_server_spec(&name, &spec).is_err());
    }

    #[test]
    fn accepts_name_at_fifty_chars() {
        let name = "a".repeat(50);
        let spec = stdio_spec(&name);
        assert!(validate_server_spec(&name, &spec).is_ok());
    }

    #[test]
    fn rejects_invalid_http_url() {
        let spec = ServerSpec {
            transport: TransportSpec::Http {
                url: "not a url".into(),
                headers: HashMap::new(),
                sse: false,
            },
            ..stdio_spec("server2")
        };
        assert!(validate_server_spec("server2", &spec).is_err());
    }
}
