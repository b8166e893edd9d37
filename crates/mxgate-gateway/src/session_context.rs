//! Bridges the inbound transport's request-time context (the
//! `mcp-session-id` header rmcp assigns, and the `tags=`/`preset=`/
//! `tagQuery=` query params a client opens its connection with) into
//! the [`InboundSession`] the [`crate::router::SessionRouter`] filters
//! against.
//!
//! The axum middleware here runs in front of the `StreamableHttpService`
//! nest, so by the time a request reaches the `ServerHandler` the
//! parsed [`SessionContext`] is already sitting in the request
//! extensions for `initialize()` to pick up.

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use mxgate_core::{InboundSession, TagFilterMode, TagQuery};
use tracing::warn;
use uuid::Uuid;

pub const SESSION_ID_HEADER: &str = "mcp-session-id";

#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: String,
    pub tags: Vec<String>,
    pub preset_name: Option<String>,
    pub tag_query: Option<TagQuery>,
    pub enable_pagination: bool,
}

impl SessionContext {
    /// Builds the [`InboundSession`] this context describes, picking the
    /// most specific filter mode the query params actually supplied:
    /// an explicit `tagQuery` wins over `preset`, which wins over
    /// `tags`, which falls back to no filtering at all.
    pub fn into_inbound_session(self) -> InboundSession {
        let mode = if self.tag_query.is_some() {
            TagFilterMode::Advanced
        } else if self.preset_name.is_some() {
            TagFilterMode::Preset
        } else if !self.tags.is_empty() {
            TagFilterMode::SimpleOr
        } else {
            TagFilterMode::None
        };

        let mut session = InboundSession::new(self.session_id, mode);
        session.tags = self.tags;
        session.preset_name = self.preset_name;
        session.tag_query = self.tag_query;
        session.enable_pagination = self.enable_pagination;
        session
    }
}

fn parse_query(query: &str) -> SessionContext {
    let mut tags = Vec::new();
    let mut preset_name = None;
    let mut tag_query = None;
    let mut enable_pagination = false;

    for (key, value) in form_urlencoded_pairs(query) {
        match key.as_str() {
            "tags" => {
                tags = value.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect();
            }
            "preset" => preset_name = Some(value),
            "tagQuery" => match serde_json::from_str::<TagQuery>(&value) {
                Ok(q) => tag_query = Some(q),
                Err(e) => warn!("ignoring malformed tagQuery param: {e}"),
            },
            "pagination" => enable_pagination = value == "true" || value == "1",
            _ => {}
        }
    }

    SessionContext {
        session_id: String::new(),
        tags,
        preset_name,
        tag_query,
        enable_pagination,
    }
}

/// Minimal `application/x-www-form-urlencoded`-style query decoder,
/// enough for the flat `key=value&key=value` shape our query params use.
fn form_urlencoded_pairs(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            Some((percent_decode(k), percent_decode(v)))
        })
        .collect()
}

/// Percent-decodes a query component, collecting decoded octets as raw
/// bytes before interpreting the whole run as UTF-8 — a multi-byte
/// character's `%XX` triplets each decode to one byte of the same
/// codepoint, not a standalone `char`.
fn percent_decode(s: &str) -> String {
    let replaced = s.replace('+', " ");
    let mut bytes = Vec::with_capacity(replaced.len());
    let mut chars = replaced.chars();
    while let Some(c) = chars.next() {
        if c == '%' {
            let mut clone = chars.clone();
            let hi = clone.next();
            let lo = clone.next();
            if let (Some(hi), Some(lo)) = (hi, lo) {
                if let Ok(byte) = u8::from_str_radix(&format!("{hi}{lo}"), 16) {
                    bytes.push(byte);
                    chars = clone;
                    continue;
                }
            }
            bytes.push(b'%');
        } else {
            bytes.extend(c.to_string().as_bytes());
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Parses session selection out of the request's query string and
/// `mcp-session-id` header (generating one if this is a fresh
/// connection), then stashes the result in the request extensions for
/// downstream handlers.
pub async fn session_context_middleware(mut req: Request, next: Next) -> Response {
    let query = req.uri().query().unwrap_or("").to_string();
    let mut ctx = parse_query(&query);

    ctx.session_id = req
        .headers()
        .get(SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    req.extensions_mut().insert(ctx.clone());

    let mut response = next.run(req).await;
    if !response.headers().contains_key(SESSION_ID_HEADER) {
        if let Ok(value) = ctx.session_id.parse() {
            response.headers_mut().insert(SESSION_ID_HEADER, value);
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_or_tags() {
        let ctx = parse_query("tags=prod,fast");
        assert_eq!(ctx.tags, vec!["prod".to_string(), "fast".to_string()]);
    }

    #[test]
    fn parses_preset_name() {
        let ctx = parse_query("preset=release");
        assert_eq!(ctx.preset_name.as_deref(), Some("release"));
    }

    #[test]
    fn percent_decode_reassembles_multibyte_utf8() {
        assert_eq!(percent_decode("caf%C3%A9"), "café");
    }

    #[test]
    fn parses_advanced_tag_query() {
        let encoded = "tagQuery=%7B%22tag%22%3A%22prod%22%7D";
        let ctx = parse_query(encoded);
        assert_eq!(ctx.tag_query, Some(TagQuery::Tag("prod".to_string())));
    }

    #[test]
    fn filter_mode_prefers_advanced_over_preset_over_tags() {
        let mut ctx = parse_query("tags=a&preset=p");
        assert_eq!(ctx.clone().into_inbound_session().tag_filter_mode, TagFilterMode::Preset);
        ctx.tag_query = Some(TagQuery::Tag("x".into()));
        assert_eq!(ctx.into_inbound_session().tag_filter_mode, TagFilterMode::Advanced);
    }
}
