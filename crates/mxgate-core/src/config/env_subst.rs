use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Matches `${NAME}` tokens in command/args/env/url/header values.
    static ref TOKEN_RE: Regex = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();
}

/// Substitute `${NAME}` tokens in `value`, preferring `overrides` (e.g.
/// template settings or a session's resolved inputs) and falling back to
/// the process environment. Unresolved tokens are left untouched so
/// validation can report them rather than silently producing a broken
/// command line.
pub fn substitute(value: &str, overrides: &HashMap<String, String>) -> String {
    TOKEN_RE
        .replace_all(value, |caps: &regex::Captures| {
            let name = &caps[1];
            overrides
                .get(name)
                .cloned()
                .or_else(|| std::env::var(name).ok())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Every `${NAME}` token referenced anywhere in `values`, for surfacing
/// unresolved template inputs back to the caller.
pub fn referenced_tokens<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut found = Vec::new();
    for v in values {
        for caps in TOKEN_RE.captures_iter(v) {
            let name = caps[1].to_string();
            if !found.contains(&name) {
                found.push(name);
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_from_overrides_first() {
        let mut overrides = HashMap::new();
        overrides.insert("API_KEY".to_string(), "secret".to_string());
        std::env::set_var("API_KEY", "from-env");
        assert_eq!(substitute("Bearer ${API_KEY}", &overrides), "Bearer secret");
    }

    #[test]
    fn falls_back_to_environment() {
        std::env::set_var("MXGATE_TEST_TOKEN", "env-value");
        let overrides = HashMap::new();
        assert_eq!(
            substitute("${MXGATE_TEST_TOKEN}", &overrides),
            "env-value"
        );
    }

    #[test]
    fn leaves_unresolved_tokens_untouched() {
        let overrides = HashMap::new();
        assert_eq!(substitute("${TOTALLY_UNSET_TOKEN}", &overrides), "${TOTALLY_UNSET_TOKEN}");
    }

    #[test]
    fn collects_referenced_tokens() {
        let values = vec!["${A}/${B}", "${A}"];
        let found = referenced_tokens(values.iter().copied());
        assert_eq!(found, vec!["A".to_string(), "B".to_string()]);
    }
}
