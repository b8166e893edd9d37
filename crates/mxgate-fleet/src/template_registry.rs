//! Holds the declared `mcpTemplates` definitions (C8's inputs), kept in
//! sync by the config loader/reload pipeline and consulted by the
//! session router when it needs to bind a session to a rendered
//! instance.

use std::collections::HashMap;

use mxgate_core::ServerSpec;
use parking_lot::RwLock;

/// One template's raw definition plus its declared default settings.
#[derive(Debug, Clone)]
pub struct TemplateDef {
    pub spec: ServerSpec,
    pub defaults: HashMap<String, String>,
}

#[derive(Default)]
pub struct TemplateRegistry {
    templates: RwLock<HashMap<String, TemplateDef>>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole template set, as driven by an initial load or
    /// a config reload.
    pub fn set(&self, templates: HashMap<String, ServerSpec>, template_settings: HashMap<String, HashMap<String, String>>) {
        let mut map = HashMap::with_capacity(templates.len());
        for (name, spec) in templates {
            let defaults = template_settings.get(&name).cloned().unwrap_or_default();
            map.insert(name, TemplateDef { spec, defaults });
        }
        *self.templates.write() = map;
    }

    pub fn get(&self, name: &str) -> Option<TemplateDef> {
        self.templates.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.read().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.templates.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mxgate_core::TransportSpec;

    fn spec(name: &str) -> ServerSpec {
        ServerSpec {
            name: name.to_string(),
            tags: vec![],
            disabled: false,
            transport: TransportSpec::Http {
                url: "${DB_URL}".into(),
                headers: HashMap::new(),
                sse: false,
            },
            connect_timeout_secs: 5,
            request_timeout_secs: 5,
            restart_policy: Default::default(),
        }
    }

    #[test]
    fn set_then_get_round_trips() {
        let registry = TemplateRegistry::new();
        let mut templates = HashMap::new();
        templates.insert("pg".to_string(), spec("pg"));
        let mut settings = HashMap::new();
        settings.insert("pg".to_string(), HashMap::from([("DB_URL".to_string(), "postgres://default".to_string())]));
        registry.set(templates, settings);

        assert!(registry.contains("pg"));
        let def = registry.get("pg").unwrap();
        assert_eq!(def.defaults.get("DB_URL").unwrap(), "postgres://default");
        assert!(registry.get("missing").is_none());
    }
}
