use serde::{Deserialize, Serialize};

use super::TagQuery;

/// How a preset's query should be interpreted, mirroring
/// [`super::TagFilterMode`]'s simple-or vs advanced distinction but
/// scoped to a single named, reusable filter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum PresetStrategy {
    SimpleOr,
    Advanced,
}

/// A named, reusable tag filter. Resolved by the Preset Resolver when an
/// inbound session connects with `preset=<name>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preset {
    pub name: String,
    pub strategy: PresetStrategy,
    pub tag_query: TagQuery,
}
