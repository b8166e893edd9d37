use serde::{Deserialize, Serialize};

/// Boolean tree over server tags, used by the advanced tag-filter mode
/// and by presets.
///
/// ```json
/// {"$and": [{"tag": "prod"}, {"$not": {"tag": "deprecated"}}]}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TagQuery {
    Tag(String),
    #[serde(rename = "$and")]
    And(Vec<TagQuery>),
    #[serde(rename = "$or")]
    Or(Vec<TagQuery>),
    #[serde(rename = "$not")]
    Not(Box<TagQuery>),
}

impl TagQuery {
    /// Evaluate the query against a server's tag set. Tag comparison is
    /// case-insensitive, matching `ServerSpec::has_tag`.
    pub fn eval(&self, tags: &[String]) -> bool {
        match self {
            TagQuery::Tag(t) => tags.iter().any(|candidate| candidate.eq_ignore_ascii_case(t)),
            TagQuery::And(children) => children.iter().all(|q| q.eval(tags)),
            TagQuery::Or(children) => children.iter().any(|q| q.eval(tags)),
            TagQuery::Not(child) => !child.eval(tags),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn simple_tag_matches_case_insensitively() {
        let q = TagQuery::Tag("Prod".into());
        assert!(q.eval(&tags(&["prod", "fast"])));
        assert!(!q.eval(&tags(&["staging"])));
    }

    #[test]
    fn and_requires_all_children() {
        let q = TagQuery::And(vec![TagQuery::Tag("prod".into()), TagQuery::Tag("fast".into())]);
        assert!(q.eval(&tags(&["prod", "fast"])));
        assert!(!q.eval(&tags(&["prod"])));
    }

    #[test]
    fn or_requires_any_child() {
        let q = TagQuery::Or(vec![TagQuery::Tag("prod".into()), TagQuery::Tag("staging".into())]);
        assert!(q.eval(&tags(&["staging"])));
        assert!(!q.eval(&tags(&["dev"])));
    }

    #[test]
    fn not_negates_child() {
        let q = TagQuery::Not(Box::new(TagQuery::Tag("deprecated".into())));
        assert!(q.eval(&tags(&["prod"])));
        assert!(!q.eval(&tags(&["deprecated"])));
    }

    #[test]
    fn nested_tree_evaluates_depth_first() {
        let q = TagQuery::And(vec![
            TagQuery::Tag("prod".into()),
            TagQuery::Not(Box::new(TagQuery::Tag("deprecated".into()))),
        ]);
        assert!(q.eval(&tags(&["prod", "fast"])));
        assert!(!q.eval(&tags(&["prod", "deprecated"])));
    }
}
