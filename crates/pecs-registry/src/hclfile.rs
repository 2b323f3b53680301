//! HCL decoding for repository indexes and repository lists.
//!
//! HCL files describe lists as repeated labeled blocks:
//!
//! ```hcl
//! meta {
//!   version = "v1.0.0"
//! }
//!
//! plugin "ipinfo" {
//!   version = "v0.2.0"
//!   pluginTypes = ["decider"]
//!
//!   artifact "linux" {
//!     amd64 = "https://example.com/ipinfo-linux-amd64.tar.gz"
//!   }
//! }
//! ```
//!
//! A [`BlockRule`] table maps each block onto the key and label field used by
//! the serde types, so the same structs decode from HCL, YAML, JSON and TOML.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HclError {
    #[error(transparent)]
    Parse(#[from] hcl::Error),

    #[error(transparent)]
    Shape(#[from] serde_json::Error),
}

/// How a block identifier maps onto the decoded structure.
#[derive(Debug)]
pub(crate) struct BlockRule {
    /// Block identifier in the HCL file.
    pub ident: &'static str,
    /// Key of the block (or list of blocks) in the decoded structure.
    pub key: &'static str,
    /// Field receiving the first block label.
    pub label: Option<&'static str>,
    /// Whether the block may repeat and decodes into a list.
    pub repeated: bool,
    pub children: &'static [BlockRule],
}

/// Blocks of a repository index file.
pub(crate) const INDEX_RULES: &[BlockRule] = &[
    BlockRule {
        ident: "meta",
        key: "meta",
        label: None,
        repeated: false,
        children: &[],
    },
    BlockRule {
        ident: "plugin",
        key: "plugins",
        label: Some("name"),
        repeated: true,
        children: &[BlockRule {
            ident: "artifact",
            key: "artifacts",
            label: Some("os"),
            repeated: true,
            children: &[],
        }],
    },
];

/// Blocks of a repositories file.
pub(crate) const REPOSITORIES_RULES: &[BlockRule] = &[BlockRule {
    ident: "repository",
    key: "repository",
    label: Some("name"),
    repeated: true,
    children: &[],
}];

/// Decode HCL `text` into `T` using `rules` for the block layout.
pub(crate) fn from_str<T: DeserializeOwned>(
    text: &str,
    rules: &[BlockRule],
) -> Result<T, HclError> {
    let body = hcl::parse(text)?;
    Ok(serde_json::from_value(body_to_value(&body, rules))?)
}

fn body_to_value(body: &hcl::Body, rules: &[BlockRule]) -> Value {
    let mut map = Map::new();

    for attr in body.attributes() {
        let value = hcl::Value::from(attr.expr().clone());
        map.insert(
            attr.key().to_string(),
            serde_json::to_value(value).unwrap_or(Value::Null),
        );
    }

    for block in body.blocks() {
        let Some(rule) = rules.iter().find(|r| r.ident == block.identifier()) else {
            tracing::debug!(block = block.identifier(), "Ignoring unknown HCL block");
            continue;
        };

        let mut value = body_to_value(block.body(), rule.children);
        if let (Some(field), Some(label), Value::Object(fields)) =
            (rule.label, block.labels().first(), &mut value)
        {
            fields.insert(field.to_string(), Value::String(label.as_str().to_string()));
        }

        if !rule.repeated {
            map.insert(rule.key.to_string(), value);
            continue;
        }
        match map.get_mut(rule.key) {
            Some(Value::Array(items)) => items.push(value),
            _ => {
                map.insert(rule.key.to_string(), Value::Array(vec![value]));
            }
        }
    }

    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Repository;

    #[derive(Debug, serde::Deserialize)]
    struct Repositories {
        #[serde(default)]
        repository: Vec<Repository>,
    }

    #[test]
    fn test_labeled_blocks_become_lists() {
        let text = r#"
repository "main" {
  url = "https://example.com/repository.hcl"
}

repository "local" {
  url      = "/srv/index.hcl"
  priority = 5
}
"#;
        let repos: Repositories = from_str(text, REPOSITORIES_RULES).unwrap();
        assert_eq!(repos.repository.len(), 2);
        assert_eq!(repos.repository[0].name, "main");
        assert_eq!(repos.repository[1].name, "local");
        assert_eq!(repos.repository[1].priority, 5);
    }

    #[test]
    fn test_unknown_blocks_are_ignored() {
        let text = "comment \"x\" {\n  text = \"ignored\"\n}\n";
        let repos: Repositories = from_str(text, REPOSITORIES_RULES).unwrap();
        assert!(repos.repository.is_empty());
    }

    #[test]
    fn test_syntax_error() {
        let err = from_str::<Repositories>("repository \"main\" {", REPOSITORIES_RULES).unwrap_err();
        assert!(matches!(err, HclError::Parse(_)));
    }
}
