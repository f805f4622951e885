//! Association-selection configuration.

use crate::error::LedgerError;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;

/// Which associations of a type are cloned into its snapshots.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "serde_json::Value")]
pub enum CloneAssociations {
    /// Unset or empty: nothing is cloned.
    #[default]
    None,
    /// Every declared association.
    All,
    /// Exactly these names.
    List(Vec<String>),
    /// Exactly these names, written as `{"only": [...]}`.
    Only(Vec<String>),
    /// Every declared association except these.
    Except(Vec<String>),
}

impl TryFrom<Value> for CloneAssociations {
    type Error = LedgerError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Null => Ok(CloneAssociations::None),
            Value::String(s) if s.is_empty() => Ok(CloneAssociations::None),
            Value::String(s) if s == "all" => Ok(CloneAssociations::All),
            Value::String(s) => Err(LedgerError::Configuration(format!(
                "unknown association mode {:?}",
                s
            ))),
            Value::Array(items) if items.is_empty() => Ok(CloneAssociations::None),
            Value::Array(items) => names(items).map(CloneAssociations::List),
            Value::Object(map) if map.is_empty() => Ok(CloneAssociations::None),
            Value::Object(mut map) => {
                let only = map.remove("only");
                let except = map.remove("except");
                if let Some(key) = map.keys().next() {
                    return Err(LedgerError::Configuration(format!(
                        "unknown association option {:?}",
                        key
                    )));
                }
                match (only, except) {
                    (Some(_), Some(_)) => Err(LedgerError::Configuration(
                        "`only` and `except` cannot be combined".into(),
                    )),
                    (Some(only), None) => name_or_names(only).map(CloneAssociations::Only),
                    (None, Some(except)) => name_or_names(except).map(CloneAssociations::Except),
                    (None, None) => Ok(CloneAssociations::None),
                }
            }
            other => Err(LedgerError::Configuration(format!(
                "association config must be a string, list or object, got {}",
                other
            ))),
        }
    }
}

fn name_or_names(value: Value) -> Result<Vec<String>, LedgerError> {
    match value {
        Value::String(name) => Ok(vec![name]),
        Value::Array(items) => names(items),
        other => Err(LedgerError::Configuration(format!(
            "expected an association name or list, got {}",
            other
        ))),
    }
}

fn names(items: Vec<Value>) -> Result<Vec<String>, LedgerError> {
    items
        .into_iter()
        .map(|item| match item {
            Value::String(name) => Ok(name),
            other => Err(LedgerError::Configuration(format!(
                "association names must be strings, got {}",
                other
            ))),
        })
        .collect()
}

/// Resolve a configuration against the associations a type declares.
pub fn select_associations(declared: &[String], config: &CloneAssociations) -> BTreeSet<String> {
    match config {
        CloneAssociations::None => BTreeSet::new(),
        CloneAssociations::All => declared.iter().cloned().collect(),
        CloneAssociations::List(names) | CloneAssociations::Only(names) => {
            names.iter().cloned().collect()
        }
        CloneAssociations::Except(excluded) => declared
            .iter()
            .filter(|name| !excluded.contains(name))
            .cloned()
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn declared() -> Vec<String> {
        vec!["comments".into(), "tags".into(), "owner".into()]
    }

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn parse(value: Value) -> Result<CloneAssociations, LedgerError> {
        CloneAssociations::try_from(value)
    }

    #[test]
    fn test_empty_forms_select_nothing() {
        for value in [json!(null), json!(""), json!([]), json!({})] {
            assert_eq!(parse(value).unwrap(), CloneAssociations::None);
        }
        assert!(select_associations(&declared(), &CloneAssociations::None).is_empty());
    }

    #[test]
    fn test_except() {
        let config = parse(json!({"except": ["comments"]})).unwrap();
        assert_eq!(select_associations(&declared(), &config), set(&["tags", "owner"]));

        let single = parse(json!({"except": "owner"})).unwrap();
        assert_eq!(
            select_associations(&declared(), &single),
            set(&["comments", "tags"])
        );
    }

    #[test]
    fn test_all_and_explicit_lists() {
        let all = parse(json!("all")).unwrap();
        assert_eq!(select_associations(&declared(), &all), set(&["comments", "tags", "owner"]));
        assert!(select_associations(&[], &all).is_empty());

        let list = parse(json!(["tags"])).unwrap();
        assert_eq!(select_associations(&declared(), &list), set(&["tags"]));

        // Explicit names are taken as given, declared or not
        let only = parse(json!({"only": ["owner", "attachments"]})).unwrap();
        assert_eq!(
            select_associations(&declared(), &only),
            set(&["owner", "attachments"])
        );
    }

    #[test]
    fn test_malformed_configs() {
        for value in [
            json!({"only": ["a"], "except": ["b"]}),
            json!({"include": ["a"]}),
            json!("everything"),
            json!(true),
            json!(3),
            json!(["a", 1]),
            json!({"only": 5}),
        ] {
            assert!(
                matches!(parse(value.clone()), Err(LedgerError::Configuration(_))),
                "{} should be rejected",
                value
            );
        }
    }

    #[test]
    fn test_deserializes_through_value() {
        let config: CloneAssociations = serde_json::from_str(r#"{"only": "tags"}"#).unwrap();
        assert_eq!(config, CloneAssociations::Only(vec!["tags".into()]));

        let err = serde_json::from_str::<CloneAssociations>(r#"{"only": [], "except": []}"#);
        assert!(err.is_err());
    }
}
