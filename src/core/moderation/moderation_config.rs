// Chain configuration - which filters run, their rules and their actions.
//
// Loaded from YAML by the infra layer. Component arguments stay free-form and
// are read through the typed getters on `Arguments`.

use super::banned_registry::BANDB_PREFIX;
use super::check_n_events::USER_PREFIX;
use super::moderation_models::ModerationError;
use super::moderation_service::HELP_PREFIX;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModerationConfig {
    /// Users allowed to run `/admin` commands. Platform administrators are
    /// consulted only for users not listed here.
    #[serde(default)]
    pub admin_ids: Vec<i64>,

    /// Empty means every conversation is moderated.
    #[serde(default)]
    pub allowed_conversation_ids: Vec<i64>,

    #[serde(default)]
    pub filters: Vec<StatefulFilterConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatefulFilterConfig {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub arguments: Arguments,
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
    #[serde(default)]
    pub actions: Vec<ActionConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleConfig {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub arguments: Arguments,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionConfig {
    /// Defaults to the kind when omitted.
    #[serde(default)]
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub arguments: Arguments,
}

impl ActionConfig {
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.kind
        } else {
            &self.name
        }
    }
}

/// Prefixes the engine routes itself; a filter may not take one as its name.
const RESERVED_FILTER_NAMES: [&str; 2] = [BANDB_PREFIX, HELP_PREFIX];
/// Prefixes every checkNevents filter registers next to its rules.
const RESERVED_RULE_NAMES: [&str; 2] = [BANDB_PREFIX, USER_PREFIX];

fn is_reserved(name: &str, reserved: &[&str]) -> bool {
    reserved.iter().any(|r| r.eq_ignore_ascii_case(name.trim()))
}

impl ModerationConfig {
    pub fn validate(&self) -> Result<(), ModerationError> {
        if self.admin_ids.is_empty() {
            return Err(ModerationError::ConfigError(
                "at least one admin id must be configured".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for filter in &self.filters {
            if filter.name.trim().is_empty() {
                return Err(ModerationError::ConfigError(
                    "filter name must not be empty".to_string(),
                ));
            }
            if is_reserved(&filter.name, &RESERVED_FILTER_NAMES) {
                return Err(ModerationError::ConfigError(format!(
                    "filter name '{}' is reserved",
                    filter.name
                )));
            }
            if !seen.insert(filter.name.to_lowercase()) {
                return Err(ModerationError::ConfigError(format!(
                    "duplicate filter name '{}'",
                    filter.name
                )));
            }

            let mut rule_names = HashSet::new();
            for rule in &filter.rules {
                if rule.name.trim().is_empty() {
                    return Err(ModerationError::ConfigError(format!(
                        "rule without a name in filter '{}'",
                        filter.name
                    )));
                }
                if is_reserved(&rule.name, &RESERVED_RULE_NAMES) {
                    return Err(ModerationError::ConfigError(format!(
                        "rule name '{}' in filter '{}' is reserved",
                        rule.name, filter.name
                    )));
                }
                if !rule_names.insert(rule.name.to_lowercase()) {
                    return Err(ModerationError::ConfigError(format!(
                        "duplicate rule name '{}' in filter '{}'",
                        rule.name, filter.name
                    )));
                }
            }
        }

        Ok(())
    }
}

// ============================================================================
// ARGUMENTS
// ============================================================================

/// Free-form component arguments (`isFinal`, `n`, `forwardToChatID`, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Arguments(pub Map<String, Value>);

impl Arguments {
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn get_string(&self, name: &str) -> Result<String, ModerationError> {
        match self.0.get(name) {
            Some(value) => as_string(name, value),
            None => Err(missing(name)),
        }
    }

    pub fn get_string_or(&self, name: &str, default: &str) -> Result<String, ModerationError> {
        match self.0.get(name) {
            Some(value) => as_string(name, value),
            None => Ok(default.to_string()),
        }
    }

    pub fn get_int(&self, name: &str) -> Result<i64, ModerationError> {
        match self.0.get(name) {
            Some(value) => as_int(name, value),
            None => Err(missing(name)),
        }
    }

    pub fn get_int_or(&self, name: &str, default: i64) -> Result<i64, ModerationError> {
        match self.0.get(name) {
            Some(value) => as_int(name, value),
            None => Ok(default),
        }
    }

    pub fn get_bool_or(&self, name: &str, default: bool) -> Result<bool, ModerationError> {
        match self.0.get(name) {
            Some(Value::Bool(b)) => Ok(*b),
            Some(_) => Err(wrong_type(name, "a boolean")),
            None => Ok(default),
        }
    }

    pub fn get_string_list_or_empty(&self, name: &str) -> Result<Vec<String>, ModerationError> {
        match self.0.get(name) {
            Some(Value::Array(items)) => items.iter().map(|v| as_string(name, v)).collect(),
            Some(_) => Err(wrong_type(name, "a list of strings")),
            None => Ok(Vec::new()),
        }
    }

    /// Positive count argument, e.g. `n` or `numLinks`.
    pub fn get_positive_or(&self, name: &str, default: i64) -> Result<usize, ModerationError> {
        let value = self.get_int_or(name, default)?;
        if value <= 0 {
            return Err(ModerationError::ConfigError(format!(
                "'{}' argument must be positive",
                name
            )));
        }
        Ok(value as usize)
    }

    pub fn is_final(&self) -> Result<bool, ModerationError> {
        self.get_bool_or("isFinal", false)
    }
}

fn as_string(name: &str, value: &Value) -> Result<String, ModerationError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| wrong_type(name, "a string"))
}

fn as_int(name: &str, value: &Value) -> Result<i64, ModerationError> {
    value.as_i64().ok_or_else(|| wrong_type(name, "an integer"))
}

fn missing(name: &str) -> ModerationError {
    ModerationError::ConfigError(format!("'{}' argument must be specified", name))
}

fn wrong_type(name: &str, expected: &str) -> ModerationError {
    ModerationError::ConfigError(format!("'{}' argument must be {}", name, expected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: Value) -> Arguments {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_typed_getters() {
        let a = args(json!({"n": 3, "isFinal": true, "match": "buy now", "patterns": ["a+", "b"]}));

        assert_eq!(a.get_int("n").unwrap(), 3);
        assert!(a.is_final().unwrap());
        assert_eq!(a.get_string("match").unwrap(), "buy now");
        assert_eq!(a.get_string_list_or_empty("patterns").unwrap().len(), 2);
        assert!(!a.get_bool_or("dryRun", false).unwrap());
        assert_eq!(a.get_positive_or("numLinks", 1).unwrap(), 1);
    }

    #[test]
    fn test_missing_argument_message() {
        let err = Arguments::default().get_int("n").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: 'n' argument must be specified"
        );
    }

    #[test]
    fn test_wrong_type_rejected() {
        let a = args(json!({"n": "three", "isFinal": "yes"}));
        assert!(a.get_int("n").is_err());
        assert!(a.is_final().is_err());
    }

    #[test]
    fn test_non_positive_count_rejected() {
        let a = args(json!({"n": 0}));
        assert!(a.get_positive_or("n", 5).is_err());
    }

    #[test]
    fn test_validate_requires_admin() {
        let config = ModerationConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_filter_names() {
        let filter = StatefulFilterConfig {
            name: "Spam".to_string(),
            kind: "checkNevents".to_string(),
            ..Default::default()
        };
        let mut other = filter.clone();
        other.name = "spam".to_string();
        let config = ModerationConfig {
            admin_ids: vec![1],
            allowed_conversation_ids: Vec::new(),
            filters: vec![filter, other],
        };

        assert!(config.validate().is_err());
    }

    fn single_filter(filter: StatefulFilterConfig) -> ModerationConfig {
        ModerationConfig {
            admin_ids: vec![1],
            allowed_conversation_ids: Vec::new(),
            filters: vec![filter],
        }
    }

    #[test]
    fn test_validate_rejects_reserved_filter_names() {
        for name in ["bandb", "Help"] {
            let config = single_filter(StatefulFilterConfig {
                name: name.to_string(),
                kind: "checkNevents".to_string(),
                ..Default::default()
            });

            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("is reserved"), "{}", err);
        }
    }

    #[test]
    fn test_validate_rejects_reserved_and_duplicate_rule_names() {
        for names in [vec!["user"], vec!["BANDB"], vec!["words", "Words"]] {
            let config = single_filter(StatefulFilterConfig {
                name: "newcomers".to_string(),
                kind: "checkNevents".to_string(),
                rules: names
                    .iter()
                    .map(|name| RuleConfig {
                        name: name.to_string(),
                        kind: "regex".to_string(),
                        ..Default::default()
                    })
                    .collect(),
                ..Default::default()
            });

            assert!(config.validate().is_err(), "{:?} should be rejected", names);
        }
    }

    #[test]
    fn test_validate_accepts_ordinary_names() {
        let config = single_filter(StatefulFilterConfig {
            name: "newcomers".to_string(),
            kind: "checkNevents".to_string(),
            rules: vec![RuleConfig {
                name: "words".to_string(),
                kind: "regex".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        });

        assert!(config.validate().is_ok());
    }
}
