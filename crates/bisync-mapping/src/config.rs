//! Mapping configuration
//!
//! Rule collections arrive as TOML or JSON, are validated on load and are
//! turned into a [`MappingSet`]. A reload replaces every collection at once.
//!
//! ```toml
//! [[aliases]]
//! left = "alice"
//! right = "asmith"
//! direction = "left_to_right"
//!
//! [[value_maps]]
//! name = "State"
//!
//! [[value_maps.rules]]
//! left = "Active"
//! right = "Open"
//! when = { field = "Type", value = "Bug" }
//! ```

use crate::error::MappingConfigError;
use crate::identity::{AttributeMapper, AttributeRule, IdentityAttribute, UserMapper, UserRule};
use crate::rule::{MappingDirection, MappingRuleKind, Side, PLACEHOLDER, WILDCARD};
use crate::value_map::{ValueMap, ValueMapRegistry, ValueRule};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Rules of one named value map
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValueMapRecord {
    /// Map name, usually the field it translates
    pub name: String,
    /// Rules in registration order
    #[serde(default)]
    pub rules: Vec<ValueRule>,
}

/// Every mapping rule collection of a session
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    /// Alias rules
    pub aliases: Vec<AttributeRule>,
    /// Display name rules
    pub display_names: Vec<AttributeRule>,
    /// Domain rules
    pub domains: Vec<AttributeRule>,
    /// Alias plus domain rules
    pub users: Vec<UserRule>,
    /// Named value maps
    pub value_maps: Vec<ValueMapRecord>,
}

impl MappingConfig {
    /// Parse and validate TOML
    ///
    /// # Errors
    /// Returns error if the document is malformed or fails validation
    pub fn from_toml_str(text: &str) -> Result<Self, MappingConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate JSON
    ///
    /// # Errors
    /// Returns error if the document is malformed or fails validation
    pub fn from_json_str(text: &str) -> Result<Self, MappingConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.toml` or `.json` file
    ///
    /// # Errors
    /// Returns error if the file cannot be read, has another extension, or
    /// fails validation
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, MappingConfigError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let parse: fn(&str) -> Result<Self, MappingConfigError> = match extension.as_deref() {
            Some("toml") => Self::from_toml_str,
            Some("json") => Self::from_json_str,
            _ => return Err(MappingConfigError::UnsupportedFormat(path.to_path_buf())),
        };
        let text = std::fs::read_to_string(path).map_err(|source| MappingConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = parse(&text)?;
        tracing::info!(path = %path.display(), rules = config.rule_count(), "mapping configuration loaded");
        Ok(config)
    }

    /// Total number of rules across every collection
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.aliases.len()
            + self.display_names.len()
            + self.domains.len()
            + self.users.len()
            + self.value_maps.iter().map(|m| m.rules.len()).sum::<usize>()
    }

    /// Reject malformed rules
    ///
    /// Duplicate rules are accepted with a warning; the first one wins at
    /// evaluation time.
    ///
    /// # Errors
    /// Returns the first problem found
    pub fn validate(&self) -> Result<(), MappingConfigError> {
        for (collection, rules) in [
            ("aliases", &self.aliases),
            ("display_names", &self.display_names),
            ("domains", &self.domains),
        ] {
            for (index, rule) in rules.iter().enumerate() {
                validate_attribute_rule(rule).map_err(|reason| MappingConfigError::invalid(collection, index, reason))?;
            }
            warn_duplicates(collection, rules);
        }

        for (index, rule) in self.users.iter().enumerate() {
            validate_user_rule(rule).map_err(|reason| MappingConfigError::invalid("users", index, reason))?;
        }
        warn_duplicates("users", &self.users);

        let mut names = HashSet::new();
        for record in &self.value_maps {
            let collection = format!("value_maps.{}", record.name);
            if record.name.is_empty() {
                return Err(MappingConfigError::invalid("value_maps", 0, "value map name is empty"));
            }
            if !names.insert(record.name.as_str()) {
                return Err(MappingConfigError::DuplicateValueMap(record.name.clone()));
            }
            for (index, rule) in record.rules.iter().enumerate() {
                validate_value_rule(rule).map_err(|reason| MappingConfigError::invalid(&collection, index, reason))?;
            }
            warn_duplicates(&collection, &record.rules);
        }
        Ok(())
    }
}

/// Sides read as from-side for a declared direction
fn from_sides(direction: MappingDirection) -> &'static [Side] {
    match direction {
        MappingDirection::LeftToRight => &[Side::Left],
        MappingDirection::RightToLeft => &[Side::Right],
        MappingDirection::TwoWay => &[Side::Left, Side::Right],
    }
}

fn validate_attribute_rule(rule: &AttributeRule) -> Result<(), String> {
    let from = from_sides(rule.direction);
    for side in from {
        if rule.pattern(*side).is_empty() {
            return Err(format!("empty {side:?} pattern"));
        }
    }
    if rule.kind == MappingRuleKind::Ignore {
        return Ok(());
    }
    for side in from {
        let to = rule.pattern(side.other());
        if to.is_empty() {
            return Err(format!("empty {:?} pattern", side.other()));
        }
        if rule.kind.uses_template() && to != WILDCARD && !to.contains(PLACEHOLDER) {
            return Err(format!("template {to:?} lacks {PLACEHOLDER}"));
        }
    }
    if rule.kind.uses_template() && rule.direction == MappingDirection::TwoWay {
        return Err(format!("{:?} rules must declare one direction", rule.kind));
    }
    Ok(())
}

fn validate_user_rule(rule: &UserRule) -> Result<(), String> {
    for side in from_sides(rule.direction) {
        if rule.pattern(*side).alias.is_empty() || rule.pattern(side.other()).alias.is_empty() {
            return Err("empty alias pattern".to_string());
        }
    }
    Ok(())
}

fn validate_value_rule(rule: &ValueRule) -> Result<(), String> {
    match &rule.when {
        Some(condition) if condition.field.is_empty() => Err("condition has no field name".to_string()),
        _ => Ok(()),
    }
}

fn warn_duplicates<T: PartialEq>(collection: &str, rules: &[T]) {
    for (index, rule) in rules.iter().enumerate() {
        if rules[..index].contains(rule) {
            tracing::warn!(collection, index, "duplicate mapping rule; the earlier one wins");
        }
    }
}

/// Evaluators built from a [`MappingConfig`]
#[derive(Debug, Clone)]
pub struct MappingSet {
    /// Alias evaluator
    pub alias: AttributeMapper,
    /// Display name evaluator
    pub display_name: AttributeMapper,
    /// Domain evaluator
    pub domain: AttributeMapper,
    /// Alias plus domain evaluator
    pub user: UserMapper,
    /// Field value maps
    pub values: ValueMapRegistry,
}

impl Default for MappingSet {
    fn default() -> Self {
        Self {
            alias: AttributeMapper::new(IdentityAttribute::Alias, []),
            display_name: AttributeMapper::new(IdentityAttribute::DisplayName, []),
            domain: AttributeMapper::new(IdentityAttribute::Domain, []),
            user: UserMapper::default(),
            values: ValueMapRegistry::default(),
        }
    }
}

impl MappingSet {
    /// Validate `config` and build every evaluator
    ///
    /// # Errors
    /// Returns error if the configuration fails validation
    pub fn from_config(config: &MappingConfig) -> Result<Self, MappingConfigError> {
        config.validate()?;
        let mut values = ValueMapRegistry::new();
        for record in &config.value_maps {
            values.register(ValueMap::new(record.name.clone(), record.rules.iter().cloned()));
        }
        Ok(Self {
            alias: AttributeMapper::new(IdentityAttribute::Alias, config.aliases.iter().cloned()),
            display_name: AttributeMapper::new(
                IdentityAttribute::DisplayName,
                config.display_names.iter().cloned(),
            ),
            domain: AttributeMapper::new(IdentityAttribute::Domain, config.domains.iter().cloned()),
            user: UserMapper::new(config.users.iter().cloned()),
            values,
        })
    }

    /// Replace every collection; on error the current rules stay in place
    ///
    /// # Errors
    /// Returns error if the configuration fails validation
    pub fn reload(&mut self, config: &MappingConfig) -> Result<(), MappingConfigError> {
        *self = Self::from_config(config)?;
        tracing::info!(rules = config.rule_count(), "mapping rules reloaded");
        Ok(())
    }

    /// Evaluator for one identity attribute
    #[must_use]
    pub fn attribute(&self, attribute: IdentityAttribute) -> &AttributeMapper {
        match attribute {
            IdentityAttribute::Alias => &self.alias,
            IdentityAttribute::DisplayName => &self.display_name,
            IdentityAttribute::Domain => &self.domain,
        }
    }
}
