//! Field value maps
//!
//! A [`ValueMap`] translates the value of one field, optionally depending
//! on the current value of another field. Matching is case-sensitive and
//! exact, so an empty value is an ordinary value that a rule can name.
//!
//! Precedence, highest first:
//!
//! | rank | source   | condition |
//! |------|----------|-----------|
//! | 0    | explicit | explicit  |
//! | 1    | wildcard | explicit  |
//! | 2    | explicit | wildcard  |
//! | 3    | wildcard | wildcard  |
//! | 4    | explicit | none      |
//! | 5    | wildcard | none      |
//!
//! A conditional rule only applies when its field is present in the
//! evaluation context.

use crate::evaluator::{DirectionalRule, RuleBook};
use crate::rule::{apply_kind, Mapped, MappingDirection, MappingRuleKind, Side, TranslationDirection, WILDCARD};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Current field values of the item being translated
pub type FieldValues = HashMap<String, String>;

/// Auxiliary field predicate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    /// Field whose current value is tested
    pub field: String,
    /// Expected value, or `*` for any value
    pub value: String,
}

impl Condition {
    /// Create condition
    #[inline]
    #[must_use]
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    fn is_wildcard(&self) -> bool {
        self.value == WILDCARD
    }

    fn holds(&self, context: &FieldValues) -> bool {
        context
            .get(&self.field)
            .is_some_and(|current| self.is_wildcard() || *current == self.value)
    }
}

/// One value mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueRule {
    /// Left-side value
    pub left: String,
    /// Right-side value
    pub right: String,
    /// Declared direction
    #[serde(default)]
    pub direction: MappingDirection,
    /// Optional predicate on another field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<Condition>,
}

impl ValueRule {
    /// Create unconditional rule
    #[must_use]
    pub fn new(
        left: impl Into<String>,
        right: impl Into<String>,
        direction: MappingDirection,
    ) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
            direction,
            when: None,
        }
    }

    /// With condition
    #[inline]
    #[must_use]
    pub fn when(mut self, condition: Condition) -> Self {
        self.when = Some(condition);
        self
    }

    /// Value on `side`
    #[inline]
    #[must_use]
    pub fn pattern(&self, side: Side) -> &str {
        side.pick(self.left.as_str(), self.right.as_str())
    }
}

impl DirectionalRule for ValueRule {
    type Input = str;
    type Context = FieldValues;
    type Rank = u8;

    fn direction(&self) -> MappingDirection {
        self.direction
    }

    fn rank(&self, input: &str, side: Side, context: &FieldValues) -> Option<u8> {
        let from = self.pattern(side);
        if from != WILDCARD && from != input {
            return None;
        }
        let source_wildcard = u8::from(from == WILDCARD);
        match &self.when {
            None => Some(4 + source_wildcard),
            Some(condition) if condition.holds(context) => {
                Some(2 * u8::from(condition.is_wildcard()) + source_wildcard)
            }
            Some(_) => None,
        }
    }
}

/// Named value map for one field
#[derive(Debug, Clone)]
pub struct ValueMap {
    name: String,
    book: RuleBook<ValueRule>,
}

impl ValueMap {
    /// Create map
    #[must_use]
    pub fn new(name: impl Into<String>, rules: impl IntoIterator<Item = ValueRule>) -> Self {
        Self {
            name: name.into(),
            book: RuleBook::new(rules),
        }
    }

    /// Map name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of rules
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.book.len()
    }

    /// Whether there are no rules
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.book.is_empty()
    }

    /// Translate `value` given the item's current field values
    #[must_use]
    pub fn try_map(
        &self,
        value: &str,
        direction: TranslationDirection,
        context: &FieldValues,
    ) -> Option<Mapped> {
        let rule = self.book.select(value, direction, context)?;
        let to = rule.pattern(direction.source_side().other());
        Some(apply_kind(MappingRuleKind::SimpleReplacement, value, to))
    }

    /// Translate `value`, falling back to the value itself
    #[must_use]
    pub fn map_or_source(
        &self,
        value: &str,
        direction: TranslationDirection,
        context: &FieldValues,
    ) -> String {
        self.try_map(value, direction, context)
            .and_then(Mapped::into_value)
            .unwrap_or_else(|| value.to_string())
    }
}

/// Value maps looked up by name
#[derive(Debug, Clone, Default)]
pub struct ValueMapRegistry {
    maps: IndexMap<String, ValueMap>,
}

impl ValueMapRegistry {
    /// Create empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a map; the first map registered under a name is kept
    ///
    /// Returns `false` if the name was taken.
    pub fn register(&mut self, map: ValueMap) -> bool {
        if self.maps.contains_key(map.name()) {
            tracing::warn!(name = map.name(), "duplicate value map ignored");
            return false;
        }
        self.maps.insert(map.name().to_string(), map);
        true
    }

    /// Look up a map
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ValueMap> {
        self.maps.get(name)
    }

    /// Check if a map exists
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.maps.contains_key(name)
    }

    /// Registered map names in registration order
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.maps.keys().map(String::as_str).collect()
    }

    /// Number of maps
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.maps.len()
    }

    /// Whether no maps are registered
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    /// Translate through the named map; `None` for an unknown map or no match
    #[must_use]
    pub fn try_map(
        &self,
        name: &str,
        value: &str,
        direction: TranslationDirection,
        context: &FieldValues,
    ) -> Option<Mapped> {
        self.get(name)?.try_map(value, direction, context)
    }
}
