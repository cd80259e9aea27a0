//! Rule vocabulary shared by every mapper
//!
//! Provides directions, rule kinds, the wildcard symbol and the string
//! transforms a winning rule applies to the source value.

use serde::{Deserialize, Serialize};

/// Matches any value on the from-side; copies the source through on the to-side
pub const WILDCARD: &str = "*";

/// Placeholder substituted by format compose/decompose rules
pub const PLACEHOLDER: &str = "{0}";

/// Direction a rule is declared for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingDirection {
    /// Left value maps to right value
    LeftToRight,
    /// Right value maps to left value
    RightToLeft,
    /// Either way; consulted only when no directional rule applies
    #[default]
    TwoWay,
}

/// Direction a value is being translated in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationDirection {
    /// Value comes from the left side
    LeftToRight,
    /// Value comes from the right side
    RightToLeft,
}

impl TranslationDirection {
    /// Side the source value lives on
    #[inline]
    #[must_use]
    pub fn source_side(self) -> Side {
        match self {
            Self::LeftToRight => Side::Left,
            Self::RightToLeft => Side::Right,
        }
    }

    /// The opposite direction
    #[inline]
    #[must_use]
    pub fn reverse(self) -> Self {
        match self {
            Self::LeftToRight => Self::RightToLeft,
            Self::RightToLeft => Self::LeftToRight,
        }
    }
}

impl From<TranslationDirection> for MappingDirection {
    fn from(direction: TranslationDirection) -> Self {
        match direction {
            TranslationDirection::LeftToRight => Self::LeftToRight,
            TranslationDirection::RightToLeft => Self::RightToLeft,
        }
    }
}

/// One side of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// Left side
    Left,
    /// Right side
    Right,
}

impl Side {
    /// Pick this side's value out of a (left, right) pair
    #[inline]
    #[must_use]
    pub fn pick<'a, T: ?Sized>(self, left: &'a T, right: &'a T) -> &'a T {
        match self {
            Self::Left => left,
            Self::Right => right,
        }
    }

    /// The other side
    #[inline]
    #[must_use]
    pub fn other(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

/// How a winning rule rewrites the source value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingRuleKind {
    /// Replace with the to-side literal (`*` copies the source)
    #[default]
    SimpleReplacement,
    /// Map to nothing
    Ignore,
    /// Substitute the source for `{0}` in the to-side template
    FormatCompose,
    /// Extract the `{0}` part of the source using the to-side template
    FormatDecompose,
}

impl MappingRuleKind {
    /// Whether the to-side is a template that must contain `{0}`
    #[inline]
    #[must_use]
    pub fn uses_template(self) -> bool {
        matches!(self, Self::FormatCompose | Self::FormatDecompose)
    }
}

/// Result of a successful mapping
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Mapped<T = String> {
    /// Translated value
    Value(T),
    /// An ignore rule matched
    Ignored,
}

impl<T> Mapped<T> {
    /// The value, or `None` when ignored
    #[inline]
    #[must_use]
    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Value(v) => Some(v),
            Self::Ignored => None,
        }
    }

    /// Whether an ignore rule matched
    #[inline]
    #[must_use]
    pub fn is_ignored(&self) -> bool {
        matches!(self, Self::Ignored)
    }
}

impl Mapped<String> {
    /// Borrow the value, or `None` when ignored
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Value(v) => Some(v),
            Self::Ignored => None,
        }
    }
}

/// Whether a from-side pattern accepts `value`
///
/// Empty patterns never match.
#[must_use]
pub(crate) fn pattern_matches(pattern: &str, value: &str, case_sensitive: bool) -> bool {
    !pattern.is_empty()
        && (pattern == WILDCARD || eq_with_case(pattern, value, case_sensitive))
}

pub(crate) fn eq_with_case(a: &str, b: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        a == b
    } else {
        a.to_lowercase() == b.to_lowercase()
    }
}

/// Apply a rule kind to `source` with the winning rule's to-side pattern
#[must_use]
pub fn apply_kind(kind: MappingRuleKind, source: &str, to: &str) -> Mapped {
    match kind {
        MappingRuleKind::Ignore => Mapped::Ignored,
        _ if to == WILDCARD => Mapped::Value(source.to_string()),
        MappingRuleKind::SimpleReplacement => Mapped::Value(to.to_string()),
        MappingRuleKind::FormatCompose => Mapped::Value(to.replacen(PLACEHOLDER, source, 1)),
        MappingRuleKind::FormatDecompose => {
            Mapped::Value(decompose(to, source).unwrap_or(source).to_string())
        }
    }
}

/// The part of `value` standing where `{0}` sits in `template`
///
/// Prefix and suffix compare case-insensitively. `None` if `value` does not
/// fit the template.
fn decompose<'v>(template: &str, value: &'v str) -> Option<&'v str> {
    let (prefix, suffix) = template.split_once(PLACEHOLDER)?;
    if value.len() < prefix.len() + suffix.len() {
        return None;
    }
    let head = value.get(..prefix.len())?;
    let tail = value.get(value.len() - suffix.len()..)?;
    if !eq_with_case(head, prefix, false) || !eq_with_case(tail, suffix, false) {
        return None;
    }
    value.get(prefix.len()..value.len() - suffix.len())
}
