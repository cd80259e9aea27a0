//! Identity translation
//!
//! Alias, display name and domain each map through an [`AttributeMapper`];
//! a full account (alias plus domain) maps through a [`UserMapper`].
//! Identity matching ignores case.

use crate::evaluator::{DirectionalRule, RuleBook};
use crate::rule::{
    apply_kind, eq_with_case, pattern_matches, Mapped, MappingDirection, MappingRuleKind, Side,
    TranslationDirection, WILDCARD,
};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Identity attribute an [`AttributeMapper`] translates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityAttribute {
    /// Account alias
    Alias,
    /// Human-readable name
    DisplayName,
    /// Account domain
    Domain,
}

impl fmt::Display for IdentityAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Alias => "alias",
            Self::DisplayName => "display name",
            Self::Domain => "domain",
        })
    }
}

/// Single-attribute mapping rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeRule {
    /// Left-side pattern
    pub left: String,
    /// Right-side pattern
    pub right: String,
    /// Declared direction
    #[serde(default)]
    pub direction: MappingDirection,
    /// Rewrite applied when this rule wins
    #[serde(default)]
    pub kind: MappingRuleKind,
}

impl AttributeRule {
    /// Create simple replacement rule
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
            kind: MappingRuleKind::SimpleReplacement,
        }
    }

    /// With rule kind
    #[inline]
    #[must_use]
    pub fn with_kind(mut self, kind: MappingRuleKind) -> Self {
        self.kind = kind;
        self
    }

    /// Pattern on `side`
    #[inline]
    #[must_use]
    pub fn pattern(&self, side: Side) -> &str {
        side.pick(self.left.as_str(), self.right.as_str())
    }
}

/// Pattern ordered the way identity tie-breaks expect
///
/// Letters compare without case first; patterns that differ only in case
/// put lowercase first, so `bob` sorts before `Bob` before `bobby`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct CollatedPattern {
    folded: String,
    raw: String,
}

impl CollatedPattern {
    fn new(raw: &str) -> Self {
        Self {
            folded: raw.to_lowercase(),
            raw: raw.to_string(),
        }
    }
}

impl Ord for CollatedPattern {
    fn cmp(&self, other: &Self) -> Ordering {
        self.folded
            .cmp(&other.folded)
            .then_with(|| other.raw.cmp(&self.raw))
    }
}

impl PartialOrd for CollatedPattern {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Specificity of an attribute rule: explicit before wildcard, then by pattern
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct AttributeRank {
    wildcard: bool,
    pattern: CollatedPattern,
}

impl DirectionalRule for AttributeRule {
    type Input = str;
    type Context = ();
    type Rank = AttributeRank;

    fn direction(&self) -> MappingDirection {
        self.direction
    }

    fn rank(&self, input: &str, side: Side, _context: &()) -> Option<AttributeRank> {
        let from = self.pattern(side);
        if !pattern_matches(from, input, false) {
            return None;
        }
        let wildcard = from == WILDCARD;
        Some(AttributeRank {
            wildcard,
            pattern: if wildcard { CollatedPattern::default() } else { CollatedPattern::new(from) },
        })
    }
}

/// Translates one identity attribute
#[derive(Debug, Clone)]
pub struct AttributeMapper {
    attribute: IdentityAttribute,
    book: RuleBook<AttributeRule>,
}

impl AttributeMapper {
    /// Create mapper
    #[must_use]
    pub fn new(attribute: IdentityAttribute, rules: impl IntoIterator<Item = AttributeRule>) -> Self {
        Self {
            attribute,
            book: RuleBook::new(rules),
        }
    }

    /// Alias mapper
    #[must_use]
    pub fn alias(rules: impl IntoIterator<Item = AttributeRule>) -> Self {
        Self::new(IdentityAttribute::Alias, rules)
    }

    /// Display name mapper
    #[must_use]
    pub fn display_name(rules: impl IntoIterator<Item = AttributeRule>) -> Self {
        Self::new(IdentityAttribute::DisplayName, rules)
    }

    /// Domain mapper
    #[must_use]
    pub fn domain(rules: impl IntoIterator<Item = AttributeRule>) -> Self {
        Self::new(IdentityAttribute::Domain, rules)
    }

    /// Attribute this mapper translates
    #[inline]
    #[must_use]
    pub fn attribute(&self) -> IdentityAttribute {
        self.attribute
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

    /// Replace every rule
    pub fn replace(&mut self, rules: impl IntoIterator<Item = AttributeRule>) {
        self.book.replace(rules);
    }

    /// Translate `value`; `None` when no rule applies
    #[must_use]
    pub fn try_map(&self, value: &str, direction: TranslationDirection) -> Option<Mapped> {
        let rule = self.book.select(value, direction, &())?;
        let to = rule.pattern(direction.source_side().other());
        let mapped = apply_kind(rule.kind, value, to);
        tracing::trace!(attribute = %self.attribute, value, ?direction, ?mapped, "identity attribute mapped");
        Some(mapped)
    }

    /// Translate `value`, falling back to the value itself; ignored maps to empty
    #[must_use]
    pub fn map_or_source(&self, value: &str, direction: TranslationDirection) -> String {
        match self.try_map(value, direction) {
            Some(Mapped::Value(v)) => v,
            Some(Mapped::Ignored) => String::new(),
            None => value.to_string(),
        }
    }
}

/// Account identity made of alias and domain
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct UserIdentity {
    /// Account alias
    pub alias: String,
    /// Account domain (may be empty)
    #[serde(default)]
    pub domain: String,
}

impl UserIdentity {
    /// Create identity
    #[inline]
    #[must_use]
    pub fn new(alias: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            domain: domain.into(),
        }
    }
}

impl fmt::Display for UserIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.domain.is_empty() {
            f.write_str(&self.alias)
        } else {
            write!(f, "{}\\{}", self.domain, self.alias)
        }
    }
}

/// Alias plus domain mapping rule
///
/// On the from-side an empty or `*` domain matches any domain. On the
/// to-side `*` copies the source component and an empty domain yields an
/// empty domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRule {
    /// Left-side pattern
    pub left: UserIdentity,
    /// Right-side pattern
    pub right: UserIdentity,
    /// Declared direction
    #[serde(default)]
    pub direction: MappingDirection,
}

impl UserRule {
    /// Create rule
    #[inline]
    #[must_use]
    pub fn new(left: UserIdentity, right: UserIdentity, direction: MappingDirection) -> Self {
        Self {
            left,
            right,
            direction,
        }
    }

    /// Pattern on `side`
    #[inline]
    #[must_use]
    pub fn pattern(&self, side: Side) -> &UserIdentity {
        side.pick(&self.left, &self.right)
    }
}

/// Specificity of a user rule: alias outranks domain, explicit outranks wildcard
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct UserRank {
    alias_wildcard: bool,
    domain_wildcard: bool,
    alias: CollatedPattern,
    domain: CollatedPattern,
}

fn domain_is_wildcard(domain: &str) -> bool {
    domain.is_empty() || domain == WILDCARD
}

impl DirectionalRule for UserRule {
    type Input = UserIdentity;
    type Context = ();
    type Rank = UserRank;

    fn direction(&self) -> MappingDirection {
        self.direction
    }

    fn rank(&self, input: &UserIdentity, side: Side, _context: &()) -> Option<UserRank> {
        let from = self.pattern(side);
        if !pattern_matches(&from.alias, &input.alias, false) {
            return None;
        }
        let domain_wildcard = domain_is_wildcard(&from.domain);
        if !domain_wildcard && !eq_with_case(&from.domain, &input.domain, false) {
            return None;
        }
        let alias_wildcard = from.alias == WILDCARD;
        Some(UserRank {
            alias_wildcard,
            domain_wildcard,
            alias: if alias_wildcard { CollatedPattern::default() } else { CollatedPattern::new(&from.alias) },
            domain: if domain_wildcard { CollatedPattern::default() } else { CollatedPattern::new(&from.domain) },
        })
    }
}

/// Translates whole account identities
#[derive(Debug, Clone, Default)]
pub struct UserMapper {
    book: RuleBook<UserRule>,
}

impl UserMapper {
    /// Create mapper
    #[must_use]
    pub fn new(rules: impl IntoIterator<Item = UserRule>) -> Self {
        Self {
            book: RuleBook::new(rules),
        }
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

    /// Replace every rule
    pub fn replace(&mut self, rules: impl IntoIterator<Item = UserRule>) {
        self.book.replace(rules);
    }

    /// Translate `user`; `None` when no rule applies
    #[must_use]
    pub fn try_map(&self, user: &UserIdentity, direction: TranslationDirection) -> Option<UserIdentity> {
        let rule = self.book.select(user, direction, &())?;
        let to = rule.pattern(direction.source_side().other());
        let alias = if to.alias == WILDCARD {
            user.alias.clone()
        } else {
            to.alias.clone()
        };
        let domain = if to.domain == WILDCARD {
            user.domain.clone()
        } else {
            to.domain.clone()
        };
        let mapped = UserIdentity { alias, domain };
        tracing::trace!(%user, %mapped, ?direction, "user identity mapped");
        Some(mapped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const L2R: TranslationDirection = TranslationDirection::LeftToRight;
    const R2L: TranslationDirection = TranslationDirection::RightToLeft;

    fn alias_mapper(rules: Vec<AttributeRule>) -> AttributeMapper {
        AttributeMapper::new(IdentityAttribute::Alias, rules)
    }

    #[test]
    fn identity_matching_ignores_case() {
        let m = alias_mapper(vec![AttributeRule::new(
            "Alice",
            "alice.smith",
            MappingDirection::LeftToRight,
        )]);
        assert_eq!(m.try_map("ALICE", L2R), Some(Mapped::Value("alice.smith".into())));
    }

    #[test]
    fn explicit_ties_prefer_lowercase_pattern() {
        let m = alias_mapper(vec![
            AttributeRule::new("Bob", "upper", MappingDirection::LeftToRight),
            AttributeRule::new("bob", "lower", MappingDirection::LeftToRight),
        ]);
        assert_eq!(m.try_map("bob", L2R).and_then(|v| v.into_value()), Some("lower".into()));
        assert_eq!(m.try_map("BOB", L2R).and_then(|v| v.into_value()), Some("lower".into()));
    }

    #[test]
    fn collated_patterns_fold_case_before_comparing() {
        let mut patterns: Vec<_> = ["bobby", "Bob", "ALICE", "bob"].into_iter().map(CollatedPattern::new).collect();
        patterns.sort();
        let raw: Vec<&str> = patterns.iter().map(|p| p.raw.as_str()).collect();
        assert_eq!(raw, vec!["ALICE", "bob", "Bob", "bobby"]);
    }

    #[test]
    fn empty_from_side_never_applies() {
        let m = alias_mapper(vec![AttributeRule::new("", "x", MappingDirection::TwoWay)]);
        assert_eq!(m.try_map("", L2R), None);
    }

    #[test]
    fn ignore_rule_maps_to_empty() {
        let m = alias_mapper(vec![AttributeRule::new("svc", "", MappingDirection::LeftToRight)
            .with_kind(MappingRuleKind::Ignore)]);
        assert_eq!(m.try_map("svc", L2R), Some(Mapped::Ignored));
        assert_eq!(m.map_or_source("svc", L2R), "");
        assert_eq!(m.map_or_source("other", L2R), "other");
    }

    #[test]
    fn compose_display_name() {
        let m = AttributeMapper::new(
            IdentityAttribute::DisplayName,
            vec![AttributeRule::new("*", "{0} (migrated)", MappingDirection::LeftToRight)
                .with_kind(MappingRuleKind::FormatCompose)],
        );
        assert_eq!(m.map_or_source("Alice", L2R), "Alice (migrated)");
    }

    #[test]
    fn user_rule_maps_alias_and_domain() {
        let m = UserMapper::new(vec![UserRule::new(
            UserIdentity::new("alias1", "domain1"),
            UserIdentity::new("alias1_target", "domain1_target"),
            MappingDirection::LeftToRight,
        )]);
        assert_eq!(
            m.try_map(&UserIdentity::new("alias1", "domain1"), L2R),
            Some(UserIdentity::new("alias1_target", "domain1_target"))
        );
        assert_eq!(m.try_map(&UserIdentity::new("alias2", "domain1"), L2R), None);
        assert_eq!(m.try_map(&UserIdentity::new("alias1", "domain2"), L2R), None);
    }

    #[test]
    fn user_wildcard_alias_with_explicit_domain() {
        let m = UserMapper::new(vec![UserRule::new(
            UserIdentity::new("default_alias", "default_domain"),
            UserIdentity::new("*", "domain1"),
            MappingDirection::RightToLeft,
        )]);
        assert_eq!(
            m.try_map(&UserIdentity::new("random alias", "domain1"), R2L),
            Some(UserIdentity::new("default_alias", "default_domain"))
        );
    }

    #[test]
    fn user_alias_is_more_specific_than_domain() {
        let m = UserMapper::new(vec![
            UserRule::new(
                UserIdentity::new("*", "redmond"),
                UserIdentity::new("by-domain", "*"),
                MappingDirection::LeftToRight,
            ),
            UserRule::new(
                UserIdentity::new("johnsm", "*"),
                UserIdentity::new("by-alias", "*"),
                MappingDirection::LeftToRight,
            ),
        ]);
        let mapped = m.try_map(&UserIdentity::new("johnsm", "redmond"), L2R).unwrap();
        assert_eq!(mapped, UserIdentity::new("by-alias", "redmond"));
    }

    #[test]
    fn user_empty_to_domain_clears_domain() {
        let m = UserMapper::new(vec![UserRule::new(
            UserIdentity::new("*", "*"),
            UserIdentity::new("*", ""),
            MappingDirection::TwoWay,
        )]);
        assert_eq!(
            m.try_map(&UserIdentity::new("alice", "corp"), L2R),
            Some(UserIdentity::new("alice", ""))
        );
    }

    #[test]
    fn user_display() {
        assert_eq!(UserIdentity::new("alice", "corp").to_string(), "corp\\alice");
        assert_eq!(UserIdentity::new("alice", "").to_string(), "alice");
    }
}
