//! Scope interpreters
//!
//! A conflict carries a scope hint; a rule carries a scope pattern. The
//! conflict type's [`ScopeInterpreter`] decides whether the pattern covers
//! the hint and which of two patterns is more specific.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

const PATH_SEPARATOR: char = '/';
const ANY: &str = "*";

/// How a conflict type reads scope hints and rule scopes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeInterpreter {
    /// Every rule covers every conflict
    #[default]
    Global,
    /// `/`-separated paths; a rule covers its subtree (case-insensitive)
    BasicPath,
    /// Case-insensitive equality; empty or `*` covers everything
    String,
    /// Change group id equality; empty covers everything
    ChangeGroup,
    /// Inclusive `a-b` range or a single integer; empty covers everything
    IntegerRange,
}

impl ScopeInterpreter {
    /// Whether `rule_scope` covers `hint`
    #[must_use]
    pub fn is_in_scope(self, hint: &str, rule_scope: &str) -> bool {
        match self {
            Self::Global => true,
            Self::BasicPath => path_covers(rule_scope, hint),
            Self::String => {
                rule_scope.is_empty() || rule_scope == ANY || rule_scope.eq_ignore_ascii_case(hint)
            }
            Self::ChangeGroup => {
                rule_scope.is_empty()
                    || matches!(
                        (rule_scope.trim().parse::<i64>(), hint.trim().parse::<i64>()),
                        (Ok(rule), Ok(hint)) if rule == hint
                    )
            }
            Self::IntegerRange => {
                if rule_scope.trim().is_empty() {
                    return true;
                }
                match (parse_range(rule_scope), hint.trim().parse::<u64>()) {
                    (Some((low, high)), Ok(value)) => (low..=high).contains(&value),
                    _ => false,
                }
            }
        }
    }

    /// Check that a rule scope can be interpreted
    ///
    /// # Errors
    /// Returns a human readable reason when the scope is malformed
    pub fn validate_rule_scope(self, rule_scope: &str) -> Result<(), String> {
        match self {
            Self::Global | Self::String => Ok(()),
            Self::BasicPath => {
                if rule_scope.contains(ANY) {
                    Err("path scopes do not take wildcards".to_string())
                } else if rule_scope.contains("//") {
                    Err("path contains an empty segment".to_string())
                } else {
                    Ok(())
                }
            }
            Self::ChangeGroup => {
                if rule_scope.trim().is_empty() || rule_scope.trim().parse::<i64>().is_ok() {
                    Ok(())
                } else {
                    Err("expected a change group id".to_string())
                }
            }
            Self::IntegerRange => {
                if rule_scope.trim().is_empty() || parse_range(rule_scope).is_some() {
                    Ok(())
                } else {
                    Err("expected `low-high` or a single integer".to_string())
                }
            }
        }
    }

    /// Order two rule scopes, most specific first
    #[must_use]
    pub fn compare_rule_scope(self, a: &str, b: &str) -> Ordering {
        match self {
            Self::Global => Ordering::Equal,
            Self::BasicPath => path_depth(b).cmp(&path_depth(a)),
            Self::String => is_catch_all(a).cmp(&is_catch_all(b)),
            Self::ChangeGroup => a.trim().is_empty().cmp(&b.trim().is_empty()),
            Self::IntegerRange => range_width(a).cmp(&range_width(b)),
        }
    }
}

fn is_catch_all(scope: &str) -> bool {
    scope.is_empty() || scope == ANY
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(PATH_SEPARATOR).filter(|s| !s.is_empty())
}

fn path_depth(path: &str) -> usize {
    segments(path).count()
}

fn path_covers(rule_scope: &str, hint: &str) -> bool {
    let mut rule = segments(rule_scope);
    let mut hint = segments(hint);
    loop {
        match (rule.next(), hint.next()) {
            (None, _) => return true,
            (Some(_), None) => return false,
            (Some(r), Some(h)) if r.eq_ignore_ascii_case(h) => {}
            (Some(_), Some(_)) => return false,
        }
    }
}

fn parse_range(scope: &str) -> Option<(u64, u64)> {
    let scope = scope.trim();
    let (low, high) = match scope.split_once('-') {
        Some((low, high)) => (low.trim().parse().ok()?, high.trim().parse().ok()?),
        None => {
            let single = scope.parse().ok()?;
            (single, single)
        }
    };
    (low <= high).then_some((low, high))
}

/// Width of a range scope; catch-all and unreadable scopes sort last
fn range_width(scope: &str) -> u64 {
    parse_range(scope).map_or(u64::MAX, |(low, high)| high - low)
}
