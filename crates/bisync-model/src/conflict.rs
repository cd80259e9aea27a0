//! Conflict records and resolution rules
//!
//! These are the persisted shapes. Behaviour (scope matching, handlers,
//! back-fill) lives in the conflict crate.

use crate::ids::{
    BatchId, ConflictId, ConflictTypeId, LinkGroupId, ResolutionActionId, RuleId, SessionId,
    SourceId,
};
use crate::lifecycle::ConflictStatus;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// What produced a conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConflictOrigin {
    /// Raised outside any batch (session-level)
    #[default]
    Detached,
    /// Raised while applying one action of a batch
    Action {
        /// Owning batch
        batch: BatchId,
        /// Action index within the batch
        index: usize,
    },
    /// Raised while applying a link change group
    LinkGroup {
        /// Offending group
        group: LinkGroupId,
    },
}

impl ConflictOrigin {
    /// Batch behind this conflict, if any
    #[inline]
    #[must_use]
    pub fn batch(self) -> Option<BatchId> {
        match self {
            Self::Action { batch, .. } => Some(batch),
            _ => None,
        }
    }
}

/// A failure the engine could not resolve on its own
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    /// Row id, assigned on insert
    pub id: Option<ConflictId>,
    /// Owning session
    pub session: SessionId,
    /// Source the conflict was detected on
    pub source: SourceId,
    /// Taxonomy id
    pub type_id: ConflictTypeId,
    /// Lifecycle status
    pub status: ConflictStatus,
    /// Opaque, type-specific payload
    pub details: String,
    /// Applicability key interpreted by the type's scope interpreter
    pub scope_hint: String,
    /// Back-reference to whatever produced it
    pub origin: ConflictOrigin,
    /// Occurrences folded into this row (countable types only grow it)
    pub count: u32,
    /// Times a handler scheduled this conflict for retry
    pub retry_count: u32,
    /// Detection time
    pub created_at: DateTime<Utc>,
    /// Rule that resolved it
    pub resolved_by: Option<RuleId>,
    /// Free-text note from the resolving handler
    pub resolution_comment: Option<String>,
}

impl Conflict {
    /// Create new unsaved, unresolved conflict
    #[must_use]
    pub fn new(
        session: SessionId,
        source: SourceId,
        type_id: ConflictTypeId,
        details: impl Into<String>,
        scope_hint: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            session,
            source,
            type_id,
            status: ConflictStatus::Unresolved,
            details: details.into(),
            scope_hint: scope_hint.into(),
            origin: ConflictOrigin::Detached,
            count: 1,
            retry_count: 0,
            created_at: Utc::now(),
            resolved_by: None,
            resolution_comment: None,
        }
    }

    /// With origin
    #[inline]
    #[must_use]
    pub fn with_origin(mut self, origin: ConflictOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// Whether `other` describes the same failure as `self`
    ///
    /// Two conflicts are the same occurrence when type, scope hint, details
    /// and origin agree. Countable de-duplication ignores the origin.
    #[must_use]
    pub fn same_occurrence(&self, other: &Conflict, ignore_origin: bool) -> bool {
        self.session == other.session
            && self.source == other.source
            && self.type_id == other.type_id
            && self.scope_hint == other.scope_hint
            && self.details == other.details
            && (ignore_origin || self.origin == other.origin)
    }
}

/// A scope pattern bound to an action and its parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionRule {
    /// Rule reference
    pub id: RuleId,
    /// Scope pattern interpreted by the conflict type's scope interpreter
    pub scope: String,
    /// Action to execute
    pub action: ResolutionActionId,
    /// Action parameters
    pub data: IndexMap<String, String>,
    /// Free-text description
    pub description: String,
    /// Authoring time
    pub created_at: DateTime<Utc>,
}

impl ResolutionRule {
    /// Data value by key
    #[inline]
    #[must_use]
    pub fn data_value(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }
}

/// Persisted rule row: a rule plus the conflict type and session it binds to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleRecord {
    /// The rule
    pub rule: ResolutionRule,
    /// Conflict type the rule was authored for
    pub type_id: ConflictTypeId,
    /// Session the rule applies to
    pub session: SessionId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_conflict_defaults() {
        let c = Conflict::new(
            SessionId::new(),
            SourceId::new(),
            ConflictTypeId::from_u128(1),
            "details",
            "/a/b",
        );
        assert_eq!(c.status, ConflictStatus::Unresolved);
        assert_eq!(c.count, 1);
        assert_eq!(c.origin, ConflictOrigin::Detached);
        assert!(c.id.is_none());
    }

    #[test]
    fn occurrence_equality() {
        let session = SessionId::new();
        let source = SourceId::new();
        let ty = ConflictTypeId::from_u128(1);
        let a = Conflict::new(session, source, ty, "d", "/x");
        let b = Conflict::new(session, source, ty, "d", "/x")
            .with_origin(ConflictOrigin::Action { batch: BatchId(1), index: 0 });

        assert!(a.same_occurrence(&b, true));
        assert!(!a.same_occurrence(&b, false));

        let c = Conflict::new(session, source, ty, "other", "/x");
        assert!(!a.same_occurrence(&c, true));
    }

    #[test]
    fn origin_batch() {
        let origin = ConflictOrigin::Action { batch: BatchId(4), index: 2 };
        assert_eq!(origin.batch(), Some(BatchId(4)));
        assert_eq!(ConflictOrigin::LinkGroup { group: LinkGroupId(1) }.batch(), None);
    }

    #[test]
    fn origin_serializes_tagged() {
        let json = serde_json::to_string(&ConflictOrigin::Action { batch: BatchId(3), index: 1 })
            .unwrap();
        assert_eq!(json, r#"{"kind":"action","batch":3,"index":1}"#);
    }
}
