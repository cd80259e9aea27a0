//! Conflict resolution engine
//!
//! Raises conflicts, applies resolution rules through the registered
//! handler and back-fills newly saved rules over the open backlog.
//!
//! # Back-fill
//!
//! A back-fill pass snapshots the newest conflict id when it starts and
//! only visits conflicts up to that id. Conflicts raised while it runs are
//! left for the next rule save or a manual resolution.

use crate::builtin;
use crate::conflict_type::{ConflictPolicy, ConflictType, ResolutionContext, ResolutionKind};
use crate::error::ConflictError;
use crate::registry::{ConflictRegistry, Registration};
use bisync_delta::{ChangeBatchService, LinkChangeService};
use bisync_model::{
    validate_transition, Conflict, ConflictId, ConflictOrigin, ConflictStatus, ConflictTypeId,
    LinkGroupStatus, ResolutionActionId, ResolutionRule, RuleRecord, SessionId, SourceId,
};
use bisync_store::{ConflictQuery, Dedup, StoreError, SyncStore};
use serde::Serialize;
use std::sync::Arc;

/// Result of applying one rule to one conflict
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolutionResult {
    /// Conflict the rule was applied to
    pub conflict_id: ConflictId,
    /// Whether the conflict is now resolved
    pub resolved: bool,
    /// Outcome category
    pub kind: ResolutionKind,
    /// Handler note
    pub comment: Option<String>,
}

impl ResolutionResult {
    fn new(conflict_id: ConflictId, resolved: bool, kind: ResolutionKind) -> Self {
        Self {
            conflict_id,
            resolved,
            kind,
            comment: None,
        }
    }
}

/// Targeted result plus everything the rule back-filled
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolutionReport {
    /// Result for the conflict the rule was authored for
    pub primary: ResolutionResult,
    /// Results for other open conflicts the rule covered
    pub backfilled: Vec<ResolutionResult>,
}

impl ResolutionReport {
    fn single(primary: ResolutionResult) -> Self {
        Self {
            primary,
            backfilled: Vec::new(),
        }
    }

    /// Number of conflicts resolved by this rule, primary included
    #[must_use]
    pub fn resolved_count(&self) -> usize {
        std::iter::once(&self.primary)
            .chain(&self.backfilled)
            .filter(|r| r.resolved)
            .count()
    }
}

/// What happened when a conflict was raised
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RaiseOutcome {
    /// Row holding the occurrence
    pub conflict_id: ConflictId,
    /// Status after persisted rules were tried
    pub status: ConflictStatus,
    /// Whether a new row was created
    pub inserted: bool,
    /// Occurrence count
    pub count: u32,
    /// The session must stop until this conflict is resolved
    pub halt: bool,
    /// Set when a persisted rule handled the conflict right away
    pub auto_resolution: Option<ResolutionResult>,
}

impl RaiseOutcome {
    /// Whether the conflict still waits for a rule
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }
}

/// Result of [`ConflictResolutionEngine::guard`]
#[derive(Debug)]
pub enum Guarded<T> {
    /// The operation succeeded
    Completed(T),
    /// The operation failed and a generic conflict was raised
    Conflicted(RaiseOutcome),
}

/// Resolution action as shown to an operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionView {
    /// Action id
    pub id: ResolutionActionId,
    /// Display name
    pub friendly_name: String,
    /// Keys a rule must supply
    pub required_keys: Vec<String>,
}

/// Open conflict as shown to an operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictView {
    /// Row id
    pub id: ConflictId,
    /// Source it was raised on
    pub source: SourceId,
    /// Type id
    pub type_id: ConflictTypeId,
    /// Type display name
    pub type_name: String,
    /// Current status
    pub status: ConflictStatus,
    /// Scope hint
    pub scope_hint: String,
    /// Details payload
    pub details: String,
    /// Occurrence count
    pub count: u32,
    /// Scheduled retries so far
    pub retry_count: u32,
    /// What produced it
    pub origin: ConflictOrigin,
    /// Actions an operator may pick
    pub actions: Vec<ActionView>,
}

/// Matches conflicts against resolution rules for one session
#[derive(Debug)]
pub struct ConflictResolutionEngine {
    store: Arc<dyn SyncStore>,
    session: SessionId,
    registry: Arc<ConflictRegistry>,
    batches: ChangeBatchService,
    links: LinkChangeService,
}

impl ConflictResolutionEngine {
    /// Create engine for a session
    #[must_use]
    pub fn new(store: Arc<dyn SyncStore>, session: SessionId, registry: Arc<ConflictRegistry>) -> Self {
        Self {
            batches: ChangeBatchService::new(store.clone(), session),
            links: LinkChangeService::new(store.clone(), session),
            store,
            session,
            registry,
        }
    }

    /// Session this engine serves
    #[inline]
    #[must_use]
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Conflict type registry
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &ConflictRegistry {
        &self.registry
    }

    /// Fetch a conflict
    ///
    /// # Errors
    /// Unknown conflict or store failure.
    pub fn conflict(&self, id: ConflictId) -> Result<Conflict, ConflictError> {
        Ok(self.store.conflict(id)?)
    }

    /// Record a conflict detected while applying a change
    ///
    /// Persisted rules for the type are tried first, most specific scope
    /// first. If none settles it, the conflict stays unresolved, the
    /// causing action is held back and its batch blocks the stream.
    ///
    /// # Errors
    /// Unregistered type, illegal batch transition or store failure.
    pub fn raise_conflict(
        &self,
        source: SourceId,
        type_id: ConflictTypeId,
        details: impl Into<String>,
        scope_hint: impl Into<String>,
        origin: ConflictOrigin,
    ) -> Result<RaiseOutcome, ConflictError> {
        let conflict = self
            .registry
            .create_conflict(self.session, source, type_id, details, scope_hint, origin)?;
        let registration = self.registry.lookup(type_id, source)?;
        let dedup = match origin {
            ConflictOrigin::Detached if registration.conflict_type.countable => Dedup::Count,
            ConflictOrigin::Detached => Dedup::Insert,
            ConflictOrigin::Action { .. } | ConflictOrigin::LinkGroup { .. } => Dedup::Reuse,
        };
        let recorded = self.store.record_conflict(&conflict, dedup)?;
        self.hold(origin)?;

        let auto_resolution = if recorded.inserted {
            self.apply_persisted_rules(recorded.id, registration)?
        } else {
            None
        };
        let status = self.store.conflict(recorded.id)?.status;
        let halt = status.is_open() && registration.policy == ConflictPolicy::HaltSession;

        tracing::info!(
            conflict = %recorded.id,
            %type_id,
            %source,
            inserted = recorded.inserted,
            count = recorded.count,
            ?status,
            halt,
            "conflict raised"
        );
        Ok(RaiseOutcome {
            conflict_id: recorded.id,
            status,
            inserted: recorded.inserted,
            count: recorded.count,
            halt,
            auto_resolution,
        })
    }

    /// Raise a generic conflict for an unexpected error
    ///
    /// # Errors
    /// Store failure or illegal batch transition.
    pub fn raise_unexpected(
        &self,
        source: SourceId,
        origin: ConflictOrigin,
        error: &anyhow::Error,
    ) -> Result<RaiseOutcome, ConflictError> {
        tracing::warn!(%source, ?origin, error = %error, "unexpected error converted to conflict");
        self.raise_conflict(source, builtin::GENERIC, error_details(error), "", origin)
    }

    /// Run `op`; an error becomes a generic conflict instead of propagating
    ///
    /// # Errors
    /// Only when recording the conflict itself fails.
    pub fn guard<T>(
        &self,
        source: SourceId,
        origin: ConflictOrigin,
        op: impl FnOnce() -> anyhow::Result<T>,
    ) -> Result<Guarded<T>, ConflictError> {
        match op() {
            Ok(value) => Ok(Guarded::Completed(value)),
            Err(error) => Ok(Guarded::Conflicted(self.raise_unexpected(source, origin, &error)?)),
        }
    }

    /// Apply a newly authored rule to one conflict, then back-fill
    ///
    /// The rule is saved once its handler has run; it is not saved when it
    /// does not apply.
    ///
    /// # Errors
    /// Invalid scope, missing rule data, handler failure (the conflict
    /// stays unresolved and its batch blocked) or store failure.
    pub fn resolve_with_new_rule(
        &self,
        conflict_id: ConflictId,
        rule: ResolutionRule,
    ) -> Result<ResolutionReport, ConflictError> {
        let mut conflict = self.store.conflict(conflict_id)?;
        if conflict.session != self.session {
            return Err(StoreError::not_found("conflict", conflict_id).into());
        }
        if conflict.status == ConflictStatus::Resolved {
            return Ok(ResolutionReport::single(ResolutionResult::new(
                conflict_id,
                true,
                ResolutionKind::AlreadyResolved,
            )));
        }

        let registration = self.registry.lookup(conflict.type_id, conflict.source)?;
        let conflict_type = registration.conflict_type.as_ref();
        let Some(action) = conflict_type.action(rule.action) else {
            tracing::debug!(conflict = %conflict_id, action = %rule.action, "action not offered by conflict type");
            return Ok(ResolutionReport::single(ResolutionResult::new(
                conflict_id,
                false,
                ResolutionKind::UnknownResolutionAction,
            )));
        };
        conflict_type
            .scope
            .validate_rule_scope(&rule.scope)
            .map_err(|reason| ConflictError::invalid_scope(rule.scope.clone(), reason))?;
        action.validate_data(&rule.data)?;

        let primary = self.apply_rule(&mut conflict, &rule, conflict_type)?;
        if primary.kind == ResolutionKind::NotApplicable {
            return Ok(ResolutionReport::single(primary));
        }

        let record = RuleRecord {
            rule,
            type_id: conflict_type.id,
            session: self.session,
        };
        self.store.save_rule(&record)?;
        let backfilled = self.backfill(&record, Some(conflict_id))?;
        Ok(ResolutionReport { primary, backfilled })
    }

    /// Save a rule without a triggering conflict and back-fill it
    ///
    /// # Errors
    /// Unregistered type, unsupported action, invalid scope, missing rule
    /// data or store failure.
    pub fn save_rule(
        &self,
        source: SourceId,
        type_id: ConflictTypeId,
        rule: ResolutionRule,
    ) -> Result<Vec<ResolutionResult>, ConflictError> {
        let conflict_type = self.registry.lookup(type_id, source)?.conflict_type.as_ref();
        let action = conflict_type
            .action(rule.action)
            .ok_or(ConflictError::UnsupportedAction {
                type_id,
                action: rule.action,
            })?;
        conflict_type
            .scope
            .validate_rule_scope(&rule.scope)
            .map_err(|reason| ConflictError::invalid_scope(rule.scope.clone(), reason))?;
        action.validate_data(&rule.data)?;

        let record = RuleRecord {
            rule,
            type_id,
            session: self.session,
        };
        if self.store.save_rule(&record)? {
            tracing::info!(rule = %record.rule.id, %type_id, scope = %record.rule.scope, "resolution rule saved");
        }
        self.resolve_with_existing_rule(&record)
    }

    /// Apply a saved rule to every open conflict it covers
    ///
    /// A handler failure on one conflict is reported in its result and does
    /// not stop the pass.
    ///
    /// # Errors
    /// Store failure.
    pub fn resolve_with_existing_rule(&self, record: &RuleRecord) -> Result<Vec<ResolutionResult>, ConflictError> {
        self.backfill(record, None)
    }

    fn backfill(
        &self,
        record: &RuleRecord,
        exclude: Option<ConflictId>,
    ) -> Result<Vec<ResolutionResult>, ConflictError> {
        let Some(latest) = self.store.latest_conflict_id()? else {
            return Ok(Vec::new());
        };
        let query = ConflictQuery::open(self.session)
            .with_type(record.type_id)
            .up_to(latest);
        let mut results = Vec::new();
        for mut conflict in self.store.conflicts(&query)? {
            if conflict.id.is_some() && conflict.id == exclude {
                continue;
            }
            let registration = self.registry.lookup(conflict.type_id, conflict.source)?;
            let conflict_type = registration.conflict_type.as_ref();
            if !conflict_type.supports(record.rule.action)
                || !conflict_type
                    .handler
                    .can_resolve(conflict_type.scope, &conflict, &record.rule)
            {
                continue;
            }
            match self.apply_rule(&mut conflict, &record.rule, conflict_type) {
                Ok(result) => results.push(result),
                Err(ConflictError::Handler { conflict: failed_id, source }) => {
                    let mut failed = ResolutionResult::new(failed_id, false, ResolutionKind::Other);
                    failed.comment = Some(format!("{source:#}"));
                    results.push(failed);
                }
                Err(err) => return Err(err),
            }
        }
        tracing::info!(
            rule = %record.rule.id,
            visited = results.len(),
            resolved = results.iter().filter(|r| r.resolved).count(),
            up_to = %latest,
            "back-fill finished"
        );
        Ok(results)
    }

    /// Open conflicts for display, optionally for one source
    ///
    /// # Errors
    /// Store failure or a conflict of an unregistered type.
    pub fn unresolved(&self, source: Option<SourceId>) -> Result<Vec<ConflictView>, ConflictError> {
        let mut query = ConflictQuery::open(self.session);
        if let Some(source) = source {
            query = query.with_source(source);
        }
        self.store
            .conflicts(&query)?
            .into_iter()
            .map(|conflict| self.view(conflict))
            .collect()
    }

    fn view(&self, conflict: Conflict) -> Result<ConflictView, ConflictError> {
        let conflict_type = &self.registry.lookup(conflict.type_id, conflict.source)?.conflict_type;
        let id = conflict
            .id
            .ok_or(StoreError::Unsaved { entity: "conflict" })?;
        Ok(ConflictView {
            id,
            source: conflict.source,
            type_id: conflict.type_id,
            type_name: conflict_type.friendly_name.clone(),
            status: conflict.status,
            scope_hint: conflict.scope_hint,
            details: conflict.details,
            count: conflict.count,
            retry_count: conflict.retry_count,
            origin: conflict.origin,
            actions: conflict_type
                .actions
                .iter()
                .map(|a| ActionView {
                    id: a.id,
                    friendly_name: a.friendly_name.clone(),
                    required_keys: a.required_keys.iter().cloned().collect(),
                })
                .collect(),
        })
    }

    /// Try persisted rules on a freshly recorded conflict
    fn apply_persisted_rules(
        &self,
        id: ConflictId,
        registration: &Registration,
    ) -> Result<Option<ResolutionResult>, ConflictError> {
        let conflict_type = registration.conflict_type.as_ref();
        let mut rules = self.store.rules_for(self.session, conflict_type.id)?;
        if rules.is_empty() {
            return Ok(None);
        }
        rules.sort_by(|a, b| conflict_type.scope.compare_rule_scope(&a.rule.scope, &b.rule.scope));

        let mut conflict = self.store.conflict(id)?;
        for record in &rules {
            match self.apply_rule(&mut conflict, &record.rule, conflict_type) {
                Ok(result)
                    if matches!(
                        result.kind,
                        ResolutionKind::NotApplicable | ResolutionKind::UnknownResolutionAction
                    ) => {}
                Ok(result) => return Ok(Some(result)),
                Err(ConflictError::Handler { .. }) => return Ok(None),
                Err(err) => return Err(err),
            }
        }
        Ok(None)
    }

    /// Run the handler for one rule and persist the conflict's new status
    fn apply_rule(
        &self,
        conflict: &mut Conflict,
        rule: &ResolutionRule,
        conflict_type: &ConflictType,
    ) -> Result<ResolutionResult, ConflictError> {
        let id = conflict
            .id
            .ok_or(StoreError::Unsaved { entity: "conflict" })?;
        let Some(action) = conflict_type.action(rule.action) else {
            return Ok(ResolutionResult::new(id, false, ResolutionKind::UnknownResolutionAction));
        };
        if !conflict_type.handler.can_resolve(conflict_type.scope, conflict, rule) {
            tracing::debug!(conflict = %id, rule = %rule.id, "rule out of scope");
            return Ok(ResolutionResult::new(id, false, ResolutionKind::NotApplicable));
        }

        let context = ResolutionContext {
            batches: &self.batches,
            links: &self.links,
        };
        let outcome = match conflict_type.handler.resolve(&context, conflict, rule, action) {
            Ok(outcome) => outcome,
            Err(source) => {
                tracing::error!(conflict = %id, rule = %rule.id, error = %source, "resolution handler failed");
                if let Err(err) = self.hold(conflict.origin) {
                    tracing::error!(conflict = %id, error = %err, "could not keep conflicted batch blocked");
                }
                return Err(ConflictError::Handler { conflict: id, source });
            }
        };

        let next = if outcome.kind == ResolutionKind::ScheduledForRetry {
            ConflictStatus::ScheduledForRetry
        } else if outcome.resolved {
            ConflictStatus::Resolved
        } else {
            ConflictStatus::Failed
        };
        if conflict.status != next {
            validate_transition(conflict.status, next)?;
        }
        if next == ConflictStatus::ScheduledForRetry {
            conflict.retry_count += 1;
        }
        conflict.status = next;
        conflict.resolved_by = Some(rule.id);
        conflict.resolution_comment.clone_from(&outcome.comment);
        self.store.update_conflict(conflict)?;

        tracing::info!(conflict = %id, rule = %rule.id, kind = ?outcome.kind, status = ?next, "resolution rule applied");
        Ok(ResolutionResult {
            conflict_id: id,
            resolved: next == ConflictStatus::Resolved,
            kind: outcome.kind,
            comment: outcome.comment,
        })
    }

    /// Hold back whatever produced a conflict
    fn hold(&self, origin: ConflictOrigin) -> Result<(), ConflictError> {
        match origin {
            ConflictOrigin::Action { batch, index } => {
                self.batches.backlog_action(batch, index)?;
                self.batches.mark_conflicted(batch)?;
            }
            ConflictOrigin::LinkGroup { group } => {
                self.links.transition(group, LinkGroupStatus::Conflicted)?;
            }
            ConflictOrigin::Detached => {}
        }
        Ok(())
    }
}

/// Details payload of a generic conflict: message plus source chain
fn error_details(error: &anyhow::Error) -> String {
    let chain: Vec<String> = error.chain().skip(1).map(ToString::to_string).collect();
    serde_json::json!({
        "message": error.to_string(),
        "chain": chain,
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn details_keep_error_chain() {
        let error = anyhow::anyhow!("socket closed").context("upload failed");
        let details: serde_json::Value = serde_json::from_str(&error_details(&error)).unwrap();
        assert_eq!(details["message"], "upload failed");
        assert_eq!(details["chain"][0], "socket closed");
    }

    #[test]
    fn report_counts_resolved() {
        let report = ResolutionReport {
            primary: ResolutionResult::new(ConflictId(1), true, ResolutionKind::Retry),
            backfilled: vec![
                ResolutionResult::new(ConflictId(2), true, ResolutionKind::Retry),
                ResolutionResult::new(ConflictId(3), false, ResolutionKind::Other),
            ],
        };
        assert_eq!(report.resolved_count(), 2);
    }
}
