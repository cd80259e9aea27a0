use bisync_conflict::{
    builtin, ConflictError, ConflictHandler, ConflictRegistry, ConflictResolutionEngine,
    ConflictType, Guarded, HandlerOutcome, RegistryScope, ResolutionAction, ResolutionContext,
    ResolutionKind, ScopeInterpreter, StandardHandler,
};
use bisync_model::{
    ActionState, BatchStatus, Conflict, ConflictId, ConflictOrigin, ConflictStatus,
    ConflictTypeId, LinkGroupStatus, ResolutionRule,
};
use bisync_store::{Dedup, LinkStore, RuleStore, SyncStore};
use bisync_test_utils::{edit, FaultyStore, Fixture};
use indexmap::IndexMap;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::sync::Arc;

fn engine(fx: &Fixture) -> ConflictResolutionEngine {
    ConflictResolutionEngine::new(fx.store.clone(), fx.session, Arc::new(ConflictRegistry::with_defaults()))
}

fn rule(action: ResolutionAction, scope: &str) -> ResolutionRule {
    action.new_rule(scope, "test rule", IndexMap::new()).unwrap()
}

fn on_action(batch: bisync_model::BatchId, index: usize) -> ConflictOrigin {
    ConflictOrigin::Action { batch, index }
}

#[test]
fn test_raise_backlogs_action_and_blocks_stream() {
    let fx = Fixture::new();
    let engine = engine(&fx);
    let batch = fx.in_progress_batch(vec![edit("$/proj/a.txt", "1"), edit("$/proj/b.txt", "1")]);
    let later = fx.pending_batch(vec![edit("$/proj/c.txt", "2")]);

    let raised = engine
        .raise_conflict(fx.source, builtin::ITEM_NOT_FOUND, "{}", "$/proj/a.txt", on_action(batch, 0))
        .unwrap();

    assert!(raised.inserted);
    assert!(raised.is_open());
    assert!(!raised.halt);
    assert_eq!(raised.auto_resolution, None);

    let row = fx.batch(batch);
    assert_eq!(row.status, BatchStatus::Conflicted);
    assert_eq!(row.actions[0].state, ActionState::Backlogged);
    assert_eq!(row.actions[1].state, ActionState::Ready);

    let batches = fx.batches();
    assert!(batches.is_stream_blocked(fx.source).unwrap());
    assert_eq!(batches.next_pending(fx.source).unwrap(), None);
    assert_eq!(fx.batch_status(later), BatchStatus::Pending);
}

#[test]
fn test_same_action_raised_twice_reuses_row() {
    let fx = Fixture::new();
    let engine = engine(&fx);
    let batch = fx.in_progress_batch(vec![edit("$/proj/a.txt", "1")]);

    let first = engine
        .raise_conflict(fx.source, builtin::ITEM_NOT_FOUND, "{}", "$/proj/a.txt", on_action(batch, 0))
        .unwrap();
    let second = engine
        .raise_conflict(fx.source, builtin::ITEM_NOT_FOUND, "{}", "$/proj/a.txt", on_action(batch, 0))
        .unwrap();

    assert_eq!(first.conflict_id, second.conflict_id);
    assert!(!second.inserted);
    assert_eq!(second.count, 1);
    assert_eq!(fx.memory.conflict_count(), 1);
}

#[test]
fn test_countable_detached_conflict_increments_count() {
    let fx = Fixture::new();
    let engine = engine(&fx);

    let first = engine
        .raise_conflict(fx.source, builtin::ZERO_EFFECTIVE_CHECKIN, "cs 7", "7", ConflictOrigin::Detached)
        .unwrap();
    let second = engine
        .raise_conflict(fx.source, builtin::ZERO_EFFECTIVE_CHECKIN, "cs 7", "7", ConflictOrigin::Detached)
        .unwrap();

    assert_eq!(first.conflict_id, second.conflict_id);
    assert_eq!(second.count, 2);
    assert_eq!(fx.conflict(first.conflict_id).count, 2);
}

#[test]
fn test_detached_non_countable_conflicts_get_own_rows() {
    let fx = Fixture::new();
    let engine = engine(&fx);

    let first = engine
        .raise_conflict(fx.source, builtin::ITEM_NOT_FOUND, "{}", "$/a", ConflictOrigin::Detached)
        .unwrap();
    let second = engine
        .raise_conflict(fx.source, builtin::ITEM_NOT_FOUND, "{}", "$/a", ConflictOrigin::Detached)
        .unwrap();

    assert_ne!(first.conflict_id, second.conflict_id);
    assert!(second.inserted);
}

#[test]
fn test_in_scope_rule_resolves_and_releases_batch() {
    let fx = Fixture::new();
    let engine = engine(&fx);
    let batch = fx.in_progress_batch(vec![edit("$/proj/a.txt", "1"), edit("$/proj/b.txt", "1")]);
    let raised = engine
        .raise_conflict(fx.source, builtin::ITEM_NOT_FOUND, "{}", "$/proj/a.txt", on_action(batch, 0))
        .unwrap();

    let skip = rule(builtin::skip(), "$/proj");
    let rule_id = skip.id;
    let report = engine.resolve_with_new_rule(raised.conflict_id, skip).unwrap();

    assert!(report.primary.resolved);
    assert_eq!(report.primary.kind, ResolutionKind::SkippedConflictedAction);
    assert_eq!(report.resolved_count(), 1);

    let conflict = fx.conflict(raised.conflict_id);
    assert_eq!(conflict.status, ConflictStatus::Resolved);
    assert_eq!(conflict.resolved_by, Some(rule_id));

    let row = fx.batch(batch);
    assert_eq!(row.status, BatchStatus::Pending);
    assert_eq!(row.actions[0].state, ActionState::Skipped);
    assert!(!fx.batches().is_stream_blocked(fx.source).unwrap());

    let saved = fx.store.rules_for(fx.session, builtin::ITEM_NOT_FOUND).unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].rule.id, rule_id);
}

#[test]
fn test_out_of_scope_rule_is_not_applicable() {
    let fx = Fixture::new();
    let engine = engine(&fx);
    let batch = fx.in_progress_batch(vec![edit("$/proj/a.txt", "1")]);
    let raised = engine
        .raise_conflict(fx.source, builtin::ITEM_NOT_FOUND, "{}", "$/proj/a.txt", on_action(batch, 0))
        .unwrap();

    let report = engine
        .resolve_with_new_rule(raised.conflict_id, rule(builtin::retry(), "$/other"))
        .unwrap();

    assert!(!report.primary.resolved);
    assert_eq!(report.primary.kind, ResolutionKind::NotApplicable);
    assert!(report.backfilled.is_empty());
    assert_eq!(fx.conflict(raised.conflict_id).status, ConflictStatus::Unresolved);
    assert_eq!(fx.batch_status(batch), BatchStatus::Conflicted);
    assert!(fx.store.rules_for(fx.session, builtin::ITEM_NOT_FOUND).unwrap().is_empty());
}

#[test]
fn test_new_rule_backfills_matching_conflicts() {
    let fx = Fixture::new();
    let engine = engine(&fx);
    let first = fx.pending_batch(vec![edit("$/proj/a.txt", "1")]);
    let second = fx.pending_batch(vec![edit("$/proj/sub/b.txt", "2")]);
    let third = fx.pending_batch(vec![edit("$/elsewhere/c.txt", "3")]);

    let a = engine
        .raise_conflict(fx.source, builtin::ITEM_NOT_FOUND, "{}", "$/proj/a.txt", on_action(first, 0))
        .unwrap();
    let b = engine
        .raise_conflict(fx.source, builtin::ITEM_NOT_FOUND, "{}", "$/proj/sub/b.txt", on_action(second, 0))
        .unwrap();
    let c = engine
        .raise_conflict(fx.source, builtin::ITEM_NOT_FOUND, "{}", "$/elsewhere/c.txt", on_action(third, 0))
        .unwrap();

    let report = engine
        .resolve_with_new_rule(a.conflict_id, rule(builtin::retry(), "$/proj"))
        .unwrap();

    assert_eq!(report.primary.kind, ResolutionKind::Retry);
    assert_eq!(report.backfilled.len(), 1);
    assert_eq!(report.backfilled[0].conflict_id, b.conflict_id);
    assert_eq!(report.resolved_count(), 2);

    assert_eq!(fx.conflict(b.conflict_id).status, ConflictStatus::Resolved);
    assert_eq!(fx.conflict(c.conflict_id).status, ConflictStatus::Unresolved);
    assert_eq!(fx.batch_status(first), BatchStatus::Pending);
    assert_eq!(fx.batch_status(second), BatchStatus::Pending);
    assert_eq!(fx.batch_status(third), BatchStatus::Conflicted);
    assert_eq!(fx.batch(second).actions[0].state, ActionState::Ready);
}

#[test]
fn test_batch_waits_for_every_backlogged_action() {
    let fx = Fixture::new();
    let engine = engine(&fx);
    let batch = fx.in_progress_batch(vec![edit("$/proj/a.txt", "1"), edit("$/other/b.txt", "1")]);
    let a = engine
        .raise_conflict(fx.source, builtin::ITEM_NOT_FOUND, "{}", "$/proj/a.txt", on_action(batch, 0))
        .unwrap();
    engine
        .raise_conflict(fx.source, builtin::ITEM_NOT_FOUND, "{}", "$/other/b.txt", on_action(batch, 1))
        .unwrap();

    let report = engine
        .resolve_with_new_rule(a.conflict_id, rule(builtin::retry(), "$/proj"))
        .unwrap();

    assert!(report.primary.resolved);
    assert_eq!(fx.batch_status(batch), BatchStatus::Conflicted);
    assert_eq!(fx.batch(batch).actions[1].state, ActionState::Backlogged);
}

#[test]
fn test_action_not_offered_by_type() {
    let fx = Fixture::new();
    let engine = engine(&fx);
    let batch = fx.in_progress_batch(vec![edit("$/proj/a.txt", "1")]);
    let raised = engine
        .raise_conflict(fx.source, builtin::ITEM_NOT_FOUND, "{}", "$/proj/a.txt", on_action(batch, 0))
        .unwrap();

    let report = engine
        .resolve_with_new_rule(raised.conflict_id, rule(builtin::suppress(), ""))
        .unwrap();

    assert_eq!(report.primary.kind, ResolutionKind::UnknownResolutionAction);
    assert!(!report.primary.resolved);
    assert_eq!(fx.conflict(raised.conflict_id).status, ConflictStatus::Unresolved);
}

#[test]
fn test_resolving_twice_reports_already_resolved() {
    let fx = Fixture::new();
    let engine = engine(&fx);
    let raised = engine
        .raise_conflict(fx.source, builtin::GENERIC, "{}", "", ConflictOrigin::Detached)
        .unwrap();

    engine
        .resolve_with_new_rule(raised.conflict_id, rule(builtin::manual_resolved(), ""))
        .unwrap();
    let again = engine
        .resolve_with_new_rule(raised.conflict_id, rule(builtin::retry(), ""))
        .unwrap();

    assert_eq!(again.primary.kind, ResolutionKind::AlreadyResolved);
    assert!(again.primary.resolved);
    assert_eq!(fx.store.rules_for(fx.session, builtin::GENERIC).unwrap().len(), 1);
}

#[test]
fn test_invalid_scope_is_rejected() {
    let fx = Fixture::new();
    let engine = engine(&fx);
    let raised = engine
        .raise_conflict(fx.source, builtin::ITEM_NOT_FOUND, "{}", "$/proj/a.txt", ConflictOrigin::Detached)
        .unwrap();

    let err = engine
        .resolve_with_new_rule(raised.conflict_id, rule(builtin::retry(), "$/proj/*"))
        .unwrap_err();

    assert!(matches!(err, ConflictError::InvalidScope { .. }));
}

#[test]
fn test_map_version_requires_data() {
    let err = builtin::map_version()
        .new_rule("10-20", "use 9", IndexMap::new())
        .unwrap_err();
    assert!(matches!(err, ConflictError::MissingRuleData { ref key, .. } if key == builtin::MAPPED_VERSION_KEY));
}

#[test]
fn test_map_version_updates_configuration() {
    let fx = Fixture::new();
    let engine = engine(&fx);
    let batch = fx.in_progress_batch(vec![edit("$/proj/a.txt", "15")]);
    let raised = engine
        .raise_conflict(fx.source, builtin::HISTORY_NOT_FOUND, "{}", "15", on_action(batch, 0))
        .unwrap();

    let mut data = IndexMap::new();
    data.insert(builtin::MAPPED_VERSION_KEY.to_string(), "9".to_string());
    let mapping = builtin::map_version().new_rule("10-20", "use 9", data).unwrap();
    let report = engine.resolve_with_new_rule(raised.conflict_id, mapping).unwrap();

    assert_eq!(report.primary.kind, ResolutionKind::UpdatedConfiguration);
    assert_eq!(fx.batch_status(batch), BatchStatus::Pending);
}

#[derive(Debug)]
struct OfflineHandler;

impl ConflictHandler for OfflineHandler {
    fn resolve(
        &self,
        _context: &ResolutionContext<'_>,
        _conflict: &Conflict,
        _rule: &ResolutionRule,
        _action: &ResolutionAction,
    ) -> anyhow::Result<HandlerOutcome> {
        anyhow::bail!("target offline")
    }
}

const OFFLINE: ConflictTypeId = ConflictTypeId::from_u128(0x0ff1_1e);

fn engine_with_offline_type(fx: &Fixture) -> ConflictResolutionEngine {
    engine_with_type(fx, OFFLINE, Arc::new(OfflineHandler))
}

fn engine_with_type(fx: &Fixture, id: ConflictTypeId, handler: Arc<dyn ConflictHandler>) -> ConflictResolutionEngine {
    let mut registry = ConflictRegistry::with_defaults();
    registry
        .register_type(
            ConflictType::new(id, "Custom", ScopeInterpreter::String)
                .with_action(builtin::retry())
                .with_handler(handler),
            RegistryScope::Global,
        )
        .unwrap();
    ConflictResolutionEngine::new(fx.store.clone(), fx.session, Arc::new(registry))
}

#[test]
fn test_handler_failure_leaves_conflict_unresolved() {
    let fx = Fixture::new();
    let engine = engine_with_offline_type(&fx);
    let batch = fx.in_progress_batch(vec![edit("$/proj/a.txt", "1")]);
    let raised = engine
        .raise_conflict(fx.source, OFFLINE, "{}", "server-1", on_action(batch, 0))
        .unwrap();

    let err = engine
        .resolve_with_new_rule(raised.conflict_id, rule(builtin::retry(), "*"))
        .unwrap_err();

    assert!(matches!(err, ConflictError::Handler { conflict, .. } if conflict == raised.conflict_id));
    assert!(err.is_retryable());
    assert_eq!(fx.conflict(raised.conflict_id).status, ConflictStatus::Unresolved);
    assert_eq!(fx.batch_status(batch), BatchStatus::Conflicted);
    assert!(fx.store.rules_for(fx.session, OFFLINE).unwrap().is_empty());
}

#[test]
fn test_backfill_reports_handler_failure_and_continues() {
    let fx = Fixture::new();
    let engine = engine_with_offline_type(&fx);
    let first = engine
        .raise_conflict(fx.source, OFFLINE, "{}", "server-1", ConflictOrigin::Detached)
        .unwrap();
    let second = engine
        .raise_conflict(fx.source, OFFLINE, "{}", "server-2", ConflictOrigin::Detached)
        .unwrap();

    let results = engine
        .save_rule(fx.source, OFFLINE, rule(builtin::retry(), ""))
        .unwrap();

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.kind == ResolutionKind::Other && !r.resolved));
    assert!(results[0].comment.as_deref().unwrap_or_default().contains("target offline"));
    assert_eq!(fx.conflict(first.conflict_id).status, ConflictStatus::Unresolved);
    assert_eq!(fx.conflict(second.conflict_id).status, ConflictStatus::Unresolved);
}

/// Reports failure on its first call, then behaves like the standard handler
#[derive(Debug, Default)]
struct RejectOnceHandler {
    rejected: Mutex<bool>,
}

impl ConflictHandler for RejectOnceHandler {
    fn resolve(
        &self,
        context: &ResolutionContext<'_>,
        conflict: &Conflict,
        rule: &ResolutionRule,
        action: &ResolutionAction,
    ) -> anyhow::Result<HandlerOutcome> {
        let mut rejected = self.rejected.lock();
        if !*rejected {
            *rejected = true;
            return Ok(HandlerOutcome::failed("target rejected the change"));
        }
        StandardHandler.resolve(context, conflict, rule, action)
    }
}

const REJECT_ONCE: ConflictTypeId = ConflictTypeId::from_u128(0x0de1_1ed);

#[test]
fn test_failed_conflict_stays_listed_until_a_later_rule_resolves_it() {
    let fx = Fixture::new();
    let engine = engine_with_type(&fx, REJECT_ONCE, Arc::new(RejectOnceHandler::default()));
    let batch = fx.in_progress_batch(vec![edit("$/proj/a.txt", "1")]);
    let raised = engine
        .raise_conflict(fx.source, REJECT_ONCE, "{}", "server-1", on_action(batch, 0))
        .unwrap();

    let first = engine
        .resolve_with_new_rule(raised.conflict_id, rule(builtin::retry(), "server-1"))
        .unwrap();
    assert!(!first.primary.resolved);
    assert_eq!(first.primary.comment.as_deref(), Some("target rejected the change"));
    assert_eq!(fx.conflict(raised.conflict_id).status, ConflictStatus::Failed);
    assert_eq!(fx.batch_status(batch), BatchStatus::Conflicted);
    assert!(fx.batches().is_stream_blocked(fx.source).unwrap());

    let views = engine.unresolved(None).unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].id, raised.conflict_id);
    assert_eq!(views[0].status, ConflictStatus::Failed);

    let second = engine
        .resolve_with_new_rule(raised.conflict_id, rule(builtin::retry(), "*"))
        .unwrap();
    assert!(second.primary.resolved);
    assert_eq!(second.primary.kind, ResolutionKind::Retry);
    assert_eq!(fx.conflict(raised.conflict_id).status, ConflictStatus::Resolved);
    assert_eq!(fx.batch_status(batch), BatchStatus::Pending);
    assert!(!fx.batches().is_stream_blocked(fx.source).unwrap());
    assert!(engine.unresolved(None).unwrap().is_empty());
}

/// Records a new conflict of the same type while handling `trigger`
#[derive(Debug)]
struct LateArrivalHandler {
    store: Arc<dyn SyncStore>,
    trigger: &'static str,
    late: Mutex<Option<Conflict>>,
    late_id: Mutex<Option<ConflictId>>,
}

impl ConflictHandler for LateArrivalHandler {
    fn resolve(
        &self,
        context: &ResolutionContext<'_>,
        conflict: &Conflict,
        rule: &ResolutionRule,
        action: &ResolutionAction,
    ) -> anyhow::Result<HandlerOutcome> {
        if conflict.scope_hint == self.trigger {
            if let Some(late) = self.late.lock().take() {
                let recorded = self.store.record_conflict(&late, Dedup::Insert)?;
                *self.late_id.lock() = Some(recorded.id);
            }
        }
        StandardHandler.resolve(context, conflict, rule, action)
    }
}

const LATE_ARRIVAL: ConflictTypeId = ConflictTypeId::from_u128(0x1a7e);

#[test]
fn test_backfill_leaves_conflicts_raised_while_it_runs() {
    let fx = Fixture::new();
    let handler = Arc::new(LateArrivalHandler {
        store: fx.store.clone(),
        trigger: "server-2",
        late: Mutex::new(Some(Conflict::new(fx.session, fx.source, LATE_ARRIVAL, "{}", "server-3"))),
        late_id: Mutex::new(None),
    });
    let engine = engine_with_type(&fx, LATE_ARRIVAL, handler.clone());
    let first = engine
        .raise_conflict(fx.source, LATE_ARRIVAL, "{}", "server-1", ConflictOrigin::Detached)
        .unwrap();
    let second = engine
        .raise_conflict(fx.source, LATE_ARRIVAL, "{}", "server-2", ConflictOrigin::Detached)
        .unwrap();

    let report = engine
        .resolve_with_new_rule(first.conflict_id, rule(builtin::retry(), "*"))
        .unwrap();

    let late_id = handler.late_id.lock().take().expect("late conflict recorded during back-fill");
    let backfilled: Vec<ConflictId> = report.backfilled.iter().map(|r| r.conflict_id).collect();
    assert_eq!(backfilled, vec![second.conflict_id]);
    assert_eq!(report.resolved_count(), 2);
    assert_eq!(fx.conflict(late_id).status, ConflictStatus::Unresolved);
    assert_eq!(fx.conflict(late_id).resolved_by, None);

    let views = engine.unresolved(Some(fx.source)).unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].id, late_id);
}

#[test]
fn test_save_rule_rejects_unsupported_action() {
    let fx = Fixture::new();
    let engine = engine(&fx);
    let err = engine
        .save_rule(fx.source, builtin::ITEM_NOT_FOUND, rule(builtin::suppress(), ""))
        .unwrap_err();
    assert!(matches!(err, ConflictError::UnsupportedAction { .. }));
}

#[test]
fn test_persisted_rule_resolves_new_conflict_on_raise() {
    let fx = Fixture::new();
    let engine = engine(&fx);
    let backfilled = engine
        .save_rule(fx.source, builtin::ITEM_NOT_FOUND, rule(builtin::skip(), "$/proj"))
        .unwrap();
    assert!(backfilled.is_empty());

    let batch = fx.in_progress_batch(vec![edit("$/proj/a.txt", "1")]);
    let raised = engine
        .raise_conflict(fx.source, builtin::ITEM_NOT_FOUND, "{}", "$/proj/a.txt", on_action(batch, 0))
        .unwrap();

    assert_eq!(raised.status, ConflictStatus::Resolved);
    let auto = raised.auto_resolution.unwrap();
    assert_eq!(auto.kind, ResolutionKind::SkippedConflictedAction);
    assert_eq!(fx.batch_status(batch), BatchStatus::Pending);
    assert_eq!(fx.batch(batch).actions[0].state, ActionState::Skipped);
}

#[test]
fn test_most_specific_persisted_rule_wins() {
    let fx = Fixture::new();
    let engine = engine(&fx);
    engine
        .save_rule(fx.source, builtin::ITEM_NOT_FOUND, rule(builtin::retry(), "$/proj"))
        .unwrap();
    engine
        .save_rule(fx.source, builtin::ITEM_NOT_FOUND, rule(builtin::skip(), "$/proj/deep"))
        .unwrap();

    let raised = engine
        .raise_conflict(fx.source, builtin::ITEM_NOT_FOUND, "{}", "$/proj/deep/x.txt", ConflictOrigin::Detached)
        .unwrap();

    assert_eq!(
        raised.auto_resolution.map(|r| r.kind),
        Some(ResolutionKind::SkippedConflictedAction)
    );
}

#[test]
fn test_checkin_failure_halts_session() {
    let fx = Fixture::new();
    let engine = engine(&fx);
    let batch = fx.in_progress_batch(vec![edit("$/proj/a.txt", "1")]);

    let raised = engine
        .raise_conflict(fx.source, builtin::CHECKIN_FAILURE, "{}", "42", on_action(batch, 0))
        .unwrap();

    assert!(raised.halt);
}

#[test]
fn test_schedule_retry_keeps_batch_blocked() {
    let fx = Fixture::new();
    let engine = engine(&fx);
    let batch = fx.in_progress_batch(vec![edit("$/proj/a.txt", "1")]);
    let raised = engine
        .raise_conflict(fx.source, builtin::CHECKIN_FAILURE, "{}", "42", on_action(batch, 0))
        .unwrap();

    let report = engine
        .resolve_with_new_rule(raised.conflict_id, rule(builtin::schedule_retry(), "42"))
        .unwrap();

    assert_eq!(report.primary.kind, ResolutionKind::ScheduledForRetry);
    assert!(!report.primary.resolved);
    assert!(report.backfilled.is_empty());

    let conflict = fx.conflict(raised.conflict_id);
    assert_eq!(conflict.status, ConflictStatus::ScheduledForRetry);
    assert_eq!(conflict.retry_count, 1);
    assert_eq!(fx.batch_status(batch), BatchStatus::Conflicted);
    assert!(fx.batches().is_stream_blocked(fx.source).unwrap());
    assert_eq!(engine.unresolved(None).unwrap().len(), 1);
}

#[test]
fn test_suppress_skips_whole_batch() {
    let fx = Fixture::new();
    let engine = engine(&fx);
    let batch = fx.in_progress_batch(vec![edit("$/proj/a.txt", "1"), edit("$/proj/b.txt", "1")]);
    let later = fx.pending_batch(vec![edit("$/proj/c.txt", "2")]);
    let raised = engine
        .raise_conflict(fx.source, builtin::CHECKIN_FAILURE, "{}", "42", on_action(batch, 0))
        .unwrap();

    let report = engine
        .resolve_with_new_rule(raised.conflict_id, rule(builtin::suppress(), ""))
        .unwrap();

    assert_eq!(report.primary.kind, ResolutionKind::SuppressedConflictedBatch);
    let row = fx.batch(batch);
    assert_eq!(row.status, BatchStatus::Skipped);
    assert!(row.actions.iter().all(|a| a.state == ActionState::Skipped));
    assert_eq!(fx.batches().next_pending(fx.source).unwrap().and_then(|b| b.id), Some(later));
}

#[test]
fn test_link_group_conflict_round_trip() {
    let fx = Fixture::new();
    let engine = engine(&fx);
    let group = fx.link_group("wi-1", &[("wi-1", "wi-2")]);

    let raised = engine
        .raise_conflict(fx.source, builtin::GENERIC, "{}", "", ConflictOrigin::LinkGroup { group })
        .unwrap();
    assert_eq!(fx.store.link_group(group).unwrap().status, LinkGroupStatus::Conflicted);

    engine
        .resolve_with_new_rule(raised.conflict_id, rule(builtin::retry(), ""))
        .unwrap();
    assert_eq!(fx.store.link_group(group).unwrap().status, LinkGroupStatus::ReadyForMigration);
}

#[test]
fn test_guard_turns_errors_into_generic_conflicts() {
    let fx = Fixture::new();
    let engine = engine(&fx);

    let ok = engine.guard(fx.source, ConflictOrigin::Detached, || Ok(5)).unwrap();
    assert!(matches!(ok, Guarded::Completed(5)));

    let failed = engine
        .guard(fx.source, ConflictOrigin::Detached, || -> anyhow::Result<()> {
            Err(anyhow::anyhow!("disk full").context("write failed"))
        })
        .unwrap();
    let Guarded::Conflicted(raised) = failed else {
        panic!("expected a conflict");
    };

    let conflict = fx.conflict(raised.conflict_id);
    assert_eq!(conflict.type_id, builtin::GENERIC);
    let details: serde_json::Value = serde_json::from_str(&conflict.details).unwrap();
    assert_eq!(details["message"], "write failed");
    assert_eq!(details["chain"][0], "disk full");
}

#[test]
fn test_unresolved_view_lists_open_conflicts() {
    let fx = Fixture::new();
    let engine = engine(&fx);
    let open = engine
        .raise_conflict(fx.source, builtin::ITEM_NOT_FOUND, "{}", "$/a", ConflictOrigin::Detached)
        .unwrap();
    let closed = engine
        .raise_conflict(fx.source, builtin::GENERIC, "{}", "", ConflictOrigin::Detached)
        .unwrap();
    engine
        .resolve_with_new_rule(closed.conflict_id, rule(builtin::manual_resolved(), ""))
        .unwrap();

    let views = engine.unresolved(Some(fx.source)).unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].id, open.conflict_id);
    assert_eq!(views[0].type_name, "Item not found");
    let names: Vec<&str> = views[0].actions.iter().map(|a| a.friendly_name.as_str()).collect();
    assert_eq!(names, vec!["Retry", "Skip change", "Resolved manually"]);

    assert!(engine.unresolved(Some(bisync_model::SourceId::new())).unwrap().is_empty());
}

#[test]
fn test_store_failure_surfaces_as_retryable() {
    let store = Arc::new(FaultyStore::new());
    let session = bisync_model::SessionId::new();
    let engine = ConflictResolutionEngine::new(store.clone(), session, Arc::new(ConflictRegistry::with_defaults()));

    store.arm("connection reset");
    let err = engine
        .raise_conflict(bisync_model::SourceId::new(), builtin::GENERIC, "{}", "", ConflictOrigin::Detached)
        .unwrap_err();
    assert!(matches!(err, ConflictError::Store(_)));
    assert!(err.is_retryable());

    store.disarm();
    assert!(engine
        .raise_conflict(bisync_model::SourceId::new(), builtin::GENERIC, "{}", "", ConflictOrigin::Detached)
        .is_ok());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_out_of_scope_rule_never_changes_status(
        segment in "[a-z]{1,8}".prop_filter("must differ from the hint root", |s| s != "proj"),
        action in prop_oneof![
            Just(builtin::retry()),
            Just(builtin::skip()),
            Just(builtin::manual_resolved()),
        ],
    ) {
        let fx = Fixture::new();
        let engine = engine(&fx);
        let batch = fx.in_progress_batch(vec![edit("$/proj/a.txt", "1")]);
        let raised = engine
            .raise_conflict(fx.source, builtin::ITEM_NOT_FOUND, "{}", "$/proj/a.txt", on_action(batch, 0))
            .unwrap();

        let report = engine
            .resolve_with_new_rule(raised.conflict_id, rule(action, &format!("$/{segment}")))
            .unwrap();

        prop_assert_eq!(report.primary.kind, ResolutionKind::NotApplicable);
        prop_assert_eq!(fx.conflict(raised.conflict_id).status, ConflictStatus::Unresolved);
        prop_assert_eq!(fx.batch_status(batch), BatchStatus::Conflicted);
    }
}
