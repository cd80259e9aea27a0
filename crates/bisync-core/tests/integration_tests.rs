use bisync_conflict::{builtin, ConflictPolicy, ResolutionAction};
use bisync_core::{
    ApplyError, ChangeApplier, ConfigError, DeltaProvider, EndpointConfig, SessionConfig,
    SyncError, SyncSession,
};
use bisync_delta::{ChangedItem, LinkChangeSource, LinkSlicerConfig, ScanPass, ScanWindow};
use bisync_mapping::{MappingConfig, TranslationDirection};
use bisync_model::{
    ActionState, ArtifactLink, BatchStatus, ChangeAction, ChangeBatch, ConflictStatus,
    ConflictTypeId, LinkActionKind, LinkChangeAction, LinkGroupStatus, ResolutionRule, SourceId,
};
use bisync_test_utils::{edit, Fixture};
use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::collections::HashMap;

/// Emits one single-edit batch per change whose point is inside the window
struct ScriptedSource {
    changes: Vec<(i64, &'static str)>,
}

impl DeltaProvider<i64> for ScriptedSource {
    fn collect(&self, pass: &mut ScanPass<'_, i64>) -> anyhow::Result<()> {
        for (at, target) in &self.changes {
            let version = at.to_string();
            if !pass.window().contains(at) || pass.is_recorded(target, &version)? {
                continue;
            }
            let mut batch = pass.new_batch().with_name(format!("C{at}"));
            batch.push_action(edit(target, &version));
            pass.record(batch)?;
        }
        Ok(())
    }
}

struct BrokenSource;

impl DeltaProvider<i64> for BrokenSource {
    fn collect(&self, _pass: &mut ScanPass<'_, i64>) -> anyhow::Result<()> {
        anyhow::bail!("connection reset")
    }
}

enum Failure {
    Conflict(ConflictTypeId, String),
    Unexpected(&'static str),
}

/// Applies everything except the targets it was told to fail
#[derive(Default)]
struct RecordingApplier {
    applied: Mutex<Vec<String>>,
    failures: Mutex<HashMap<String, Failure>>,
}

impl RecordingApplier {
    fn fail(&self, target: &str, failure: Failure) {
        self.failures.lock().insert(target.to_string(), failure);
    }

    fn heal(&self, target: &str) {
        self.failures.lock().remove(target);
    }

    fn applied(&self) -> Vec<String> {
        self.applied.lock().clone()
    }
}

impl ChangeApplier for RecordingApplier {
    fn apply(&self, batch: &ChangeBatch, _index: usize, action: &ChangeAction) -> Result<(), ApplyError> {
        match self.failures.lock().get(&action.target) {
            Some(Failure::Conflict(type_id, scope)) => {
                return Err(ApplyError::conflict(*type_id, "{}", scope.clone()));
            }
            Some(Failure::Unexpected(message)) => {
                return Err(anyhow::anyhow!(*message).context(format!("applying {}", batch.name)).into());
            }
            None => {}
        }
        self.applied.lock().push(action.target.clone());
        Ok(())
    }
}

fn config(fx: &Fixture) -> SessionConfig {
    SessionConfig::new(
        fx.session,
        EndpointConfig::new(fx.source, "tfs"),
        EndpointConfig::new(SourceId::new(), "git"),
    )
}

fn open(fx: &Fixture) -> SyncSession {
    SyncSession::new(config(fx), fx.store.clone()).unwrap()
}

fn rule(action: ResolutionAction, scope: &str) -> ResolutionRule {
    action.new_rule(scope, "operator", IndexMap::new()).unwrap()
}

fn scripted() -> ScriptedSource {
    ScriptedSource {
        changes: vec![(3, "$/proj/a.txt"), (5, "$/proj/b.txt"), (9, "$/proj/c.txt")],
    }
}

#[test]
fn test_scan_then_apply_drains_stream() {
    let fx = Fixture::new();
    let session = open(&fx);
    let applier = RecordingApplier::default();

    let summary = session.scan(fx.source, &scripted(), 6).unwrap();
    assert_eq!(summary.recorded.len(), 2);
    assert_eq!(summary.watermark, 6);

    let report = session.apply_pending(fx.source, &applier).unwrap();
    assert!(report.is_drained());
    assert_eq!(report.completed, summary.recorded);
    assert_eq!(report.actions_applied, 2);
    assert_eq!(applier.applied(), vec!["$/proj/a.txt", "$/proj/b.txt"]);

    let summary = session.scan(fx.source, &scripted(), 10).unwrap();
    assert_eq!(summary.recorded.len(), 1);
    session.apply_pending(fx.source, &applier).unwrap();
    assert_eq!(applier.applied().len(), 3);
    assert_eq!(session.prune(fx.source).unwrap(), 3);
}

#[test]
fn test_failed_scan_keeps_watermark() {
    let fx = Fixture::new();
    let session = open(&fx);

    let err = session.scan(fx.source, &BrokenSource, 6).unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(*session.watermark::<i64>(fx.source).reload().unwrap(), 0);
}

#[test]
fn test_foreign_source_is_rejected() {
    let fx = Fixture::new();
    let session = open(&fx);
    let err = session
        .apply_pending(SourceId::new(), &RecordingApplier::default())
        .unwrap_err();
    assert!(err.is_config());
}

#[test]
fn test_conflict_blocks_stream_until_resolved() {
    let fx = Fixture::new();
    let session = open(&fx);
    let applier = RecordingApplier::default();
    let summary = session.scan(fx.source, &scripted(), 10).unwrap();
    applier.fail("$/proj/b.txt", Failure::Conflict(builtin::ITEM_NOT_FOUND, "$/proj/b.txt".into()));

    let report = session.apply_pending(fx.source, &applier).unwrap();
    assert_eq!(report.completed, vec![summary.recorded[0]]);
    assert_eq!(report.conflicts.len(), 1);
    assert!(report.blocked);
    assert!(!report.halted);
    assert_eq!(fx.batch_status(summary.recorded[1]), BatchStatus::Conflicted);
    assert_eq!(fx.batch_status(summary.recorded[2]), BatchStatus::Pending);

    // Nothing moves while the conflict is open
    let again = session.apply_pending(fx.source, &applier).unwrap();
    assert!(again.completed.is_empty());
    assert!(again.blocked);

    let open = session.unresolved(Some(fx.source)).unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].type_name, "Item not found");

    applier.heal("$/proj/b.txt");
    let resolution = session
        .resolve(report.conflicts[0].conflict_id, rule(builtin::retry(), "$/proj/b.txt"))
        .unwrap();
    assert!(resolution.primary.resolved);

    let report = session.apply_pending(fx.source, &applier).unwrap();
    assert!(report.is_drained());
    assert_eq!(report.completed, summary.recorded[1..].to_vec());
    assert_eq!(applier.applied(), vec!["$/proj/a.txt", "$/proj/b.txt", "$/proj/c.txt"]);
    assert!(session.unresolved(None).unwrap().is_empty());
}

#[test]
fn test_unexpected_error_becomes_generic_conflict() {
    let fx = Fixture::new();
    let session = open(&fx);
    let applier = RecordingApplier::default();
    session.scan(fx.source, &scripted(), 4).unwrap();
    applier.fail("$/proj/a.txt", Failure::Unexpected("disk full"));

    let report = session.apply_pending(fx.source, &applier).unwrap();
    assert!(report.blocked);

    let conflict = session.conflicts().conflict(report.conflicts[0].conflict_id).unwrap();
    assert_eq!(conflict.type_id, builtin::GENERIC);
    let details: serde_json::Value = serde_json::from_str(&conflict.details).unwrap();
    assert_eq!(details["message"], "applying C3");
    assert_eq!(details["chain"][0], "disk full");
}

#[test]
fn test_checkin_failure_halts_session() {
    let fx = Fixture::new();
    let session = open(&fx);
    let applier = RecordingApplier::default();
    session.scan(fx.source, &scripted(), 10).unwrap();
    applier.fail("$/proj/a.txt", Failure::Conflict(builtin::CHECKIN_FAILURE, "C3".into()));

    let report = session.apply_pending(fx.source, &applier).unwrap();
    assert!(report.halted);
    assert!(report.blocked);
    assert_eq!(report.actions_applied, 0);
}

#[test]
fn test_policy_override_queues_checkin_failure() {
    let fx = Fixture::new();
    let config = config(&fx).with_policy(builtin::CHECKIN_FAILURE, ConflictPolicy::Queue);
    let session = SyncSession::new(config, fx.store.clone()).unwrap();
    let applier = RecordingApplier::default();
    session.scan(fx.source, &scripted(), 10).unwrap();
    applier.fail("$/proj/a.txt", Failure::Conflict(builtin::CHECKIN_FAILURE, "C3".into()));

    let report = session.apply_pending(fx.source, &applier).unwrap();
    assert!(!report.halted);
    assert!(report.blocked);
}

#[test]
fn test_policy_override_for_unknown_type_is_rejected() {
    let fx = Fixture::new();
    let config = config(&fx).with_policy(ConflictTypeId::from_u128(7), ConflictPolicy::HaltSession);
    let err = SyncSession::new(config, fx.store.clone()).unwrap_err();
    assert!(matches!(err, SyncError::Config(ConfigError::UnknownConflictType(_))));
}

#[test]
fn test_persisted_skip_rule_lets_batch_finish() {
    let fx = Fixture::new();
    let session = open(&fx);
    let applier = RecordingApplier::default();
    let missing = Failure::Conflict(builtin::ITEM_NOT_FOUND, "$/proj/gone/x.txt".into());
    applier.fail("$/proj/gone/x.txt", missing);

    let id = fx.pending_batch(vec![edit("$/proj/gone/x.txt", "1"), edit("$/proj/b.txt", "1")]);

    let first = session.apply_pending(fx.source, &applier).unwrap();
    session
        .resolve(first.conflicts[0].conflict_id, rule(builtin::skip(), "$/proj/gone"))
        .unwrap();
    let resumed = session.apply_pending(fx.source, &applier).unwrap();
    assert_eq!(resumed.completed, vec![id]);

    // A later occurrence under the same path is skipped by the saved rule
    let later = fx.pending_batch(vec![edit("$/proj/gone/x.txt", "2"), edit("$/proj/c.txt", "2")]);
    let report = session.apply_pending(fx.source, &applier).unwrap();
    assert!(report.is_drained());
    assert_eq!(report.completed, vec![later]);
    assert_eq!(report.conflicts.len(), 1);
    assert_eq!(report.conflicts[0].status, ConflictStatus::Resolved);
    assert!(report.conflicts[0].auto_resolution.is_some());

    let row = fx.batch(later);
    assert_eq!(row.actions[0].state, ActionState::Skipped);
    assert_eq!(row.actions[1].state, ActionState::Completed);
    assert_eq!(applier.applied(), vec!["$/proj/b.txt", "$/proj/c.txt"]);
}

#[test]
fn test_suppress_rule_skips_whole_batch() {
    let fx = Fixture::new();
    let session = open(&fx);
    let applier = RecordingApplier::default();
    let summary = session.scan(fx.source, &scripted(), 10).unwrap();
    applier.fail("$/proj/a.txt", Failure::Unexpected("locked"));

    let report = session.apply_pending(fx.source, &applier).unwrap();
    session
        .resolve(report.conflicts[0].conflict_id, rule(builtin::suppress(), ""))
        .unwrap();
    assert_eq!(fx.batch_status(summary.recorded[0]), BatchStatus::Skipped);

    let report = session.apply_pending(fx.source, &applier).unwrap();
    assert_eq!(report.completed, summary.recorded[1..].to_vec());
}

#[test]
fn test_retry_from_scratch_rescans_window() {
    let fx = Fixture::new();
    let session = open(&fx);
    let first = session.scan(fx.source, &scripted(), 10).unwrap();

    assert_eq!(session.retry_from_scratch(fx.source, 0_i64).unwrap(), 3);
    for id in &first.recorded {
        assert_eq!(fx.batch_status(*id), BatchStatus::Obsolete);
    }

    let second = session.scan(fx.source, &scripted(), 10).unwrap();
    assert_eq!(second.recorded.len(), 3);
}

#[test]
fn test_reload_mappings_keeps_rules_on_error() {
    let fx = Fixture::new();
    let mapping = MappingConfig::from_toml_str(
        r#"
[[aliases]]
left = "alice"
right = "asmith"
"#,
    )
    .unwrap();
    let session = SyncSession::new(config(&fx).with_mapping(mapping), fx.store.clone()).unwrap();
    let direction = session.direction_from(fx.source).unwrap();
    assert_eq!(direction, TranslationDirection::LeftToRight);

    let before = session.mappings();
    assert_eq!(before.alias.map_or_source("alice", direction), "asmith");

    let mut broken = session.config().mapping.clone();
    broken.aliases[0].left = String::new();
    assert!(session.reload_mappings(&broken).is_err());
    assert_eq!(session.mappings().alias.map_or_source("alice", direction), "asmith");

    session.reload_mappings(&MappingConfig::default()).unwrap();
    assert_eq!(session.mappings().alias.map_or_source("alice", direction), "alice");
    // Readers holding the previous set are unaffected
    assert_eq!(before.alias.map_or_source("alice", direction), "asmith");
}

struct LinkFeed {
    changed_at: DateTime<Utc>,
}

impl LinkChangeSource for LinkFeed {
    fn changed_items(&self, _window: &ScanWindow<DateTime<Utc>>) -> anyhow::Result<Vec<ChangedItem>> {
        Ok(vec![
            ChangedItem::new("wi:1", self.changed_at),
            ChangedItem::new("wi:4", self.changed_at),
        ])
    }

    fn link_changes(&self, item: &ChangedItem) -> anyhow::Result<Vec<LinkChangeAction>> {
        let targets: &[&str] = if item.artifact == "wi:1" { &["wi:2", "wi:3"] } else { &["wi:5"] };
        Ok(targets
            .iter()
            .map(|to| {
                let link = ArtifactLink::new(item.artifact.clone(), *to, "related");
                LinkChangeAction::new(LinkActionKind::Add, link)
            })
            .collect())
    }
}

#[test]
fn test_scan_links_spills_groups() {
    let fx = Fixture::new();
    let config = config(&fx).with_links(LinkSlicerConfig::new().with_max_slice_size(2));
    let session = SyncSession::new(config, fx.store.clone()).unwrap();
    let feed = LinkFeed {
        changed_at: Utc::now() - Duration::seconds(10),
    };

    let slice = session.scan_links(fx.source, &feed).unwrap();
    assert_eq!(slice.groups.len(), 2);
    assert_eq!(slice.actions, 3);

    let created = session.links().groups(fx.source, &[LinkGroupStatus::Created]).unwrap();
    assert_eq!(created.len(), 2);

    // Everything is already open; the look-back re-reads the items but adds nothing
    let again = session.scan_links(fx.source, &feed).unwrap();
    assert_eq!(again.actions, 0);
}
