//! Built-in conflict taxonomy

use crate::action::{ResolutionAction, ResolutionEffect};
use crate::conflict_type::{ConflictPolicy, ConflictType};
use crate::scope::ScopeInterpreter;
use bisync_model::{ConflictTypeId, ResolutionActionId};

/// Catch-all for unexpected errors while applying an action
pub const GENERIC: ConflictTypeId = ConflictTypeId::from_u128(0x6a1d_0001_0000_4000_8000_0000_0000_0001);
/// Target item does not exist on the other side
pub const ITEM_NOT_FOUND: ConflictTypeId = ConflictTypeId::from_u128(0x6a1d_0001_0000_4000_8000_0000_0000_0002);
/// Target system rejected the check-in
pub const CHECKIN_FAILURE: ConflictTypeId = ConflictTypeId::from_u128(0x6a1d_0001_0000_4000_8000_0000_0000_0003);
/// Version history needed for a change is missing
pub const HISTORY_NOT_FOUND: ConflictTypeId = ConflictTypeId::from_u128(0x6a1d_0001_0000_4000_8000_0000_0000_0004);
/// Check-in produced no effective change
pub const ZERO_EFFECTIVE_CHECKIN: ConflictTypeId =
    ConflictTypeId::from_u128(0x6a1d_0001_0000_4000_8000_0000_0000_0005);

/// Run the batch again
pub const RETRY: ResolutionActionId = ResolutionActionId::from_u128(0x6a1d_0002_0000_4000_8000_0000_0000_0001);
/// Skip the conflicted batch
pub const SUPPRESS: ResolutionActionId = ResolutionActionId::from_u128(0x6a1d_0002_0000_4000_8000_0000_0000_0002);
/// Skip the conflicted action
pub const SKIP: ResolutionActionId = ResolutionActionId::from_u128(0x6a1d_0002_0000_4000_8000_0000_0000_0003);
/// Operator fixed it by hand
pub const MANUAL_RESOLVED: ResolutionActionId =
    ResolutionActionId::from_u128(0x6a1d_0002_0000_4000_8000_0000_0000_0004);
/// Try again later
pub const SCHEDULE_RETRY: ResolutionActionId =
    ResolutionActionId::from_u128(0x6a1d_0002_0000_4000_8000_0000_0000_0005);
/// Map the missing version to an existing one and run again
pub const MAP_VERSION: ResolutionActionId = ResolutionActionId::from_u128(0x6a1d_0002_0000_4000_8000_0000_0000_0006);

/// Data key of [`MAP_VERSION`] naming the version to use instead
pub const MAPPED_VERSION_KEY: &str = "mapped_version";

/// Retry action
#[must_use]
pub fn retry() -> ResolutionAction {
    ResolutionAction::new(RETRY, "Retry", ResolutionEffect::RetryBatch)
}

/// Suppress action
#[must_use]
pub fn suppress() -> ResolutionAction {
    ResolutionAction::new(SUPPRESS, "Skip change group", ResolutionEffect::SuppressBatch)
}

/// Skip action
#[must_use]
pub fn skip() -> ResolutionAction {
    ResolutionAction::new(SKIP, "Skip change", ResolutionEffect::SkipAction)
}

/// Manual resolution action
#[must_use]
pub fn manual_resolved() -> ResolutionAction {
    ResolutionAction::new(MANUAL_RESOLVED, "Resolved manually", ResolutionEffect::ManualResolved)
}

/// Scheduled retry action
#[must_use]
pub fn schedule_retry() -> ResolutionAction {
    ResolutionAction::new(SCHEDULE_RETRY, "Retry later", ResolutionEffect::ScheduleRetry)
}

/// Version mapping action
#[must_use]
pub fn map_version() -> ResolutionAction {
    ResolutionAction::new(MAP_VERSION, "Use another version", ResolutionEffect::UpdateConfiguration)
        .with_required_key(MAPPED_VERSION_KEY)
}

/// Catch-all conflict; details hold the error message and its chain
#[must_use]
pub fn generic() -> ConflictType {
    ConflictType::new(GENERIC, "Unexpected error", ScopeInterpreter::Global)
        .with_action(retry())
        .with_action(skip())
        .with_action(suppress())
        .with_action(manual_resolved())
        .with_details_keys(&["message", "chain"])
}

/// Missing target item, scoped by item path
#[must_use]
pub fn item_not_found() -> ConflictType {
    ConflictType::new(ITEM_NOT_FOUND, "Item not found", ScopeInterpreter::BasicPath)
        .with_action(retry())
        .with_action(skip())
        .with_action(manual_resolved())
        .with_details_keys(&["item", "version"])
}

/// Rejected check-in, scoped by change group
#[must_use]
pub fn checkin_failure() -> ConflictType {
    ConflictType::new(CHECKIN_FAILURE, "Check-in failure", ScopeInterpreter::ChangeGroup)
        .with_action(retry())
        .with_action(suppress())
        .with_action(schedule_retry())
        .with_details_keys(&["change_group", "message"])
        .with_policy(ConflictPolicy::HaltSession)
}

/// Missing history, scoped by version range
#[must_use]
pub fn history_not_found() -> ConflictType {
    ConflictType::new(HISTORY_NOT_FOUND, "History not found", ScopeInterpreter::IntegerRange)
        .with_action(map_version())
        .with_action(skip())
        .with_action(manual_resolved())
        .with_details_keys(&["item", "version"])
}

/// Empty check-in, scoped by change group; repeated hits are counted
#[must_use]
pub fn zero_effective_checkin() -> ConflictType {
    ConflictType::new(ZERO_EFFECTIVE_CHECKIN, "Zero effective check-in", ScopeInterpreter::ChangeGroup)
        .with_action(suppress())
        .with_action(manual_resolved())
        .with_details_keys(&["change_group"])
        .countable()
}

/// Every built-in type
#[must_use]
pub fn all() -> Vec<ConflictType> {
    vec![
        generic(),
        item_not_found(),
        checkin_failure(),
        history_not_found(),
        zero_effective_checkin(),
    ]
}
