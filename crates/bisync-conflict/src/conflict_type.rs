//! Conflict types and handlers
//!
//! A [`ConflictType`] is a behaviour record: scope interpreter, offered
//! actions and a handler. New conflict kinds are added by building another
//! record, never by extending an existing one.

use crate::action::{ResolutionAction, ResolutionEffect};
use crate::scope::ScopeInterpreter;
use bisync_delta::{ChangeBatchService, LinkChangeService};
use bisync_model::{
    ActionState, BatchStatus, Conflict, ConflictOrigin, ConflictTypeId, LinkGroupStatus,
    ResolutionActionId, ResolutionRule,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// What an unresolved instance does to its session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Stop the session until the conflict is resolved
    HaltSession,
    /// Keep going; only the owning batch and stream wait
    #[default]
    Queue,
}

/// Outcome category of a resolution attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionKind {
    /// Conflict resolved; the batch continues
    Resolved,
    /// Batch released to run again
    Retry,
    /// Whole batch skipped
    SuppressedConflictedBatch,
    /// Offending action skipped
    SkippedConflictedAction,
    /// Retry deferred; batch still blocked
    ScheduledForRetry,
    /// Configuration updated; batch released to run again
    UpdatedConfiguration,
    /// Rule names an action the type does not offer
    UnknownResolutionAction,
    /// Rule scope does not cover the conflict
    NotApplicable,
    /// Conflict was resolved before this attempt
    AlreadyResolved,
    /// Handler-specific outcome
    Other,
}

/// What a handler reports back to the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerOutcome {
    /// Whether the conflict is settled (`false` marks it failed)
    pub resolved: bool,
    /// Outcome category
    pub kind: ResolutionKind,
    /// Note stored on the conflict
    pub comment: Option<String>,
}

impl HandlerOutcome {
    /// Successful outcome
    #[inline]
    #[must_use]
    pub fn resolved(kind: ResolutionKind) -> Self {
        Self {
            resolved: true,
            kind,
            comment: None,
        }
    }

    /// Handler gave up on the conflict
    #[inline]
    #[must_use]
    pub fn failed(comment: impl Into<String>) -> Self {
        Self {
            resolved: false,
            kind: ResolutionKind::Other,
            comment: Some(comment.into()),
        }
    }

    /// With comment
    #[inline]
    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// Services a handler may touch while resolving
#[derive(Debug)]
pub struct ResolutionContext<'a> {
    /// Change batch lifecycle
    pub batches: &'a ChangeBatchService,
    /// Link change group lifecycle
    pub links: &'a LinkChangeService,
}

/// Executes a resolution action's side effect
pub trait ConflictHandler: Send + Sync + fmt::Debug {
    /// Whether `rule` applies to `conflict`; defaults to the scope check
    fn can_resolve(&self, scope: ScopeInterpreter, conflict: &Conflict, rule: &ResolutionRule) -> bool {
        scope.is_in_scope(&conflict.scope_hint, &rule.scope)
    }

    /// Run the side effect
    ///
    /// # Errors
    /// Any failure; the engine leaves the conflict unresolved and surfaces it
    fn resolve(
        &self,
        context: &ResolutionContext<'_>,
        conflict: &Conflict,
        rule: &ResolutionRule,
        action: &ResolutionAction,
    ) -> anyhow::Result<HandlerOutcome>;
}

/// Runs [`ResolutionEffect`]s against the batch or link group behind a conflict
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardHandler;

impl StandardHandler {
    /// Release the held action into `state` and let the batch run again once
    /// nothing else holds it back
    fn release(context: &ResolutionContext<'_>, origin: ConflictOrigin, state: ActionState) -> anyhow::Result<()> {
        match origin {
            ConflictOrigin::Action { batch, index } => {
                let released = context.batches.release_action(batch, index, state)?;
                if released.status == BatchStatus::Conflicted && !released.has_backlogged_actions() {
                    context.batches.reactivate(batch)?;
                }
            }
            ConflictOrigin::LinkGroup { group } => {
                let to = if state == ActionState::Skipped {
                    LinkGroupStatus::Completed
                } else {
                    LinkGroupStatus::ReadyForMigration
                };
                context.links.transition(group, to)?;
            }
            ConflictOrigin::Detached => {}
        }
        Ok(())
    }

    fn suppress(context: &ResolutionContext<'_>, origin: ConflictOrigin) -> anyhow::Result<()> {
        match origin {
            ConflictOrigin::Action { batch, .. } => {
                context.batches.mark_conflicted(batch)?;
                context.batches.skip(batch)?;
            }
            ConflictOrigin::LinkGroup { group } => {
                context.links.transition(group, LinkGroupStatus::Completed)?;
            }
            ConflictOrigin::Detached => {}
        }
        Ok(())
    }
}

impl ConflictHandler for StandardHandler {
    fn resolve(
        &self,
        context: &ResolutionContext<'_>,
        conflict: &Conflict,
        _rule: &ResolutionRule,
        action: &ResolutionAction,
    ) -> anyhow::Result<HandlerOutcome> {
        let origin = conflict.origin;
        let kind = match action.effect {
            ResolutionEffect::RetryBatch => {
                Self::release(context, origin, ActionState::Ready)?;
                ResolutionKind::Retry
            }
            ResolutionEffect::SuppressBatch => {
                Self::suppress(context, origin)?;
                ResolutionKind::SuppressedConflictedBatch
            }
            ResolutionEffect::SkipAction => {
                Self::release(context, origin, ActionState::Skipped)?;
                ResolutionKind::SkippedConflictedAction
            }
            ResolutionEffect::ManualResolved => {
                Self::release(context, origin, ActionState::Completed)?;
                ResolutionKind::Resolved
            }
            ResolutionEffect::ScheduleRetry => ResolutionKind::ScheduledForRetry,
            ResolutionEffect::UpdateConfiguration => {
                Self::release(context, origin, ActionState::Ready)?;
                ResolutionKind::UpdatedConfiguration
            }
        };
        Ok(HandlerOutcome::resolved(kind).with_comment(action.friendly_name.clone()))
    }
}

/// Behaviour record for one conflict kind
#[derive(Debug, Clone)]
pub struct ConflictType {
    /// Taxonomy id
    pub id: ConflictTypeId,
    /// Display name
    pub friendly_name: String,
    /// How scope hints are matched
    pub scope: ScopeInterpreter,
    /// Offered actions, in menu order
    pub actions: Vec<ResolutionAction>,
    /// Identical open occurrences increment a counter instead of adding rows
    pub countable: bool,
    /// Documented fields of the details payload
    pub details_keys: Vec<String>,
    /// Policy used when registered without an explicit one
    pub default_policy: ConflictPolicy,
    /// Side-effect executor
    pub handler: Arc<dyn ConflictHandler>,
}

impl ConflictType {
    /// Create type with the standard handler and no actions
    #[must_use]
    pub fn new(id: ConflictTypeId, friendly_name: impl Into<String>, scope: ScopeInterpreter) -> Self {
        Self {
            id,
            friendly_name: friendly_name.into(),
            scope,
            actions: Vec::new(),
            countable: false,
            details_keys: Vec::new(),
            default_policy: ConflictPolicy::Queue,
            handler: Arc::new(StandardHandler),
        }
    }

    /// With an offered action
    #[inline]
    #[must_use]
    pub fn with_action(mut self, action: ResolutionAction) -> Self {
        self.actions.push(action);
        self
    }

    /// With counting de-duplication
    #[inline]
    #[must_use]
    pub fn countable(mut self) -> Self {
        self.countable = true;
        self
    }

    /// With documented details fields
    #[must_use]
    pub fn with_details_keys(mut self, keys: &[&str]) -> Self {
        self.details_keys = keys.iter().map(|k| (*k).to_string()).collect();
        self
    }

    /// With default policy
    #[inline]
    #[must_use]
    pub fn with_policy(mut self, policy: ConflictPolicy) -> Self {
        self.default_policy = policy;
        self
    }

    /// With custom handler
    #[inline]
    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn ConflictHandler>) -> Self {
        self.handler = handler;
        self
    }

    /// Offered action by id
    #[must_use]
    pub fn action(&self, id: ResolutionActionId) -> Option<&ResolutionAction> {
        self.actions.iter().find(|a| a.id == id)
    }

    /// Whether the type offers an action
    #[inline]
    #[must_use]
    pub fn supports(&self, id: ResolutionActionId) -> bool {
        self.action(id).is_some()
    }
}
