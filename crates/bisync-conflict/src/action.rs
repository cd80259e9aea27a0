//! Resolution actions
//!
//! An action is a menu entry offered by a conflict type. It knows which data
//! keys a rule must supply and which side effect the standard handler runs.

use crate::error::ConflictError;
use bisync_model::{ResolutionActionId, ResolutionRule, RuleId};
use chrono::Utc;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// Side effect the standard handler runs for an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionEffect {
    /// Release the held action and run the batch again
    RetryBatch,
    /// Skip the whole conflicted batch
    SuppressBatch,
    /// Skip only the action that conflicted
    SkipAction,
    /// The operator fixed the target by hand; treat the action as done
    ManualResolved,
    /// Keep the batch blocked and try again later
    ScheduleRetry,
    /// Configuration was changed; run the batch again with the new settings
    UpdateConfiguration,
}

/// One resolution action offered by a conflict type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionAction {
    /// Stable identifier
    pub id: ResolutionActionId,
    /// Display name
    pub friendly_name: String,
    /// Data keys every rule for this action must supply, in display order
    pub required_keys: IndexSet<String>,
    /// What the standard handler does
    pub effect: ResolutionEffect,
}

impl ResolutionAction {
    /// Create action without required keys
    #[must_use]
    pub fn new(id: ResolutionActionId, friendly_name: impl Into<String>, effect: ResolutionEffect) -> Self {
        Self {
            id,
            friendly_name: friendly_name.into(),
            required_keys: IndexSet::new(),
            effect,
        }
    }

    /// With a required data key
    #[inline]
    #[must_use]
    pub fn with_required_key(mut self, key: impl Into<String>) -> Self {
        self.required_keys.insert(key.into());
        self
    }

    /// Check that `data` covers every required key
    ///
    /// # Errors
    /// [`ConflictError::MissingRuleData`] naming the first missing key
    pub fn validate_data(&self, data: &IndexMap<String, String>) -> Result<(), ConflictError> {
        match self.required_keys.iter().find(|key| !data.contains_key(*key)) {
            Some(key) => Err(ConflictError::MissingRuleData {
                action: self.id,
                key: key.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Build a rule for this action
    ///
    /// # Errors
    /// [`ConflictError::MissingRuleData`] if `data` lacks a required key
    pub fn new_rule(
        &self,
        scope: impl Into<String>,
        description: impl Into<String>,
        data: IndexMap<String, String>,
    ) -> Result<ResolutionRule, ConflictError> {
        self.validate_data(&data)?;
        Ok(ResolutionRule {
            id: RuleId::new(),
            scope: scope.into(),
            action: self.id,
            data,
            description: description.into(),
            created_at: Utc::now(),
        })
    }
}
