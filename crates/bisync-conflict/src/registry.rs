//! Conflict registry
//!
//! Flat table from (scope, conflict type id) to a [`Registration`]. Types are
//! registered at session start and never change afterwards; the engine
//! holds the registry behind an `Arc`.

use crate::builtin;
use crate::conflict_type::{ConflictPolicy, ConflictType};
use crate::error::ConflictError;
use bisync_model::{Conflict, ConflictOrigin, ConflictTypeId, SessionId, SourceId};
use std::collections::HashMap;
use std::sync::Arc;

/// Where a registration applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistryScope {
    /// Every source of the session
    Global,
    /// One source only; shadows a global registration
    Source(SourceId),
}

/// A conflict type bound to a scope and policy
#[derive(Debug, Clone)]
pub struct Registration {
    /// Behaviour record
    pub conflict_type: Arc<ConflictType>,
    /// Policy for unresolved instances
    pub policy: ConflictPolicy,
}

/// Lookup table for conflict types
#[derive(Debug, Default)]
pub struct ConflictRegistry {
    entries: HashMap<(RegistryScope, ConflictTypeId), Registration>,
}

impl ConflictRegistry {
    /// Create empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create registry with the built-in taxonomy registered globally
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for conflict_type in builtin::all() {
            let policy = conflict_type.default_policy;
            registry.entries.insert(
                (RegistryScope::Global, conflict_type.id),
                Registration {
                    conflict_type: Arc::new(conflict_type),
                    policy,
                },
            );
        }
        registry
    }

    /// Bind a type to a scope with a policy
    ///
    /// # Errors
    /// [`ConflictError::DuplicateRegistration`] if the pair is taken
    pub fn register(
        &mut self,
        conflict_type: ConflictType,
        scope: RegistryScope,
        policy: ConflictPolicy,
    ) -> Result<(), ConflictError> {
        let key = (scope, conflict_type.id);
        if self.entries.contains_key(&key) {
            return Err(ConflictError::DuplicateRegistration(conflict_type.id));
        }
        tracing::debug!(type_id = %conflict_type.id, name = %conflict_type.friendly_name, ?scope, ?policy, "conflict type registered");
        self.entries.insert(
            key,
            Registration {
                conflict_type: Arc::new(conflict_type),
                policy,
            },
        );
        Ok(())
    }

    /// Bind a type to a scope with its default policy
    ///
    /// # Errors
    /// [`ConflictError::DuplicateRegistration`] if the pair is taken
    pub fn register_type(&mut self, conflict_type: ConflictType, scope: RegistryScope) -> Result<(), ConflictError> {
        let policy = conflict_type.default_policy;
        self.register(conflict_type, scope, policy)
    }

    /// Registration for a type as seen from `source`
    ///
    /// # Errors
    /// [`ConflictError::UnknownConflictType`] if neither scope has it
    pub fn lookup(&self, type_id: ConflictTypeId, source: SourceId) -> Result<&Registration, ConflictError> {
        self.entries
            .get(&(RegistryScope::Source(source), type_id))
            .or_else(|| self.entries.get(&(RegistryScope::Global, type_id)))
            .ok_or(ConflictError::UnknownConflictType(type_id))
    }

    /// Whether a type is visible from `source`
    #[inline]
    #[must_use]
    pub fn contains(&self, type_id: ConflictTypeId, source: SourceId) -> bool {
        self.lookup(type_id, source).is_ok()
    }

    /// Build an unsaved conflict of a registered type
    ///
    /// # Errors
    /// [`ConflictError::UnknownConflictType`] if the type is not registered
    pub fn create_conflict(
        &self,
        session: SessionId,
        source: SourceId,
        type_id: ConflictTypeId,
        details: impl Into<String>,
        scope_hint: impl Into<String>,
        origin: ConflictOrigin,
    ) -> Result<Conflict, ConflictError> {
        self.lookup(type_id, source)?;
        Ok(Conflict::new(session, source, type_id, details, scope_hint).with_origin(origin))
    }

    /// Number of registrations
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
