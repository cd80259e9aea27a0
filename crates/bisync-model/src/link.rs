//! Link change groups

use crate::batch::ActionState;
use crate::ids::{LinkGroupId, SessionId, SourceId};
use crate::kinds::ActionKind;
use crate::lifecycle::LinkGroupStatus;
use serde::{Deserialize, Serialize};

/// Directed, typed link between two artifacts
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactLink {
    /// Artifact the link starts from
    pub source_artifact: String,
    /// Artifact the link points to
    pub target_artifact: String,
    /// Link type reference name
    pub link_type: String,
}

impl ArtifactLink {
    /// Create new link
    #[inline]
    #[must_use]
    pub fn new(
        source_artifact: impl Into<String>,
        target_artifact: impl Into<String>,
        link_type: impl Into<String>,
    ) -> Self {
        Self {
            source_artifact: source_artifact.into(),
            target_artifact: target_artifact.into(),
            link_type: link_type.into(),
        }
    }
}

/// Whether a link appeared or disappeared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkActionKind {
    /// Link added
    Add,
    /// Link removed
    Delete,
}

impl From<LinkActionKind> for ActionKind {
    fn from(kind: LinkActionKind) -> Self {
        match kind {
            LinkActionKind::Add => ActionKind::AddLink,
            LinkActionKind::Delete => ActionKind::DeleteLink,
        }
    }
}

/// One link change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkChangeAction {
    /// Add or delete
    pub kind: LinkActionKind,
    /// The link
    pub link: ArtifactLink,
    /// Processing state
    pub state: ActionState,
}

impl LinkChangeAction {
    /// Create new ready action
    #[inline]
    #[must_use]
    pub fn new(kind: LinkActionKind, link: ArtifactLink) -> Self {
        Self {
            kind,
            link,
            state: ActionState::Ready,
        }
    }
}

/// Consolidated link changes for one source artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkChangeGroup {
    /// Row id, assigned on save
    pub id: Option<LinkGroupId>,
    /// Owning session
    pub session: SessionId,
    /// Source the links were read from
    pub source: SourceId,
    /// Artifact every action in this group starts from
    pub group_name: String,
    /// Lifecycle status
    pub status: LinkGroupStatus,
    /// Actions in apply order
    pub actions: Vec<LinkChangeAction>,
}

impl LinkChangeGroup {
    /// Create new empty group
    #[must_use]
    pub fn new(session: SessionId, source: SourceId, group_name: impl Into<String>) -> Self {
        Self {
            id: None,
            session,
            source,
            group_name: group_name.into(),
            status: LinkGroupStatus::Created,
            actions: Vec::new(),
        }
    }

    /// Number of actions
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether the group has no actions
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}
