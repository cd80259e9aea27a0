//! Well-known change action kinds and content types
//!
//! Both vocabularies are closed. Each variant has a stable reference name
//! (a UUID) so persisted rows survive renames of the Rust identifiers.

use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Kind of a change action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Item created
    Add,
    /// Item content changed
    Edit,
    /// Item removed
    Delete,
    /// Item moved or renamed
    Rename,
    /// Item branched from another item
    Branch,
    /// Changes merged into the item
    Merge,
    /// Previously deleted item restored
    Undelete,
    /// Label applied
    Label,
    /// Encoding changed
    Encoding,
    /// Attachment added to a work item
    AddAttachment,
    /// Attachment removed from a work item
    DeleteAttachment,
    /// Link between two artifacts added
    AddLink,
    /// Link between two artifacts removed
    DeleteLink,
    /// Context-only action carrying no content change
    SyncContext,
}

impl ActionKind {
    /// Every action kind in declaration order
    pub const ALL: [ActionKind; 14] = [
        Self::Add,
        Self::Edit,
        Self::Delete,
        Self::Rename,
        Self::Branch,
        Self::Merge,
        Self::Undelete,
        Self::Label,
        Self::Encoding,
        Self::AddAttachment,
        Self::DeleteAttachment,
        Self::AddLink,
        Self::DeleteLink,
        Self::SyncContext,
    ];

    /// Stable reference name
    #[must_use]
    pub const fn reference_name(self) -> Uuid {
        let value: u128 = match self {
            Self::Add => 0x6c7f_2a0b_8c4e_4b8f_9a31_0d5b_1e2f_0001,
            Self::Edit => 0x6c7f_2a0b_8c4e_4b8f_9a31_0d5b_1e2f_0002,
            Self::Delete => 0x6c7f_2a0b_8c4e_4b8f_9a31_0d5b_1e2f_0003,
            Self::Rename => 0x6c7f_2a0b_8c4e_4b8f_9a31_0d5b_1e2f_0004,
            Self::Branch => 0x6c7f_2a0b_8c4e_4b8f_9a31_0d5b_1e2f_0005,
            Self::Merge => 0x6c7f_2a0b_8c4e_4b8f_9a31_0d5b_1e2f_0006,
            Self::Undelete => 0x6c7f_2a0b_8c4e_4b8f_9a31_0d5b_1e2f_0007,
            Self::Label => 0x6c7f_2a0b_8c4e_4b8f_9a31_0d5b_1e2f_0008,
            Self::Encoding => 0x6c7f_2a0b_8c4e_4b8f_9a31_0d5b_1e2f_0009,
            Self::AddAttachment => 0x6c7f_2a0b_8c4e_4b8f_9a31_0d5b_1e2f_000a,
            Self::DeleteAttachment => 0x6c7f_2a0b_8c4e_4b8f_9a31_0d5b_1e2f_000b,
            Self::AddLink => 0x6c7f_2a0b_8c4e_4b8f_9a31_0d5b_1e2f_000c,
            Self::DeleteLink => 0x6c7f_2a0b_8c4e_4b8f_9a31_0d5b_1e2f_000d,
            Self::SyncContext => 0x6c7f_2a0b_8c4e_4b8f_9a31_0d5b_1e2f_000e,
        };
        Uuid::from_u128(value)
    }

    /// Look up a kind by its reference name
    #[must_use]
    pub fn from_reference_name(id: Uuid) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.reference_name() == id)
    }

    /// Short name used in logs and configuration
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Edit => "edit",
            Self::Delete => "delete",
            Self::Rename => "rename",
            Self::Branch => "branch",
            Self::Merge => "merge",
            Self::Undelete => "undelete",
            Self::Label => "label",
            Self::Encoding => "encoding",
            Self::AddAttachment => "add_attachment",
            Self::DeleteAttachment => "delete_attachment",
            Self::AddLink => "add_link",
            Self::DeleteLink => "delete_link",
            Self::SyncContext => "sync_context",
        }
    }

    /// Whether this kind touches a link rather than item content
    #[inline]
    #[must_use]
    pub fn is_link(self) -> bool {
        matches!(self, Self::AddLink | Self::DeleteLink)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ModelError::unknown_variant("action kind", s))
    }
}

/// Content type tag carried by a change action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    /// Version-controlled file
    #[default]
    File,
    /// Version-controlled folder
    Folder,
    /// Work item revision
    WorkItem,
    /// Work item attachment
    Attachment,
    /// Artifact link
    Link,
    /// Label
    Label,
    /// Anything not covered above
    Other,
}

impl ContentType {
    /// Every content type in declaration order
    pub const ALL: [ContentType; 7] = [
        Self::File,
        Self::Folder,
        Self::WorkItem,
        Self::Attachment,
        Self::Link,
        Self::Label,
        Self::Other,
    ];

    /// Stable reference name
    #[must_use]
    pub const fn reference_name(self) -> Uuid {
        let value: u128 = match self {
            Self::File => 0x2f41_9d3c_5e6a_4c1d_8b07_a9e4_7c3b_0001,
            Self::Folder => 0x2f41_9d3c_5e6a_4c1d_8b07_a9e4_7c3b_0002,
            Self::WorkItem => 0x2f41_9d3c_5e6a_4c1d_8b07_a9e4_7c3b_0003,
            Self::Attachment => 0x2f41_9d3c_5e6a_4c1d_8b07_a9e4_7c3b_0004,
            Self::Link => 0x2f41_9d3c_5e6a_4c1d_8b07_a9e4_7c3b_0005,
            Self::Label => 0x2f41_9d3c_5e6a_4c1d_8b07_a9e4_7c3b_0006,
            Self::Other => 0x2f41_9d3c_5e6a_4c1d_8b07_a9e4_7c3b_0007,
        };
        Uuid::from_u128(value)
    }

    /// Short name used in logs and configuration
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Folder => "folder",
            Self::WorkItem => "work_item",
            Self::Attachment => "attachment",
            Self::Link => "link",
            Self::Label => "label",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ModelError::unknown_variant("content type", s))
    }
}
