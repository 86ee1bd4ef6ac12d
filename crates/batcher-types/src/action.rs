//! Index actions: a requested mutation against one document.

use serde::{Deserialize, Serialize};

/// Kind of mutation requested for a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionKind {
    /// Insert the document, replacing it if it already exists
    Upload,
    /// Update fields of an existing document
    Merge,
    /// Merge into an existing document, or upload it if absent
    MergeOrUpload,
    /// Remove the document identified by its key
    Delete,
}

impl ActionKind {
    /// Wire name of this kind as the indexing service expects it.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Upload => "upload",
            ActionKind::Merge => "merge",
            ActionKind::MergeOrUpload => "mergeOrUpload",
            ActionKind::Delete => "delete",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A requested mutation: what to do and the document to do it with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexAction<D> {
    /// The mutation to perform
    pub kind: ActionKind,

    /// Caller-owned document payload
    pub document: D,
}

impl<D> IndexAction<D> {
    /// Create an action of the given kind.
    pub fn new(kind: ActionKind, document: D) -> Self {
        Self { kind, document }
    }

    /// Create an upload action.
    pub fn upload(document: D) -> Self {
        Self::new(ActionKind::Upload, document)
    }

    /// Create a merge action.
    pub fn merge(document: D) -> Self {
        Self::new(ActionKind::Merge, document)
    }

    /// Create a merge-or-upload action.
    pub fn merge_or_upload(document: D) -> Self {
        Self::new(ActionKind::MergeOrUpload, document)
    }

    /// Create a delete action.
    pub fn delete(document: D) -> Self {
        Self::new(ActionKind::Delete, document)
    }
}
