//! Data model shared by the traversal and transfer stages

use serde::Deserialize;

use crate::core::error::Error;

/// Mime type the provider uses to mark folders
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Prefix shared by provider-native document formats
pub const NATIVE_MIME_PREFIX: &str = "application/vnd.google-apps.";

/// Whether a node is a file or a folder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Folder,
}

/// One item in the source tree
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
}

impl Node {
    pub fn new(id: impl Into<String>, name: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Build a folder node
    pub fn folder(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(id, name, FOLDER_MIME_TYPE)
    }

    pub fn kind(&self) -> NodeKind {
        if self.mime_type == FOLDER_MIME_TYPE {
            NodeKind::Folder
        } else {
            NodeKind::File
        }
    }
}

/// True for provider-native formats other than folders
pub fn is_native_mime_type(mime_type: &str) -> bool {
    mime_type.starts_with(NATIVE_MIME_PREFIX) && mime_type != FOLDER_MIME_TYPE
}

/// Folder names from the traversal root down to a node's parent
///
/// Every traversal branch owns its own `NodePath`; extending a path clones it,
/// so sibling subtrees can never observe each other's prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodePath {
    segments: Vec<String>,
}

impl NodePath {
    pub fn root() -> Self {
        Self::default()
    }

    /// A new path one level deeper
    pub fn child(&self, folder_name: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(folder_name.to_string());
        Self { segments }
    }

    /// Destination key for a file named `name` directly under this path
    pub fn key_for(&self, name: &str) -> String {
        if self.segments.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.segments.join("/"), name)
        }
    }

    /// The path itself rendered as a key prefix (used to tag folder failures)
    pub fn display_key(&self) -> String {
        self.segments.join("/")
    }
}

/// One unit of transfer work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferTask {
    pub source_id: String,
    pub destination_key: String,
    pub mime_type: String,
}

impl TransferTask {
    pub fn for_node(node: &Node, path: &NodePath) -> Self {
        Self {
            source_id: node.id.clone(),
            destination_key: path.key_for(&node.name),
            mime_type: node.mime_type.clone(),
        }
    }
}

/// Skip reason recorded for every task of a dry run
pub const DRY_RUN_REASON: &str = "dry run";

/// Outcome classification for one task
#[derive(Debug)]
pub enum TransferStatus {
    Succeeded,
    Skipped(String),
    Failed(Error),
}

/// Outcome of one TransferTask
#[derive(Debug)]
pub struct TransferResult {
    pub destination_key: String,
    pub status: TransferStatus,
    pub bytes_transferred: u64,
}

impl TransferResult {
    pub fn succeeded(key: impl Into<String>, bytes: u64) -> Self {
        Self {
            destination_key: key.into(),
            status: TransferStatus::Succeeded,
            bytes_transferred: bytes,
        }
    }

    pub fn skipped(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            destination_key: key.into(),
            status: TransferStatus::Skipped(reason.into()),
            bytes_transferred: 0,
        }
    }

    pub fn failed(key: impl Into<String>, error: Error) -> Self {
        Self {
            destination_key: key.into(),
            status: TransferStatus::Failed(error),
            bytes_transferred: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, TransferStatus::Succeeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_kind_from_mime_type() {
        assert_eq!(Node::folder("1", "R").kind(), NodeKind::Folder);
        assert_eq!(Node::new("2", "a.txt", "text/plain").kind(), NodeKind::File);
        assert_eq!(
            Node::new("3", "Doc", "application/vnd.google-apps.document").kind(),
            NodeKind::File
        );
    }

    #[test]
    fn test_native_documents() {
        assert!(is_native_mime_type("application/vnd.google-apps.spreadsheet"));
        assert!(!is_native_mime_type(FOLDER_MIME_TYPE));
        assert!(!is_native_mime_type("application/pdf"));
    }

    #[test]
    fn test_path_keys() {
        let root = NodePath::root();
        assert_eq!(root.key_for("solo.bin"), "solo.bin");

        let r = root.child("R");
        let s = r.child("S");
        assert_eq!(r.key_for("a.txt"), "R/a.txt");
        assert_eq!(s.key_for("b.txt"), "R/S/b.txt");
        assert_eq!(s.display_key(), "R/S");
        // extending a path leaves the parent untouched
        assert_eq!(r.display_key(), "R");
    }

    #[test]
    fn test_node_deserializes_drive_fields() {
        let node: Node = serde_json::from_str(
            r#"{"id":"abc","name":"report.pdf","mimeType":"application/pdf"}"#,
        )
        .unwrap();
        assert_eq!(node, Node::new("abc", "report.pdf", "application/pdf"));
    }
}
