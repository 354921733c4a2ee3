//! Record types held by a content store.

use papergraph_common::{Mode, PaperMetadata};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Collection name isolating papers extracted in one mode.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Namespace(String);

impl Namespace {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<Mode> for Namespace {
    fn from(mode: Mode) -> Self {
        Self(mode.namespace())
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Metadata persisted next to the text: the extracted fields plus the
/// name the file was uploaded under.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    #[serde(flatten)]
    pub paper: PaperMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_filename: Option<String>,
}

impl RecordMetadata {
    pub fn new(paper: PaperMetadata, original_filename: Option<String>) -> Self {
        Self { paper, original_filename }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperRecord {
    pub id: String,
    /// Prepared paper text the record was indexed from.
    pub document: String,
    pub metadata: RecordMetadata,
}

/// A similarity hit. `distance` is `1 - cosine`; lower is closer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarPaper {
    pub id: String,
    pub document: String,
    pub metadata: RecordMetadata,
    pub distance: f32,
}
