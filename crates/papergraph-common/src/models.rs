//! Data models shared by the ingestion, extraction and graph stages.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::PapergraphError;

/// Sentinel used for metadata fields the model did not fill in.
pub const NOT_SPECIFIED: &str = "Not specified";

// ── Sections ──────────────────────────────────────────────────────────────────

/// Broad academic section categories produced by the chunker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Abstract,
    Introduction,
    Methodology,
    Results,
    Discussion,
    References,
    Other,
}

impl Section {
    pub const ALL: [Section; 7] = [
        Section::Abstract,
        Section::Introduction,
        Section::Methodology,
        Section::Results,
        Section::Discussion,
        Section::References,
        Section::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Abstract     => "abstract",
            Section::Introduction => "introduction",
            Section::Methodology  => "methodology",
            Section::Results      => "results",
            Section::Discussion   => "discussion",
            Section::References   => "references",
            Section::Other        => "other",
        }
    }

    /// Title-cased name used when sections are stitched back into a prompt.
    pub fn title(&self) -> &'static str {
        match self {
            Section::Abstract     => "Abstract",
            Section::Introduction => "Introduction",
            Section::Methodology  => "Methodology",
            Section::Results      => "Results",
            Section::Discussion   => "Discussion",
            Section::References   => "References",
            Section::Other        => "Other",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed-key mapping from every [`Section`] to its accumulated text.
///
/// All seven keys are always present; empty sections hold `""`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SectionMap {
    sections: BTreeMap<Section, String>,
}

impl Default for SectionMap {
    fn default() -> Self {
        Self::new()
    }
}

impl SectionMap {
    pub fn new() -> Self {
        Self {
            sections: Section::ALL.iter().map(|s| (*s, String::new())).collect(),
        }
    }

    pub fn get(&self, section: Section) -> &str {
        self.sections.get(&section).map(String::as_str).unwrap_or("")
    }

    pub fn append(&mut self, section: Section, text: &str) {
        self.sections.entry(section).or_default().push_str(text);
    }

    pub fn iter(&self) -> impl Iterator<Item = (Section, &str)> {
        self.sections.iter().map(|(k, v)| (*k, v.as_str()))
    }

    /// Sections whose text is not just whitespace.
    pub fn non_empty(&self) -> impl Iterator<Item = (Section, &str)> {
        self.iter().filter(|(_, text)| !text.trim().is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.non_empty().next().is_none()
    }
}

// ── Extracted metadata ────────────────────────────────────────────────────────

/// Structured metadata extracted from one paper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperMetadata {
    pub methodology: String,
    pub key_result: String,
    pub core_theory: String,
}

impl Default for PaperMetadata {
    fn default() -> Self {
        Self {
            methodology: NOT_SPECIFIED.to_string(),
            key_result:  NOT_SPECIFIED.to_string(),
            core_theory: NOT_SPECIFIED.to_string(),
        }
    }
}

impl PaperMetadata {
    /// Build metadata, replacing missing or blank fields with the sentinel.
    pub fn new(
        methodology: Option<String>,
        key_result: Option<String>,
        core_theory: Option<String>,
    ) -> Self {
        fn or_sentinel(v: Option<String>) -> String {
            v.filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| NOT_SPECIFIED.to_string())
        }
        Self {
            methodology: or_sentinel(methodology),
            key_result:  or_sentinel(key_result),
            core_theory: or_sentinel(core_theory),
        }
    }
}

// ── Relationships ─────────────────────────────────────────────────────────────

/// Closed set of relationships the synthesizer may assert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationType {
    Contradicts,
    Supports,
    Extends,
}

impl RelationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::Contradicts => "Contradicts",
            RelationType::Supports    => "Supports",
            RelationType::Extends     => "Extends",
        }
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationType {
    type Err = PapergraphError;

    /// Exact match only; the tag is a closed vocabulary.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Contradicts" => Ok(RelationType::Contradicts),
            "Supports"    => Ok(RelationType::Supports),
            "Extends"     => Ok(RelationType::Extends),
            other         => Err(PapergraphError::UnknownRelation(other.to_string())),
        }
    }
}

/// Outcome of comparing paper A against paper B.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipResult {
    pub relation_type: RelationType,
    pub confidence: f64,
    pub explanation: String,
}

// ── Papers ────────────────────────────────────────────────────────────────────

/// A paper moving through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paper {
    /// Content hash of the raw PDF bytes.
    pub id: String,
    /// Original upload name shown in the graph.
    pub display_name: Option<String>,
    #[serde(default)]
    pub sections: SectionMap,
    pub metadata: Option<PaperMetadata>,
    pub file_path: Option<PathBuf>,
}

impl Paper {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            sections: SectionMap::new(),
            metadata: None,
            file_path: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_metadata(mut self, metadata: PaperMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    /// Label for graph nodes: the display name, else the id without `.pdf`.
    pub fn label(&self) -> String {
        match self.display_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name.to_string(),
            _ => self.id.trim_end_matches(".pdf").to_string(),
        }
    }
}

// ── Graph ─────────────────────────────────────────────────────────────────────

/// Relationship graph in the node/edge shape the frontend renders.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl Graph {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub data: NodeData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    pub label: String,
    pub metadata: PaperMetadata,
    pub file_path: String,
}

impl GraphNode {
    pub fn from_paper(paper: &Paper, metadata: PaperMetadata) -> Self {
        Self {
            id: paper.id.clone(),
            data: NodeData {
                label: paper.label(),
                metadata,
                file_path: paper
                    .file_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    /// `"{source}->{target}"`; unique per ordered pair.
    pub id: String,
    pub source: String,
    pub target: String,
    pub data: EdgeData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeData {
    pub relation_type: RelationType,
    pub confidence: f64,
    pub explanation: String,
}

impl GraphEdge {
    pub fn edge_id(source: &str, target: &str) -> String {
        format!("{source}->{target}")
    }

    pub fn new(source: &str, target: &str, rel: RelationshipResult) -> Self {
        Self {
            id: Self::edge_id(source, target),
            source: source.to_string(),
            target: target.to_string(),
            data: EdgeData {
                relation_type: rel.relation_type,
                confidence: rel.confidence,
                explanation: rel.explanation,
            },
        }
    }
}
