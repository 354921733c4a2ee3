//! Waterfall section classifier for Markdown paper text.
//!
//! Headers move the classifier into a new category only when their title
//! carries a keyword for it. Generic subsection headers ("A. Compression
//! Flow") stay in whatever category is active, so a paper never falls back
//! to `other` once a category is locked in.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use papergraph_common::{Section, SectionMap};
use regex::Regex;
use tracing::{debug, info};

/// Preamble text at or below this many characters is treated as noise.
const MIN_PREAMBLE_CHARS: usize = 50;

/// Keyword groups in match priority order. Results is checked before
/// methodology so "Experimental Setup" and "Evaluation" land in results.
static KEYWORDS: [(Section, &[&str]); 6] = [
    (Section::References, &["reference", "bibliography", "works cited"]),
    (
        Section::Discussion,
        &["discussion", "conclusion", "future work", "concluding", "limitation", "threat"],
    ),
    (
        Section::Results,
        &[
            "result", "evaluation", "experiment", "performance", "analysis", "ablation",
            "numerical", "comparison", "benchmark", "testing", "validation results", "empirical",
        ],
    ),
    (Section::Abstract, &["abstract", "summary"]),
    (
        Section::Introduction,
        &[
            "introduction", "motivation", "background", "related work", "problem statement",
            "overview",
        ],
    ),
    (
        Section::Methodology,
        &[
            "methodology", "method", "approach", "system", "architecture", "design", "proposed",
            "implementation", "model", "framework", "setup", "algorithm", "technique", "pipeline",
        ],
    ),
];

fn header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n(#{1,6})\s+(.*?)\n").expect("header pattern is valid"))
}

/// Category a header title explicitly names, if any.
fn match_header(title: &str) -> Option<Section> {
    let lower = title.to_lowercase();
    KEYWORDS
        .iter()
        .find(|(_, words)| words.iter().any(|w| lower.contains(w)))
        .map(|(section, _)| *section)
}

fn names_abstract(title: &str) -> bool {
    let lower = title.to_lowercase();
    KEYWORDS
        .iter()
        .filter(|(s, _)| *s == Section::Abstract)
        .any(|(_, words)| words.iter().any(|w| lower.contains(w)))
}

/// Classifier state: the category new header blocks are appended to.
struct Waterfall {
    current: Section,
    sections: SectionMap,
}

impl Waterfall {
    fn new() -> Self {
        Self { current: Section::Introduction, sections: SectionMap::new() }
    }

    fn preamble(&mut self, text: &str) {
        let trimmed = text.trim();
        let chars = trimmed.chars().count();
        if chars > MIN_PREAMBLE_CHARS {
            debug!(chars, "Captured preamble as abstract");
            self.sections.append(Section::Abstract, trimmed);
        }
    }

    fn header_block(&mut self, hashes: &str, title: &str, content: &str) {
        if let Some(next) = match_header(title) {
            if next != self.current {
                debug!(from = %self.current, to = %next, header = title, "Section transition");
                self.current = next;
            }
        }
        if self.current == Section::Abstract && !names_abstract(title) {
            self.current = Section::Introduction;
        }
        self.sections.append(self.current, &format!("\n{hashes} {title}\n{content}"));
    }
}

/// Partition Markdown text into semantic sections.
///
/// A header is a `#`..`######` line preceded by a newline, so the very first
/// line of the document always counts as preamble.
pub fn classify(text: &str) -> SectionMap {
    let mut fsm = Waterfall::new();
    let mut cursor = 0;
    let mut pending: Option<(&str, &str)> = None;

    for caps in header_re().captures_iter(text) {
        let (Some(whole), Some(hashes), Some(title)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let body = &text[cursor..whole.start()];
        match pending.take() {
            None => fsm.preamble(body),
            Some((h, t)) => fsm.header_block(h, t, body),
        }
        pending = Some((hashes.as_str(), title.as_str()));
        cursor = whole.end();
    }

    let tail = &text[cursor..];
    match pending {
        None => fsm.preamble(tail),
        Some((h, t)) => fsm.header_block(h, t, tail),
    }

    let sizes: BTreeMap<Section, usize> = fsm
        .sections
        .non_empty()
        .map(|(s, body)| (s, body.chars().count()))
        .collect();
    info!(sections = ?sizes, "Chunking complete");
    fsm.sections
}

/// Character count per section, every key included.
pub fn section_summary(sections: &SectionMap) -> BTreeMap<Section, usize> {
    sections.iter().map(|(s, body)| (s, body.chars().count())).collect()
}
