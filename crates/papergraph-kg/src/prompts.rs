//! Prompt bundles, one per audience mode.
//!
//! Templates use `{name}` placeholders filled by plain substitution, so JSON
//! examples inside them need no escaping.

use std::sync::OnceLock;

use papergraph_common::Mode;
use regex::{Captures, Regex};

/// Appended to every prompt sent to the model.
pub const JSON_ONLY_SUFFIX: &str = "Return ONLY the JSON object, no other text.";

/// Placeholder for the paper text in extraction templates.
pub const PAPER_TEXT_PLACEHOLDER: &str = "{paper_text}";

#[derive(Debug, Clone, Copy)]
pub struct PromptBundle {
    pub system: &'static str,
    pub extraction: &'static str,
    pub synthesis: &'static str,
}

impl PromptBundle {
    pub fn for_mode(mode: Mode) -> &'static PromptBundle {
        match mode {
            Mode::Student    => &STUDENT,
            Mode::Researcher => &RESEARCHER,
        }
    }

    /// Extraction prompt for `paper_text`.
    ///
    /// Templates without a `{paper_text}` slot get the text appended in a
    /// quoted block instead.
    pub fn render_extraction(&self, paper_text: &str) -> String {
        render_extraction(self.extraction, paper_text)
    }

    /// System prompt, blank line, filled synthesis template.
    ///
    /// Slots are filled in one pass, so field text that looks like a slot is
    /// kept verbatim.
    pub fn render_synthesis(&self, a: &MetadataFields<'_>, b: &MetadataFields<'_>) -> String {
        let body = synthesis_slot_re().replace_all(self.synthesis, |caps: &Captures<'_>| {
            let fields = if &caps[2] == "a" { a } else { b };
            match &caps[1] {
                "methodology" => fields.methodology,
                "key_result"  => fields.key_result,
                _             => fields.core_theory,
            }
            .to_string()
        });
        format!("{}\n\n{}\n\n{}", self.system, body, JSON_ONLY_SUFFIX)
    }
}

fn synthesis_slot_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{(methodology|key_result|core_theory)_(a|b)\}").expect("synthesis slot pattern is valid")
    })
}

/// Borrowed view of the three metadata fields a synthesis prompt needs.
#[derive(Debug, Clone, Copy)]
pub struct MetadataFields<'a> {
    pub methodology: &'a str,
    pub key_result: &'a str,
    pub core_theory: &'a str,
}

impl<'a> From<&'a papergraph_common::PaperMetadata> for MetadataFields<'a> {
    fn from(m: &'a papergraph_common::PaperMetadata) -> Self {
        Self {
            methodology: &m.methodology,
            key_result: &m.key_result,
            core_theory: &m.core_theory,
        }
    }
}

pub fn render_extraction(template: &str, paper_text: &str) -> String {
    if template.contains(PAPER_TEXT_PLACEHOLDER) {
        format!(
            "{}\n\n{}",
            template.replace(PAPER_TEXT_PLACEHOLDER, paper_text),
            JSON_ONLY_SUFFIX
        )
    } else {
        format!(
            "{template}\n\nPaper text:\n\"\"\"{paper_text}\n\"\"\"\n\n{JSON_ONLY_SUFFIX}"
        )
    }
}

// ── Student ───────────────────────────────────────────────────────────────────

static STUDENT: PromptBundle = PromptBundle {
    system: r#"You are an expert Academic Tutor. Your goal is to explain research clearly to students.
Focus on defining core concepts, providing real-world examples, and identifying prerequisite knowledge.
Avoid jargon. Your output must ALWAYS be valid, flat JSON matching the requested schema."#,

    extraction: r#"Analyze the paper text below.
Extract the educational value into the following strictly named JSON fields (do not create new keys):

Input Text:
{paper_text}

Instructions for mapping Student content to required keys:
- In "methodology": Describe the **Real-World Examples** or practical applications discussed.
- In "key_result": Write a **Plain English Summary** of what the paper achieves.
- In "core_theory": List the **Core Concepts Defined** and any prerequisites.

Return ONLY valid JSON:
{
    "methodology": "Real-world examples...",
    "key_result": "Simple summary...",
    "core_theory": "Key concepts definitions..."
}"#,

    synthesis: r#"Compare the educational content of these two papers to build a 'Knowledge Tree' for a student.

Paper A:
- Practical Examples (Methodology): {methodology_a}
- Summary (Key Result): {key_result_a}
- Concepts (Core Theory): {core_theory_a}

Paper B:
- Practical Examples (Methodology): {methodology_b}
- Summary (Key Result): {key_result_b}
- Concepts (Core Theory): {core_theory_b}

Determine the relationship using these student-focused rules:
- "Supports": If Paper B defines a concept used in A, or is a simpler introduction to the same topic.
- "Extends": If Paper B provides a concrete real-world example of the theory in A.
- "Contradicts": Only if Paper B explicitly corrects a simple misconception in A (rare).

Return ONLY valid JSON:
{
    "relation_type": "Contradicts" | "Supports" | "Extends",
    "confidence": 0.0 to 1.0,
    "explanation": "Explain the pedagogical link (e.g., 'Paper B defines the concept X used in Paper A')"
}"#,
};

// ── Researcher ────────────────────────────────────────────────────────────────

static RESEARCHER: PromptBundle = PromptBundle {
    system: r#"You are a Principal Investigator and Senior Technical Reviewer for a top-tier scientific journal (Nature/Science/NeurIPS).
Your mandate is to identify specific *mechanistic* relationships between research papers.

You do NOT write "Paper A talks about X."
You DO write "Paper A establishes a lower bound for X which Paper B violates using method Y."

Your goal is rigor. You must identify:
1. Methodological forks (where B diverges from A).
2. Quantitative falsification (where B proves A's numbers wrong).
3. Theoretical subsumption (where B proves A is a special case of a general law).

Output must be strictly valid, flat JSON. No markdown formatting."#,

    extraction: r#"Analyze the paper text below with extreme scrutiny.
Extract the critical technical metadata into the following strictly named JSON fields.

Input Text:
{paper_text}

Instructions for High-Precision Mapping:
- In "methodology": Identify the **Exact Architecture/Protocol** (e.g., not "Deep Learning", but "ResNet-50 with CutMix regularization"). Explicitly state any *negative* constraints or limitations mentioned.
- In "key_result": Extract the **Maximum Performance Metric** compared to SOTA (e.g., "Achieves 94% F1, surpassing BERT-base by 2.3%"). Include p-values or confidence intervals if available.
- In "core_theory": Define the **Governing Mathematical/Theoretical Framework** (e.g., "Nash Equilibrium in non-cooperative games" or "Attention Mechanism").

Return ONLY valid JSON:
{
    "methodology": "Strict technical protocol and distinct limitations...",
    "key_result": "Exact quantitative metrics vs baselines...",
    "core_theory": "Specific theoretical framework..."
}"#,

    synthesis: r#"You are adjudicating the relationship between two technical documents.
Generate a high-density causal explanation of their connection.

Paper A Data:
- Protocol: {methodology_a}
- Evidence: {key_result_a}
- Theory: {core_theory_a}

Paper B Data:
- Protocol: {methodology_b}
- Evidence: {key_result_b}
- Theory: {core_theory_b}

Determine the relationship using these strict definitions:
- "Contradicts": Paper B *empirically falsifies* A's claim, or achieves better results using a method A claimed was inferior.
- "Supports": Paper B *replicates* A's experiment with consistent results, or mathematically proves A's conjecture.
- "Extends": Paper B *augments* A's system (e.g., "Adds Module X to Framework A") to solve a specific failure case of A.

**CRITICAL**: The 'explanation' field must be a "Causal Chain".
BAD: "Paper B uses a similar method to Paper A."
GOOD: "Paper B retains A's Transformer backbone but replaces the LSTM decoder with an Attention Head, improving latency by 14%."

Return ONLY valid JSON:
{
    "relation_type": "Contradicts" | "Supports" | "Extends",
    "confidence": 0.0 to 1.0,
    "explanation": "Specific mechanism of action: [Change in Method] -> [Delta in Result]."
}"#,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundles_carry_placeholders() {
        for mode in [Mode::Student, Mode::Researcher] {
            let b = PromptBundle::for_mode(mode);
            assert!(b.extraction.contains(PAPER_TEXT_PLACEHOLDER));
            for slot in ["{methodology_a}", "{key_result_b}", "{core_theory_b}"] {
                assert!(b.synthesis.contains(slot), "{mode} synthesis lacks {slot}");
            }
        }
    }

    #[test]
    fn test_extraction_substitutes_text() {
        let prompt = PromptBundle::for_mode(Mode::Student).render_extraction("PAPER BODY");
        assert!(prompt.contains("Input Text:\nPAPER BODY"));
        assert!(!prompt.contains(PAPER_TEXT_PLACEHOLDER));
        assert!(prompt.ends_with(JSON_ONLY_SUFFIX));
    }

    #[test]
    fn test_template_without_slot_appends_quoted_text() {
        let prompt = render_extraction("Extract fields.", "BODY");
        assert_eq!(
            prompt,
            "Extract fields.\n\nPaper text:\n\"\"\"BODY\n\"\"\"\n\nReturn ONLY the JSON object, no other text."
        );
    }

    #[test]
    fn test_synthesis_fills_both_papers() {
        let a = MetadataFields { methodology: "MA", key_result: "KA", core_theory: "TA" };
        let b = MetadataFields { methodology: "MB", key_result: "KB", core_theory: "TB" };
        let prompt = PromptBundle::for_mode(Mode::Researcher).render_synthesis(&a, &b);
        assert!(prompt.starts_with("You are a Principal Investigator"));
        assert!(prompt.contains("- Protocol: MA"));
        assert!(prompt.contains("- Theory: TB"));
        assert!(!prompt.contains("{methodology_a}"));
        assert!(prompt.ends_with(JSON_ONLY_SUFFIX));
    }

    #[test]
    fn test_synthesis_field_text_is_not_rescanned() {
        let a = MetadataFields { methodology: "MA", key_result: "see {key_result_b}", core_theory: "TA" };
        let b = MetadataFields { methodology: "MB", key_result: "KB", core_theory: "TB" };
        let prompt = PromptBundle::for_mode(Mode::Student).render_synthesis(&a, &b);
        assert!(prompt.contains("see {key_result_b}"));
        assert!(!prompt.contains("see KB"));
    }
}
