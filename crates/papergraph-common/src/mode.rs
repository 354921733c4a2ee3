//! Audience mode selecting which prompt bundle and store namespace to use.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PapergraphError;

/// Who the graph is being built for.
///
/// The mode is chosen once at the request boundary and then carried by value
/// through extraction, synthesis and storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Plain-language summaries and pedagogical links.
    #[default]
    Student,
    /// Methodological comparisons and quantitative deltas.
    Researcher,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Student    => "student",
            Mode::Researcher => "researcher",
        }
    }

    /// Content-store namespace holding papers extracted in this mode.
    pub fn namespace(&self) -> String {
        format!("paper_embeddings_{}", self.as_str())
    }

    /// Lenient parse used for form fields: anything unrecognised is Student.
    pub fn from_form_value(value: &str) -> Self {
        value.parse().unwrap_or_default()
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = PapergraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "student"    => Ok(Mode::Student),
            "researcher" => Ok(Mode::Researcher),
            other        => Err(PapergraphError::UnknownMode(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespaces_are_partitioned_by_mode() {
        assert_eq!(Mode::Student.namespace(), "paper_embeddings_student");
        assert_eq!(Mode::Researcher.namespace(), "paper_embeddings_researcher");
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("Researcher".parse::<Mode>().unwrap(), Mode::Researcher);
        assert!("professor".parse::<Mode>().is_err());
    }

    #[test]
    fn test_form_value_falls_back_to_student() {
        assert_eq!(Mode::from_form_value("admin"), Mode::Student);
        assert_eq!(Mode::from_form_value("researcher"), Mode::Researcher);
    }
}
