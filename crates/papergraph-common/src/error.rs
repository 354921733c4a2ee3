use thiserror::Error;

#[derive(Debug, Error)]
pub enum PapergraphError {
    #[error("Unknown mode: {0}")]
    UnknownMode(String),

    #[error("Unknown relation type: {0}")]
    UnknownRelation(String),
}
