//! Hard contract violations. These are surfaced, never silently recovered;
//! retryable conditions are modeled as outcomes, not errors.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    #[error("no common ancestor for the demonstrated cells")]
    NoCommonAncestor,

    #[error("no row anchor for the demonstrated cells")]
    NoRowAnchor,

    #[error("demonstrated cell has no <tr> ancestor")]
    NoTableRow,

    #[error("<tr> has no <table> ancestor")]
    NoTableAncestor,

    #[error("cannot edit a selector with no positive or negative examples")]
    MissingExamples,

    #[error("failed to exclude all negative examples even with the full feature space")]
    NegativesNotExcludable,

    #[error("column index {0} out of range")]
    ColumnOutOfRange(usize),

    #[error("unknown feature: {0}")]
    UnknownFeature(String),
}
