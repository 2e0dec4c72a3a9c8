//! Payload shapes exchanged with the visualization layer.

use serde::{Deserialize, Serialize};

/// Cell representation safe to ship across the message channel: no live
/// element references, just enough to identify and display the cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellRep {
    pub text: Option<String>,
    pub xpath: String,
    pub frame: Option<String>,
}

/// Row-by-column matrix of extracted cells; `None` marks an absent cell.
pub type RelationRep = Vec<Vec<Option<CellRep>>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationReport {
    pub relation: RelationRep,
}

/// Reported when a pagination control is clicked; the text seeds the
/// numeric-sequence heuristic's prior value on the next resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationClick {
    pub text: String,
}

/// Classification of one incremental fetch cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FreshRelationItems {
    #[serde(rename = "NEWITEMS")]
    NewItems { relation: RelationRep },
    #[serde(rename = "NONEWITEMSYET")]
    NoNewItemsYet,
    #[serde(rename = "NOMOREITEMS")]
    NoMoreItems,
}
