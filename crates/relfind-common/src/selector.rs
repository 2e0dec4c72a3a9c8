//! Selector data model: feature constraints, column suffix paths, pagination
//! descriptor, and the durable persistence shape.
//!
//! The row shape is an explicit tagged variant (`Single` vs `Composite`); the
//! persisted JSON keeps the historical convention of a bare object for a
//! single constituent and an array for a composite.

use crate::dom::PathStep;
use crate::protocol::RelationRep;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    Include,
    Exclude,
}

/// Acceptable values for one named feature. A candidate agrees when the
/// membership test matches the polarity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureConstraint {
    pub values: BTreeSet<String>,
    pub polarity: Polarity,
}

impl FeatureConstraint {
    pub fn include(values: impl IntoIterator<Item = String>) -> Self {
        Self { values: values.into_iter().collect(), polarity: Polarity::Include }
    }
}

/// Feature name → constraint bag. `BTreeMap` keeps serialization canonical,
/// which the selector identity hash relies on.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureSet(pub BTreeMap<String, FeatureConstraint>);

impl FeatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, feature: &str, constraint: FeatureConstraint) {
        self.0.insert(feature.to_string(), constraint);
    }

    pub fn get(&self, feature: &str) -> Option<&FeatureConstraint> {
        self.0.get(feature)
    }

    pub fn remove(&mut self, feature: &str) -> Option<FeatureConstraint> {
        self.0.remove(feature)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FeatureConstraint)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Table fast path: the row unit is a `<tr>` of the table recorded at
/// this xpath (or the closest table by xpath edit distance).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSelector {
    pub xpath: String,
}

/// Pulldown menus are addressed by ordinal among the page's `<select>`s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PulldownSelector {
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RowSelector {
    Features { features: FeatureSet },
    Table(TableSelector),
    Pulldown(PulldownSelector),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SelectorBody {
    Single(RowSelector),
    Composite(Vec<RowSelector>),
}

impl SelectorBody {
    pub fn constituents(&self) -> &[RowSelector] {
        match self {
            SelectorBody::Single(rs) => std::slice::from_ref(rs),
            SelectorBody::Composite(list) => list,
        }
    }

    /// Appends a constituent, turning a single body into a composite.
    /// Returns the new constituent's index.
    pub fn push(&mut self, rs: RowSelector) -> usize {
        match self {
            SelectorBody::Single(existing) => {
                let first = existing.clone();
                *self = SelectorBody::Composite(vec![first, rs]);
                1
            }
            SelectorBody::Composite(list) => {
                list.push(rs);
                list.len() - 1
            }
        }
    }
}

/// One candidate suffix path for a column, tagged with the constituent row
/// selector it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suffix {
    #[serde(default)]
    pub selector_index: usize,
    pub steps: Vec<PathStep>,
}

impl Suffix {
    pub fn new(steps: Vec<PathStep>) -> Self {
        Self { selector_index: 0, steps }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSelector {
    pub id: Option<u32>,
    pub name: Option<String>,
    pub index: Option<usize>,
    /// Absolute xpath of the demonstrated cell this column came from.
    pub xpath: String,
    pub suffixes: Vec<Suffix>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextType {
    None,
    NextButton,
    MoreButton,
    ScrollForMore,
}

/// Structural descriptor of a pagination control. Never a live reference;
/// re-resolved against the current page on every use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextButtonSelector {
    pub tag: String,
    pub text: Option<String>,
    pub id: Option<String>,
    pub class: Option<String>,
    pub src: Option<String>,
    pub xpath: String,
    pub frame_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selector {
    pub body: SelectorBody,
    pub exclude_first: usize,
    pub columns: Vec<ColumnSelector>,
    pub next_type: NextType,
    pub next_button: Option<NextButtonSelector>,
    pub name: Option<String>,
    pub url: Option<String>,
    pub num_rows_in_demonstration: Option<usize>,
    /// Settle delay override before re-extraction, milliseconds.
    pub settle_delay_ms: Option<u64>,
    /// Demo-time relation snapshot. Excluded from persistence and identity.
    #[serde(skip)]
    pub demo_relation: Option<RelationRep>,
}

impl Selector {
    pub fn new(body: SelectorBody, exclude_first: usize, columns: Vec<ColumnSelector>) -> Self {
        Self {
            body,
            exclude_first,
            columns,
            next_type: NextType::None,
            next_button: None,
            name: None,
            url: None,
            num_rows_in_demonstration: None,
            settle_delay_ms: None,
            demo_relation: None,
        }
    }

    pub fn version(&self) -> u32 {
        let pulldown = self
            .body
            .constituents()
            .iter()
            .any(|rs| matches!(rs, RowSelector::Pulldown(_)));
        if pulldown { 2 } else { 1 }
    }

    pub fn persisted(&self) -> PersistedSelector {
        PersistedSelector {
            selector_version: self.version(),
            selector: self.body.clone(),
            exclude_first: self.exclude_first,
            columns: self.columns.clone(),
            next_type: self.next_type,
            next_button_selector: self.next_button.clone(),
            name: self.name.clone(),
            url: self.url.clone(),
            num_rows_in_demonstration: self.num_rows_in_demonstration,
        }
    }

    /// Deterministic identity of the selector's durable fields. Identical
    /// logical selectors hash identically across pages and sessions.
    pub fn sid(&self) -> Sid {
        // Struct field order is fixed and all maps are BTree-backed, so the
        // JSON encoding is canonical.
        let canonical = serde_json::to_string(&self.persisted())
            .unwrap_or_default();
        let digest = Sha256::digest(canonical.as_bytes());
        Sid(hex::encode(digest))
    }
}

/// Durable persistence shape. Demo-time relation snapshots and live element
/// references never appear here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedSelector {
    pub selector_version: u32,
    pub selector: SelectorBody,
    pub exclude_first: usize,
    pub columns: Vec<ColumnSelector>,
    pub next_type: NextType,
    pub next_button_selector: Option<NextButtonSelector>,
    pub name: Option<String>,
    pub url: Option<String>,
    pub num_rows_in_demonstration: Option<usize>,
}

impl PersistedSelector {
    pub fn into_selector(self) -> Selector {
        Selector {
            body: self.selector,
            exclude_first: self.exclude_first,
            columns: self.columns,
            next_type: self.next_type,
            next_button: self.next_button_selector,
            name: self.name,
            url: self.url,
            num_rows_in_demonstration: self.num_rows_in_demonstration,
            settle_delay_ms: None,
            demo_relation: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sid(pub String);

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
