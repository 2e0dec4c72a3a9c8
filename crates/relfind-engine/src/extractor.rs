//! Column Extractor: resolves each column's cell inside candidate rows via
//! the column's relative suffix paths. Composite selectors align their
//! constituents' row lists positionally; rows where every column is absent
//! are dropped.

use crate::matcher::{self, MatchOutcome};
use relfind_common::dom::{NodeId, PageSnapshot};
use relfind_common::protocol::{CellRep, RelationRep};
use relfind_common::selector::{RowSelector, Selector, SelectorBody};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationOutcome {
    Relation(Vec<Vec<Option<NodeId>>>),
    NotYet,
    Absent,
}

impl RelationOutcome {
    /// Treat retryable/absent outcomes as an empty relation. Synthesis uses
    /// this: a selector that extracts nothing simply scores zero rows.
    pub fn into_rows(self) -> Vec<Vec<Option<NodeId>>> {
        match self {
            RelationOutcome::Relation(rows) => rows,
            _ => Vec::new(),
        }
    }
}

/// Full pipeline: match rows, then resolve cells.
pub fn relation_matching(page: &PageSnapshot, selector: &Selector) -> RelationOutcome {
    // Pulldown relations are single-column option lists; no suffix paths.
    if let SelectorBody::Single(RowSelector::Pulldown(_)) = &selector.body {
        return match matcher::rows_matching(page, selector) {
            MatchOutcome::Rows(rows) => RelationOutcome::Relation(
                rows.into_iter()
                    .flatten()
                    .map(|option| vec![Some(option)])
                    .collect(),
            ),
            MatchOutcome::NotYet => RelationOutcome::NotYet,
            MatchOutcome::Absent => RelationOutcome::Absent,
        };
    }

    match matcher::rows_matching(page, selector) {
        MatchOutcome::Rows(rows_per_constituent) => {
            RelationOutcome::Relation(cells_for_rows(page, selector, &rows_per_constituent))
        }
        MatchOutcome::NotYet => RelationOutcome::NotYet,
        MatchOutcome::Absent => RelationOutcome::Absent,
    }
}

/// Resolve cells for pre-matched rows. `rows_per_constituent` holds one row
/// list per constituent selector; shorter lists pad with absent rows.
pub fn cells_for_rows(
    page: &PageSnapshot,
    selector: &Selector,
    rows_per_constituent: &[Vec<NodeId>],
) -> Vec<Vec<Option<NodeId>>> {
    let max_rows = rows_per_constituent.iter().map(Vec::len).max().unwrap_or(0);
    let mut relation = Vec::new();
    for row_index in 0..max_rows {
        let anchors: Vec<Option<NodeId>> = rows_per_constituent
            .iter()
            .map(|rows| rows.get(row_index).copied())
            .collect();
        let mut cells = Vec::with_capacity(selector.columns.len());
        for column in &selector.columns {
            let mut found = None;
            for suffix in &column.suffixes {
                let anchor = anchors.get(suffix.selector_index).copied().flatten();
                if let Some(anchor) = anchor
                    && let Some(cell) = page.resolve_suffix(anchor, &suffix.steps)
                {
                    found = Some(cell);
                    break;
                }
            }
            cells.push(found);
        }
        // A row with no resolvable cell at all is a spurious match.
        if !cells.is_empty() && cells.iter().any(Option::is_some) {
            relation.push(cells);
        }
    }
    relation
}

/// Convert a node-level relation to the representation shipped to the
/// visualization layer.
pub fn to_rep(page: &PageSnapshot, relation: &[Vec<Option<NodeId>>]) -> RelationRep {
    relation
        .iter()
        .map(|row| {
            row.iter()
                .map(|cell| {
                    cell.map(|id| CellRep {
                        text: Some(page.text_content(id)),
                        xpath: page.xpath(id),
                        frame: page.node(id).and_then(|n| n.frame.clone()),
                    })
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use relfind_common::dom::{PageBuilder, PathStep};
    use relfind_common::selector::{
        ColumnSelector, FeatureConstraint, FeatureSet, Suffix,
    };

    fn step(tag: &str, index: usize) -> PathStep {
        PathStep { tag: tag.into(), index }
    }

    #[test]
    fn first_resolving_suffix_wins_and_empty_rows_drop() {
        let mut page = PageBuilder::new("u");
        let body = page.child(page.root(), "body");
        let list = page.child(body, "ul");
        // row 1 has an <a>, row 2 only a <span>, row 3 has neither
        let li1 = page.child(list, "li");
        page.text_child(li1, "a", "link");
        let li2 = page.child(list, "li");
        page.text_child(li2, "span", "plain");
        let li3 = page.child(list, "li");
        page.text_child(li3, "i", "noise");
        let page = page.build();

        let mut fs = FeatureSet::new();
        fs.insert("tag", FeatureConstraint::include(["li".to_string()]));
        let mut selector = Selector::new(
            SelectorBody::Single(RowSelector::Features { features: fs }),
            0,
            vec![ColumnSelector {
                id: None,
                name: None,
                index: Some(0),
                xpath: page.xpath(li1),
                suffixes: vec![
                    Suffix::new(vec![step("a", 1)]),
                    Suffix::new(vec![step("span", 1)]),
                ],
            }],
        );
        selector.exclude_first = 0;

        match relation_matching(&page, &selector) {
            RelationOutcome::Relation(rel) => {
                assert_eq!(rel.len(), 2);
                assert_eq!(page.text_content(rel[0][0].unwrap()), "link");
                assert_eq!(page.text_content(rel[1][0].unwrap()), "plain");
            }
            other => panic!("expected relation, got {other:?}"),
        }
    }

    #[test]
    fn pulldown_relation_is_single_column_options() {
        let mut page = PageBuilder::new("u");
        let body = page.child(page.root(), "body");
        let select = page.child(body, "select");
        page.text_child(select, "option", "red");
        page.text_child(select, "option", "blue");
        let page = page.build();

        let selector = Selector::new(
            SelectorBody::Single(RowSelector::Pulldown(
                relfind_common::selector::PulldownSelector { index: 0 },
            )),
            0,
            vec![],
        );
        let rel = relation_matching(&page, &selector).into_rows();
        assert_eq!(rel.len(), 2);
        assert_eq!(rel[0].len(), 1);
        let rep = to_rep(&page, &rel);
        assert_eq!(rep[1][0].as_ref().unwrap().text.as_deref(), Some("blue"));
    }
}
