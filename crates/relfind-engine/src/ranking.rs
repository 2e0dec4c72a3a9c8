//! Candidate ranking. Selectors are compared on the relation they currently
//! extract plus what they remember from demonstration time, using a fixed
//! chain of tie-broken criteria.

use relfind_common::protocol::RelationRep;
use relfind_common::selector::Selector;

/// A candidate paired with the relation it extracts from the current page,
/// plus the precomputed quantities the ranking chain compares.
#[derive(Debug, Clone)]
pub struct ComparisonSelector {
    pub selector: Selector,
    pub relation: RelationRep,
    pub num_matched_xpaths: usize,
    pub num_rows: usize,
    pub num_rows_in_demo: usize,
    pub num_columns: usize,
}

impl ComparisonSelector {
    pub fn new(selector: Selector, relation: RelationRep, demo_xpaths: &[String]) -> Self {
        let num_matched_xpaths = matched_xpaths(&relation, demo_xpaths).len();
        let num_rows = relation.len();
        let num_rows_in_demo = selector.num_rows_in_demonstration.unwrap_or(num_rows);
        let num_columns = selector.columns.len();
        Self {
            selector,
            relation,
            num_matched_xpaths,
            num_rows,
            num_rows_in_demo,
            num_columns,
        }
    }
}

/// Demonstrated cell xpaths the relation's first row covers.
pub fn matched_xpaths<'a>(relation: &RelationRep, demo_xpaths: &'a [String]) -> Vec<&'a str> {
    let Some(first_row) = relation.first() else {
        return Vec::new();
    };
    demo_xpaths
        .iter()
        .map(String::as_str)
        .filter(|&xp| {
            first_row
                .iter()
                .flatten()
                .any(|cell| cell.xpath == xp)
        })
        .collect()
}

/// Demonstrated cell xpaths the relation's first row does not cover.
pub fn unmatched_xpaths<'a>(relation: &RelationRep, demo_xpaths: &'a [String]) -> Vec<&'a str> {
    let matched = matched_xpaths(relation, demo_xpaths);
    demo_xpaths
        .iter()
        .map(String::as_str)
        .filter(|xp| !matched.contains(xp))
        .collect()
}

/// True when `first` should be preferred over `second`. Ties prefer `first`,
/// so folding a candidate list with this is stable.
pub fn first_preferred(first: &ComparisonSelector, second: &ComparisonSelector) -> bool {
    // A selector whose demonstration showed multiple rows beats one that
    // only ever saw a single row, regardless of anything else.
    if first.num_rows_in_demo > 1 && second.num_rows_in_demo <= 1 {
        return true;
    }
    if second.num_rows_in_demo > 1 && first.num_rows_in_demo <= 1 {
        return false;
    }
    if first.num_matched_xpaths != second.num_matched_xpaths {
        return first.num_matched_xpaths > second.num_matched_xpaths;
    }
    if first.num_rows != second.num_rows {
        return first.num_rows > second.num_rows;
    }
    if first.num_rows_in_demo != second.num_rows_in_demo {
        return first.num_rows_in_demo > second.num_rows_in_demo;
    }
    if first.num_columns != second.num_columns {
        return first.num_columns > second.num_columns;
    }
    let first_has_next = first.selector.next_button.is_some();
    let second_has_next = second.selector.next_button.is_some();
    if first_has_next != second_has_next {
        return first_has_next;
    }
    true
}
