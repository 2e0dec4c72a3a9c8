//! Row Matcher: enumerates candidate row elements for a selector.
//!
//! Generic mode scans every element in the document against the feature
//! constraints. The table fast path skips the scan entirely when the row unit
//! is a `<tr>` of a known table, locating the table by exact recorded xpath or
//! by minimum xpath edit distance. Outcomes distinguish "not loaded yet"
//! (retryable) from "structurally absent" (stop polling).

use crate::features;
use relfind_common::dom::{NodeId, PageSnapshot};
use relfind_common::selector::{
    FeatureSet, PulldownSelector, RowSelector, Selector, TableSelector,
};

/// Result of matching one selector against the current page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    /// One row list per constituent row selector, document order, with the
    /// first `exclude_first` matches already dropped.
    Rows(Vec<Vec<NodeId>>),
    /// The page may still be loading; worth retrying.
    NotYet,
    /// Required features are provably absent from the page; stop polling.
    Absent,
}

enum MemberRows {
    Rows(Vec<NodeId>),
    NotYet,
    Absent,
}

/// Enumerate candidate rows for every constituent of the selector.
pub fn rows_matching(page: &PageSnapshot, selector: &Selector) -> MatchOutcome {
    let mut out = Vec::new();
    let mut saw_rows = false;
    let mut saw_not_yet = false;
    for rs in selector.body.constituents() {
        match member_rows(page, rs, selector.exclude_first) {
            MemberRows::Rows(rows) => {
                saw_rows = true;
                out.push(rows);
            }
            MemberRows::NotYet => {
                saw_not_yet = true;
                out.push(Vec::new());
            }
            MemberRows::Absent => out.push(Vec::new()),
        }
    }
    if saw_rows {
        MatchOutcome::Rows(out)
    } else if saw_not_yet {
        MatchOutcome::NotYet
    } else {
        MatchOutcome::Absent
    }
}

fn member_rows(page: &PageSnapshot, rs: &RowSelector, exclude_first: usize) -> MemberRows {
    match rs {
        RowSelector::Features { features } => feature_rows(page, features, exclude_first),
        RowSelector::Table(table) => table_rows(page, table, exclude_first),
        RowSelector::Pulldown(pulldown) => pulldown_rows(page, pulldown, exclude_first),
    }
}

fn feature_rows(page: &PageSnapshot, fs: &FeatureSet, exclude_first: usize) -> MemberRows {
    if !features::supported(fs) {
        return MemberRows::Absent;
    }
    if fs.is_empty() {
        // An unconstrained feature set matches nothing rather than the
        // whole document.
        return MemberRows::NotYet;
    }
    let rows: Vec<NodeId> = page
        .document_order()
        .into_iter()
        .filter(|&id| features::node_matches(page, id, fs))
        .skip(exclude_first)
        .collect();
    if rows.is_empty() {
        // A feature set can start matching once content loads.
        return MemberRows::NotYet;
    }
    tracing::debug!(rows = rows.len(), "feature scan matched rows");
    MemberRows::Rows(rows)
}

fn table_rows(page: &PageSnapshot, selector: &TableSelector, exclude_first: usize) -> MemberRows {
    let table = match page.resolve_xpath(&selector.xpath) {
        Some(id) => Some(id),
        None => {
            // No node at the exact recorded xpath; fall back to the table
            // whose current xpath is closest by edit distance.
            let tables = page.by_tag("table");
            if tables.is_empty() {
                return MemberRows::Absent;
            }
            tables
                .into_iter()
                .min_by_key(|&t| strsim::levenshtein(&page.xpath(t), &selector.xpath))
        }
    };
    let Some(table) = table else {
        return MemberRows::Absent;
    };
    let rows: Vec<NodeId> = page
        .descendants(table)
        .into_iter()
        .filter(|&id| page.node(id).is_some_and(|n| n.tag == "tr"))
        .skip(exclude_first)
        .collect();
    if rows.is_empty() {
        return MemberRows::NotYet;
    }
    MemberRows::Rows(rows)
}

fn pulldown_rows(
    page: &PageSnapshot,
    selector: &PulldownSelector,
    exclude_first: usize,
) -> MemberRows {
    let selects = page.by_tag("select");
    let Some(&select) = selects.get(selector.index) else {
        return MemberRows::Absent;
    };
    if page.node(select).is_some_and(|n| n.disabled) {
        // The pulldown exists but is disabled right now; wait for it.
        return MemberRows::NotYet;
    }
    let options: Vec<NodeId> = page
        .descendants(select)
        .into_iter()
        .filter(|&id| page.node(id).is_some_and(|n| n.tag == "option"))
        .skip(exclude_first)
        .collect();
    if options.is_empty() {
        return MemberRows::NotYet;
    }
    MemberRows::Rows(options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use relfind_common::dom::PageBuilder;
    use relfind_common::selector::{FeatureConstraint, SelectorBody};

    fn li_selector(exclude_first: usize) -> Selector {
        let mut fs = FeatureSet::new();
        fs.insert("tag", FeatureConstraint::include(["li".to_string()]));
        Selector::new(
            SelectorBody::Single(RowSelector::Features { features: fs }),
            exclude_first,
            vec![],
        )
    }

    #[test]
    fn generic_scan_drops_exclude_first() {
        let mut page = PageBuilder::new("u");
        let body = page.child(page.root(), "body");
        let list = page.child(body, "ul");
        for i in 0..4 {
            let li = page.child(list, "li");
            page.set_text(li, &format!("row {i}"));
        }
        let page = page.build();

        match rows_matching(&page, &li_selector(1)) {
            MatchOutcome::Rows(rows) => {
                assert_eq!(rows.len(), 1);
                assert_eq!(rows[0].len(), 3);
                assert_eq!(page.text_content(rows[0][0]), "row 1");
            }
            other => panic!("expected rows, got {other:?}"),
        }
    }

    #[test]
    fn missing_select_is_absent_but_disabled_is_not_yet() {
        let mut page = PageBuilder::new("u");
        let body = page.child(page.root(), "body");
        let select = page.child(body, "select");
        page.text_child(select, "option", "a");
        page.set_disabled(select, true);
        let page = page.build();

        let disabled = Selector::new(
            SelectorBody::Single(RowSelector::Pulldown(PulldownSelector { index: 0 })),
            0,
            vec![],
        );
        assert_eq!(rows_matching(&page, &disabled), MatchOutcome::NotYet);

        let missing = Selector::new(
            SelectorBody::Single(RowSelector::Pulldown(PulldownSelector { index: 3 })),
            0,
            vec![],
        );
        assert_eq!(rows_matching(&page, &missing), MatchOutcome::Absent);
    }

    #[test]
    fn page_without_tables_is_absent_for_table_selector() {
        let mut page = PageBuilder::new("u");
        page.child(page.root(), "body");
        let page = page.build();

        let sel = Selector::new(
            SelectorBody::Single(RowSelector::Table(TableSelector {
                xpath: "/html[1]/body[1]/table[1]".into(),
            })),
            0,
            vec![],
        );
        assert_eq!(rows_matching(&page, &sel), MatchOutcome::Absent);
    }
}
