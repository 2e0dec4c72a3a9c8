//! Selector synthesis from demonstrated cells.
//!
//! Given the xpaths of cells the user clicked, produce the selector whose
//! extracted relation best generalizes the demonstration: try the table fast
//! path, fall back to the largest demonstrated-cell subset that yields a
//! multi-row relation, and rank the winner against any previously saved
//! selector for the same page.

use crate::backend::{DriverError, PageDriver};
use crate::config::EngineConfig;
use crate::extractor;
use crate::features::{self, Feature};
use crate::ranking::{self, ComparisonSelector};
use relfind_common::dom::{NodeId, PageSnapshot};
use relfind_common::error::SelectorError;
use relfind_common::selector::{
    ColumnSelector, NextType, PulldownSelector, RowSelector, Selector, SelectorBody, Suffix,
    TableSelector,
};
use thiserror::Error;

/// More distinct xpaths than this and the xpath feature stops constraining
/// anything useful; synthesis drops it and retries on the wider space.
const XPATH_VALUE_CAP: usize = 3;

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error(transparent)]
    Selector(#[from] SelectorError),

    #[error("no relation found after {0} attempts")]
    NoData(u32),

    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// Result of a demonstration: the main relation selector plus one selector
/// per demonstrated pulldown menu.
#[derive(Debug, Clone)]
pub struct LikelyRelation {
    pub selector: Selector,
    pub pulldowns: Vec<Selector>,
}

/// A candidate selector with the relation it extracted at synthesis time.
#[derive(Debug, Clone)]
pub(crate) struct Synthesized {
    pub(crate) selector: Selector,
    pub(crate) relation: Vec<Vec<Option<NodeId>>>,
}

/// One column per demonstrated cell, anchored at `anchor`, in demonstration
/// order.
pub fn column_selectors(
    page: &PageSnapshot,
    anchor: NodeId,
    cells: &[NodeId],
) -> Result<Vec<ColumnSelector>, SelectorError> {
    cells
        .iter()
        .enumerate()
        .map(|(i, &cell)| {
            let steps = page.suffix_from(anchor, cell).ok_or(SelectorError::NoRowAnchor)?;
            Ok(ColumnSelector {
                id: None,
                name: None,
                index: Some(i),
                xpath: page.xpath(cell),
                suffixes: vec![Suffix::new(steps)],
            })
        })
        .collect()
}

/// Generalizes the positive examples into a feature-set selector that matches
/// every positive and no negative.
///
/// Starts from the tag and xpath features. When the positives' xpaths are too
/// scattered, or when xpath membership fails to exclude a negative, the search
/// widens to every feature except xpath. A negative that shows up as the very
/// first match is excluded positionally instead, which is how header rows are
/// skipped.
pub fn synthesize_selector(
    page: &PageSnapshot,
    positives: &[NodeId],
    negatives: &[NodeId],
    columns: Vec<ColumnSelector>,
) -> Result<Selector, SelectorError> {
    if positives.is_empty() {
        return Err(SelectorError::MissingExamples);
    }
    let mut space: &[Feature] = features::DEFAULT_FEATURES;
    let mut exclude_first = 0usize;
    loop {
        let fs = features::feature_set(page, space, positives);
        let using_xpath = fs.get("xpath").is_some();
        if using_xpath && fs.get("xpath").is_some_and(|c| c.values.len() > XPATH_VALUE_CAP) {
            space = features::FEATURES_EXCEPT_XPATH;
            continue;
        }
        let matches: Vec<NodeId> = page
            .document_order()
            .into_iter()
            .filter(|&id| features::node_matches(page, id, &fs))
            .collect();
        let offending = negatives
            .iter()
            .copied()
            .find(|n| matches.iter().skip(exclude_first).any(|m| m == n));
        match offending {
            None => {
                tracing::debug!(
                    positives = positives.len(),
                    negatives = negatives.len(),
                    exclude_first,
                    "synthesized feature selector"
                );
                return Ok(Selector::new(
                    SelectorBody::Single(RowSelector::Features { features: fs }),
                    exclude_first,
                    columns,
                ));
            }
            Some(neg) if exclude_first == 0 && matches.first() == Some(&neg) => {
                // Negative in the leading match: a header row, not a feature
                // problem.
                exclude_first = 1;
            }
            Some(_) if using_xpath => {
                space = features::FEATURES_EXCEPT_XPATH;
            }
            Some(_) => return Err(SelectorError::NegativesNotExcludable),
        }
    }
}

/// A same-tag sibling of `anchor` in which every column's suffix resolves.
/// Serves as a free second positive example for a single-row demonstration.
fn sibling_matching_suffixes(
    page: &PageSnapshot,
    anchor: NodeId,
    columns: &[ColumnSelector],
) -> Option<NodeId> {
    let tag = page.node(anchor)?.tag.clone();
    page.siblings(anchor).into_iter().find(|&sib| {
        page.node(sib).is_some_and(|n| n.tag == tag)
            && columns.iter().all(|col| {
                col.suffixes
                    .iter()
                    .any(|s| page.resolve_suffix(sib, &s.steps).is_some())
            })
    })
}

/// Builds a selector from one demonstrated row's cells. The row anchor starts
/// at the cells' deepest common ancestor and climbs until some same-tag
/// sibling reproduces the cell layout; that sibling is a free second positive
/// example, which is what lets the xpath feature generalize past the
/// demonstrated row.
pub(crate) fn selector_from_single_row(
    page: &PageSnapshot,
    cells: &[NodeId],
) -> Result<Synthesized, SelectorError> {
    let base = page.common_ancestor(cells).ok_or(SelectorError::NoCommonAncestor)?;

    let mut anchor = base;
    let mut sibling = None;
    let mut chain = vec![base];
    chain.extend(page.ancestors(base));
    for candidate in chain {
        let cols = column_selectors(page, candidate, cells)?;
        if let Some(sib) = sibling_matching_suffixes(page, candidate, &cols) {
            anchor = candidate;
            sibling = Some(sib);
            break;
        }
    }
    let columns = column_selectors(page, anchor, cells)?;

    let mut positives = vec![anchor];
    if let Some(sibling) = sibling {
        positives.push(sibling);
    }
    let mut selector = synthesize_selector(page, &positives, &[], columns)?;
    let mut relation = extractor::relation_matching(page, &selector).into_rows();

    // Rows matched ahead of the demonstrated one are headers.
    let demo_cell = cells.first().copied();
    if let Some(pos) = relation
        .iter()
        .position(|row| row.iter().flatten().any(|&c| Some(c) == demo_cell))
        && pos > 0
    {
        selector.exclude_first += pos;
        relation.drain(..pos);
    }
    Ok(Synthesized { selector, relation })
}

/// Lexicographic k-subsets of `0..n`, produced lazily.
struct Combinations {
    n: usize,
    k: usize,
    indices: Vec<usize>,
    done: bool,
}

impl Combinations {
    fn new(n: usize, k: usize) -> Self {
        Self { n, k, indices: (0..k).collect(), done: k > n }
    }
}

impl Iterator for Combinations {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        if self.done {
            return None;
        }
        let current = self.indices.clone();
        let mut i = self.k;
        loop {
            if i == 0 {
                self.done = true;
                break;
            }
            i -= 1;
            if self.indices[i] < self.n - (self.k - i) {
                self.indices[i] += 1;
                for j in i + 1..self.k {
                    self.indices[j] = self.indices[j - 1] + 1;
                }
                break;
            }
        }
        Some(current)
    }
}

/// Searches demonstrated-cell subsets, largest first, for the one whose
/// synthesized selector extracts the highest-scoring multi-row relation.
/// Smaller sizes are never visited once any size has produced a winner.
fn selector_from_largest_row_subset(
    page: &PageSnapshot,
    cells: &[NodeId],
    min_subset_size: usize,
) -> Option<Synthesized> {
    let mut best: Option<Synthesized> = None;
    let mut best_size = 0usize;
    let mut best_score = 0usize;
    for size in (min_subset_size.max(1)..=cells.len()).rev() {
        if best.is_some() && size < best_size {
            break;
        }
        for combo in Combinations::new(cells.len(), size) {
            let subset: Vec<NodeId> = combo.into_iter().map(|i| cells[i]).collect();
            let Ok(candidate) = selector_from_single_row(page, &subset) else {
                continue;
            };
            if candidate.relation.len() <= 1 {
                continue;
            }
            let score = size * candidate.relation.len();
            if score > best_score {
                best_score = score;
                best_size = size;
                best = Some(candidate);
            }
        }
    }
    best
}

/// Table fast path: when the demonstrated cells live in one `<tr>`, the row
/// unit is that table's rows and the columns are the row's own cells.
fn selector_from_table_row(
    page: &PageSnapshot,
    cells: &[NodeId],
) -> Result<Option<Synthesized>, SelectorError> {
    let Some(&first_cell) = cells.first() else {
        return Ok(None);
    };
    let mut chain = vec![first_cell];
    chain.extend(page.ancestors(first_cell));
    let rows: Vec<NodeId> = chain
        .into_iter()
        .filter(|&id| page.node(id).is_some_and(|n| n.tag == "tr"))
        .filter(|&tr| cells.iter().all(|&c| page.contains(tr, c)))
        .collect();
    if rows.is_empty() {
        return Ok(None);
    }

    let mut best: Option<Synthesized> = None;
    let mut best_score = 0usize;
    for tr in rows {
        let table = page.closest(tr, "table").ok_or(SelectorError::NoTableAncestor)?;
        let table_rows: Vec<NodeId> = page
            .descendants(table)
            .into_iter()
            .filter(|&id| page.node(id).is_some_and(|n| n.tag == "tr"))
            .collect();
        let exclude_first = table_rows.iter().position(|&r| r == tr).unwrap_or(0);

        // The row's own cells become columns; demonstrated cells outside
        // them are kept as extra columns.
        let mut all_cells: Vec<NodeId> = page
            .descendants(tr)
            .into_iter()
            .filter(|&id| page.node(id).is_some_and(|n| n.tag == "td" || n.tag == "th"))
            .collect();
        for &cell in cells {
            if !all_cells.contains(&cell) {
                all_cells.push(cell);
            }
        }
        let columns = column_selectors(page, tr, &all_cells)?;
        let selector = Selector::new(
            SelectorBody::Single(RowSelector::Table(TableSelector { xpath: page.xpath(table) })),
            exclude_first,
            columns,
        );
        let relation = extractor::relation_matching(page, &selector).into_rows();
        let score = relation.len() * all_cells.len();
        if score > best_score {
            best_score = score;
            best = Some(Synthesized { selector, relation });
        }
    }
    Ok(best)
}

/// Folds `add` into `orig` as extra constituents: `add`'s row selectors are
/// appended and its columns re-anchored on them.
pub fn merge_selectors(orig: &mut Selector, mut add: Selector) {
    let base = orig.body.constituents().len();
    let added = match add.body {
        SelectorBody::Single(rs) => vec![rs],
        SelectorBody::Composite(list) => list,
    };
    for rs in added {
        orig.body.push(rs);
    }
    for col in &mut add.columns {
        for suffix in &mut col.suffixes {
            suffix.selector_index += base;
        }
    }
    orig.columns.append(&mut add.columns);
}

/// One single-column selector per demonstrated pulldown menu, addressed by
/// the menu's ordinal among the page's `<select>`s.
pub fn pulldown_relations(page: &PageSnapshot, xpaths: &[String]) -> Vec<Selector> {
    let selects = page.by_tag("select");
    let mut seen = Vec::new();
    let mut out = Vec::new();
    for xpath in xpaths {
        let Some(node) = page.resolve_xpath(xpath) else {
            continue;
        };
        let Some(select) = page.closest(node, "select") else {
            continue;
        };
        let Some(index) = selects.iter().position(|&s| s == select) else {
            continue;
        };
        if seen.contains(&index) {
            continue;
        }
        seen.push(index);

        let name = format!("pulldown_{}", index + 1);
        let mut selector = Selector::new(
            SelectorBody::Single(RowSelector::Pulldown(PulldownSelector { index })),
            0,
            vec![ColumnSelector {
                id: None,
                name: Some(format!("{name}_option")),
                index: Some(0),
                xpath: page.xpath(select),
                suffixes: vec![],
            }],
        );
        let relation = extractor::relation_matching(page, &selector).into_rows();
        selector.name = Some(name);
        selector.url = Some(page.url.clone());
        selector.num_rows_in_demonstration = Some(relation.len());
        selector.demo_relation = Some(extractor::to_rep(page, &relation));
        out.push(selector);
    }
    out
}

/// Main demonstration entry point: from the clicked cells' xpaths, produce
/// the most likely relation selector for this page, preferring a previously
/// saved selector when it still explains the demonstration at least as well.
///
/// `Ok(None)` means this demonstration yields no relation yet; the caller may
/// re-poll after the page settles.
pub fn likely_relation(
    page: &PageSnapshot,
    xpaths: &[String],
    suggested: Option<&Selector>,
) -> Result<Option<LikelyRelation>, SelectorError> {
    let (pulldown_xpaths, cell_xpaths): (Vec<String>, Vec<String>) = xpaths
        .iter()
        .cloned()
        .partition(|xp| xp.to_lowercase().contains("/select["));
    let pulldowns = pulldown_relations(page, &pulldown_xpaths);

    let cells: Vec<NodeId> =
        cell_xpaths.iter().filter_map(|xp| page.resolve_xpath(xp)).collect();

    // A freshly synthesized selector only displaces a saved one when it
    // covers strictly more of the demonstration.
    let min_subset_size = suggested
        .map(|s| {
            let covered = cell_xpaths
                .iter()
                .filter(|xp| s.columns.iter().any(|c| c.xpath == **xp))
                .count();
            covered + 1
        })
        .unwrap_or(1);

    let synthesized = if cells.is_empty() {
        None
    } else {
        match selector_from_table_row(page, &cells)? {
            Some(s) => Some(s),
            None => selector_from_largest_row_subset(page, &cells, min_subset_size),
        }
    };
    let synthesized = synthesized.unwrap_or_else(|| Synthesized {
        selector: Selector::new(
            SelectorBody::Single(RowSelector::Features { features: Default::default() }),
            0,
            vec![],
        ),
        relation: Vec::new(),
    });

    let mut best = ComparisonSelector::new(
        synthesized.selector,
        extractor::to_rep(page, &synthesized.relation),
        &cell_xpaths,
    );
    let mut best_is_new = true;
    if let Some(sug) = suggested {
        let rel = extractor::relation_matching(page, sug).into_rows();
        let candidate =
            ComparisonSelector::new(sug.clone(), extractor::to_rep(page, &rel), &cell_xpaths);
        if ranking::first_preferred(&candidate, &best) {
            best = candidate;
            best_is_new = false;
        }
    }

    // One supplementary pass: demonstrated cells the winner misses get their
    // own selector, merged in when its row count lines up.
    let uncovered = ranking::unmatched_xpaths(&best.relation, &cell_xpaths);
    if !uncovered.is_empty() && best.num_rows > 0 {
        let extra_cells: Vec<NodeId> =
            uncovered.iter().filter_map(|xp| page.resolve_xpath(xp)).collect();
        if extra_cells.len() == uncovered.len()
            && let Ok(extra) = selector_from_single_row(page, &extra_cells)
            && extra.relation.len() == best.num_rows
        {
            let mut merged = best.selector.clone();
            merge_selectors(&mut merged, extra.selector);
            let rel = extractor::relation_matching(page, &merged).into_rows();
            let rep = extractor::to_rep(page, &rel);
            best = ComparisonSelector::new(merged, rep, &cell_xpaths);
            best_is_new = true;
        }
    }

    if best.relation.is_empty() && pulldowns.is_empty() {
        return Ok(None);
    }

    let mut selector = best.selector;
    selector.url = Some(page.url.clone());
    selector.num_rows_in_demonstration = Some(best.relation.len());
    selector.demo_relation = Some(best.relation);
    if best_is_new {
        selector.name = None;
        selector.next_type = NextType::None;
        selector.next_button = None;
    }
    tracing::info!(
        rows = selector.num_rows_in_demonstration,
        columns = selector.columns.len(),
        pulldowns = pulldowns.len(),
        reused_saved = !best_is_new,
        "likely relation"
    );
    Ok(Some(LikelyRelation { selector, pulldowns }))
}

/// [`likely_relation`] against live snapshots, re-polling while the page has
/// not produced a relation yet.
pub async fn likely_relation_with_retry<D: PageDriver>(
    driver: &mut D,
    xpaths: &[String],
    suggested: Option<&Selector>,
    config: &EngineConfig,
) -> Result<LikelyRelation, SynthesisError> {
    let attempts = config.max_likely_relation_attempts;
    for attempt in 0..attempts {
        let page = driver.snapshot().await?;
        if let Some(found) = likely_relation(&page, xpaths, suggested)? {
            return Ok(found);
        }
        tracing::debug!(attempt, "no relation yet, re-polling");
        tokio::time::sleep(config.retry_backoff()).await;
    }
    Err(SynthesisError::NoData(attempts))
}
