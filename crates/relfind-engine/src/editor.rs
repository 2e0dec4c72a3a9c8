//! Interactive selector correction. An edit session turns a saved selector
//! back into positive and negative row examples, lets the user add or remove
//! rows and demonstrate extra cell positions, and resynthesizes the selector
//! after each correction.

use crate::matcher::{self, MatchOutcome};
use crate::synthesis;
use relfind_common::dom::{NodeId, PageSnapshot};
use relfind_common::error::SelectorError;
use relfind_common::selector::{Selector, Suffix};

pub struct EditSession {
    selector: Selector,
    positives: Vec<NodeId>,
    negatives: Vec<NodeId>,
    empty_on_page: bool,
    pending_cells: Vec<NodeId>,
}

impl EditSession {
    /// Recovers editable examples from what the selector currently matches:
    /// the first two matched rows become the positive examples. A selector
    /// that matches nothing here starts an empty session, to be rebuilt row
    /// by row.
    pub fn begin(page: &PageSnapshot, selector: Selector) -> Self {
        let positives = matched_row_anchors(page, &selector);
        let empty_on_page = positives.is_empty();
        Self {
            selector,
            positives,
            negatives: Vec::new(),
            empty_on_page,
            pending_cells: Vec::new(),
        }
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn empty_on_page(&self) -> bool {
        self.empty_on_page
    }

    pub fn into_selector(self) -> Selector {
        self.selector
    }

    /// Marks the row containing `target` as one the relation must include.
    pub fn include_row(
        &mut self,
        page: &PageSnapshot,
        target: NodeId,
    ) -> Result<(), SelectorError> {
        if self.empty_on_page {
            // Nothing matched here before; the clicked cells restart the
            // demonstration while the saved name and pagination survive.
            self.pending_cells.push(target);
            let built = synthesis::selector_from_single_row(page, &self.pending_cells)?;
            self.selector.body = built.selector.body;
            self.selector.exclude_first = built.selector.exclude_first;
            self.selector.columns = built.selector.columns;
            if !built.relation.is_empty() {
                self.positives = matched_row_anchors(page, &self.selector);
                self.empty_on_page = false;
            }
            return Ok(());
        }

        let anchor = self.row_anchor_for(page, target)?;
        self.negatives.retain(|&n| n != anchor);
        if !self.positives.contains(&anchor) {
            self.positives.push(anchor);
        }
        self.resynthesize(page)
    }

    /// Marks the row containing `target` as one the relation must not
    /// include.
    pub fn exclude_row(
        &mut self,
        page: &PageSnapshot,
        target: NodeId,
    ) -> Result<(), SelectorError> {
        let anchor = self.row_anchor_for(page, target)?;
        self.positives.retain(|&p| p != anchor);
        if !self.negatives.contains(&anchor) {
            self.negatives.push(anchor);
        }
        self.resynthesize(page)
    }

    /// Demonstrates where an existing column lives in the row containing
    /// `target`, adding a fallback suffix for rows the current suffixes miss.
    pub fn add_cell_example(
        &mut self,
        page: &PageSnapshot,
        column_index: usize,
        target: NodeId,
    ) -> Result<(), SelectorError> {
        let anchor = self.row_anchor_for(page, target)?;
        let steps = page.suffix_from(anchor, target).ok_or(SelectorError::NoRowAnchor)?;
        let column = self
            .selector
            .columns
            .get_mut(column_index)
            .ok_or(SelectorError::ColumnOutOfRange(column_index))?;
        let suffix = Suffix::new(steps);
        if !column.suffixes.contains(&suffix) {
            column.suffixes.push(suffix);
        }
        if !self.positives.contains(&anchor) {
            self.positives.push(anchor);
            return self.resynthesize(page);
        }
        Ok(())
    }

    /// The row anchor containing `target`: an already-known example when one
    /// contains it, otherwise the ancestor at row-anchor depth.
    fn row_anchor_for(
        &self,
        page: &PageSnapshot,
        target: NodeId,
    ) -> Result<NodeId, SelectorError> {
        if let Some(&known) = self
            .positives
            .iter()
            .chain(self.negatives.iter())
            .find(|&&a| page.contains(a, target))
        {
            return Ok(known);
        }
        let depth = self
            .positives
            .first()
            .or(self.negatives.first())
            .map(|&a| page.depth(a))
            .ok_or(SelectorError::MissingExamples)?;
        ancestor_at_depth(page, target, depth).ok_or(SelectorError::NoRowAnchor)
    }

    fn resynthesize(&mut self, page: &PageSnapshot) -> Result<(), SelectorError> {
        if self.positives.is_empty() {
            return Err(SelectorError::MissingExamples);
        }
        let columns = self.selector.columns.clone();
        let rebuilt =
            synthesis::synthesize_selector(page, &self.positives, &self.negatives, columns)?;
        self.selector.body = rebuilt.body;
        self.selector.exclude_first = rebuilt.exclude_first;
        self.selector.columns = rebuilt.columns;
        Ok(())
    }
}

fn matched_row_anchors(page: &PageSnapshot, selector: &Selector) -> Vec<NodeId> {
    match matcher::rows_matching(page, selector) {
        MatchOutcome::Rows(per_constituent) => per_constituent
            .into_iter()
            .find(|rows| !rows.is_empty())
            .map(|rows| rows.into_iter().take(2).collect())
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn ancestor_at_depth(page: &PageSnapshot, target: NodeId, depth: usize) -> Option<NodeId> {
    let mut cur = target;
    while page.depth(cur) > depth {
        cur = page.node(cur)?.parent?;
    }
    (page.depth(cur) == depth).then_some(cur)
}
