//! Incremental relation fetching across pagination.
//!
//! A `FetchCoordinator` owns one session per selector identity. Each session
//! remembers which cells it has already handed out, keyed by a content
//! fingerprint rather than anything stored on the page, so freshness survives
//! page redraws without touching the DOM. Next-page interactions require the
//! whole visible relation to be new before reporting items; more-button and
//! scroll interactions hand out just the unseen suffix.

use crate::backend::{DriverError, PageDriver};
use crate::config::EngineConfig;
use crate::extractor::{self, RelationOutcome};
use crate::next_button;
use relfind_common::dom::{NodeId, PageSnapshot};
use relfind_common::protocol::{CellRep, FreshRelationItems, PaginationClick, RelationRep};
use relfind_common::selector::{NextType, Selector, Sid};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no fetch session for selector {0}")]
    NoSession(Sid),

    #[error("selector has pagination but no recorded control descriptor")]
    MissingNextButton,

    #[error("required rows are absent from this page")]
    Unsatisfiable,

    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// Where a cell lives plus what it says. Two render generations of the same
/// unchanged cell fingerprint identically; any text or frame change, or a
/// reported mutation, makes the cell count as fresh again.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Fingerprint {
    xpath: String,
    content: [u8; 32],
}

fn fingerprint(page: &PageSnapshot, id: NodeId) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(page.text_content(id).as_bytes());
    if let Some(frame) = page.node(id).and_then(|n| n.frame.as_deref()) {
        hasher.update(frame.as_bytes());
    }
    Fingerprint { xpath: page.xpath(id), content: hasher.finalize().into() }
}

/// Stable cell identities, handed out on first sight.
#[derive(Debug)]
struct IdentityTable {
    next: u64,
    map: HashMap<Fingerprint, u64>,
}

impl IdentityTable {
    fn new() -> Self {
        Self { next: 1, map: HashMap::new() }
    }

    fn tag(&mut self, fp: Fingerprint) -> u64 {
        match self.map.get(&fp) {
            Some(&id) => id,
            None => {
                let id = self.next;
                self.next += 1;
                self.map.insert(fp, id);
                id
            }
        }
    }

    /// Drops identities in the subtree rooted at `xpath`. A mutated subtree
    /// may re-render content identical to what was there before, and that
    /// content counts as fresh.
    fn invalidate_subtree(&mut self, xpath: &str) {
        let prefix = format!("{xpath}/");
        self.map.retain(|fp, _| fp.xpath != xpath && !fp.xpath.starts_with(&prefix));
    }
}

#[derive(Debug)]
struct FetchSession {
    identity: IdentityTable,
    seen: HashSet<u64>,
    last_relation: Option<RelationRep>,
    exhausted: bool,
    in_flight: bool,
    prior_next_text: Option<String>,
}

impl FetchSession {
    fn new() -> Self {
        Self {
            identity: IdentityTable::new(),
            seen: HashSet::new(),
            last_relation: None,
            exhausted: false,
            in_flight: false,
            prior_next_text: None,
        }
    }
}

pub struct FetchCoordinator<D: PageDriver> {
    driver: D,
    config: EngineConfig,
    sessions: HashMap<Sid, FetchSession>,
}

impl<D: PageDriver> FetchCoordinator<D> {
    pub fn new(driver: D, config: EngineConfig) -> Self {
        Self { driver, config, sessions: HashMap::new() }
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Opens a session for the selector. Re-opening an active session keeps
    /// its freshness state.
    pub fn start(&mut self, selector: &Selector) {
        self.sessions.entry(selector.sid()).or_insert_with(FetchSession::new);
    }

    pub fn stop(&mut self, selector: &Selector) {
        self.sessions.remove(&selector.sid());
    }

    /// Forgets everything handed out for the selector, keeping the session
    /// open.
    pub fn reset(&mut self, selector: &Selector) {
        self.sessions.insert(selector.sid(), FetchSession::new());
    }

    pub fn is_exhausted(&self, selector: &Selector) -> bool {
        self.sessions.get(&selector.sid()).is_some_and(|s| s.exhausted)
    }

    /// Performs the selector's pagination interaction: scrolls through known
    /// rows, or re-resolves and clicks the recorded control. Returns the
    /// click that was made, `None` when the interaction was a scroll, was
    /// dropped because a read is still settling, or found no control (which
    /// exhausts the session).
    pub async fn run_next_interaction(
        &mut self,
        selector: &Selector,
    ) -> Result<Option<PaginationClick>, FetchError> {
        let sid = selector.sid();
        let Self { driver, sessions, .. } = self;
        let session = sessions.get_mut(&sid).ok_or(FetchError::NoSession(sid))?;
        if session.in_flight || session.exhausted {
            return Ok(None);
        }
        match selector.next_type {
            NextType::None => {
                session.exhausted = true;
                Ok(None)
            }
            NextType::ScrollForMore => {
                scroll_through_rows(driver, session).await?;
                Ok(None)
            }
            NextType::MoreButton | NextType::NextButton => {
                if matches!(selector.next_type, NextType::MoreButton) {
                    // More buttons routinely live below the loaded rows.
                    scroll_through_rows(driver, session).await?;
                }
                let descriptor =
                    selector.next_button.as_ref().ok_or(FetchError::MissingNextButton)?;
                let page = driver.snapshot().await?;
                match next_button::find_next_button(
                    &page,
                    descriptor,
                    session.prior_next_text.as_deref(),
                ) {
                    Some(button) => {
                        let xpath = page.xpath(button);
                        let text = page.text_content(button).trim().to_string();
                        driver.click(&xpath).await?;
                        session.prior_next_text = Some(text.clone());
                        tracing::debug!(%xpath, %text, "clicked pagination control");
                        Ok(Some(PaginationClick { text }))
                    }
                    None => {
                        tracing::debug!("pagination control not found, session exhausted");
                        session.exhausted = true;
                        Ok(None)
                    }
                }
            }
        }
    }

    /// Reads the current relation and returns the rows not yet handed out,
    /// after waiting out the settle delay.
    pub async fn fresh_items(
        &mut self,
        selector: &Selector,
    ) -> Result<FreshRelationItems, FetchError> {
        let sid = selector.sid();
        {
            let session = self
                .sessions
                .get_mut(&sid)
                .ok_or_else(|| FetchError::NoSession(sid.clone()))?;
            if session.exhausted {
                return Ok(FreshRelationItems::NoMoreItems);
            }
            if session.in_flight {
                return Ok(FreshRelationItems::NoNewItemsYet);
            }
            session.in_flight = true;
        }
        let delay = selector
            .settle_delay_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.config.settle_delay());
        tokio::time::sleep(delay).await;

        let Self { driver, sessions, .. } = self;
        let session = sessions
            .get_mut(&sid)
            .ok_or_else(|| FetchError::NoSession(sid.clone()))?;
        session.in_flight = false;

        for xpath in driver.drain_mutations() {
            session.identity.invalidate_subtree(&xpath);
        }
        let page = driver.snapshot().await?;
        let relation = match extractor::relation_matching(&page, selector) {
            RelationOutcome::Relation(rows) => rows,
            RelationOutcome::NotYet => return Ok(FreshRelationItems::NoNewItemsYet),
            RelationOutcome::Absent => return Err(FetchError::Unsatisfiable),
        };

        let row_tags: Vec<Vec<u64>> = relation
            .iter()
            .map(|row| {
                row.iter()
                    .flatten()
                    .map(|&cell| session.identity.tag(fingerprint(&page, cell)))
                    .collect()
            })
            .collect();
        let row_is_new: Vec<bool> = row_tags
            .iter()
            .map(|tags| tags.iter().any(|t| !session.seen.contains(t)))
            .collect();

        let kept: Vec<usize> = match selector.next_type {
            // A next-style page swap replaces the whole relation; any
            // lingering seen row means the swap has not happened yet.
            NextType::NextButton => {
                if row_is_new.iter().any(|&new| !new) {
                    return Ok(FreshRelationItems::NoNewItemsYet);
                }
                (0..relation.len()).collect()
            }
            NextType::MoreButton | NextType::ScrollForMore => {
                (0..relation.len()).filter(|&i| row_is_new[i]).collect()
            }
            NextType::None => (0..relation.len()).collect(),
        };
        let kept_rows: Vec<Vec<Option<NodeId>>> =
            kept.iter().map(|&i| relation[i].clone()).collect();
        let rep = extractor::to_rep(&page, &kept_rows);

        // A redraw can produce brand-new nodes carrying the exact relation
        // we already handed out.
        if let Some(last) = &session.last_relation
            && relations_equal(last, &rep)
        {
            return Ok(FreshRelationItems::NoNewItemsYet);
        }
        // A grown list re-tagged from scratch is only new past the old
        // prefix.
        let new_items: RelationRep = match &session.last_relation {
            Some(last) if is_row_prefix(last, &rep) => rep[last.len()..].to_vec(),
            _ => rep.clone(),
        };
        if new_items.is_empty() {
            return Ok(FreshRelationItems::NoNewItemsYet);
        }

        for &i in &kept {
            session.seen.extend(row_tags[i].iter().copied());
        }
        session.last_relation = Some(rep);
        if matches!(selector.next_type, NextType::None) {
            // Without pagination there is nothing after the first read.
            session.exhausted = true;
        }
        tracing::debug!(rows = new_items.len(), "fresh relation items");
        Ok(FreshRelationItems::NewItems { relation: new_items })
    }
}

async fn scroll_through_rows<D: PageDriver>(
    driver: &mut D,
    session: &FetchSession,
) -> Result<(), FetchError> {
    let mut scrolled = false;
    if let Some(relation) = &session.last_relation {
        for row in relation {
            for cell in row.iter().flatten() {
                match driver.scroll_into_view(&cell.xpath).await {
                    Ok(()) => scrolled = true,
                    Err(DriverError::NoSuchElement(_)) => {}
                    Err(err) => return Err(err.into()),
                }
            }
        }
    }
    if !scrolled {
        driver.scroll_to_bottom().await?;
    }
    Ok(())
}

fn cell_eq(a: &Option<CellRep>, b: &Option<CellRep>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.text == b.text && a.frame == b.frame,
        _ => false,
    }
}

fn row_eq(a: &[Option<CellRep>], b: &[Option<CellRep>]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| cell_eq(x, y))
}

/// Content equality, ignoring where on the page the cells sit.
fn relations_equal(a: &RelationRep, b: &RelationRep) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| row_eq(x, y))
}

fn is_row_prefix(prefix: &RelationRep, full: &RelationRep) -> bool {
    prefix.len() <= full.len()
        && prefix.iter().zip(full).all(|(x, y)| row_eq(x, y))
}
