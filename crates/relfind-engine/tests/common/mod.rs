#![allow(dead_code)]

use async_trait::async_trait;
use relfind_engine::backend::{DriverError, PageDriver};
use relfind_engine::dom::PageSnapshot;

/// Scripted driver: serves a fixed sequence of snapshots, records every
/// click and scroll, and only moves to the next snapshot when the test says
/// the page has "changed".
pub struct MockDriver {
    pages: Vec<PageSnapshot>,
    current: usize,
    pub clicks: Vec<String>,
    pub scrolls: Vec<String>,
    pending_mutations: Vec<String>,
}

impl MockDriver {
    pub fn new(pages: Vec<PageSnapshot>) -> Self {
        Self {
            pages,
            current: 0,
            clicks: Vec::new(),
            scrolls: Vec::new(),
            pending_mutations: Vec::new(),
        }
    }

    /// The page finishes loading its next state.
    pub fn advance(&mut self) {
        if self.current + 1 < self.pages.len() {
            self.current += 1;
        }
    }

    pub fn report_mutation(&mut self, xpath: &str) {
        self.pending_mutations.push(xpath.to_string());
    }
}

#[async_trait]
impl PageDriver for MockDriver {
    async fn snapshot(&mut self) -> Result<PageSnapshot, DriverError> {
        self.pages
            .get(self.current)
            .cloned()
            .ok_or_else(|| DriverError::Failure("no page loaded".into()))
    }

    async fn click(&mut self, xpath: &str) -> Result<(), DriverError> {
        self.clicks.push(xpath.to_string());
        Ok(())
    }

    async fn scroll_into_view(&mut self, xpath: &str) -> Result<(), DriverError> {
        self.scrolls.push(xpath.to_string());
        Ok(())
    }

    async fn scroll_to_bottom(&mut self) -> Result<(), DriverError> {
        self.scrolls.push("#bottom".to_string());
        Ok(())
    }

    fn drain_mutations(&mut self) -> Vec<String> {
        std::mem::take(&mut self.pending_mutations)
    }
}
