//! Page driver abstraction. The engine never holds live element references;
//! everything it learns about the page arrives as a fresh [`PageSnapshot`],
//! and everything it does to the page goes through xpaths.

use async_trait::async_trait;
use relfind_common::dom::PageSnapshot;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("driver failure: {0}")]
    Failure(String),

    #[error("no element at {0}")]
    NoSuchElement(String),
}

#[async_trait]
pub trait PageDriver: Send {
    /// Current snapshot of the page the driver owns.
    async fn snapshot(&mut self) -> Result<PageSnapshot, DriverError>;

    /// Click the element at the given xpath.
    async fn click(&mut self, xpath: &str) -> Result<(), DriverError>;

    /// Scroll the element at the given xpath into view.
    async fn scroll_into_view(&mut self, xpath: &str) -> Result<(), DriverError>;

    /// Scroll the page to its bottom.
    async fn scroll_to_bottom(&mut self) -> Result<(), DriverError>;

    /// XPaths of elements whose subtree changed since the last drain.
    fn drain_mutations(&mut self) -> Vec<String>;
}
