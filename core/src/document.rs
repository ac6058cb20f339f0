use async_trait::async_trait;

use crate::error::Result;

/// The hosting page, as seen by the selector and the watcher.
///
/// Implementations wrap a live, asynchronously mutating DOM. Handles may go
/// stale between a query and their use; methods taking a handle should fail
/// with [`crate::QualityError::Document`] rather than panic when that happens.
#[async_trait]
pub trait Document: Send + Sync {
    type Handle: Send + Sync;

    /// First element matching `selector`, if any.
    async fn query_selector(&self, selector: &str) -> Result<Option<Self::Handle>>;

    /// Every element matching `selector`, in document order.
    async fn query_selector_all(&self, selector: &str) -> Result<Vec<Self::Handle>>;

    async fn text_content(&self, handle: &Self::Handle) -> Result<Option<String>>;

    /// Text of the first `selector` match inside the handle's parent element.
    /// Radio inputs carry their caption in a sibling `<label>`.
    async fn sibling_text(&self, handle: &Self::Handle, selector: &str)
    -> Result<Option<String>>;

    /// Simulated activation of the element.
    async fn click(&self, handle: &Self::Handle) -> Result<()>;

    /// Marks a checkable input as checked, then clicks it.
    async fn check(&self, handle: &Self::Handle) -> Result<()>;
}
