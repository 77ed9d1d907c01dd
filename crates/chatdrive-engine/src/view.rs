use async_trait::async_trait;
pub use chatdrive_common::error::ViewError;
use chatdrive_common::protocol::{Descriptor, Element};
use std::path::Path;

#[derive(Debug, Clone)]
pub struct NavigationResult {
    pub url: String,
    pub title: String,
}

/// A live document the engine can observe and act on.
///
/// Implementations own the browser connection; the engine only borrows the view
/// for the duration of one operation. Element ids returned by `query` stay valid
/// until the node is detached, after which element-level calls fail with
/// `ViewError::ElementStale`.
#[async_trait]
pub trait DocumentView: Send + Sync {
    /// All live elements matching a descriptor, in document order.
    async fn query(&mut self, descriptor: &Descriptor) -> Result<Vec<Element>, ViewError>;

    /// Fresh snapshot of a previously returned element, `None` once detached.
    async fn inspect(&mut self, id: u32) -> Result<Option<Element>, ViewError>;

    async fn click(&mut self, id: u32) -> Result<(), ViewError>;

    /// Replace the element's text or value, firing input events.
    async fn set_text(&mut self, id: u32, text: &str) -> Result<(), ViewError>;

    /// Attach a local file to a file input.
    async fn upload(&mut self, _id: u32, _path: &Path) -> Result<(), ViewError> {
        Err(ViewError::NotSupported("upload".into()))
    }

    /// Press a named key (e.g. "Enter") with the element focused.
    async fn press_key(&mut self, _id: u32, _key: &str) -> Result<(), ViewError> {
        Err(ViewError::NotSupported("press_key".into()))
    }

    async fn text_of(&mut self, id: u32) -> Result<String, ViewError> {
        match self.inspect(id).await? {
            Some(el) => Ok(el.text),
            None => Err(ViewError::ElementStale { id }),
        }
    }

    /// Whether the document is still loading. Only used for diagnostics.
    async fn is_loading(&mut self) -> Result<bool, ViewError> {
        Ok(false)
    }

    /// Cheap liveness check of the underlying connection.
    async fn is_reachable(&mut self) -> bool;

    async fn navigate(&mut self, _url: &str) -> Result<NavigationResult, ViewError> {
        Err(ViewError::NotSupported("navigate".into()))
    }

    async fn reload(&mut self) -> Result<(), ViewError> {
        Err(ViewError::NotSupported("reload".into()))
    }

    /// Re-attach to the browser after the connection dropped.
    async fn reconnect(&mut self) -> Result<(), ViewError> {
        Err(ViewError::NotSupported("reconnect".into()))
    }

    /// Release the connection. Views that do not own a browser do nothing.
    async fn close(&mut self) -> Result<(), ViewError> {
        Ok(())
    }
}
