//! Capabilities consumed from the embedding browser engine.
//!
//! The broker never walks the engine's frame tree itself. It resolves frames
//! through [`BrowserEngine`] and talks to pages through [`WebPage`].

use std::fmt;
use std::sync::Arc;

use url::Url;

use crate::FileSystemAccessPermissionRequestManager;
use crate::Origin;

/// Globally unique id of a render frame.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct FrameId {
    pub process_id: i32,
    pub routing_id: i32,
}

impl FrameId {
    pub const fn new(process_id: i32, routing_id: i32) -> Self {
        Self {
            process_id,
            routing_id,
        }
    }
}

pub trait RenderFrame: Send + Sync {
    /// `true` when the frame is in the back/forward cache or prerendering.
    /// Engines are expected to evict or cancel such a frame as a side effect,
    /// because it asked for interactive UI it may never show.
    fn is_inactive_and_disallow_activation(&self) -> bool;

    fn has_transient_user_activation(&self) -> bool;

    /// The page hosting this frame, or `None` for workers and torn down tabs.
    fn page(&self) -> Option<Arc<dyn WebPage>>;
}

pub trait WebPage: Send + Sync {
    fn last_committed_origin(&self) -> Option<Origin>;

    fn request_manager(&self) -> Option<Arc<FileSystemAccessPermissionRequestManager>>;

    /// Leaves fullscreen so the user can see which site is asking. Fullscreen
    /// stays blocked until the returned token is dropped.
    fn drop_fullscreen(&self) -> FullscreenBlock {
        FullscreenBlock::none()
    }
}

pub trait BrowserEngine: Send + Sync {
    fn frame(&self, id: FrameId) -> Option<Arc<dyn RenderFrame>>;

    /// Origins currently committed in every live top-level page.
    fn live_page_origins(&self) -> Vec<Origin>;
}

/// A finished navigation as reported to page observers.
#[derive(Clone, Debug)]
pub struct NavigationInfo {
    pub is_main_frame: bool,
    pub has_committed: bool,
    pub is_same_document: bool,
    pub previous_url: Option<Url>,
    pub url: Url,
}

/// Scoped token; runs its closure once when dropped.
#[must_use]
pub struct FullscreenBlock(Option<Box<dyn FnOnce() + Send + 'static>>);

impl FullscreenBlock {
    pub fn new(on_release: impl FnOnce() + Send + 'static) -> Self {
        Self(Some(Box::new(on_release)))
    }

    pub fn none() -> Self {
        Self(None)
    }
}

impl Drop for FullscreenBlock {
    fn drop(&mut self) {
        if let Some(release) = self.0.take() {
            release();
        }
    }
}

impl fmt::Debug for FullscreenBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FullscreenBlock")
            .field(&self.0.is_some())
            .finish()
    }
}
