//! Viewport core for a paginated document viewer: page layout, a bounded
//! cache of rendered pages, branching navigation history and a page-indexed
//! search cursor.
//!
//! Rendering and text scanning are performed by external collaborators behind
//! [`PageRenderer`] and [`MatchScanner`]. They report back with
//! [`Completion`]s which the controller feeds into [`Viewer::deliver`] on its
//! own thread.

pub mod cache;
pub mod config;
pub mod events;
pub mod geometry;
pub mod layout;
pub mod navigation;
pub mod search;
pub mod viewer;

use std::sync::Arc;

pub use cache::{CacheEntry, PageCache, PageLookup};
pub use config::{CacheSettings, ConfigError, ViewerConfig};
pub use events::{EventQueue, ViewerEvent};
pub use geometry::{Margins, PointF, Rect, RectF, Size, SizeF};
pub use layout::{
    relayout, resolve_zoom, DocumentLayout, PageGeometry, PageMode, PageSizes, ScrollAxis,
    ViewSettings, ZoomMode,
};
pub use navigation::{Location, NavigationStack};
pub use search::{SearchMatch, SearchModel};
pub use viewer::{Command, Viewer};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// A request to rasterize one page at an exact pixel size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderRequest {
    pub page_index: usize,
    pub target_size: Size,
    pub generation: u64,
}

/// A request to find every occurrence of `query` on one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    pub page_index: usize,
    pub query: Arc<str>,
    pub scan_generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("page {page} could not be rendered: {reason}")]
pub struct RenderFailure {
    pub page: usize,
    pub reason: String,
}

impl RenderFailure {
    pub fn new(page: usize, reason: impl Into<String>) -> Self {
        Self {
            page,
            reason: reason.into(),
        }
    }
}

/// Result of asynchronous work, delivered back on the controller thread.
#[derive(Debug, Clone)]
pub enum Completion {
    Rendered {
        request: RenderRequest,
        result: Result<RenderImage, RenderFailure>,
    },
    Scanned {
        page_index: usize,
        scan_generation: u64,
        matches: Vec<SearchMatch>,
    },
}

/// Rasterizes pages asynchronously. Must return immediately; the outcome is
/// reported later as a [`Completion::Rendered`].
pub trait PageRenderer: Send + Sync {
    fn render_page(&self, request: RenderRequest);
}

/// Finds text matches asynchronously. Must return immediately; the outcome is
/// reported later as a [`Completion::Scanned`].
pub trait MatchScanner: Send + Sync {
    fn scan_page(&self, request: ScanRequest);

    /// Hint that scans older than `current_generation` are no longer wanted.
    /// Their results are discarded on arrival either way.
    fn cancel_scans(&self, _current_generation: u64) {}
}
