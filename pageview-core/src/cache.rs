//! Bounded LRU store of rendered page bitmaps.
//!
//! Rendering happens elsewhere: the cache hands [`RenderRequest`]s to a
//! [`PageRenderer`] and accepts a completion only if it still matches the
//! request currently in flight for that page under the current generation.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use tracing::{debug, trace, warn};

use crate::events::{EventQueue, ViewerEvent};
use crate::geometry::Size;
use crate::{PageRenderer, RenderFailure, RenderImage, RenderRequest};

pub const DEFAULT_CACHE_CAPACITY: usize = 20;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub page_index: usize,
    pub bitmap: Arc<RenderImage>,
    pub size: Size,
}

#[derive(Debug, Clone)]
pub enum PageLookup {
    Ready(Arc<RenderImage>),
    Pending,
}

impl PageLookup {
    pub fn is_ready(&self) -> bool {
        matches!(self, PageLookup::Ready(_))
    }

    pub fn bitmap(&self) -> Option<&Arc<RenderImage>> {
        match self {
            PageLookup::Ready(bitmap) => Some(bitmap),
            PageLookup::Pending => None,
        }
    }
}

pub struct PageCache {
    entries: LruCache<usize, CacheEntry>,
    in_flight: HashMap<usize, RenderRequest>,
    generation: u64,
    renderer: Arc<dyn PageRenderer>,
    events: EventQueue,
}

impl PageCache {
    pub fn new(capacity: NonZeroUsize, renderer: Arc<dyn PageRenderer>, events: EventQueue) -> Self {
        Self {
            entries: LruCache::new(capacity),
            in_flight: HashMap::new(),
            generation: 0,
            renderer,
            events,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    /// Whether a bitmap for `page` is stored, without touching its recency.
    pub fn contains(&self, page: usize) -> bool {
        self.entries.contains(&page)
    }

    pub fn is_pending(&self, page: usize) -> bool {
        self.in_flight.contains_key(&page)
    }

    pub fn pending_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Returns the cached bitmap for `page` if it was rendered at exactly
    /// `target_size`; otherwise makes sure a render at that size is in flight.
    pub fn request_page(&mut self, page: usize, target_size: Size) -> PageLookup {
        if let Some(entry) = self.entries.get(&page) {
            if entry.size == target_size {
                return PageLookup::Ready(Arc::clone(&entry.bitmap));
            }
        }

        if target_size.is_empty() {
            trace!(page, ?target_size, "not rendering empty target");
            return PageLookup::Pending;
        }

        if let Some(existing) = self.in_flight.get(&page) {
            if existing.generation == self.generation && existing.target_size == target_size {
                return PageLookup::Pending;
            }
            debug!(page, ?target_size, "superseding in-flight render");
        }

        let request = RenderRequest {
            page_index: page,
            target_size,
            generation: self.generation,
        };
        self.in_flight.insert(page, request);
        self.renderer.render_page(request);
        PageLookup::Pending
    }

    /// Stores a finished render. Returns `false` when the result was stale and
    /// discarded.
    pub fn on_render_completed(
        &mut self,
        page: usize,
        target_size: Size,
        generation: u64,
        bitmap: RenderImage,
    ) -> bool {
        if !self.take_in_flight(page, target_size, generation) {
            trace!(page, generation, current = self.generation, "discarding stale render");
            return false;
        }

        let entry = CacheEntry {
            page_index: page,
            bitmap: Arc::new(bitmap),
            size: target_size,
        };
        if let Some((evicted, _)) = self.entries.push(page, entry) {
            if evicted != page {
                debug!(evicted, "evicted least recently used page");
            }
        }
        self.events.push(ViewerEvent::PageReady { page });
        true
    }

    /// Records a renderer failure. The page keeps no bitmap; the next
    /// [`PageCache::request_page`] for it issues a fresh request.
    pub fn on_render_failed(&mut self, page: usize, target_size: Size, generation: u64) {
        if self.take_in_flight(page, target_size, generation) {
            warn!(page, ?target_size, "renderer failed to produce page");
        }
    }

    /// Routes a renderer completion to [`Self::on_render_completed`] or
    /// [`Self::on_render_failed`].
    pub fn complete(&mut self, request: RenderRequest, result: Result<RenderImage, RenderFailure>) {
        match result {
            Ok(bitmap) => {
                self.on_render_completed(
                    request.page_index,
                    request.target_size,
                    request.generation,
                    bitmap,
                );
            }
            Err(failure) => {
                trace!(%failure, "render failure reported");
                self.on_render_failed(request.page_index, request.target_size, request.generation);
            }
        }
    }

    /// Makes every outstanding and future-arriving result stale. Cached
    /// bitmaps stay.
    pub fn invalidate(&mut self) {
        self.generation += 1;
        self.in_flight.clear();
        debug!(generation = self.generation, "render generation bumped");
    }

    /// Drops every cached bitmap, for document replacement.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.invalidate();
    }

    fn take_in_flight(&mut self, page: usize, target_size: Size, generation: u64) -> bool {
        if generation != self.generation {
            return false;
        }
        match self.in_flight.get(&page) {
            Some(request)
                if request.generation == generation && request.target_size == target_size =>
            {
                self.in_flight.remove(&page);
                true
            }
            _ => false,
        }
    }
}
