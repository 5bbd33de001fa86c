use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::cache::{PageCache, PageLookup};
use crate::config::ViewerConfig;
use crate::events::{EventQueue, ViewerEvent};
use crate::geometry::{Margins, PointF, Rect, Size, SizeF};
use crate::layout::{self, DocumentLayout, PageMode, ScrollAxis, ViewSettings, ZoomMode};
use crate::navigation::NavigationStack;
use crate::search::SearchModel;
use crate::{Completion, MatchScanner, PageRenderer};

#[derive(Debug, Clone)]
pub enum Command {
    SetPageMode { mode: PageMode },
    SetZoomMode { mode: ZoomMode },
    SetZoomFactor { factor: f64 },
    SetPageSpacing { spacing: i32 },
    SetMargins { margins: Margins },
    Resize { size: Size },
    GoToPage { page: usize },
    Back,
    Forward,
    ScrollTo { offset: i32 },
    Search { query: String },
    NextResult,
    PreviousResult,
    ReplaceDocument { pages: Vec<SizeF> },
}

/// One open document in a viewport: owns the layout, the page cache, the
/// navigation history and the search index, and keeps them consistent.
pub struct Viewer {
    pages: Vec<SizeF>,
    settings: ViewSettings,
    viewport: Size,
    layout: DocumentLayout,
    cache: PageCache,
    navigation: NavigationStack,
    search: SearchModel,
    events: EventQueue,
}

impl Viewer {
    pub fn new(
        config: &ViewerConfig,
        pages: Vec<SizeF>,
        renderer: Arc<dyn PageRenderer>,
        scanner: Arc<dyn MatchScanner>,
    ) -> Self {
        let events = EventQueue::new();
        let cache = PageCache::new(config.cache_capacity(), renderer, events.clone());
        let navigation = NavigationStack::new(events.clone());
        let search = SearchModel::new(pages.len(), scanner, events.clone());
        let mut viewer = Self {
            pages,
            settings: config.view.clone(),
            viewport: Size::default(),
            layout: DocumentLayout::default(),
            cache,
            navigation,
            search,
            events,
        };
        viewer.seed_navigation();
        viewer
    }

    pub fn events(&self) -> EventQueue {
        self.events.clone()
    }

    pub fn layout(&self) -> &DocumentLayout {
        &self.layout
    }

    pub fn settings(&self) -> &ViewSettings {
        &self.settings
    }

    pub fn viewport(&self) -> Size {
        self.viewport
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn cache(&self) -> &PageCache {
        &self.cache
    }

    pub fn navigation(&self) -> &NavigationStack {
        &self.navigation
    }

    pub fn search(&self) -> &SearchModel {
        &self.search
    }

    pub fn current_page(&self) -> usize {
        self.navigation.current_page().unwrap_or(0)
    }

    #[instrument(skip(self))]
    pub fn apply(&mut self, command: Command) {
        match command {
            Command::SetPageMode { mode } => {
                if self.settings.page_mode != mode {
                    self.settings.page_mode = mode;
                    self.relayout();
                }
            }
            Command::SetZoomMode { mode } => {
                if self.settings.zoom_mode != mode {
                    self.settings.zoom_mode = mode;
                    self.relayout();
                }
            }
            Command::SetZoomFactor { factor } => {
                if !(factor.is_finite() && factor > 0.0) {
                    warn!(factor, "ignoring invalid zoom factor");
                    return;
                }
                if (self.settings.zoom_factor - factor).abs() > f64::EPSILON {
                    self.settings.zoom_factor = factor;
                    self.relayout();
                }
            }
            Command::SetPageSpacing { spacing } => {
                let spacing = spacing.max(0);
                if self.settings.page_spacing != spacing {
                    self.settings.page_spacing = spacing;
                    self.relayout();
                }
            }
            Command::SetMargins { margins } => {
                if self.settings.margins != margins {
                    self.settings.margins = margins;
                    self.relayout();
                }
            }
            Command::Resize { size } => {
                if self.viewport != size {
                    self.viewport = size;
                    self.relayout();
                }
            }
            Command::GoToPage { page } => {
                if self.pages.is_empty() {
                    return;
                }
                let page = page.min(self.pages.len() - 1);
                self.navigation
                    .jump(page, PointF::default(), self.settings.zoom_factor, true);
                self.relayout();
            }
            Command::Back => {
                self.navigation.back();
                self.follow_navigation();
            }
            Command::Forward => {
                self.navigation.forward();
                self.follow_navigation();
            }
            Command::ScrollTo { offset } => self.track_scroll(offset),
            Command::Search { query } => {
                self.search.set_current_page(self.current_page() as isize);
                self.search.set_search_string(query);
            }
            Command::NextResult => {
                self.search.next_result();
                self.reveal_current_result();
            }
            Command::PreviousResult => {
                self.search.previous_result();
                self.reveal_current_result();
            }
            Command::ReplaceDocument { pages } => {
                debug!(page_count = pages.len(), "replacing document");
                self.pages = pages;
                self.cache.clear();
                self.navigation.clear();
                self.search.set_page_count(self.pages.len());
                self.seed_navigation();
                self.relayout();
            }
        }
    }

    /// Requests a bitmap for every page intersecting `visible`, at the size
    /// the current layout gives it.
    pub fn request_visible(&mut self, visible: Rect) -> Vec<(usize, PageLookup)> {
        let mut lookups = Vec::new();
        for page in self.layout.visible_pages(&visible) {
            if let Some(geometry) = self.layout.geometry(page) {
                let size = geometry.rect.size();
                lookups.push((page, self.cache.request_page(page, size)));
            }
        }
        lookups
    }

    pub fn deliver(&mut self, completion: Completion) {
        match completion {
            Completion::Rendered { request, result } => self.cache.complete(request, result),
            Completion::Scanned {
                page_index,
                scan_generation,
                matches,
            } => {
                self.search
                    .on_page_scanned(page_index, scan_generation, matches);
            }
        }
    }

    fn seed_navigation(&mut self) {
        if !self.pages.is_empty() && self.navigation.is_empty() {
            self.navigation
                .jump(0, PointF::default(), self.settings.zoom_factor, false);
        }
    }

    fn follow_navigation(&mut self) {
        if let Some(location) = self.navigation.current() {
            let zoom = location.zoom;
            if self.settings.zoom_mode == ZoomMode::Custom
                && zoom.is_finite()
                && zoom > 0.0
                && (self.settings.zoom_factor - zoom).abs() > f64::EPSILON
            {
                self.settings.zoom_factor = zoom;
            }
        }
        self.relayout();
    }

    fn track_scroll(&mut self, offset: i32) {
        let Some(page) = self.layout.page_at_offset(offset) else {
            return;
        };
        let start = self.layout.offset_for_page(page).unwrap_or(0);
        let delta = f64::from(offset) - f64::from(start);
        let position = match self.layout.scroll_axis {
            ScrollAxis::Vertical => PointF::new(0.0, delta),
            ScrollAxis::Horizontal => PointF::new(delta, 0.0),
        };
        self.navigation
            .update(page, position, self.settings.zoom_factor);
        if self.settings.page_mode == PageMode::SinglePage {
            self.relayout();
        }
    }

    fn reveal_current_result(&mut self) {
        let Some(rect) = self.search.current_result_bounding_rect() else {
            return;
        };
        let page = self.search.current_page();
        let scale = self.page_scale(page);
        let position = PointF::new(rect.x * scale, rect.y * scale);
        let already_there = self
            .navigation
            .current()
            .is_some_and(|location| location.page == page && location.position == position);
        if !already_there {
            self.navigation
                .jump(page, position, self.settings.zoom_factor, true);
            self.relayout();
        }
    }

    /// Layout pixels per page point for `page` in the current layout.
    fn page_scale(&self, page: usize) -> f64 {
        let intrinsic = self.pages.get(page).copied().unwrap_or_default();
        match self.layout.geometry(page) {
            Some(geometry) if intrinsic.width > 0.0 => {
                f64::from(geometry.rect.width) / intrinsic.width
            }
            _ => self.settings.screen_resolution * self.settings.zoom_factor,
        }
    }

    fn relayout(&mut self) {
        let layout = layout::relayout(
            &self.pages,
            &self.settings,
            self.viewport,
            self.current_page(),
        );
        if layout == self.layout {
            return;
        }
        if target_sizes_changed(&self.layout, &layout) {
            self.cache.invalidate();
        }
        self.layout = layout;
        self.events.push(ViewerEvent::LayoutInvalidated);
    }
}

fn target_sizes_changed(old: &DocumentLayout, new: &DocumentLayout) -> bool {
    old.geometries.len() != new.geometries.len()
        || old
            .geometries
            .iter()
            .zip(new.geometries.iter())
            .any(|((old_page, old_geometry), (new_page, new_geometry))| {
                old_page != new_page || old_geometry.rect.size() != new_geometry.rect.size()
            })
}
