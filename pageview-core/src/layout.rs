//! Document layout: places every participating page on a single scrollable
//! canvas.
//!
//! [`relayout`] is a pure function of its inputs. Callers recompute the whole
//! [`DocumentLayout`] whenever anything that feeds it changes instead of
//! patching geometries in place.

use std::collections::BTreeMap;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::geometry::{Margins, Rect, Size, SizeF};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PageMode {
    SinglePage,
    #[default]
    MultiPage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ZoomMode {
    #[default]
    Custom,
    FitToWidth,
    FitInView,
}

/// Axis along which pages are stacked in [`PageMode::MultiPage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScrollAxis {
    #[default]
    Vertical,
    Horizontal,
}

impl ScrollAxis {
    fn main(self, size: Size) -> i32 {
        match self {
            ScrollAxis::Vertical => size.height,
            ScrollAxis::Horizontal => size.width,
        }
    }

    fn cross(self, size: Size) -> i32 {
        match self {
            ScrollAxis::Vertical => size.width,
            ScrollAxis::Horizontal => size.height,
        }
    }

    fn compose(self, main: i32, cross: i32) -> Size {
        match self {
            ScrollAxis::Vertical => Size::new(cross, main),
            ScrollAxis::Horizontal => Size::new(main, cross),
        }
    }

    fn place(self, main: i32, cross: i32, size: Size) -> Rect {
        match self {
            ScrollAxis::Vertical => Rect::new(cross, main, size.width, size.height),
            ScrollAxis::Horizontal => Rect::new(main, cross, size.width, size.height),
        }
    }

    fn start(self, rect: &Rect) -> i32 {
        match self {
            ScrollAxis::Vertical => rect.y,
            ScrollAxis::Horizontal => rect.x,
        }
    }

    /// `(main_start, main_end, cross_start, cross_end)`
    fn margins(self, margins: &Margins) -> (i32, i32, i32, i32) {
        match self {
            ScrollAxis::Vertical => (margins.top, margins.bottom, margins.left, margins.right),
            ScrollAxis::Horizontal => (margins.left, margins.right, margins.top, margins.bottom),
        }
    }
}

/// Everything besides the document and the viewport that influences layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewSettings {
    pub page_mode: PageMode,
    pub zoom_mode: ZoomMode,
    pub zoom_factor: f64,
    pub page_spacing: i32,
    pub margins: Margins,
    /// Layout pixels per page point.
    pub screen_resolution: f64,
    pub scroll_axis: ScrollAxis,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            page_mode: PageMode::MultiPage,
            zoom_mode: ZoomMode::Custom,
            zoom_factor: 1.0,
            page_spacing: 3,
            margins: Margins::uniform(6),
            screen_resolution: 96.0 / 72.0,
            scroll_axis: ScrollAxis::Vertical,
        }
    }
}

/// Source of page count and intrinsic page sizes.
pub trait PageSizes {
    fn page_count(&self) -> usize;
    fn page_size(&self, page: usize) -> SizeF;
}

impl PageSizes for [SizeF] {
    fn page_count(&self) -> usize {
        self.len()
    }

    fn page_size(&self, page: usize) -> SizeF {
        self.get(page).copied().unwrap_or_default()
    }
}

impl PageSizes for Vec<SizeF> {
    fn page_count(&self) -> usize {
        self.as_slice().page_count()
    }

    fn page_size(&self, page: usize) -> SizeF {
        self.as_slice().page_size(page)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageGeometry {
    pub page_index: usize,
    pub rect: Rect,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DocumentLayout {
    pub total_size: Size,
    pub geometries: BTreeMap<usize, PageGeometry>,
    pub scroll_axis: ScrollAxis,
}

impl DocumentLayout {
    pub fn is_empty(&self) -> bool {
        self.geometries.is_empty()
    }

    pub fn geometry(&self, page: usize) -> Option<&PageGeometry> {
        self.geometries.get(&page)
    }

    /// Start of `page` along the scroll axis.
    pub fn offset_for_page(&self, page: usize) -> Option<i32> {
        self.geometry(page)
            .map(|geometry| self.scroll_axis.start(&geometry.rect))
    }

    /// Page whose extent contains `offset` along the scroll axis. Offsets in
    /// the gap between two pages resolve to the preceding page, offsets before
    /// the first page to the first page.
    pub fn page_at_offset(&self, offset: i32) -> Option<usize> {
        let mut found = None;
        for (page, geometry) in &self.geometries {
            if found.is_none() || self.scroll_axis.start(&geometry.rect) <= offset {
                found = Some(*page);
            } else {
                break;
            }
        }
        found
    }

    /// Pages intersecting `visible`, in index order.
    pub fn visible_pages(&self, visible: &Rect) -> Vec<usize> {
        self.geometries
            .values()
            .filter(|geometry| geometry.rect.intersects(visible))
            .map(|geometry| geometry.page_index)
            .collect()
    }
}

/// Resolves the effective zoom factor for one page.
///
/// `page` is the page size in layout pixels at factor 1.0 and `usable` the
/// viewport area available to it. Degenerate inputs resolve to `0.0`.
pub fn resolve_zoom(mode: ZoomMode, factor: f64, page: SizeF, usable: SizeF) -> f64 {
    let resolved = match mode {
        ZoomMode::Custom => factor,
        ZoomMode::FitToWidth => {
            if page.width <= 0.0 || usable.width <= 0.0 {
                return 0.0;
            }
            usable.width / page.width
        }
        ZoomMode::FitInView => {
            if page.is_empty() || usable.is_empty() {
                return 0.0;
            }
            (usable.width / page.width).min(usable.height / page.height)
        }
    };
    if resolved.is_finite() && resolved > 0.0 {
        resolved
    } else {
        0.0
    }
}

fn usable_area(settings: &ViewSettings, viewport: Size) -> SizeF {
    let margins = &settings.margins;
    let (width, height) = match (settings.zoom_mode, settings.scroll_axis) {
        (ZoomMode::FitInView, ScrollAxis::Vertical) => (
            viewport.width - margins.horizontal(),
            viewport.height - settings.page_spacing,
        ),
        (ZoomMode::FitInView, ScrollAxis::Horizontal) => (
            viewport.width - settings.page_spacing,
            viewport.height - margins.vertical(),
        ),
        _ => (
            viewport.width - margins.horizontal(),
            viewport.height - margins.vertical(),
        ),
    };
    SizeF::new(f64::from(width), f64::from(height))
}

fn round_extent(value: f64) -> i32 {
    if !value.is_finite() || value <= 0.0 {
        0
    } else {
        value.round().min(f64::from(i32::MAX)) as i32
    }
}

/// `value` as a canvas coordinate, if it fits.
fn canvas_extent(value: i64) -> Option<i32> {
    i32::try_from(value).ok()
}

fn participating_pages(
    page_mode: PageMode,
    page_count: usize,
    current_page: usize,
) -> Range<usize> {
    match page_mode {
        PageMode::SinglePage => {
            let page = current_page.min(page_count - 1);
            page..page + 1
        }
        PageMode::MultiPage => 0..page_count,
    }
}

/// Computes the layout of `pages` inside a viewport of size `viewport`.
///
/// `current_page` selects the page shown in [`PageMode::SinglePage`] and is
/// ignored otherwise.
pub fn relayout<P>(
    pages: &P,
    settings: &ViewSettings,
    viewport: Size,
    current_page: usize,
) -> DocumentLayout
where
    P: PageSizes + ?Sized,
{
    let page_count = pages.page_count();
    if page_count == 0 || viewport.is_empty() {
        return DocumentLayout::default();
    }

    let axis = settings.scroll_axis;
    let usable = usable_area(settings, viewport);
    let range = participating_pages(settings.page_mode, page_count, current_page);

    let mut sizes = Vec::with_capacity(range.len());
    let mut max_cross = 0;
    for page in range {
        let intrinsic = pages.page_size(page);
        let unscaled = SizeF::new(
            intrinsic.width * settings.screen_resolution,
            intrinsic.height * settings.screen_resolution,
        );
        let factor = resolve_zoom(settings.zoom_mode, settings.zoom_factor, unscaled, usable);
        let size = Size::new(
            round_extent(unscaled.width * factor),
            round_extent(unscaled.height * factor),
        );
        max_cross = max_cross.max(axis.cross(size));
        sizes.push((page, size));
    }

    if sizes.iter().all(|(_, size)| size.is_empty()) {
        return DocumentLayout::default();
    }

    let (main_start, main_end, cross_start, cross_end) = axis.margins(&settings.margins);
    let Some(total_cross) =
        canvas_extent(i64::from(max_cross) + i64::from(cross_start) + i64::from(cross_end))
    else {
        debug!(max_cross, "layout wider than the canvas, leaving it empty");
        return DocumentLayout::default();
    };
    let span = total_cross.max(axis.cross(viewport));
    let spacing = i64::from(settings.page_spacing.max(0));

    // Every page must end inside the canvas, so offsets are summed in i64.
    let mut geometries = BTreeMap::new();
    let mut cursor = i64::from(main_start);
    for (index, (page, size)) in sizes.iter().enumerate() {
        if index > 0 {
            cursor += spacing;
        }
        let end = cursor + i64::from(axis.main(*size));
        let (Some(start), Some(_)) = (canvas_extent(cursor), canvas_extent(end)) else {
            debug!(page, "layout longer than the canvas, leaving it empty");
            return DocumentLayout::default();
        };
        let cross = (span - axis.cross(*size)) / 2;
        geometries.insert(
            *page,
            PageGeometry {
                page_index: *page,
                rect: axis.place(start, cross, *size),
            },
        );
        cursor = end;
    }
    let Some(total_main) = canvas_extent(cursor + i64::from(main_end)) else {
        debug!("layout longer than the canvas, leaving it empty");
        return DocumentLayout::default();
    };

    DocumentLayout {
        total_size: axis.compose(total_main, total_cross),
        geometries,
        scroll_axis: axis,
    }
}
