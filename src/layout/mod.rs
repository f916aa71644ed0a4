//! Page layout state machines
//!
//! A layout owns the geometry of every page for the current zoom and
//! viewport, tracks which pages are visible and which one has focus, and
//! answers navigation and zoom requests. Layouts are components: they react
//! to `resize`, `scroll` and page status messages broadcast over the scope and
//! announce `zoom` and `pagefocus` changes in return.

mod paged;
mod presentation;
mod presentation_two_page;
mod text;
mod vertical;
mod vertical_single_column;

use serde::Serialize;

use crate::config::LayoutMode;
use crate::message::{Message, PageFocus};
use crate::scope::Scope;
use crate::types::{Padding, PageSize, ScrollPosition, Viewport};
use crate::zoom::{ZoomDirection, ZoomMode, ZoomRequest, ZoomState, approx_eq};

pub use paged::{Fits, PagedGeometry, PagedLayout};
pub use presentation::PresentationLayout;
pub use presentation_two_page::PresentationTwoPageLayout;
pub use text::TextLayout;
pub use vertical::VerticalLayout;
pub use vertical_single_column::VerticalSingleColumnLayout;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PageStatus {
    NotLoaded,
    Loading,
    Loaded,
    Failed,
    /// Not converted yet
    Unavailable,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayoutPhase {
    #[default]
    Uninitialized,
    Initialized,
    Destroyed,
}

/// Geometry of one page. `x0`/`y0` locate the padded box.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Page {
    /// 1-based
    pub index: usize,
    pub width: f64,
    pub height: f64,
    pub actual_width: f64,
    pub actual_height: f64,
    pub padding: Padding,
    pub x0: f64,
    pub y0: f64,
    pub status: PageStatus,
}

impl Page {
    #[must_use]
    pub fn new(index: usize, size: PageSize, padding: Padding, status: PageStatus) -> Self {
        Self {
            index,
            width: size.width,
            height: size.height,
            actual_width: size.width,
            actual_height: size.height,
            padding,
            x0: 0.0,
            y0: 0.0,
            status,
        }
    }

    pub fn scale(&mut self, zoom: f64) {
        self.actual_width = self.width * zoom;
        self.actual_height = self.height * zoom;
    }

    #[must_use]
    pub fn outer_width(&self) -> f64 {
        self.actual_width + self.padding.horizontal()
    }

    #[must_use]
    pub fn outer_height(&self) -> f64 {
        self.actual_height + self.padding.vertical()
    }

    /// Scaled page without padding: `(left, top, right, bottom)`
    #[must_use]
    pub fn content_rect(&self) -> (f64, f64, f64, f64) {
        let left = self.x0 + self.padding.left;
        let top = self.y0 + self.padding.top;
        (left, top, left + self.actual_width, top + self.actual_height)
    }

    /// Whether the page has been requested or shown
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.status != PageStatus::Unavailable
    }
}

/// Observable state of a layout
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct LayoutState {
    pub current_page: usize,
    pub zoom_state: ZoomState,
    /// Discrete levels `in`/`out` step through
    pub zoom_levels: Vec<f64>,
    pub pages: Vec<Page>,
    pub viewport: Viewport,
    pub scroll: ScrollPosition,
    pub visible_pages: Vec<usize>,
    pub fully_visible_pages: Vec<usize>,
    pub latest_available_page: usize,
    /// Size of the laid out document
    pub document_width: f64,
    pub document_height: f64,
    pub phase: LayoutPhase,
}

impl LayoutState {
    #[must_use]
    pub fn num_pages(&self) -> usize {
        self.pages.len()
    }

    #[must_use]
    pub fn page(&self, index: usize) -> Option<&Page> {
        index.checked_sub(1).and_then(|i| self.pages.get(i))
    }

    pub fn page_mut(&mut self, index: usize) -> Option<&mut Page> {
        index.checked_sub(1).and_then(|i| self.pages.get_mut(i))
    }

    #[must_use]
    pub fn focus(&self) -> PageFocus {
        PageFocus {
            page: self.current_page,
            num_pages: self.num_pages(),
            visible_pages: self.visible_pages.clone(),
            fully_visible_pages: self.fully_visible_pages.clone(),
        }
    }

    /// Clamp `page` into `[1, latest_available_page]`
    #[must_use]
    pub fn clamp_page(&self, page: usize) -> usize {
        page.clamp(1, self.latest_available_page.max(1))
    }
}

/// Zoom resolution and application
pub trait ZoomController {
    /// Zoom factor the named mode resolves to right now
    fn calculate_zoom_value(&self, mode: ZoomMode) -> f64;

    fn calculate_zoom_auto_value(&self) -> f64;

    /// Next discrete level beyond the current zoom, if any
    fn calculate_next_zoom_level(&self, direction: ZoomDirection) -> Option<f64>;

    /// Apply `request` and reposition pages.
    ///
    /// Returns false when the request could not be resolved (stepping past
    /// the last level). Nothing is broadcast.
    fn set_zoom(&mut self, request: ZoomRequest) -> bool;
}

/// Page focus and navigation
pub trait PageNavigator {
    fn current_page(&self) -> usize;

    /// Recompute the focused page from the scroll position.
    ///
    /// Returns true if it changed.
    fn update_current_page(&mut self) -> bool;

    fn calculate_previous_page(&self) -> usize;

    fn calculate_next_page(&self) -> usize;

    /// Focus `page` (clamped) and scroll it into view; returns the page
    fn scroll_to_page(&mut self, page: usize) -> usize;
}

pub trait Layout: ZoomController + PageNavigator {
    fn mode(&self) -> LayoutMode;

    fn state(&self) -> &LayoutState;

    fn handle_resize(&mut self, viewport: Viewport);

    fn handle_scroll(&mut self, scroll: ScrollPosition);

    fn handle_page_status(&mut self, page: usize, status: PageStatus);

    /// Pages up to `page` have been converted
    fn set_latest_available_page(&mut self, page: usize);
}

fn zoom_changed(before: &ZoomState, after: &ZoomState) -> bool {
    !approx_eq(before.zoom, after.zoom)
        || before.zoom_mode != after.zoom_mode
        || before.can_zoom_in != after.can_zoom_in
        || before.can_zoom_out != after.can_zoom_out
}

/// Route a scope message into `layout`, announcing zoom and focus changes
pub fn handle_layout_message(layout: &mut dyn Layout, scope: &Scope, message: &Message) {
    if layout.state().phase != LayoutPhase::Initialized {
        return;
    }
    let zoom_before = layout.state().zoom_state.clone();
    let focus_before = layout.state().focus();

    match message {
        Message::Resize(viewport) => layout.handle_resize(*viewport),
        Message::Scroll(scroll) => layout.handle_scroll(*scroll),
        Message::PageLoad { page } => layout.handle_page_status(*page, PageStatus::Loaded),
        Message::PageFail { page, .. } => layout.handle_page_status(*page, PageStatus::Failed),
        Message::PageUnload { page } => layout.handle_page_status(*page, PageStatus::NotLoaded),
        Message::PageAvailable { upto } => layout.set_latest_available_page(*upto),
        _ => return,
    }

    let zoom = layout.state().zoom_state.clone();
    if zoom_changed(&zoom_before, &zoom) {
        scope.broadcast(Message::Zoom(zoom));
    }
    let focus = layout.state().focus();
    if focus != focus_before {
        scope.broadcast(Message::PageFocus(focus));
    }
}
