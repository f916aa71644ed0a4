//! Base of every layout: page list, zoom bookkeeping and navigation
//!
//! Concrete layouts own a [`PagedLayout`] and implement [`PagedGeometry`]
//! to say how pages are placed. Zoom, navigation and message handling are
//! shared and provided for every geometry.

use log::{debug, warn};

use crate::config::{Config, LayoutMode, SharedConfig};
use crate::error::FrameworkError;
use crate::framework::Component;
use crate::scope::Scope;
use crate::types::{Padding, PageSize, ScrollPosition, Viewport};
use crate::zoom::{
    DEFAULT_ZOOM_LEVELS, ZOOM_EPSILON, ZoomDirection, ZoomMode, ZoomRequest, approx_eq,
    merge_zoom_levels, next_zoom_level,
};

use super::{
    Layout, LayoutPhase, LayoutState, Page, PageNavigator, PageStatus, ZoomController,
};

/// Zoom factors derived from the viewport
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Fits {
    pub width: f64,
    pub height: f64,
    pub auto: f64,
}

impl Fits {
    pub const UNIT: Fits = Fits {
        width: 1.0,
        height: 1.0,
        auto: 1.0,
    };

    #[must_use]
    pub fn value(&self, mode: ZoomMode) -> f64 {
        match mode {
            ZoomMode::Auto => self.auto,
            ZoomMode::FitWidth => self.width,
            ZoomMode::FitHeight => self.height,
        }
    }
}

#[derive(Default)]
pub struct PagedLayout {
    pub(crate) state: LayoutState,
    config: Option<SharedConfig>,
    configured_levels: Vec<f64>,
    configured_min: Option<f64>,
    configured_max: Option<f64>,
    padding: Padding,
    max_page_size: Option<PageSize>,
    mobile: bool,
}

impl PagedLayout {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read metadata, viewport, zoom bounds and the initial page from config
    pub fn init(&mut self, scope: &Scope) -> Result<(), FrameworkError> {
        let config = scope.config();
        let metadata = config.metadata.as_ref().ok_or_else(|| {
            FrameworkError::init("layout-paged", "document metadata has not been loaded")
        })?;

        let num_pages = metadata.numpages;
        let latest = if config.conversion_is_complete {
            num_pages
        } else {
            1
        };
        let padding = config.page_padding;
        self.state.pages = (1..=num_pages)
            .map(|index| {
                let status = if index <= latest {
                    PageStatus::NotLoaded
                } else {
                    PageStatus::Unavailable
                };
                Page::new(index, metadata.page_size(index), padding, status)
            })
            .collect();
        self.state.latest_available_page = latest;
        self.state.viewport = config.viewport;
        self.state.current_page = self.state.clamp_page(config.page);

        self.padding = padding;
        self.max_page_size = Some(metadata.max_page_size());
        self.mobile = config.capabilities.mobile;
        self.configured_levels = config.sorted_zoom_levels();
        self.configured_min = config.min_zoom;
        self.configured_max = config.max_zoom;
        drop(config);

        self.config = Some(scope.shared_config());
        self.state.phase = LayoutPhase::Initialized;
        debug!(
            "Paged layout initialised with {num_pages} pages, {latest} available, page {}",
            self.state.current_page
        );
        Ok(())
    }

    pub fn destroy(&mut self) {
        self.state.phase = LayoutPhase::Destroyed;
        self.state.visible_pages.clear();
        self.state.fully_visible_pages.clear();
        self.config = None;
    }

    #[must_use]
    pub fn state(&self) -> &LayoutState {
        &self.state
    }

    #[must_use]
    pub fn padding(&self) -> Padding {
        self.padding
    }

    /// Widest page width and tallest page height, unscaled
    #[must_use]
    pub fn max_page_size(&self) -> PageSize {
        self.max_page_size.unwrap_or(PageSize::new(0.0, 0.0))
    }

    #[must_use]
    pub fn is_landscape(&self) -> bool {
        let size = self.max_page_size();
        size.width > size.height
    }

    #[must_use]
    pub fn is_mobile(&self) -> bool {
        self.mobile
    }

    /// Rebuild the discrete zoom levels around the current viewport presets
    pub fn update_zoom_levels(&mut self, fits: Fits) {
        let merged = merge_zoom_levels(
            &self.configured_levels,
            &[fits.width, fits.height, fits.auto],
        );
        let min = self
            .configured_min
            .or_else(|| merged.first().copied())
            .unwrap_or(DEFAULT_ZOOM_LEVELS[0]);
        let max = self
            .configured_max
            .or_else(|| merged.last().copied())
            .unwrap_or(DEFAULT_ZOOM_LEVELS[DEFAULT_ZOOM_LEVELS.len() - 1])
            .max(min);

        let zoom_state = &mut self.state.zoom_state;
        zoom_state.min_zoom = min;
        zoom_state.max_zoom = max;
        self.state.zoom_levels = merged
            .into_iter()
            .filter(|level| *level >= min - ZOOM_EPSILON && *level <= max + ZOOM_EPSILON)
            .collect();
        self.refresh_zoom_flags();
    }

    fn refresh_zoom_flags(&mut self) {
        let zoom = self.state.zoom_state.zoom;
        let levels = &self.state.zoom_levels;
        self.state.zoom_state.can_zoom_in =
            next_zoom_level(levels, zoom, ZoomDirection::In).is_some();
        self.state.zoom_state.can_zoom_out =
            next_zoom_level(levels, zoom, ZoomDirection::Out).is_some();
    }

    /// Clamp and apply `target`, scaling every page
    pub fn apply_zoom(&mut self, target: f64, fits: Fits, requested: Option<ZoomMode>) {
        let zoom = self.state.zoom_state.clamp(target);
        let mode = zoom_mode_for(zoom, fits, requested);

        let zoom_state = &mut self.state.zoom_state;
        zoom_state.prev_zoom = zoom_state.zoom;
        zoom_state.zoom = zoom;
        zoom_state.zoom_mode = mode;
        self.refresh_zoom_flags();

        for page in &mut self.state.pages {
            page.scale(zoom);
        }

        let request = match mode {
            Some(mode) => ZoomRequest::Mode(mode),
            None => ZoomRequest::Value(zoom),
        };
        self.write_config(|config| config.zoom = request);
    }

    pub fn set_current_page(&mut self, page: usize) {
        self.state.current_page = page;
        self.write_config(|config| config.page = page);
    }

    pub fn set_visibility(&mut self, visible: Vec<usize>, fully_visible: Vec<usize>) {
        self.state.visible_pages = visible;
        self.state.fully_visible_pages = fully_visible;
    }

    /// Mark pages up to `page` as converted; never shrinks
    pub fn set_latest_available_page(&mut self, page: usize) {
        let page = page.min(self.state.num_pages());
        let latest = self.state.latest_available_page;
        if page <= latest {
            return;
        }
        for index in latest + 1..=page {
            if let Some(page) = self.state.page_mut(index) {
                if page.status == PageStatus::Unavailable {
                    page.status = PageStatus::NotLoaded;
                }
            }
        }
        debug!("Pages up to {page} are now available");
        self.state.latest_available_page = page;
    }

    /// Pages among `candidates` overlapping the viewport, and those inside it
    #[must_use]
    pub fn pages_in_view(
        &self,
        candidates: impl IntoIterator<Item = usize>,
    ) -> (Vec<usize>, Vec<usize>) {
        let Viewport { width, height } = self.state.viewport;
        let ScrollPosition { top, left } = self.state.scroll;
        let (view_right, view_bottom) = (left + width, top + height);

        let mut visible = Vec::new();
        let mut fully_visible = Vec::new();
        for index in candidates {
            let Some(page) = self.state.page(index) else {
                continue;
            };
            let (x0, y0, x1, y1) = page.content_rect();
            let overlaps = x0 < view_right && x1 > left && y0 < view_bottom && y1 > top;
            if !overlaps {
                continue;
            }
            visible.push(index);
            if x0 >= left - ZOOM_EPSILON
                && x1 <= view_right + ZOOM_EPSILON
                && y0 >= top - ZOOM_EPSILON
                && y1 <= view_bottom + ZOOM_EPSILON
            {
                fully_visible.push(index);
            }
        }
        (visible, fully_visible)
    }

    fn write_config(&self, update: impl FnOnce(&mut Config)) {
        let Some(config) = &self.config else {
            return;
        };
        match config.try_borrow_mut() {
            Ok(mut config) => update(&mut config),
            Err(_) => warn!("Configuration is borrowed elsewhere; layout state not written back"),
        }
    }
}

fn zoom_mode_for(zoom: f64, fits: Fits, requested: Option<ZoomMode>) -> Option<ZoomMode> {
    let lands_on = |mode: &ZoomMode| approx_eq(fits.value(*mode), zoom);
    requested.filter(lands_on).or_else(|| {
        [ZoomMode::Auto, ZoomMode::FitWidth, ZoomMode::FitHeight]
            .into_iter()
            .find(lands_on)
    })
}

impl Component for PagedLayout {
    fn init(&mut self, scope: &Scope) -> Result<(), FrameworkError> {
        PagedLayout::init(self, scope)
    }

    fn destroy(&mut self) {
        PagedLayout::destroy(self);
    }
}

/// Page placement strategy of a concrete layout
pub trait PagedGeometry {
    fn layout_mode(&self) -> LayoutMode;

    fn paged(&self) -> &PagedLayout;

    fn paged_mut(&mut self) -> &mut PagedLayout;

    fn fits(&self) -> Fits;

    /// Position every page for the current zoom, viewport and page
    fn arrange(&mut self);

    /// Page focused by the current scroll position, or `None` when scrolling
    /// never moves focus
    fn page_at_scroll(&self) -> Option<usize>;

    /// Scroll position that shows `page`; may rearrange pages
    fn position_for_page(&mut self, page: usize) -> ScrollPosition;

    /// `(visible, fully_visible)` pages
    fn visible_pages(&self) -> (Vec<usize>, Vec<usize>);

    /// Pages advanced by next/previous
    fn page_step(&self) -> usize {
        1
    }
}

/// Shared init: base state, zoom levels, configured zoom, initial page
pub(crate) fn init_layout<T: PagedGeometry>(
    layout: &mut T,
    scope: &Scope,
) -> Result<(), FrameworkError> {
    layout.paged_mut().init(scope)?;

    let fits = layout.fits();
    layout.paged_mut().update_zoom_levels(fits);
    let request = scope.config().zoom;
    if !layout.set_zoom(request) {
        layout.set_zoom(ZoomRequest::Value(1.0));
    }
    let page = layout.paged().state.current_page;
    layout.scroll_to_page(page);

    let state = &layout.paged().state;
    debug!(
        "{} layout ready: zoom {:.3}, page {}, visible {:?}",
        layout.layout_mode().as_str(),
        state.zoom_state.zoom,
        state.current_page,
        state.visible_pages
    );
    Ok(())
}

fn refresh_visibility<T: PagedGeometry>(layout: &mut T) {
    let (visible, fully_visible) = layout.visible_pages();
    layout.paged_mut().set_visibility(visible, fully_visible);
}

impl<T: PagedGeometry> ZoomController for T {
    fn calculate_zoom_value(&self, mode: ZoomMode) -> f64 {
        self.fits().value(mode)
    }

    fn calculate_zoom_auto_value(&self) -> f64 {
        self.fits().auto
    }

    fn calculate_next_zoom_level(&self, direction: ZoomDirection) -> Option<f64> {
        let state = &self.paged().state;
        next_zoom_level(&state.zoom_levels, state.zoom_state.zoom, direction)
    }

    fn set_zoom(&mut self, request: ZoomRequest) -> bool {
        let fits = self.fits();
        let (target, requested) = match request {
            ZoomRequest::Value(value) => (value, None),
            ZoomRequest::Mode(mode) => (fits.value(mode), Some(mode)),
            ZoomRequest::Step(direction) => match self.calculate_next_zoom_level(direction) {
                Some(level) => (level, None),
                None => return false,
            },
        };
        self.paged_mut().apply_zoom(target, fits, requested);
        self.arrange();
        self.update_current_page();
        true
    }
}

impl<T: PagedGeometry> PageNavigator for T {
    fn current_page(&self) -> usize {
        self.paged().state.current_page
    }

    fn update_current_page(&mut self) -> bool {
        let before = self.paged().state.current_page;
        if let Some(page) = self.page_at_scroll() {
            let page = self.paged().state.clamp_page(page);
            if page != before {
                self.paged_mut().set_current_page(page);
            }
        }
        refresh_visibility(self);
        self.paged().state.current_page != before
    }

    fn calculate_previous_page(&self) -> usize {
        let state = &self.paged().state;
        state.clamp_page(state.current_page.saturating_sub(self.page_step()))
    }

    fn calculate_next_page(&self) -> usize {
        let state = &self.paged().state;
        state.clamp_page(state.current_page + self.page_step())
    }

    fn scroll_to_page(&mut self, page: usize) -> usize {
        let page = self.paged().state.clamp_page(page);
        self.paged_mut().set_current_page(page);
        let scroll = self.position_for_page(page);
        self.paged_mut().state.scroll = scroll;
        refresh_visibility(self);
        page
    }
}

impl<T: PagedGeometry> Layout for T {
    fn mode(&self) -> LayoutMode {
        self.layout_mode()
    }

    fn state(&self) -> &LayoutState {
        &self.paged().state
    }

    fn handle_resize(&mut self, viewport: Viewport) {
        self.paged_mut().state.viewport = viewport;
        let fits = self.fits();
        self.paged_mut().update_zoom_levels(fits);

        // Named modes follow the viewport; explicit factors are only re-clamped
        let zoom_state = &self.paged().state.zoom_state;
        let request = match zoom_state.zoom_mode {
            Some(mode) => ZoomRequest::Mode(mode),
            None => ZoomRequest::Value(zoom_state.zoom),
        };
        self.set_zoom(request);
    }

    fn handle_scroll(&mut self, scroll: ScrollPosition) {
        self.paged_mut().state.scroll = scroll;
        self.update_current_page();
    }

    fn handle_page_status(&mut self, page: usize, status: PageStatus) {
        match self.paged_mut().state.page_mut(page) {
            Some(entry) => entry.status = status,
            None => debug!("Ignoring status {status:?} for unknown page {page}"),
        }
    }

    fn set_latest_available_page(&mut self, page: usize) {
        self.paged_mut().set_latest_available_page(page);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zoom_mode_prefers_requested_mode() {
        let fits = Fits {
            width: 0.8,
            height: 0.5,
            auto: 0.8,
        };
        assert_eq!(zoom_mode_for(0.8, fits, Some(ZoomMode::FitWidth)), Some(ZoomMode::FitWidth));
        assert_eq!(zoom_mode_for(0.8, fits, None), Some(ZoomMode::Auto));
        assert_eq!(zoom_mode_for(0.5, fits, None), Some(ZoomMode::FitHeight));
        assert_eq!(zoom_mode_for(0.7, fits, Some(ZoomMode::FitWidth)), None);
    }

    #[test]
    fn zoom_levels_include_presets_within_bounds() {
        let mut paged = PagedLayout::new();
        paged.configured_levels = vec![0.5, 1.0, 2.0];
        paged.configured_max = Some(1.5);
        paged.update_zoom_levels(Fits {
            width: 1.3,
            height: 3.0,
            auto: 1.0,
        });

        assert_eq!(paged.state.zoom_levels, vec![0.5, 1.0, 1.3]);
        assert_eq!(paged.state.zoom_state.min_zoom, 0.5);
        assert_eq!(paged.state.zoom_state.max_zoom, 1.5);
    }

    #[test]
    fn apply_zoom_clamps_and_tracks_previous() {
        let mut paged = PagedLayout::new();
        paged.configured_levels = vec![0.5, 1.0, 2.0];
        paged.update_zoom_levels(Fits::UNIT);

        paged.apply_zoom(5.0, Fits::UNIT, None);
        assert_eq!(paged.state.zoom_state.zoom, 2.0);
        assert!(!paged.state.zoom_state.can_zoom_in);
        assert!(paged.state.zoom_state.can_zoom_out);

        paged.apply_zoom(0.75, Fits::UNIT, None);
        assert_eq!(paged.state.zoom_state.prev_zoom, 2.0);
        assert_eq!(paged.state.zoom_state.zoom, 0.75);
        assert!(paged.state.zoom_state.can_zoom_in);
        assert!(paged.state.zoom_state.can_zoom_out);
    }

    #[test]
    fn latest_available_page_only_grows() {
        let mut paged = PagedLayout::new();
        paged.state.pages = (1..=5)
            .map(|index| {
                Page::new(
                    index,
                    PageSize::new(10.0, 10.0),
                    Padding::default(),
                    if index == 1 {
                        PageStatus::Loaded
                    } else {
                        PageStatus::Unavailable
                    },
                )
            })
            .collect();
        paged.state.latest_available_page = 1;

        paged.set_latest_available_page(3);
        paged.set_latest_available_page(2);
        paged.set_latest_available_page(99);

        assert_eq!(paged.state.latest_available_page, 5);
        assert_eq!(paged.state.pages[0].status, PageStatus::Loaded);
        assert!(paged.state.pages.iter().all(Page::is_available));
    }
}
