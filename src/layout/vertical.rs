//! Vertical layout: pages flow top to bottom in centred rows

use crate::config::LayoutMode;
use crate::error::FrameworkError;
use crate::framework::Component;
use crate::message::Message;
use crate::scope::Scope;
use crate::types::ScrollPosition;
use crate::zoom::{approx_eq, flow_auto_zoom};

use super::paged::{Fits, PagedGeometry, PagedLayout, init_layout};
use super::{Layout, Page, handle_layout_message};

pub struct VerticalLayout {
    paged: PagedLayout,
    single_column: bool,
    columns: usize,
}

impl VerticalLayout {
    #[must_use]
    pub fn new(paged: PagedLayout) -> Self {
        Self {
            paged,
            single_column: false,
            columns: 1,
        }
    }

    /// Lay pages out one per row regardless of viewport width
    pub fn force_single_column(&mut self) {
        self.single_column = true;
    }

    #[must_use]
    pub fn is_single_column(&self) -> bool {
        self.single_column
    }

    /// Columns in the current arrangement
    #[must_use]
    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn init(&mut self, scope: &Scope) -> Result<(), FrameworkError> {
        if scope.config().layout == LayoutMode::VerticalSingleColumn {
            self.single_column = true;
        }
        init_layout(self, scope)
    }

    /// Current page and how far into it the viewport top sits
    fn scroll_anchor(&self) -> Option<(usize, f64)> {
        let state = &self.paged.state;
        let page = state.page(state.current_page)?;
        let height = page.outer_height();
        (height > 0.0).then(|| (page.index, (state.scroll.top - page.y0) / height))
    }

    fn max_scroll_top(&self) -> f64 {
        let state = &self.paged.state;
        (state.document_height - state.viewport.height).max(0.0)
    }
}

impl PagedGeometry for VerticalLayout {
    fn layout_mode(&self) -> LayoutMode {
        LayoutMode::Vertical
    }

    fn paged(&self) -> &PagedLayout {
        &self.paged
    }

    fn paged_mut(&mut self) -> &mut PagedLayout {
        &mut self.paged
    }

    fn fits(&self) -> Fits {
        let viewport = self.paged.state.viewport;
        let max = self.paged.max_page_size();
        if viewport.is_empty() || max.width <= 0.0 || max.height <= 0.0 {
            return Fits::UNIT;
        }
        let padding = self.paged.padding();
        let width = ((viewport.width - padding.horizontal()) / max.width).max(0.0);
        let height = ((viewport.height - padding.vertical()) / max.height).max(0.0);
        Fits {
            width,
            height,
            auto: flow_auto_zoom(
                width,
                height,
                self.paged.is_landscape(),
                self.paged.is_mobile(),
            ),
        }
    }

    fn arrange(&mut self) {
        let anchor = self.scroll_anchor();
        let single_column = self.single_column;
        let state = &mut self.paged.state;
        let viewport = state.viewport;

        let column_width = state.pages.iter().map(Page::outer_width).fold(0.0, f64::max);
        let columns = if single_column || column_width <= 0.0 {
            1
        } else {
            ((viewport.width / column_width).floor() as usize).clamp(1, state.pages.len().max(1))
        };
        let content_width = column_width * columns as f64;
        let left = ((viewport.width - content_width) / 2.0).max(0.0);

        let mut top = 0.0;
        for row in state.pages.chunks_mut(columns) {
            let row_height = row.iter().map(Page::outer_height).fold(0.0, f64::max);
            for (column, page) in row.iter_mut().enumerate() {
                page.x0 = left
                    + column as f64 * column_width
                    + (column_width - page.outer_width()) / 2.0;
                page.y0 = top;
            }
            top += row_height;
        }
        state.document_width = content_width.max(viewport.width);
        state.document_height = top;
        self.columns = columns;

        if let Some((index, offset)) = anchor {
            if let Some(page) = self.paged.state.page(index) {
                let top = page.y0 + offset * page.outer_height();
                self.paged.state.scroll.top = top.clamp(0.0, self.max_scroll_top());
            }
        }
    }

    fn page_at_scroll(&self) -> Option<usize> {
        let state = &self.paged.state;
        if state.pages.is_empty() {
            return None;
        }
        if state.scroll.top <= 0.0 {
            return Some(1);
        }

        // The row under the vertical midpoint, then the page nearest its centre
        let mid_y = state.scroll.top + state.viewport.height / 2.0;
        let mid_x = state.scroll.left + state.viewport.width / 2.0;
        let row_top = state
            .pages
            .iter()
            .map(|page| page.y0)
            .filter(|y0| *y0 <= mid_y)
            .fold(f64::NEG_INFINITY, f64::max);
        if !row_top.is_finite() {
            return Some(1);
        }
        let distance = |page: &&Page| (page.x0 + page.outer_width() / 2.0 - mid_x).abs();
        state
            .pages
            .iter()
            .filter(|page| approx_eq(page.y0, row_top))
            .min_by(|a, b| distance(a).total_cmp(&distance(b)))
            .map(|page| page.index)
    }

    fn position_for_page(&mut self, page: usize) -> ScrollPosition {
        let state = &self.paged.state;
        let top = state.page(page).map_or(0.0, |page| page.y0);
        ScrollPosition::new(top.clamp(0.0, self.max_scroll_top()), state.scroll.left)
    }

    fn visible_pages(&self) -> (Vec<usize>, Vec<usize>) {
        self.paged.pages_in_view(1..=self.paged.state.num_pages())
    }
}

impl Component for VerticalLayout {
    fn init(&mut self, scope: &Scope) -> Result<(), FrameworkError> {
        VerticalLayout::init(self, scope)
    }

    fn on_message(&mut self, scope: &Scope, message: &Message) {
        handle_layout_message(self, scope, message);
    }

    fn destroy(&mut self) {
        self.paged.destroy();
    }

    fn as_layout(&self) -> Option<&dyn Layout> {
        Some(self)
    }

    fn as_layout_mut(&mut self) -> Option<&mut dyn Layout> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{PageNavigator, ZoomController};
    use crate::test_utils::layout_scope;
    use crate::types::{PageSize, Viewport};
    use crate::zoom::{ZoomMode, ZoomRequest};

    fn vertical(viewport: Viewport) -> (Scope, VerticalLayout) {
        let scope = layout_scope(10, PageSize::new(100.0, 200.0), viewport);
        let mut layout = VerticalLayout::new(PagedLayout::new());
        layout.init(&scope).unwrap();
        (scope, layout)
    }

    #[test]
    fn init_applies_auto_zoom_and_focuses_first_page() {
        let (_scope, layout) = vertical(Viewport::new(200.0, 300.0));
        let state = layout.state();

        assert_eq!(state.zoom_state.zoom, 1.0);
        assert_eq!(state.zoom_state.zoom_mode, Some(ZoomMode::Auto));
        assert_eq!(layout.columns(), 1);
        assert_eq!(state.current_page, 1);
        assert_eq!(state.visible_pages, vec![1, 2]);
        assert_eq!(state.fully_visible_pages, vec![1]);
        assert_eq!(state.pages[0].x0, 40.0);
        assert_eq!(state.pages[1].y0, 220.0);
    }

    #[test]
    fn wide_viewport_uses_several_columns() {
        let (_scope, layout) = vertical(Viewport::new(500.0, 300.0));
        assert_eq!(layout.columns(), 4);
        assert_eq!(layout.state().pages[4].y0, 220.0);
    }

    #[test]
    fn current_page_follows_viewport_midpoint() {
        let (_scope, mut layout) = vertical(Viewport::new(200.0, 300.0));

        layout.handle_scroll(ScrollPosition::new(500.0, 0.0));
        assert_eq!(layout.current_page(), 3);

        layout.handle_scroll(ScrollPosition::new(0.0, 0.0));
        assert_eq!(layout.current_page(), 1);
    }

    #[test]
    fn scroll_to_page_moves_viewport_and_writes_config() {
        let (scope, mut layout) = vertical(Viewport::new(200.0, 300.0));

        assert_eq!(layout.scroll_to_page(4), 4);
        assert_eq!(layout.state().scroll.top, 660.0);
        assert_eq!(scope.config().page, 4);

        assert_eq!(layout.scroll_to_page(42), 10);
        assert_eq!(layout.calculate_next_page(), 10);
        assert_eq!(layout.calculate_previous_page(), 9);
    }

    #[test]
    fn zooming_keeps_focused_page_in_place() {
        let (scope, mut layout) = vertical(Viewport::new(200.0, 300.0));
        layout.scroll_to_page(3);

        assert!(layout.set_zoom(ZoomRequest::Value(2.0)));

        let state = layout.state();
        assert_eq!(state.zoom_state.prev_zoom, 1.0);
        assert_eq!(state.scroll.top, 840.0);
        assert_eq!(state.current_page, 3);
        assert_eq!(scope.config().zoom, ZoomRequest::Value(2.0));
    }

    #[test]
    fn fit_modes_use_widest_and_tallest_page() {
        let (_scope, layout) = vertical(Viewport::new(200.0, 300.0));
        assert!((layout.calculate_zoom_value(ZoomMode::FitWidth) - 1.8).abs() < 1e-9);
        assert!((layout.calculate_zoom_value(ZoomMode::FitHeight) - 1.4).abs() < 1e-9);
        assert_eq!(layout.calculate_zoom_auto_value(), 1.0);
    }
}
