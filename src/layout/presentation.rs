//! Presentation layout: one page (or a pair) at a time, centred

use crate::config::LayoutMode;
use crate::error::FrameworkError;
use crate::framework::Component;
use crate::message::Message;
use crate::scope::Scope;
use crate::types::ScrollPosition;

use super::paged::{Fits, PagedGeometry, PagedLayout, init_layout};
use super::{Layout, handle_layout_message};

pub struct PresentationLayout {
    paged: PagedLayout,
    pub(crate) two_page_mode: bool,
}

impl PresentationLayout {
    #[must_use]
    pub fn new(paged: PagedLayout) -> Self {
        Self {
            paged,
            two_page_mode: false,
        }
    }

    #[must_use]
    pub fn is_two_page_mode(&self) -> bool {
        self.two_page_mode
    }

    pub fn init(&mut self, scope: &Scope) -> Result<(), FrameworkError> {
        init_layout(self, scope)
    }

    /// Pages on screen for the current page
    #[must_use]
    pub fn shown_pages(&self) -> Vec<usize> {
        let state = &self.paged.state;
        let current = state.current_page;
        if self.two_page_mode && current < state.num_pages() {
            vec![current, current + 1]
        } else {
            vec![current]
        }
    }
}

impl PagedGeometry for PresentationLayout {
    fn layout_mode(&self) -> LayoutMode {
        LayoutMode::Presentation
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
        let across = if self.two_page_mode { 2.0 } else { 1.0 };
        let padding = self.paged.padding();
        let width =
            ((viewport.width - across * padding.horizontal()) / (across * max.width)).max(0.0);
        let height = ((viewport.height - padding.vertical()) / max.height).max(0.0);
        Fits {
            width,
            height,
            auto: width.min(height),
        }
    }

    fn arrange(&mut self) {
        let shown = self.shown_pages();
        let state = &mut self.paged.state;
        let viewport = state.viewport;

        // Every page sits where it would be shown on its own
        for page in &mut state.pages {
            page.x0 = ((viewport.width - page.outer_width()) / 2.0).max(0.0);
            page.y0 = ((viewport.height - page.outer_height()) / 2.0).max(0.0);
        }

        let mut width = 0.0;
        let mut height = 0.0_f64;
        for index in &shown {
            if let Some(page) = state.page(*index) {
                width += page.outer_width();
                height = height.max(page.outer_height());
            }
        }
        let mut x0 = ((viewport.width - width) / 2.0).max(0.0);
        for index in &shown {
            if let Some(page) = state.page_mut(*index) {
                page.x0 = x0;
                x0 += page.outer_width();
            }
        }
        state.document_width = width.max(viewport.width);
        state.document_height = height.max(viewport.height);
    }

    fn page_at_scroll(&self) -> Option<usize> {
        None
    }

    fn position_for_page(&mut self, _page: usize) -> ScrollPosition {
        self.arrange();
        ScrollPosition::default()
    }

    fn visible_pages(&self) -> (Vec<usize>, Vec<usize>) {
        self.paged.pages_in_view(self.shown_pages())
    }

    fn page_step(&self) -> usize {
        if self.two_page_mode { 2 } else { 1 }
    }
}

impl Component for PresentationLayout {
    fn init(&mut self, scope: &Scope) -> Result<(), FrameworkError> {
        PresentationLayout::init(self, scope)
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
    use crate::zoom::ZoomMode;

    #[test]
    fn auto_zoom_shows_whole_page() {
        let scope = layout_scope(5, PageSize::new(100.0, 200.0), Viewport::new(420.0, 220.0));
        let mut layout = PresentationLayout::new(PagedLayout::new());
        layout.init(&scope).unwrap();

        assert_eq!(layout.calculate_zoom_value(ZoomMode::FitWidth), 4.0);
        assert_eq!(layout.calculate_zoom_value(ZoomMode::FitHeight), 1.0);
        assert_eq!(layout.state().zoom_state.zoom, 1.0);
        assert_eq!(layout.state().visible_pages, vec![1]);
        assert_eq!(layout.state().fully_visible_pages, vec![1]);
        assert_eq!(layout.state().pages[0].x0, 150.0);
    }

    #[test]
    fn scrolling_never_changes_page() {
        let scope = layout_scope(5, PageSize::new(100.0, 200.0), Viewport::new(420.0, 220.0));
        let mut layout = PresentationLayout::new(PagedLayout::new());
        layout.init(&scope).unwrap();
        layout.scroll_to_page(3);

        layout.handle_scroll(ScrollPosition::new(5000.0, 0.0));

        assert_eq!(layout.current_page(), 3);
        assert_eq!(layout.calculate_next_page(), 4);
        assert_eq!(layout.calculate_previous_page(), 2);
    }
}
