//! Presentation of facing pages, advancing two at a time

use crate::config::LayoutMode;
use crate::error::FrameworkError;
use crate::framework::Component;
use crate::message::Message;
use crate::scope::Scope;
use crate::types::ScrollPosition;

use super::paged::{Fits, PagedGeometry, PagedLayout};
use super::presentation::PresentationLayout;
use super::{Layout, handle_layout_message};

pub struct PresentationTwoPageLayout {
    presentation: PresentationLayout,
}

impl PresentationTwoPageLayout {
    #[must_use]
    pub fn new(presentation: PresentationLayout) -> Self {
        Self { presentation }
    }

    #[must_use]
    pub fn shown_pages(&self) -> Vec<usize> {
        self.presentation.shown_pages()
    }
}

impl PagedGeometry for PresentationTwoPageLayout {
    fn layout_mode(&self) -> LayoutMode {
        LayoutMode::PresentationTwoPage
    }

    fn paged(&self) -> &PagedLayout {
        self.presentation.paged()
    }

    fn paged_mut(&mut self) -> &mut PagedLayout {
        self.presentation.paged_mut()
    }

    fn fits(&self) -> Fits {
        self.presentation.fits()
    }

    fn arrange(&mut self) {
        self.presentation.arrange();
    }

    fn page_at_scroll(&self) -> Option<usize> {
        self.presentation.page_at_scroll()
    }

    fn position_for_page(&mut self, page: usize) -> ScrollPosition {
        self.presentation.position_for_page(page)
    }

    fn visible_pages(&self) -> (Vec<usize>, Vec<usize>) {
        self.presentation.visible_pages()
    }

    fn page_step(&self) -> usize {
        2
    }
}

impl Component for PresentationTwoPageLayout {
    fn init(&mut self, scope: &Scope) -> Result<(), FrameworkError> {
        self.presentation.two_page_mode = true;
        self.presentation.init(scope)
    }

    fn on_message(&mut self, scope: &Scope, message: &Message) {
        handle_layout_message(self, scope, message);
    }

    fn destroy(&mut self) {
        self.presentation.paged_mut().destroy();
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
    use crate::test_utils::layout_scope_with;
    use crate::types::{PageSize, Viewport};
    use crate::zoom::ZoomMode;

    fn two_page(page: usize) -> (Scope, PresentationTwoPageLayout) {
        let scope = layout_scope_with(
            12,
            PageSize::new(100.0, 200.0),
            Viewport::new(440.0, 220.0),
            |config| config.page = page,
        );
        let mut layout =
            PresentationTwoPageLayout::new(PresentationLayout::new(PagedLayout::new()));
        Component::init(&mut layout, &scope).unwrap();
        (scope, layout)
    }

    #[test]
    fn steps_by_two_pages() {
        let (_scope, layout) = two_page(8);
        assert_eq!(layout.current_page(), 8);
        assert_eq!(layout.calculate_previous_page(), 6);
        assert_eq!(layout.calculate_next_page(), 10);
    }

    #[test]
    fn steps_are_clamped_to_document() {
        let (_scope, mut layout) = two_page(1);
        assert_eq!(layout.calculate_previous_page(), 1);
        layout.scroll_to_page(11);
        assert_eq!(layout.calculate_next_page(), 12);
    }

    #[test]
    fn shows_facing_pages_side_by_side() {
        let (_scope, layout) = two_page(3);
        let state = layout.state();

        assert!(layout.presentation.is_two_page_mode());
        assert_eq!(layout.shown_pages(), vec![3, 4]);
        assert_eq!(state.visible_pages, vec![3, 4]);
        // fit width spans both pages: (440 - 2 * 20) / (2 * 100)
        assert_eq!(layout.calculate_zoom_value(ZoomMode::FitWidth), 2.0);
        assert_eq!(state.pages[2].x0, 100.0);
        assert_eq!(state.pages[3].x0, 220.0);
    }
}
