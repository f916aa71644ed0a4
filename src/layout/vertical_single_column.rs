//! Vertical flow restricted to one page per row

use crate::config::LayoutMode;
use crate::error::FrameworkError;
use crate::framework::Component;
use crate::message::Message;
use crate::scope::Scope;
use crate::types::ScrollPosition;

use super::paged::{Fits, PagedGeometry, PagedLayout};
use super::vertical::VerticalLayout;
use super::{Layout, handle_layout_message};

pub struct VerticalSingleColumnLayout {
    vertical: VerticalLayout,
}

impl VerticalSingleColumnLayout {
    #[must_use]
    pub fn new(vertical: VerticalLayout) -> Self {
        Self { vertical }
    }
}

impl PagedGeometry for VerticalSingleColumnLayout {
    fn layout_mode(&self) -> LayoutMode {
        LayoutMode::VerticalSingleColumn
    }

    fn paged(&self) -> &PagedLayout {
        self.vertical.paged()
    }

    fn paged_mut(&mut self) -> &mut PagedLayout {
        self.vertical.paged_mut()
    }

    fn fits(&self) -> Fits {
        self.vertical.fits()
    }

    fn arrange(&mut self) {
        self.vertical.arrange();
    }

    fn page_at_scroll(&self) -> Option<usize> {
        self.vertical.page_at_scroll()
    }

    fn position_for_page(&mut self, page: usize) -> ScrollPosition {
        self.vertical.position_for_page(page)
    }

    fn visible_pages(&self) -> (Vec<usize>, Vec<usize>) {
        self.vertical.visible_pages()
    }
}

impl Component for VerticalSingleColumnLayout {
    fn init(&mut self, scope: &Scope) -> Result<(), FrameworkError> {
        scope.config_mut().layout = LayoutMode::VerticalSingleColumn;
        self.vertical.init(scope)
    }

    fn on_message(&mut self, scope: &Scope, message: &Message) {
        handle_layout_message(self, scope, message);
    }

    fn destroy(&mut self) {
        self.vertical.paged_mut().destroy();
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
    use crate::test_utils::layout_scope;
    use crate::types::{PageSize, Viewport};

    #[test]
    fn init_forces_single_column_through_config() {
        let scope = layout_scope(6, PageSize::new(100.0, 200.0), Viewport::new(800.0, 300.0));
        let mut layout =
            VerticalSingleColumnLayout::new(VerticalLayout::new(PagedLayout::new()));

        Component::init(&mut layout, &scope).unwrap();

        assert_eq!(scope.config().layout, LayoutMode::VerticalSingleColumn);
        assert!(layout.vertical.is_single_column());
        assert_eq!(layout.vertical.columns(), 1);
        assert_eq!(layout.state().pages[1].y0, 220.0);
        assert_eq!(layout.mode(), LayoutMode::VerticalSingleColumn);
    }
}
