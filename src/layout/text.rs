//! Text layout: reflowed text layers in a single column at 100%

use crate::config::LayoutMode;
use crate::error::FrameworkError;
use crate::framework::Component;
use crate::message::Message;
use crate::scope::Scope;
use crate::types::ScrollPosition;

use super::paged::{Fits, PagedGeometry, PagedLayout, init_layout};
use super::vertical::VerticalLayout;
use super::{Layout, handle_layout_message};

pub struct TextLayout {
    vertical: VerticalLayout,
}

impl TextLayout {
    #[must_use]
    pub fn new(vertical: VerticalLayout) -> Self {
        Self { vertical }
    }
}

impl PagedGeometry for TextLayout {
    fn layout_mode(&self) -> LayoutMode {
        LayoutMode::Text
    }

    fn paged(&self) -> &PagedLayout {
        self.vertical.paged()
    }

    fn paged_mut(&mut self) -> &mut PagedLayout {
        self.vertical.paged_mut()
    }

    // Text reflows to the viewport, so every fit is 100%
    fn fits(&self) -> Fits {
        Fits::UNIT
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

impl Component for TextLayout {
    fn init(&mut self, scope: &Scope) -> Result<(), FrameworkError> {
        self.vertical.force_single_column();
        // Initialised through our own geometry so fits stay at 100%
        init_layout(self, scope)
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
