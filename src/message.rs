//! Messages broadcast over a scope

use crate::config::LayoutMode;
use crate::types::{ScrollPosition, Viewport};
use crate::zoom::ZoomState;

pub const READY: &str = "ready";
pub const PAGE_LOAD: &str = "pageload";
pub const PAGE_FAIL: &str = "pagefail";
pub const PAGE_UNLOAD: &str = "pageunload";
pub const PAGE_AVAILABLE: &str = "pageavailable";
pub const PAGE_FOCUS: &str = "pagefocus";
pub const RESIZE: &str = "resize";
pub const SCROLL: &str = "scroll";
pub const ZOOM: &str = "zoom";
pub const LAYOUT_CHANGE: &str = "layoutchange";
pub const REALTIME_UPDATE: &str = "realtimeupdate";
pub const REALTIME_COMPLETE: &str = "realtimecomplete";
pub const REALTIME_ERROR: &str = "realtimeerror";
pub const DESTROY: &str = "destroy";

/// Current page and page visibility, sent whenever they change
#[derive(Clone, Debug, PartialEq)]
pub struct PageFocus {
    pub page: usize,
    pub num_pages: usize,
    pub visible_pages: Vec<usize>,
    pub fully_visible_pages: Vec<usize>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    Ready { num_pages: usize },
    PageLoad { page: usize },
    PageFail { page: usize, error: String },
    PageUnload { page: usize },
    /// Pages up to and including `upto` can be requested
    PageAvailable { upto: usize },
    PageFocus(PageFocus),
    Resize(Viewport),
    Scroll(ScrollPosition),
    Zoom(ZoomState),
    LayoutChange { layout: LayoutMode },
    RealtimeUpdate { page: usize },
    RealtimeComplete,
    RealtimeError { error: String },
    Destroy,
    /// Free-form message such as `dragstart` or `linkclicked`
    Custom {
        name: String,
        data: serde_json::Value,
    },
}

impl Message {
    pub fn custom(name: impl Into<String>, data: serde_json::Value) -> Self {
        Message::Custom {
            name: name.into(),
            data,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Message::Ready { .. } => READY,
            Message::PageLoad { .. } => PAGE_LOAD,
            Message::PageFail { .. } => PAGE_FAIL,
            Message::PageUnload { .. } => PAGE_UNLOAD,
            Message::PageAvailable { .. } => PAGE_AVAILABLE,
            Message::PageFocus(_) => PAGE_FOCUS,
            Message::Resize(_) => RESIZE,
            Message::Scroll(_) => SCROLL,
            Message::Zoom(_) => ZOOM,
            Message::LayoutChange { .. } => LAYOUT_CHANGE,
            Message::RealtimeUpdate { .. } => REALTIME_UPDATE,
            Message::RealtimeComplete => REALTIME_COMPLETE,
            Message::RealtimeError { .. } => REALTIME_ERROR,
            Message::Destroy => DESTROY,
            Message::Custom { name, .. } => name,
        }
    }
}
