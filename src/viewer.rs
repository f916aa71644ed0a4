//! Viewer: one document, one scope and the active layout
//!
//! The viewer drives everything that is not a reaction to a message: it
//! loads metadata and the stylesheet, creates the configured layout once the
//! metadata arrives, keeps the pages around the visible ones loaded and
//! relays realtime conversion progress. Asset requests settle on worker
//! threads; [`Viewer::pump`] turns settled requests and realtime events into
//! broadcasts on the caller's thread.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::ops::RangeInclusive;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde::Deserialize;

use crate::config::{Config, LayoutMode};
use crate::data::{
    DataProvider, DocumentMetadata, MetadataProvider, PageImage, PageImageProvider,
    PageSvgProvider, PageTextProvider, StylesheetProvider,
};
use crate::error::{AssetError, ViewerError};
use crate::framework::{ComponentKind, Framework};
use crate::layout::{Layout, LayoutState, PageStatus};
use crate::message::Message;
use crate::promise::{Outcome, Promise, when};
use crate::realtime::{ERROR_EVENT, RealtimeClient};
use crate::scope::{ComponentHandle, PluginHandle, Scope};
use crate::types::{ScrollPosition, Viewport};
use crate::zoom::ZoomRequest;

/// Realtime event announcing converted pages
pub const PAGE_AVAILABLE_EVENT: &str = "pageavailable.svg";
/// Realtime event sent once conversion has finished
pub const FINISHED_EVENT: &str = "finished.svg";
/// Realtime event sent when conversion failed
pub const FAILED_EVENT: &str = "failed.svg";

const PUMP_INTERVAL: Duration = Duration::from_millis(10);

/// One loaded layer of a page
#[derive(Clone, Debug)]
pub enum PageLayer {
    Svg(String),
    Image(PageImage),
    Text(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewerPhase {
    Created,
    Loading,
    Ready,
    Failed,
    Destroyed,
}

#[derive(Debug, Default, Deserialize)]
struct RawPageAvailable {
    page: Option<usize>,
    #[serde(default)]
    pages: Vec<usize>,
    upto: Option<usize>,
}

/// Payload of a `pageavailable.svg` event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageAvailability {
    /// Pages named individually, ascending
    pub pages: Vec<usize>,
    /// Highest available page
    pub upto: usize,
}

impl PageAvailability {
    /// Accepts `{"page": n}`, `{"pages": [..]}` and `{"upto": n}`
    pub fn parse(data: &str) -> Option<Self> {
        let raw: RawPageAvailable = serde_json::from_str(data).ok()?;
        let mut pages = raw.pages;
        pages.extend(raw.page);
        pages.retain(|page| *page > 0);
        pages.sort_unstable();
        pages.dedup();
        let upto = raw.upto.into_iter().chain(pages.iter().copied()).max()?;
        Some(Self { pages, upto })
    }
}

/// Pages to keep loaded: the visible ones plus `range` on each side
fn load_window(state: &LayoutState, range: usize) -> RangeInclusive<usize> {
    let visible = &state.visible_pages;
    let (first, last) = match (visible.iter().min(), visible.iter().max()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => (state.current_page, state.current_page),
    };
    let start = first.saturating_sub(range).max(1);
    let end = (last + range).min(state.latest_available_page);
    start..=end
}

fn layer<T>(
    promise: Promise<T, AssetError>,
    wrap: fn(T) -> PageLayer,
) -> Promise<PageLayer, AssetError>
where
    T: Clone + Send + 'static,
{
    promise
        .then(move |value| Ok(wrap(value)))
        .with_abort_of(&promise)
}

pub struct Viewer {
    scope: Scope,
    phase: ViewerPhase,
    layout: Option<ComponentHandle>,
    metadata: Option<Promise<DocumentMetadata, AssetError>>,
    stylesheet: Option<Promise<String, AssetError>>,
    css: Option<String>,
    loading: BTreeMap<usize, Promise<Vec<PageLayer>, AssetError>>,
    loaded: BTreeMap<usize, Vec<PageLayer>>,
    latest_available: usize,
    realtime: Option<RealtimeClient>,
    realtime_inbox: Rc<RefCell<VecDeque<Message>>>,
}

impl Viewer {
    pub fn new(framework: Rc<Framework>, mut config: Config, viewport: Viewport) -> Self {
        config.viewport = viewport;
        Self {
            scope: Scope::new(framework, config),
            phase: ViewerPhase::Created,
            layout: None,
            metadata: None,
            stylesheet: None,
            css: None,
            loading: BTreeMap::new(),
            loaded: BTreeMap::new(),
            latest_available: 0,
            realtime: None,
            realtime_inbox: Rc::new(RefCell::new(VecDeque::new())),
        }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn phase(&self) -> ViewerPhase {
        self.phase
    }

    pub fn is_ready(&self) -> bool {
        self.phase == ViewerPhase::Ready
    }

    /// Start loading the document; later calls do nothing
    pub fn load(&mut self) -> Result<(), ViewerError> {
        match self.phase {
            ViewerPhase::Created => {}
            ViewerPhase::Destroyed => return Err(ViewerError::Destroyed),
            _ => return Ok(()),
        }
        self.phase = ViewerPhase::Loading;
        info!("Loading document from {}", self.scope.config().url);

        self.metadata = Some(self.scope.get::<MetadataProvider>(&()));
        self.stylesheet = Some(self.scope.get::<StylesheetProvider>(&()));
        self.connect_realtime();
        Ok(())
    }

    fn connect_realtime(&mut self) {
        let (url, capabilities, complete) = {
            let config = self.scope.config();
            (
                config.realtime_url.clone(),
                config.capabilities,
                config.conversion_is_complete,
            )
        };
        let Some(url) = url else {
            return;
        };
        if complete {
            debug!("Conversion already complete, not opening {url}");
            return;
        }

        let connector = self.scope.framework().event_streams();
        let mut client = match RealtimeClient::new(&url, connector, capabilities) {
            Ok(client) => client,
            Err(e) => {
                warn!("Realtime updates disabled: {e}");
                return;
            }
        };

        let inbox = Rc::clone(&self.realtime_inbox);
        client.on(PAGE_AVAILABLE_EVENT, move |event| {
            let Some(available) = PageAvailability::parse(&event.data) else {
                warn!("Malformed {PAGE_AVAILABLE_EVENT} event: {}", event.data);
                return;
            };
            let mut inbox = inbox.borrow_mut();
            for page in available.pages {
                inbox.push_back(Message::RealtimeUpdate { page });
            }
            inbox.push_back(Message::PageAvailable {
                upto: available.upto,
            });
        });
        let inbox = Rc::clone(&self.realtime_inbox);
        client.on(FINISHED_EVENT, move |_| {
            inbox.borrow_mut().push_back(Message::RealtimeComplete);
        });
        let inbox = Rc::clone(&self.realtime_inbox);
        client.on(FAILED_EVENT, move |event| {
            inbox.borrow_mut().push_back(Message::RealtimeError {
                error: format!("conversion failed: {}", event.data),
            });
        });
        let inbox = Rc::clone(&self.realtime_inbox);
        client.on(ERROR_EVENT, move |event| {
            inbox.borrow_mut().push_back(Message::RealtimeError {
                error: event.data.clone(),
            });
        });
        self.realtime = Some(client);
    }

    /// Turn settled requests and realtime events into broadcasts.
    ///
    /// Fails once if the document metadata cannot be loaded.
    pub fn pump(&mut self) -> Result<(), ViewerError> {
        if self.phase == ViewerPhase::Destroyed {
            return Err(ViewerError::Destroyed);
        }
        self.settle_metadata()?;
        self.settle_stylesheet();
        self.settle_pages();
        self.drain_realtime();
        self.update_page_loads();
        Ok(())
    }

    /// Pump until the layout exists; false on timeout
    pub fn wait_ready(&mut self, timeout: Duration) -> Result<bool, ViewerError> {
        let deadline = Instant::now() + timeout;
        loop {
            self.pump()?;
            if self.is_ready() {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            thread::sleep(PUMP_INTERVAL);
        }
    }

    /// Pump until no page or stylesheet request is in flight; false on timeout
    pub fn wait_idle(&mut self, timeout: Duration) -> Result<bool, ViewerError> {
        let deadline = Instant::now() + timeout;
        loop {
            self.pump()?;
            let idle = self.is_ready() && self.loading.is_empty() && self.stylesheet.is_none();
            if idle {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            thread::sleep(PUMP_INTERVAL);
        }
    }

    fn settle_metadata(&mut self) -> Result<(), ViewerError> {
        let Some(outcome) = self.metadata.as_ref().and_then(|p| p.try_outcome()) else {
            return Ok(());
        };
        self.metadata = None;
        match outcome {
            Outcome::Resolved(metadata) => self.start(metadata),
            Outcome::Rejected(err) => {
                warn!("Document failed to load: {err}");
                self.phase = ViewerPhase::Failed;
                self.scope.broadcast(Message::custom(
                    "fail",
                    serde_json::json!({ "error": err.to_string(), "resource": err.resource() }),
                ));
                Err(ViewerError::Load(err))
            }
            Outcome::Cancelled => {
                debug!("Metadata request cancelled");
                Ok(())
            }
        }
    }

    fn start(&mut self, metadata: DocumentMetadata) -> Result<(), ViewerError> {
        let num_pages = metadata.numpages;
        let mode = {
            let mut config = self.scope.config_mut();
            let initially_available = if config.conversion_is_complete {
                num_pages
            } else {
                1
            };
            self.latest_available = self.latest_available.max(initially_available);
            config.num_pages = num_pages;
            config.metadata = Some(metadata);
            config.layout
        };

        self.create_layout(mode)?;
        self.phase = ViewerPhase::Ready;
        info!("Document ready: {num_pages} pages in {} layout", mode.as_str());
        self.scope.broadcast(Message::Ready { num_pages });
        Ok(())
    }

    fn create_layout(&mut self, mode: LayoutMode) -> Result<(), ViewerError> {
        let handle = self
            .scope
            .create_component(ComponentKind::for_layout(mode).name())?;
        {
            let mut component = handle.borrow_mut();
            if let Some(layout) = component.as_layout_mut() {
                layout.set_latest_available_page(self.latest_available);
                for page in self.loaded.keys() {
                    layout.handle_page_status(*page, PageStatus::Loaded);
                }
                for page in self.loading.keys() {
                    layout.handle_page_status(*page, PageStatus::Loading);
                }
            }
        }
        self.layout = Some(handle);
        Ok(())
    }

    fn settle_stylesheet(&mut self) {
        let Some(outcome) = self.stylesheet.as_ref().and_then(|p| p.try_outcome()) else {
            return;
        };
        self.stylesheet = None;
        match outcome {
            Outcome::Resolved(css) => {
                debug!("Stylesheet loaded ({} bytes)", css.len());
                self.css = Some(css);
            }
            Outcome::Rejected(err) => warn!("Stylesheet failed to load: {err}"),
            Outcome::Cancelled => debug!("Stylesheet request cancelled"),
        }
    }

    fn settle_pages(&mut self) {
        let settled: Vec<(usize, Outcome<Vec<PageLayer>, AssetError>)> = self
            .loading
            .iter()
            .filter_map(|(page, promise)| promise.try_outcome().map(|outcome| (*page, outcome)))
            .collect();

        for (page, outcome) in settled {
            self.loading.remove(&page);
            match outcome {
                Outcome::Resolved(layers) => {
                    self.loaded.insert(page, layers);
                    self.scope.broadcast(Message::PageLoad { page });
                }
                Outcome::Rejected(err) => {
                    warn!("Page {page} failed to load: {err}");
                    self.scope.broadcast(Message::PageFail {
                        page,
                        error: err.to_string(),
                    });
                }
                Outcome::Cancelled => debug!("Load of page {page} cancelled"),
            }
        }
    }

    fn drain_realtime(&mut self) {
        let Some(client) = self.realtime.as_mut() else {
            return;
        };
        client.poll();
        let messages: Vec<Message> = self.realtime_inbox.borrow_mut().drain(..).collect();

        let mut finished = false;
        let mut stream_closed = false;
        for message in messages {
            match &message {
                Message::PageAvailable { upto } => {
                    self.latest_available = self.latest_available.max(*upto);
                }
                Message::RealtimeComplete => finished = true,
                // The server closes the stream once conversion has finished
                Message::RealtimeError { .. } if finished => continue,
                Message::RealtimeError { error } => {
                    warn!("Realtime stream error: {error}");
                    stream_closed = true;
                }
                _ => {}
            }
            self.scope.broadcast(message);
        }

        if finished {
            let num_pages = {
                let mut config = self.scope.config_mut();
                config.conversion_is_complete = true;
                config.num_pages
            };
            info!("Conversion complete");
            if num_pages > 0 {
                self.latest_available = self.latest_available.max(num_pages);
                self.scope
                    .broadcast(Message::PageAvailable { upto: num_pages });
            }
        }
        if finished || stream_closed {
            if let Some(mut client) = self.realtime.take() {
                client.destroy();
            }
        }
    }

    fn update_page_loads(&mut self) {
        if self.phase != ViewerPhase::Ready {
            return;
        }
        let range = self.scope.config().page_load_range;
        let Some(window) = self.with_layout(|layout| load_window(layout.state(), range)) else {
            return;
        };

        let stale_loads: Vec<usize> = self
            .loading
            .keys()
            .copied()
            .filter(|page| !window.contains(page))
            .collect();
        for page in stale_loads {
            if let Some(promise) = self.loading.remove(&page) {
                debug!("Aborting load of page {page}");
                promise.abort();
            }
            self.scope.broadcast(Message::PageUnload { page });
        }
        let stale_pages: Vec<usize> = self
            .loaded
            .keys()
            .copied()
            .filter(|page| !window.contains(page))
            .collect();
        for page in stale_pages {
            self.loaded.remove(&page);
            self.scope.broadcast(Message::PageUnload { page });
        }

        let wanted: Vec<usize> = self
            .with_layout(|layout| {
                let state = layout.state();
                window
                    .clone()
                    .filter(|page| {
                        state
                            .page(*page)
                            .is_some_and(|page| page.status == PageStatus::NotLoaded)
                    })
                    .collect()
            })
            .unwrap_or_default();
        for page in wanted {
            if self.loading.contains_key(&page) || self.loaded.contains_key(&page) {
                continue;
            }
            let promise = self.request_page(page);
            self.loading.insert(page, promise);
            self.with_layout_mut(|layout| layout.handle_page_status(page, PageStatus::Loading));
        }
    }

    fn request_page(&self, page: usize) -> Promise<Vec<PageLayer>, AssetError> {
        let (mode, use_svg, text_selection) = {
            let config = self.scope.config();
            (config.layout, config.use_svg, config.enable_text_selection)
        };
        debug!("Requesting page {page}");

        let mut layers = Vec::new();
        if mode == LayoutMode::Text {
            layers.push(layer(self.scope.get::<PageTextProvider>(&page), PageLayer::Text));
        } else {
            layers.push(if use_svg {
                layer(self.scope.get::<PageSvgProvider>(&page), PageLayer::Svg)
            } else {
                layer(self.scope.get::<PageImageProvider>(&page), PageLayer::Image)
            });
            if text_selection {
                layers.push(layer(self.scope.get::<PageTextProvider>(&page), PageLayer::Text));
            }
        }
        when(layers)
    }

    fn reset_pages(&mut self) {
        for (page, promise) in std::mem::take(&mut self.loading) {
            debug!("Aborting load of page {page}");
            promise.abort();
        }
        self.loaded.clear();
    }

    pub fn with_layout<R>(&self, f: impl FnOnce(&dyn Layout) -> R) -> Option<R> {
        let handle = self.layout.as_ref()?;
        let component = handle.borrow();
        component.as_layout().map(f)
    }

    fn with_layout_mut<R>(&self, f: impl FnOnce(&mut dyn Layout) -> R) -> Option<R> {
        let handle = self.layout.as_ref()?;
        let mut component = handle.borrow_mut();
        component.as_layout_mut().map(f)
    }

    /// Snapshot of the active layout
    pub fn layout_state(&self) -> Option<LayoutState> {
        self.with_layout(|layout| layout.state().clone())
    }

    pub fn num_pages(&self) -> usize {
        self.scope.config().num_pages
    }

    pub fn stylesheet(&self) -> Option<&str> {
        self.css.as_deref()
    }

    pub fn page_layers(&self, page: usize) -> Option<&[PageLayer]> {
        self.loaded.get(&page).map(Vec::as_slice)
    }

    /// Pages with a request in flight
    pub fn loading_pages(&self) -> Vec<usize> {
        self.loading.keys().copied().collect()
    }

    /// URL of the main asset of `page` in the current layout
    pub fn page_url(&self, page: usize) -> String {
        let (mode, use_svg) = {
            let config = self.scope.config();
            (config.layout, config.use_svg)
        };
        if mode == LayoutMode::Text {
            self.scope.data_provider::<PageTextProvider>().url(&page)
        } else if use_svg {
            self.scope.data_provider::<PageSvgProvider>().url(&page)
        } else {
            self.scope.data_provider::<PageImageProvider>().url(&page)
        }
    }

    /// Apply a zoom request and announce the result
    pub fn zoom(&mut self, request: ZoomRequest) -> bool {
        let Some((changed, zoom, focus_before, focus)) = self.with_layout_mut(|layout| {
            let focus_before = layout.state().focus();
            let changed = layout.set_zoom(request);
            let state = layout.state();
            (changed, state.zoom_state.clone(), focus_before, state.focus())
        }) else {
            debug!("Ignoring zoom {request} before the layout exists");
            return false;
        };

        if changed {
            self.scope.broadcast(Message::Zoom(zoom));
            if focus != focus_before {
                self.scope.broadcast(Message::PageFocus(focus));
            }
            self.update_page_loads();
        }
        changed
    }

    /// Focus `page` (clamped to the available pages); returns the page shown
    pub fn scroll_to(&mut self, page: usize) -> Option<usize> {
        let (shown, focus_before, focus) = self.with_layout_mut(|layout| {
            let focus_before = layout.state().focus();
            let shown = layout.scroll_to_page(page);
            (shown, focus_before, layout.state().focus())
        })?;
        if focus != focus_before {
            self.scope.broadcast(Message::PageFocus(focus));
        }
        self.update_page_loads();
        Some(shown)
    }

    pub fn next_page(&mut self) -> Option<usize> {
        let next = self.with_layout(|layout| layout.calculate_next_page())?;
        self.scroll_to(next)
    }

    pub fn previous_page(&mut self) -> Option<usize> {
        let previous = self.with_layout(|layout| layout.calculate_previous_page())?;
        self.scroll_to(previous)
    }

    pub fn resize(&mut self, viewport: Viewport) {
        self.scope.config_mut().viewport = viewport;
        self.scope.broadcast(Message::Resize(viewport));
        self.update_page_loads();
    }

    pub fn scroll(&mut self, scroll: ScrollPosition) {
        self.scope.broadcast(Message::Scroll(scroll));
        self.update_page_loads();
    }

    /// Replace the active layout, keeping the current page and zoom
    pub fn set_layout(&mut self, mode: LayoutMode) -> Result<(), ViewerError> {
        if self.phase == ViewerPhase::Destroyed {
            return Err(ViewerError::Destroyed);
        }
        let previous = self.scope.config().layout;
        if previous == mode && self.layout.is_some() {
            return Ok(());
        }
        self.scope.config_mut().layout = mode;
        if self.phase != ViewerPhase::Ready {
            return Ok(());
        }

        // Text layers and page graphics are different assets
        if (previous == LayoutMode::Text) != (mode == LayoutMode::Text) {
            self.reset_pages();
        }
        if let Some(old) = self.layout.take() {
            self.scope.destroy_component(&old);
        }
        self.create_layout(mode)?;
        info!("Switched layout from {} to {}", previous.as_str(), mode.as_str());

        self.scope.broadcast(Message::LayoutChange { layout: mode });
        if let Some((zoom, focus)) =
            self.with_layout(|layout| (layout.state().zoom_state.clone(), layout.state().focus()))
        {
            self.scope.broadcast(Message::Zoom(zoom));
            self.scope.broadcast(Message::PageFocus(focus));
        }
        self.update_page_loads();
        Ok(())
    }

    pub fn load_plugin(
        &mut self,
        name: &str,
        config: serde_json::Value,
    ) -> Result<PluginHandle, ViewerError> {
        Ok(self.scope.load_plugin(name, config)?)
    }

    /// Abort outstanding requests and tear the scope down
    pub fn destroy(&mut self) {
        if self.phase == ViewerPhase::Destroyed {
            return;
        }
        self.scope.broadcast(Message::Destroy);

        if let Some(metadata) = self.metadata.take() {
            metadata.abort();
        }
        if let Some(stylesheet) = self.stylesheet.take() {
            stylesheet.abort();
        }
        self.reset_pages();
        if let Some(mut client) = self.realtime.take() {
            client.destroy();
        }
        self.layout = None;
        self.scope.destroy();
        self.phase = ViewerPhase::Destroyed;
        debug!("Viewer destroyed");
    }
}

impl Drop for Viewer {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Page;
    use crate::types::{Padding, PageSize};

    #[test]
    fn availability_accepts_every_payload_shape() {
        assert_eq!(
            PageAvailability::parse(r#"{"page": 3}"#),
            Some(PageAvailability {
                pages: vec![3],
                upto: 3
            })
        );
        assert_eq!(
            PageAvailability::parse(r#"{"pages": [5, 4, 4]}"#),
            Some(PageAvailability {
                pages: vec![4, 5],
                upto: 5
            })
        );
        assert_eq!(
            PageAvailability::parse(r#"{"upto": 7}"#),
            Some(PageAvailability {
                pages: vec![],
                upto: 7
            })
        );
        assert_eq!(PageAvailability::parse("{}"), None);
        assert_eq!(PageAvailability::parse("not json"), None);
    }

    fn state(num_pages: usize, visible: Vec<usize>, latest: usize) -> LayoutState {
        LayoutState {
            current_page: visible.first().copied().unwrap_or(1),
            pages: (1..=num_pages)
                .map(|index| {
                    Page::new(
                        index,
                        PageSize::new(1.0, 1.0),
                        Padding::uniform(0.0),
                        PageStatus::NotLoaded,
                    )
                })
                .collect(),
            visible_pages: visible,
            latest_available_page: latest,
            ..LayoutState::default()
        }
    }

    #[test]
    fn load_window_extends_visible_pages() {
        assert_eq!(load_window(&state(10, vec![4, 5], 10), 2), 2..=7);
        assert_eq!(load_window(&state(10, vec![1], 10), 2), 1..=3);
        assert_eq!(load_window(&state(10, vec![9, 10], 10), 3), 6..=10);
    }

    #[test]
    fn load_window_stops_at_latest_available_page() {
        assert_eq!(load_window(&state(10, vec![1], 2), 4), 1..=2);
    }

    #[test]
    fn load_window_without_visible_pages_uses_current_page() {
        let mut state = state(10, vec![], 10);
        state.current_page = 6;
        assert_eq!(load_window(&state, 1), 5..=7);
    }
}
