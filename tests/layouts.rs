use crocodoc::config::LayoutMode;
use crocodoc::framework::ComponentKind;
use crocodoc::layout::{LayoutPhase, PageStatus};
use crocodoc::message::Message;
use crocodoc::scope::{ComponentHandle, Scope};
use crocodoc::test_utils::layout_scope_with;
use crocodoc::types::{PageSize, ScrollPosition, Viewport};
use crocodoc::zoom::{ZoomDirection, ZoomMode, ZoomRequest};

fn open(
    mode: LayoutMode,
    num_pages: usize,
    adjust: impl FnOnce(&mut crocodoc::Config),
) -> (Scope, ComponentHandle) {
    let scope = layout_scope_with(
        num_pages,
        PageSize::new(100.0, 200.0),
        Viewport::new(200.0, 300.0),
        |config| {
            config.layout = mode;
            adjust(config);
        },
    );
    let handle = scope
        .create_component(ComponentKind::for_layout(mode).name())
        .unwrap();
    (scope, handle)
}

#[test]
fn every_layout_reports_its_mode() {
    for mode in LayoutMode::ALL {
        let (_scope, handle) = open(mode, 4, |_| {});
        let component = handle.borrow();
        let layout = component.as_layout().unwrap();
        assert_eq!(layout.mode(), mode);
        assert_eq!(layout.state().phase, LayoutPhase::Initialized);
        assert_eq!(layout.state().num_pages(), 4);
    }
}

#[test]
fn stepping_zoom_snaps_to_levels_and_stops_at_the_ends() {
    let (scope, handle) = open(LayoutMode::Vertical, 4, |config| {
        config.zoom_levels = vec![0.5, 1.0, 2.0];
        config.max_zoom = Some(2.0);
        config.min_zoom = Some(0.5);
    });
    let mut component = handle.borrow_mut();
    let layout = component.as_layout_mut().unwrap();

    assert_eq!(layout.calculate_next_zoom_level(ZoomDirection::In), Some(1.4));
    assert!(layout.set_zoom(ZoomRequest::Value(2.0)));
    assert!(!layout.state().zoom_state.can_zoom_in);
    assert!(!layout.set_zoom(ZoomRequest::Step(ZoomDirection::In)));

    assert!(layout.set_zoom(ZoomRequest::Value(9.0)));
    assert_eq!(layout.state().zoom_state.zoom, 2.0);

    assert!(layout.set_zoom(ZoomRequest::Mode(ZoomMode::FitHeight)));
    assert_eq!(scope.config().zoom, ZoomRequest::Mode(ZoomMode::FitHeight));
}

#[test]
fn navigation_is_clamped_to_available_pages() {
    let (scope, handle) = open(LayoutMode::Vertical, 6, |config| {
        config.conversion_is_complete = false;
    });

    {
        let component = handle.borrow();
        let layout = component.as_layout().unwrap();
        assert_eq!(layout.state().latest_available_page, 1);
        assert_eq!(layout.calculate_next_page(), 1);
        assert_eq!(layout.state().pages[3].status, PageStatus::Unavailable);
    }

    scope.broadcast(Message::PageAvailable { upto: 3 });

    let mut component = handle.borrow_mut();
    let layout = component.as_layout_mut().unwrap();
    assert_eq!(layout.calculate_next_page(), 2);
    assert_eq!(layout.scroll_to_page(6), 3);
    assert_eq!(layout.state().pages[2].status, PageStatus::NotLoaded);
    assert_eq!(layout.state().pages[3].status, PageStatus::Unavailable);
}

#[test]
fn page_messages_update_page_status() {
    let (scope, handle) = open(LayoutMode::Presentation, 3, |_| {});

    scope.broadcast(Message::PageLoad { page: 1 });
    scope.broadcast(Message::PageFail {
        page: 2,
        error: "HTTP status 500".into(),
    });
    scope.broadcast(Message::PageUnload { page: 1 });
    scope.broadcast(Message::PageLoad { page: 3 });

    let component = handle.borrow();
    let pages = &component.as_layout().unwrap().state().pages;
    assert_eq!(pages[0].status, PageStatus::NotLoaded);
    assert_eq!(pages[1].status, PageStatus::Failed);
    assert_eq!(pages[2].status, PageStatus::Loaded);
}

#[test]
fn destroyed_layout_ignores_messages() {
    let (scope, handle) = open(LayoutMode::Vertical, 5, |_| {});
    scope.destroy_component(&handle);

    scope.broadcast(Message::Scroll(ScrollPosition::new(700.0, 0.0)));

    let component = handle.borrow();
    let state = component.as_layout().unwrap().state();
    assert_eq!(state.phase, LayoutPhase::Destroyed);
    assert_eq!(state.current_page, 1);
}

#[test]
fn single_column_and_text_layouts_stack_pages() {
    for mode in [LayoutMode::VerticalSingleColumn, LayoutMode::Text] {
        let scope = layout_scope_with(
            4,
            PageSize::new(100.0, 200.0),
            Viewport::new(900.0, 300.0),
            |config| config.layout = mode,
        );
        let handle = scope
            .create_component(ComponentKind::for_layout(mode).name())
            .unwrap();
        let component = handle.borrow();
        let pages = &component.as_layout().unwrap().state().pages;
        assert!(pages.windows(2).all(|pair| pair[1].y0 > pair[0].y0), "{mode:?}");
        assert!(pages.iter().all(|page| page.x0 == pages[0].x0), "{mode:?}");
    }
}
