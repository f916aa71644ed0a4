use std::io::Cursor;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use crocodoc::config::{Config, LayoutMode};
use crocodoc::data::{
    DataProvider, MAX_TEXT_BOXES, MetadataProvider, PageImageProvider, PageSvgProvider,
    PageTextProvider, StylesheetProvider, SUBPIXEL_RENDERING_FIX,
};
use crocodoc::error::{AssetError, TransportError};
use crocodoc::framework::Framework;
use crocodoc::promise::{Outcome, Status};
use crocodoc::scope::Scope;
use crocodoc::test_utils::{GatedTransport, ScriptedTransport, metadata_json};
use crocodoc::types::PageSize;

const BASE: &str = "https://cdn.example.com/doc/";
const WAIT: Duration = Duration::from_secs(5);

fn scope_over(transport: Arc<ScriptedTransport>, adjust: impl FnOnce(&mut Config)) -> Scope {
    let mut config = Config::with_url("https://cdn.example.com/doc");
    adjust(&mut config);
    Scope::new(Rc::new(Framework::new(transport)), config)
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgba8(image::RgbaImage::new(width, height))
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

#[test]
fn metadata_requests_are_fresh_every_time() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.serve(
        &format!("{BASE}info.json"),
        metadata_json(3, PageSize::new(612.0, 792.0)),
    );
    let scope = scope_over(transport.clone(), |_| {});

    let first = scope.get::<MetadataProvider>(&());
    let second = scope.get::<MetadataProvider>(&());

    assert!(!first.ptr_eq(&second));
    let metadata = first.wait_timeout(WAIT).and_then(Outcome::ok).unwrap();
    assert_eq!(metadata.numpages, 3);
    second.wait_timeout(WAIT);
    assert_eq!(transport.request_count(&format!("{BASE}info.json")), 2);
}

#[test]
fn stylesheet_is_requested_once_per_scope() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.serve(&format!("{BASE}stylesheet.css"), ".t { color: red; }");
    let scope = scope_over(transport.clone(), |_| {});

    let first = scope.get::<StylesheetProvider>(&());
    let second = scope.get::<StylesheetProvider>(&());

    assert!(first.ptr_eq(&second));
    assert_eq!(
        first.wait_timeout(WAIT),
        Some(Outcome::Resolved(".t { color: red; }".to_string()))
    );
    assert_eq!(transport.request_count(&format!("{BASE}stylesheet.css")), 1);

    let other = scope_over(transport.clone(), |_| {});
    assert!(!other.get::<StylesheetProvider>(&()).ptr_eq(&first));
}

#[test]
fn legacy_engines_get_scoped_font_families() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.serve(&format!("{BASE}stylesheet.css"), "p { font-family: fnt3; }");
    let scope = scope_over(transport, |config| {
        config.id = "viewer-9".into();
        config.capabilities.legacy_text_engine = true;
    });

    let css = scope
        .get::<StylesheetProvider>(&())
        .wait_timeout(WAIT)
        .and_then(Outcome::ok)
        .unwrap();

    assert_eq!(css, "p { font-family: fnt3-viewer-9; }");
}

#[test]
fn svg_requests_retry_once_then_reject() {
    let transport = Arc::new(ScriptedTransport::new());
    let url = format!("{BASE}page-2.svg");
    transport.respond(&url, Err(TransportError::Status { status: 502 }));
    transport.respond(&url, Err(TransportError::Status { status: 502 }));
    transport.serve(&url, "<svg></svg>");
    let scope = scope_over(transport.clone(), |_| {});

    let outcome = scope.get::<PageSvgProvider>(&2).wait_timeout(WAIT);

    match outcome {
        Some(Outcome::Rejected(AssetError::Transport { resource, error })) => {
            assert_eq!(resource, url);
            assert!(error.contains("502"));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(transport.request_count(&url), 2);
}

#[test]
fn svg_without_subpixel_rendering_gets_style_fix() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.serve(
        &format!("{BASE}page-1.svg"),
        r#"<svg width="10"><image xlink:href="img/p1.png"/></svg>"#,
    );
    let scope = scope_over(transport, |config| {
        config.capabilities.svg_subpixel_rendering = false;
        config.query_params.insert("token".into(), "t".into());
    });

    let svg = scope
        .get::<PageSvgProvider>(&1)
        .wait_timeout(WAIT)
        .and_then(Outcome::ok)
        .unwrap();

    assert_eq!(
        svg,
        format!(
            r#"<svg width="10">{SUBPIXEL_RENDERING_FIX}<image xlink:href="{BASE}img/p1.png?token=t"/></svg>"#
        )
    );
}

#[test]
fn page_images_are_decoded() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.serve(&format!("{BASE}page-4.png"), png_bytes(3, 5));
    let scope = scope_over(transport, |_| {});

    let image = scope
        .get::<PageImageProvider>(&4)
        .wait_timeout(WAIT)
        .and_then(Outcome::ok)
        .unwrap();

    assert_eq!((image.width, image.height), (3, 5));
}

#[test]
fn undecodable_images_are_retried_then_rejected() {
    let transport = Arc::new(ScriptedTransport::new());
    let url = format!("{BASE}page-1.png");
    transport.serve(&url, b"not a png".to_vec());
    let scope = scope_over(transport.clone(), |_| {});

    let outcome = scope.get::<PageImageProvider>(&1).wait_timeout(WAIT);

    assert!(matches!(outcome, Some(Outcome::Rejected(AssetError::Decode { .. }))));
    assert_eq!(transport.request_count(&url), 2);
}

#[test]
fn page_image_requests_are_fresh_every_time() {
    let transport = Arc::new(ScriptedTransport::new());
    let url = format!("{BASE}page-2.png");
    transport.serve(&url, png_bytes(2, 2));
    let scope = scope_over(transport.clone(), |_| {});

    let first = scope.get::<PageImageProvider>(&2);
    let second = scope.get::<PageImageProvider>(&2);

    assert!(!first.ptr_eq(&second));
    assert!(first.wait_timeout(WAIT).and_then(Outcome::ok).is_some());
    assert!(second.wait_timeout(WAIT).and_then(Outcome::ok).is_some());
    assert_eq!(transport.request_count(&url), 2);
}

#[test]
fn page_image_recovers_after_one_bad_body() {
    let transport = Arc::new(ScriptedTransport::new());
    let url = format!("{BASE}page-3.png");
    transport.respond(&url, Ok(b"not a png".to_vec()));
    transport.serve(&url, png_bytes(6, 4));
    let scope = scope_over(transport.clone(), |_| {});

    let image = scope
        .get::<PageImageProvider>(&3)
        .wait_timeout(WAIT)
        .and_then(Outcome::ok)
        .unwrap();

    assert_eq!((image.width, image.height), (6, 4));
    assert_eq!(transport.requests(), vec![url.clone(), url]);
}

#[test]
fn aborting_a_loaded_page_keeps_its_value() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.serve(&format!("{BASE}page-1.svg"), "<svg></svg>");
    let scope = scope_over(transport, |_| {});

    let svg = scope.get::<PageSvgProvider>(&1);
    let loaded = svg.wait_timeout(WAIT).and_then(Outcome::ok).unwrap();
    svg.abort();

    assert_eq!(svg.status(), Status::Resolved);
    assert_eq!(svg.wait_timeout(WAIT), Some(Outcome::Resolved(loaded)));
}

#[test]
fn crowded_text_layers_are_dropped_outside_text_layout() {
    let transport = Arc::new(ScriptedTransport::new());
    let html = format!(
        r#"<link rel="stylesheet" href="x.css">{}"#,
        "<div>w</div>".repeat(MAX_TEXT_BOXES + 1)
    );
    transport.serve(&format!("{BASE}text-1.html"), html.clone());

    let vertical = scope_over(transport.clone(), |_| {});
    let layer = vertical
        .get::<PageTextProvider>(&1)
        .wait_timeout(WAIT)
        .and_then(Outcome::ok)
        .unwrap();
    assert_eq!(layer, "");

    let text = scope_over(transport, |config| config.layout = LayoutMode::Text);
    let layer = text
        .get::<PageTextProvider>(&1)
        .wait_timeout(WAIT)
        .and_then(Outcome::ok)
        .unwrap();
    assert!(!layer.contains("<link"));
    assert_eq!(layer.matches("<div>").count(), MAX_TEXT_BOXES + 1);
}

#[test]
fn urls_depend_only_on_config() {
    let scope = scope_over(Arc::new(ScriptedTransport::new()), |config| {
        config.template.svg = "svg/{{page}}.svg".into();
        config.query_params.insert("v".into(), "3".into());
    });

    assert_eq!(
        scope.data_provider::<PageSvgProvider>().url(&12),
        format!("{BASE}svg/12.svg?v=3")
    );
    assert_eq!(
        scope.data_provider::<MetadataProvider>().url(&()),
        format!("{BASE}info.json?v=3")
    );
}

#[test]
fn destroying_scope_aborts_pending_stylesheet() {
    let transport = Arc::new(GatedTransport::new());
    let scope = Scope::new(
        Rc::new(Framework::new(transport.clone())),
        Config::with_url("https://cdn.example.com/doc"),
    );

    let stylesheet = scope.get::<StylesheetProvider>(&());
    transport.wait_entered();
    scope.destroy();
    transport.release(Ok(b"late".to_vec()));

    assert_eq!(stylesheet.wait_timeout(WAIT), Some(Outcome::Cancelled));
    assert_eq!(stylesheet.status(), Status::Cancelled);
}
