//! HTML text layers

use std::rc::Rc;
use std::sync::LazyLock;

use log::debug;
use regex::Regex;

use crate::config::{Config, LayoutMode, SharedConfig};
use crate::error::AssetError;
use crate::promise::Promise;
use crate::scope::Scope;

use super::{ASSET_REQUEST_RETRIES, DataProvider, Fetcher, asset_url};

/// Text layers with more boxes than this are dropped outside the text layout
pub const MAX_TEXT_BOXES: usize = 256;

static STYLESHEET_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<link\b[^>]*\brel\s*=\s*["']?stylesheet["']?[^>]*>"#)
        .expect("Failed to compile stylesheet link regex")
});

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextTransform {
    /// Keep layers of any size
    pub unlimited_boxes: bool,
}

impl TextTransform {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            unlimited_boxes: config.layout == LayoutMode::Text,
        }
    }

    #[must_use]
    pub fn apply(&self, html: &str) -> String {
        if !self.unlimited_boxes {
            let boxes = html.matches("<div").count();
            if boxes > MAX_TEXT_BOXES {
                debug!("Dropping text layer with {boxes} boxes");
                return String::new();
            }
        }
        STYLESHEET_LINK.replace_all(html, "").into_owned()
    }
}

pub struct PageTextProvider {
    config: SharedConfig,
    fetcher: Rc<Fetcher>,
}

impl DataProvider for PageTextProvider {
    type Key = usize;
    type Asset = String;

    fn create(scope: &Scope) -> Self {
        Self {
            config: scope.shared_config(),
            fetcher: scope.utility::<Fetcher>(),
        }
    }

    fn url(&self, page: &usize) -> String {
        let config = self.config.borrow();
        asset_url(&config, &config.template.html, Some(*page))
    }

    fn get(&self, page: &usize) -> Promise<String, AssetError> {
        let transform = TextTransform::from_config(&self.config.borrow());
        self.fetcher
            .fetch(self.url(page), ASSET_REQUEST_RETRIES, move |url, body| {
                let html = String::from_utf8(body).map_err(|err| AssetError::Parse {
                    resource: url.to_string(),
                    error: err.to_string(),
                })?;
                Ok(transform.apply(&html))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_stylesheet_link() {
        let html = r#"<link rel="stylesheet" href="stylesheet.css"><div class="t">Hi</div>"#;
        let out = TextTransform { unlimited_boxes: false }.apply(html);
        assert_eq!(out, r#"<div class="t">Hi</div>"#);
    }

    #[test]
    fn crowded_layers_are_dropped_outside_text_layout() {
        let html = "<div>x</div>".repeat(MAX_TEXT_BOXES + 1);
        assert_eq!(TextTransform { unlimited_boxes: false }.apply(&html), "");
        assert_eq!(TextTransform { unlimited_boxes: true }.apply(&html), html);

        let at_limit = "<div>x</div>".repeat(MAX_TEXT_BOXES);
        assert_eq!(TextTransform { unlimited_boxes: false }.apply(&at_limit), at_limit);
    }

    #[test]
    fn text_layout_lifts_box_limit() {
        let mut config = Config::default();
        assert!(!TextTransform::from_config(&config).unlimited_boxes);
        config.layout = LayoutMode::Text;
        assert!(TextTransform::from_config(&config).unlimited_boxes);
    }
}
