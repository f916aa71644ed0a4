//! Asset data providers
//!
//! Each provider maps a key (usually a 1-based page number) to an asset URL
//! and fetches it on the [`Fetcher`] worker pool, returning a cancellable
//! promise. Providers are memoized per scope; see
//! [`Scope::data_provider`](crate::scope::Scope::data_provider).

mod fetcher;
mod metadata;
mod page_img;
mod page_svg;
mod page_text;
mod stylesheet;
mod transport;

use std::any::Any;
use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::config::Config;
use crate::error::AssetError;
use crate::promise::Promise;
use crate::scope::Scope;

pub use fetcher::Fetcher;
pub use metadata::{DocumentMetadata, MetadataProvider};
pub use page_img::{PageImage, PageImageProvider};
pub use page_svg::{MAX_DATA_URLS, PageSvgProvider, SUBPIXEL_RENDERING_FIX, SvgTransform};
pub use page_text::{MAX_TEXT_BOXES, PageTextProvider, TextTransform};
pub use stylesheet::{StylesheetProvider, scope_font_families};
pub use transport::{EventStreamConnector, HttpTransport, Transport};

/// Retries after the first failed attempt of an asset request
pub const ASSET_REQUEST_RETRIES: usize = 1;

/// Source of one kind of asset
pub trait DataProvider: Any {
    type Key;
    type Asset: Clone + Send + 'static;

    fn create(scope: &Scope) -> Self
    where
        Self: Sized;

    /// Request URL for `key`; depends only on configuration
    fn url(&self, key: &Self::Key) -> String;

    fn get(&self, key: &Self::Key) -> Promise<Self::Asset, AssetError>;

    /// Called when the owning scope is destroyed
    fn destroy(&self) {}
}

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*(\w+)\s*\}\}").expect("Failed to compile placeholder regex")
});

/// Substitute `{{name}}` placeholders; unknown names become empty
#[must_use]
pub fn template(path: &str, params: &HashMap<&str, String>) -> String {
    PLACEHOLDER
        .replace_all(path, |caps: &Captures| {
            params.get(&caps[1]).cloned().unwrap_or_default()
        })
        .into_owned()
}

/// Full request URL of `path` for optional page `page`
#[must_use]
pub fn asset_url(config: &Config, path: &str, page: Option<usize>) -> String {
    let mut params = HashMap::new();
    if let Some(page) = page {
        params.insert("page", page.to_string());
    }
    format!(
        "{}{}{}",
        config.base_url(),
        template(path, &params),
        config.query_string()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_substitutes_known_placeholders() {
        let params = HashMap::from([("page", "12".to_string())]);
        assert_eq!(template("page-{{page}}.svg", &params), "page-12.svg");
        assert_eq!(template("page-{{ page }}.svg", &params), "page-12.svg");
        assert_eq!(template("x-{{other}}.svg", &params), "x-.svg");
        assert_eq!(template("info.json", &params), "info.json");
    }

    #[test]
    fn asset_url_joins_base_template_and_query() {
        let mut config = Config::with_url("https://cdn.example.com/doc");
        config.query_params.insert("token".into(), "abc".into());
        assert_eq!(
            asset_url(&config, &config.template.svg, Some(3)),
            "https://cdn.example.com/doc/page-3.svg?token=abc"
        );
        assert_eq!(
            asset_url(&config, &config.template.json, None),
            "https://cdn.example.com/doc/info.json?token=abc"
        );
    }
}
