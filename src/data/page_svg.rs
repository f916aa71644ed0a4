//! SVG page markup and its load-time transforms

use std::rc::Rc;
use std::sync::LazyLock;

use log::debug;
use regex::{Captures, Regex};

use crate::config::{Config, SharedConfig};
use crate::error::AssetError;
use crate::promise::Promise;
use crate::scope::Scope;

use super::{ASSET_REQUEST_RETRIES, DataProvider, Fetcher, asset_url};

/// Above this many embedded images, small ones are stripped
pub const MAX_DATA_URLS: usize = 1000;

/// Largest embedded image stripped from crowded pages, in bytes of markup
pub const MAX_STRIPPED_DATA_URL_LEN: usize = 5 * 1024;

/// Injected when the host positions SVG text on whole pixels only
pub const SUBPIXEL_RENDERING_FIX: &str =
    "<style>text { text-rendering: geometricPrecision; }</style>";

static EMBEDDED_IMAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<image\b[^>]*?\bhref\s*=\s*"(data:image[^"]*)"[^>]*?(?:/>|>\s*</image>)"#)
        .expect("Failed to compile embedded image regex")
});

static HREF_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\b((?:xlink:)?href)\s*=\s*"([^"]*)""#).expect("Failed to compile href regex")
});

static SVG_OPEN_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<svg\b[^>]*>").expect("Failed to compile svg tag regex"));

/// Rewrites applied to raw SVG markup, captured from configuration
#[derive(Clone, Debug, PartialEq)]
pub struct SvgTransform {
    pub base_url: String,
    pub query_string: String,
    pub inject_subpixel_fix: bool,
}

impl SvgTransform {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_url: config.base_url(),
            query_string: config.query_string(),
            inject_subpixel_fix: !config.capabilities.svg_subpixel_rendering,
        }
    }

    #[must_use]
    pub fn apply(&self, svg: &str) -> String {
        let svg = prune_data_urls(svg);
        let svg = self.rewrite_hrefs(&svg);
        if self.inject_subpixel_fix {
            inject_after_svg_tag(&svg, SUBPIXEL_RENDERING_FIX)
        } else {
            svg
        }
    }

    fn rewrite_hrefs(&self, svg: &str) -> String {
        let query = self.query_string.replace('&', "&#38;");
        HREF_ATTR
            .replace_all(svg, |caps: &Captures| {
                let value = &caps[2];
                if is_absolute_ref(value) {
                    caps[0].to_string()
                } else {
                    format!("{}=\"{}{}{}\"", &caps[1], self.base_url, value, query)
                }
            })
            .into_owned()
    }
}

fn is_absolute_ref(value: &str) -> bool {
    value.is_empty()
        || value.starts_with('#')
        || value.starts_with("data:")
        || value.starts_with("//")
        || value.contains("://")
}

/// Strip small embedded images once a page holds too many of them
#[must_use]
pub fn prune_data_urls(svg: &str) -> String {
    let count = svg.matches("data:image").count();
    if count <= MAX_DATA_URLS {
        return svg.to_string();
    }
    debug!("Pruning embedded images from SVG with {count} data URLs");
    EMBEDDED_IMAGE
        .replace_all(svg, |caps: &Captures| {
            if caps[1].len() <= MAX_STRIPPED_DATA_URL_LEN {
                String::new()
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

fn inject_after_svg_tag(svg: &str, snippet: &str) -> String {
    SVG_OPEN_TAG
        .replacen(svg, 1, |caps: &Captures| format!("{}{snippet}", &caps[0]))
        .into_owned()
}

pub struct PageSvgProvider {
    config: SharedConfig,
    fetcher: Rc<Fetcher>,
}

impl DataProvider for PageSvgProvider {
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
        asset_url(&config, &config.template.svg, Some(*page))
    }

    fn get(&self, page: &usize) -> Promise<String, AssetError> {
        let transform = SvgTransform::from_config(&self.config.borrow());
        self.fetcher
            .fetch(self.url(page), ASSET_REQUEST_RETRIES, move |url, body| {
                let svg = String::from_utf8(body).map_err(|err| AssetError::Parse {
                    resource: url.to_string(),
                    error: err.to_string(),
                })?;
                Ok(transform.apply(&svg))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transform(inject: bool) -> SvgTransform {
        SvgTransform {
            base_url: "https://cdn/doc/".into(),
            query_string: "?a=1&b=2".into(),
            inject_subpixel_fix: inject,
        }
    }

    #[test]
    fn relative_hrefs_become_absolute_with_escaped_query() {
        let svg = r##"<svg><image xlink:href="img-1.png"/><use href="#glyph"/><a href="https://x/"/></svg>"##;
        let out = transform(false).apply(svg);
        assert_eq!(
            out,
            r##"<svg><image xlink:href="https://cdn/doc/img-1.png?a=1&#38;b=2"/><use href="#glyph"/><a href="https://x/"/></svg>"##
        );
    }

    #[test]
    fn subpixel_fix_goes_right_after_opening_tag() {
        let svg = r#"<?xml version="1.0"?><svg width="10"><svg id="inner"></svg></svg>"#;
        let out = transform(true).apply(svg);
        assert_eq!(
            out,
            format!(
                r#"<?xml version="1.0"?><svg width="10">{SUBPIXEL_RENDERING_FIX}<svg id="inner"></svg></svg>"#
            )
        );
        assert_eq!(transform(false).apply(svg), svg);
    }

    #[test]
    fn few_data_urls_are_kept() {
        let svg = r#"<svg><image href="data:image/png;base64,AAAA"/></svg>"#;
        assert_eq!(prune_data_urls(svg), svg);
    }

    #[test]
    fn crowded_pages_lose_small_embedded_images_only() {
        let small = r#"<image href="data:image/png;base64,AAAA"/>"#;
        let large = format!(
            r#"<image href="data:image/png;base64,{}"/>"#,
            "B".repeat(MAX_STRIPPED_DATA_URL_LEN + 1)
        );
        let svg = format!("<svg>{}{large}</svg>", small.repeat(MAX_DATA_URLS));

        let out = prune_data_urls(&svg);

        assert_eq!(out, format!("<svg>{large}</svg>"));
    }
}
