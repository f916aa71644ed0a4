//! Document stylesheet, fetched once per scope

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::LazyLock;

use log::debug;
use regex::{Captures, Regex};

use crate::config::SharedConfig;
use crate::error::AssetError;
use crate::promise::{Promise, Status};
use crate::scope::Scope;

use super::{ASSET_REQUEST_RETRIES, DataProvider, Fetcher, asset_url};

static FONT_FAMILY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"font-family:[\s"']*([\w-]+)\b"#).expect("Failed to compile font-family regex")
});

/// Suffix every `font-family` name with `-{viewer_id}`.
///
/// Legacy engines cache web fonts by family name across documents.
#[must_use]
pub fn scope_font_families(css: &str, viewer_id: &str) -> String {
    FONT_FAMILY
        .replace_all(css, |caps: &Captures| format!("{}-{viewer_id}", &caps[0]))
        .into_owned()
}

pub struct StylesheetProvider {
    config: SharedConfig,
    fetcher: Rc<Fetcher>,
    cached: RefCell<Option<Promise<String, AssetError>>>,
}

impl DataProvider for StylesheetProvider {
    type Key = ();
    type Asset = String;

    fn create(scope: &Scope) -> Self {
        Self {
            config: scope.shared_config(),
            fetcher: scope.utility::<Fetcher>(),
            cached: RefCell::new(None),
        }
    }

    fn url(&self, _key: &()) -> String {
        let config = self.config.borrow();
        asset_url(&config, &config.template.css, None)
    }

    fn get(&self, key: &()) -> Promise<String, AssetError> {
        let mut cached = self.cached.borrow_mut();
        if let Some(promise) = cached.as_ref() {
            // An aborted request is not worth remembering
            if promise.status() != Status::Cancelled {
                return promise.clone();
            }
            debug!("Stylesheet request was aborted, fetching again");
        }

        let (legacy, viewer_id) = {
            let config = self.config.borrow();
            (config.capabilities.legacy_text_engine, config.id.clone())
        };
        let promise = self
            .fetcher
            .fetch(self.url(key), ASSET_REQUEST_RETRIES, move |url, body| {
                let css = String::from_utf8(body).map_err(|err| AssetError::Parse {
                    resource: url.to_string(),
                    error: err.to_string(),
                })?;
                Ok(if legacy {
                    scope_font_families(&css, &viewer_id)
                } else {
                    css
                })
            });
        *cached = Some(promise.clone());
        promise
    }

    fn destroy(&self) {
        if let Some(promise) = self.cached.borrow_mut().take() {
            promise.abort();
        }
    }
}
