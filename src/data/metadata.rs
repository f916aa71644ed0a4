//! Document metadata (`info.json`)

use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::config::SharedConfig;
use crate::error::AssetError;
use crate::promise::Promise;
use crate::scope::Scope;
use crate::types::PageSize;

use super::{ASSET_REQUEST_RETRIES, DataProvider, Fetcher, asset_url};

/// Converted document description
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub numpages: usize,
    /// Default page size
    pub dimensions: PageSize,
    /// Per-page sizes, when pages differ
    #[serde(default)]
    pub pages: Vec<PageSize>,
    #[serde(rename = "type", default)]
    pub doc_type: Option<String>,
}

impl DocumentMetadata {
    /// Parse `info.json`; `resource` names the source in errors
    pub fn parse(resource: &str, body: &[u8]) -> Result<Self, AssetError> {
        let metadata: DocumentMetadata =
            serde_json::from_slice(body).map_err(|err| AssetError::Parse {
                resource: resource.to_string(),
                error: err.to_string(),
            })?;
        if metadata.numpages == 0 {
            return Err(AssetError::Parse {
                resource: resource.to_string(),
                error: "document has no pages".to_string(),
            });
        }
        Ok(metadata)
    }

    /// Natural size of 1-based page `page`
    #[must_use]
    pub fn page_size(&self, page: usize) -> PageSize {
        page.checked_sub(1)
            .and_then(|index| self.pages.get(index))
            .copied()
            .unwrap_or(self.dimensions)
    }

    /// Widest page width and tallest page height
    #[must_use]
    pub fn max_page_size(&self) -> PageSize {
        (1..=self.numpages)
            .map(|page| self.page_size(page))
            .fold(PageSize::new(0.0, 0.0), |max, size| {
                PageSize::new(max.width.max(size.width), max.height.max(size.height))
            })
    }
}

pub struct MetadataProvider {
    config: SharedConfig,
    fetcher: Rc<Fetcher>,
}

impl DataProvider for MetadataProvider {
    type Key = ();
    type Asset = DocumentMetadata;

    fn create(scope: &Scope) -> Self {
        Self {
            config: scope.shared_config(),
            fetcher: scope.utility::<Fetcher>(),
        }
    }

    fn url(&self, _key: &()) -> String {
        let config = self.config.borrow();
        asset_url(&config, &config.template.json, None)
    }

    fn get(&self, key: &()) -> Promise<DocumentMetadata, AssetError> {
        self.fetcher
            .fetch(self.url(key), ASSET_REQUEST_RETRIES, |url, body| {
                DocumentMetadata::parse(url, &body)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_default_to_document_dimensions() {
        let metadata = DocumentMetadata::parse(
            "info.json",
            br#"{"numpages": 3, "dimensions": {"width": 612, "height": 792}}"#,
        )
        .unwrap();
        assert_eq!(metadata.page_size(2), PageSize::new(612.0, 792.0));
        assert_eq!(metadata.doc_type, None);
    }

    #[test]
    fn per_page_sizes_override_dimensions() {
        let metadata = DocumentMetadata::parse(
            "info.json",
            br#"{"numpages": 2, "type": "pdf", "dimensions": {"width": 612, "height": 792},
                 "pages": [{"width": 612, "height": 792}, {"width": 792, "height": 612}]}"#,
        )
        .unwrap();
        assert_eq!(metadata.page_size(2), PageSize::new(792.0, 612.0));
        assert_eq!(metadata.max_page_size(), PageSize::new(792.0, 792.0));
        assert_eq!(metadata.doc_type.as_deref(), Some("pdf"));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = DocumentMetadata::parse("https://x/info.json", b"{\"numpages\":").unwrap_err();
        assert!(matches!(err, AssetError::Parse { .. }));
        assert_eq!(err.resource(), "https://x/info.json");
        assert!(!err.is_retryable());
    }
}
