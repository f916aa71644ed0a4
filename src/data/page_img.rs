//! Raster page images

use std::rc::Rc;
use std::sync::Arc;

use image::{DynamicImage, GenericImageView};

use crate::config::SharedConfig;
use crate::error::AssetError;
use crate::promise::Promise;
use crate::scope::Scope;

use super::{ASSET_REQUEST_RETRIES, DataProvider, Fetcher, asset_url};

/// Decoded page image
#[derive(Clone, Debug)]
pub struct PageImage {
    pub width: u32,
    pub height: u32,
    pub image: Arc<DynamicImage>,
}

impl PageImage {
    pub fn decode(resource: &str, body: &[u8]) -> Result<Self, AssetError> {
        let image = image::load_from_memory(body).map_err(|err| AssetError::Decode {
            resource: resource.to_string(),
            error: err.to_string(),
        })?;
        let (width, height) = image.dimensions();
        Ok(Self {
            width,
            height,
            image: Arc::new(image),
        })
    }
}

pub struct PageImageProvider {
    config: SharedConfig,
    fetcher: Rc<Fetcher>,
}

impl DataProvider for PageImageProvider {
    type Key = usize;
    type Asset = PageImage;

    fn create(scope: &Scope) -> Self {
        Self {
            config: scope.shared_config(),
            fetcher: scope.utility::<Fetcher>(),
        }
    }

    fn url(&self, page: &usize) -> String {
        let config = self.config.borrow();
        asset_url(&config, &config.template.img, Some(*page))
    }

    fn get(&self, page: &usize) -> Promise<PageImage, AssetError> {
        // Decode errors are retried like transport errors
        self.fetcher
            .fetch(self.url(page), ASSET_REQUEST_RETRIES, |url, body| {
                PageImage::decode(url, &body)
            })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{ImageFormat, RgbaImage};

    use super::*;

    #[test]
    fn decodes_png_dimensions() {
        let mut png = Vec::new();
        DynamicImage::ImageRgba8(RgbaImage::new(4, 3))
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();

        let page = PageImage::decode("page-1.png", &png).unwrap();
        assert_eq!((page.width, page.height), (4, 3));
    }

    #[test]
    fn garbage_is_a_retryable_decode_error() {
        let err = PageImage::decode("page-1.png", b"not an image").unwrap_err();
        assert!(matches!(err, AssetError::Decode { .. }));
        assert!(err.is_retryable());
    }
}
