use base64::engine::general_purpose::STANDARD as BASE64;
use base64::engine::Engine;
use futures_util::future::{FutureExt, LocalBoxFuture};
use image::{DynamicImage, GenericImageView};
use log::debug;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use crate::error::{Error, Result};

/// Decoded raster image shown inside a node preview. Cheap to clone.
#[derive(Clone)]
pub struct PreviewImage {
    inner: Rc<DynamicImage>,
}

impl PreviewImage {
    pub fn new(image: DynamicImage) -> Self {
        Self {
            inner: Rc::new(image),
        }
    }

    /// Blank RGBA image, mostly useful for tests and placeholders
    pub fn blank(width: u32, height: u32) -> Self {
        Self::new(DynamicImage::new_rgba8(width, height))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(Self::new(image::load_from_memory(bytes)?))
    }

    /// Decode a `data:image/<fmt>;base64,<payload>` URI
    pub fn from_data_uri(uri: &str) -> Result<Self> {
        let rest = uri
            .strip_prefix("data:image/")
            .ok_or_else(|| Error::InvalidResult("not an image data URI".to_string()))?;
        let (_, payload) = rest
            .split_once(";base64,")
            .ok_or_else(|| Error::InvalidResult("data URI is not base64 encoded".to_string()))?;
        let bytes = BASE64
            .decode(payload.trim())
            .map_err(|e| Error::InvalidResult(format!("bad base64 payload: {e}")))?;
        Self::decode(&bytes)
    }

    pub fn width(&self) -> u32 {
        self.inner.width()
    }

    pub fn height(&self) -> u32 {
        self.inner.height()
    }

    /// Width / height, `None` for a zero-sized image
    pub fn aspect_ratio(&self) -> Option<f32> {
        let (w, h) = self.inner.dimensions();
        if w == 0 || h == 0 {
            return None;
        }
        Some(w as f32 / h as f32)
    }
}

impl fmt::Debug for PreviewImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewImage")
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

/// Host image-loading primitive. The returned future runs on the UI thread.
pub trait ImageFetcher {
    fn fetch(&self, url: String) -> LocalBoxFuture<'static, Result<PreviewImage>>;
}

/// Fetches image bytes over HTTP and decodes them
pub struct HttpImageFetcher {
    client: reqwest::Client,
}

impl HttpImageFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

impl ImageFetcher for HttpImageFetcher {
    fn fetch(&self, url: String) -> LocalBoxFuture<'static, Result<PreviewImage>> {
        let client = self.client.clone();
        async move {
            debug!("[ImageFetch] GET {}", url);
            let response = client.get(&url).send().await.map_err(|e| Error::FetchFailure {
                url: url.clone(),
                reason: e.to_string(),
            })?;

            let status = response.status();
            if !status.is_success() {
                return Err(Error::FetchFailure {
                    url,
                    reason: format!("status {status}"),
                });
            }

            let bytes = response.bytes().await?;
            let image = PreviewImage::decode(&bytes)?;
            debug!(
                "[ImageFetch] decoded {}x{} from {}",
                image.width(),
                image.height(),
                url
            );
            Ok(image)
        }
        .boxed_local()
    }
}
