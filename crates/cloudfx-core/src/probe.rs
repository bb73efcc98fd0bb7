//! Render probes
//!
//! A probe answers one question: can this URL be decoded as an image right
//! now? Derived assets render asynchronously on the service side, so early
//! probes usually fail with 404/420 or a truncated body.

use crate::error::ProbeError;
use async_trait::async_trait;
use image::ImageError;
use reqwest::header::CONTENT_TYPE;
use url::Url;

/// Decodability check for a delivery URL
#[async_trait]
pub trait RenderProbe: Send + Sync {
    /// `Ok` once the URL serves a decodable image
    ///
    /// # Errors
    /// Any reason the image is not yet available
    async fn probe(&self, url: &Url) -> Result<(), ProbeError>;
}

/// Probe that fetches the URL and fully decodes the body
///
/// A non-empty `image/*` body in a format the decoder does not support
/// (AVIF, for instance) is accepted on its status and content type alone.
#[derive(Debug, Clone, Default)]
pub struct HttpImageProbe {
    client: reqwest::Client,
}

impl HttpImageProbe {
    /// Create probe with a default client
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create probe around an existing client
    #[inline]
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RenderProbe for HttpImageProbe {
    async fn probe(&self, url: &Url) -> Result<(), ProbeError> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = response.bytes().await?;

        match decode_dimensions(&body) {
            Ok((width, height)) => {
                tracing::debug!(%url, width, height, "probe decoded image");
                Ok(())
            }
            Err(ProbeError::Unsupported(reason))
                if !body.is_empty() && content_type.as_deref().is_some_and(is_image_type) =>
            {
                tracing::debug!(%url, content_type, %reason, "accepting undecodable image type");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

fn is_image_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|mime| mime.trim().to_ascii_lowercase().starts_with("image/"))
}

/// Decode an image body, returning its dimensions
///
/// # Errors
/// `ProbeError::Unsupported` for a known but disabled format,
/// `ProbeError::Decode` if the bytes are not a complete image
pub fn decode_dimensions(bytes: &[u8]) -> Result<(u32, u32), ProbeError> {
    let format = image::guess_format(bytes).map_err(|e| ProbeError::Decode(e.to_string()))?;
    let decoded = image::load_from_memory_with_format(bytes, format).map_err(|e| match e {
        ImageError::Unsupported(_) => ProbeError::Unsupported(e.to_string()),
        _ => ProbeError::Decode(e.to_string()),
    })?;
    Ok((decoded.width(), decoded.height()))
}
