//! Remote upload client
//!
//! Sends raw image bytes to the service's unsigned upload endpoint and
//! returns the asset identifier it assigns. Two presets exist: one whose
//! server-side profile implies background removal, one neutral.

use crate::config::CloudConfig;
use crate::error::UploadError;
use async_trait::async_trait;
use cloudfx_transform::{AssetId, UploadChannel};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use url::Url;

/// Longest error body kept in `UploadError::Status`
const MAX_ERROR_BODY: usize = 512;

/// Image bytes plus the metadata sent with them
#[derive(Clone, PartialEq, Eq)]
pub struct ImageSource {
    file_name: String,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

impl ImageSource {
    /// Create from in-memory bytes
    #[must_use]
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let content_type = image::ImageFormat::from_path(&file_name)
            .ok()
            .map(|format| format.to_mime_type().to_string());
        Self {
            file_name,
            content_type,
            bytes,
        }
    }

    /// Read a file from disk
    ///
    /// # Errors
    /// IO failure
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map_or_else(|| "upload".to_string(), |n| n.to_string_lossy().into_owned());
        Ok(Self::new(file_name, bytes))
    }

    /// With explicit MIME type
    #[inline]
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// File name sent in the multipart body
    #[inline]
    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// MIME type, if known
    #[inline]
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Raw bytes
    #[inline]
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Byte length
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check if empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageSource")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Asset record returned by the upload endpoint
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadedAsset {
    /// Asset identifier
    pub public_id: AssetId,
    /// Plain delivery URL
    pub url: Url,
    /// Plain delivery URL over https
    #[serde(default)]
    pub secure_url: Option<Url>,
    /// Stored width
    #[serde(default)]
    pub width: Option<u32>,
    /// Stored height
    #[serde(default)]
    pub height: Option<u32>,
    /// Stored format
    #[serde(default)]
    pub format: Option<String>,
}

impl UploadedAsset {
    /// Plain delivery URL, preferring https when `secure`
    #[inline]
    #[must_use]
    pub fn delivery_url(&self, secure: bool) -> &Url {
        match (&self.secure_url, secure) {
            (Some(url), true) => url,
            _ => &self.url,
        }
    }
}

/// Upload seam
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Upload an image on the given channel
    ///
    /// # Errors
    /// Any transport, status or response failure
    async fn upload(
        &self,
        image: &ImageSource,
        channel: UploadChannel,
    ) -> Result<UploadedAsset, UploadError>;
}

/// Production uploader speaking the service's multipart upload API
#[derive(Debug, Clone)]
pub struct CloudinaryUploader {
    client: reqwest::Client,
    endpoint: Url,
    cloud_name: String,
    default_preset: String,
    neutral_preset: String,
}

impl CloudinaryUploader {
    /// Create uploader from configuration
    ///
    /// # Errors
    /// Invalid API base or HTTP client construction failure
    pub fn new(config: &CloudConfig) -> Result<Self, UploadError> {
        let mut builder = reqwest::Client::builder().user_agent(concat!(
            "cloudfx/",
            env!("CARGO_PKG_VERSION")
        ));
        if let Some(timeout) = config.upload_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;
        Self::with_client(client, config)
    }

    /// Create uploader around an existing client
    ///
    /// # Errors
    /// Invalid API base
    pub fn with_client(client: reqwest::Client, config: &CloudConfig) -> Result<Self, UploadError> {
        let api = config
            .api_url()
            .map_err(|e| UploadError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: upload_endpoint(&api, &config.cloud_name)?,
            cloud_name: config.cloud_name.clone(),
            default_preset: config.upload_preset.clone(),
            neutral_preset: config.neutral_preset.clone(),
        })
    }

    /// Upload endpoint URL
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Preset name used for a channel
    #[inline]
    #[must_use]
    pub fn preset(&self, channel: UploadChannel) -> &str {
        match channel {
            UploadChannel::Default => &self.default_preset,
            UploadChannel::Neutral => &self.neutral_preset,
        }
    }

    fn form(&self, image: &ImageSource, channel: UploadChannel) -> Result<Form, UploadError> {
        let mut file = Part::bytes(image.bytes().to_vec()).file_name(image.file_name().to_string());
        if let Some(content_type) = image.content_type() {
            file = file.mime_str(content_type)?;
        }

        Ok(Form::new()
            .part("file", file)
            .text("upload_preset", self.preset(channel).to_string())
            .text("cloud:name", self.cloud_name.clone()))
    }
}

#[async_trait]
impl Uploader for CloudinaryUploader {
    async fn upload(
        &self,
        image: &ImageSource,
        channel: UploadChannel,
    ) -> Result<UploadedAsset, UploadError> {
        let form = self.form(image, channel)?;
        tracing::debug!(
            endpoint = %self.endpoint,
            preset = self.preset(channel),
            bytes = image.len(),
            "sending upload"
        );

        let response = self
            .client
            .post(self.endpoint.clone())
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            return Err(rejection(status.as_u16(), &body));
        }
        parse_upload_response(&body)
    }
}

/// `{api}/v1_1/{cloud}/image/upload`
fn upload_endpoint(api: &Url, cloud_name: &str) -> Result<Url, UploadError> {
    let mut endpoint = api.clone();
    endpoint
        .path_segments_mut()
        .map_err(|()| UploadError::Transport(format!("api base cannot hold a path: {api}")))?
        .pop_if_empty()
        .extend(["v1_1", cloud_name, "image", "upload"]);
    Ok(endpoint)
}

/// Parse a success body
///
/// # Errors
/// `UploadError::MalformedResponse` if `public_id` or `url` are missing or
/// invalid
pub fn parse_upload_response(body: &[u8]) -> Result<UploadedAsset, UploadError> {
    serde_json::from_slice(body).map_err(|e| UploadError::MalformedResponse(e.to_string()))
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorMessage,
}

#[derive(Deserialize)]
struct ErrorMessage {
    message: String,
}

/// Map a non-success response to an error
fn rejection(status: u16, body: &[u8]) -> UploadError {
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(parsed) => UploadError::Rejected {
            status,
            message: parsed.error.message,
        },
        Err(_) => {
            let mut text = String::from_utf8_lossy(body).into_owned();
            if text.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !text.is_char_boundary(cut) {
                    cut -= 1;
                }
                text.truncate(cut);
            }
            UploadError::Status { status, body: text }
        }
    }
}
