//! Testing utilities for the cloudfx workspace
//!
//! Scripted fakes for the upload and render-probe seams, plus fixtures.

#![allow(missing_docs)]

use async_trait::async_trait;
use cloudfx_core::{
    CloudConfig, ImageSource, PollPolicy, ProbeError, RenderProbe, Session, UploadError,
    UploadedAsset, Uploader,
};
use cloudfx_transform::{AssetId, Catalog, UploadChannel, UrlComposer};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub const TEST_CLOUD: &str = "demo";

/// One recorded upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadCall {
    pub file_name: String,
    pub channel: UploadChannel,
}

/// Uploader returning scripted results in order
///
/// Once the script runs out every upload succeeds with a fresh
/// `asset-{n}` id.
#[derive(Debug, Default)]
pub struct FakeUploader {
    script: Mutex<VecDeque<(Duration, Result<UploadedAsset, UploadError>)>>,
    calls: Mutex<Vec<UploadCall>>,
}

impl FakeUploader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_ok(self, public_id: &str) -> Self {
        self.push(Duration::ZERO, Ok(uploaded_asset(public_id)))
    }

    pub fn then_err(self, err: UploadError) -> Self {
        self.push(Duration::ZERO, Err(err))
    }

    /// Succeed after `delay` of (tokio) time
    pub fn then_ok_after(self, public_id: &str, delay: Duration) -> Self {
        self.push(delay, Ok(uploaded_asset(public_id)))
    }

    pub fn then_err_after(self, err: UploadError, delay: Duration) -> Self {
        self.push(delay, Err(err))
    }

    fn push(self, delay: Duration, result: Result<UploadedAsset, UploadError>) -> Self {
        self.script.lock().push_back((delay, result));
        self
    }

    pub fn calls(&self) -> Vec<UploadCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl Uploader for FakeUploader {
    async fn upload(
        &self,
        image: &ImageSource,
        channel: UploadChannel,
    ) -> Result<UploadedAsset, UploadError> {
        let n = {
            let mut calls = self.calls.lock();
            calls.push(UploadCall {
                file_name: image.file_name().to_string(),
                channel,
            });
            calls.len()
        };

        let next = self.script.lock().pop_front();
        match next {
            Some((delay, result)) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                result
            }
            None => Ok(uploaded_asset(&format!("asset-{n}"))),
        }
    }
}

/// Probe that fails until a URL has been probed a set number of times
#[derive(Debug)]
pub struct FakeProbe {
    succeed_after: Option<u32>,
    calls: Mutex<HashMap<Url, u32>>,
}

impl FakeProbe {
    /// Decodable on the first probe
    pub fn always() -> Self {
        Self::succeeding_after(1)
    }

    pub fn succeeding_after(attempts: u32) -> Self {
        Self {
            succeed_after: Some(attempts),
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn never() -> Self {
        Self {
            succeed_after: None,
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn calls(&self, url: &Url) -> u32 {
        self.calls.lock().get(url).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.calls.lock().values().sum()
    }

    /// URLs probed at least once
    pub fn probed(&self) -> Vec<Url> {
        self.calls.lock().keys().cloned().collect()
    }
}

#[async_trait]
impl RenderProbe for FakeProbe {
    async fn probe(&self, url: &Url) -> Result<(), ProbeError> {
        let count = {
            let mut calls = self.calls.lock();
            let count = calls.entry(url.clone()).or_insert(0);
            *count += 1;
            *count
        };
        match self.succeed_after {
            Some(n) if count >= n => Ok(()),
            _ => Err(ProbeError::Status(420)),
        }
    }
}

/// Upload response as the service would return it for `public_id`
pub fn uploaded_asset(public_id: &str) -> UploadedAsset {
    let path = format!("res.cloudinary.com/{TEST_CLOUD}/image/upload/v1/{public_id}.png");
    UploadedAsset {
        public_id: AssetId::new(public_id).unwrap(),
        url: Url::parse(&format!("http://{path}")).unwrap(),
        secure_url: Some(Url::parse(&format!("https://{path}")).unwrap()),
        width: Some(8),
        height: Some(8),
        format: Some("png".to_string()),
    }
}

/// Encoded PNG with a gradient fill
pub fn sample_png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_fn(width, height, |x, y| {
        image::Rgba([(x * 31 % 256) as u8, (y * 17 % 256) as u8, 128, 255])
    });
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
        .unwrap();
    out
}

pub fn sample_image() -> ImageSource {
    ImageSource::new("sample.png", sample_png(8, 8))
}

pub fn test_config() -> CloudConfig {
    CloudConfig::new(TEST_CLOUD, "remove_bg", "plain").with_poll(test_policy())
}

/// Short cap so timeout paths finish quickly under paused time
pub fn test_policy() -> PollPolicy {
    PollPolicy {
        interval_ms: 500,
        max_attempts: Some(10),
        ..PollPolicy::default()
    }
}

pub fn test_composer() -> UrlComposer {
    let base = Url::parse("https://res.cloudinary.com").unwrap();
    UrlComposer::new(&base, TEST_CLOUD, true).unwrap()
}

/// Session over the given fakes, builtin catalog and [`test_policy`]
pub fn setup_test_session(uploader: Arc<FakeUploader>, probe: Arc<FakeProbe>) -> Session {
    Session::with_parts(
        Arc::new(Catalog::builtin()),
        test_composer(),
        uploader,
        probe,
        test_policy(),
    )
}

/// Delivery URL `https://res.cloudinary.com/demo/image/upload/{path}`
pub fn delivery_url(path: &str) -> Url {
    Url::parse(&format!(
        "https://res.cloudinary.com/{TEST_CLOUD}/image/upload/{path}"
    ))
    .unwrap()
}
