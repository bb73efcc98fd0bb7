//! Pipeline session
//!
//! [`Session`] is the capability surface: it owns the catalog, the upload
//! client, the URL composer and the render detector, and publishes a
//! [`PipelineState`] snapshot on a watch channel after every change.
//!
//! # Flow
//!
//! ```text
//! invoke(name) ─▶ resolve ─▶ check params ─▶ upload ─▶ publish plain url
//!                                                      │
//!                           detector ◀─ publish final ◀┘
//! ```
//!
//! Different invocations are not serialized; the last publication wins and
//! a poll cycle started for an older URL can never confirm a newer one.

use crate::config::CloudConfig;
use crate::detector::{DetectorState, PollOutcome, PollPolicy, RenderDetector};
use crate::dispatch::{DispatchEntry, Dispatcher};
use crate::error::PipelineError;
use crate::probe::{HttpImageProbe, RenderProbe};
use crate::state::{OriginalImage, Phase, PipelineState};
use crate::upload::{CloudinaryUploader, ImageSource, UploadedAsset, Uploader};
use cloudfx_transform::{
    AssetId, Catalog, OperationKind, TransformDescriptor, TransformParams, UploadChannel,
    UrlComposer,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use url::Url;

/// Image transformation session
///
/// Must be used inside a tokio runtime: publishing a URL spawns the render
/// poll task.
pub struct Session {
    catalog: Arc<Catalog>,
    composer: UrlComposer,
    uploader: Arc<dyn Uploader>,
    detector: Mutex<RenderDetector>,
    secure: bool,
    state: Arc<watch::Sender<PipelineState>>,
}

impl Session {
    /// Create session talking to the configured account
    ///
    /// # Errors
    /// Invalid configuration or HTTP client construction failure
    pub fn new(config: &CloudConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let uploader = CloudinaryUploader::new(config)?;
        let composer = UrlComposer::new(&config.delivery_url()?, &config.cloud_name, config.secure)?;

        Ok(Self::with_parts(
            Arc::new(Catalog::builtin()),
            composer,
            Arc::new(uploader),
            Arc::new(HttpImageProbe::new()),
            config.poll,
        ))
    }

    /// Assemble from explicit parts
    #[must_use]
    pub fn with_parts(
        catalog: Arc<Catalog>,
        composer: UrlComposer,
        uploader: Arc<dyn Uploader>,
        probe: Arc<dyn RenderProbe>,
        policy: PollPolicy,
    ) -> Self {
        let secure = composer.base().scheme() == "https";
        let (state, _) = watch::channel(PipelineState::new());
        Self {
            catalog,
            composer,
            uploader,
            detector: Mutex::new(RenderDetector::new(probe, policy)),
            secure,
            state: Arc::new(state),
        }
    }

    /// With a custom effect catalog
    #[must_use]
    pub fn with_catalog(mut self, catalog: Arc<Catalog>) -> Self {
        self.catalog = catalog;
        self
    }

    /// Snapshot of the current state
    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every state change
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    /// `false` only once the current URL is confirmed decodable
    #[must_use]
    pub fn processing(&self) -> bool {
        self.state.borrow().processing()
    }

    /// Most recently published URL
    #[must_use]
    pub fn url(&self) -> Option<Url> {
        self.state.borrow().current_url().cloned()
    }

    /// Effect catalog
    #[inline]
    #[must_use]
    pub fn effects(&self) -> &[TransformDescriptor] {
        self.catalog.list()
    }

    /// URL composer in use
    #[inline]
    #[must_use]
    pub fn composer(&self) -> &UrlComposer {
        &self.composer
    }

    /// Selected operation
    #[must_use]
    pub fn function_name(&self) -> Option<OperationKind> {
        self.state.borrow().selected_operation()
    }

    /// Selected catalog entry
    #[must_use]
    pub fn effect(&self) -> Option<TransformDescriptor> {
        self.state.borrow().selected_effect().cloned()
    }

    /// Render detector state
    #[must_use]
    pub fn detector_state(&self) -> DetectorState {
        self.detector.lock().state()
    }

    /// Upload through the background-removal preset and publish the
    /// background-removed URL
    ///
    /// # Errors
    /// Upload failure; state is left as it was before the call
    pub async fn upload_image(&self, image: &ImageSource) -> Result<Url, PipelineError> {
        let (_, url) = self.remove_background(image).await?;
        Ok(url)
    }

    /// Like [`Session::upload_image`], returning the assigned asset id
    ///
    /// # Errors
    /// Upload failure
    pub async fn upload_raw(&self, image: &ImageSource) -> Result<AssetId, PipelineError> {
        let (asset, _) = self.remove_background(image).await?;
        Ok(asset)
    }

    /// Upload through the neutral preset and publish the plain URL
    ///
    /// Does not touch the baseline; see [`Session::upload_the_image`].
    ///
    /// # Errors
    /// Upload failure
    pub async fn upload_neutral(&self, image: &ImageSource) -> Result<AssetId, PipelineError> {
        let asset = self.upload(image, UploadChannel::Neutral).await?;
        self.publish(asset.delivery_url(self.secure).clone(), true);
        Ok(asset.public_id)
    }

    /// Upload through the neutral preset and keep the result as the
    /// baseline for [`Session::reset_image`]
    ///
    /// # Errors
    /// Upload failure; the previous baseline is kept
    pub async fn upload_the_image(&self, image: &ImageSource) -> Result<Url, PipelineError> {
        let asset = self.upload(image, UploadChannel::Neutral).await?;
        let url = asset.delivery_url(self.secure).clone();

        self.state.send_modify(|s| {
            s.set_original(OriginalImage {
                image: Arc::new(image.clone()),
                url: url.clone(),
            });
        });
        tracing::info!(public_id = %asset.public_id, %url, "baseline image stored");

        self.publish(url.clone(), true);
        Ok(url)
    }

    /// Republish the baseline URL without uploading again
    ///
    /// # Errors
    /// `PipelineError::NoBaseline` before any [`Session::upload_the_image`]
    pub fn reset_image(&self) -> Result<Url, PipelineError> {
        let mut detector = self.detector.lock();
        let mut restored = None;
        self.state.send_if_modified(|s| {
            restored = s.reset_to_original();
            restored.is_some()
        });

        let (url, generation) = restored.ok_or(PipelineError::NoBaseline)?;
        tracing::info!(%url, "reset to baseline");
        self.watch_render(&mut detector, url.clone(), generation);
        Ok(url)
    }

    /// Select an operation by wire name
    ///
    /// # Errors
    /// `PipelineError::UnknownOperation`, after clearing the selection
    pub fn get_function(&self, name: &str) -> Result<OperationKind, PipelineError> {
        let kind = Dispatcher::resolve(name).map(|entry| entry.kind);
        self.state.send_modify(|s| s.select_operation(kind));
        kind.ok_or_else(|| PipelineError::UnknownOperation(name.to_string()))
    }

    /// Select a catalog entry by its operation name
    ///
    /// # Errors
    /// `PipelineError::UnknownOperation`, after clearing the selection
    pub fn get_effect_by_params(&self, name: &str) -> Result<TransformDescriptor, PipelineError> {
        let effect = self.catalog.find_by_operation_name(name).cloned();
        self.state.send_modify(|s| s.select_effect(effect.clone()));
        effect.ok_or_else(|| PipelineError::UnknownOperation(name.to_string()))
    }

    /// Run an operation by wire name
    ///
    /// # Errors
    /// Unknown operation, missing or out-of-range parameters (checked before
    /// any upload), or upload failure
    pub async fn invoke(
        &self,
        name: &str,
        image: &ImageSource,
        params: &TransformParams,
    ) -> Result<Url, PipelineError> {
        let entry = Dispatcher::resolve(name)
            .ok_or_else(|| PipelineError::UnknownOperation(name.to_string()))?;
        let (_, url) = self.run(entry, image, params).await?;
        Ok(url)
    }

    /// Run the selected operation
    ///
    /// Prefers the operation from [`Session::get_function`], falling back to
    /// the effect from [`Session::get_effect_by_params`].
    ///
    /// # Errors
    /// `PipelineError::NothingSelected`, or any [`Session::invoke`] error
    pub async fn apply_selected(
        &self,
        image: &ImageSource,
        params: &TransformParams,
    ) -> Result<Url, PipelineError> {
        let kind = {
            let state = self.state.borrow();
            state
                .selected_operation()
                .or_else(|| state.selected_effect().map(|e| e.operation))
        };
        let kind = kind.ok_or(PipelineError::NothingSelected)?;
        let (_, url) = self.run(Dispatcher::entry(kind), image, params).await?;
        Ok(url)
    }

    /// Wait for the current URL to settle
    ///
    /// # Errors
    /// - `PipelineError::DecodeTimeout` if polling gave up
    /// - `PipelineError::NothingPending` if nothing was ever published
    /// - `PipelineError::Closed` if the session went away
    pub async fn wait_until_ready(&self) -> Result<Url, PipelineError> {
        let mut rx = self.state.subscribe();
        let settled = {
            let guard = rx
                .wait_for(|s| !s.phase().is_pending())
                .await
                .map_err(|_| PipelineError::Closed)?;
            PipelineState::clone(&guard)
        };

        let url = settled.current_url().cloned();
        match (settled.phase(), url) {
            (Phase::Ready, Some(url)) => Ok(url),
            (Phase::RenderTimedOut { attempts }, Some(url)) => {
                Err(PipelineError::DecodeTimeout { url, attempts })
            }
            _ => Err(PipelineError::NothingPending),
        }
    }

    async fn remove_background(
        &self,
        image: &ImageSource,
    ) -> Result<(AssetId, Url), PipelineError> {
        self.run(
            Dispatcher::entry(OperationKind::RemoveBackground),
            image,
            &TransformParams::new(),
        )
        .await
    }

    async fn run(
        &self,
        entry: &'static DispatchEntry,
        image: &ImageSource,
        params: &TransformParams,
    ) -> Result<(AssetId, Url), PipelineError> {
        let descriptor = self
            .catalog
            .find_by_operation(entry.kind)
            .ok_or_else(|| PipelineError::UnknownOperation(entry.name().to_string()))?;
        descriptor.check_params(params)?;
        UrlComposer::transformation(entry.kind, params)?;

        let asset = self.upload(image, entry.channel).await?;
        self.publish(asset.delivery_url(self.secure).clone(), false);

        let url = match entry.compose(&self.composer, &asset.public_id, params) {
            Ok(url) => url,
            Err(e) => {
                self.state.send_modify(|s| s.record_error(e.to_string()));
                self.resume_watch();
                return Err(e.into());
            }
        };

        tracing::info!(operation = entry.name(), %url, "transform published");
        self.publish(url.clone(), true);
        Ok((asset.public_id, url))
    }

    async fn upload(
        &self,
        image: &ImageSource,
        channel: UploadChannel,
    ) -> Result<UploadedAsset, PipelineError> {
        let mut ticket = None;
        self.state.send_modify(|s| ticket = Some(s.begin_upload()));
        tracing::info!(file = image.file_name(), bytes = image.len(), %channel, "uploading image");

        match self.uploader.upload(image, channel).await {
            Ok(asset) => {
                tracing::info!(public_id = %asset.public_id, "upload complete");
                Ok(asset)
            }
            Err(e) => {
                tracing::warn!(file = image.file_name(), error = %e, "upload failed");
                if let Some(ticket) = ticket {
                    self.state
                        .send_modify(|s| s.fail_upload(ticket, e.to_string()));
                }
                self.resume_watch();
                Err(e.into())
            }
        }
    }

    /// Publish `url`, optionally starting render detection for it
    ///
    /// Holds the detector lock across publication so concurrent publishers
    /// start their poll cycles in generation order.
    fn publish(&self, url: Url, watch: bool) {
        let mut detector = self.detector.lock();
        let mut generation = 0;
        self.state
            .send_modify(|s| generation = s.publish_url(url.clone()));

        if watch {
            self.watch_render(&mut detector, url, generation);
        } else {
            detector.cancel();
        }
    }

    /// Restart detection if a rollback left an unconfirmed URL unwatched
    fn resume_watch(&self) {
        let mut detector = self.detector.lock();
        let pending = {
            let state = self.state.borrow();
            match (state.phase(), state.current_url()) {
                (Phase::AwaitingRender, Some(url)) => Some((url.clone(), state.generation())),
                _ => None,
            }
        };

        if let Some((url, generation)) = pending {
            if !detector.is_polling() {
                tracing::debug!(%url, "resuming render detection");
                self.watch_render(&mut detector, url, generation);
            }
        }
    }

    fn watch_render(&self, detector: &mut RenderDetector, url: Url, generation: u64) {
        let state = Arc::clone(&self.state);
        detector.start(url, move |outcome| {
            state.send_if_modified(|s| match outcome {
                PollOutcome::Confirmed { .. } => s.confirm(generation),
                PollOutcome::Exhausted { attempts } => s.exhaust(generation, attempts),
            });
        });
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("effects", &self.catalog.len())
            .field("base", &self.composer.base().as_str())
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ProbeError, UploadError};
    use crate::upload::MockUploader;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    struct AlwaysDecodes;

    #[async_trait]
    impl RenderProbe for AlwaysDecodes {
        async fn probe(&self, _url: &Url) -> Result<(), ProbeError> {
            Ok(())
        }
    }

    struct NeverDecodes;

    #[async_trait]
    impl RenderProbe for NeverDecodes {
        async fn probe(&self, _url: &Url) -> Result<(), ProbeError> {
            Err(ProbeError::Status(420))
        }
    }

    fn composer() -> UrlComposer {
        let base = Url::parse("https://res.cloudinary.com").unwrap();
        UrlComposer::new(&base, "demo", true).unwrap()
    }

    fn asset(id: &str) -> UploadedAsset {
        UploadedAsset {
            public_id: AssetId::new(id).unwrap(),
            url: Url::parse(&format!("http://res.cloudinary.com/demo/image/upload/v1/{id}.png"))
                .unwrap(),
            secure_url: Some(
                Url::parse(&format!("https://res.cloudinary.com/demo/image/upload/v1/{id}.png"))
                    .unwrap(),
            ),
            width: Some(4),
            height: Some(4),
            format: Some("png".to_string()),
        }
    }

    fn image() -> ImageSource {
        ImageSource::new("cat.png", vec![0x89, b'P', b'N', b'G'])
    }

    fn session(uploader: MockUploader, probe: Arc<dyn RenderProbe>) -> Session {
        Session::with_parts(
            Arc::new(Catalog::builtin()),
            composer(),
            Arc::new(uploader),
            probe,
            PollPolicy {
                interval_ms: 500,
                max_attempts: Some(3),
                ..PollPolicy::default()
            },
        )
    }

    fn uploading(id: &'static str, channel: UploadChannel) -> MockUploader {
        let mut uploader = MockUploader::new();
        uploader
            .expect_upload()
            .withf(move |_, c| *c == channel)
            .returning(move |_, _| Ok(asset(id)));
        uploader
    }

    #[tokio::test(start_paused = true)]
    async fn upload_image_publishes_background_removed_url() {
        let session = session(uploading("abc", UploadChannel::Default), Arc::new(AlwaysDecodes));
        let url = session.upload_image(&image()).await.unwrap();

        assert_eq!(
            url.as_str(),
            "https://res.cloudinary.com/demo/image/upload/e_background_removal/abc"
        );
        assert!(session.processing());
        assert_eq!(session.wait_until_ready().await.unwrap(), url);
        assert!(!session.processing());
        assert!(session.state().original().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn upload_the_image_stores_baseline() {
        let session = session(uploading("base", UploadChannel::Neutral), Arc::new(AlwaysDecodes));
        let url = session.upload_the_image(&image()).await.unwrap();

        assert_eq!(url, *asset("base").delivery_url(true));
        let state = session.state();
        assert_eq!(state.original().map(|o| &o.url), Some(&url));
        assert_eq!(state.original().map(|o| o.image.file_name()), Some("cat.png"));
        session.wait_until_ready().await.unwrap();
        assert_eq!(session.url(), Some(url));
    }

    #[tokio::test(start_paused = true)]
    async fn baseline_image_stays_with_caller() {
        let session = session(uploading("kept", UploadChannel::Neutral), Arc::new(AlwaysDecodes));
        let source = image();

        session.upload_the_image(&source).await.unwrap();
        let url = session
            .invoke("profileImage", &source, &TransformParams::new())
            .await
            .unwrap();

        assert!(url.as_str().ends_with("/r_max/kept"), "{url}");
        let state = session.state();
        assert_eq!(state.original().map(|o| o.image.as_ref()), Some(&source));
    }

    #[tokio::test(start_paused = true)]
    async fn invoke_checks_params_before_uploading() {
        let mut uploader = MockUploader::new();
        uploader.expect_upload().never();
        let session = session(uploader, Arc::new(AlwaysDecodes));

        let missing = session
            .invoke("resizeFillImage", &image(), &TransformParams::new().with("width", 10))
            .await;
        assert!(matches!(missing, Err(PipelineError::Composition(_))));

        let out_of_range = session
            .invoke("pixelFace", &image(), &TransformParams::new().with("pixelation", 0))
            .await;
        assert!(matches!(out_of_range, Err(PipelineError::Composition(_))));

        let unknown = session.invoke("sharpen", &image(), &TransformParams::new()).await;
        assert!(matches!(unknown, Err(PipelineError::UnknownOperation(n)) if n == "sharpen"));

        assert_eq!(session.state().phase(), Phase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_upload_keeps_previous_url() {
        let mut uploader = MockUploader::new();
        let mut calls = 0;
        uploader.expect_upload().times(2).returning(move |_, _| {
            calls += 1;
            if calls == 1 {
                Ok(asset("first"))
            } else {
                Err(UploadError::Transport("connection reset".to_string()))
            }
        });
        let session = session(uploader, Arc::new(AlwaysDecodes));

        let first = session.upload_the_image(&image()).await.unwrap();
        session.wait_until_ready().await.unwrap();

        let err = session
            .invoke("profileImage", &image(), &TransformParams::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Upload(UploadError::Transport(_))));

        let state = session.state();
        assert_eq!(state.current_url(), Some(&first));
        assert_eq!(state.phase(), Phase::Ready);
        assert!(state.last_error().is_some_and(|e| e.contains("connection reset")));
    }

    #[tokio::test(start_paused = true)]
    async fn reset_without_baseline() {
        let session = session(MockUploader::new(), Arc::new(AlwaysDecodes));
        assert!(matches!(session.reset_image(), Err(PipelineError::NoBaseline)));
        assert_eq!(session.state().generation(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn selection_setters() {
        let session = session(MockUploader::new(), Arc::new(AlwaysDecodes));

        assert_eq!(session.get_function("resizeImage").unwrap(), OperationKind::Resize);
        assert_eq!(session.function_name(), Some(OperationKind::Resize));
        assert!(session.get_function("nope").is_err());
        assert_eq!(session.function_name(), None);

        let effect = session.get_effect_by_params("imageBrightness").unwrap();
        assert_eq!(effect.id, 8);
        assert_eq!(session.effect().map(|e| e.id), Some(8));
        assert!(session.get_effect_by_params("nope").is_err());
        assert!(session.effect().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn apply_selected_uses_selection() {
        let session = session(uploading("sel", UploadChannel::Neutral), Arc::new(AlwaysDecodes));
        let params = TransformParams::new().with("brightness", -20);

        assert!(matches!(
            session.apply_selected(&image(), &params).await,
            Err(PipelineError::NothingSelected)
        ));

        session.get_effect_by_params("imageBrightness").unwrap();
        let url = session.apply_selected(&image(), &params).await.unwrap();
        assert!(url.as_str().ends_with("/e_brightness:-20/sel"), "{url}");
    }

    #[tokio::test(start_paused = true)]
    async fn render_timeout_surfaces_as_decode_timeout() {
        let session = session(uploading("slow", UploadChannel::Neutral), Arc::new(NeverDecodes));
        let url = session
            .invoke("resizeImage", &image(), &TransformParams::new().with("width", 5).with("height", 6))
            .await
            .unwrap();

        match session.wait_until_ready().await {
            Err(PipelineError::DecodeTimeout { url: polled, attempts }) => {
                assert_eq!(polled, url);
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(session.detector_state(), DetectorState::Exhausted);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_with_nothing_published() {
        let session = session(MockUploader::new(), Arc::new(AlwaysDecodes));
        assert!(matches!(
            session.wait_until_ready().await,
            Err(PipelineError::NothingPending)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn raw_and_neutral_uploads_return_asset_ids() {
        let mut uploader = MockUploader::new();
        uploader
            .expect_upload()
            .withf(|_, c| *c == UploadChannel::Default)
            .times(1)
            .returning(|_, _| Ok(asset("raw")));
        uploader
            .expect_upload()
            .withf(|_, c| *c == UploadChannel::Neutral)
            .times(1)
            .returning(|_, _| Ok(asset("plain")));
        let session = session(uploader, Arc::new(AlwaysDecodes));

        assert_eq!(session.upload_raw(&image()).await.unwrap().as_str(), "raw");
        assert!(session
            .url()
            .is_some_and(|u| u.as_str().ends_with("/e_background_removal/raw")));

        assert_eq!(session.upload_neutral(&image()).await.unwrap().as_str(), "plain");
        assert_eq!(session.url(), Some(asset("plain").delivery_url(true).clone()));
        assert!(session.state().original().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn neutral_invoke_publishes_twice() {
        let session = session(uploading("two", UploadChannel::Neutral), Arc::new(AlwaysDecodes));
        session
            .invoke("pixelFace", &image(), &TransformParams::new().with("pixelation", 12))
            .await
            .unwrap();
        assert_eq!(session.state().generation(), 2);
    }
}
