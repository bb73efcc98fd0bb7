//! Operation dispatch table
//!
//! Maps each [`OperationKind`] to the upload channel it needs and the
//! function that composes its delivery URL once the asset id is known.

use cloudfx_transform::{
    AssetId, CompositionError, OperationKind, TransformParams, TransformRequest, UploadChannel,
    UrlComposer,
};
use url::Url;

/// URL builder invoked after a successful upload
pub type ComposeFn =
    fn(&UrlComposer, &AssetId, &TransformParams) -> Result<Url, CompositionError>;

/// One row of the dispatch table
#[derive(Debug, Clone, Copy)]
pub struct DispatchEntry {
    /// Operation
    pub kind: OperationKind,
    /// Preset channel the upload goes through
    pub channel: UploadChannel,
    compose: ComposeFn,
}

impl DispatchEntry {
    const fn new(kind: OperationKind, channel: UploadChannel, compose: ComposeFn) -> Self {
        Self {
            kind,
            channel,
            compose,
        }
    }

    /// Operation wire name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// Compose the delivery URL for an uploaded asset
    ///
    /// # Errors
    /// Missing or out-of-range parameters
    pub fn compose(
        &self,
        composer: &UrlComposer,
        asset: &AssetId,
        params: &TransformParams,
    ) -> Result<Url, CompositionError> {
        (self.compose)(composer, asset, params)
    }
}

static REGISTRY: [DispatchEntry; 6] = [
    DispatchEntry::new(OperationKind::ResizeFill, UploadChannel::Neutral, resize_fill_image),
    DispatchEntry::new(OperationKind::RemoveBackground, UploadChannel::Default, upload_image),
    DispatchEntry::new(OperationKind::Resize, UploadChannel::Neutral, resize_image),
    DispatchEntry::new(OperationKind::Profile, UploadChannel::Neutral, profile_image),
    DispatchEntry::new(OperationKind::PixelFace, UploadChannel::Neutral, pixel_face),
    DispatchEntry::new(OperationKind::Brightness, UploadChannel::Neutral, image_brightness),
];

fn upload_image(
    composer: &UrlComposer,
    asset: &AssetId,
    _params: &TransformParams,
) -> Result<Url, CompositionError> {
    Ok(composer.remove_background(asset))
}

fn profile_image(
    composer: &UrlComposer,
    asset: &AssetId,
    _params: &TransformParams,
) -> Result<Url, CompositionError> {
    Ok(composer.profile_image(asset))
}

fn resize_fill_image(
    composer: &UrlComposer,
    asset: &AssetId,
    params: &TransformParams,
) -> Result<Url, CompositionError> {
    compose_with(OperationKind::ResizeFill, composer, asset, params)
}

fn resize_image(
    composer: &UrlComposer,
    asset: &AssetId,
    params: &TransformParams,
) -> Result<Url, CompositionError> {
    compose_with(OperationKind::Resize, composer, asset, params)
}

fn pixel_face(
    composer: &UrlComposer,
    asset: &AssetId,
    params: &TransformParams,
) -> Result<Url, CompositionError> {
    compose_with(OperationKind::PixelFace, composer, asset, params)
}

fn image_brightness(
    composer: &UrlComposer,
    asset: &AssetId,
    params: &TransformParams,
) -> Result<Url, CompositionError> {
    compose_with(OperationKind::Brightness, composer, asset, params)
}

fn compose_with(
    operation: OperationKind,
    composer: &UrlComposer,
    asset: &AssetId,
    params: &TransformParams,
) -> Result<Url, CompositionError> {
    composer.compose(&TransformRequest::new(operation, asset.clone(), params.clone()))
}

/// Static dispatch table
#[derive(Debug, Clone, Copy, Default)]
pub struct Dispatcher;

impl Dispatcher {
    /// All entries
    #[inline]
    #[must_use]
    pub fn entries() -> &'static [DispatchEntry] {
        &REGISTRY
    }

    /// Resolve by wire name
    #[must_use]
    pub fn resolve(name: &str) -> Option<&'static DispatchEntry> {
        REGISTRY.iter().find(|entry| entry.name() == name)
    }

    /// Resolve by kind
    ///
    /// Every [`OperationKind`] has a row, so this never misses.
    #[must_use]
    pub fn entry(kind: OperationKind) -> &'static DispatchEntry {
        let index = match kind {
            OperationKind::ResizeFill => 0,
            OperationKind::RemoveBackground => 1,
            OperationKind::Resize => 2,
            OperationKind::Profile => 3,
            OperationKind::PixelFace => 4,
            OperationKind::Brightness => 5,
        };
        &REGISTRY[index]
    }
}
