//! Delivery URL composition
//!
//! Builds derived-asset URLs from an [`AssetId`] and a transform request.
//! Composition never touches the network: the remote service renders the
//! derived asset lazily the first time its URL is fetched.
//!
//! # URL shape
//!
//! ```text
//! https://res.cloudinary.com/<cloud>/image/upload/<component>/.../<public_id>
//! ```

use crate::action::{Action, CornerRadius, CropMode, Transformation};
use crate::asset::AssetId;
use crate::error::CompositionError;
use crate::operation::OperationKind;
use crate::params::{TransformParams, TransformRequest};
use url::Url;

/// Side length of profile thumbnails
pub const PROFILE_SIZE: u32 = 170;

/// Accepted pixelation block sizes
pub const PIXELATION_RANGE: (i64, i64) = (1, 200);

/// Accepted brightness levels
pub const BRIGHTNESS_RANGE: (i64, i64) = (-99, 100);

const DIMENSION_RANGE: (i64, i64) = (1, u32::MAX as i64);

/// Deterministic URL builder for one cloud account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlComposer {
    /// `<delivery_base>/<cloud>/image/upload`
    base: Url,
}

impl UrlComposer {
    /// Create composer for a cloud account
    ///
    /// # Arguments
    /// * `delivery_base` - Delivery host root, e.g. `https://res.cloudinary.com`
    /// * `cloud_name` - Account name
    /// * `secure` - Use `https` when true, `http` otherwise
    ///
    /// # Errors
    /// `CompositionError::InvalidBase` if the base cannot hold path segments
    pub fn new(delivery_base: &Url, cloud_name: &str, secure: bool) -> Result<Self, CompositionError> {
        let mut base = delivery_base.clone();
        let scheme = if secure { "https" } else { "http" };
        base.set_scheme(scheme)
            .map_err(|()| CompositionError::InvalidBase(delivery_base.to_string()))?;

        base.path_segments_mut()
            .map_err(|()| CompositionError::InvalidBase(delivery_base.to_string()))?
            .pop_if_empty()
            .push(cloud_name)
            .push("image")
            .push("upload");

        Ok(Self { base })
    }

    /// Base every delivery URL starts with
    #[inline]
    #[must_use]
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Map an operation and its parameters to a transformation chain
    ///
    /// # Errors
    /// Missing or out-of-range parameters
    pub fn transformation(
        operation: OperationKind,
        params: &TransformParams,
    ) -> Result<Transformation, CompositionError> {
        let t = Transformation::new();
        let t = match operation {
            OperationKind::RemoveBackground => t.then(Action::BackgroundRemoval),
            OperationKind::ResizeFill | OperationKind::Resize => {
                let mode = if operation == OperationKind::ResizeFill {
                    CropMode::Fill
                } else {
                    CropMode::Scale
                };
                let width = dimension(params, operation, "width")?;
                let height = dimension(params, operation, "height")?;
                t.then(Action::Resize {
                    mode,
                    width,
                    height,
                })
            }
            OperationKind::Profile => t
                .then(Action::Resize {
                    mode: CropMode::Fill,
                    width: PROFILE_SIZE,
                    height: PROFILE_SIZE,
                })
                .then(Action::RoundCorners(CornerRadius::Max)),
            OperationKind::PixelFace => {
                let (min, max) = PIXELATION_RANGE;
                let size = params.require(operation, "pixelation", min, max)?;
                t.then(Action::PixelateFaces {
                    square_size: narrow(size),
                })
            }
            OperationKind::Brightness => {
                let (min, max) = BRIGHTNESS_RANGE;
                let level = params.require(operation, "brightness", min, max)?;
                t.then(Action::Brightness {
                    level: narrow(level),
                })
            }
        };
        Ok(t)
    }

    /// Compose the delivery URL for a request
    ///
    /// # Errors
    /// See [`UrlComposer::transformation`]
    pub fn compose(&self, request: &TransformRequest) -> Result<Url, CompositionError> {
        let transformation = Self::transformation(request.operation, &request.params)?;
        let url = self.url_for(&request.asset, &transformation);
        tracing::debug!(operation = %request.operation, %url, "composed delivery url");
        Ok(url)
    }

    /// Delivery URL for an asset with an explicit transformation chain
    #[must_use]
    pub fn url_for(&self, asset: &AssetId, transformation: &Transformation) -> Url {
        let mut url = self.base.clone();
        // base was validated in `new`, so it always accepts segments
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.extend(transformation.components());
            segments.extend(asset.segments());
        }
        url
    }

    /// Delivery URL of the untransformed asset
    #[must_use]
    pub fn plain_url(&self, asset: &AssetId) -> Url {
        self.url_for(asset, &Transformation::new())
    }

    /// Background removal
    #[must_use]
    pub fn remove_background(&self, asset: &AssetId) -> Url {
        self.url_for(asset, &Transformation::new().then(Action::BackgroundRemoval))
    }

    /// Fill-mode resize to exactly `width` x `height`
    ///
    /// # Errors
    /// Zero dimensions
    pub fn resize_fill_image(
        &self,
        asset: &AssetId,
        width: u32,
        height: u32,
    ) -> Result<Url, CompositionError> {
        self.compose_kind(asset, OperationKind::ResizeFill, size_params(width, height))
    }

    /// Proportional resize bounded by `width` x `height`
    ///
    /// # Errors
    /// Zero dimensions
    pub fn resize_image(
        &self,
        asset: &AssetId,
        width: u32,
        height: u32,
    ) -> Result<Url, CompositionError> {
        self.compose_kind(asset, OperationKind::Resize, size_params(width, height))
    }

    /// Circular 170x170 profile thumbnail
    #[must_use]
    pub fn profile_image(&self, asset: &AssetId) -> Url {
        let t = Transformation::new()
            .then(Action::Resize {
                mode: CropMode::Fill,
                width: PROFILE_SIZE,
                height: PROFILE_SIZE,
            })
            .then(Action::RoundCorners(CornerRadius::Max));
        self.url_for(asset, &t)
    }

    /// Pixelate faces with the given block size
    ///
    /// # Errors
    /// Block size outside [`PIXELATION_RANGE`]
    pub fn pixel_face(&self, asset: &AssetId, pixelation: u32) -> Result<Url, CompositionError> {
        let params = TransformParams::new().with("pixelation", i64::from(pixelation));
        self.compose_kind(asset, OperationKind::PixelFace, params)
    }

    /// Adjust brightness by a signed level
    ///
    /// # Errors
    /// Level outside [`BRIGHTNESS_RANGE`]
    pub fn image_brightness(&self, asset: &AssetId, level: i32) -> Result<Url, CompositionError> {
        let params = TransformParams::new().with("brightness", i64::from(level));
        self.compose_kind(asset, OperationKind::Brightness, params)
    }

    fn compose_kind(
        &self,
        asset: &AssetId,
        operation: OperationKind,
        params: TransformParams,
    ) -> Result<Url, CompositionError> {
        let transformation = Self::transformation(operation, &params)?;
        Ok(self.url_for(asset, &transformation))
    }
}

fn size_params(width: u32, height: u32) -> TransformParams {
    TransformParams::new()
        .with("width", i64::from(width))
        .with("height", i64::from(height))
}

fn dimension(
    params: &TransformParams,
    operation: OperationKind,
    name: &str,
) -> Result<u32, CompositionError> {
    let (min, max) = DIMENSION_RANGE;
    params.require(operation, name, min, max).map(narrow)
}

/// Narrow a range-checked value
fn narrow<T: TryFrom<i64> + Default>(value: i64) -> T {
    T::try_from(value).unwrap_or_default()
}
