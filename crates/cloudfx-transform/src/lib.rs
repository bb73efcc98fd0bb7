//! cloudfx Transform Layer
//!
//! Pure, network-free half of the pipeline:
//!
//! - [`Catalog`]: ordered registry of the effects a client offers
//! - [`OperationKind`]: closed set of dispatchable operations
//! - [`UrlComposer`]: deterministic delivery-URL construction
//!
//! # Example
//!
//! ```rust
//! use cloudfx_transform::{AssetId, UrlComposer};
//! use url::Url;
//!
//! let base = Url::parse("https://res.cloudinary.com").unwrap();
//! let composer = UrlComposer::new(&base, "demo", true).unwrap();
//! let asset = AssetId::new("abc123").unwrap();
//!
//! let url = composer.resize_fill_image(&asset, 200, 100).unwrap();
//! assert!(url.as_str().ends_with("/c_fill,h_100,w_200/abc123"));
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod action;
mod asset;
mod catalog;
mod compose;
mod error;
mod operation;
mod params;

pub use action::{Action, CornerRadius, CropMode, Transformation};
pub use asset::AssetId;
pub use catalog::{Catalog, ParamKind, ParamSpec, TransformDescriptor};
pub use compose::{UrlComposer, BRIGHTNESS_RANGE, PIXELATION_RANGE, PROFILE_SIZE};
pub use error::{CatalogError, CompositionError};
pub use operation::{OperationKind, UploadChannel};
pub use params::{TransformParams, TransformRequest};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod integration_tests {
    use super::*;
    use url::Url;

    #[test]
    fn every_catalog_entry_composes_with_declared_params() {
        let base = Url::parse("https://res.cloudinary.com").unwrap();
        let composer = UrlComposer::new(&base, "demo", true).unwrap();
        let asset = AssetId::new("abc123").unwrap();

        for descriptor in Catalog::builtin().iter() {
            let params: TransformParams = descriptor
                .parameters()
                .iter()
                .map(|p| (p.name.clone(), 50))
                .collect();
            descriptor.check_params(&params).unwrap();

            let request = TransformRequest::new(descriptor.operation, asset.clone(), params);
            let url = composer.compose(&request).unwrap();
            assert!(
                url.as_str().ends_with("/abc123"),
                "{}: {url}",
                descriptor.operation_name()
            );
        }
    }
}
