//! cloudfx Core - upload, transform and render-confirm pipeline
//!
//! The networked half of cloudfx:
//! - Uploads images to the remote media service through one of two presets
//! - Dispatches named operations to their URL builders
//! - Polls derived URLs until the service has rendered them
//! - Publishes observable session state on a watch channel
//!
//! # Example
//!
//! ```rust,ignore
//! use cloudfx_core::{CloudConfig, ImageSource, Session, TransformParams};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CloudConfig::from_env()?;
//! let session = Session::new(&config)?;
//!
//! let image = ImageSource::from_path("cat.jpg").await?;
//! session.upload_the_image(&image).await?;
//!
//! let params = TransformParams::new().with("width", 200).with("height", 100);
//! session.invoke("resizeFillImage", &image, &params).await?;
//! let url = session.wait_until_ready().await?;
//! println!("{url}");
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![warn(missing_docs)]

pub mod config;
pub mod detector;
pub mod dispatch;
pub mod error;
pub mod probe;
pub mod session;
pub mod state;
pub mod upload;

// Re-exports for convenience
pub use cloudfx_transform::{
    AssetId, Catalog, OperationKind, TransformDescriptor, TransformParams, UploadChannel,
    UrlComposer,
};
pub use config::CloudConfig;
pub use detector::{DetectorState, PollOutcome, PollPolicy, RenderDetector};
pub use dispatch::{DispatchEntry, Dispatcher};
pub use error::{ConfigError, PipelineError, ProbeError, UploadError};
pub use probe::{HttpImageProbe, RenderProbe};
pub use session::Session;
pub use state::{OriginalImage, Phase, PhaseKind, PipelineState};
pub use upload::{CloudinaryUploader, ImageSource, UploadedAsset, Uploader};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with cloudfx
    pub use crate::{
        CloudConfig, ImageSource, OperationKind, Phase, PipelineError, PipelineState, Session,
        TransformParams,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
