//! Dispatchable operations and the upload channel each one travels on

use crate::error::CompositionError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of operations a client can apply to an uploaded image
///
/// The wire name (`uploadImage`, `resizeFillImage`, ...) is the join key
/// between catalog entries and the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    /// Upload with the background-removal preset
    #[serde(rename = "uploadImage")]
    RemoveBackground,
    /// Fill-mode resize to exact dimensions
    #[serde(rename = "resizeFillImage")]
    ResizeFill,
    /// Proportional scale resize
    #[serde(rename = "resizeImage")]
    Resize,
    /// 170x170 fill with maximal rounded corners
    #[serde(rename = "profileImage")]
    Profile,
    /// Pixelate detected faces
    #[serde(rename = "pixelFace")]
    PixelFace,
    /// Global brightness adjustment
    #[serde(rename = "imageBrightness")]
    Brightness,
}

impl OperationKind {
    /// Every operation, in dispatch-table order
    pub const ALL: [OperationKind; 6] = [
        OperationKind::ResizeFill,
        OperationKind::RemoveBackground,
        OperationKind::Resize,
        OperationKind::Profile,
        OperationKind::PixelFace,
        OperationKind::Brightness,
    ];

    /// Stable wire name
    #[inline]
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            OperationKind::RemoveBackground => "uploadImage",
            OperationKind::ResizeFill => "resizeFillImage",
            OperationKind::Resize => "resizeImage",
            OperationKind::Profile => "profileImage",
            OperationKind::PixelFace => "pixelFace",
            OperationKind::Brightness => "imageBrightness",
        }
    }

    /// Look up by wire name
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Upload channel this operation uses
    #[inline]
    #[must_use]
    pub fn channel(self) -> UploadChannel {
        match self {
            OperationKind::RemoveBackground => UploadChannel::Default,
            _ => UploadChannel::Neutral,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OperationKind {
    type Err = CompositionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| CompositionError::UnknownOperation(s.to_string()))
    }
}

/// Which upload preset a request is sent with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadChannel {
    /// Preset whose server-side profile implies background removal
    Default,
    /// Preset with no implied transformation
    Neutral,
}

impl fmt::Display for UploadChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadChannel::Default => f.write_str("default"),
            UploadChannel::Neutral => f.write_str("neutral"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_through_from_name() {
        for kind in OperationKind::ALL {
            assert_eq!(OperationKind::from_name(kind.name()), Some(kind));
        }
    }

    #[test]
    fn unknown_name_is_error() {
        let err = "sharpenImage".parse::<OperationKind>().unwrap_err();
        assert_eq!(err, CompositionError::UnknownOperation("sharpenImage".into()));
    }

    #[test]
    fn name_lookup_is_case_sensitive() {
        assert!(OperationKind::from_name("ResizeFillImage").is_none());
    }

    #[test]
    fn only_background_removal_uses_default_channel() {
        for kind in OperationKind::ALL {
            let expected = if kind == OperationKind::RemoveBackground {
                UploadChannel::Default
            } else {
                UploadChannel::Neutral
            };
            assert_eq!(kind.channel(), expected, "{kind}");
        }
    }

    #[test]
    fn serde_uses_wire_name() {
        let json = serde_json::to_string(&OperationKind::PixelFace).unwrap();
        assert_eq!(json, "\"pixelFace\"");
    }
}
