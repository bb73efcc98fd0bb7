//! Remote asset identifiers

use crate::error::CompositionError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque identifier (`public_id`) the remote service assigns to an upload
///
/// Never empty. May contain `/` folder separators, which are kept as path
/// segments when the identifier is placed into a delivery URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AssetId(String);

impl AssetId {
    /// Create new asset id
    ///
    /// # Errors
    /// `CompositionError::EmptyAssetId` if `id` is empty or whitespace
    pub fn new(id: impl Into<String>) -> Result<Self, CompositionError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(CompositionError::EmptyAssetId);
        }
        Ok(Self(id))
    }

    /// Get identifier text
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterate path segments (folder components, then the asset name)
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AssetId {
    type Err = CompositionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for AssetId {
    type Error = CompositionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AssetId> for String {
    fn from(value: AssetId) -> Self {
        value.0
    }
}

impl AsRef<str> for AssetId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
