//! User-supplied transform parameters and per-invocation requests

use crate::asset::AssetId;
use crate::error::CompositionError;
use crate::operation::OperationKind;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Ordered name → value mapping of numeric parameters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransformParams {
    values: IndexMap<String, i64>,
}

impl TransformParams {
    /// Create empty parameter set
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a value
    #[inline]
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: i64) -> Self {
        self.insert(name, value);
        self
    }

    /// Add or replace a value in place
    pub fn insert(&mut self, name: impl Into<String>, value: i64) {
        self.values.insert(name.into(), value);
    }

    /// Raw lookup
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<i64> {
        self.values.get(name).copied()
    }

    /// Check presence
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Number of values
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Required value within an inclusive range
    ///
    /// # Errors
    /// - `MissingParameter` if absent
    /// - `OutOfRange` if outside `min..=max`
    pub fn require(
        &self,
        operation: OperationKind,
        name: &str,
        min: i64,
        max: i64,
    ) -> Result<i64, CompositionError> {
        let value = self
            .get(name)
            .ok_or_else(|| CompositionError::MissingParameter {
                operation: operation.name(),
                name: name.to_string(),
            })?;

        if !(min..=max).contains(&value) {
            return Err(CompositionError::OutOfRange {
                name: name.to_string(),
                value,
                min,
                max,
            });
        }

        Ok(value)
    }

    /// Parse a `name=value` pair, as typed on a command line
    ///
    /// # Errors
    /// Human-readable message if the pair is malformed
    pub fn parse_pair(pair: &str) -> Result<(String, i64), String> {
        let (name, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("expected name=value, got `{pair}`"))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(format!("empty parameter name in `{pair}`"));
        }
        let value = value
            .trim()
            .parse::<i64>()
            .map_err(|e| format!("parameter `{name}`: {e}"))?;
        Ok((name.to_string(), value))
    }
}

impl<K: Into<String>> FromIterator<(K, i64)> for TransformParams {
    fn from_iter<I: IntoIterator<Item = (K, i64)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

/// One transform invocation against an uploaded asset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformRequest {
    /// Operation to apply
    pub operation: OperationKind,
    /// Target asset
    pub asset: AssetId,
    /// Operation parameters
    pub params: TransformParams,
}

impl TransformRequest {
    /// Create new request
    #[inline]
    #[must_use]
    pub fn new(operation: OperationKind, asset: AssetId, params: TransformParams) -> Self {
        Self {
            operation,
            asset,
            params,
        }
    }
}
