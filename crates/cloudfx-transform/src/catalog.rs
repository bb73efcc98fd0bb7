//! Transform descriptor catalog
//!
//! Static registry of the effects a client can offer. Order is insertion
//! order and defines menu order.

use crate::error::{CatalogError, CompositionError};
use crate::operation::OperationKind;
use crate::params::TransformParams;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Kind of value a parameter takes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    /// Signed integer
    Number,
}

/// Declared parameter of an effect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
    /// Parameter name
    pub name: String,
    /// Value kind
    pub kind: ParamKind,
}

impl ParamSpec {
    /// Numeric parameter
    #[inline]
    #[must_use]
    pub fn number(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::Number,
        }
    }
}

/// Catalog entry describing one user-selectable effect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformDescriptor {
    /// Display id
    pub id: u32,
    /// Human-readable label
    pub label: String,
    /// Optional longer description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    /// Operation this effect dispatches to
    pub operation: OperationKind,
    /// Parameter schema, `None` for parameterless effects
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Vec<ParamSpec>>,
}

impl TransformDescriptor {
    /// Create parameterless descriptor
    #[must_use]
    pub fn new(id: u32, label: impl Into<String>, operation: OperationKind) -> Self {
        Self {
            id,
            label: label.into(),
            info: None,
            operation,
            parameters: None,
        }
    }

    /// With description
    #[inline]
    #[must_use]
    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.info = Some(info.into());
        self
    }

    /// With parameter schema
    #[inline]
    #[must_use]
    pub fn with_parameters(mut self, parameters: Vec<ParamSpec>) -> Self {
        self.parameters = Some(parameters);
        self
    }

    /// Wire name of the target operation
    #[inline]
    #[must_use]
    pub fn operation_name(&self) -> &'static str {
        self.operation.name()
    }

    /// Declared parameters (empty slice if none)
    #[inline]
    #[must_use]
    pub fn parameters(&self) -> &[ParamSpec] {
        self.parameters.as_deref().unwrap_or(&[])
    }

    /// Verify every declared parameter is supplied
    ///
    /// # Errors
    /// `CompositionError::MissingParameter` for the first absent parameter
    pub fn check_params(&self, params: &TransformParams) -> Result<(), CompositionError> {
        match self.parameters().iter().find(|p| !params.contains(&p.name)) {
            Some(missing) => Err(CompositionError::MissingParameter {
                operation: self.operation_name(),
                name: missing.name.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    #[serde(default, rename = "effect")]
    effects: Vec<TransformDescriptor>,
}

/// Ordered, read-only set of descriptors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    entries: Vec<TransformDescriptor>,
}

impl Catalog {
    /// Create catalog from entries
    ///
    /// # Errors
    /// - `CatalogError::DuplicateId` if two entries share an id
    /// - `CatalogError::DuplicateOperation` if two entries share an operation
    pub fn new(entries: Vec<TransformDescriptor>) -> Result<Self, CatalogError> {
        let mut ids = HashSet::new();
        let mut operations = HashSet::new();

        for entry in &entries {
            if !ids.insert(entry.id) {
                return Err(CatalogError::DuplicateId(entry.id));
            }
            if !operations.insert(entry.operation) {
                return Err(CatalogError::DuplicateOperation(entry.operation_name()));
            }
        }

        Ok(Self { entries })
    }

    /// Parse a TOML catalog with one `[[effect]]` table per descriptor
    ///
    /// # Errors
    /// Parse failures and the validation errors of [`Catalog::new`]
    pub fn from_toml_str(source: &str) -> Result<Self, CatalogError> {
        let doc: CatalogDocument = toml::from_str(source)?;
        Self::new(doc.effects)
    }

    /// Stock effects offered by the client
    #[must_use]
    pub fn builtin() -> Self {
        let size = || vec![ParamSpec::number("height"), ParamSpec::number("width")];

        Self {
            entries: vec![
                TransformDescriptor::new(
                    0,
                    "Remove image's background",
                    OperationKind::RemoveBackground,
                ),
                TransformDescriptor::new(
                    1,
                    "Resize an image to fill given dimensions",
                    OperationKind::ResizeFill,
                )
                .with_parameters(size()),
                TransformDescriptor::new(2, "Resize an image", OperationKind::Resize)
                    .with_parameters(size()),
                TransformDescriptor::new(
                    4,
                    "Convert image into profile image",
                    OperationKind::Profile,
                )
                .with_info("Convert your images to a profile image"),
                TransformDescriptor::new(7, "Pixelate faces", OperationKind::PixelFace)
                    .with_info("Hide faces in your images")
                    .with_parameters(vec![ParamSpec::number("pixelation")]),
                TransformDescriptor::new(8, "Adjust image brightness", OperationKind::Brightness)
                    .with_info("Adjust the brightness of an image")
                    .with_parameters(vec![ParamSpec::number("brightness")]),
            ],
        }
    }

    /// All descriptors in display order
    #[inline]
    #[must_use]
    pub fn list(&self) -> &[TransformDescriptor] {
        &self.entries
    }

    /// Find descriptor by operation wire name
    #[must_use]
    pub fn find_by_operation_name(&self, name: &str) -> Option<&TransformDescriptor> {
        self.entries.iter().find(|e| e.operation_name() == name)
    }

    /// Find descriptor by operation
    #[must_use]
    pub fn find_by_operation(&self, operation: OperationKind) -> Option<&TransformDescriptor> {
        self.entries.iter().find(|e| e.operation == operation)
    }

    /// Find descriptor by id
    #[must_use]
    pub fn find_by_id(&self, id: u32) -> Option<&TransformDescriptor> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Number of descriptors
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate descriptors
    pub fn iter(&self) -> impl Iterator<Item = &TransformDescriptor> {
        self.entries.iter()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn builtin_order_is_preserved() {
        let catalog = Catalog::builtin();
        let ids: Vec<u32> = catalog.list().iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![0, 1, 2, 4, 7, 8]);

        let names: Vec<&str> = catalog.iter().map(TransformDescriptor::operation_name).collect();
        assert_eq!(
            names,
            vec![
                "uploadImage",
                "resizeFillImage",
                "resizeImage",
                "profileImage",
                "pixelFace",
                "imageBrightness"
            ]
        );
    }

    #[test]
    fn builtin_passes_validation() {
        let catalog = Catalog::builtin();
        assert!(Catalog::new(catalog.list().to_vec()).is_ok());
    }

    #[test]
    fn find_by_operation_name() {
        let catalog = Catalog::builtin();
        let found = catalog.find_by_operation_name("pixelFace").unwrap();
        assert_eq!(found.id, 7);
        assert_eq!(found.parameters()[0].name, "pixelation");

        assert!(catalog.find_by_operation_name("blurImage").is_none());
    }

    #[test]
    fn find_by_id() {
        let catalog = Catalog::builtin();
        assert_eq!(
            catalog.find_by_id(4).map(|d| d.operation),
            Some(OperationKind::Profile)
        );
        assert!(catalog.find_by_id(3).is_none());
    }

    #[test]
    fn duplicate_id_rejected() {
        let result = Catalog::new(vec![
            TransformDescriptor::new(1, "a", OperationKind::Resize),
            TransformDescriptor::new(1, "b", OperationKind::Profile),
        ]);
        assert!(matches!(result, Err(CatalogError::DuplicateId(1))));
    }

    #[test]
    fn duplicate_operation_rejected() {
        let result = Catalog::new(vec![
            TransformDescriptor::new(1, "a", OperationKind::Resize),
            TransformDescriptor::new(2, "b", OperationKind::Resize),
        ]);
        assert!(matches!(
            result,
            Err(CatalogError::DuplicateOperation("resizeImage"))
        ));
    }

    #[test]
    fn check_params_reports_first_missing() {
        let catalog = Catalog::builtin();
        let fill = catalog.find_by_operation(OperationKind::ResizeFill).unwrap();

        let partial = TransformParams::new().with("height", 100);
        let err = fill.check_params(&partial).unwrap_err();
        assert_eq!(
            err,
            CompositionError::MissingParameter {
                operation: "resizeFillImage",
                name: "width".to_string(),
            }
        );

        let full = partial.with("width", 200);
        assert!(fill.check_params(&full).is_ok());
    }

    #[test]
    fn parameterless_accepts_anything() {
        let catalog = Catalog::builtin();
        let profile = catalog.find_by_operation(OperationKind::Profile).unwrap();
        assert!(profile.parameters().is_empty());
        assert!(profile.check_params(&TransformParams::new()).is_ok());
    }

    #[test]
    fn from_toml() {
        let source = r#"
            [[effect]]
            id = 10
            label = "Brighter"
            operation = "imageBrightness"
            parameters = [{ name = "brightness", kind = "number" }]

            [[effect]]
            id = 11
            label = "Avatar"
            info = "Round thumbnail"
            operation = "profileImage"
        "#;

        let catalog = Catalog::from_toml_str(source).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.list()[0].operation, OperationKind::Brightness);
        assert_eq!(catalog.list()[1].info.as_deref(), Some("Round thumbnail"));
    }

    #[test]
    fn from_toml_unknown_operation() {
        let source = r#"
            [[effect]]
            id = 1
            label = "Sharpen"
            operation = "sharpenImage"
        "#;
        assert!(matches!(
            Catalog::from_toml_str(source),
            Err(CatalogError::Parse(_))
        ));
    }
}
