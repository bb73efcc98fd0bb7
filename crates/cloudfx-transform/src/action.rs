//! Transformation grammar of the remote delivery service
//!
//! An [`Action`] renders as one URL path component, for example
//! `c_fill,h_100,w_200` or `e_pixelate_faces:20`. A [`Transformation`] is an
//! ordered chain of actions, rendered with `/` between components.

use std::fmt;

/// Resize crop mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CropMode {
    /// Fill exact dimensions, cropping overflow
    Fill,
    /// Scale proportionally within the bounds
    Scale,
}

impl CropMode {
    fn code(self) -> &'static str {
        match self {
            CropMode::Fill => "fill",
            CropMode::Scale => "scale",
        }
    }
}

/// Corner rounding radius
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CornerRadius {
    /// Largest radius the image allows (circle/ellipse)
    Max,
    /// Fixed radius in pixels
    Pixels(u32),
}

/// Single transformation directive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Resize to `width` x `height`
    Resize {
        /// Crop mode
        mode: CropMode,
        /// Target width in pixels
        width: u32,
        /// Target height in pixels
        height: u32,
    },
    /// Round corners
    RoundCorners(CornerRadius),
    /// AI background removal
    BackgroundRemoval,
    /// Pixelate detected face regions only
    PixelateFaces {
        /// Pixel block size
        square_size: u32,
    },
    /// Brightness adjustment
    Brightness {
        /// Signed level
        level: i32,
    },
}

impl Action {
    /// Qualifiers of this component, before canonical ordering
    fn qualifiers(&self) -> Vec<String> {
        match *self {
            Action::Resize {
                mode,
                width,
                height,
            } => vec![
                format!("c_{}", mode.code()),
                format!("w_{width}"),
                format!("h_{height}"),
            ],
            Action::RoundCorners(CornerRadius::Max) => vec!["r_max".to_string()],
            Action::RoundCorners(CornerRadius::Pixels(px)) => vec![format!("r_{px}")],
            Action::BackgroundRemoval => vec!["e_background_removal".to_string()],
            Action::PixelateFaces { square_size } => {
                vec![format!("e_pixelate_faces:{square_size}")]
            }
            Action::Brightness { level } => vec![format!("e_brightness:{level}")],
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // canonical form sorts qualifiers within a component
        let mut qualifiers = self.qualifiers();
        qualifiers.sort();
        f.write_str(&qualifiers.join(","))
    }
}

/// Ordered chain of actions
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Transformation {
    actions: Vec<Action>,
}

impl Transformation {
    /// Create empty transformation
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an action
    #[inline]
    #[must_use]
    pub fn then(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    /// Actions in application order
    #[inline]
    #[must_use]
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Check if no action is applied
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Rendered path components, one per action
    pub fn components(&self) -> impl Iterator<Item = String> + '_ {
        self.actions.iter().map(ToString::to_string)
    }
}

impl fmt::Display for Transformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.components().collect();
        f.write_str(&parts.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_qualifiers_sorted() {
        let action = Action::Resize {
            mode: CropMode::Fill,
            width: 200,
            height: 100,
        };
        assert_eq!(action.to_string(), "c_fill,h_100,w_200");
    }

    #[test]
    fn scale_resize() {
        let action = Action::Resize {
            mode: CropMode::Scale,
            width: 640,
            height: 480,
        };
        assert_eq!(action.to_string(), "c_scale,h_480,w_640");
    }

    #[test]
    fn effects_render() {
        assert_eq!(Action::BackgroundRemoval.to_string(), "e_background_removal");
        assert_eq!(
            Action::PixelateFaces { square_size: 20 }.to_string(),
            "e_pixelate_faces:20"
        );
        assert_eq!(Action::Brightness { level: -30 }.to_string(), "e_brightness:-30");
        assert_eq!(Action::RoundCorners(CornerRadius::Max).to_string(), "r_max");
        assert_eq!(Action::RoundCorners(CornerRadius::Pixels(12)).to_string(), "r_12");
    }

    #[test]
    fn chain_renders_in_order() {
        let t = Transformation::new()
            .then(Action::Resize {
                mode: CropMode::Fill,
                width: 170,
                height: 170,
            })
            .then(Action::RoundCorners(CornerRadius::Max));
        assert_eq!(t.to_string(), "c_fill,h_170,w_170/r_max");
        assert_eq!(t.actions().len(), 2);
    }

    #[test]
    fn empty_chain() {
        assert!(Transformation::new().is_empty());
        assert_eq!(Transformation::new().to_string(), "");
    }
}
