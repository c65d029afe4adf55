//! Highlight styling and the raster overlay.

pub mod overlay;

pub use overlay::highlight_tokens;

use serde::{Deserialize, Serialize};

/// Visual style shared by annotations and overlays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HighlightStyle {
    /// Overlay fill, RGBA.
    pub fill: [u8; 4],
    /// Overlay outline, RGBA.
    pub outline: [u8; 4],
    /// Outline thickness in pixels (0 disables the outline).
    pub outline_width: u32,
    /// Opacity of native PDF highlight annotations.
    pub annotation_opacity: f32,
}

impl Default for HighlightStyle {
    fn default() -> Self {
        Self {
            fill: [255, 255, 0, 120],
            outline: [255, 0, 0, 255],
            outline_width: 2,
            annotation_opacity: 0.4,
        }
    }
}

impl HighlightStyle {
    /// Fill colour as PDF RGB components.
    pub fn annotation_color(&self) -> [f32; 3] {
        [
            self.fill[0] as f32 / 255.0,
            self.fill[1] as f32 / 255.0,
            self.fill[2] as f32 / 255.0,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_translucent_yellow() {
        let style = HighlightStyle::default();
        assert_eq!(style.annotation_color(), [1.0, 1.0, 0.0]);
        assert!(style.fill[3] < 255);
    }

    #[test]
    fn test_partial_style_json() {
        let style: HighlightStyle = serde_json::from_str(r#"{"outline_width": 0}"#).unwrap();
        assert_eq!(style.outline_width, 0);
        assert_eq!(style.fill, [255, 255, 0, 120]);
    }
}
