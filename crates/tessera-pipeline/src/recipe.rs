//! Declarative pipeline descriptions.
//!
//! A [`Recipe`] is the serializable form of a pipeline: a source plus
//! operations, with colors kept as strings until the recipe is applied.
//!
//! ```json
//! {
//!   "source": { "kind": "blank", "width": 200, "height": 100 },
//!   "operations": [
//!     { "op": "rectangle", "x": 10, "y": 10, "width": 50, "height": 20, "color": "#ff0000" },
//!     { "op": "rotate", "angle": 30 }
//!   ]
//! }
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::crop::Crop;
use crate::draw::{Line, Rectangle};
use crate::operation::ImageOperation;
use crate::overlay::Overlay;
use crate::pipeline::Pipeline;
use crate::rotate::Rotate;
use crate::scale::{Scale, ScaleAndCrop};
use crate::text::Text;
use crate::types::PipelineError;

/// Source of a recipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceSpec {
    /// An image file.
    File {
        /// Path to the image.
        path: PathBuf,
    },
    /// A blank canvas.
    Blank {
        /// Width in pixels.
        width: u32,
        /// Height in pixels.
        height: u32,
    },
}

fn black() -> String {
    Color::BLACK.to_string()
}

fn white() -> String {
    Color::WHITE.to_string()
}

fn default_font() -> String {
    Text::DEFAULT_FONT.to_owned()
}

const fn enabled() -> bool {
    true
}

/// One operation of a recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OperationSpec {
    /// Cut out a `width`×`height` region at (`x`, `y`).
    Crop {
        /// Left edge; negative values clamp to 0.
        x: i64,
        /// Top edge; negative values clamp to 0.
        y: i64,
        /// Region width.
        width: u32,
        /// Region height.
        height: u32,
    },
    /// Shrink to fit a bounding box, keeping the aspect ratio.
    Scale {
        /// Maximum width; absent or 0 leaves it unbounded.
        #[serde(default)]
        max_width: Option<u32>,
        /// Maximum height; absent or 0 leaves it unbounded.
        #[serde(default)]
        max_height: Option<u32>,
    },
    /// Resize to exact dimensions with a centered cover crop.
    ScaleAndCrop {
        /// Target width; defaults to the current width.
        #[serde(default)]
        width: Option<u32>,
        /// Target height; defaults to the current height.
        #[serde(default)]
        height: Option<u32>,
    },
    /// Rotate counter-clockwise, expanding the canvas.
    Rotate {
        /// Angle in degrees.
        angle: f64,
        /// Fill for exposed background.
        #[serde(default = "black")]
        color: String,
    },
    /// Draw a line segment.
    Line {
        /// Start x.
        x1: i32,
        /// Start y.
        y1: i32,
        /// End x.
        x2: i32,
        /// End y.
        y2: i32,
        /// Line color.
        #[serde(default = "white")]
        color: String,
    },
    /// Fill a rectangle from (`x`, `y`) to (`x + width`, `y + height`).
    Rectangle {
        /// Left edge.
        x: i32,
        /// Top edge.
        y: i32,
        /// Width; the far edge is included.
        width: i32,
        /// Height; the far edge is included.
        height: i32,
        /// Fill color.
        #[serde(default = "white")]
        color: String,
    },
    /// Draw a line of TrueType text.
    Text {
        /// The text; HTML entities are decoded.
        text: String,
        /// Baseline origin x.
        x: i32,
        /// Baseline origin y.
        y: i32,
        /// Size in points.
        size: f32,
        /// Text color.
        #[serde(default = "black")]
        color: String,
        /// Font file name inside the fonts directory.
        #[serde(default = "default_font")]
        font: String,
        /// Counter-clockwise rotation in degrees.
        #[serde(default)]
        angle: f64,
    },
    /// Composite the output of a nested recipe.
    Overlay {
        /// The embedded recipe.
        source: Box<Recipe>,
        /// Left edge of the placement.
        x: i64,
        /// Top edge of the placement.
        y: i64,
        /// Blend (`true`) or replace (`false`) destination pixels.
        #[serde(default = "enabled")]
        alpha_blending: bool,
    },
}

impl OperationSpec {
    /// Build the operation. `parent` supplies the filesystem, cache and
    /// configuration for embedded pipelines.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ColorParse`] for an invalid color and
    /// propagates errors from building embedded recipes.
    pub fn build(&self, parent: &Pipeline) -> Result<Box<dyn ImageOperation>, PipelineError> {
        let op: Box<dyn ImageOperation> = match self {
            Self::Crop { x, y, width, height } => Box::new(Crop::new(*x, *y, *width, *height)),
            Self::Scale {
                max_width,
                max_height,
            } => Box::new(Scale::new(*max_width, *max_height)),
            Self::ScaleAndCrop { width, height } => Box::new(ScaleAndCrop::new(*width, *height)),
            Self::Rotate { angle, color } => {
                Box::new(Rotate::new(*angle).background(Color::parse(color)?))
            }
            Self::Line {
                x1,
                y1,
                x2,
                y2,
                color,
            } => Box::new(Line::new(*x1, *y1, *x2, *y2).color(Color::parse(color)?)),
            Self::Rectangle {
                x,
                y,
                width,
                height,
                color,
            } => Box::new(Rectangle::new(*x, *y, *width, *height).color(Color::parse(color)?)),
            Self::Text {
                text,
                x,
                y,
                size,
                color,
                font,
                angle,
            } => Box::new(
                Text::new(text.clone(), *x, *y, *size)
                    .color(Color::parse(color)?)
                    .font(font.clone())
                    .angle(*angle),
            ),
            Self::Overlay {
                source,
                x,
                y,
                alpha_blending,
            } => {
                let mut nested = parent.sibling();
                source.apply(&mut nested)?;
                Box::new(Overlay::new(nested.into_shared(), *x, *y).alpha_blending(*alpha_blending))
            }
        };
        Ok(op)
    }
}

/// A serializable pipeline description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    /// Where the canvas comes from.
    pub source: SourceSpec,
    /// Operations, applied in order.
    #[serde(default)]
    pub operations: Vec<OperationSpec>,
}

impl Recipe {
    /// Configure `pipeline` from this recipe, replacing its source and
    /// operations.
    ///
    /// Every operation is built before the pipeline is touched, so a
    /// failure leaves it unchanged.
    ///
    /// # Errors
    ///
    /// Returns errors from the source (missing file, zero size) or from
    /// building any operation.
    pub fn apply(&self, pipeline: &mut Pipeline) -> Result<(), PipelineError> {
        let operations = self
            .operations
            .iter()
            .map(|spec| spec.build(pipeline))
            .collect::<Result<Vec<_>, _>>()?;
        match &self.source {
            SourceSpec::File { path } => pipeline.load(path)?,
            SourceSpec::Blank { width, height } => pipeline.create(*width, *height)?,
        }
        for op in operations {
            pipeline.push_operation(op);
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::store::MemoryFs;
    use crate::types::{Dimensions, Format};

    const RECIPE: &str = r##"{
        "source": { "kind": "blank", "width": 40, "height": 20 },
        "operations": [
            { "op": "rectangle", "x": 0, "y": 0, "width": 9, "height": 9, "color": "rgb(255, 0, 0)" },
            { "op": "line", "x1": 0, "y1": 19, "x2": 39, "y2": 19 },
            { "op": "scale", "max_width": 20 },
            { "op": "overlay", "x": 1, "y": 1,
              "source": { "source": { "kind": "blank", "width": 2, "height": 2 } } }
        ]
    }"##;

    fn pipeline() -> Pipeline {
        Pipeline::new(Rc::new(MemoryFs::new()))
    }

    #[test]
    fn recipe_parses_with_defaults() {
        let recipe: Recipe = serde_json::from_str(RECIPE).unwrap();
        assert_eq!(recipe.source, SourceSpec::Blank { width: 40, height: 20 });
        assert_eq!(recipe.operations.len(), 4);
        assert!(matches!(
            &recipe.operations[1],
            OperationSpec::Line { color, .. } if color == "#ffffff"
        ));
        assert!(matches!(
            &recipe.operations[3],
            OperationSpec::Overlay { alpha_blending: true, .. }
        ));
    }

    #[test]
    fn recipe_builds_equivalent_pipeline() {
        let recipe: Recipe = serde_json::from_str(RECIPE).unwrap();
        let mut from_recipe = pipeline();
        recipe.apply(&mut from_recipe).unwrap();

        let mut inner = from_recipe.sibling();
        inner.create(2, 2).unwrap();
        let mut by_hand = pipeline();
        by_hand.create(40, 20).unwrap();
        by_hand.add_operation(Rectangle::new(0, 0, 9, 9).color(Color::rgb(255, 0, 0)));
        by_hand.add_operation(Line::new(0, 19, 39, 19));
        by_hand.add_operation(Scale::new(Some(20), None));
        by_hand.add_operation(Overlay::new(inner.into_shared(), 1, 1));

        assert_eq!(
            from_recipe.fingerprint(Format::Png).unwrap(),
            by_hand.fingerprint(Format::Png).unwrap()
        );
        assert_eq!(from_recipe.canvas().unwrap().dimensions(), Dimensions::new(20, 10));
    }

    #[test]
    fn invalid_color_leaves_pipeline_untouched() {
        let recipe: Recipe = serde_json::from_str(
            r#"{ "source": { "kind": "blank", "width": 5, "height": 5 },
                 "operations": [ { "op": "rotate", "angle": 10, "color": "teal" } ] }"#,
        )
        .unwrap();
        let mut target = pipeline();
        assert!(matches!(recipe.apply(&mut target), Err(PipelineError::ColorParse(_))));
        assert!(target.source().is_none());
    }

    #[test]
    fn missing_file_source_is_reported() {
        let recipe: Recipe =
            serde_json::from_str(r#"{ "source": { "kind": "file", "path": "/nope.png" } }"#).unwrap();
        assert!(matches!(
            recipe.apply(&mut pipeline()),
            Err(PipelineError::SourceNotFound(_))
        ));
    }

    #[test]
    fn recipe_serializes_with_tags() {
        let recipe = Recipe {
            source: SourceSpec::File {
                path: PathBuf::from("a.jpg"),
            },
            operations: vec![OperationSpec::ScaleAndCrop {
                width: Some(10),
                height: None,
            }],
        };
        let json = serde_json::to_value(&recipe).unwrap();
        assert_eq!(json["source"]["kind"], "file");
        assert_eq!(json["operations"][0]["op"], "scale_and_crop");
    }
}
