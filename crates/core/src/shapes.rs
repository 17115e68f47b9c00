//! Annotation shapes attached to images.
//!
//! Shapes travel as JSON in both directions (client payloads and the image
//! metadata side channel), so the serde representation is the contract:
//! an internally tagged object with `"type"` set to `rectangle`, `polygon`
//! or `circle`. Unknown tags are rejected.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Maximum number of shapes accepted for a single image.
pub const MAX_SHAPES_PER_IMAGE: usize = 1000;

/// A single vertex of a polygon.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rectangle {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub label: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub thickness: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub points: Vec<Point>,
    pub label: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub thickness: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    pub cx: f64,
    pub cy: f64,
    pub radius: f64,
    pub label: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub thickness: f64,
}

/// One annotation primitive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Shape {
    Rectangle(Rectangle),
    Polygon(Polygon),
    Circle(Circle),
}

/// Axis-aligned box in image pixel coordinates (top-left origin).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Shape {
    pub fn label(&self) -> &str {
        match self {
            Self::Rectangle(r) => &r.label,
            Self::Polygon(p) => &p.label,
            Self::Circle(c) => &c.label,
        }
    }

    /// Smallest axis-aligned box enclosing the shape.
    ///
    /// Returns `None` for a polygon without vertices.
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        match self {
            Self::Rectangle(r) => Some(BoundingBox {
                x: r.x,
                y: r.y,
                width: r.width,
                height: r.height,
            }),
            Self::Polygon(p) => {
                let first = p.points.first()?;
                let (min_x, min_y, max_x, max_y) = p.points.iter().fold(
                    (first.x, first.y, first.x, first.y),
                    |(min_x, min_y, max_x, max_y), pt| {
                        (min_x.min(pt.x), min_y.min(pt.y), max_x.max(pt.x), max_y.max(pt.y))
                    },
                );
                Some(BoundingBox {
                    x: min_x,
                    y: min_y,
                    width: max_x - min_x,
                    height: max_y - min_y,
                })
            }
            Self::Circle(c) => Some(BoundingBox {
                x: c.cx - c.radius,
                y: c.cy - c.radius,
                width: c.radius * 2.0,
                height: c.radius * 2.0,
            }),
        }
    }

    fn coordinates(&self) -> Vec<f64> {
        match self {
            Self::Rectangle(r) => vec![r.x, r.y, r.width, r.height, r.thickness],
            Self::Polygon(p) => p
                .points
                .iter()
                .flat_map(|pt| [pt.x, pt.y])
                .chain(std::iter::once(p.thickness))
                .collect(),
            Self::Circle(c) => vec![c.cx, c.cy, c.radius, c.thickness],
        }
    }
}

/// Validate a client-supplied shape list before it is embedded.
///
/// Every numeric field must be finite, polygons need at least one vertex,
/// and rectangle sizes and circle radii must be non-negative.
pub fn validate_shapes(shapes: &[Shape]) -> Result<(), CoreError> {
    if shapes.len() > MAX_SHAPES_PER_IMAGE {
        return Err(CoreError::Validation(format!(
            "{} shapes supplied, maximum is {MAX_SHAPES_PER_IMAGE}",
            shapes.len()
        )));
    }

    for (i, shape) in shapes.iter().enumerate() {
        if shape.coordinates().iter().any(|v| !v.is_finite()) {
            return Err(CoreError::Validation(format!(
                "shapes[{i}] contains a non-finite number"
            )));
        }
        match shape {
            Shape::Rectangle(r) if r.width < 0.0 || r.height < 0.0 => {
                return Err(CoreError::Validation(format!(
                    "shapes[{i}] rectangle has a negative size"
                )));
            }
            Shape::Polygon(p) if p.points.is_empty() => {
                return Err(CoreError::Validation(format!(
                    "shapes[{i}] polygon has no points"
                )));
            }
            Shape::Circle(c) if c.radius < 0.0 => {
                return Err(CoreError::Validation(format!(
                    "shapes[{i}] circle has a negative radius"
                )));
            }
            _ => {}
        }
    }

    Ok(())
}
