//! Freehand strokes.
//!
//! A stroke is one pointer gesture: a tool, a color, a width and the ordered
//! points sampled between pointer-down and pointer-release. Strokes are
//! append-only; once built they are never mutated.

use crate::color::Rgb;
use kurbo::{Line, Point};
use serde::{Deserialize, Serialize};

/// Narrowest line the brush allows.
pub const MIN_LINE_WIDTH: f64 = 1.0;
/// Widest line the brush allows.
pub const MAX_LINE_WIDTH: f64 = 30.0;

/// Drawing tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    #[default]
    Pen,
    /// Paints with the canvas background color.
    Eraser,
}

/// A completed freehand gesture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub tool: Tool,
    pub color: Rgb,
    pub line_width: f64,
    pub points: Vec<Point>,
    #[serde(rename = "username")]
    pub author: String,
}

impl Stroke {
    /// Create a stroke from existing points.
    pub fn new(tool: Tool, color: Rgb, line_width: f64, points: Vec<Point>, author: impl Into<String>) -> Self {
        Self {
            tool,
            color,
            line_width,
            points,
            author: author.into(),
        }
    }

    /// Whether this stroke carries a visible segment and should be sent to peers.
    pub fn is_broadcastable(&self) -> bool {
        self.points.len() >= 2
    }

    /// The color actually painted: erasers paint the background.
    pub fn paint_color(&self, background: Rgb) -> Rgb {
        match self.tool {
            Tool::Pen => self.color,
            Tool::Eraser => background,
        }
    }

    /// Straight segments between consecutive samples.
    pub fn segments(&self) -> impl Iterator<Item = Line> + '_ {
        self.points.windows(2).map(|pair| Line::new(pair[0], pair[1]))
    }
}

/// Point buffer for a gesture in progress.
#[derive(Debug, Clone)]
pub struct StrokeBuilder {
    tool: Tool,
    color: Rgb,
    line_width: f64,
    points: Vec<Point>,
}

impl StrokeBuilder {
    /// Start a gesture at the pointer-down position.
    pub fn begin(tool: Tool, color: Rgb, line_width: f64, start: Point) -> Self {
        Self {
            tool,
            color,
            line_width,
            points: vec![start],
        }
    }

    /// Append a sample; returns the new segment to draw.
    pub fn push(&mut self, point: Point) -> Option<Line> {
        let last = self.points.last().copied();
        self.points.push(point);
        last.map(|prev| Line::new(prev, point))
    }

    pub fn line_width(&self) -> f64 {
        self.line_width
    }

    /// Same rule as [`Stroke::paint_color`].
    pub fn paint_color(&self, background: Rgb) -> Rgb {
        match self.tool {
            Tool::Pen => self.color,
            Tool::Eraser => background,
        }
    }

    /// Freeze the buffered points into a stroke.
    pub fn finish(self, author: impl Into<String>) -> Stroke {
        Stroke::new(self.tool, self.color, self.line_width, self.points, author)
    }
}
