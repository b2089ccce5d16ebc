//! Freehand annotation layer: committed strokes, the in-progress stroke,
//! brush state and undo.

use kurbo::{Point, Rect};
use peniko::Color;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Default brush width in canvas units.
pub const DEFAULT_STROKE_WIDTH: f64 = 6.0;

/// Errors raised by annotation operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnnotationError {
    #[error("A stroke is already in progress")]
    StrokeInProgress,
    #[error("Point has non-finite coordinates")]
    InvalidPoint,
    #[error("Stroke width must be positive and finite, got {0}")]
    InvalidWidth(f64),
}

/// Stroke color (RGBA8), written as `#rrggbb` or `#rrggbbaa`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StrokeColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl StrokeColor {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    pub const fn black() -> Self {
        Self::rgb(0, 0, 0)
    }

    pub const fn red() -> Self {
        Self::rgb(255, 0, 0)
    }

    /// Hex form; the alpha byte is omitted when fully opaque.
    pub fn to_hex(self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }

    /// Parse `#rrggbb` or `#rrggbbaa` (case-insensitive).
    pub fn parse_hex(s: &str) -> Option<Self> {
        let hex = s.trim().strip_prefix('#')?;
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        match hex.len() {
            6 => Some(Self::rgb(byte(0)?, byte(2)?, byte(4)?)),
            8 => Some(Self::new(byte(0)?, byte(2)?, byte(4)?, byte(6)?)),
            _ => None,
        }
    }
}

impl Default for StrokeColor {
    fn default() -> Self {
        Self::red()
    }
}

impl fmt::Display for StrokeColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for StrokeColor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_hex(s).ok_or_else(|| format!("Invalid color: {s}"))
    }
}

impl Serialize for StrokeColor {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for StrokeColor {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl From<Color> for StrokeColor {
    fn from(color: Color) -> Self {
        let rgba = color.to_rgba8();
        Self::new(rgba.r, rgba.g, rgba.b, rgba.a)
    }
}

impl From<StrokeColor> for Color {
    fn from(color: StrokeColor) -> Self {
        Color::from_rgba8(color.r, color.g, color.b, color.a)
    }
}

/// Brush settings applied to strokes at commit time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Brush {
    pub color: StrokeColor,
    pub width: f64,
}

impl Default for Brush {
    fn default() -> Self {
        Self {
            color: StrokeColor::default(),
            width: DEFAULT_STROKE_WIDTH,
        }
    }
}

/// A committed freehand annotation. Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct Stroke {
    points: Vec<Point>,
    color: StrokeColor,
    width: f64,
}

impl Stroke {
    /// Build a stroke from already-validated parts.
    ///
    /// Returns `None` when there are no points, a point is non-finite, or the
    /// width is not positive and finite.
    pub fn new(points: Vec<Point>, color: StrokeColor, width: f64) -> Option<Self> {
        if points.is_empty() || !points.iter().all(|p| is_finite(*p)) {
            return None;
        }
        if !(width.is_finite() && width > 0.0) {
            return None;
        }
        Some(Self {
            points,
            color,
            width,
        })
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn color(&self) -> StrokeColor {
        self.color
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    /// Bounding box of the stroke centerline.
    pub fn bounds(&self) -> Rect {
        let mut iter = self.points.iter();
        let Some(first) = iter.next() else {
            return Rect::ZERO;
        };
        iter.fold(Rect::from_points(*first, *first), |r, p| r.union_pt(*p))
    }
}

fn is_finite(p: Point) -> bool {
    p.x.is_finite() && p.y.is_finite()
}

/// Owns the committed strokes of one session plus the stroke being drawn.
///
/// Stroke order is paint order.
#[derive(Debug, Clone, Default)]
pub struct AnnotationLayer {
    strokes: Vec<Stroke>,
    active: Option<Vec<Point>>,
    brush: Brush,
}

impl AnnotationLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a layer holding already-committed strokes.
    pub fn with_strokes(strokes: Vec<Stroke>) -> Self {
        Self {
            strokes,
            ..Self::default()
        }
    }

    /// Start a new stroke at `point`.
    pub fn begin_stroke(&mut self, point: Point) -> Result<(), AnnotationError> {
        if self.active.is_some() {
            return Err(AnnotationError::StrokeInProgress);
        }
        if !is_finite(point) {
            return Err(AnnotationError::InvalidPoint);
        }
        self.active = Some(vec![point]);
        Ok(())
    }

    /// Append a point to the active stroke.
    ///
    /// Returns false (and does nothing) if no stroke is active or the point is
    /// non-finite; late input from an interrupted gesture lands here.
    pub fn extend_stroke(&mut self, point: Point) -> bool {
        match &mut self.active {
            Some(points) if is_finite(point) => {
                points.push(point);
                true
            }
            _ => false,
        }
    }

    /// Promote the active path to a committed stroke using the current brush.
    ///
    /// A tap without movement commits a one-point stroke, drawn as a dot.
    /// Returns the committed stroke, or `None` if there was nothing to commit.
    pub fn commit_stroke(&mut self) -> Option<&Stroke> {
        let points = self.active.take()?;
        let stroke = Stroke::new(points, self.brush.color, self.brush.width)?;
        self.strokes.push(stroke);
        self.strokes.last()
    }

    /// Drop the active path without committing it.
    pub fn cancel_stroke(&mut self) {
        self.active = None;
    }

    /// Remove the most recently committed stroke.
    pub fn undo(&mut self) -> Option<Stroke> {
        self.strokes.pop()
    }

    /// Remove all strokes and discard any active path.
    pub fn clear(&mut self) {
        self.strokes.clear();
        self.active = None;
    }

    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    pub fn len(&self) -> usize {
        self.strokes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty()
    }

    /// Points of the stroke currently being drawn, if any.
    pub fn active_points(&self) -> Option<&[Point]> {
        self.active.as_deref()
    }

    pub fn is_drawing(&self) -> bool {
        self.active.is_some()
    }

    pub fn brush(&self) -> Brush {
        self.brush
    }

    pub fn set_brush(&mut self, brush: Brush) -> Result<(), AnnotationError> {
        self.set_width(brush.width)?;
        self.brush.color = brush.color;
        Ok(())
    }

    pub fn set_color(&mut self, color: StrokeColor) {
        self.brush.color = color;
    }

    pub fn set_width(&mut self, width: f64) -> Result<(), AnnotationError> {
        if !(width.is_finite() && width > 0.0) {
            return Err(AnnotationError::InvalidWidth(width));
        }
        self.brush.width = width;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draw(layer: &mut AnnotationLayer, points: &[(f64, f64)]) {
        let (first, rest) = points.split_first().unwrap();
        layer.begin_stroke(Point::new(first.0, first.1)).unwrap();
        for (x, y) in rest {
            layer.extend_stroke(Point::new(*x, *y));
        }
        layer.commit_stroke();
    }

    #[test]
    fn test_begin_twice_fails() {
        let mut layer = AnnotationLayer::new();
        layer.begin_stroke(Point::new(0.0, 0.0)).unwrap();
        assert_eq!(
            layer.begin_stroke(Point::new(1.0, 1.0)),
            Err(AnnotationError::StrokeInProgress)
        );
    }

    #[test]
    fn test_extend_without_active_is_noop() {
        let mut layer = AnnotationLayer::new();
        assert!(!layer.extend_stroke(Point::new(5.0, 5.0)));
        assert!(layer.commit_stroke().is_none());
        assert!(layer.is_empty());
    }

    #[test]
    fn test_commit_appends_stroke() {
        let mut layer = AnnotationLayer::new();
        draw(&mut layer, &[(0.0, 0.0), (10.0, 10.0), (20.0, 5.0)]);

        assert_eq!(layer.len(), 1);
        assert!(!layer.is_drawing());
        assert_eq!(layer.strokes()[0].points().len(), 3);
    }

    #[test]
    fn test_single_point_stroke_is_a_dot() {
        let mut layer = AnnotationLayer::new();
        layer.begin_stroke(Point::new(3.0, 3.0)).unwrap();
        let stroke = layer.commit_stroke().unwrap();
        assert_eq!(stroke.points(), &[Point::new(3.0, 3.0)]);
        assert_eq!(layer.len(), 1);
        assert!(!layer.is_drawing());
    }

    #[test]
    fn test_brush_captured_at_commit() {
        let mut layer = AnnotationLayer::new();
        layer.begin_stroke(Point::new(0.0, 0.0)).unwrap();
        layer.extend_stroke(Point::new(1.0, 1.0));
        layer.set_color(StrokeColor::rgb(0, 0, 255));
        layer.set_width(12.0).unwrap();
        layer.commit_stroke();

        layer.set_color(StrokeColor::black());
        let stroke = &layer.strokes()[0];
        assert_eq!(stroke.color(), StrokeColor::rgb(0, 0, 255));
        assert_eq!(stroke.width(), 12.0);
    }

    #[test]
    fn test_undo_removes_most_recent_first() {
        let mut layer = AnnotationLayer::new();
        for i in 0..5 {
            let x = i as f64;
            draw(&mut layer, &[(x, 0.0), (x, 10.0)]);
        }

        for k in 1..=3 {
            let removed = layer.undo().unwrap();
            assert_eq!(removed.points()[0].x, (5 - k) as f64);
            assert_eq!(layer.len(), 5 - k);
        }
    }

    #[test]
    fn test_undo_on_empty_is_noop() {
        let mut layer = AnnotationLayer::new();
        assert!(layer.undo().is_none());
        assert!(layer.is_empty());
    }

    #[test]
    fn test_clear_discards_active_path() {
        let mut layer = AnnotationLayer::new();
        draw(&mut layer, &[(0.0, 0.0), (1.0, 1.0)]);
        layer.begin_stroke(Point::new(2.0, 2.0)).unwrap();

        layer.clear();
        assert!(layer.is_empty());
        assert!(!layer.is_drawing());
        // A new stroke can begin after clear.
        assert!(layer.begin_stroke(Point::new(0.0, 0.0)).is_ok());
    }

    #[test]
    fn test_non_finite_points_rejected() {
        let mut layer = AnnotationLayer::new();
        assert_eq!(
            layer.begin_stroke(Point::new(f64::NAN, 0.0)),
            Err(AnnotationError::InvalidPoint)
        );
        layer.begin_stroke(Point::new(0.0, 0.0)).unwrap();
        assert!(!layer.extend_stroke(Point::new(f64::INFINITY, 1.0)));
        assert_eq!(layer.active_points().unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_width_rejected() {
        let mut layer = AnnotationLayer::new();
        assert!(layer.set_width(0.0).is_err());
        assert!(layer.set_width(-2.0).is_err());
        assert!(layer.set_width(f64::NAN).is_err());
        assert_eq!(layer.brush().width, DEFAULT_STROKE_WIDTH);
    }

    #[test]
    fn test_color_hex_round_trip() {
        let opaque = StrokeColor::rgb(0x12, 0xab, 0xff);
        assert_eq!(opaque.to_hex(), "#12abff");
        assert_eq!(StrokeColor::parse_hex("#12ABFF"), Some(opaque));

        let translucent = StrokeColor::new(1, 2, 3, 128);
        assert_eq!(StrokeColor::parse_hex(&translucent.to_hex()), Some(translucent));

        assert_eq!(StrokeColor::parse_hex("12abff"), None);
        assert_eq!(StrokeColor::parse_hex("#12ab"), None);
        assert_eq!(StrokeColor::parse_hex("#zzzzzz"), None);
    }

    #[test]
    fn test_stroke_bounds() {
        let stroke = Stroke::new(
            vec![Point::new(0.0, 5.0), Point::new(10.0, -5.0), Point::new(4.0, 20.0)],
            StrokeColor::black(),
            2.0,
        )
        .unwrap();
        assert_eq!(stroke.bounds(), Rect::new(0.0, -5.0, 10.0, 20.0));
    }
}
