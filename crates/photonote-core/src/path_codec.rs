//! Portable text encoding for freehand stroke geometry.
//!
//! Strokes are stored as SVG path data: a single move-to followed by line-to
//! segments. Coordinates are written with shortest round-trip float formatting
//! so `decode(encode(p)) == p` holds exactly.

use kurbo::{BezPath, PathEl, Point};

/// Tolerance used when flattening curve segments found in foreign path data.
const FLATTEN_TOLERANCE: f64 = 0.25;

/// Encode an ordered point sequence as SVG path data.
///
/// Returns an empty string for an empty sequence, which [`decode`] rejects.
pub fn encode(points: &[Point]) -> String {
    to_bez_path(points).to_svg()
}

/// Build a move-to/line-to path from points.
pub fn to_bez_path(points: &[Point]) -> BezPath {
    let mut path = BezPath::new();
    let Some((first, rest)) = points.split_first() else {
        return path;
    };
    path.move_to(*first);
    for point in rest {
        path.line_to(*point);
    }
    path
}

/// Decode SVG path data back into an ordered point sequence.
///
/// Returns `None` for empty or unparseable data, for data with more than one
/// sub-path, and for non-finite coordinates. Curves are flattened.
pub fn decode(data: &str) -> Option<Vec<Point>> {
    let data = data.trim();
    if data.is_empty() {
        return None;
    }

    let path = BezPath::from_svg(data).ok()?;

    let mut points = Vec::new();
    let mut subpaths = 0usize;
    kurbo::flatten(&path, FLATTEN_TOLERANCE, |el| match el {
        PathEl::MoveTo(p) => {
            subpaths += 1;
            points.push(p);
        }
        PathEl::LineTo(p) => points.push(p),
        PathEl::ClosePath => {
            if let Some(first) = points.first().copied() {
                points.push(first);
            }
        }
        // flatten only emits lines
        PathEl::QuadTo(..) | PathEl::CurveTo(..) => {}
    });

    if subpaths != 1 || points.is_empty() {
        return None;
    }
    if points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
        return None;
    }
    Some(points)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_preserves_points() {
        let points = vec![
            Point::new(0.0, 0.0),
            Point::new(10.5, 20.25),
            Point::new(-3.125, 1.0 / 3.0),
            Point::new(1234.5678, 0.1 + 0.2),
        ];

        let encoded = encode(&points);
        assert_eq!(decode(&encoded), Some(points));
    }

    #[test]
    fn test_single_point_round_trip() {
        let points = vec![Point::new(42.0, 7.5)];
        assert_eq!(decode(&encode(&points)), Some(points));
    }

    #[test]
    fn test_encode_starts_with_move_to() {
        let encoded = encode(&[Point::new(1.0, 2.0), Point::new(3.0, 4.0)]);
        assert!(encoded.starts_with('M'));
        assert!(encoded.contains('L'));
    }

    #[test]
    fn test_decode_rejects_empty() {
        assert_eq!(decode(""), None);
        assert_eq!(decode("   "), None);
        assert_eq!(decode(&encode(&[])), None);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert_eq!(decode("not a path"), None);
        assert_eq!(decode("M 1 2 L"), None);
    }

    #[test]
    fn test_decode_rejects_multiple_subpaths() {
        assert_eq!(decode("M0 0 L1 1 M5 5 L6 6"), None);
    }

    #[test]
    fn test_decode_accepts_hand_written_path() {
        let points = decode("M 0,0 L 10,0 L 10,10").unwrap();
        assert_eq!(
            points,
            vec![
                Point::new(0.0, 0.0),
                Point::new(10.0, 0.0),
                Point::new(10.0, 10.0)
            ]
        );
    }

    #[test]
    fn test_decode_flattens_curves() {
        let points = decode("M0 0 Q50 100 100 0").unwrap();
        assert!(points.len() > 2);
        assert_eq!(points.first(), Some(&Point::new(0.0, 0.0)));
        let last = points.last().unwrap();
        assert!((last.x - 100.0).abs() < 1e-9);
        assert!(last.y.abs() < 1e-9);
    }
}
