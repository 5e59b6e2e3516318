//! Reads line segments out of the JSON document a drawing canvas posts.
//!
//! The document is Fabric.js shaped: `{"objects": [{"type": "line", ...}, ...]}`.
//! A line either carries explicit `points: [[x0, y0], [x1, y1]]`, or Fabric's
//! native `x1/y1/x2/y2`, which are relative to the object's centre.

use json::JsonValue;
use thiserror::Error;

use crate::estimate::{LineSegment, Point};

#[derive(Debug, Error, PartialEq)]
pub enum CanvasError {
    #[error("canvas document is not valid json: {0}")]
    Malformed(String),
    #[error("canvas document has no objects list")]
    NoObjects,
    #[error("line object {0} has no usable coordinates")]
    InvalidLine(usize),
}

/// Returns the most recently drawn line, or `None` if nothing was drawn.
pub fn last_line(document: &str) -> Result<Option<LineSegment>, CanvasError> {
    let parsed = json::parse(document).map_err(|e| CanvasError::Malformed(e.to_string()))?;
    let objects = &parsed["objects"];
    if objects.is_null() {
        return Ok(None);
    }
    if !objects.is_array() {
        return Err(CanvasError::NoObjects);
    }

    let mut last = None;
    for (i, object) in objects.members().enumerate() {
        if object["type"].as_str() != Some("line") {
            continue;
        }
        let line = line_from_points(&object["points"])
            .or_else(|| line_from_fabric(object))
            .ok_or(CanvasError::InvalidLine(i))?;
        last = Some(line);
    }
    Ok(last)
}

fn point(value: &JsonValue) -> Option<Point> {
    if value.len() != 2 {
        return None;
    }
    let x = value[0].as_f64()?;
    let y = value[1].as_f64()?;
    finite(Point::new(x, y))
}

fn line_from_points(points: &JsonValue) -> Option<LineSegment> {
    if !points.is_array() || points.len() != 2 {
        return None;
    }
    Some(LineSegment::new(point(&points[0])?, point(&points[1])?))
}

fn line_from_fabric(object: &JsonValue) -> Option<LineSegment> {
    let (cx, cy) = centre(object);
    let p0 = Point::new(cx + object["x1"].as_f64()?, cy + object["y1"].as_f64()?);
    let p1 = Point::new(cx + object["x2"].as_f64()?, cy + object["y2"].as_f64()?);
    Some(LineSegment::new(finite(p0)?, finite(p1)?))
}

// left/top are anchored at the origin corner unless the origin is "center"
fn centre(object: &JsonValue) -> (f64, f64) {
    let left = object["left"].as_f64().unwrap_or(0.);
    let top = object["top"].as_f64().unwrap_or(0.);
    let width = object["width"].as_f64().unwrap_or(0.);
    let height = object["height"].as_f64().unwrap_or(0.);
    let cx = match object["originX"].as_str() {
        Some("center") => left,
        Some("right") => left - width / 2.,
        _ => left + width / 2.,
    };
    let cy = match object["originY"].as_str() {
        Some("center") => top,
        Some("bottom") => top - height / 2.,
        _ => top + height / 2.,
    };
    (cx, cy)
}

fn finite(p: Point) -> Option<Point> {
    if p.x.is_finite() && p.y.is_finite() {
        Some(p)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_line_from_points() {
        let doc = r#"{"objects": [{"type": "line", "points": [[10, 20], [110, 20]]}]}"#;
        let line = last_line(doc).unwrap().unwrap();
        assert_eq!(line.p0, Point::new(10., 20.));
        assert_eq!(line.p1, Point::new(110., 20.));
        assert_eq!(line.pixel_length(), 100.);
    }

    #[test]
    fn last_line_from_fabric_coordinates() {
        let doc = r#"{
            "version": "4.4.0",
            "objects": [{
                "type": "line", "originX": "left", "originY": "top",
                "left": 100, "top": 50, "width": 60, "height": 80,
                "x1": -30, "y1": -40, "x2": 30, "y2": 40
            }]
        }"#;
        let line = last_line(doc).unwrap().unwrap();
        assert_eq!(line.p0, Point::new(100., 50.));
        assert_eq!(line.p1, Point::new(160., 130.));
        assert_eq!(line.pixel_length(), 100.);
    }

    #[test]
    fn last_line_with_centre_origin() {
        let doc = r#"{"objects": [{
            "type": "line", "originX": "center", "originY": "center",
            "left": 10, "top": 10, "x1": -5, "y1": 0, "x2": 5, "y2": 0
        }]}"#;
        let line = last_line(doc).unwrap().unwrap();
        assert_eq!(line.p0, Point::new(5., 10.));
        assert_eq!(line.p1, Point::new(15., 10.));
    }

    #[test]
    fn last_drawn_line_wins() {
        let doc = r#"{"objects": [
            {"type": "line", "points": [[0, 0], [10, 0]]},
            {"type": "rect", "left": 4, "top": 4, "width": 3, "height": 3},
            {"type": "line", "points": [[0, 0], [0, 25]]},
            {"type": "circle", "left": 1, "top": 1, "radius": 9}
        ]}"#;
        let line = last_line(doc).unwrap().unwrap();
        assert_eq!(line.pixel_length(), 25.);
    }

    #[test]
    fn empty_canvas_has_no_line() {
        assert_eq!(last_line(r#"{"objects": []}"#).unwrap(), None);
        assert_eq!(last_line("{}").unwrap(), None);
        assert_eq!(
            last_line(r#"{"objects": [{"type": "path", "path": []}]}"#).unwrap(),
            None
        );
    }

    #[test]
    fn malformed_documents_are_rejected() {
        assert!(matches!(
            last_line("{objects: ").unwrap_err(),
            CanvasError::Malformed(_)
        ));
        assert_eq!(
            last_line(r#"{"objects": 5}"#).unwrap_err(),
            CanvasError::NoObjects
        );
        assert_eq!(
            last_line(r#"{"objects": [{"type": "line", "points": [[1, 2]]}]}"#).unwrap_err(),
            CanvasError::InvalidLine(0)
        );
    }
}
