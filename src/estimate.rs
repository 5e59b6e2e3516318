use crate::constants::MPS_TO_KMH;
use rocket::serde::Serialize;
use serde::Deserialize;
use thiserror::Error;

type Pixels = f64; // length in displayed-image pixels
type Meters = f64;
type Seconds = f64;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Point {
        Point { x, y }
    }
}

/// A user-drawn line, undirected for length purposes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineSegment {
    pub p0: Point,
    pub p1: Point,
}

impl LineSegment {
    pub fn new(p0: Point, p1: Point) -> LineSegment {
        LineSegment { p0, p1 }
    }

    pub fn pixel_length(&self) -> Pixels {
        euclidean_distance(self.p0, self.p1)
    }
}

pub fn euclidean_distance(a: Point, b: Point) -> Pixels {
    (b.x - a.x).hypot(b.y - a.y)
}

#[derive(Debug, Error, PartialEq)]
pub enum EstimationError {
    #[error("Please draw both a calibration and a blur line.")]
    MissingInput,
    #[error("{field} must be a positive number, got {value}")]
    InvalidParameter { field: &'static str, value: f64 },
    #[error("{0}")]
    Division(&'static str),
}

impl EstimationError {
    pub fn kind(&self) -> &'static str {
        match self {
            EstimationError::MissingInput => "missing_input",
            EstimationError::InvalidParameter { .. } => "invalid_parameter",
            EstimationError::Division(_) => "division",
        }
    }
}

/// Everything the estimator needs, passed by value from whoever collected it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EstimationInput {
    #[serde(rename = "calibrationLine")]
    pub calibration_line: Option<LineSegment>,
    #[serde(rename = "blurLine")]
    pub blur_line: Option<LineSegment>,
    #[serde(rename = "calibrationLengthM")]
    pub calibration_length_m: Meters,
    #[serde(rename = "shutterS")]
    pub shutter_s: Seconds,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EstimationResult {
    #[serde(rename = "calibrationPixels")]
    pub calibration_pixels: Pixels,
    #[serde(rename = "calibrationLengthM")]
    pub calibration_length_m: Meters,
    #[serde(rename = "metersPerPixel")]
    pub meters_per_pixel: f64,
    #[serde(rename = "blurPixels")]
    pub blur_pixels: Pixels,
    #[serde(rename = "blurLengthM")]
    pub blur_length_m: Meters,
    #[serde(rename = "shutterS")]
    pub shutter_s: Seconds,
    #[serde(rename = "speedMps")]
    pub speed_mps: f64,
    #[serde(rename = "speedKmh")]
    pub speed_kmh: f64,
}

impl EstimationResult {
    pub fn headline(&self) -> String {
        format!("Estimated speed: {:.1} km/h", self.speed_kmh)
    }

    pub fn breakdown(&self) -> Vec<String> {
        vec![
            format!(
                "Calibration: {:.1} px ⇒ {:.3} m ⇒ {:.6} m/px",
                self.calibration_pixels, self.calibration_length_m, self.meters_per_pixel
            ),
            format!(
                "Blur length: {:.1} px ⇒ {:.3} m",
                self.blur_pixels, self.blur_length_m
            ),
            format!("Shutter speed: {:.5} s", self.shutter_s),
            format!(
                "Speed: {:.3} m / {:.5} s × {} = {:.1} km/h",
                self.blur_length_m, self.shutter_s, MPS_TO_KMH, self.speed_kmh
            ),
        ]
    }
}

pub fn estimate(input: &EstimationInput) -> Result<EstimationResult, EstimationError> {
    let (calibration_line, blur_line) = match (input.calibration_line, input.blur_line) {
        (Some(c), Some(b)) => (c, b),
        _ => return Err(EstimationError::MissingInput),
    };
    // a zero-length blur line is as good as no line; a zero-length
    // calibration line is caught below as a division by zero
    if blur_line.p0 == blur_line.p1 {
        return Err(EstimationError::MissingInput);
    }
    let calibration_length_m = positive("calibration length", input.calibration_length_m)?;
    let shutter_s = positive("shutter speed", input.shutter_s)?;

    let calibration_pixels = finite("calibration line length", calibration_line.pixel_length())?;
    let blur_pixels = finite("blur line length", blur_line.pixel_length())?;

    let meters_per_pixel = checked_div(
        calibration_length_m,
        calibration_pixels,
        "calibration line has zero length",
    )?;
    let blur_length_m = blur_pixels * meters_per_pixel;
    let speed_mps = checked_div(blur_length_m, shutter_s, "speed is not a finite number")?;
    let speed_kmh = speed_mps * MPS_TO_KMH;
    if !speed_kmh.is_finite() {
        return Err(EstimationError::Division("speed is not a finite number"));
    }

    Ok(EstimationResult {
        calibration_pixels,
        calibration_length_m,
        meters_per_pixel,
        blur_pixels,
        blur_length_m,
        shutter_s,
        speed_mps,
        speed_kmh,
    })
}

fn finite(field: &'static str, value: f64) -> Result<f64, EstimationError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EstimationError::InvalidParameter { field, value })
    }
}

fn positive(field: &'static str, value: f64) -> Result<f64, EstimationError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(EstimationError::InvalidParameter { field, value })
    }
}

fn checked_div(num: f64, den: f64, why: &'static str) -> Result<f64, EstimationError> {
    if den == 0.0 {
        return Err(EstimationError::Division(why));
    }
    let q = num / den;
    if q.is_finite() {
        Ok(q)
    } else {
        Err(EstimationError::Division(why))
    }
}
