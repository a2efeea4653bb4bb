use std::fmt;

/// Pixel coordinate in frame space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// One decoded symbol reading from a single frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    symbol_type: String,
    payload: String,
    polygon: Vec<Point>,
}

impl Detection {
    pub fn new(symbol_type: impl Into<String>, payload: impl Into<String>, polygon: Vec<Point>) -> Self {
        Self {
            symbol_type: symbol_type.into(),
            payload: payload.into(),
            polygon,
        }
    }

    pub fn symbol_type(&self) -> &str {
        &self.symbol_type
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn polygon(&self) -> &[Point] {
        &self.polygon
    }

    /// Top-left corner of the axis-aligned box enclosing the polygon.
    pub fn bounding_origin(&self) -> Option<Point> {
        let min_x = self.polygon.iter().map(|p| p.x).min()?;
        let min_y = self.polygon.iter().map(|p| p.y).min()?;
        Some(Point::new(min_x, min_y))
    }

    /// `(type, payload)` identity used for per-frame deduplication.
    pub fn key(&self) -> (&str, &str) {
        (&self.symbol_type, &self.payload)
    }
}

impl fmt::Display for Detection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.symbol_type, self.payload)
    }
}
