use crate::error::{Result, ScrapeError};

/// A point in on-screen (CSS pixel) coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

/// On-screen rectangle of the map plus its zoom relative to the starting view
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub zoom: u32,
}

impl Region {
    pub fn new(x: f64, y: f64, width: f64, height: f64, zoom: u32) -> Result<Self> {
        if !(width > 0.0 && height > 0.0) {
            return Err(ScrapeError::InvalidRegion { width, height });
        }
        Ok(Self {
            x,
            y,
            width,
            height,
            zoom,
        })
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x <= self.x + self.width && p.y >= self.y && p.y <= self.y + self.height
    }

    /// The same screen rectangle one zoom level further in
    pub fn zoomed_in(&self) -> Self {
        Self {
            zoom: self.zoom + 1,
            ..*self
        }
    }

    /// Pixel displacement of a pan step on this region
    pub fn displacement(&self, step: PanStep) -> (f64, f64) {
        (
            step.dx as f64 * self.width / 4.0,
            step.dy as f64 * self.height / 4.0,
        )
    }
}

/// One relative drag of the map content, in quarter-viewport units.
///
/// Positive `dx` drags the content right, which brings the western part of
/// the map to the center of the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanStep {
    pub dx: i32,
    pub dy: i32,
    /// Whether the view is zoomed in and searched after this step
    pub visit: bool,
}

/// Centers each quadrant in turn (top-left, top-right, bottom-right,
/// bottom-left) and then drags back to the starting position.
pub const QUADRANT_PASS: [PanStep; 5] = [
    PanStep { dx: 1, dy: 1, visit: true },
    PanStep { dx: -2, dy: 0, visit: true },
    PanStep { dx: 0, dy: -2, visit: true },
    PanStep { dx: 2, dy: 0, visit: true },
    PanStep { dx: -1, dy: 1, visit: false },
];

/// Checks that a pass of pan steps leaves the view where it started.
pub fn verify_balanced(pass: &[PanStep]) -> Result<()> {
    let (dx, dy) = pass
        .iter()
        .fold((0, 0), |(x, y), step| (x + step.dx, y + step.dy));
    if dx != 0 || dy != 0 {
        return Err(ScrapeError::UnbalancedPanPass { dx, dy });
    }
    Ok(())
}
