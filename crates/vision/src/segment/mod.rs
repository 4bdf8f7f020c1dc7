//! Ground-line segmentation strategies.
//!
//! Both strategies work on the L*a*b* conversion of the upper half of a frame
//! and return line segments in frame coordinates (the upper half starts at
//! row 0, so no offset is needed).

mod contour;
mod edge;
mod geometry;
mod threshold;

pub use contour::{Contour, find_external_contours};
pub use edge::{HoughParams, canny, hough_lines_probabilistic};
pub use geometry::{Point, Rect, bounding_rect, clip_line, contour_area, fit_line};
pub use threshold::{binarize_inverted, otsu_threshold};

use crate::color::LabImage;

/// Line segment with integer endpoints in image space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DetectedLine {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl DetectedLine {
    pub const fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn length_squared(&self) -> i64 {
        let dx = (self.x1 - self.x2) as i64;
        let dy = (self.y1 - self.y2) as i64;
        dx * dx + dy * dy
    }
}

/// Segmentation strategy, chosen once at startup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Segmentation {
    /// Otsu threshold on b*, external contours, one fitted line per contour.
    #[default]
    Threshold,
    /// Canny edges on a* and b*, probabilistic Hough segments.
    Edge,
}

/// What a segmentation pass found in one frame.
#[derive(Clone, Debug, Default)]
pub struct Segmented {
    pub lines: Vec<DetectedLine>,
    /// External contours, threshold strategy only; drawn onto the overlay.
    pub contours: Vec<Contour>,
    /// Otsu threshold chosen for the frame, threshold strategy only.
    pub threshold: Option<u8>,
}

/// Frame-size dependent constants shared by both strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Geometry {
    pub width: i32,
    pub height: i32,
}

impl Geometry {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    /// Lines must be strictly longer than this to count.
    pub const fn min_line_length(&self) -> i32 {
        self.height / 3
    }

    /// Ceiling on total contour area before a frame is treated as noise.
    pub fn max_threshold_area(&self) -> f64 {
        ((self.width as i64 * self.height as i64) / 12) as f64
    }

    pub fn hough_threshold(&self) -> i32 {
        let votes = self.width as i64 * self.height as i64 / 6500;
        i32::try_from(votes).unwrap_or(i32::MAX)
    }
}

impl Segmentation {
    pub fn label(self) -> &'static str {
        match self {
            Segmentation::Threshold => "threshold",
            Segmentation::Edge => "edge",
        }
    }

    /// Run the strategy over `lab`, which holds the processed upper rows.
    pub fn run(self, lab: &LabImage, geometry: Geometry) -> Segmented {
        match self {
            Segmentation::Threshold => threshold::segment(lab, geometry),
            Segmentation::Edge => edge::segment(lab, geometry),
        }
    }
}
