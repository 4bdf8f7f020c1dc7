use std::path::PathBuf;

use anyhow::Error;
use image::RgbImage;
use thiserror::Error;

/// Raw BGR frame captured from a video source.
///
/// Pixels are stored row-major with three bytes per pixel and no row padding.
#[derive(Clone, Debug)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: i32,
    pub height: i32,
    pub timestamp_ms: i64,
    pub format: FrameFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameFormat {
    Bgr8,
}

impl FrameFormat {
    pub const fn channels(self) -> usize {
        match self {
            FrameFormat::Bgr8 => 3,
        }
    }
}

impl Frame {
    /// Frame of the given size filled with one BGR colour.
    pub fn filled(width: i32, height: i32, bgr: [u8; 3], timestamp_ms: i64) -> Self {
        let pixels = (width.max(0) as usize) * (height.max(0) as usize);
        let mut data = Vec::with_capacity(pixels * 3);
        for _ in 0..pixels {
            data.extend_from_slice(&bgr);
        }
        Self {
            data,
            width,
            height,
            timestamp_ms,
            format: FrameFormat::Bgr8,
        }
    }

    /// `true` when the frame has no pixels or its buffer disagrees with its size.
    pub fn is_empty(&self) -> bool {
        self.width <= 0
            || self.height <= 0
            || self.data.len() != self.width as usize * self.height as usize * self.format.channels()
    }

    fn offset(&self, x: i32, y: i32) -> usize {
        (y as usize * self.width as usize + x as usize) * self.format.channels()
    }

    /// BGR triple at (`x`, `y`).
    pub fn pixel(&self, x: i32, y: i32) -> [u8; 3] {
        let i = self.offset(x, y);
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    /// Overwrite the pixel at (`x`, `y`); coordinates outside the frame are ignored.
    pub fn set_pixel(&mut self, x: i32, y: i32, bgr: [u8; 3]) {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return;
        }
        let i = self.offset(x, y);
        self.data[i..i + 3].copy_from_slice(&bgr);
    }

    /// Bytes of rows `0..rows`.
    pub fn top_rows(&self, rows: i32) -> &[u8] {
        let rows = rows.clamp(0, self.height) as usize;
        &self.data[..rows * self.width as usize * self.format.channels()]
    }

    /// Convert to an RGB image buffer for encoding.
    pub fn to_rgb_image(&self) -> Option<RgbImage> {
        if self.is_empty() {
            return None;
        }
        RgbImage::from_vec(self.width as u32, self.height as u32, swap_red_blue(&self.data))
    }

    /// Build a BGR frame from an RGB image buffer.
    pub fn from_rgb_image(image: &RgbImage, timestamp_ms: i64) -> Self {
        Self {
            data: swap_red_blue(image.as_raw()),
            width: image.width() as i32,
            height: image.height() as i32,
            timestamp_ms,
            format: FrameFormat::Bgr8,
        }
    }
}

fn swap_red_blue(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    for chunk in input.chunks_exact(3) {
        out.extend_from_slice(&[chunk[2], chunk[1], chunk[0]]);
    }
    out
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open video source {uri:?}")]
    Open { uri: String },
    #[error("failed to decode {path:?}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("video source {uri:?} produced no frames")]
    NoFrames { uri: String },
    #[error("video source {uri:?} stopped delivering frames")]
    Lost { uri: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb_round_trip_swaps_channels() {
        let mut frame = Frame::filled(2, 1, [10, 20, 30], 5);
        frame.set_pixel(1, 0, [1, 2, 3]);
        let rgb = frame.to_rgb_image().unwrap();
        assert_eq!(rgb.get_pixel(0, 0).0, [30, 20, 10]);
        let back = Frame::from_rgb_image(&rgb, 5);
        assert_eq!(back.pixel(1, 0), [1, 2, 3]);
        assert_eq!(back.data, frame.data);
    }

    #[test]
    fn mismatched_buffer_is_empty() {
        let mut frame = Frame::filled(4, 4, [0, 0, 0], 0);
        assert!(!frame.is_empty());
        frame.data.pop();
        assert!(frame.is_empty());
        assert!(Frame::filled(0, 3, [0, 0, 0], 0).is_empty());
    }

    #[test]
    fn top_rows_covers_requested_rows() {
        let frame = Frame::filled(3, 4, [1, 1, 1], 0);
        assert_eq!(frame.top_rows(2).len(), 3 * 2 * 3);
        assert_eq!(frame.top_rows(10).len(), frame.data.len());
    }
}
