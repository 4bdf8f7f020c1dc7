//! BGR to CIE L*a*b* conversion with the usual 8-bit encoding.
//!
//! L* is scaled from 0..100 to 0..255, a* and b* are offset by 128. The white
//! point is D65 and input is treated as sRGB.

use std::sync::OnceLock;

use video_ingest::Frame;

/// Planar L*a*b* image with one byte per channel.
#[derive(Clone, Debug)]
pub struct LabImage {
    pub width: i32,
    pub height: i32,
    pub l: Vec<u8>,
    pub a: Vec<u8>,
    pub b: Vec<u8>,
}

impl LabImage {
    /// Convert rows `0..rows` of `frame`.
    pub fn from_frame_rows(frame: &Frame, rows: i32) -> Self {
        let rows = rows.clamp(0, frame.height);
        let bytes = frame.top_rows(rows);
        let pixels = bytes.len() / 3;
        let mut l = Vec::with_capacity(pixels);
        let mut a = Vec::with_capacity(pixels);
        let mut b = Vec::with_capacity(pixels);
        for bgr in bytes.chunks_exact(3) {
            let [pl, pa, pb] = bgr_to_lab([bgr[0], bgr[1], bgr[2]]);
            l.push(pl);
            a.push(pa);
            b.push(pb);
        }
        Self {
            width: frame.width,
            height: rows,
            l,
            a,
            b,
        }
    }
}

fn srgb_to_linear() -> &'static [f32; 256] {
    static TABLE: OnceLock<[f32; 256]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [0.0f32; 256];
        for (i, value) in table.iter_mut().enumerate() {
            let c = i as f32 / 255.0;
            *value = if c <= 0.04045 {
                c / 12.92
            } else {
                ((c + 0.055) / 1.055).powf(2.4)
            };
        }
        table
    })
}

fn lab_f(t: f32) -> f32 {
    if t > 0.008856 {
        t.cbrt()
    } else {
        7.787 * t + 16.0 / 116.0
    }
}

fn saturate(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Convert one BGR pixel to 8-bit L*a*b*.
pub fn bgr_to_lab(bgr: [u8; 3]) -> [u8; 3] {
    let lut = srgb_to_linear();
    let b = lut[bgr[0] as usize];
    let g = lut[bgr[1] as usize];
    let r = lut[bgr[2] as usize];

    let x = (0.412453 * r + 0.357580 * g + 0.180423 * b) / 0.950456;
    let y = 0.212671 * r + 0.715160 * g + 0.072169 * b;
    let z = (0.019334 * r + 0.119193 * g + 0.950227 * b) / 1.088754;

    let fy = lab_f(y);
    let l = if y > 0.008856 {
        116.0 * fy - 16.0
    } else {
        903.3 * y
    };
    let a = 500.0 * (lab_f(x) - fy);
    let b = 200.0 * (fy - lab_f(z));

    [saturate(l * 255.0 / 100.0), saturate(a + 128.0), saturate(b + 128.0)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_colours_have_centred_chroma() {
        for level in [0u8, 60, 128, 200, 255] {
            let [_, a, b] = bgr_to_lab([level, level, level]);
            assert!((a as i32 - 128).abs() <= 1, "a={a} for grey {level}");
            assert!((b as i32 - 128).abs() <= 1, "b={b} for grey {level}");
        }
        assert_eq!(bgr_to_lab([255, 255, 255])[0], 255);
        assert_eq!(bgr_to_lab([0, 0, 0])[0], 0);
    }

    #[test]
    fn blue_and_yellow_sit_at_opposite_ends_of_b() {
        let blue = bgr_to_lab([255, 0, 0]);
        let yellow = bgr_to_lab([0, 255, 255]);
        assert!(blue[2] < 40, "blue b={}", blue[2]);
        assert!(yellow[2] > 200, "yellow b={}", yellow[2]);
    }

    #[test]
    fn converts_only_requested_rows() {
        let frame = Frame::filled(5, 6, [10, 20, 30], 0);
        let lab = LabImage::from_frame_rows(&frame, 3);
        assert_eq!((lab.width, lab.height), (5, 3));
        assert_eq!(lab.l.len(), 15);
        assert_eq!(lab.b.len(), 15);
    }
}
