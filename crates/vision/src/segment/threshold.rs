//! Otsu threshold on the b* channel followed by one fitted line per contour.

use tracing::trace;

use super::{DetectedLine, Geometry, Segmented, clip_line, find_external_contours, fit_line};
use crate::color::LabImage;

/// Half-length used when extending a fitted line before clipping it.
const EXTEND: f64 = 9999.0;

/// Threshold maximising between-class variance of `data`.
///
/// The first maximum wins on ties. Uniform input yields 0.
pub fn otsu_threshold(data: &[u8]) -> u8 {
    if data.is_empty() {
        return 0;
    }
    let mut histogram = [0u32; 256];
    for &v in data {
        histogram[v as usize] += 1;
    }

    let scale = 1.0 / data.len() as f64;
    let mu: f64 = histogram
        .iter()
        .enumerate()
        .map(|(i, &count)| i as f64 * count as f64)
        .sum::<f64>()
        * scale;

    let eps = f32::EPSILON as f64;
    let (mut q1, mut mu1) = (0.0f64, 0.0f64);
    let (mut max_sigma, mut best) = (0.0f64, 0u8);
    for (i, &count) in histogram.iter().enumerate() {
        let p_i = count as f64 * scale;
        mu1 *= q1;
        q1 += p_i;
        let q2 = 1.0 - q1;
        if q1.min(q2) < eps || q1.max(q2) > 1.0 - eps {
            continue;
        }
        mu1 = (mu1 + i as f64 * p_i) / q1;
        let mu2 = (mu - q1 * mu1) / q2;
        let sigma = q1 * q2 * (mu1 - mu2) * (mu1 - mu2);
        if sigma > max_sigma {
            max_sigma = sigma;
            best = i as u8;
        }
    }
    best
}

/// 255 where `v <= threshold`, 0 elsewhere.
pub fn binarize_inverted(data: &[u8], threshold: u8) -> Vec<u8> {
    data.iter()
        .map(|&v| if v > threshold { 0 } else { 255 })
        .collect()
}

pub(super) fn segment(lab: &LabImage, geometry: Geometry) -> Segmented {
    let threshold = otsu_threshold(&lab.b);
    let mask = binarize_inverted(&lab.b, threshold);
    let contours = find_external_contours(&mask, lab.width, lab.height);

    let ceiling = geometry.max_threshold_area();
    let mut area = 0.0;
    for contour in &contours {
        if area >= ceiling {
            break;
        }
        area += contour.area();
    }

    let mut lines = Vec::new();
    if area < ceiling {
        for contour in &contours {
            let Some(fitted) = fit_line(&contour.points) else {
                continue;
            };
            let (p1, p2) = fitted.extend(EXTEND);
            if let Some((a, b)) = clip_line(contour.bounding_rect(), p1, p2) {
                lines.push(DetectedLine::new(a.x, a.y, b.x, b.y));
            }
        }
    } else {
        trace!(area, ceiling, "contour area over ceiling, frame ignored");
    }

    Segmented {
        lines,
        contours,
        threshold: Some(threshold),
    }
}
