//! Canny edges on the chroma channels followed by probabilistic Hough segments.

use std::collections::VecDeque;

use rand::{Rng, SeedableRng, rngs::StdRng};

use super::{DetectedLine, Geometry, Segmented};
use crate::color::LabImage;

const CANNY_LOW: i32 = 180;
const CANNY_HIGH: i32 = 200;
const HOUGH_RHO: f64 = 2.0;
const HOUGH_THETA: f64 = 0.02;
const HOUGH_MAX_GAP: i32 = 25;
const HOUGH_SEED: u64 = 0x5eed_1ee5;

const DERIV: [i32; 5] = [-1, -2, 0, 2, 1];
const SMOOTH: [i32; 5] = [1, 4, 6, 4, 1];

/// Canny edge map with a 5x5 Sobel aperture and L1 gradient magnitude.
///
/// Returns `width * height` bytes, 255 on edges.
pub fn canny(src: &[u8], width: i32, height: i32, low: i32, high: i32) -> Vec<u8> {
    let (w, h) = (width.max(0) as usize, height.max(0) as usize);
    if w == 0 || h == 0 {
        return Vec::new();
    }
    let (low, high) = if low > high { (high, low) } else { (low, high) };
    let (dx, dy) = sobel5(src, w, h);
    let mag: Vec<i32> = dx.iter().zip(&dy).map(|(x, y)| x.abs() + y.abs()).collect();
    let mag_at = |x: isize, y: isize| -> i32 {
        if x < 0 || y < 0 || x >= w as isize || y >= h as isize {
            0
        } else {
            mag[y as usize * w + x as usize]
        }
    };

    const SHIFT: i32 = 15;
    let tg22 = (0.414_213_562_373_095_f64 * (1 << SHIFT) as f64 + 0.5) as i64;

    // 0 = suppressed, 1 = weak candidate, 2 = strong
    let mut state = vec![0u8; w * h];
    let mut stack = VecDeque::new();
    for y in 0..h {
        for x in 0..w {
            let idx = y * w + x;
            let m = mag[idx];
            if m <= low {
                continue;
            }
            let (xi, yi) = (x as isize, y as isize);
            let xs = dx[idx] as i64;
            let ys = dy[idx] as i64;
            let ax = xs.abs();
            let ay = ys.abs() << SHIFT;
            let tg22x = ax * tg22;
            let is_max = if ay < tg22x {
                m > mag_at(xi - 1, yi) && m >= mag_at(xi + 1, yi)
            } else {
                let tg67x = tg22x + (ax << (SHIFT + 1));
                if ay > tg67x {
                    m > mag_at(xi, yi - 1) && m >= mag_at(xi, yi + 1)
                } else {
                    let s = if (xs ^ ys) < 0 { -1 } else { 1 };
                    m > mag_at(xi - s, yi - 1) && m > mag_at(xi + s, yi + 1)
                }
            };
            if !is_max {
                continue;
            }
            if m > high {
                state[idx] = 2;
                stack.push_back(idx);
            } else {
                state[idx] = 1;
            }
        }
    }

    while let Some(idx) = stack.pop_front() {
        let (x, y) = ((idx % w) as isize, (idx / w) as isize);
        for ny in y - 1..=y + 1 {
            for nx in x - 1..=x + 1 {
                if nx < 0 || ny < 0 || nx >= w as isize || ny >= h as isize {
                    continue;
                }
                let n = ny as usize * w + nx as usize;
                if state[n] == 1 {
                    state[n] = 2;
                    stack.push_back(n);
                }
            }
        }
    }

    state.into_iter().map(|s| if s == 2 { 255 } else { 0 }).collect()
}

/// Unnormalised 5x5 Sobel derivatives with replicated borders.
fn sobel5(src: &[u8], w: usize, h: usize) -> (Vec<i32>, Vec<i32>) {
    let clamp = |v: isize, len: usize| v.clamp(0, len as isize - 1) as usize;
    let mut row_deriv = vec![0i32; w * h];
    let mut row_smooth = vec![0i32; w * h];
    for y in 0..h {
        let row = &src[y * w..(y + 1) * w];
        for x in 0..w {
            let (mut d, mut s) = (0, 0);
            for k in 0..5 {
                let v = row[clamp(x as isize + k as isize - 2, w)] as i32;
                d += DERIV[k] * v;
                s += SMOOTH[k] * v;
            }
            row_deriv[y * w + x] = d;
            row_smooth[y * w + x] = s;
        }
    }

    let mut dx = vec![0i32; w * h];
    let mut dy = vec![0i32; w * h];
    for y in 0..h {
        for x in 0..w {
            let (mut gx, mut gy) = (0, 0);
            for k in 0..5 {
                let yy = clamp(y as isize + k as isize - 2, h);
                gx += SMOOTH[k] * row_deriv[yy * w + x];
                gy += DERIV[k] * row_smooth[yy * w + x];
            }
            dx[y * w + x] = gx;
            dy[y * w + x] = gy;
        }
    }
    (dx, dy)
}

/// Parameters of the probabilistic Hough transform.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HoughParams {
    pub rho: f64,
    pub theta: f64,
    /// Minimum accumulator votes before a line is followed.
    pub threshold: i32,
    pub min_line_length: i32,
    pub max_line_gap: i32,
    pub max_lines: usize,
    pub seed: u64,
}

impl HoughParams {
    pub fn for_geometry(geometry: Geometry) -> Self {
        Self {
            rho: HOUGH_RHO,
            theta: HOUGH_THETA,
            threshold: geometry.hough_threshold(),
            min_line_length: geometry.min_line_length(),
            max_line_gap: HOUGH_MAX_GAP,
            max_lines: usize::MAX,
            seed: HOUGH_SEED,
        }
    }
}

/// Progressive probabilistic Hough transform over a binary edge map.
///
/// Edge points are visited in random order. Each point votes; once a bin
/// reaches the threshold the corresponding line is walked in both directions
/// across gaps of up to `max_line_gap` pixels, and the pixels it covers are
/// removed from further voting.
pub fn hough_lines_probabilistic(
    edges: &[u8],
    width: i32,
    height: i32,
    params: &HoughParams,
) -> Vec<DetectedLine> {
    const SHIFT: i32 = 16;
    let (w, h) = (width.max(0) as usize, height.max(0) as usize);
    if w == 0 || h == 0 || params.rho <= 0.0 || params.theta <= 0.0 {
        return Vec::new();
    }

    let num_angle = (std::f64::consts::PI / params.theta).round() as usize;
    let num_rho = (((w + h) * 2 + 1) as f64 / params.rho).round() as usize;
    let irho = 1.0 / params.rho;
    let trig: Vec<(f64, f64)> = (0..num_angle)
        .map(|n| {
            let angle = n as f64 * params.theta;
            (angle.cos() * irho, angle.sin() * irho)
        })
        .collect();

    let mut accum = vec![0i32; num_angle * num_rho];
    let mut mask: Vec<bool> = edges.iter().map(|&e| e != 0).collect();
    let mut points: Vec<(i32, i32)> = mask
        .iter()
        .enumerate()
        .filter(|&(_, &on)| on)
        .map(|(idx, _)| ((idx % w) as i32, (idx / w) as i32))
        .collect();

    let rho_offset = (num_rho as i32 - 1) / 2;
    let bin = |n: usize, x: i32, y: i32| -> usize {
        let (c, s) = trig[n];
        let r = (x as f64 * c + y as f64 * s).round() as i32 + rho_offset;
        n * num_rho + r as usize
    };

    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut lines = Vec::new();

    for remaining in (1..=points.len()).rev() {
        let pick = rng.gen_range(0..remaining);
        let (px, py) = points[pick];
        points[pick] = points[remaining - 1];

        if !mask[py as usize * w + px as usize] {
            continue;
        }

        let mut max_val = params.threshold - 1;
        let mut max_n = 0;
        for n in 0..num_angle {
            let slot = bin(n, px, py);
            accum[slot] += 1;
            if max_val < accum[slot] {
                max_val = accum[slot];
                max_n = n;
            }
        }
        if max_val < params.threshold {
            continue;
        }

        // Walk along the line in fixed point: one axis steps by a whole
        // pixel, the other by a 16-bit fraction.
        let a = -trig[max_n].1;
        let b = trig[max_n].0;
        let (x0, y0, dx0, dy0, x_major) = if a.abs() > b.abs() {
            let dx0 = if a > 0.0 { 1 } else { -1 };
            let dy0 = (b * (1i64 << SHIFT) as f64 / a.abs()).round() as i64;
            (px as i64, ((py as i64) << SHIFT) + (1 << (SHIFT - 1)), dx0, dy0, true)
        } else {
            let dy0 = if b > 0.0 { 1 } else { -1 };
            let dx0 = (a * (1i64 << SHIFT) as f64 / b.abs()).round() as i64;
            (((px as i64) << SHIFT) + (1 << (SHIFT - 1)), py as i64, dx0, dy0, false)
        };
        let to_pixel = |x: i64, y: i64| -> (i64, i64) {
            if x_major {
                (x, y >> SHIFT)
            } else {
                (x >> SHIFT, y)
            }
        };
        let in_bounds = |x: i64, y: i64| x >= 0 && y >= 0 && x < w as i64 && y < h as i64;

        let mut ends = [(px as i64, py as i64); 2];
        for (k, end) in ends.iter_mut().enumerate() {
            let (dx, dy) = if k == 0 { (dx0, dy0) } else { (-dx0, -dy0) };
            let (mut x, mut y) = (x0, y0);
            let mut gap = 0;
            loop {
                let (j, i) = to_pixel(x, y);
                if !in_bounds(j, i) {
                    break;
                }
                if mask[i as usize * w + j as usize] {
                    gap = 0;
                    *end = (j, i);
                } else {
                    gap += 1;
                    if gap > params.max_line_gap {
                        break;
                    }
                }
                x += dx;
                y += dy;
            }
        }

        let min_len = params.min_line_length as i64;
        let good = (ends[1].0 - ends[0].0).abs() >= min_len || (ends[1].1 - ends[0].1).abs() >= min_len;

        for (k, end) in ends.iter().enumerate() {
            let (dx, dy) = if k == 0 { (dx0, dy0) } else { (-dx0, -dy0) };
            let (mut x, mut y) = (x0, y0);
            loop {
                let (j, i) = to_pixel(x, y);
                if !in_bounds(j, i) {
                    break;
                }
                let idx = i as usize * w + j as usize;
                if mask[idx] {
                    if good {
                        for n in 0..num_angle {
                            let slot = bin(n, j as i32, i as i32);
                            accum[slot] -= 1;
                        }
                    }
                    mask[idx] = false;
                }
                if (j, i) == *end {
                    break;
                }
                x += dx;
                y += dy;
            }
        }

        if good {
            lines.push(DetectedLine::new(
                ends[0].0 as i32,
                ends[0].1 as i32,
                ends[1].0 as i32,
                ends[1].1 as i32,
            ));
            if lines.len() >= params.max_lines {
                break;
            }
        }
    }

    lines
}

pub(super) fn segment(lab: &LabImage, geometry: Geometry) -> Segmented {
    let params = HoughParams::for_geometry(geometry);
    let mut lines = Vec::new();
    for channel in [&lab.a, &lab.b] {
        let edges = canny(channel, lab.width, lab.height, CANNY_LOW, CANNY_HIGH);
        lines.extend(hough_lines_probabilistic(&edges, lab.width, lab.height, &params));
    }
    Segmented {
        lines,
        contours: Vec::new(),
        threshold: None,
    }
}
