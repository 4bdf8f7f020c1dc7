//! External contour extraction for binary masks.
//!
//! Foreground regions are 8-connected. Each region contributes the outer
//! border only (holes are ignored), traced with Suzuki-Abe border following
//! and compressed so straight horizontal, vertical and diagonal runs keep just
//! their endpoints.

use std::collections::VecDeque;

use super::geometry::{Point, Rect, bounding_rect, contour_area};

/// Closed outer border of one foreground region.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Contour {
    pub points: Vec<Point>,
}

impl Contour {
    pub fn area(&self) -> f64 {
        contour_area(&self.points)
    }

    pub fn bounding_rect(&self) -> Rect {
        bounding_rect(&self.points)
    }
}

/// Neighbour offsets, counter-clockwise on screen starting east.
const DIRS: [(i32, i32); 8] = [
    (1, 0),
    (1, -1),
    (0, -1),
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

fn direction_between(from: Point, to: Point) -> usize {
    let delta = (to.x - from.x, to.y - from.y);
    DIRS.iter().position(|&d| d == delta).unwrap_or(0)
}

/// Find the outer border of every foreground region in `mask`.
///
/// `mask` is row-major, `width * height` bytes, non-zero meaning foreground.
/// Contours are returned in raster order of each region's top-left pixel.
pub fn find_external_contours(mask: &[u8], width: i32, height: i32) -> Vec<Contour> {
    if width <= 0 || height <= 0 {
        return Vec::new();
    }
    debug_assert_eq!(mask.len(), width as usize * height as usize);

    let w = width as usize;
    let mut labels = vec![0u32; mask.len()];
    let mut contours = Vec::new();
    let mut next_label = 0u32;
    let mut queue = VecDeque::new();

    for start in 0..mask.len() {
        if mask[start] == 0 || labels[start] != 0 {
            continue;
        }
        next_label += 1;
        labels[start] = next_label;
        queue.push_back(start);
        while let Some(idx) = queue.pop_front() {
            let (x, y) = ((idx % w) as i32, (idx / w) as i32);
            for (dx, dy) in DIRS {
                let (nx, ny) = (x + dx, y + dy);
                if nx < 0 || ny < 0 || nx >= width || ny >= height {
                    continue;
                }
                let n = ny as usize * w + nx as usize;
                if mask[n] != 0 && labels[n] == 0 {
                    labels[n] = next_label;
                    queue.push_back(n);
                }
            }
        }

        let origin = Point::new((start % w) as i32, (start / w) as i32);
        let border = trace_border(&labels, width, height, next_label, origin);
        contours.push(Contour {
            points: compress_chain(border),
        });
    }

    contours
}

/// Follow the outer border of region `label`, starting at its first raster pixel.
fn trace_border(labels: &[u32], width: i32, height: i32, label: u32, origin: Point) -> Vec<Point> {
    let inside = |p: Point| {
        p.x >= 0
            && p.y >= 0
            && p.x < width
            && p.y < height
            && labels[p.y as usize * width as usize + p.x as usize] == label
    };
    let step = |p: Point, dir: usize| Point::new(p.x + DIRS[dir].0, p.y + DIRS[dir].1);

    // Clockwise search from the west neighbour, which is background for the
    // first raster pixel of a region.
    let west = 4;
    let first = (0..8)
        .map(|k| (west + 8 - k) % 8)
        .map(|dir| step(origin, dir))
        .find(|&p| inside(p));
    let Some(first) = first else {
        return vec![origin];
    };

    let mut border = Vec::new();
    let mut prev = first;
    let mut current = origin;
    loop {
        let back = direction_between(current, prev);
        let next = (1..=8)
            .map(|k| step(current, (back + k) % 8))
            .find(|&p| inside(p))
            .unwrap_or(prev);
        border.push(current);
        if next == origin && current == first {
            break;
        }
        prev = current;
        current = next;
    }
    border
}

/// Drop points in the middle of straight runs.
fn compress_chain(border: Vec<Point>) -> Vec<Point> {
    let n = border.len();
    if n < 3 {
        return border;
    }
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let prev = border[(i + n - 1) % n];
        let here = border[i];
        let next = border[(i + 1) % n];
        let incoming = (here.x - prev.x, here.y - prev.y);
        let outgoing = (next.x - here.x, next.y - here.y);
        if incoming != outgoing {
            out.push(here);
        }
    }
    if out.is_empty() {
        out.push(border[0]);
    }
    out
}
