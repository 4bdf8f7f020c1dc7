use video_ingest::Frame;

use crate::{
    color::LabImage,
    segment::{Contour, Point},
};

pub(crate) const CONTOUR_BGR: [u8; 3] = [0, 255, 0];

/// Overwrite the rows covered by `lab` with its lightness as grey.
pub(crate) fn paint_lightness(frame: &mut Frame, lab: &LabImage) {
    let rows = lab.height.min(frame.height);
    let width = lab.width.min(frame.width);
    for y in 0..rows {
        for x in 0..width {
            let l = lab.l[(y * lab.width + x) as usize];
            frame.set_pixel(x, y, [l, l, l]);
        }
    }
}

/// Draw each contour as a closed one-pixel polyline.
pub(crate) fn draw_contours(frame: &mut Frame, contours: &[Contour], bgr: [u8; 3]) {
    for contour in contours {
        let points = &contour.points;
        match points.len() {
            0 => {}
            1 => frame.set_pixel(points[0].x, points[0].y, bgr),
            n => {
                for i in 0..n {
                    draw_line(frame, points[i], points[(i + 1) % n], bgr);
                }
            }
        }
    }
}

/// Bresenham line; pixels outside the frame are skipped.
pub(crate) fn draw_line(frame: &mut Frame, from: Point, to: Point, bgr: [u8; 3]) {
    let dx = (to.x - from.x).abs();
    let dy = -(to.y - from.y).abs();
    let sx = if from.x < to.x { 1 } else { -1 };
    let sy = if from.y < to.y { 1 } else { -1 };
    let mut err = dx + dy;
    let (mut x, mut y) = (from.x, from.y);
    loop {
        frame.set_pixel(x, y, bgr);
        if x == to.x && y == to.y {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}
