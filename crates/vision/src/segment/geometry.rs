#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle; `x + width - 1` is the last column inside it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// Smallest rectangle containing every point.
pub fn bounding_rect(points: &[Point]) -> Rect {
    let Some(first) = points.first() else {
        return Rect::default();
    };
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in &points[1..] {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    Rect {
        x: min_x,
        y: min_y,
        width: max_x - min_x + 1,
        height: max_y - min_y + 1,
    }
}

/// Unsigned polygon area (shoelace formula).
pub fn contour_area(points: &[Point]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice = 0i64;
    let mut prev = points[points.len() - 1];
    for &p in points {
        twice += prev.x as i64 * p.y as i64 - p.x as i64 * prev.y as i64;
        prev = p;
    }
    (twice as f64 / 2.0).abs()
}

/// Least-squares (L2) line through a point set: unit direction and a point on
/// the line (the centroid).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FittedLine {
    pub vx: f64,
    pub vy: f64,
    pub x0: f64,
    pub y0: f64,
}

impl FittedLine {
    /// Endpoints `distance` away from the centroid in both directions,
    /// truncated to integer pixels.
    pub fn extend(&self, distance: f64) -> (Point, Point) {
        (
            Point::new(
                (-distance * self.vx + self.x0) as i32,
                (-distance * self.vy + self.y0) as i32,
            ),
            Point::new(
                (distance * self.vx + self.x0) as i32,
                (distance * self.vy + self.y0) as i32,
            ),
        )
    }
}

/// Fit a line minimising the sum of squared perpendicular distances.
pub fn fit_line(points: &[Point]) -> Option<FittedLine> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let (mut x, mut y, mut x2, mut y2, mut xy) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for p in points {
        let (px, py) = (p.x as f64, p.y as f64);
        x += px;
        y += py;
        x2 += px * px;
        y2 += py * py;
        xy += px * py;
    }
    x /= n;
    y /= n;
    let dx2 = x2 / n - x * x;
    let dy2 = y2 / n - y * y;
    let dxy = xy / n - x * y;

    let t = (2.0 * dxy).atan2(dx2 - dy2) / 2.0;
    Some(FittedLine {
        vx: t.cos(),
        vy: t.sin(),
        x0: x,
        y0: y,
    })
}

fn outcode(x: i64, y: i64, right: i64, bottom: i64) -> u8 {
    (x < 0) as u8 | ((x > right) as u8) << 1 | ((y < 0) as u8) << 2 | ((y > bottom) as u8) << 3
}

/// Clip the segment `p1`-`p2` to `rect`.
///
/// Returns `None` when the segment lies entirely outside the rectangle.
pub fn clip_line(rect: Rect, p1: Point, p2: Point) -> Option<(Point, Point)> {
    if rect.width <= 0 || rect.height <= 0 {
        return None;
    }
    let right = rect.width as i64 - 1;
    let bottom = rect.height as i64 - 1;
    let (mut x1, mut y1) = ((p1.x - rect.x) as i64, (p1.y - rect.y) as i64);
    let (mut x2, mut y2) = ((p2.x - rect.x) as i64, (p2.y - rect.y) as i64);

    let mut c1 = outcode(x1, y1, right, bottom);
    let mut c2 = outcode(x2, y2, right, bottom);

    if c1 & c2 == 0 && c1 | c2 != 0 {
        if c1 & 12 != 0 {
            let a = if c1 < 8 { 0 } else { bottom };
            x1 += ((a - y1) as f64 * (x2 - x1) as f64 / (y2 - y1) as f64) as i64;
            y1 = a;
            c1 = outcode(x1, 0, right, bottom) & 3;
        }
        if c2 & 12 != 0 {
            let a = if c2 < 8 { 0 } else { bottom };
            x2 += ((a - y2) as f64 * (x2 - x1) as f64 / (y2 - y1) as f64) as i64;
            y2 = a;
            c2 = outcode(x2, 0, right, bottom) & 3;
        }
        if c1 & c2 == 0 && c1 | c2 != 0 {
            if c1 != 0 {
                let a = if c1 == 1 { 0 } else { right };
                y1 += ((a - x1) as f64 * (y2 - y1) as f64 / (x2 - x1) as f64) as i64;
                x1 = a;
                c1 = 0;
            }
            if c2 != 0 {
                let a = if c2 == 1 { 0 } else { right };
                y2 += ((a - x2) as f64 * (y2 - y1) as f64 / (x2 - x1) as f64) as i64;
                x2 = a;
                c2 = 0;
            }
        }
    }

    if c1 | c2 != 0 {
        return None;
    }
    Some((
        Point::new(x1 as i32 + rect.x, y1 as i32 + rect.y),
        Point::new(x2 as i32 + rect.x, y2 as i32 + rect.y),
    ))
}
