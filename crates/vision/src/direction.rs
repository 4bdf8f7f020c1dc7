//! Steering advice derived from the longest detected lines.

use std::fmt;

use crate::segment::{DetectedLine, Geometry, Point};

/// What the vision thread recommends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Direction {
    /// A long line crosses the image centre: the guide bends away.
    Turn,
    /// A long line stays on one side of the centre.
    GoStraight,
    /// Nothing usable in view.
    #[default]
    GoBack,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Turn => "turn",
            Direction::GoStraight => "straight",
            Direction::GoBack => "back",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Endpoints of the line that produced the decision, ordered by image row.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Guide {
    /// Endpoint nearer the top of the image.
    pub lo: Point,
    pub hi: Point,
}

impl Guide {
    pub fn from_line(line: &DetectedLine) -> Self {
        if line.y1 < line.y2 {
            Self {
                lo: Point::new(line.x1, line.y1),
                hi: Point::new(line.x2, line.y2),
            }
        } else {
            Self {
                lo: Point::new(line.x2, line.y2),
                hi: Point::new(line.x1, line.y1),
            }
        }
    }
}

/// Longest first; equal lengths keep their detection order.
pub fn sort_by_length(lines: &mut [DetectedLine]) {
    lines.sort_by(|a, b| b.length_squared().cmp(&a.length_squared()));
}

/// Classify a single line against the frame centre.
///
/// Returns `None` when the line ends too close to the top of the frame to
/// say anything.
pub fn classify(guide: &Guide, geometry: Geometry) -> Option<Direction> {
    if guide.hi.y <= geometry.height / 20 {
        return None;
    }
    let mid = geometry.width / 2;
    let (lo, hi) = (guide.lo.x, guide.hi.x);
    let crosses = (lo < mid && mid < hi) || (hi < mid && mid < lo);
    Some(if crosses {
        Direction::Turn
    } else {
        Direction::GoStraight
    })
}

/// Outcome of scanning one frame's lines.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Decision {
    pub direction: Direction,
    /// Last line examined, if any qualified.
    pub guide: Option<Guide>,
}

/// Pick a direction from `lines`, which must already be sorted longest first.
///
/// Only lines strictly longer than a third of the frame height are looked at.
/// The first `Turn` ends the scan.
pub fn decide(lines: &[DetectedLine], geometry: Geometry) -> Decision {
    let min = geometry.min_line_length() as i64;
    let mut decision = Decision::default();
    for line in lines {
        if decision.direction == Direction::Turn || line.length_squared() <= min * min {
            break;
        }
        let guide = Guide::from_line(line);
        decision.guide = Some(guide);
        if let Some(direction) = classify(&guide, geometry) {
            decision.direction = direction;
        }
    }
    decision
}

#[cfg(test)]
mod tests {
    use super::*;

    const GEOMETRY: Geometry = Geometry::new(160, 120);

    #[test]
    fn no_lines_means_go_back() {
        let decision = decide(&[], GEOMETRY);
        assert_eq!(decision.direction, Direction::GoBack);
        assert_eq!(decision.guide, None);
    }

    #[test]
    fn short_lines_are_ignored() {
        // min length is 40, so 40 exactly does not qualify
        let lines = [DetectedLine::new(10, 10, 10, 50)];
        assert_eq!(decide(&lines, GEOMETRY).direction, Direction::GoBack);
    }

    #[test]
    fn line_crossing_centre_turns() {
        let lines = [DetectedLine::new(120, 58, 40, 2)];
        let decision = decide(&lines, GEOMETRY);
        assert_eq!(decision.direction, Direction::Turn);
        let guide = decision.guide.unwrap();
        assert_eq!(guide.lo, Point::new(40, 2));
        assert_eq!(guide.hi, Point::new(120, 58));
    }

    #[test]
    fn line_on_one_side_goes_straight() {
        let lines = [DetectedLine::new(100, 2, 130, 58)];
        assert_eq!(decide(&lines, GEOMETRY).direction, Direction::GoStraight);
    }

    #[test]
    fn line_ending_near_top_is_unclassified() {
        // hi.y must exceed height / 20 = 6
        let guide = Guide::from_line(&DetectedLine::new(0, 0, 150, 6));
        assert_eq!(classify(&guide, GEOMETRY), None);
        let decision = decide(&[DetectedLine::new(0, 0, 150, 6)], GEOMETRY);
        assert_eq!(decision.direction, Direction::GoBack);
        assert!(decision.guide.is_some());
    }

    #[test]
    fn endpoint_on_centre_is_not_a_crossing() {
        let guide = Guide::from_line(&DetectedLine::new(80, 10, 130, 60));
        assert_eq!(classify(&guide, GEOMETRY), Some(Direction::GoStraight));
    }

    #[test]
    fn first_turn_stops_the_scan() {
        let mut lines = vec![
            DetectedLine::new(100, 2, 130, 58),
            DetectedLine::new(40, 2, 120, 100),
            DetectedLine::new(10, 10, 20, 110),
        ];
        sort_by_length(&mut lines);
        assert_eq!(lines[0], DetectedLine::new(40, 2, 120, 100));
        let decision = decide(&lines, GEOMETRY);
        assert_eq!(decision.direction, Direction::Turn);
        assert_eq!(decision.guide.unwrap().lo, Point::new(40, 2));
    }

    #[test]
    fn later_lines_override_straight() {
        let lines = [
            DetectedLine::new(100, 2, 130, 90),
            DetectedLine::new(10, 10, 20, 80),
        ];
        let decision = decide(&lines, GEOMETRY);
        assert_eq!(decision.direction, Direction::GoStraight);
        assert_eq!(decision.guide.unwrap().lo, Point::new(10, 10));
    }

    #[test]
    fn sort_is_stable_for_equal_lengths() {
        let mut lines = vec![
            DetectedLine::new(0, 0, 3, 4),
            DetectedLine::new(0, 0, 0, 9),
            DetectedLine::new(0, 0, 4, 3),
        ];
        sort_by_length(&mut lines);
        assert_eq!(
            lines,
            vec![
                DetectedLine::new(0, 0, 0, 9),
                DetectedLine::new(0, 0, 3, 4),
                DetectedLine::new(0, 0, 4, 3),
            ]
        );
    }
}
