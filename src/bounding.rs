use crate::keypoint::KeyPoint;
use crate::matching::Match;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

/// An axis-aligned rectangle in pixel coordinates, both corners inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rectangle {
    pub min: Point,
    pub max: Point,
}

impl Rectangle {
    pub fn width(&self) -> u32 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> u32 {
        self.max.y - self.min.y
    }

    pub fn contains(&self, point: Point) -> bool {
        (self.min.x..=self.max.x).contains(&point.x) && (self.min.y..=self.max.y).contains(&point.y)
    }
}

/// The smallest rectangle containing the query keypoint of every match.
///
/// Returns `None` when there are no matches, since no rectangle can be formed
/// from zero points.
pub fn bounding_box(matches: &[Match], query_keypoints: &[KeyPoint]) -> Option<Rectangle> {
    let mut points = matches.iter().map(|m| {
        let kp = &query_keypoints[m.query];
        Point { x: kp.x, y: kp.y }
    });
    let first = points.next()?;
    Some(points.fold(
        Rectangle {
            min: first,
            max: first,
        },
        |rect, p| Rectangle {
            min: Point {
                x: rect.min.x.min(p.x),
                y: rect.min.y.min(p.y),
            },
            max: Point {
                x: rect.max.x.max(p.x),
                y: rect.max.y.max(p.y),
            },
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keypoint(x: u32, y: u32) -> KeyPoint {
        KeyPoint {
            x,
            y,
            angle: 0.0,
            layer: 0,
            response: 1,
        }
    }

    fn matched(query: usize) -> Match {
        Match {
            reference: 0,
            query,
            distance: 0,
        }
    }

    #[test]
    fn covers_all_matched_points() {
        let keypoints = [keypoint(10, 10), keypoint(50, 5), keypoint(30, 40)];
        let matches = [matched(0), matched(1), matched(2)];
        let rect = bounding_box(&matches, &keypoints).unwrap();
        assert_eq!(rect.min, Point { x: 10, y: 5 });
        assert_eq!(rect.max, Point { x: 50, y: 40 });
        assert_eq!((rect.width(), rect.height()), (40, 35));
    }

    #[test]
    fn ignores_unmatched_keypoints() {
        let keypoints = [keypoint(0, 0), keypoint(20, 30), keypoint(99, 99)];
        let rect = bounding_box(&[matched(1)], &keypoints).unwrap();
        assert_eq!(rect.min, rect.max);
        assert!(rect.contains(Point { x: 20, y: 30 }));
        assert!(!rect.contains(Point { x: 0, y: 0 }));
    }

    #[test]
    fn no_matches_no_rectangle() {
        assert_eq!(bounding_box(&[], &[keypoint(1, 2)]), None);
    }
}
