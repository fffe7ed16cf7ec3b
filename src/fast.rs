//! Segment-test corner detection.
//!
//! A pixel is a corner when a long enough contiguous arc of the 16 pixels on a
//! radius 3 Bresenham circle around it is entirely brighter or entirely darker
//! than the pixel itself by more than a threshold.

use image::GrayImage;
use log::*;

/// Offsets of the circle, clockwise starting straight up.
pub const CIRCLE: [(i32, i32); 16] = [
    (0, -3),
    (1, -3),
    (2, -2),
    (3, -1),
    (3, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 3),
    (-1, 3),
    (-2, 2),
    (-3, 1),
    (-3, 0),
    (-3, -1),
    (-2, -2),
    (-1, -3),
];

/// Radius of [`CIRCLE`]; no corner can be closer than this to the image edge.
pub const CIRCLE_RADIUS: u32 = 3;

/// A corner found in a single pyramid layer, in layer coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Corner {
    pub x: u32,
    pub y: u32,
    /// Corner strength, always at least 1.
    pub score: u32,
}

/// Whether `mask` (16 circle bits) holds a circular run of at least `len` set bits.
fn has_arc(mask: u32, len: usize) -> bool {
    let doubled = mask | (mask << 16);
    let mut acc = doubled;
    for shift in 1..len {
        acc &= doubled >> shift;
    }
    acc != 0
}

/// Score a single pixel, returning `None` if it is not a corner.
///
/// The score is the larger of the summed excess contrast of the brighter and of
/// the darker circle pixels (Rosten & Drummond, eq. 8). The caller guarantees the
/// whole circle lies inside the image.
pub fn corner_score(
    image: &GrayImage,
    x: u32,
    y: u32,
    threshold: u8,
    arc_length: usize,
) -> Option<u32> {
    let width = image.width() as i32;
    let data = image.as_raw();
    let (x, y) = (x as i32, y as i32);
    let p = i32::from(data[(y * width + x) as usize]);
    let t = i32::from(threshold);
    let mut brighter = 0u32;
    let mut darker = 0u32;
    let mut brighter_sum = 0u32;
    let mut darker_sum = 0u32;
    for (bit, &(dx, dy)) in CIRCLE.iter().enumerate() {
        let d = i32::from(data[((y + dy) * width + x + dx) as usize]) - p;
        if d > t {
            brighter |= 1 << bit;
            brighter_sum += (d - t) as u32;
        } else if d < -t {
            darker |= 1 << bit;
            darker_sum += (-d - t) as u32;
        }
    }
    if has_arc(brighter, arc_length) || has_arc(darker, arc_length) {
        Some(brighter_sum.max(darker_sum))
    } else {
        None
    }
}

/// Every corner at least `border` pixels away from the image edges, in scan order.
///
/// Also returns a dense score map (0 where there is no corner) for suppression.
pub fn detect(
    image: &GrayImage,
    threshold: u8,
    arc_length: usize,
    border: u32,
) -> (Vec<Corner>, Vec<u32>) {
    let (width, height) = image.dimensions();
    let border = border.max(CIRCLE_RADIUS);
    let mut scores = vec![0u32; width as usize * height as usize];
    let mut corners = vec![];
    if width <= border.saturating_mul(2) || height <= border.saturating_mul(2) {
        return (corners, scores);
    }
    for y in border..height - border {
        for x in border..width - border {
            if let Some(score) = corner_score(image, x, y, threshold, arc_length) {
                scores[(y * width + x) as usize] = score;
                corners.push(Corner { x, y, score });
            }
        }
    }
    trace!("{} raw corners in {}x{} layer.", corners.len(), width, height);
    (corners, scores)
}

/// Keep only corners that are the strongest within a `window x window` square.
///
/// Equal scores are resolved in favour of the corner that comes first in scan
/// order. A window of 0 or 1 keeps everything.
pub fn non_maximum_suppression(
    corners: Vec<Corner>,
    scores: &[u32],
    width: u32,
    height: u32,
    window: usize,
) -> Vec<Corner> {
    if window <= 1 {
        return corners;
    }
    let radius = u32::try_from(window / 2).unwrap_or(u32::MAX);
    let before = corners.len();
    let kept: Vec<Corner> = corners
        .into_iter()
        .filter(|corner| {
            let own = corner.y * width + corner.x;
            let ys =
                corner.y.saturating_sub(radius)..=corner.y.saturating_add(radius).min(height - 1);
            ys.flat_map(|ny| {
                let xs =
                    corner.x.saturating_sub(radius)..=corner.x.saturating_add(radius).min(width - 1);
                xs.map(move |nx| ny * width + nx)
            })
            .filter(|&pos| pos != own)
            .all(|pos| {
                let other = scores[pos as usize];
                other < corner.score || (other == corner.score && pos > own)
            })
        })
        .collect();
    trace!("{}/{} corners survive suppression.", kept.len(), before);
    kept
}
