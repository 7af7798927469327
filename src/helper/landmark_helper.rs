use nalgebra::Vector2;
use crate::utils::coordinate::Landmark;

/// Number of points in a hand skeleton.
pub const HAND_POINTS: usize = 21;

/// Minimum number of points in a face mesh (468 without iris refinement).
pub const FACE_MESH_POINTS: usize = 468;

pub const WRIST: usize = 0;
pub const THUMB_CMC: usize = 1;
pub const THUMB_MCP: usize = 2;
pub const THUMB_IP: usize = 3;
pub const THUMB_TIP: usize = 4;
pub const INDEX_MCP: usize = 5;
pub const INDEX_PIP: usize = 6;
pub const INDEX_DIP: usize = 7;
pub const INDEX_TIP: usize = 8;
pub const MIDDLE_MCP: usize = 9;
pub const MIDDLE_PIP: usize = 10;
pub const MIDDLE_DIP: usize = 11;
pub const MIDDLE_TIP: usize = 12;
pub const RING_MCP: usize = 13;
pub const RING_PIP: usize = 14;
pub const RING_DIP: usize = 15;
pub const RING_TIP: usize = 16;
pub const PINKY_MCP: usize = 17;
pub const PINKY_PIP: usize = 18;
pub const PINKY_DIP: usize = 19;
pub const PINKY_TIP: usize = 20;

/// (pip, tip) per finger, thumb excluded, index to pinky.
pub const FINGERS: [(usize, usize); 4] = [
    (INDEX_PIP, INDEX_TIP),
    (MIDDLE_PIP, MIDDLE_TIP),
    (RING_PIP, RING_TIP),
    (PINKY_PIP, PINKY_TIP),
];

// Face mesh indices consulted by the expression features.
pub const MOUTH_LEFT: usize = 61;
pub const MOUTH_RIGHT: usize = 291;
pub const MOUTH_TOP: usize = 13;
pub const MOUTH_BOTTOM: usize = 14;
pub const LEFT_EYE_OUTER: usize = 33;
pub const LEFT_EYE_INNER: usize = 133;
pub const RIGHT_EYE_OUTER: usize = 263;
pub const RIGHT_EYE_INNER: usize = 362;

/// Added to ratio denominators so a degenerate set never divides by zero.
pub const EPSILON: f32 = 1e-5;

/// Finger counts as extended when its tip is this much farther from the wrist than its PIP joint.
pub const FINGER_EXTENSION_RATIO: f32 = 1.15;

/// Thumb counts as extended when its tip is this much farther from the index MCP than its IP joint.
pub const THUMB_EXTENSION_RATIO: f32 = 1.2;

/// distance returns the Euclidean distance between two landmarks in the image plane.
pub fn distance(a: &Landmark, b: &Landmark) -> f32 {
    (Vector2::new(a.x, a.y) - Vector2::new(b.x, b.y)).norm()
}

/// ratio divides two distances, guarding the denominator with `EPSILON`.
pub fn ratio(numerator: f32, denominator: f32) -> f32 {
    numerator / (denominator + EPSILON)
}

/// HandPose summarises a hand skeleton with the two ratios the heuristic
/// gesture tree branches on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandPose {
    /// Which of index, middle, ring and pinky are extended.
    pub fingers: [bool; 4],
    pub thumb_extended: bool,
}

impl HandPose {
    /// from_points reads a pose from a full 21-point skeleton.
    ///
    /// Returns `None` for any other point count.
    pub fn from_points(points: &[Landmark]) -> Option<Self> {
        if points.len() != HAND_POINTS {
            return None
        }

        let wrist = &points[WRIST];
        let mut fingers = [false; 4];
        for (slot, (pip, tip)) in fingers.iter_mut().zip(FINGERS.iter()) {
            let reach = ratio(distance(wrist, &points[*tip]), distance(wrist, &points[*pip]));
            *slot = reach > FINGER_EXTENSION_RATIO;
        }

        let anchor = &points[INDEX_MCP];
        let thumb_reach = ratio(distance(&points[THUMB_TIP], anchor), distance(&points[THUMB_IP], anchor));

        Some(HandPose {
            fingers,
            thumb_extended: thumb_reach > THUMB_EXTENSION_RATIO,
        })
    }

    /// extended_share is the fraction of the four fingers that are extended.
    pub fn extended_share(&self) -> f32 {
        self.fingers.iter().filter(|f| **f).count() as f32 / self.fingers.len() as f32
    }

    pub fn index_only(&self) -> bool {
        self.fingers == [true, false, false, false]
    }
}
