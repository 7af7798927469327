use serde::{Deserialize, Serialize};

/// A single normalized keypoint. `x` and `y` are in image-relative units
/// (0..1 for points inside the frame), `z` is only set by providers that
/// estimate depth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f32>,
}

impl Landmark {
    pub fn new(x: f32, y: f32) -> Self {
        Landmark { x, y, z: None }
    }

    pub fn with_depth(x: f32, y: f32, z: f32) -> Self {
        Landmark { x, y, z: Some(z) }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.map_or(true, f32::is_finite)
    }
}

/// One tracked entity (a hand or a face) as returned by a landmark provider
/// for a single frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LandmarkSet {
    pub points: Vec<Landmark>,
    /// Detection score reported by the provider, when it has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl LandmarkSet {
    pub fn new(points: Vec<Landmark>) -> Self {
        LandmarkSet { points, score: None }
    }

    pub fn with_score(points: Vec<Landmark>, score: f32) -> Self {
        LandmarkSet { points, score: Some(score) }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Landmark> {
        self.points.get(idx)
    }

    pub fn all_finite(&self) -> bool {
        self.points.iter().all(Landmark::is_finite)
    }
}

#[cfg(test)]
mod tests {
    use crate::utils::coordinate::{Landmark, LandmarkSet};

    #[test]
    fn test_landmark_set_from_json() {
        let raw = r#"{"points":[{"x":0.25,"y":0.5},{"x":0.75,"y":0.5,"z":-0.1}],"score":0.93}"#;
        let set: LandmarkSet = serde_json::from_str(raw).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.points[0].z, None);
        assert_eq!(set.points[1].z, Some(-0.1));
        assert_eq!(set.score, Some(0.93));
        assert!(set.all_finite());
    }

    #[test]
    fn test_non_finite_landmark() {
        let set = LandmarkSet::new(vec![Landmark::new(0.1, 0.2), Landmark::with_depth(0.3, 0.4, f32::NAN)]);
        assert!(!set.all_finite());
        assert!(!Landmark::new(f32::INFINITY, 0.0).is_finite());
    }
}
