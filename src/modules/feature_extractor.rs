use ndarray::Array1;
use tracing::debug;
use crate::helper::landmark_helper::{
    distance, ratio, HAND_POINTS, LEFT_EYE_INNER, LEFT_EYE_OUTER, MOUTH_BOTTOM, MOUTH_LEFT,
    MOUTH_RIGHT, MOUTH_TOP, RIGHT_EYE_INNER, RIGHT_EYE_OUTER,
};
use crate::modules::vocabulary::Modality;
use crate::utils::coordinate::LandmarkSet;

/// Fixed-length numeric encoding of one landmark set.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    pub modality: Modality,
    pub values: Array1<f32>,
}

impl FeatureVector {
    pub fn new(modality: Modality, values: Vec<f32>) -> Self {
        FeatureVector {
            modality,
            values: Array1::from(values),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn has_expected_arity(&self) -> bool {
        self.values.len() == self.modality.feature_arity()
    }

    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureExtractor {
    modality: Modality,
}

impl FeatureExtractor {
    pub fn new(modality: Modality) -> Self {
        FeatureExtractor { modality }
    }

    pub fn modality(&self) -> Modality {
        self.modality
    }

    /// extract converts a landmark set into the modality's feature vector.
    ///
    /// Returns `None` when the set is missing, has the wrong number of
    /// points, carries non-finite coordinates, or the result does not have
    /// the modality's arity. Never panics.
    ///
    /// # Arguments
    /// * `landmarks` - Option<&LandmarkSet>
    ///
    /// # Returns
    /// * `Option<FeatureVector>`
    pub fn extract(&self, landmarks: Option<&LandmarkSet>) -> Option<FeatureVector> {
        let landmarks = landmarks?;
        if !landmarks.all_finite() {
            debug!(modality = %self.modality, "landmark set has non-finite coordinates");
            return None
        }

        let values = match self.modality {
            Modality::Gesture => hand_features(landmarks)?,
            Modality::Expression => face_features(landmarks)?,
        };

        let features = FeatureVector::new(self.modality, values);
        if !features.has_expected_arity() || !features.is_finite() {
            debug!(modality = %self.modality, len = features.len(), "unexpected feature vector");
            return None
        }
        Some(features)
    }

    /// extract_first extracts from the first set whose detection score, when
    /// reported, reaches `min_score`.
    pub fn extract_first(&self, sets: &[LandmarkSet], min_score: f32) -> Option<FeatureVector> {
        let chosen = sets
            .iter()
            .find(|set| set.score.map_or(true, |score| score >= min_score));
        self.extract(chosen)
    }
}

fn hand_features(landmarks: &LandmarkSet) -> Option<Vec<f32>> {
    if landmarks.len() != HAND_POINTS {
        debug!(points = landmarks.len(), "hand landmark set has wrong point count");
        return None
    }
    Some(landmarks.points.iter().flat_map(|p| [p.x, p.y]).collect())
}

fn face_features(landmarks: &LandmarkSet) -> Option<Vec<f32>> {
    if landmarks.len() < Modality::Expression.landmark_count() {
        debug!(points = landmarks.len(), "face mesh is too small");
        return None
    }
    let at = |idx: usize| landmarks.get(idx);

    let mouth_width = distance(at(MOUTH_LEFT)?, at(MOUTH_RIGHT)?);
    let mouth_height = distance(at(MOUTH_TOP)?, at(MOUTH_BOTTOM)?);
    let mouth_ratio = ratio(mouth_height, mouth_width);

    let left_eye = distance(at(LEFT_EYE_OUTER)?, at(LEFT_EYE_INNER)?);
    let right_eye = distance(at(RIGHT_EYE_OUTER)?, at(RIGHT_EYE_INNER)?);
    let eye_ratio = (left_eye + right_eye) / 2.0;

    Some(vec![mouth_ratio, eye_ratio])
}
