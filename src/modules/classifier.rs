use tracing::{debug, warn};
use crate::helper::landmark_helper::HandPose;
use crate::modules::feature_extractor::FeatureVector;
use crate::modules::forest::ClassifierModel;
use crate::modules::model_store::LoadedModel;
use crate::modules::vocabulary::{Expression, Gesture, Label, Modality, RecognitionResult};
use crate::utils::coordinate::Landmark;

/// Maps feature vectors of one modality to a label and a confidence.
#[derive(Debug, Clone)]
pub enum Classifier {
    /// Trained random forest behind a fitted scaler.
    Statistical {
        modality: Modality,
        model: ClassifierModel,
        labels: Vec<Label>,
    },
    /// Fixed decision tree over derived ratios, used when no trained model exists.
    Heuristic { modality: Modality },
}

impl Classifier {
    pub fn heuristic(modality: Modality) -> Self {
        Classifier::Heuristic { modality }
    }

    /// statistical wraps a model without checking that it was trained. A
    /// placeholder model classifies every frame as the modality's error label.
    pub fn statistical(modality: Modality, model: ClassifierModel) -> Self {
        let labels = model.labels().unwrap_or_default();
        Classifier::Statistical { modality, model, labels }
    }

    /// from_loaded picks the strategy once, from what the model store found:
    /// only a trained artifact is trusted, anything else uses the heuristic.
    pub fn from_loaded(modality: Modality, loaded: LoadedModel) -> Self {
        if loaded.is_trained() && loaded.model.modality == modality {
            debug!(%modality, "using statistical classifier");
            Self::statistical(modality, loaded.model)
        } else {
            debug!(%modality, "no trained model, using heuristic classifier");
            Self::heuristic(modality)
        }
    }

    pub fn modality(&self) -> Modality {
        match self {
            Classifier::Statistical { modality, .. } => *modality,
            Classifier::Heuristic { modality } => *modality,
        }
    }

    pub fn is_statistical(&self) -> bool {
        matches!(self, Classifier::Statistical { .. })
    }

    /// classify never fails: malformed input or a model failure is reported
    /// as the modality's `Error` label with zero confidence.
    ///
    /// # Arguments
    /// * `features` - &FeatureVector
    ///
    /// # Returns
    /// * `RecognitionResult`
    pub fn classify(&self, features: &FeatureVector) -> RecognitionResult {
        let modality = self.modality();
        if features.modality != modality || !features.has_expected_arity() {
            warn!(%modality, len = features.len(), "feature vector does not match classifier");
            return RecognitionResult::error(modality)
        }
        if !features.is_finite() {
            warn!(%modality, "feature vector has non-finite values");
            return RecognitionResult::error(modality)
        }

        match self {
            Classifier::Statistical { model, labels, .. } => classify_statistical(modality, model, labels, features),
            Classifier::Heuristic { .. } => match modality {
                Modality::Gesture => classify_gesture_heuristic(features),
                Modality::Expression => classify_expression(features.values[0], features.values[1]),
            },
        }
    }
}

fn classify_statistical(
    modality: Modality,
    model: &ClassifierModel,
    labels: &[Label],
    features: &FeatureVector,
) -> RecognitionResult {
    let proba = match model.predict_proba(&features.values) {
        Ok(proba) => proba,
        Err(e) => {
            warn!(%modality, error = %e, "statistical classifier failed");
            return RecognitionResult::error(modality)
        }
    };

    let best = proba
        .iter()
        .enumerate()
        .filter(|(_, p)| p.is_finite())
        .fold(None, |best: Option<(usize, f32)>, (idx, p)| match best {
            Some((_, bp)) if bp >= *p => best,
            _ => Some((idx, *p)),
        });

    match best.and_then(|(idx, p)| labels.get(idx).map(|label| (*label, p))) {
        Some((label, p)) => RecognitionResult::new(label, p),
        None => {
            warn!(%modality, "model produced no usable class");
            RecognitionResult::error(modality)
        }
    }
}

/// classify_expression applies the fixed expression threshold table to the
/// mouth ratio `m` and the eye ratio `e`.
pub fn classify_expression(m: f32, e: f32) -> RecognitionResult {
    let (expression, confidence) = if m > 0.15 {
        (Expression::Happy, 0.85)
    } else if m > 0.08 && e < 0.25 {
        (Expression::Angry, 0.80)
    } else if m < 0.05 && e < 0.20 {
        (Expression::Sad, 0.75)
    } else {
        (Expression::Neutral, 0.90)
    };
    RecognitionResult::new(Label::Expression(expression), confidence)
}

fn classify_gesture_heuristic(features: &FeatureVector) -> RecognitionResult {
    let points: Vec<Landmark> = features
        .values
        .as_slice()
        .map(|values| values.chunks_exact(2).map(|xy| Landmark::new(xy[0], xy[1])).collect())
        .unwrap_or_default();

    match HandPose::from_points(&points) {
        Some(pose) => classify_hand_pose(&pose),
        None => RecognitionResult::error(Modality::Gesture),
    }
}

/// classify_hand_pose is the gesture fallback tree over the extended-finger
/// share and thumb extension.
pub fn classify_hand_pose(pose: &HandPose) -> RecognitionResult {
    let share = pose.extended_share();
    let (gesture, confidence) = if share >= 1.0 {
        if pose.thumb_extended {
            (Gesture::Hello, 0.60)
        } else {
            (Gesture::Stop, 0.55)
        }
    } else if share <= 0.0 {
        if pose.thumb_extended {
            (Gesture::Yes, 0.60)
        } else {
            (Gesture::No, 0.50)
        }
    } else if pose.index_only() {
        (Gesture::Help, 0.50)
    } else {
        (Gesture::Neutral, 0.40)
    };
    RecognitionResult::new(Label::Gesture(gesture), confidence)
}
