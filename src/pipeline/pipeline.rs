use std::fmt;

use anyhow::Error;
use image::RgbImage;
use tracing::{debug, info, warn};
use crate::config::config::PipelineConfig;
use crate::modules::classifier::Classifier;
use crate::modules::feature_extractor::FeatureExtractor;
use crate::modules::model_store::ModelStore;
use crate::modules::vocabulary::{Modality, RecognitionResult};
use crate::utils::coordinate::LandmarkSet;

/// LandmarkProvider wraps the external detector that turns a frame into zero
/// or more landmark sets (hands, or face meshes).
pub trait LandmarkProvider {
    fn process(&mut self, frame: &RgbImage) -> Result<Vec<LandmarkSet>, Error>;

    fn close(&mut self) -> Result<(), Error>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    Closed { modality: Modality },
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Closed { modality } => write!(f, "{} recognition session is closed", modality),
        }
    }
}

impl std::error::Error for SessionError {}

/// RecognitionSession runs provider, extractor and classifier for one modality.
pub struct RecognitionSession<P: LandmarkProvider> {
    modality: Modality,
    provider: Option<P>,
    extractor: FeatureExtractor,
    classifier: Classifier,
    min_detection_confidence: f32,
}

impl<P: LandmarkProvider> RecognitionSession<P> {

    /// open builds a session, loading the modality's model from the configured
    /// path. A missing or broken model selects the heuristic classifier.
    ///
    /// # Arguments
    /// * `modality` - Modality
    /// * `provider` - the landmark detector for this modality
    /// * `config` - &PipelineConfig
    ///
    /// # Returns
    /// * `RecognitionSession<P>`
    pub fn open(modality: Modality, provider: P, config: &PipelineConfig) -> Self {
        let (model_path, min_detection_confidence) = match modality {
            Modality::Gesture => (Some(config.gesture.model_path.as_path()), config.gesture.min_detection_confidence),
            Modality::Expression => (config.expression.model_path.as_deref(), config.expression.min_detection_confidence),
        };
        let loaded = ModelStore::load(model_path, modality);
        let classifier = Classifier::from_loaded(modality, loaded);
        info!(%modality, statistical = classifier.is_statistical(), "opened recognition session");
        Self::with_classifier(provider, classifier, min_detection_confidence)
    }

    /// with_classifier builds a session around an already chosen classifier.
    pub fn with_classifier(provider: P, classifier: Classifier, min_detection_confidence: f32) -> Self {
        RecognitionSession {
            modality: classifier.modality(),
            provider: Some(provider),
            extractor: FeatureExtractor::new(classifier.modality()),
            classifier,
            min_detection_confidence,
        }
    }

    pub fn modality(&self) -> Modality {
        self.modality
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn is_closed(&self) -> bool {
        self.provider.is_none()
    }

    /// recognize labels one frame.
    ///
    /// No detection yields the modality's no-target label, a detection that
    /// cannot be turned into features yields `Unknown` and a provider failure
    /// yields `Error`, all with zero confidence.
    ///
    /// # Arguments
    /// * `frame` - &RgbImage
    ///
    /// # Returns
    /// * `Result<RecognitionResult, SessionError>`, `Err` only after `close`
    pub fn recognize(&mut self, frame: &RgbImage) -> Result<RecognitionResult, SessionError> {
        let modality = self.modality;
        let provider = self.provider.as_mut().ok_or(SessionError::Closed { modality })?;

        let sets = match provider.process(frame) {
            Ok(sets) => sets,
            Err(e) => {
                warn!(%modality, error = %format!("{:#}", e), "landmark provider failed");
                return Ok(RecognitionResult::error(modality))
            }
        };

        let min_score = self.min_detection_confidence;
        if !sets.iter().any(|set| set.score.map_or(true, |score| score >= min_score)) {
            return Ok(RecognitionResult::no_target(modality))
        }

        match self.extractor.extract_first(&sets, min_score) {
            Some(features) => Ok(self.classifier.classify(&features)),
            None => Ok(RecognitionResult::unknown(modality)),
        }
    }

    /// close releases the provider. Closing twice is harmless.
    pub fn close(&mut self) -> Result<(), Error> {
        match self.provider.take() {
            Some(mut provider) => {
                info!(modality = %self.modality, "closing recognition session");
                provider.close()
            }
            None => {
                debug!(modality = %self.modality, "recognition session already closed");
                Ok(())
            }
        }
    }
}

impl<P: LandmarkProvider> Drop for RecognitionSession<P> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(modality = %self.modality, error = %e, "landmark provider failed to close");
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use anyhow::{anyhow, Error};
    use image::RgbImage;
    use crate::pipeline::pipeline::LandmarkProvider;
    use crate::utils::coordinate::LandmarkSet;

    /// ScriptedProvider replays the same detections for every frame.
    #[derive(Clone)]
    pub struct ScriptedProvider {
        pub detections: Option<Vec<LandmarkSet>>,
        pub closes: Arc<AtomicUsize>,
    }

    impl ScriptedProvider {
        pub fn returning(sets: Vec<LandmarkSet>) -> Self {
            ScriptedProvider { detections: Some(sets), closes: Arc::new(AtomicUsize::new(0)) }
        }

        pub fn failing() -> Self {
            ScriptedProvider { detections: None, closes: Arc::new(AtomicUsize::new(0)) }
        }

        pub fn close_count(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }
    }

    impl LandmarkProvider for ScriptedProvider {
        fn process(&mut self, _frame: &RgbImage) -> Result<Vec<LandmarkSet>, Error> {
            self.detections.clone().ok_or_else(|| anyhow!("detector crashed"))
        }

        fn close(&mut self) -> Result<(), Error> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use image::RgbImage;
    use crate::config::config::PipelineConfig;
    use crate::helper::landmark_helper::fixtures::{face, hand};
    use crate::modules::classifier::Classifier;
    use crate::modules::forest::fixtures::trained_gesture_model;
    use crate::modules::model_store::ModelStore;
    use crate::modules::vocabulary::{Expression, Gesture, Label, Modality};
    use crate::pipeline::pipeline::fixtures::ScriptedProvider;
    use crate::pipeline::pipeline::*;
    use crate::utils::coordinate::LandmarkSet;

    fn frame() -> RgbImage {
        RgbImage::new(64, 48)
    }

    fn heuristic(modality: Modality, provider: ScriptedProvider) -> RecognitionSession<ScriptedProvider> {
        RecognitionSession::with_classifier(provider, Classifier::heuristic(modality), 0.5)
    }

    #[test]
    fn test_no_target() {
        let mut gestures = heuristic(Modality::Gesture, ScriptedProvider::returning(vec![]));
        let result = gestures.recognize(&frame()).unwrap();
        assert_eq!(result.label, Label::Gesture(Gesture::NoHand));
        assert_eq!(result.confidence, 0.0);

        let mut faces = heuristic(Modality::Expression, ScriptedProvider::returning(vec![]));
        let result = faces.recognize(&frame()).unwrap();
        assert_eq!(result.label, Label::Expression(Expression::Unknown));
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_low_score_detection_counts_as_no_target() {
        let weak = LandmarkSet::with_score(hand([true; 5]).points, 0.2);
        let mut session = heuristic(Modality::Gesture, ScriptedProvider::returning(vec![weak]));
        assert_eq!(session.recognize(&frame()).unwrap().label, Label::Gesture(Gesture::NoHand));
    }

    #[test]
    fn test_unusable_detection_is_unknown() {
        let partial = LandmarkSet::new(hand([true; 5]).points[..10].to_vec());
        let mut session = heuristic(Modality::Gesture, ScriptedProvider::returning(vec![partial]));
        let result = session.recognize(&frame()).unwrap();
        assert_eq!(result.label, Label::Gesture(Gesture::Unknown));
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_provider_failure_is_error() {
        let mut session = heuristic(Modality::Expression, ScriptedProvider::failing());
        let result = session.recognize(&frame()).unwrap();
        assert_eq!(result.label, Label::Expression(Expression::Error));
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_heuristic_labels() {
        let mut faces = heuristic(Modality::Expression, ScriptedProvider::returning(vec![face(0.04, 0.30)]));
        let result = faces.recognize(&frame()).unwrap();
        assert_eq!(result.label, Label::Expression(Expression::Happy));
        assert_eq!(result.confidence, 0.85);

        let mut hands = heuristic(Modality::Gesture, ScriptedProvider::returning(vec![hand([true; 5])]));
        let result = hands.recognize(&frame()).unwrap();
        assert_eq!(result.label, Label::Gesture(Gesture::Hello));
        assert_eq!(result.confidence, 0.60);
    }

    #[test]
    fn test_close_is_idempotent() {
        let provider = ScriptedProvider::returning(vec![]);
        let mut session = heuristic(Modality::Gesture, provider.clone());
        assert!(session.close().is_ok());
        assert!(session.close().is_ok());
        assert!(session.is_closed());
        assert_eq!(provider.close_count(), 1);

        let err = session.recognize(&frame()).unwrap_err();
        assert_eq!(err, SessionError::Closed { modality: Modality::Gesture });
        assert_eq!(err.to_string(), "gesture recognition session is closed");

        drop(session);
        assert_eq!(provider.close_count(), 1);
    }

    #[test]
    fn test_drop_closes_provider() {
        let provider = ScriptedProvider::returning(vec![]);
        drop(heuristic(Modality::Expression, provider.clone()));
        assert_eq!(provider.close_count(), 1);
    }

    #[test]
    fn test_open_without_model_uses_heuristic() {
        let mut config = PipelineConfig::default();
        config.gesture.model_path = PathBuf::from("/nonexistent/gesture_model.json");
        let session = RecognitionSession::open(Modality::Gesture, ScriptedProvider::returning(vec![]), &config);
        assert!(!session.classifier().is_statistical());

        let session = RecognitionSession::open(Modality::Expression, ScriptedProvider::returning(vec![]), &config);
        assert!(!session.classifier().is_statistical());
        assert_eq!(session.modality(), Modality::Expression);
    }

    #[test]
    fn test_open_with_trained_model() {
        let path = std::env::temp_dir().join(format!("session_model_{}.json", std::process::id()));
        ModelStore::save(&path, &trained_gesture_model()).unwrap();

        let mut config = PipelineConfig::default();
        config.gesture.model_path = path.clone();
        let mut session = RecognitionSession::open(Modality::Gesture, ScriptedProvider::returning(vec![hand([true; 5])]), &config);
        assert!(session.classifier().is_statistical());

        let result = session.recognize(&frame()).unwrap();
        assert_eq!(result.label, Label::Gesture(Gesture::Stop));
        assert!((result.confidence - 2.0 / 3.0).abs() < 1e-5);

        std::fs::remove_file(&path).unwrap();
    }
}
