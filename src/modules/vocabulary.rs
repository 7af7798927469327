use std::fmt;
use serde::{Deserialize, Serialize};
use crate::helper::landmark_helper::{FACE_MESH_POINTS, HAND_POINTS};

/// Feature arity of a hand: (x, y) for each of the 21 landmarks.
pub const GESTURE_FEATURE_ARITY: usize = HAND_POINTS * 2;

/// Feature arity of a face: mouth ratio and eye ratio.
pub const EXPRESSION_FEATURE_ARITY: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Gesture,
    Expression,
}

impl Modality {
    pub fn feature_arity(&self) -> usize {
        match self {
            Modality::Gesture => GESTURE_FEATURE_ARITY,
            Modality::Expression => EXPRESSION_FEATURE_ARITY,
        }
    }

    /// Minimum number of landmarks a set must carry for this modality.
    pub fn landmark_count(&self) -> usize {
        match self {
            Modality::Gesture => HAND_POINTS,
            Modality::Expression => FACE_MESH_POINTS,
        }
    }

    /// Label reported when the provider found nothing to track.
    pub fn no_target(&self) -> Label {
        match self {
            Modality::Gesture => Label::Gesture(Gesture::NoHand),
            Modality::Expression => Label::Expression(Expression::Unknown),
        }
    }

    pub fn unknown(&self) -> Label {
        match self {
            Modality::Gesture => Label::Gesture(Gesture::Unknown),
            Modality::Expression => Label::Expression(Expression::Unknown),
        }
    }

    pub fn error(&self) -> Label {
        match self {
            Modality::Gesture => Label::Gesture(Gesture::Error),
            Modality::Expression => Label::Expression(Expression::Error),
        }
    }

    /// parse_class resolves a trained class name; sentinels are not classes.
    pub fn parse_class(&self, name: &str) -> Option<Label> {
        match self {
            Modality::Gesture => Gesture::CLASSES
                .iter()
                .find(|g| g.as_str() == name)
                .map(|g| Label::Gesture(*g)),
            Modality::Expression => Expression::CLASSES
                .iter()
                .find(|e| e.as_str() == name)
                .map(|e| Label::Expression(*e)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Gesture => "gesture",
            Modality::Expression => "expression",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gesture {
    Hello,
    Help,
    Yes,
    No,
    Stop,
    Neutral,
    NoHand,
    Unknown,
    Error,
}

impl Gesture {
    /// Trainable classes, in the order the reference model was trained with.
    pub const CLASSES: [Gesture; 6] = [
        Gesture::Hello,
        Gesture::Help,
        Gesture::Yes,
        Gesture::No,
        Gesture::Stop,
        Gesture::Neutral,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Gesture::Hello => "Hello",
            Gesture::Help => "Help",
            Gesture::Yes => "Yes",
            Gesture::No => "No",
            Gesture::Stop => "Stop",
            Gesture::Neutral => "Neutral",
            Gesture::NoHand => "No Hand",
            Gesture::Unknown => "Unknown",
            Gesture::Error => "Error",
        }
    }

    pub fn is_sentinel(&self) -> bool {
        matches!(self, Gesture::NoHand | Gesture::Unknown | Gesture::Error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Expression {
    Neutral,
    Happy,
    Sad,
    Angry,
    Unknown,
    Error,
}

impl Expression {
    pub const CLASSES: [Expression; 4] = [
        Expression::Neutral,
        Expression::Happy,
        Expression::Sad,
        Expression::Angry,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Expression::Neutral => "Neutral",
            Expression::Happy => "Happy",
            Expression::Sad => "Sad",
            Expression::Angry => "Angry",
            Expression::Unknown => "Unknown",
            Expression::Error => "Error",
        }
    }

    pub fn is_sentinel(&self) -> bool {
        matches!(self, Expression::Unknown | Expression::Error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Label {
    Gesture(Gesture),
    Expression(Expression),
}

impl Label {
    pub fn modality(&self) -> Modality {
        match self {
            Label::Gesture(_) => Modality::Gesture,
            Label::Expression(_) => Modality::Expression,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Gesture(g) => g.as_str(),
            Label::Expression(e) => e.as_str(),
        }
    }

    pub fn is_sentinel(&self) -> bool {
        match self {
            Label::Gesture(g) => g.is_sentinel(),
            Label::Expression(e) => e.is_sentinel(),
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of classifying one frame for one modality.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecognitionResult {
    pub label: Label,
    pub confidence: f32,
}

impl RecognitionResult {
    /// new clamps the confidence into [0, 1]; a NaN confidence becomes 0.
    pub fn new(label: Label, confidence: f32) -> Self {
        let confidence = if confidence.is_nan() { 0.0 } else { confidence.clamp(0.0, 1.0) };
        RecognitionResult { label, confidence }
    }

    pub fn no_target(modality: Modality) -> Self {
        Self::new(modality.no_target(), 0.0)
    }

    pub fn unknown(modality: Modality) -> Self {
        Self::new(modality.unknown(), 0.0)
    }

    pub fn error(modality: Modality) -> Self {
        Self::new(modality.error(), 0.0)
    }

    pub fn modality(&self) -> Modality {
        self.label.modality()
    }
}
