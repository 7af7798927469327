use std::fmt;
use serde::{Deserialize, Serialize};
use crate::utils::utils::{now_iso8601, parse_timestamp};

pub const MIN_LIST_LIMIT: i64 = 1;
pub const MAX_LIST_LIMIT: i64 = 1000;
pub const DEFAULT_LIST_LIMIT: i64 = 100;

/// A recognized gesture/expression pair the application decided to keep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub gesture: String,
    pub expression: String,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl Event {
    pub fn new(gesture: &str, expression: &str, confidence: f32) -> Self {
        Event {
            gesture: gesture.to_string(),
            expression: expression.to_string(),
            confidence,
            timestamp: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: &str) -> Self {
        self.timestamp = Some(timestamp.to_string());
        self
    }

    /// validate enforces the event invariants shared with the HTTP boundary.
    pub fn validate(&self) -> Result<(), EventError> {
        if self.gesture.trim().is_empty() {
            return Err(EventError::EmptyGesture)
        }
        if self.expression.trim().is_empty() {
            return Err(EventError::EmptyExpression)
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(EventError::ConfidenceOutOfRange(self.confidence))
        }
        if let Some(ts) = &self.timestamp {
            if parse_timestamp(ts).is_none() {
                return Err(EventError::InvalidTimestamp(ts.clone()))
            }
        }
        Ok(())
    }

    /// stamped returns the event with a current UTC timestamp if it had none.
    pub fn stamped(mut self) -> Self {
        if self.timestamp.is_none() {
            self.timestamp = Some(now_iso8601());
        }
        self
    }
}

/// An event as it comes back from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub id: String,
    pub gesture: String,
    pub expression: String,
    pub confidence: f32,
    pub timestamp: String,
}

impl StoredEvent {
    pub fn from_event(id: String, event: Event) -> Self {
        StoredEvent {
            id,
            gesture: event.gesture,
            expression: event.expression,
            confidence: event.confidence,
            timestamp: event.timestamp.unwrap_or_else(now_iso8601),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventError {
    EmptyGesture,
    EmptyExpression,
    ConfidenceOutOfRange(f32),
    InvalidTimestamp(String),
}

impl fmt::Display for EventError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventError::EmptyGesture => write!(f, "gesture must not be empty"),
            EventError::EmptyExpression => write!(f, "expression must not be empty"),
            EventError::ConfidenceOutOfRange(c) => write!(f, "confidence {} is outside [0, 1]", c),
            EventError::InvalidTimestamp(ts) => write!(f, "timestamp {:?} is not ISO-8601", ts),
        }
    }
}

impl std::error::Error for EventError {}

/// clamp_limit brings a caller-supplied page size into [1, 1000].
pub fn clamp_limit(limit: i64) -> usize {
    limit.clamp(MIN_LIST_LIMIT, MAX_LIST_LIMIT) as usize
}

pub fn clamp_offset(offset: i64) -> usize {
    offset.max(0) as usize
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub service: String,
    pub store: String,
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    use crate::modules::event::*;

    #[test]
    fn test_validate() {
        assert!(Event::new("Hello", "Happy", 0.92).validate().is_ok());
        assert_eq!(Event::new("  ", "Happy", 0.5).validate(), Err(EventError::EmptyGesture));
        assert_eq!(Event::new("Hello", "", 0.5).validate(), Err(EventError::EmptyExpression));
        assert_eq!(Event::new("Hello", "Happy", 1.5).validate(), Err(EventError::ConfidenceOutOfRange(1.5)));
        assert!(Event::new("Hello", "Happy", f32::NAN).validate().is_err());
        assert!(Event::new("Hello", "Happy", 0.5).with_timestamp("noon").validate().is_err());
        assert!(Event::new("Hello", "Happy", 0.5)
            .with_timestamp("2024-05-01T10:22:31.123456+00:00")
            .validate()
            .is_ok());
        assert!(Event::new("Hello", "Happy", 0.5).with_timestamp("2024-05-01T10:22:31.123456").validate().is_ok());
        assert!(Event::new("Hello", "Happy", 0.5).with_timestamp("2024-05-01").validate().is_ok());
    }

    #[test]
    fn test_stamped_keeps_existing_timestamp() {
        let ts = "2024-05-01T10:22:31+00:00";
        assert_eq!(Event::new("Yes", "Neutral", 0.7).with_timestamp(ts).stamped().timestamp.as_deref(), Some(ts));
        assert!(Event::new("Yes", "Neutral", 0.7).stamped().timestamp.is_some());
    }

    #[test]
    fn test_clamps() {
        assert_eq!(clamp_limit(0), 1);
        assert_eq!(clamp_limit(-3), 1);
        assert_eq!(clamp_limit(5000), 1000);
        assert_eq!(clamp_limit(25), 25);
        assert_eq!(clamp_offset(-10), 0);
        assert_eq!(clamp_offset(7), 7);
    }

    #[test]
    fn test_event_json_without_timestamp() {
        let event: Event = serde_json::from_str(r#"{"gesture":"Hello","expression":"Happy","confidence":0.92}"#).unwrap();
        assert_eq!(event.timestamp, None);
        assert_eq!(event, Event::new("Hello", "Happy", 0.92));
    }
}
