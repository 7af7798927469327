pub mod config;
pub mod helper;
pub mod modules;
pub mod pipeline;
pub mod utils;

pub use config::config::PipelineConfig;
pub use modules::classifier::Classifier;
pub use modules::event::{Event, StoredEvent};
pub use modules::event_store::EventStore;
pub use modules::vocabulary::{Expression, Gesture, Label, Modality, RecognitionResult};
pub use pipeline::frame_loop::{FrameReport, FrameSource, LoopControl, RecognitionLoop};
pub use pipeline::pipeline::{LandmarkProvider, RecognitionSession, SessionError};
