use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Error;
use image::imageops::flip_horizontal;
use image::RgbImage;
use tracing::{info, warn};
use crate::config::config::PipelineConfig;
use crate::modules::event::Event;
use crate::modules::vocabulary::{Label, Modality, RecognitionResult};
use crate::pipeline::pipeline::{LandmarkProvider, RecognitionSession, SessionError};

const FPS_SMOOTHING: f32 = 0.7;

/// FrameSource yields frames until it runs dry (`Ok(None)`).
pub trait FrameSource {
    fn read(&mut self) -> Result<Option<RgbImage>, Error>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoopControl {
    Continue,
    Stop,
}

/// Everything recognized in one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    pub gesture: RecognitionResult,
    pub expression: RecognitionResult,
    pub fps: f32,
}

impl FrameReport {
    /// to_event builds the event to record for this frame, if the gesture is
    /// a real class. The event carries the gesture's confidence.
    pub fn to_event(&self) -> Option<Event> {
        match self.gesture.label {
            Label::Gesture(gesture) if !gesture.is_sentinel() => Some(Event::new(
                gesture.as_str(),
                self.expression.label.as_str(),
                self.gesture.confidence,
            )),
            _ => None,
        }
    }
}

/// RecognitionLoop drives both sessions over a stream of frames.
pub struct RecognitionLoop<G: LandmarkProvider, E: LandmarkProvider> {
    gesture: RecognitionSession<G>,
    expression: RecognitionSession<E>,
    running: Arc<AtomicBool>,
    mirror: bool,
    fps: f32,
    last_frame: Option<Instant>,
}

impl<G: LandmarkProvider, E: LandmarkProvider> RecognitionLoop<G, E> {
    pub fn new(gesture: RecognitionSession<G>, expression: RecognitionSession<E>) -> Self {
        RecognitionLoop {
            gesture,
            expression,
            running: Arc::new(AtomicBool::new(true)),
            mirror: true,
            fps: 0.0,
            last_frame: None,
        }
    }

    /// open loads both sessions from `config`.
    pub fn open(gesture_provider: G, expression_provider: E, config: &PipelineConfig) -> Self {
        RecognitionLoop::new(
            RecognitionSession::open(Modality::Gesture, gesture_provider, config),
            RecognitionSession::open(Modality::Expression, expression_provider, config),
        )
    }

    /// with_mirror controls whether frames are flipped horizontally before
    /// recognition, as a selfie camera preview would be.
    pub fn with_mirror(mut self, mirror: bool) -> Self {
        self.mirror = mirror;
        self
    }

    /// running_flag is shared with whoever needs to stop the loop; clearing it
    /// ends `run` before the next frame.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn fps(&self) -> f32 {
        self.fps
    }

    fn tick(&mut self) -> f32 {
        let now = Instant::now();
        let instant = match self.last_frame {
            Some(prev) => {
                let elapsed = now.duration_since(prev).as_secs_f32();
                if elapsed > 0.0 { 1.0 / elapsed } else { 0.0 }
            }
            None => 0.0,
        };
        self.last_frame = Some(now);
        self.fps = FPS_SMOOTHING * instant + (1.0 - FPS_SMOOTHING) * self.fps;
        self.fps
    }

    /// step recognizes gesture and expression in one frame.
    ///
    /// # Arguments
    /// * `frame` - &RgbImage
    ///
    /// # Returns
    /// * `Result<FrameReport, SessionError>`
    pub fn step(&mut self, frame: &RgbImage) -> Result<FrameReport, SessionError> {
        let mirrored;
        let frame = if self.mirror {
            mirrored = flip_horizontal(frame);
            &mirrored
        } else {
            frame
        };

        let gesture = self.gesture.recognize(frame)?;
        let expression = self.expression.recognize(frame)?;
        let fps = self.tick();
        Ok(FrameReport { gesture, expression, fps })
    }

    /// run processes frames until the source is exhausted, the running flag is
    /// cleared, or `callback` asks to stop. A flag cleared before `run` starts
    /// means no frame is read. Both sessions are closed afterwards, so a loop
    /// runs at most once.
    ///
    /// # Returns
    /// * the number of frames processed
    pub fn run<S, F>(&mut self, source: &mut S, mut callback: F) -> Result<usize, Error>
    where
        S: FrameSource,
        F: FnMut(&FrameReport) -> LoopControl,
    {
        let outcome = self.drive(source, &mut callback);
        self.running.store(false, Ordering::SeqCst);
        self.close()?;
        let frames = outcome?;
        info!(frames, "recognition loop finished");
        Ok(frames)
    }

    fn drive<S, F>(&mut self, source: &mut S, callback: &mut F) -> Result<usize, Error>
    where
        S: FrameSource,
        F: FnMut(&FrameReport) -> LoopControl,
    {
        let mut frames = 0;
        while self.running.load(Ordering::SeqCst) {
            let frame = match source.read()? {
                Some(frame) => frame,
                None => {
                    info!("frame source exhausted");
                    break
                }
            };
            let report = self.step(&frame)?;
            frames += 1;
            if callback(&report) == LoopControl::Stop {
                break
            }
        }
        Ok(frames)
    }

    /// close closes both sessions, reporting the first provider failure.
    pub fn close(&mut self) -> Result<(), Error> {
        let gesture = self.gesture.close();
        let expression = self.expression.close();
        if let Err(e) = &expression {
            warn!(error = %e, "expression provider failed to close");
        }
        gesture.and(expression)
    }
}
