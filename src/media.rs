//! Host media source seam.
//!
//! Decoding and seeking belong to the host. The core only reads the source's state, asks it for
//! the current frame and reacts to its notifications.

use std::collections::VecDeque;

use crate::{
    error::{BackdropError, BackdropResult},
    foundation::core::{Canvas, FrameRgba},
};

/// How much media data is available, ordered like the HTML media element's ready states.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReadyState {
    #[default]
    HaveNothing,
    HaveMetadata,
    HaveCurrentData,
    HaveFutureData,
    HaveEnoughData,
}

impl ReadyState {
    /// A frame for the current position can be read.
    pub fn has_current_frame(self) -> bool {
        self >= Self::HaveCurrentData
    }
}

/// Notifications emitted by a media source.
#[derive(Clone, Debug, PartialEq)]
pub enum MediaEvent {
    MetadataLoaded,
    CanPlay,
    CanPlayThrough,
    Seeked,
    TimeUpdate,
    Play,
    Pause,
    Ended,
    Error(String),
}

pub trait MediaSource {
    fn natural_size(&self) -> Canvas;

    /// Seconds; `0.0` until metadata is known.
    fn duration(&self) -> f64;

    /// Current playback position in seconds.
    fn position(&self) -> f64;

    fn paused(&self) -> bool;

    fn ended(&self) -> bool;

    fn ready_state(&self) -> ReadyState;

    /// Decoded frame at the current position.
    fn current_frame(&mut self) -> BackdropResult<FrameRgba>;

    fn play(&mut self) -> BackdropResult<()>;

    fn pause(&mut self);

    fn seek(&mut self, position: f64);

    /// Next queued notification, if the source queues them.
    fn poll_event(&mut self) -> Option<MediaEvent> {
        None
    }
}

/// In-memory source over decoded frames at a constant rate. Time advances only through
/// [`SequenceSource::advance`], so playback is deterministic.
#[derive(Clone, Debug)]
pub struct SequenceSource {
    frames: Vec<FrameRgba>,
    fps: f64,
    position: f64,
    paused: bool,
    ended: bool,
    ready: ReadyState,
    events: VecDeque<MediaEvent>,
}

impl SequenceSource {
    /// Builds a loaded source. The metadata and can-play notifications are queued.
    pub fn new(frames: Vec<FrameRgba>, fps: f64) -> BackdropResult<Self> {
        if frames.is_empty() {
            return Err(BackdropError::source("sequence has no frames"));
        }
        if !fps.is_finite() || fps <= 0.0 {
            return Err(BackdropError::validation("sequence fps must be > 0"));
        }
        Ok(Self {
            frames,
            fps,
            position: 0.0,
            paused: true,
            ended: false,
            ready: ReadyState::HaveEnoughData,
            events: VecDeque::from([
                MediaEvent::MetadataLoaded,
                MediaEvent::CanPlay,
                MediaEvent::CanPlayThrough,
            ]),
        })
    }

    /// Overrides the reported ready state, e.g. to model buffering.
    pub fn set_ready_state(&mut self, ready: ReadyState) {
        self.ready = ready;
    }

    /// Moves the playhead forward by `secs` if playing.
    pub fn advance(&mut self, secs: f64) {
        if self.paused || self.ended {
            return;
        }
        self.position += secs.max(0.0);
        self.events.push_back(MediaEvent::TimeUpdate);
        if self.position >= self.duration() {
            self.position = self.duration();
            self.ended = true;
            self.paused = true;
            self.events.push_back(MediaEvent::Pause);
            self.events.push_back(MediaEvent::Ended);
        }
    }

    fn frame_index(&self) -> usize {
        let idx = (self.position * self.fps).floor().max(0.0) as usize;
        idx.min(self.frames.len() - 1)
    }
}

impl MediaSource for SequenceSource {
    fn natural_size(&self) -> Canvas {
        self.frames[self.frame_index()].size()
    }

    fn duration(&self) -> f64 {
        self.frames.len() as f64 / self.fps
    }

    fn position(&self) -> f64 {
        self.position
    }

    fn paused(&self) -> bool {
        self.paused
    }

    fn ended(&self) -> bool {
        self.ended
    }

    fn ready_state(&self) -> ReadyState {
        self.ready
    }

    fn current_frame(&mut self) -> BackdropResult<FrameRgba> {
        if !self.ready.has_current_frame() {
            return Err(BackdropError::source("no frame decoded at current position"));
        }
        Ok(self.frames[self.frame_index()].clone())
    }

    fn play(&mut self) -> BackdropResult<()> {
        if self.ended {
            self.position = 0.0;
            self.ended = false;
        }
        if self.paused {
            self.paused = false;
            self.events.push_back(MediaEvent::Play);
        }
        Ok(())
    }

    fn pause(&mut self) {
        if !self.paused {
            self.paused = true;
            self.events.push_back(MediaEvent::Pause);
        }
    }

    fn seek(&mut self, position: f64) {
        let position = if position.is_finite() { position } else { 0.0 };
        self.position = position.clamp(0.0, self.duration());
        self.ended = false;
        self.events.push_back(MediaEvent::Seeked);
        self.events.push_back(MediaEvent::TimeUpdate);
    }

    fn poll_event(&mut self) -> Option<MediaEvent> {
        self.events.pop_front()
    }
}
