use std::time::Instant;

use crate::{
    config::ConfigHandle,
    error::{BackdropError, BackdropResult},
    media::{MediaEvent, MediaSource},
    scheduler::{CompletionOutcome, FrameScheduler, TickContext, TickOutcome},
    segment::{SegmentationClient, SegmentationStats, Segmenter},
    surface::{DrawKind, RenderSurface},
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PlaybackState {
    #[default]
    Idle,
    Loading,
    Ready,
    Playing,
    Paused,
    Ended,
    /// The source reported an error; only binding a new source leaves this state.
    Failed,
}

impl PlaybackState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Ended => "ended",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable snapshot of the controller.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlayerStatus {
    pub state: PlaybackState,
    pub position: f64,
    pub duration: f64,
    pub fps: u32,
    pub playing: bool,
    pub loading: bool,
}

impl PlayerStatus {
    /// Formats seconds as `M:SS`. Negative or non-finite input reads as `0:00`.
    pub fn format_time(secs: f64) -> String {
        let total = if secs.is_finite() && secs > 0.0 {
            secs.floor() as u64
        } else {
            0
        };
        format!("{}:{:02}", total / 60, total % 60)
    }
}

/// Creates the segmentation backend for a new playback session.
pub type SegmenterFactory = Box<dyn FnMut() -> BackdropResult<Box<dyn Segmenter>>>;

/// Owns playback state and drives the frame loop from host refresh callbacks.
pub struct PlaybackController<S: MediaSource> {
    config: ConfigHandle,
    factory: SegmenterFactory,
    source: Option<S>,
    surface: RenderSurface,
    scheduler: FrameScheduler,
    client: Option<SegmentationClient>,
    state: PlaybackState,
    /// Bumped whenever in-flight work must no longer reach the surface.
    epoch: u64,
    tick_scheduled: bool,
    preview_pending: bool,
    last_error: Option<String>,
}

impl<S: MediaSource> PlaybackController<S> {
    pub fn new(config: ConfigHandle, factory: SegmenterFactory) -> Self {
        Self {
            scheduler: FrameScheduler::new(config.clone()),
            config,
            factory,
            source: None,
            surface: RenderSurface::new(),
            client: None,
            state: PlaybackState::Idle,
            epoch: 0,
            tick_scheduled: false,
            preview_pending: false,
            last_error: None,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }

    pub fn surface(&self) -> &RenderSurface {
        &self.surface
    }

    pub fn source(&self) -> Option<&S> {
        self.source.as_ref()
    }

    pub fn source_mut(&mut self) -> Option<&mut S> {
        self.source.as_mut()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_tick_scheduled(&self) -> bool {
        self.tick_scheduled
    }

    pub fn segmentation_stats(&self) -> SegmentationStats {
        self.client
            .as_ref()
            .map(SegmentationClient::stats)
            .unwrap_or_default()
    }

    pub fn status(&self) -> PlayerStatus {
        let (position, duration) = self
            .source
            .as_ref()
            .map_or((0.0, 0.0), |s| (s.position(), s.duration()));
        PlayerStatus {
            state: self.state,
            position,
            duration,
            fps: self.scheduler.stats().current_fps(),
            playing: self.state == PlaybackState::Playing,
            loading: self.is_loading(),
        }
    }

    fn is_loading(&self) -> bool {
        matches!(self.state, PlaybackState::Idle | PlaybackState::Loading)
    }

    /// Binds a new source and starts a fresh session.
    pub fn load(&mut self, source: S) -> BackdropResult<()> {
        if let Some(mut old) = self.client.take() {
            old.close();
        }
        self.epoch += 1;
        self.tick_scheduled = false;
        self.preview_pending = false;
        self.last_error = None;
        self.surface.reset();
        self.scheduler = FrameScheduler::new(self.config.clone());
        self.source = Some(source);
        self.transition(PlaybackState::Loading);

        match (self.factory)() {
            Ok(segmenter) => {
                self.client = Some(SegmentationClient::new(segmenter));
                tracing::info!(epoch = self.epoch, "source bound");
                Ok(())
            }
            Err(e) => {
                self.fail(e.to_string());
                Err(e)
            }
        }
    }

    /// Reacts to one source notification.
    pub fn handle_event(&mut self, event: MediaEvent) {
        tracing::trace!(?event, state = %self.state, "media event");
        match event {
            MediaEvent::MetadataLoaded => {
                if self.state != PlaybackState::Loading {
                    return;
                }
                self.transition(PlaybackState::Ready);
                let Some(source) = self.source.as_ref() else {
                    return;
                };
                let natural = source.natural_size();
                let ready = source.ready_state().has_current_frame();
                if !natural.is_empty() {
                    self.surface.resize_to(natural);
                }
                if ready {
                    self.draw_preview();
                } else {
                    self.preview_pending = true;
                }
            }
            MediaEvent::CanPlay | MediaEvent::CanPlayThrough => {
                if self.state == PlaybackState::Loading {
                    self.handle_event(MediaEvent::MetadataLoaded);
                } else if self.preview_pending {
                    self.draw_preview();
                }
            }
            MediaEvent::Seeked => {
                self.epoch += 1;
                if matches!(
                    self.state,
                    PlaybackState::Ready | PlaybackState::Paused | PlaybackState::Ended
                ) {
                    self.draw_preview();
                }
            }
            MediaEvent::TimeUpdate => {}
            // Notifications can lag behind commands; act only when the source agrees.
            MediaEvent::Play => {
                let source_playing = self.source.as_ref().is_some_and(|s| !s.paused());
                if source_playing
                    && matches!(
                        self.state,
                        PlaybackState::Ready | PlaybackState::Paused | PlaybackState::Ended
                    )
                {
                    self.enter_playing();
                }
            }
            MediaEvent::Pause => {
                let source_paused = self.source.as_ref().is_none_or(|s| s.paused());
                if source_paused && self.state == PlaybackState::Playing {
                    self.stop_loop(PlaybackState::Paused);
                }
            }
            MediaEvent::Ended => {
                let source_ended = self.source.as_ref().is_none_or(|s| s.ended());
                if source_ended
                    && matches!(self.state, PlaybackState::Playing | PlaybackState::Paused)
                {
                    self.stop_loop(PlaybackState::Ended);
                }
            }
            MediaEvent::Error(msg) => self.fail(msg),
        }
    }

    /// Starts or resumes playback. Restarts from the beginning after the end.
    pub fn play(&mut self) -> BackdropResult<()> {
        match self.state {
            PlaybackState::Playing => return Ok(()),
            PlaybackState::Ready | PlaybackState::Paused | PlaybackState::Ended => {}
            other => {
                return Err(BackdropError::validation(format!(
                    "cannot play while {other}"
                )));
            }
        }
        let restart = self.state == PlaybackState::Ended;
        let source = self
            .source
            .as_mut()
            .ok_or_else(|| BackdropError::source("no source bound"))?;
        if restart {
            source.seek(0.0);
        }
        source.play()?;
        self.enter_playing();
        Ok(())
    }

    pub fn pause(&mut self) {
        if self.state != PlaybackState::Playing {
            return;
        }
        if let Some(source) = self.source.as_mut() {
            source.pause();
        }
        self.stop_loop(PlaybackState::Paused);
    }

    /// Click/tap behaviour. Ignored while loading.
    pub fn toggle(&mut self) -> BackdropResult<PlaybackState> {
        match self.state {
            PlaybackState::Idle | PlaybackState::Loading | PlaybackState::Failed => {}
            PlaybackState::Playing => self.pause(),
            PlaybackState::Ready | PlaybackState::Paused | PlaybackState::Ended => self.play()?,
        }
        Ok(self.state)
    }

    pub fn seek(&mut self, position: f64) {
        let Some(source) = self.source.as_mut() else {
            return;
        };
        source.seek(position);
        self.epoch += 1;
        tracing::debug!(position, epoch = self.epoch, "seek");
    }

    /// Host display-refresh callback: applies source notifications, delivers a finished
    /// segmentation result, then runs the scheduled tick.
    pub fn on_refresh(&mut self, now: Instant) -> Option<TickOutcome> {
        while let Some(event) = self.source.as_mut().and_then(MediaSource::poll_event) {
            self.handle_event(event);
        }
        let has_metadata = self
            .source
            .as_ref()
            .is_some_and(|s| s.ready_state() >= crate::media::ReadyState::HaveMetadata);
        if self.state == PlaybackState::Loading && has_metadata {
            self.handle_event(MediaEvent::MetadataLoaded);
        }

        if let Some(client) = self.client.as_mut()
            && let Some(done) = client.pump()
        {
            let playing = self.state == PlaybackState::Playing;
            let outcome = self.scheduler.handle_completion(
                done,
                &mut self.surface,
                client,
                self.epoch,
                playing,
            );
            if outcome == CompletionOutcome::Discarded {
                tracing::warn!(epoch = self.epoch, "dropped stale segmentation result");
            }
        }

        if self.state != PlaybackState::Playing || !self.tick_scheduled {
            return None;
        }
        let (Some(source), Some(client)) = (self.source.as_mut(), self.client.as_mut()) else {
            return None;
        };
        Some(self.scheduler.tick(TickContext {
            source,
            surface: &mut self.surface,
            client,
            epoch: self.epoch,
            now,
        }))
    }

    fn enter_playing(&mut self) {
        self.transition(PlaybackState::Playing);
        self.preview_pending = false;
        self.tick_scheduled = true;
        self.scheduler.stats_mut().restart_window();
    }

    fn stop_loop(&mut self, next: PlaybackState) {
        self.tick_scheduled = false;
        self.epoch += 1;
        self.transition(next);
    }

    fn fail(&mut self, msg: String) {
        tracing::warn!(error = %msg, "playback failed");
        self.tick_scheduled = false;
        self.epoch += 1;
        self.last_error = Some(msg);
        self.transition(PlaybackState::Failed);
    }

    fn transition(&mut self, next: PlaybackState) {
        if self.state != next {
            tracing::debug!(from = %self.state, to = %next, epoch = self.epoch, "playback state");
            self.state = next;
        }
    }

    fn draw_preview(&mut self) {
        let Some(source) = self.source.as_mut() else {
            return;
        };
        if !source.ready_state().has_current_frame() {
            self.preview_pending = true;
            return;
        }
        let natural = source.natural_size();
        if !natural.is_empty() {
            self.surface.resize_to(natural);
        }
        let position = source.position();
        match source.current_frame() {
            Ok(frame) => {
                match self.surface.draw(&frame, DrawKind::Preview, position) {
                    Ok(true) => self.preview_pending = false,
                    Ok(false) => self.preview_pending = true,
                    Err(e) => tracing::warn!(error = %e, "failed to draw preview"),
                }
            }
            Err(e) => tracing::warn!(error = %e, position, "failed to read preview frame"),
        }
    }
}
