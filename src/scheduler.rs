//! Per-refresh frame loop.
//!
//! Each tick gets its state handed in through [`TickContext`]; filter settings are read from the
//! shared [`ConfigHandle`] when they are needed, so changes apply on the next tick.

use std::time::{Duration, Instant};

use crate::{
    composite_cpu::{CompositeOptions, composite},
    config::ConfigHandle,
    error::BackdropResult,
    foundation::core::{FrameRgba, SegmentationMask},
    fx::filtered_background,
    media::MediaSource,
    segment::{Completion, SegmentationClient, Submission},
    surface::{DrawKind, RenderSurface},
};

/// Length of the wall-clock window used for frames-per-second reporting.
pub const FPS_WINDOW: Duration = Duration::from_millis(1000);

/// Throughput counter over fixed wall-clock windows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    frames_this_window: u32,
    window_start: Option<Instant>,
    current_fps: u32,
}

impl FrameStats {
    pub fn current_fps(&self) -> u32 {
        self.current_fps
    }

    pub fn frames_this_window(&self) -> u32 {
        self.frames_this_window
    }

    /// Counts one frame. Returns the published rate when a window closes.
    pub fn record_frame(&mut self, now: Instant) -> Option<u32> {
        let start = *self.window_start.get_or_insert(now);
        self.frames_this_window += 1;
        if now.saturating_duration_since(start) < FPS_WINDOW {
            return None;
        }
        self.current_fps = self.frames_this_window;
        self.frames_this_window = 0;
        self.window_start = Some(now);
        Some(self.current_fps)
    }

    /// Starts a fresh window on the next frame, keeping the last published rate.
    pub fn restart_window(&mut self) {
        self.frames_this_window = 0;
        self.window_start = None;
    }
}

/// State borrowed by one tick.
pub struct TickContext<'a> {
    pub source: &'a mut dyn MediaSource,
    pub surface: &'a mut RenderSurface,
    pub client: &'a mut SegmentationClient,
    /// Current playback epoch; requests are tagged with it.
    pub epoch: u64,
    pub now: Instant,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Source paused, ended or still buffering; nothing drawn.
    Skipped,
    /// Filter inactive (or submission failed): raw frame drawn.
    DrewRaw,
    /// Frame handed to the segmenter.
    Submitted,
    /// A request is outstanding; the last composite stays on screen.
    Busy,
    /// The source could not produce a frame.
    SourceError,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompletionOutcome {
    Composited,
    /// Segmentation or compositing failed; the submitted frame was drawn unfiltered.
    FellBackRaw,
    /// Playback moved on since submission; nothing drawn.
    Discarded,
    /// The surface has no size yet, so the result could not be drawn.
    NotDrawn,
}

pub struct FrameScheduler {
    config: ConfigHandle,
    stats: FrameStats,
}

impl FrameScheduler {
    pub fn new(config: ConfigHandle) -> Self {
        Self {
            config,
            stats: FrameStats::default(),
        }
    }

    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut FrameStats {
        &mut self.stats
    }

    /// Runs one scheduling step. Never fails: per-tick errors are logged and contained.
    #[tracing::instrument(level = "trace", skip_all, fields(epoch = ctx.epoch))]
    pub fn tick(&mut self, ctx: TickContext<'_>) -> TickOutcome {
        let TickContext {
            source,
            surface,
            client,
            epoch,
            now,
        } = ctx;

        if source.paused() || source.ended() || !source.ready_state().has_current_frame() {
            return TickOutcome::Skipped;
        }

        let natural = source.natural_size();
        if !natural.is_empty() {
            surface.resize_to(natural);
        }

        let position = source.position();
        let active = self.config.snapshot().active_at(position);

        let outcome = if !active {
            draw_current_raw(source, surface, position)
        } else if client.is_pending() {
            TickOutcome::Busy
        } else {
            match source.current_frame() {
                Ok(frame) => match client.submit(frame, epoch, position) {
                    Ok(Submission::Started(_)) => TickOutcome::Submitted,
                    Ok(Submission::Busy) => TickOutcome::Busy,
                    Err(e) => {
                        tracing::warn!(error = %e, position, "segmentation submit failed, drawing unfiltered");
                        draw_current_raw(source, surface, position)
                    }
                },
                Err(e) => {
                    tracing::warn!(error = %e, position, "failed to read frame");
                    TickOutcome::SourceError
                }
            }
        };

        if let Some(fps) = self.stats.record_frame(now) {
            tracing::debug!(fps, "frame rate window closed");
        }
        outcome
    }

    /// Applies a finished segmentation request to the surface, unless it is stale.
    pub fn handle_completion(
        &mut self,
        completion: Completion,
        surface: &mut RenderSurface,
        client: &mut SegmentationClient,
        epoch: u64,
        playing: bool,
    ) -> CompletionOutcome {
        let Completion {
            ticket,
            frame,
            result,
        } = completion;

        if ticket.epoch != epoch || !playing {
            client.note_discarded();
            tracing::debug!(
                seq = ticket.seq,
                ticket_epoch = ticket.epoch,
                epoch,
                playing,
                "discarding stale segmentation result"
            );
            return CompletionOutcome::Discarded;
        }

        let composed = result.and_then(|mask| self.compose(&frame, &mask));
        match composed {
            Ok(out) => match surface.draw(&out, DrawKind::Composite, ticket.position) {
                Ok(true) => CompletionOutcome::Composited,
                Ok(false) => CompletionOutcome::NotDrawn,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to draw composite");
                    CompletionOutcome::FellBackRaw
                }
            },
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    transient = e.is_transient(),
                    seq = ticket.seq,
                    position = ticket.position,
                    "segmentation failed, drawing frame unfiltered"
                );
                match surface.draw(&frame, DrawKind::Raw, ticket.position) {
                    Ok(true) => CompletionOutcome::FellBackRaw,
                    Ok(false) => CompletionOutcome::NotDrawn,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to draw fallback frame");
                        CompletionOutcome::FellBackRaw
                    }
                }
            }
        }
    }

    fn compose(&self, frame: &FrameRgba, mask: &SegmentationMask) -> BackdropResult<FrameRgba> {
        let kind = self.config.snapshot().kind;
        let background = filtered_background(frame, kind)?;
        composite(frame, &background, mask, CompositeOptions::default())
    }
}

fn draw_current_raw(
    source: &mut dyn MediaSource,
    surface: &mut RenderSurface,
    position: f64,
) -> TickOutcome {
    let frame = match source.current_frame() {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(error = %e, position, "failed to read frame");
            return TickOutcome::SourceError;
        }
    };
    if let Err(e) = surface.draw(&frame, DrawKind::Raw, position) {
        tracing::warn!(error = %e, "failed to draw frame");
    }
    TickOutcome::DrewRaw
}
