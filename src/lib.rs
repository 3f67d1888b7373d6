#![forbid(unsafe_code)]

pub mod blur_cpu;
pub mod composite_cpu;
pub mod config;
pub mod foundation;
pub mod fx;
pub mod media;
pub mod pipeline;
pub mod player;
pub mod scheduler;
pub mod segment;
pub mod surface;
pub mod timeline;

pub use foundation::error;

pub use composite_cpu::{CompositeOptions, composite};
pub use config::{ConfigHandle, FilterConfig};
pub use error::{BackdropError, BackdropResult};
pub use foundation::core::{Canvas, FrameRgba, SegmentationMask};
pub use fx::{FilterKind, filtered_background};
pub use media::{MediaEvent, MediaSource, ReadyState, SequenceSource};
pub use pipeline::{ProcessOptions, process_frame};
pub use player::{PlaybackController, PlaybackState, PlayerStatus, SegmenterFactory};
pub use scheduler::{FrameScheduler, FrameStats, TickContext, TickOutcome};
pub use segment::{
    Completion, SegmentationClient, SegmentationModel, SegmentationStats, Segmenter, Submission,
    ThreadedSegmenter, Ticket,
};
pub use surface::{DrawKind, RenderSurface};
pub use timeline::{TimelineWindow, should_filter};
