use crate::{
    composite_cpu::{CompositeOptions, DEFAULT_FEATHER_RADIUS, composite},
    error::{BackdropError, BackdropResult},
    foundation::core::{FrameRgba, SegmentationMask},
    fx::{FilterKind, filtered_background},
};

/// Widest frame the offline path processes before downscaling.
pub const DEFAULT_MAX_WIDTH: u32 = 480;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProcessOptions {
    /// Frames wider than this are downscaled, keeping the aspect ratio. `None` keeps the size.
    pub max_width: Option<u32>,
    pub feather_radius: u32,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            max_width: Some(DEFAULT_MAX_WIDTH),
            feather_radius: DEFAULT_FEATHER_RADIUS,
        }
    }
}

/// Filters one frame around the subject marked by `mask`.
///
/// The mask may have any size; it is stretched to the (possibly downscaled) frame.
#[tracing::instrument(skip(frame, mask), fields(w = frame.width, h = frame.height))]
pub fn process_frame(
    frame: &FrameRgba,
    mask: &SegmentationMask,
    kind: FilterKind,
    opts: ProcessOptions,
) -> BackdropResult<FrameRgba> {
    if frame.size().is_empty() {
        return Err(BackdropError::validation("cannot process an empty frame"));
    }
    if mask.size().is_empty() {
        return Err(BackdropError::validation("cannot process with an empty mask"));
    }

    let frame = match opts.max_width {
        Some(max_width) => downscale_to_width(frame, max_width)?,
        None => frame.clone(),
    };
    let background = filtered_background(&frame, kind)?;
    composite(
        &frame,
        &background,
        mask,
        CompositeOptions {
            feather_radius: opts.feather_radius,
        },
    )
}

/// Lanczos3 downscale so that `width <= max_width`. Narrower frames are returned as-is.
pub fn downscale_to_width(frame: &FrameRgba, max_width: u32) -> BackdropResult<FrameRgba> {
    if max_width == 0 {
        return Err(BackdropError::validation("max width must be > 0"));
    }
    if frame.width <= max_width {
        return Ok(frame.clone());
    }
    let height = (f64::from(frame.height) * f64::from(max_width) / f64::from(frame.width))
        .round()
        .max(1.0) as u32;
    tracing::debug!(
        from_w = frame.width,
        from_h = frame.height,
        to_w = max_width,
        to_h = height,
        "downscaling frame"
    );
    let img = frame.to_image()?;
    let out = image::imageops::resize(
        &img,
        max_width,
        height,
        image::imageops::FilterType::Lanczos3,
    );
    Ok(FrameRgba::from_image(out))
}
