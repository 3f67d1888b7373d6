use crate::{
    error::BackdropResult,
    foundation::core::{Canvas, FrameRgba},
};

/// What produced the pixels currently on the surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrawKind {
    /// Unfiltered frame during playback.
    Raw,
    /// Subject-preserving filtered composite.
    Composite,
    /// Unfiltered still frame while not playing.
    Preview,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawRecord {
    pub kind: DrawKind,
    /// Source position of the frame that was drawn.
    pub position: f64,
}

/// Output raster. Sized to the source's natural dimensions by the frame loop.
#[derive(Clone, Debug, Default)]
pub struct RenderSurface {
    size: Canvas,
    pixels: Vec<u8>,
    last_draw: Option<DrawRecord>,
    draws: u64,
}

impl RenderSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(&self) -> Canvas {
        self.size
    }

    /// A surface with zero area has not been sized yet.
    pub fn is_valid(&self) -> bool {
        !self.size.is_empty()
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn last_draw(&self) -> Option<DrawRecord> {
        self.last_draw
    }

    pub fn draw_count(&self) -> u64 {
        self.draws
    }

    /// Resizes if `size` differs. Resizing clears the contents. Returns whether it resized.
    pub fn resize_to(&mut self, size: Canvas) -> bool {
        if self.size == size {
            return false;
        }
        tracing::debug!(
            from_w = self.size.width,
            from_h = self.size.height,
            to_w = size.width,
            to_h = size.height,
            "render surface resized"
        );
        self.size = size;
        self.pixels = vec![0; size.pixel_count() * 4];
        self.last_draw = None;
        true
    }

    /// Invalidates the surface, as when a new source is bound.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Replaces the contents with `frame`, stretched to the surface size. Returns `false` without
    /// drawing while the surface is unsized.
    pub fn draw(&mut self, frame: &FrameRgba, kind: DrawKind, position: f64) -> BackdropResult<bool> {
        if !self.is_valid() {
            return Ok(false);
        }
        if frame.size() == self.size {
            self.pixels.copy_from_slice(&frame.data);
        } else {
            let scaled = frame.resized(self.size)?;
            self.pixels.copy_from_slice(&scaled.data);
        }
        self.last_draw = Some(DrawRecord { kind, position });
        self.draws += 1;
        Ok(true)
    }

    /// Copy of the current contents as a frame.
    pub fn snapshot(&self) -> FrameRgba {
        FrameRgba {
            width: self.size.width,
            height: self.size.height,
            data: self.pixels.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsized_surface_ignores_draws() {
        let mut s = RenderSurface::new();
        assert!(!s.is_valid());
        let drew = s
            .draw(&FrameRgba::solid(2, 2, [1, 1, 1, 255]), DrawKind::Raw, 0.0)
            .unwrap();
        assert!(!drew);
        assert_eq!(s.draw_count(), 0);
        assert!(s.last_draw().is_none());
    }

    #[test]
    fn resize_only_when_dimensions_change() {
        let mut s = RenderSurface::new();
        assert!(s.resize_to(Canvas::new(4, 2)));
        assert!(!s.resize_to(Canvas::new(4, 2)));
        assert_eq!(s.pixels().len(), 32);
        assert!(s.resize_to(Canvas::new(2, 2)));
        assert_eq!(s.pixels().len(), 16);
    }

    #[test]
    fn draw_stretches_to_surface_and_records_kind() {
        let mut s = RenderSurface::new();
        s.resize_to(Canvas::new(4, 4));
        let drew = s
            .draw(
                &FrameRgba::solid(2, 2, [9, 8, 7, 255]),
                DrawKind::Composite,
                1.5,
            )
            .unwrap();
        assert!(drew);
        assert!(s.pixels().chunks_exact(4).all(|px| px == [9, 8, 7, 255]));
        assert_eq!(
            s.last_draw(),
            Some(DrawRecord {
                kind: DrawKind::Composite,
                position: 1.5
            })
        );
        assert_eq!(s.snapshot().size(), Canvas::new(4, 4));
    }
}
