use crate::foundation::error::{BackdropError, BackdropResult};

/// Pixel dimensions of a frame, mask or surface.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn pixel_count(self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    /// Byte length of an RGBA8 buffer of this size, or `None` on overflow.
    pub fn rgba_len(self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|v| v.checked_mul(4))
    }
}

/// A decoded video frame as straight-alpha RGBA8, row-major, tightly packed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameRgba {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl FrameRgba {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> BackdropResult<Self> {
        let expected = Canvas::new(width, height)
            .rgba_len()
            .ok_or_else(|| BackdropError::validation("frame buffer size overflow"))?;
        if data.len() != expected {
            return Err(BackdropError::validation(format!(
                "frame buffer is {} bytes, expected {expected} for {width}x{height}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Fully transparent frame.
    pub fn transparent(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; Canvas::new(width, height).pixel_count() * 4],
        }
    }

    /// Frame filled with a single straight-alpha RGBA color.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        Self {
            width,
            height,
            data: rgba.repeat(Canvas::new(width, height).pixel_count()),
        }
    }

    pub fn size(&self) -> Canvas {
        Canvas::new(self.width, self.height)
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = ((y as usize) * (self.width as usize) + (x as usize)) * 4;
        [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]
    }

    pub fn from_image(img: image::RgbaImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            data: img.into_raw(),
        }
    }

    pub fn to_image(&self) -> BackdropResult<image::RgbaImage> {
        image::RgbaImage::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| BackdropError::validation("frame buffer does not match its size"))
    }

    /// Nearest-neighbour stretch to `size`, the way a canvas draw scales into its target rect.
    pub fn resized(&self, size: Canvas) -> BackdropResult<Self> {
        if size == self.size() {
            return Ok(self.clone());
        }
        let img = self.to_image()?;
        let out = image::imageops::resize(
            &img,
            size.width,
            size.height,
            image::imageops::FilterType::Nearest,
        );
        Ok(Self::from_image(out))
    }
}

/// Per-pixel subject alpha: 255 is subject, 0 is background.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SegmentationMask {
    pub width: u32,
    pub height: u32,
    pub alpha: Vec<u8>,
}

impl SegmentationMask {
    pub fn new(width: u32, height: u32, alpha: Vec<u8>) -> BackdropResult<Self> {
        let expected = Canvas::new(width, height).pixel_count();
        if alpha.len() != expected {
            return Err(BackdropError::validation(format!(
                "mask is {} bytes, expected {expected} for {width}x{height}",
                alpha.len()
            )));
        }
        Ok(Self {
            width,
            height,
            alpha,
        })
    }

    pub fn filled(width: u32, height: u32, value: u8) -> Self {
        Self {
            width,
            height,
            alpha: vec![value; Canvas::new(width, height).pixel_count()],
        }
    }

    pub fn size(&self) -> Canvas {
        Canvas::new(self.width, self.height)
    }

    /// Builds a mask from an image: the alpha channel when the image carries any
    /// transparency, its luma otherwise.
    pub fn from_image(img: &image::DynamicImage) -> Self {
        let rgba = img.to_rgba8();
        let has_alpha = rgba.pixels().any(|p| p.0[3] != 255);
        let (width, height) = rgba.dimensions();
        let alpha = if has_alpha {
            rgba.pixels().map(|p| p.0[3]).collect()
        } else {
            img.to_luma8().into_raw()
        };
        Self {
            width,
            height,
            alpha,
        }
    }

    /// Nearest-neighbour resample to `size`.
    pub fn resized(&self, size: Canvas) -> BackdropResult<Self> {
        if size == self.size() {
            return Ok(self.clone());
        }
        let img = image::GrayImage::from_raw(self.width, self.height, self.alpha.clone())
            .ok_or_else(|| BackdropError::validation("mask buffer does not match its size"))?;
        let out = image::imageops::resize(
            &img,
            size.width,
            size.height,
            image::imageops::FilterType::Nearest,
        );
        Ok(Self {
            width: size.width,
            height: size.height,
            alpha: out.into_raw(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_new_rejects_wrong_length() {
        assert!(FrameRgba::new(2, 2, vec![0; 15]).is_err());
        assert!(FrameRgba::new(2, 2, vec![0; 16]).is_ok());
    }

    #[test]
    fn mask_new_rejects_wrong_length() {
        assert!(SegmentationMask::new(3, 1, vec![0; 2]).is_err());
    }

    #[test]
    fn resized_frame_keeps_solid_color() {
        let f = FrameRgba::solid(4, 2, [10, 20, 30, 255]);
        let r = f.resized(Canvas::new(8, 4)).unwrap();
        assert_eq!(r.size(), Canvas::new(8, 4));
        assert!(r.data.chunks_exact(4).all(|px| px == [10, 20, 30, 255]));
    }

    #[test]
    fn mask_from_opaque_image_uses_luma() {
        let img = image::RgbaImage::from_pixel(2, 1, image::Rgba([255, 255, 255, 255]));
        let m = SegmentationMask::from_image(&image::DynamicImage::ImageRgba8(img));
        assert_eq!(m.alpha, vec![255, 255]);
    }

    #[test]
    fn mask_from_transparent_image_uses_alpha() {
        let mut img = image::RgbaImage::from_pixel(2, 1, image::Rgba([255, 255, 255, 255]));
        img.put_pixel(1, 0, image::Rgba([255, 255, 255, 0]));
        let m = SegmentationMask::from_image(&image::DynamicImage::ImageRgba8(img));
        assert_eq!(m.alpha, vec![255, 0]);
    }

    #[test]
    fn mask_resize_up_duplicates_samples() {
        let m = SegmentationMask::new(2, 1, vec![0, 255]).unwrap();
        let r = m.resized(Canvas::new(4, 1)).unwrap();
        assert_eq!(r.size(), Canvas::new(4, 1));
        assert_eq!(r.alpha[0], 0);
        assert_eq!(r.alpha[3], 255);
    }
}
