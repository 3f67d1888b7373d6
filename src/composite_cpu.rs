//! Subject-preserving compositing.
//!
//! The output is built in three passes over a transparent canvas:
//! the filtered frame is drawn, the mask is punched out of it (destination-out), and the raw
//! frame is drawn behind what remains (destination-over). The subject therefore shows the raw
//! frame through the hole while everything else keeps the filtered layer on top.
//!
//! Blending is done on premultiplied RGBA8; inputs and output are straight alpha.

use crate::{
    blur_cpu::blur_alpha8,
    error::{BackdropError, BackdropResult},
    foundation::core::{FrameRgba, SegmentationMask},
};

pub type PremulRgba8 = [u8; 4];

/// Default mask feathering used by offline processing (a 7-tap kernel).
pub const DEFAULT_FEATHER_RADIUS: u32 = 3;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CompositeOptions {
    /// Gaussian half-width applied to the mask before the cutout. 0 disables feathering.
    pub feather_radius: u32,
}

pub fn premultiply([r, g, b, a]: [u8; 4]) -> PremulRgba8 {
    [
        mul_div255(u16::from(r), u16::from(a)),
        mul_div255(u16::from(g), u16::from(a)),
        mul_div255(u16::from(b), u16::from(a)),
        a,
    ]
}

pub fn unpremultiply([r, g, b, a]: PremulRgba8) -> [u8; 4] {
    if a == 0 {
        return [0, 0, 0, 0];
    }
    if a == 255 {
        return [r, g, b, a];
    }
    let un = |c: u8| -> u8 {
        let v = (u32::from(c) * 255 + u32::from(a) / 2) / u32::from(a);
        v.min(255) as u8
    };
    [un(r), un(g), un(b), a]
}

/// Porter-Duff destination-out: keeps `dst` where `src_alpha` is transparent.
pub fn destination_out(dst: PremulRgba8, src_alpha: u8) -> PremulRgba8 {
    if src_alpha == 0 {
        return dst;
    }
    let keep = 255u16 - u16::from(src_alpha);
    [
        mul_div255(u16::from(dst[0]), keep),
        mul_div255(u16::from(dst[1]), keep),
        mul_div255(u16::from(dst[2]), keep),
        mul_div255(u16::from(dst[3]), keep),
    ]
}

/// Porter-Duff destination-over: draws `src` behind `dst`.
pub fn destination_over(dst: PremulRgba8, src: PremulRgba8) -> PremulRgba8 {
    if dst[3] == 255 {
        return dst;
    }
    let inv = 255u16 - u16::from(dst[3]);
    let mut out = [0u8; 4];
    for i in 0..4 {
        out[i] = add_sat_u8(dst[i], mul_div255(u16::from(src[i]), inv));
    }
    out
}

/// Merges `raw` and `filtered` so that mask-marked pixels come from `raw` and the rest from
/// `filtered`. A mask of a different size is stretched to the frame.
#[tracing::instrument(level = "trace", skip_all, fields(w = raw.width, h = raw.height))]
pub fn composite(
    raw: &FrameRgba,
    filtered: &FrameRgba,
    mask: &SegmentationMask,
    opts: CompositeOptions,
) -> BackdropResult<FrameRgba> {
    if raw.size() != filtered.size() {
        return Err(BackdropError::validation(format!(
            "composite expects equal frame sizes, got {}x{} and {}x{}",
            raw.width, raw.height, filtered.width, filtered.height
        )));
    }
    let expected_len = raw
        .size()
        .rgba_len()
        .ok_or_else(|| BackdropError::validation("composite buffer size overflow"))?;
    if raw.data.len() != expected_len || filtered.data.len() != expected_len {
        return Err(BackdropError::validation(
            "composite expects buffers matching width*height*4",
        ));
    }

    let mask = prepare_mask(mask, raw, opts)?;

    let mut canvas = FrameRgba::transparent(raw.width, raw.height);
    for (((out, r), f), &m) in canvas
        .data
        .chunks_exact_mut(4)
        .zip(raw.data.chunks_exact(4))
        .zip(filtered.data.chunks_exact(4))
        .zip(mask.alpha.iter())
    {
        // Drawing onto a cleared canvas leaves exactly the filtered pixel.
        let layer = premultiply([f[0], f[1], f[2], f[3]]);
        let layer = destination_out(layer, m);
        let px = destination_over(layer, premultiply([r[0], r[1], r[2], r[3]]));
        out.copy_from_slice(&unpremultiply(px));
    }
    Ok(canvas)
}

fn prepare_mask(
    mask: &SegmentationMask,
    frame: &FrameRgba,
    opts: CompositeOptions,
) -> BackdropResult<SegmentationMask> {
    let mask = mask.resized(frame.size())?;
    if opts.feather_radius == 0 {
        return Ok(mask);
    }
    feather_mask(&mask, opts.feather_radius)
}

/// Softens mask edges with a Gaussian of the given half-width.
pub fn feather_mask(mask: &SegmentationMask, radius: u32) -> BackdropResult<SegmentationMask> {
    // Same sigma rule of thumb as a fixed-size kernel: sigma = 0.3*((ksize-1)*0.5 - 1) + 0.8.
    let ksize = (radius * 2 + 1) as f32;
    let sigma = 0.3 * ((ksize - 1.0) * 0.5 - 1.0) + 0.8;
    let alpha = blur_alpha8(&mask.alpha, mask.width, mask.height, radius, sigma)?;
    SegmentationMask::new(mask.width, mask.height, alpha)
}

fn mul_div255(x: u16, y: u16) -> u8 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u8
}

fn add_sat_u8(a: u8, b: u8) -> u8 {
    a.saturating_add(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(w: u32, h: u32) -> FrameRgba {
        let mut data = Vec::with_capacity((w * h * 4) as usize);
        for y in 0..h {
            for x in 0..w {
                data.extend_from_slice(&[(x * 37 % 256) as u8, (y * 53 % 256) as u8, 90, 255]);
            }
        }
        FrameRgba::new(w, h, data).unwrap()
    }

    #[test]
    fn premultiply_roundtrip_is_exact_for_opaque() {
        let px = [12, 200, 99, 255];
        assert_eq!(unpremultiply(premultiply(px)), px);
    }

    #[test]
    fn destination_out_full_alpha_clears() {
        assert_eq!(destination_out([10, 20, 30, 255], 255), [0, 0, 0, 0]);
        assert_eq!(destination_out([10, 20, 30, 255], 0), [10, 20, 30, 255]);
    }

    #[test]
    fn destination_over_fills_transparent_dst() {
        assert_eq!(destination_over([0, 0, 0, 0], [1, 2, 3, 255]), [1, 2, 3, 255]);
        assert_eq!(destination_over([9, 9, 9, 255], [1, 2, 3, 255]), [9, 9, 9, 255]);
    }

    #[test]
    fn all_subject_mask_yields_raw_frame() {
        let raw = gradient(7, 5);
        let mut filtered = raw.clone();
        crate::fx::apply_color_filter(&mut filtered.data, crate::FilterKind::Sepia).unwrap();
        let mask = SegmentationMask::filled(7, 5, 255);
        let out = composite(&raw, &filtered, &mask, CompositeOptions::default()).unwrap();
        assert_eq!(out, raw);
    }

    #[test]
    fn empty_mask_yields_filtered_frame() {
        let raw = gradient(7, 5);
        let mut filtered = raw.clone();
        crate::fx::apply_color_filter(&mut filtered.data, crate::FilterKind::Grayscale).unwrap();
        let mask = SegmentationMask::filled(7, 5, 0);
        let out = composite(&raw, &filtered, &mask, CompositeOptions::default()).unwrap();
        assert_eq!(out, filtered);
    }

    #[test]
    fn half_mask_splits_subject_and_background() {
        let raw = FrameRgba::solid(4, 1, [200, 0, 0, 255]);
        let filtered = FrameRgba::solid(4, 1, [0, 0, 200, 255]);
        let mask = SegmentationMask::new(4, 1, vec![255, 255, 0, 0]).unwrap();
        let out = composite(&raw, &filtered, &mask, CompositeOptions::default()).unwrap();
        assert_eq!(out.pixel(0, 0), [200, 0, 0, 255]);
        assert_eq!(out.pixel(1, 0), [200, 0, 0, 255]);
        assert_eq!(out.pixel(2, 0), [0, 0, 200, 255]);
        assert_eq!(out.pixel(3, 0), [0, 0, 200, 255]);
    }

    #[test]
    fn partial_mask_blends_both_layers() {
        let raw = FrameRgba::solid(1, 1, [255, 0, 0, 255]);
        let filtered = FrameRgba::solid(1, 1, [0, 0, 255, 255]);
        let mask = SegmentationMask::filled(1, 1, 128);
        let out = composite(&raw, &filtered, &mask, CompositeOptions::default()).unwrap();
        let px = out.pixel(0, 0);
        assert!(px[0] > 100 && px[0] < 160);
        assert!(px[2] > 100 && px[2] < 160);
        assert_eq!(px[3], 255);
    }

    #[test]
    fn smaller_mask_is_stretched_to_frame() {
        let raw = FrameRgba::solid(4, 4, [255, 255, 255, 255]);
        let filtered = FrameRgba::solid(4, 4, [0, 0, 0, 255]);
        let mask = SegmentationMask::filled(2, 2, 255);
        let out = composite(&raw, &filtered, &mask, CompositeOptions::default()).unwrap();
        assert_eq!(out, raw);
    }

    #[test]
    fn mismatched_frames_are_rejected() {
        let raw = FrameRgba::solid(4, 4, [0, 0, 0, 255]);
        let filtered = FrameRgba::solid(4, 3, [0, 0, 0, 255]);
        let mask = SegmentationMask::filled(4, 4, 0);
        assert!(composite(&raw, &filtered, &mask, CompositeOptions::default()).is_err());
    }

    #[test]
    fn feathering_softens_the_cutout_edge() {
        let raw = FrameRgba::solid(12, 1, [255, 255, 255, 255]);
        let filtered = FrameRgba::solid(12, 1, [0, 0, 0, 255]);
        let mut alpha = vec![0u8; 12];
        alpha[6..].fill(255);
        let mask = SegmentationMask::new(12, 1, alpha).unwrap();

        let hard = composite(&raw, &filtered, &mask, CompositeOptions::default()).unwrap();
        assert_eq!(hard.pixel(5, 0)[0], 0);

        let soft = composite(
            &raw,
            &filtered,
            &mask,
            CompositeOptions {
                feather_radius: DEFAULT_FEATHER_RADIUS,
            },
        )
        .unwrap();
        let edge = soft.pixel(5, 0)[0];
        assert!(edge > 0 && edge < 255);
        assert_eq!(soft.pixel(0, 0)[0], 0);
        assert_eq!(soft.pixel(11, 0)[0], 255);
    }
}
