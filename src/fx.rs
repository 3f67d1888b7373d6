use std::{fmt, str::FromStr};

use rayon::prelude::*;

use crate::{
    blur_cpu::{BACKGROUND_BLUR_SIGMA, blur_rgba8, radius_for_sigma},
    error::{BackdropError, BackdropResult},
    foundation::core::FrameRgba,
};

/// Background style applied outside the subject.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    None,
    #[default]
    Grayscale,
    Sepia,
    Blur,
}

impl FilterKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Grayscale => "grayscale",
            Self::Sepia => "sepia",
            Self::Blur => "blur",
        }
    }

    /// Whether this kind changes pixels at all.
    pub fn is_active(self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterKind {
    type Err = BackdropError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = s.trim().to_ascii_lowercase();
        if kind.is_empty() {
            return Err(BackdropError::validation("filter kind must be non-empty"));
        }
        match kind.as_str() {
            "none" | "off" => Ok(Self::None),
            "grayscale" | "greyscale" | "gray" | "grey" => Ok(Self::Grayscale),
            "sepia" => Ok(Self::Sepia),
            "blur" => Ok(Self::Blur),
            _ => Err(BackdropError::validation(format!(
                "unknown filter kind '{kind}'"
            ))),
        }
    }
}

/// Applies a per-pixel color transform in place. `Blur` and `None` leave the buffer untouched;
/// blur is a layer effect, see [`filtered_background`].
pub fn apply_color_filter(data: &mut [u8], kind: FilterKind) -> BackdropResult<()> {
    if !data.len().is_multiple_of(4) {
        return Err(BackdropError::validation(
            "color filter expects an rgba8 buffer",
        ));
    }
    match kind {
        FilterKind::Grayscale => data.par_chunks_exact_mut(4).for_each(|px| {
            let g = grayscale_px([px[0], px[1], px[2]]);
            px[0] = g;
            px[1] = g;
            px[2] = g;
        }),
        FilterKind::Sepia => data.par_chunks_exact_mut(4).for_each(|px| {
            let out = sepia_px([px[0], px[1], px[2]]);
            px[..3].copy_from_slice(&out);
        }),
        FilterKind::None | FilterKind::Blur => {}
    }
    Ok(())
}

/// ITU-R BT.601 luma.
pub fn grayscale_px([r, g, b]: [u8; 3]) -> u8 {
    let (r, g, b) = (f64::from(r), f64::from(g), f64::from(b));
    store_clamped(0.299 * r + 0.587 * g + 0.114 * b)
}

pub fn sepia_px([r, g, b]: [u8; 3]) -> [u8; 3] {
    let (r, g, b) = (f64::from(r), f64::from(g), f64::from(b));
    [
        store_clamped((0.393 * r + 0.769 * g + 0.189 * b).min(255.0)),
        store_clamped((0.349 * r + 0.686 * g + 0.168 * b).min(255.0)),
        store_clamped((0.272 * r + 0.534 * g + 0.131 * b).min(255.0)),
    ]
}

// Clamped byte store: saturate, then round half to even.
fn store_clamped(v: f64) -> u8 {
    if v.is_nan() {
        return 0;
    }
    v.clamp(0.0, 255.0).round_ties_even() as u8
}

/// Produces the styled background layer for `frame`.
#[tracing::instrument(level = "trace", skip(frame), fields(w = frame.width, h = frame.height))]
pub fn filtered_background(frame: &FrameRgba, kind: FilterKind) -> BackdropResult<FrameRgba> {
    match kind {
        FilterKind::Blur => {
            let data = blur_rgba8(
                &frame.data,
                frame.width,
                frame.height,
                radius_for_sigma(BACKGROUND_BLUR_SIGMA),
                BACKGROUND_BLUR_SIGMA,
            )?;
            FrameRgba::new(frame.width, frame.height, data)
        }
        FilterKind::Grayscale | FilterKind::Sepia => {
            let mut out = frame.clone();
            apply_color_filter(&mut out.data, kind)?;
            Ok(out)
        }
        FilterKind::None => Ok(frame.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn luminance(px: [u8; 3]) -> f64 {
        0.299 * f64::from(px[0]) + 0.587 * f64::from(px[1]) + 0.114 * f64::from(px[2])
    }

    #[test]
    fn parse_accepts_aliases_and_rejects_unknown() {
        assert_eq!("Grayscale".parse::<FilterKind>().unwrap(), FilterKind::Grayscale);
        assert_eq!(" greyscale ".parse::<FilterKind>().unwrap(), FilterKind::Grayscale);
        assert_eq!("SEPIA".parse::<FilterKind>().unwrap(), FilterKind::Sepia);
        assert_eq!("blur".parse::<FilterKind>().unwrap(), FilterKind::Blur);
        assert_eq!("none".parse::<FilterKind>().unwrap(), FilterKind::None);
        assert!("vignette".parse::<FilterKind>().is_err());
        assert!("".parse::<FilterKind>().is_err());
    }

    #[test]
    fn serde_uses_lowercase_names() {
        let s = serde_json::to_string(&FilterKind::Sepia).unwrap();
        assert_eq!(s, "\"sepia\"");
        let k: FilterKind = serde_json::from_str("\"blur\"").unwrap();
        assert_eq!(k, FilterKind::Blur);
    }

    #[test]
    fn grayscale_equalizes_channels_and_keeps_alpha() {
        let mut data = Vec::new();
        for (i, v) in (0u8..=255).step_by(15).enumerate() {
            data.extend_from_slice(&[v, 255 - v, v / 2, (i * 13) as u8]);
        }
        let alphas: Vec<u8> = data.chunks_exact(4).map(|px| px[3]).collect();
        apply_color_filter(&mut data, FilterKind::Grayscale).unwrap();
        for (px, a) in data.chunks_exact(4).zip(alphas) {
            assert_eq!(px[0], px[1]);
            assert_eq!(px[1], px[2]);
            assert_eq!(px[3], a);
        }
    }

    #[test]
    fn grayscale_uses_bt601_weights() {
        assert_eq!(grayscale_px([255, 0, 0]), 76); // 76.245
        assert_eq!(grayscale_px([0, 255, 0]), 150); // 149.685
        assert_eq!(grayscale_px([0, 0, 255]), 29); // 29.07
        assert_eq!(grayscale_px([255, 255, 255]), 255);
        assert_eq!(grayscale_px([0, 0, 0]), 0);
    }

    #[test]
    fn sepia_matches_matrix_and_clamps() {
        // 0.393*100 + 0.769*50 + 0.189*20 = 81.53
        // 0.349*100 + 0.686*50 + 0.168*20 = 72.56
        // 0.272*100 + 0.534*50 + 0.131*20 = 56.52
        assert_eq!(sepia_px([100, 50, 20]), [82, 73, 57]);
        assert_eq!(sepia_px([255, 255, 255]), [255, 255, 239]);
    }

    #[test]
    fn sepia_is_monotonic_in_luminance() {
        let mut prev = [0u8; 3];
        for v in 0u8..=255 {
            let out = sepia_px([v, v, v]);
            for c in 0..3 {
                assert!(out[c] >= prev[c], "channel {c} decreased at {v}");
            }
            prev = out;
        }
        let dark = sepia_px([10, 20, 30]);
        let bright = sepia_px([200, 210, 220]);
        assert!(luminance([10, 20, 30]) < luminance([200, 210, 220]));
        assert!(dark.iter().zip(bright.iter()).all(|(d, b)| d <= b));
    }

    #[test]
    fn sepia_keeps_alpha() {
        let mut data = vec![10, 20, 30, 7, 200, 100, 50, 128];
        apply_color_filter(&mut data, FilterKind::Sepia).unwrap();
        assert_eq!(data[3], 7);
        assert_eq!(data[7], 128);
    }

    #[test]
    fn color_filter_rejects_partial_pixels() {
        let mut data = vec![0u8; 6];
        assert!(apply_color_filter(&mut data, FilterKind::Grayscale).is_err());
    }

    #[test]
    fn none_and_blur_leave_color_pass_untouched() {
        let src = vec![1u8, 2, 3, 4, 5, 6, 7, 8];
        let mut a = src.clone();
        apply_color_filter(&mut a, FilterKind::None).unwrap();
        assert_eq!(a, src);
        apply_color_filter(&mut a, FilterKind::Blur).unwrap();
        assert_eq!(a, src);
    }

    #[test]
    fn blurred_background_keeps_size_and_flat_color() {
        let f = FrameRgba::solid(8, 6, [40, 80, 120, 255]);
        let out = filtered_background(&f, FilterKind::Blur).unwrap();
        assert_eq!(out, f);
    }

    #[test]
    fn blurred_background_smears_an_edge() {
        let mut f = FrameRgba::solid(40, 1, [0, 0, 0, 255]);
        for x in 20..40 {
            let i = x * 4;
            f.data[i..i + 3].copy_from_slice(&[255, 255, 255]);
        }
        let out = filtered_background(&f, FilterKind::Blur).unwrap();
        let edge = out.pixel(19, 0);
        assert!(edge[0] > 0 && edge[0] < 255);
        assert_eq!(edge[3], 255);
    }
}
