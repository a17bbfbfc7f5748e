use std::io::Cursor;

use anyhow::Context;

use crate::{
    foundation::error::{ClipforgeError, ClipforgeResult},
    foundation::math::StableHasher,
    media::reference::MediaKind,
};

/// Length of audio placeholders when the node gives no duration.
pub const DEFAULT_PLACEHOLDER_SECS: f64 = 3.0;

const WAV_SAMPLE_RATE: u32 = 8_000;

#[derive(Clone, Debug)]
/// What a placeholder stands in for.
pub struct PlaceholderRequest<'a> {
    /// Kind of the missing asset.
    pub kind: MediaKind,
    /// Prompt text of the missing asset; drives the placeholder color.
    pub prompt_text: &'a str,
    /// Duration to cover, for audio.
    pub duration: Option<f64>,
    /// Pixel width, for visuals.
    pub width: u32,
    /// Pixel height, for visuals.
    pub height: u32,
}

/// Draws stand-in media for assets that could not be generated.
pub trait PlaceholderGenerator: Send + Sync {
    /// Encoded placeholder bytes.
    fn generate_placeholder(&self, req: &PlaceholderRequest<'_>) -> ClipforgeResult<Vec<u8>>;
}

#[derive(Clone, Copy, Debug, Default)]
/// Solid-color PNG stills (color derived from the prompt) and silent mono WAV audio.
pub struct SolidPlaceholder;

impl SolidPlaceholder {
    /// Deterministic mid-tone color for `prompt_text`.
    pub fn color_for(prompt_text: &str) -> [u8; 3] {
        let mut h = StableHasher::new();
        h.write_str(prompt_text);
        let hex = h.finish_hex();
        let byte = |i: usize| u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).unwrap_or(0);
        // Keep channels in 64..=191 so overlaid text stays readable in either polarity.
        [64 + byte(0) / 2, 64 + byte(1) / 2, 64 + byte(2) / 2]
    }
}

impl PlaceholderGenerator for SolidPlaceholder {
    fn generate_placeholder(&self, req: &PlaceholderRequest<'_>) -> ClipforgeResult<Vec<u8>> {
        match req.kind {
            MediaKind::Image | MediaKind::Video => {
                if req.width == 0 || req.height == 0 {
                    return Err(ClipforgeError::validation(
                        "placeholder width/height must be > 0",
                    ));
                }
                let img = image::RgbImage::from_pixel(
                    req.width,
                    req.height,
                    image::Rgb(Self::color_for(req.prompt_text)),
                );
                let mut out = Cursor::new(Vec::new());
                img.write_to(&mut out, image::ImageFormat::Png)
                    .context("encode placeholder png")?;
                Ok(out.into_inner())
            }
            MediaKind::Audio => {
                let secs = req.duration.unwrap_or(DEFAULT_PLACEHOLDER_SECS);
                if !secs.is_finite() || secs < 0.0 {
                    return Err(ClipforgeError::validation(
                        "placeholder duration must be finite and >= 0",
                    ));
                }
                let samples = (secs * f64::from(WAV_SAMPLE_RATE)).round();
                silent_wav(samples as u64, WAV_SAMPLE_RATE)
            }
        }
    }
}

/// 16-bit PCM mono WAV with `samples` zero samples.
///
/// RIFF sizes are 32-bit, so durations whose data chunk would not fit are rejected.
fn silent_wav(samples: u64, sample_rate: u32) -> ClipforgeResult<Vec<u8>> {
    let too_long = || {
        ClipforgeError::validation(format!(
            "placeholder audio of {samples} samples exceeds the WAV size limit"
        ))
    };
    let data_len = samples
        .checked_mul(2)
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(too_long)?;
    let riff_len = data_len.checked_add(36).ok_or_else(too_long)?;
    let mut out = Vec::with_capacity(44 + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&riff_len.to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&1u16.to_le_bytes()); // mono
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * 2).to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.resize(44 + data_len as usize, 0);
    Ok(out)
}

#[cfg(test)]
#[path = "../../tests/unit/media/placeholder.rs"]
mod tests;
