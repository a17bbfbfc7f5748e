use crate::foundation::error::{ClipforgeError, ClipforgeResult};

pub use kurbo::{Size, Vec2};

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
/// Rational frame rate.
pub struct Fps {
    /// Frames per `den` seconds.
    pub num: u32,
    /// Denominator, must be > 0.
    pub den: u32,
}

impl Fps {
    /// Build a validated frame rate.
    pub fn new(num: u32, den: u32) -> ClipforgeResult<Self> {
        if den == 0 {
            return Err(ClipforgeError::validation("Fps den must be > 0"));
        }
        if num == 0 {
            return Err(ClipforgeError::validation("Fps num must be > 0"));
        }
        Ok(Self { num, den })
    }

    /// Frames per second as a float.
    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// Duration of one frame in seconds.
    pub fn frame_duration_secs(self) -> f64 {
        f64::from(self.den) / f64::from(self.num)
    }

    /// Convert a frame count back to seconds.
    pub fn frames_to_secs(self, frames: u64) -> f64 {
        (frames as f64) * self.frame_duration_secs()
    }

    /// Quantize seconds to frames, rounding half up.
    ///
    /// This is the single rounding rule used by every export path.
    pub fn secs_to_frames_round(self, secs: f64) -> u64 {
        (secs * self.as_f64() + 0.5).floor().max(0.0) as u64
    }

    /// Integer timebase used by formats that cannot express fractional rates.
    pub fn timebase(self) -> u32 {
        self.as_f64().round().max(1.0) as u32
    }

    /// Whether this is an NTSC-style drop rate (`x000/1001`).
    pub fn is_ntsc(self) -> bool {
        self.den == 1001
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
/// Output frame dimensions in pixels.
pub struct Canvas {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
