//! Sample-width normalisation between host containers and the engine's
//! 16-bit sample format.
//!
//! Host streams declare a [`FrameFormat`]. Each session picks a
//! [`SampleWidth`] from it once, at creation, and every conversion on the hot
//! path goes through that strategy instead of reinterpreting raw memory.
//!
//! ```text
//! S16_LE            → Width16         (verbatim copy)
//! S24_4LE / S32_LE  → Width32Shifted  (x >> 16 into the engine, x << 16 out)
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SmartAmpError};

/// Frame format a host stream declares for its samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameFormat {
    /// 16-bit signed, little endian.
    #[serde(rename = "s16le")]
    S16Le,
    /// 24 valid bits left-justified in a 32-bit container.
    #[serde(rename = "s24_4le")]
    S24In32Le,
    /// 32-bit signed, little endian.
    #[serde(rename = "s32le")]
    S32Le,
    /// 32-bit float. Declared by some hosts, never accepted by the engine.
    #[serde(rename = "f32le")]
    F32Le,
}

impl fmt::Display for FrameFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FrameFormat::S16Le => "S16_LE",
            FrameFormat::S24In32Le => "S24_4LE",
            FrameFormat::S32Le => "S32_LE",
            FrameFormat::F32Le => "FLOAT_LE",
        };
        f.write_str(name)
    }
}

/// Conversion strategy between a host container and the engine's `i16`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleWidth {
    /// Host samples are already 16-bit.
    Width16,
    /// Host samples are 32-bit containers; the engine sees the top 16 bits.
    Width32Shifted,
}

impl SampleWidth {
    /// Host container value → engine sample.
    #[inline]
    pub fn to_engine(self, x: i32) -> i16 {
        match self {
            SampleWidth::Width16 => x as i16,
            SampleWidth::Width32Shifted => narrow(x),
        }
    }

    /// Engine sample → host container value.
    #[inline]
    pub fn from_engine(self, x: i16) -> i32 {
        match self {
            SampleWidth::Width16 => x as i32,
            SampleWidth::Width32Shifted => widen(x),
        }
    }
}

impl TryFrom<FrameFormat> for SampleWidth {
    type Error = SmartAmpError;

    fn try_from(format: FrameFormat) -> Result<Self> {
        match format {
            FrameFormat::S16Le => Ok(SampleWidth::Width16),
            FrameFormat::S24In32Le | FrameFormat::S32Le => Ok(SampleWidth::Width32Shifted),
            other => Err(SmartAmpError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Arithmetic right shift into the 16-bit engine container. Sign-preserving,
/// no rounding.
#[inline]
pub fn narrow(x: i32) -> i16 {
    (x >> 16) as i16
}

/// Left shift back into a 32-bit container. The low 16 bits come back zero.
#[inline]
pub fn widen(x: i16) -> i32 {
    (x as i32) << 16
}
