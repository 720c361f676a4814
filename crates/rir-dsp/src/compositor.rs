//! Final output assembly: gain normalization and channel interleaving.

use serde::{Deserialize, Serialize};

use crate::error::{DspError, Result};
use crate::validate_buffer;

/// Integer PCM sample width of the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BitDepth {
    /// 8-bit signed samples.
    Int8,
    /// 16-bit signed samples.
    Int16,
    /// 32-bit signed samples.
    #[default]
    Int32,
}

impl BitDepth {
    /// Resolves a bit count (8, 16 or 32).
    ///
    /// # Errors
    ///
    /// Returns [`DspError::Configuration`] for any other width.
    pub fn from_bits(bits: u16) -> Result<Self> {
        match bits {
            8 => Ok(Self::Int8),
            16 => Ok(Self::Int16),
            32 => Ok(Self::Int32),
            other => Err(DspError::config(
                "compositor",
                format!("unsupported bit depth {other} (expected 8, 16 or 32)"),
            )),
        }
    }

    /// Bits per sample.
    pub fn bits(&self) -> u16 {
        match self {
            Self::Int8 => 8,
            Self::Int16 => 16,
            Self::Int32 => 32,
        }
    }

    /// Largest representable positive sample value.
    pub fn full_scale(&self) -> f64 {
        match self {
            Self::Int8 => i8::MAX as f64,
            Self::Int16 => i16::MAX as f64,
            Self::Int32 => i32::MAX as f64,
        }
    }
}

/// Output settings for the compositor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompositorConfig {
    /// Target sample width.
    pub bit_depth: BitDepth,
    /// Peak ceiling below full scale, in dB. The peak lands on
    /// `full_scale · 10^(-ceiling_db / 10)`.
    pub ceiling_db: f64,
    /// Scale the joint peak to the ceiling. When off, input is taken as
    /// `[-1, 1]` floats and scaled straight to full scale.
    pub adaptive_gain: bool,
    /// Write a single channel twice, as a stereo pair.
    pub dual_mono: bool,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            bit_depth: BitDepth::Int32,
            ceiling_db: 3.0,
            adaptive_gain: true,
            dual_mono: false,
        }
    }
}

/// Interleaved integer PCM ready for encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputBuffer {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Sample width; every sample fits its range.
    pub bit_depth: BitDepth,
    /// Channel count.
    pub channels: u16,
    /// Interleaved samples (`frames * channels`).
    pub samples: Vec<i32>,
    /// Gain factor applied to the float input.
    pub gain: f64,
}

impl OutputBuffer {
    /// Number of sample frames.
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    /// De-interleaved copy of one channel.
    pub fn channel(&self, index: usize) -> Vec<i32> {
        self.samples
            .iter()
            .skip(index)
            .step_by(self.channels.max(1) as usize)
            .copied()
            .collect()
    }

    /// Largest absolute sample value.
    pub fn peak(&self) -> i64 {
        self.samples
            .iter()
            .map(|&s| (s as i64).abs())
            .max()
            .unwrap_or(0)
    }
}

/// Combines processed channels into one output buffer.
#[derive(Debug, Clone, Default)]
pub struct StereoCompositor {
    config: CompositorConfig,
}

impl StereoCompositor {
    /// Creates a compositor.
    ///
    /// # Errors
    ///
    /// Returns [`DspError::Configuration`] for a negative or non-finite ceiling.
    pub fn new(config: CompositorConfig) -> Result<Self> {
        if !config.ceiling_db.is_finite() || config.ceiling_db < 0.0 {
            return Err(DspError::config(
                "compositor",
                format!("ceiling must be a finite non-negative dB value, got {}", config.ceiling_db),
            ));
        }
        Ok(Self { config })
    }

    /// The active configuration.
    pub fn config(&self) -> &CompositorConfig {
        &self.config
    }

    /// Gain-normalizes and interleaves `channels`.
    ///
    /// The gain is shared by all channels so their level differences survive.
    /// Shorter channels are padded with silence.
    ///
    /// # Errors
    ///
    /// Returns a processing error when no channel is given, a channel is
    /// empty or non-finite, or (with adaptive gain) the peak is zero.
    pub fn compose(&self, channels: &[Vec<f32>], sample_rate: u32) -> Result<OutputBuffer> {
        const STAGE: &str = "compositor";
        if channels.is_empty() {
            return Err(DspError::processing(STAGE, "no channels to compose"));
        }
        for channel in channels {
            validate_buffer(STAGE, channel)?;
        }

        let full_scale = self.config.bit_depth.full_scale();
        let peak = channels
            .iter()
            .flat_map(|c| c.iter())
            .fold(0.0f64, |acc, &s| acc.max((s as f64).abs()));

        let gain = if self.config.adaptive_gain {
            if !(peak.is_finite() && peak > 0.0) {
                return Err(DspError::processing(
                    STAGE,
                    format!("cannot normalize a buffer with peak {peak}"),
                ));
            }
            full_scale * 10f64.powf(-self.config.ceiling_db / 10.0) / peak
        } else {
            full_scale
        };
        tracing::debug!(peak, gain, bits = self.config.bit_depth.bits(), "Output gain");

        let sources: Vec<&Vec<f32>> = if channels.len() == 1 && self.config.dual_mono {
            vec![&channels[0], &channels[0]]
        } else {
            channels.iter().collect()
        };
        let frames = sources.iter().map(|c| c.len()).max().unwrap_or(0);

        let mut samples = Vec::with_capacity(frames * sources.len());
        for i in 0..frames {
            for channel in &sources {
                let value = channel.get(i).copied().unwrap_or(0.0) as f64 * gain;
                samples.push(value.round().clamp(-full_scale, full_scale) as i32);
            }
        }

        Ok(OutputBuffer {
            sample_rate,
            bit_depth: self.config.bit_depth,
            channels: sources.len() as u16,
            samples,
            gain,
        })
    }
}
