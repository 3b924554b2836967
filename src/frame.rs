//! Output frames and the sink's native sample encoding
//!
//! Formula results are reduced to an unsigned 8-bit amplitude (128 is
//! silence) and then encoded for whatever format the sink was opened with.

use crate::error::ConfigError;

/// Mid-scale amplitude, written for samples that fail to evaluate.
pub const SILENCE: u8 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitDepth {
    Eight,
    Sixteen,
}

impl BitDepth {
    pub fn from_bits(bits: u16) -> Result<Self, ConfigError> {
        match bits {
            8 => Ok(BitDepth::Eight),
            16 => Ok(BitDepth::Sixteen),
            other => Err(ConfigError::Invalid(format!(
                "bit depth must be 8 or 16, got {other}"
            ))),
        }
    }

    pub fn bytes(self) -> usize {
        match self {
            BitDepth::Eight => 1,
            BitDepth::Sixteen => 2,
        }
    }

    pub fn bits(self) -> u16 {
        match self {
            BitDepth::Eight => 8,
            BitDepth::Sixteen => 16,
        }
    }
}

/// The one fixed output configuration of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_depth: BitDepth,
    pub signed: bool,
}

impl SinkFormat {
    /// Bytes for one sample across all channels
    pub fn bytes_per_frame(&self) -> usize {
        self.bit_depth.bytes() * self.channels as usize
    }

    /// Append one amplitude, duplicated to every channel.
    #[inline]
    pub fn encode(&self, amplitude: u8, out: &mut Vec<u8>) {
        for _ in 0..self.channels {
            match (self.bit_depth, self.signed) {
                (BitDepth::Eight, false) => out.push(amplitude),
                (BitDepth::Eight, true) => out.push(amplitude.wrapping_sub(SILENCE)),
                (BitDepth::Sixteen, true) => {
                    let s = ((amplitude as i16) - SILENCE as i16) << 8;
                    out.extend_from_slice(&s.to_le_bytes());
                }
                (BitDepth::Sixteen, false) => {
                    let s = (amplitude as u16) << 8;
                    out.extend_from_slice(&s.to_le_bytes());
                }
            }
        }
    }

    /// Decode one channel sample to `[-1.0, 1.0)`.
    ///
    /// `bytes` must hold at least `bit_depth.bytes()` bytes.
    #[inline]
    pub fn decode(&self, bytes: &[u8]) -> f32 {
        match (self.bit_depth, self.signed) {
            (BitDepth::Eight, false) => (bytes[0] as f32 - 128.0) / 128.0,
            (BitDepth::Eight, true) => bytes[0] as i8 as f32 / 128.0,
            (BitDepth::Sixteen, true) => i16::from_le_bytes([bytes[0], bytes[1]]) as f32 / 32768.0,
            (BitDepth::Sixteen, false) => {
                (u16::from_le_bytes([bytes[0], bytes[1]]) as f32 - 32768.0) / 32768.0
            }
        }
    }

    /// Decode one channel sample to the signed 16-bit range used for WAV output.
    #[inline]
    pub fn decode_i16(&self, bytes: &[u8]) -> i16 {
        match (self.bit_depth, self.signed) {
            (BitDepth::Eight, false) => ((bytes[0] as i16) - 128) << 8,
            (BitDepth::Eight, true) => (bytes[0] as i8 as i16) << 8,
            (BitDepth::Sixteen, true) => i16::from_le_bytes([bytes[0], bytes[1]]),
            (BitDepth::Sixteen, false) => {
                (u16::from_le_bytes([bytes[0], bytes[1]]) ^ 0x8000) as i16
            }
        }
    }
}

/// A fixed-size batch of encoded samples
#[derive(Debug, Clone)]
pub struct OutputFrame {
    bytes: Vec<u8>,
    samples: usize,
    first_ordinal: u64,
    generation: u64,
}

impl OutputFrame {
    pub fn with_capacity(format: &SinkFormat, samples: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(format.bytes_per_frame() * samples),
            samples: 0,
            first_ordinal: 0,
            generation: 0,
        }
    }

    /// Start a new frame, keeping the allocation.
    pub fn begin(&mut self, first_ordinal: u64, generation: u64) {
        self.bytes.clear();
        self.samples = 0;
        self.first_ordinal = first_ordinal;
        self.generation = generation;
    }

    #[inline]
    pub fn push(&mut self, format: &SinkFormat, amplitude: u8) {
        format.encode(amplitude, &mut self.bytes);
        self.samples += 1;
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Samples per channel in this frame
    pub fn samples(&self) -> usize {
        self.samples
    }

    /// Physical ordinal of the first sample
    pub fn first_ordinal(&self) -> u64 {
        self.first_ordinal
    }

    /// Program generation the frame was rendered with
    pub fn generation(&self) -> u64 {
        self.generation
    }
}
