//! WAV file sink for offline rendering
//!
//! A file never pushes back, so every write is `Accepted` and the drain
//! signal is never needed.

use super::{AudioSink, DrainNotifier, DrainSignal, WriteOutcome};
use crate::error::SinkError;
use crate::frame::{BitDepth, OutputFrame, SinkFormat};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

pub struct WavSink {
    format: SinkFormat,
    writer: Option<WavWriter<BufWriter<File>>>,
    samples_written: u64,
    _notifier: DrainNotifier,
    signal: DrainSignal,
}

impl WavSink {
    pub fn create(path: &Path, format: SinkFormat) -> Result<Self, SinkError> {
        let spec = WavSpec {
            channels: format.channels,
            sample_rate: format.sample_rate,
            bits_per_sample: format.bit_depth.bits(),
            sample_format: SampleFormat::Int,
        };
        let writer = WavWriter::create(path, spec)?;
        let (notifier, signal) = DrainSignal::channel();
        Ok(Self {
            format,
            writer: Some(writer),
            samples_written: 0,
            _notifier: notifier,
            signal,
        })
    }

    /// Samples per channel written so far
    pub fn samples_written(&self) -> u64 {
        self.samples_written
    }

    /// Flush the header. Writes after this fail.
    pub fn finish(&mut self) -> Result<(), SinkError> {
        if let Some(writer) = self.writer.take() {
            writer.finalize()?;
        }
        Ok(())
    }
}

impl AudioSink for WavSink {
    fn format(&self) -> SinkFormat {
        self.format
    }

    fn write(&mut self, frame: &OutputFrame) -> Result<WriteOutcome, SinkError> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(SinkError::Device("wav file already finalized".to_string()));
        };

        // WAV stores 8-bit PCM unsigned and 16-bit PCM signed regardless of
        // the sink's own signedness, so go through the signed 16-bit value.
        let width = self.format.bit_depth.bytes();
        for sample in frame.bytes().chunks_exact(width) {
            let value = self.format.decode_i16(sample);
            match self.format.bit_depth {
                BitDepth::Eight => writer.write_sample((value >> 8) as i8)?,
                BitDepth::Sixteen => writer.write_sample(value)?,
            }
        }
        self.samples_written += frame.samples() as u64;
        Ok(WriteOutcome::Accepted)
    }

    fn poll_drained(&mut self) -> Result<bool, SinkError> {
        Ok(true)
    }

    fn drain_signal(&self) -> DrainSignal {
        self.signal.clone()
    }

    fn reset(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

impl Drop for WavSink {
    fn drop(&mut self) {
        let _ = self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_unsigned_8_bit_round_trips_through_hound() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let format = SinkFormat {
            sample_rate: 8000,
            channels: 1,
            bit_depth: BitDepth::Eight,
            signed: false,
        };

        let mut sink = WavSink::create(&path, format).unwrap();
        let mut frame = OutputFrame::with_capacity(&format, 3);
        frame.begin(0, 1);
        for a in [0u8, 128, 255] {
            frame.push(&format, a);
        }
        assert_eq!(sink.write(&frame).unwrap(), WriteOutcome::Accepted);
        sink.finish().unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().bits_per_sample, 8);
        let samples: Vec<i8> = reader.samples::<i8>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![-128, 0, 127]);
    }
}
