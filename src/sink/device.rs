//! Sound card output through cpal
//!
//! The render thread pushes encoded frames into a `HeapRb<u8>`; the device
//! callback pops one sample at a time, decodes it and copies it to every
//! device channel. The callback never blocks and plays silence on underrun.

use super::{AudioSink, DrainNotifier, DrainSignal, WriteOutcome};
use crate::error::SinkError;
use crate::frame::{OutputFrame, SinkFormat};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam::channel::{bounded, Receiver, Sender};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Widest encoded sample the callback handles (8 channels x 16 bit)
const MAX_SAMPLE_BYTES: usize = 16;

/// Requested output plus the queue geometry
#[derive(Debug, Clone, Copy)]
pub struct DeviceConfig {
    pub format: SinkFormat,
    pub frame_samples: usize,
    pub high_water_frames: usize,
    pub low_water_frames: usize,
}

/// Keeps the cpal stream alive. Stays on the thread that opened it.
pub struct DeviceStream {
    _stream: cpal::Stream,
}

pub struct CpalSink {
    format: SinkFormat,
    producer: HeapProd<u8>,
    high_water_bytes: usize,
    low_water_bytes: usize,
    /// Bytes ever pushed
    written: u64,
    /// Stream position before which queued bytes are stale
    discard_until: Arc<AtomicU64>,
    /// Bytes the callback has played or skipped
    consumed: Arc<AtomicU64>,
    underruns: Arc<AtomicU64>,
    reported_underruns: u64,
    errors: Receiver<String>,
    failure: Option<String>,
    signal: DrainSignal,
}

impl CpalSink {
    /// Open the default output device.
    ///
    /// If the device cannot run at the requested sample rate it is opened at
    /// its default rate instead; the returned sink's `format()` reports the
    /// rate actually in use.
    pub fn open(config: &DeviceConfig) -> Result<(CpalSink, DeviceStream), SinkError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(SinkError::NoDevice)?;
        let supported = choose_config(&device, config.format)?;

        let mut format = config.format;
        format.sample_rate = supported.sample_rate().0;
        if format.sample_rate != config.format.sample_rate {
            warn!(
                requested = config.format.sample_rate,
                actual = format.sample_rate,
                "output device does not support the requested rate"
            );
        }
        let device_channels = supported.channels() as usize;

        info!(
            device = %device.name().unwrap_or_else(|_| "unknown".to_string()),
            sample_rate = format.sample_rate,
            channels = device_channels,
            sample_format = ?supported.sample_format(),
            "audio output opened"
        );

        let (sink, callback, error_tx) = split_queue(format, device_channels, config);
        let err_fn = move |err: cpal::StreamError| {
            let _ = error_tx.try_send(err.to_string());
        };

        let stream_config: cpal::StreamConfig = supported.config();
        let stream = match supported.sample_format() {
            cpal::SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, callback, err_fn),
            cpal::SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, callback, err_fn),
            cpal::SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, callback, err_fn),
            other => return Err(SinkError::UnsupportedFormat(format!("{other:?}"))),
        }
        .map_err(|e| SinkError::Device(e.to_string()))?;

        stream
            .play()
            .map_err(|e| SinkError::Device(e.to_string()))?;

        Ok((sink, DeviceStream { _stream: stream }))
    }

    /// Callbacks that found the queue empty
    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }

    /// Bytes queued for playback, not counting what a reset marked stale.
    fn live_bytes(&self) -> usize {
        let consumed = self.consumed.load(Ordering::Acquire);
        let start = consumed.max(self.discard_until.load(Ordering::Acquire));
        usize::try_from(self.written.saturating_sub(start)).unwrap_or(usize::MAX)
    }

    fn check(&mut self) -> Result<(), SinkError> {
        if self.failure.is_none() {
            if let Ok(message) = self.errors.try_recv() {
                self.failure = Some(message);
            }
        }
        match &self.failure {
            Some(message) => Err(SinkError::Device(message.clone())),
            None => Ok(()),
        }
    }
}

impl AudioSink for CpalSink {
    fn format(&self) -> SinkFormat {
        self.format
    }

    fn write(&mut self, frame: &OutputFrame) -> Result<WriteOutcome, SinkError> {
        self.check()?;
        let bytes = frame.bytes();
        if self.producer.vacant_len() < bytes.len() {
            return Ok(WriteOutcome::Rejected);
        }
        let pushed = self.producer.push_slice(bytes);
        self.written += pushed as u64;

        if self.live_bytes() >= self.high_water_bytes {
            Ok(WriteOutcome::Backpressure)
        } else {
            Ok(WriteOutcome::Accepted)
        }
    }

    fn poll_drained(&mut self) -> Result<bool, SinkError> {
        self.check()?;
        let underruns = self.underruns();
        if underruns > self.reported_underruns {
            debug!(
                underruns = underruns - self.reported_underruns,
                "output underrun, played silence"
            );
            self.reported_underruns = underruns;
        }
        Ok(self.live_bytes() <= self.low_water_bytes)
    }

    fn drain_signal(&self) -> DrainSignal {
        self.signal.clone()
    }

    /// Only the callback can pop, so this marks the current stream position
    /// and the callback skips up to it. Frames written after the reset play.
    fn reset(&mut self) -> Result<(), SinkError> {
        self.discard_until.store(self.written, Ordering::Release);
        Ok(())
    }
}

/// Everything the device callback owns
struct CallbackState {
    format: SinkFormat,
    consumer: HeapCons<u8>,
    device_channels: usize,
    low_water_bytes: usize,
    notifier: DrainNotifier,
    discard_until: Arc<AtomicU64>,
    consumed: Arc<AtomicU64>,
    underruns: Arc<AtomicU64>,
}

impl CallbackState {
    #[inline]
    fn fill<T>(&mut self, data: &mut [T])
    where
        T: cpal::SizedSample + cpal::FromSample<f32>,
    {
        let mut consumed = self.consumed.load(Ordering::Relaxed);
        let stale = self
            .discard_until
            .load(Ordering::Acquire)
            .saturating_sub(consumed);
        if stale > 0 {
            let skipped = self
                .consumer
                .skip(usize::try_from(stale).unwrap_or(usize::MAX));
            consumed += skipped as u64;
        }

        let width = self.format.bytes_per_frame();
        let mut sample = [0u8; MAX_SAMPLE_BYTES];
        let mut starved = false;

        for out in data.chunks_mut(self.device_channels) {
            let value = if self.consumer.occupied_len() >= width {
                self.consumer.pop_slice(&mut sample[..width]);
                consumed += width as u64;
                // Every format channel carries the same sample
                self.format.decode(&sample[..width])
            } else {
                starved = true;
                0.0
            };
            for channel in out.iter_mut() {
                *channel = T::from_sample(value);
            }
        }

        self.consumed.store(consumed, Ordering::Release);

        if starved {
            self.underruns.fetch_add(1, Ordering::Relaxed);
        }
        if self.consumer.occupied_len() <= self.low_water_bytes {
            self.notifier.notify();
        }
    }
}

/// Build the ring and hand its two ends to the writer and the callback.
fn split_queue(
    format: SinkFormat,
    device_channels: usize,
    config: &DeviceConfig,
) -> (CpalSink, CallbackState, Sender<String>) {
    let frame_bytes = config.frame_samples * format.bytes_per_frame();
    let ring = HeapRb::<u8>::new((config.high_water_frames + 1) * frame_bytes);
    let (producer, consumer) = ring.split();

    let (notifier, signal) = DrainSignal::channel();
    let (error_tx, errors) = bounded::<String>(1);
    let discard_until = Arc::new(AtomicU64::new(0));
    let consumed = Arc::new(AtomicU64::new(0));
    let underruns = Arc::new(AtomicU64::new(0));

    let callback = CallbackState {
        format,
        consumer,
        device_channels,
        low_water_bytes: config.low_water_frames * frame_bytes,
        notifier,
        discard_until: discard_until.clone(),
        consumed: consumed.clone(),
        underruns: underruns.clone(),
    };
    let sink = CpalSink {
        format,
        producer,
        high_water_bytes: config.high_water_frames * frame_bytes,
        low_water_bytes: config.low_water_frames * frame_bytes,
        written: 0,
        discard_until,
        consumed,
        underruns,
        reported_underruns: 0,
        errors,
        failure: None,
        signal,
    };
    (sink, callback, error_tx)
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut state: CallbackState,
    err_fn: impl FnMut(cpal::StreamError) + Send + 'static,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| state.fill(data),
        err_fn,
        None,
    )
}

/// Prefer a config running at the requested rate with the requested
/// channel count, then any channel count, then the device default.
fn choose_config(
    device: &cpal::Device,
    format: SinkFormat,
) -> Result<cpal::SupportedStreamConfig, SinkError> {
    let rate = cpal::SampleRate(format.sample_rate);
    let playable = |f: cpal::SampleFormat| {
        matches!(
            f,
            cpal::SampleFormat::F32 | cpal::SampleFormat::I16 | cpal::SampleFormat::U16
        )
    };

    let ranges: Vec<cpal::SupportedStreamConfigRange> = match device.supported_output_configs() {
        Ok(ranges) => ranges
            .filter(|r| playable(r.sample_format()))
            .filter(|r| r.min_sample_rate() <= rate && rate <= r.max_sample_rate())
            .collect(),
        Err(e) => {
            warn!("cannot list output configs: {e}");
            Vec::new()
        }
    };

    let chosen = ranges
        .iter()
        .find(|r| r.channels() == format.channels)
        .or_else(|| ranges.first());
    if let Some(range) = chosen {
        return Ok(range.clone().with_sample_rate(rate));
    }

    device
        .default_output_config()
        .map_err(|e| SinkError::Device(e.to_string()))
}
