//! In-memory sink with a bounded frame queue
//!
//! Nothing plays on its own: frames leave the queue only when [`MemorySink::drain`]
//! is called. Used to drive the scheduler deterministically and for
//! benchmarking.

use super::{AudioSink, DrainNotifier, DrainSignal, WriteOutcome};
use crate::error::SinkError;
use crate::frame::{OutputFrame, SinkFormat};
use std::collections::VecDeque;

/// One accepted write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRecord {
    pub first_ordinal: u64,
    pub samples: usize,
    pub generation: u64,
}

pub struct MemorySink {
    format: SinkFormat,
    capacity_frames: usize,
    high_water_frames: usize,
    low_water_frames: usize,
    queued: VecDeque<Vec<u8>>,
    played: Vec<u8>,
    written: Vec<FrameRecord>,
    rejected: usize,
    resets: usize,
    failure: Option<String>,
    notifier: DrainNotifier,
    signal: DrainSignal,
}

impl MemorySink {
    pub fn new(
        format: SinkFormat,
        capacity_frames: usize,
        high_water_frames: usize,
        low_water_frames: usize,
    ) -> Self {
        let (notifier, signal) = DrainSignal::channel();
        Self {
            format,
            capacity_frames,
            high_water_frames,
            low_water_frames,
            queued: VecDeque::new(),
            played: Vec::new(),
            written: Vec::new(),
            rejected: 0,
            resets: 0,
            failure: None,
            notifier,
            signal,
        }
    }

    /// A sink that never pushes back
    pub fn unbounded(format: SinkFormat) -> Self {
        Self::new(format, usize::MAX, usize::MAX, usize::MAX)
    }

    /// Play up to `frames` queued frames. Returns how many were played.
    pub fn drain(&mut self, frames: usize) -> usize {
        let mut played = 0;
        while played < frames {
            let Some(bytes) = self.queued.pop_front() else {
                break;
            };
            self.played.extend_from_slice(&bytes);
            played += 1;
        }
        if self.queued.len() <= self.low_water_frames {
            self.notifier.notify();
        }
        played
    }

    /// Forget played bytes and the write log, keeping the queue
    pub fn clear_history(&mut self) {
        self.played.clear();
        self.written.clear();
    }

    /// Make every following call fail as if the device died
    pub fn fail(&mut self, message: impl Into<String>) {
        self.failure = Some(message.into());
    }

    pub fn queued_frames(&self) -> usize {
        self.queued.len()
    }

    pub fn played(&self) -> &[u8] {
        &self.played
    }

    /// Played bytes followed by everything still queued
    pub fn all_bytes(&self) -> Vec<u8> {
        let mut bytes = self.played.clone();
        for frame in &self.queued {
            bytes.extend_from_slice(frame);
        }
        bytes
    }

    pub fn written(&self) -> &[FrameRecord] {
        &self.written
    }

    pub fn rejected(&self) -> usize {
        self.rejected
    }

    pub fn resets(&self) -> usize {
        self.resets
    }

    fn check(&self) -> Result<(), SinkError> {
        match &self.failure {
            Some(message) => Err(SinkError::Device(message.clone())),
            None => Ok(()),
        }
    }
}

impl AudioSink for MemorySink {
    fn format(&self) -> SinkFormat {
        self.format
    }

    fn write(&mut self, frame: &OutputFrame) -> Result<WriteOutcome, SinkError> {
        self.check()?;
        if self.queued.len() >= self.capacity_frames {
            self.rejected += 1;
            return Ok(WriteOutcome::Rejected);
        }

        self.queued.push_back(frame.bytes().to_vec());
        self.written.push(FrameRecord {
            first_ordinal: frame.first_ordinal(),
            samples: frame.samples(),
            generation: frame.generation(),
        });

        if self.queued.len() >= self.high_water_frames {
            Ok(WriteOutcome::Backpressure)
        } else {
            Ok(WriteOutcome::Accepted)
        }
    }

    fn poll_drained(&mut self) -> Result<bool, SinkError> {
        self.check()?;
        Ok(self.queued.len() <= self.low_water_frames)
    }

    fn drain_signal(&self) -> DrainSignal {
        self.signal.clone()
    }

    fn reset(&mut self) -> Result<(), SinkError> {
        self.queued.clear();
        self.resets += 1;
        self.notifier.notify();
        Ok(())
    }
}
