//! Audio sinks
//!
//! A sink is a bounded, byte-oriented queue in front of an output. Writes
//! report whether the frame was queued and whether the queue has reached
//! its high-water mark; the sink raises a drain signal once it has played
//! down to its low-water mark.
//!
//! [`SharedSink`] wraps a sink together with the live session marker. The
//! marker check and the write happen under one lock, and a session restart
//! bumps the marker under the same lock, so a loop that has been superseded
//! can never write again.

pub mod device;
pub mod memory;
pub mod wav;

pub use device::{CpalSink, DeviceConfig, DeviceStream};
pub use memory::{FrameRecord, MemorySink};
pub use wav::WavSink;

use crate::error::SinkError;
use crate::frame::{OutputFrame, SinkFormat};
use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Result of handing a frame to a sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Queued, capacity remains
    Accepted,
    /// Queued, but the queue is at or above its high-water mark
    Backpressure,
    /// Not queued; the same frame must be written again after a drain
    Rejected,
}

/// Raising side of the drain signal, owned by the sink
#[derive(Debug, Clone)]
pub struct DrainNotifier {
    tx: Sender<()>,
}

impl DrainNotifier {
    /// Never blocks; safe to call from an audio callback.
    #[inline]
    pub fn notify(&self) {
        let _ = self.tx.try_send(());
    }
}

/// Waiting side of the drain signal
#[derive(Debug, Clone)]
pub struct DrainSignal {
    rx: Receiver<()>,
}

impl DrainSignal {
    pub fn channel() -> (DrainNotifier, DrainSignal) {
        let (tx, rx) = bounded(1);
        (DrainNotifier { tx }, DrainSignal { rx })
    }

    /// Block until notified or `timeout` elapses. Returns true if notified.
    pub fn wait(&self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(()) => true,
            Err(RecvTimeoutError::Timeout) => false,
            // Sink gone; let the caller re-poll instead of spinning here
            Err(RecvTimeoutError::Disconnected) => {
                std::thread::sleep(timeout);
                false
            }
        }
    }
}

pub trait AudioSink: Send + 'static {
    /// The fixed format frames must be encoded in
    fn format(&self) -> SinkFormat;

    fn write(&mut self, frame: &OutputFrame) -> Result<WriteOutcome, SinkError>;

    /// True once the queue is at or below its low-water mark
    fn poll_drained(&mut self) -> Result<bool, SinkError>;

    fn drain_signal(&self) -> DrainSignal;

    /// Drop everything queued but not yet played
    fn reset(&mut self) -> Result<(), SinkError>;
}

/// A sink shared between render loops, gated by the live session marker
pub struct SharedSink<S> {
    sink: Mutex<S>,
    live_marker: AtomicU64,
    drain: DrainSignal,
    format: SinkFormat,
}

impl<S: AudioSink> SharedSink<S> {
    /// The first session marker is 1.
    pub fn new(sink: S) -> Self {
        let drain = sink.drain_signal();
        let format = sink.format();
        Self {
            sink: Mutex::new(sink),
            live_marker: AtomicU64::new(1),
            drain,
            format,
        }
    }

    pub fn format(&self) -> SinkFormat {
        self.format
    }

    pub fn live_marker(&self) -> u64 {
        self.live_marker.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn is_live(&self, marker: u64) -> bool {
        self.live_marker() == marker
    }

    fn lock(&self) -> Result<MutexGuard<'_, S>, SinkError> {
        self.sink.lock().map_err(|_| SinkError::Poisoned)
    }

    /// Write `frame` only if `marker` is still the live session.
    /// Returns `None` when the caller has been superseded.
    pub fn write_if_live(
        &self,
        marker: u64,
        frame: &OutputFrame,
    ) -> Result<Option<WriteOutcome>, SinkError> {
        let mut sink = self.lock()?;
        if !self.is_live(marker) {
            return Ok(None);
        }
        sink.write(frame).map(Some)
    }

    pub fn poll_drained(&self) -> Result<bool, SinkError> {
        self.lock()?.poll_drained()
    }

    pub fn wait_drained(&self, timeout: Duration) -> bool {
        self.drain.wait(timeout)
    }

    /// Invalidate the live session and return the new marker.
    /// With `reset`, queued audio is dropped under the same lock.
    pub fn advance_marker(&self, reset: bool) -> Result<u64, SinkError> {
        let mut sink = self.lock()?;
        let marker = self.live_marker.fetch_add(1, Ordering::SeqCst) + 1;
        if reset {
            sink.reset()?;
        }
        Ok(marker)
    }

    /// Drop queued audio without superseding the live loop. Frames written
    /// afterwards keep their ordinals.
    pub fn flush(&self) -> Result<(), SinkError> {
        let mut sink = self.lock()?;
        sink.reset()
    }

    pub fn with_sink<R>(&self, f: impl FnOnce(&mut S) -> R) -> Result<R, SinkError> {
        let mut sink = self.lock()?;
        Ok(f(&mut sink))
    }
}
