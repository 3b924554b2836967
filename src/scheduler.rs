//! Render scheduler
//!
//! A [`RenderLoop`] turns the loaded program into fixed-size frames and
//! paces itself against the sink:
//!
//! ```text
//!   WaitingForProgram --program loaded--> Producing
//!   Producing --Accepted--> Producing
//!   Producing --Backpressure / Rejected--> Draining
//!   Draining --below low water--> Producing
//!   any --marker superseded--> Stale (terminal)
//! ```
//!
//! The program is snapshotted once per frame, so a swap is heard from the
//! next frame on. A frame the sink rejected is kept and written again, as
//! is, before anything new is rendered.
//!
//! [`SchedulerHandle`] runs loops on their own threads and owns session
//! restarts.

use crate::clock::SampleClock;
use crate::error::{LiveError, SinkError};
use crate::faults::FaultLog;
use crate::formula::{Program, ProgramCompiler};
use crate::frame::{OutputFrame, SinkFormat, SILENCE};
use crate::sink::{AudioSink, SharedSink, WriteOutcome};
use crate::slot::{FormulaSlot, LoadedProgram};
use crossbeam::channel::{unbounded, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    WaitingForProgram,
    Producing,
    Draining,
    Stale,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Samples per frame
    pub frame_samples: usize,
    /// Sleep between checks while no program is loaded
    pub program_poll: Duration,
    /// Longest single wait for the drain signal
    pub drain_poll: Duration,
    /// Faults per session logged individually
    pub eval_error_report_limit: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            frame_samples: 1024,
            program_poll: Duration::from_millis(100),
            drain_poll: Duration::from_millis(20),
            eval_error_report_limit: 8,
        }
    }
}

/// Position of one render loop in its session
#[derive(Debug, Clone, Copy)]
pub struct RenderSession {
    marker: u64,
    physical_ordinal: u64,
    clock: SampleClock,
}

impl RenderSession {
    /// A fresh session starting at ordinal 0
    pub fn new(marker: u64, clock: SampleClock) -> Self {
        Self {
            marker,
            physical_ordinal: 0,
            clock,
        }
    }

    pub fn marker(&self) -> u64 {
        self.marker
    }

    /// Ordinal of the next sample to be rendered
    pub fn physical_ordinal(&self) -> u64 {
        self.physical_ordinal
    }

    pub fn clock(&self) -> SampleClock {
        self.clock
    }
}

pub struct RenderLoop<C: ProgramCompiler, S: AudioSink> {
    slot: Arc<FormulaSlot<C>>,
    sink: Arc<SharedSink<S>>,
    session: RenderSession,
    config: SchedulerConfig,
    format: SinkFormat,
    frame: OutputFrame,
    // The frame buffer holds a rejected frame that must go out first
    pending: bool,
    state: LoopState,
    faults: FaultLog,
    frames_written: u64,
}

impl<C: ProgramCompiler, S: AudioSink> RenderLoop<C, S> {
    pub fn new(
        slot: Arc<FormulaSlot<C>>,
        sink: Arc<SharedSink<S>>,
        session: RenderSession,
        config: SchedulerConfig,
    ) -> Self {
        let format = sink.format();
        let frame = OutputFrame::with_capacity(&format, config.frame_samples);
        let faults = FaultLog::new(config.eval_error_report_limit, format.sample_rate as u64);
        Self {
            slot,
            sink,
            session,
            config,
            format,
            frame,
            pending: false,
            state: LoopState::WaitingForProgram,
            faults,
            frames_written: 0,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn session(&self) -> &RenderSession {
        &self.session
    }

    pub fn faults(&self) -> &FaultLog {
        &self.faults
    }

    /// Frames the sink has queued from this loop
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Perform one transition and return the new state.
    pub fn step(&mut self) -> Result<LoopState, SinkError> {
        let next = if self.state != LoopState::Stale && !self.sink.is_live(self.session.marker) {
            LoopState::Stale
        } else {
            match self.state {
                LoopState::WaitingForProgram => self.wait_for_program(),
                LoopState::Producing => self.produce()?,
                LoopState::Draining => self.drain()?,
                LoopState::Stale => LoopState::Stale,
            }
        };

        if next != self.state {
            debug!(
                marker = self.session.marker,
                ordinal = self.session.physical_ordinal,
                from = ?self.state,
                to = ?next,
                "render loop transition"
            );
            self.state = next;
        }
        Ok(next)
    }

    /// Step until the loop goes stale or the sink fails.
    pub fn run(mut self) -> Result<(), SinkError> {
        while self.step()? != LoopState::Stale {}
        Ok(())
    }

    fn wait_for_program(&self) -> LoopState {
        if self.slot.snapshot().is_some() {
            LoopState::Producing
        } else {
            thread::sleep(self.config.program_poll);
            LoopState::WaitingForProgram
        }
    }

    fn produce(&mut self) -> Result<LoopState, SinkError> {
        if !self.pending {
            let Some(loaded) = self.slot.snapshot() else {
                return Ok(LoopState::WaitingForProgram);
            };
            self.render_frame(&loaded);
        }

        let outcome = match self.sink.write_if_live(self.session.marker, &self.frame)? {
            Some(outcome) => outcome,
            None => return Ok(LoopState::Stale),
        };

        Ok(match outcome {
            WriteOutcome::Accepted => {
                self.pending = false;
                self.frames_written += 1;
                LoopState::Producing
            }
            WriteOutcome::Backpressure => {
                self.pending = false;
                self.frames_written += 1;
                LoopState::Draining
            }
            WriteOutcome::Rejected => {
                self.pending = true;
                LoopState::Draining
            }
        })
    }

    fn render_frame(&mut self, loaded: &LoadedProgram<C::Program>) {
        self.frame.begin(self.session.physical_ordinal, loaded.generation);
        for _ in 0..self.config.frame_samples {
            let ordinal = self.session.physical_ordinal;
            let t = self.session.clock.logical_time(ordinal);
            self.session.physical_ordinal += 1;

            let amplitude = match loaded.program.evaluate(t) {
                Ok(value) => (value & 0xFF) as u8,
                Err(e) => {
                    self.faults.record(ordinal, t, loaded.generation, &e);
                    SILENCE
                }
            };
            self.frame.push(&self.format, amplitude);
        }
        self.faults.maybe_summarize(self.session.physical_ordinal);
    }

    fn drain(&mut self) -> Result<LoopState, SinkError> {
        if self.sink.poll_drained()? {
            return Ok(LoopState::Producing);
        }
        // Bounded so a superseded loop notices within one poll
        self.sink.wait_drained(self.config.drain_poll);
        if self.sink.poll_drained()? {
            Ok(LoopState::Producing)
        } else {
            Ok(LoopState::Draining)
        }
    }
}

/// How a threaded loop ended
#[derive(Debug)]
pub struct LoopExit {
    pub marker: u64,
    pub result: Result<(), SinkError>,
}

/// Owns the render threads of one sink
pub struct SchedulerHandle<C: ProgramCompiler, S: AudioSink> {
    slot: Arc<FormulaSlot<C>>,
    sink: Arc<SharedSink<S>>,
    clock: SampleClock,
    config: SchedulerConfig,
    exit_tx: Sender<LoopExit>,
    exit_rx: Receiver<LoopExit>,
    threads: Vec<JoinHandle<()>>,
}

impl<C: ProgramCompiler, S: AudioSink> SchedulerHandle<C, S> {
    /// Start the first loop under the sink's current marker.
    pub fn spawn(
        slot: Arc<FormulaSlot<C>>,
        sink: Arc<SharedSink<S>>,
        clock: SampleClock,
        config: SchedulerConfig,
    ) -> Result<Self, SinkError> {
        let (exit_tx, exit_rx) = unbounded();
        let mut handle = Self {
            slot,
            sink,
            clock,
            config,
            exit_tx,
            exit_rx,
            threads: Vec::new(),
        };
        let marker = handle.sink.live_marker();
        handle.start_loop(marker)?;
        Ok(handle)
    }

    fn start_loop(&mut self, marker: u64) -> Result<(), SinkError> {
        let render_loop = RenderLoop::new(
            self.slot.clone(),
            self.sink.clone(),
            RenderSession::new(marker, self.clock),
            self.config.clone(),
        );
        let exit_tx = self.exit_tx.clone();

        let thread = thread::Builder::new()
            .name(format!("render-{marker}"))
            .spawn(move || {
                let result = render_loop.run();
                if let Err(e) = &result {
                    error!(marker, "render loop stopped: {e}");
                }
                let _ = exit_tx.send(LoopExit { marker, result });
            })?;

        self.threads.retain(|t| !t.is_finished());
        self.threads.push(thread);
        Ok(())
    }

    /// Supersede the live loop, drop queued audio and start over at ordinal 0.
    pub fn restart(&mut self) -> Result<u64, SinkError> {
        let marker = self.sink.advance_marker(true)?;
        self.start_loop(marker)?;
        info!(marker, "render session restarted");
        Ok(marker)
    }

    /// Drop queued audio and let the live loop carry on from its ordinal.
    pub fn flush(&self) -> Result<(), SinkError> {
        self.sink.flush()?;
        debug!(marker = self.live_marker(), "queued audio flushed");
        Ok(())
    }

    pub fn live_marker(&self) -> u64 {
        self.sink.live_marker()
    }

    /// Exit reports of every loop started by this handle
    pub fn exits(&self) -> &Receiver<LoopExit> {
        &self.exit_rx
    }

    pub fn sink(&self) -> &Arc<SharedSink<S>> {
        &self.sink
    }

    /// Supersede the live loop without starting another and wait for all
    /// render threads to finish.
    pub fn shutdown(mut self) -> Result<(), LiveError> {
        self.sink.advance_marker(false)?;
        for thread in self.threads.drain(..) {
            thread.join().map_err(|_| LiveError::LoopPanicked)?;
        }
        Ok(())
    }
}
