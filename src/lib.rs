//! # bytebeat - live bytebeat renderer
//!
//! Plays a one-line integer formula of the time index `t` as 8-bit audio
//! and hot-swaps it whenever its source file changes, without stopping the
//! sound.
//!
//! ## Pieces
//!
//! - [`formula`]: compiles source text into an immutable [`formula::Program`]
//! - [`slot::FormulaSlot`]: lock-free hot-swap of the loaded program
//! - [`clock::SampleClock`]: maps output sample ordinals to logical time
//! - [`scheduler`]: renders frames and paces against sink backpressure
//! - [`sink`]: the sound card (cpal), WAV files (hound) and an in-memory queue
//! - [`live`] / [`render`]: the two front ends
//!
//! ## Quick Start
//!
//! ```rust
//! use bytebeat::formula::{BytebeatCompiler, Program, ProgramCompiler};
//!
//! let formula = BytebeatCompiler.compile("t*(t>>5|t>>8)").unwrap();
//! let amplitude = (formula.evaluate(1000).unwrap() & 0xFF) as u8;
//! assert_eq!(amplitude, (31000 % 256) as u8);
//! ```
//!
//! Driving the scheduler by hand against an in-memory sink:
//!
//! ```rust
//! use bytebeat::clock::SampleClock;
//! use bytebeat::formula::BytebeatCompiler;
//! use bytebeat::frame::{BitDepth, SinkFormat};
//! use bytebeat::scheduler::{RenderLoop, RenderSession, SchedulerConfig};
//! use bytebeat::sink::{MemorySink, SharedSink};
//! use bytebeat::slot::FormulaSlot;
//! use std::sync::Arc;
//!
//! let format = SinkFormat { sample_rate: 8000, channels: 1, bit_depth: BitDepth::Eight, signed: false };
//! let slot = Arc::new(FormulaSlot::new(BytebeatCompiler));
//! slot.try_compile_and_swap("t & 255");
//!
//! let sink = Arc::new(SharedSink::new(MemorySink::unbounded(format)));
//! let clock = SampleClock::new(8000, 8000).unwrap();
//! let config = SchedulerConfig { frame_samples: 256, ..SchedulerConfig::default() };
//! let mut render_loop = RenderLoop::new(slot, sink.clone(), RenderSession::new(sink.live_marker(), clock), config);
//!
//! render_loop.step().unwrap(); // program found
//! render_loop.step().unwrap(); // one frame written
//! let bytes = sink.with_sink(|s| s.all_bytes()).unwrap();
//! assert_eq!(bytes, (0..=255).collect::<Vec<u8>>());
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod faults;
pub mod formula;
pub mod frame;
pub mod live;
pub mod render;
pub mod scheduler;
pub mod sink;
pub mod slot;
pub mod watch;

pub use clock::SampleClock;
pub use config::LiveConfig;
pub use error::{CompileError, EvalError, LiveError, SinkError};
pub use formula::{BytebeatCompiler, Program, ProgramCompiler};
pub use scheduler::{LoopState, RenderLoop, SchedulerHandle};
pub use slot::{FormulaSlot, SwapOutcome};
