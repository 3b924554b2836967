//! Offline rendering
//!
//! Drives the same [`RenderLoop`] the live player uses, one step at a time,
//! into a WAV file. Output is rounded up to whole frames.

use crate::config::LiveConfig;
use crate::error::{CompileError, ConfigError, LiveError, LiveResult};
use crate::formula::BytebeatCompiler;
use crate::scheduler::{LoopState, RenderLoop, RenderSession};
use crate::sink::{SharedSink, WavSink};
use crate::slot::{FormulaSlot, SwapOutcome};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Statistics about a finished render
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSummary {
    /// Samples per channel written
    pub samples: u64,
    pub frames: u64,
    pub eval_faults: u64,
    pub duration_secs: f64,
}

/// Render `seconds` of the formula in `source_path` to `output`.
pub fn render_to_wav(
    source_path: &Path,
    output: &Path,
    config: &LiveConfig,
    seconds: f64,
) -> LiveResult<RenderSummary> {
    config.validate()?;
    let source = fs::read_to_string(source_path).map_err(|source| LiveError::Io {
        path: source_path.to_path_buf(),
        source,
    })?;
    render_source_to_wav(&source, output, config, seconds)
}

/// Render formula text directly.
pub fn render_source_to_wav(
    source: &str,
    output: &Path,
    config: &LiveConfig,
    seconds: f64,
) -> LiveResult<RenderSummary> {
    config.validate()?;
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(ConfigError::Invalid(format!(
            "render duration must be a positive number of seconds, got {seconds}"
        ))
        .into());
    }
    let slot = Arc::new(FormulaSlot::new(BytebeatCompiler));
    match slot.try_compile_and_swap(source) {
        SwapOutcome::Failed(e) => return Err(e.into()),
        SwapOutcome::Unchanged => {
            return Err(CompileError::Syntax {
                line: 1,
                column: 1,
                message: "empty formula".to_string(),
            }
            .into())
        }
        SwapOutcome::Swapped { .. } => {}
    }

    let format = config.sink_format()?;
    let clock = config.clock(format.sample_rate)?;
    let sink = Arc::new(SharedSink::new(WavSink::create(output, format)?));
    let session = RenderSession::new(sink.live_marker(), clock);
    let mut render_loop =
        RenderLoop::new(slot, sink.clone(), session, config.scheduler_config());

    let target = (seconds * format.sample_rate as f64).ceil() as u64;
    while render_loop.session().physical_ordinal() < target {
        if render_loop.step()? == LoopState::Stale {
            break;
        }
    }

    let samples = render_loop.session().physical_ordinal();
    let summary = RenderSummary {
        samples,
        frames: render_loop.frames_written(),
        eval_faults: render_loop.faults().total(),
        duration_secs: samples as f64 / format.sample_rate as f64,
    };
    drop(render_loop);
    sink.with_sink(|wav| wav.finish())??;

    info!(
        frames = summary.frames,
        eval_faults = summary.eval_faults,
        "rendered {:.2}s to {}",
        summary.duration_secs,
        output.display()
    );
    Ok(summary)
}
