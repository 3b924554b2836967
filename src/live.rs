//! Live mode
//!
//! Plays a formula file through the sound card and hot-swaps it whenever
//! the file changes. The render loop runs on its own thread; this thread
//! only reloads the program and watches for the loop dying.

use crate::config::LiveConfig;
use crate::error::{LiveError, LiveResult, SinkError, WatchError};
use crate::formula::{BytebeatCompiler, ProgramCompiler};
use crate::scheduler::{LoopExit, SchedulerHandle};
use crate::sink::{AudioSink, CpalSink, SharedSink};
use crate::slot::{FormulaSlot, SwapOutcome};
use crate::watch::ReloadWatcher;
use crossbeam::channel::select;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Written to a formula file that does not exist yet
pub const DEFAULT_FORMULA: &str = "t*(t>>5|t>>8)\n";

/// Create `path` with [`DEFAULT_FORMULA`] if it is missing.
pub fn ensure_formula_file(path: &Path) -> LiveResult<()> {
    if path.exists() {
        return Ok(());
    }
    fs::write(path, DEFAULT_FORMULA).map_err(|source| LiveError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), "created formula file with a default formula");
    Ok(())
}

/// Read the formula file and offer it to the slot, logging the result.
/// An unreadable file is logged and leaves the slot as it was.
pub fn reload_from_disk<C: ProgramCompiler>(slot: &FormulaSlot<C>, path: &Path) -> SwapOutcome {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            error!(path = %path.display(), "cannot read formula file: {e}");
            return SwapOutcome::Unchanged;
        }
    };

    let outcome = slot.try_compile_and_swap(&source);
    match &outcome {
        SwapOutcome::Swapped { generation } => {
            info!(generation, "loaded {}", source.trim());
        }
        SwapOutcome::Unchanged => debug!("formula unchanged"),
        SwapOutcome::Failed(e) => {
            error!(path = %path.display(), "{e}; keeping the previous formula");
        }
    }
    outcome
}

/// What happens to queued audio and `t` once a new formula is swapped in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadAction {
    /// Queued audio of the old formula plays out, `t` keeps running
    Continue,
    /// Queued audio is dropped, `t` keeps running
    Flush,
    /// Queued audio is dropped and `t` starts over at 0
    Restart,
}

impl ReloadAction {
    pub fn from_config(config: &LiveConfig) -> Self {
        if config.reset_time_on_reload {
            ReloadAction::Restart
        } else if config.flush_on_reload {
            ReloadAction::Flush
        } else {
            ReloadAction::Continue
        }
    }
}

/// React to a change of the formula file: reload it and, on a successful
/// swap, apply `action` to the running session.
pub fn apply_change<C: ProgramCompiler, S: AudioSink>(
    slot: &FormulaSlot<C>,
    path: &Path,
    scheduler: &mut SchedulerHandle<C, S>,
    action: ReloadAction,
) -> Result<SwapOutcome, SinkError> {
    let outcome = reload_from_disk(slot, path);
    if matches!(outcome, SwapOutcome::Swapped { .. }) {
        match action {
            ReloadAction::Continue => {}
            ReloadAction::Flush => scheduler.flush()?,
            ReloadAction::Restart => {
                scheduler.restart()?;
            }
        }
    }
    Ok(outcome)
}

/// Run until the audio device fails or the watcher dies.
pub fn run_live(path: &Path, config: &LiveConfig) -> LiveResult<()> {
    config.validate()?;
    ensure_formula_file(path)?;

    let slot = Arc::new(FormulaSlot::new(BytebeatCompiler));
    reload_from_disk(&slot, path);

    let (sink, _stream) = CpalSink::open(&config.device_config()?)?;
    let format = sink.format();
    let clock = config.clock(format.sample_rate)?;
    info!(
        logical_rate = clock.logical_rate(),
        physical_rate = clock.physical_rate(),
        ratio = clock.ratio(),
        "playing {}",
        path.display()
    );

    let sink = Arc::new(SharedSink::new(sink));
    let mut scheduler =
        SchedulerHandle::spawn(slot.clone(), sink, clock, config.scheduler_config())?;

    let watcher = ReloadWatcher::new(path)?;
    let changes = watcher.events().clone();
    let exits = scheduler.exits().clone();
    let debounce = config.reload_debounce();
    let action = ReloadAction::from_config(config);

    loop {
        select! {
            recv(changes) -> change => {
                if change.is_err() {
                    return Err(WatchError::Disconnected.into());
                }
                let coalesced = watcher.settle(debounce);
                if coalesced > 0 {
                    debug!(coalesced, "coalesced change events");
                }
                apply_change(&slot, watcher.path(), &mut scheduler, action)?;
            }
            recv(exits) -> exit => {
                match exit {
                    Ok(LoopExit { marker, result: Err(e) }) if marker == scheduler.live_marker() => {
                        return Err(e.into());
                    }
                    Ok(LoopExit { marker, .. }) => debug!(marker, "render loop finished"),
                    Err(_) => return Err(LiveError::LoopPanicked),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gets_default_formula() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("beat.js");
        ensure_formula_file(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), DEFAULT_FORMULA);

        fs::write(&path, "t>>2").unwrap();
        ensure_formula_file(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "t>>2");
    }

    #[test]
    fn test_reload_from_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("beat.js");
        let slot = FormulaSlot::new(BytebeatCompiler);

        fs::write(&path, "t & 63").unwrap();
        assert_eq!(
            reload_from_disk(&slot, &path),
            SwapOutcome::Swapped { generation: 1 }
        );
        assert_eq!(reload_from_disk(&slot, &path), SwapOutcome::Unchanged);

        fs::write(&path, "t & (").unwrap();
        assert!(matches!(
            reload_from_disk(&slot, &path),
            SwapOutcome::Failed(_)
        ));
        assert_eq!(slot.generation(), 1);

        fs::remove_file(&path).unwrap();
        assert_eq!(reload_from_disk(&slot, &path), SwapOutcome::Unchanged);
        assert_eq!(slot.generation(), 1);
    }

    #[test]
    fn test_reload_action_from_config() {
        let mut config = LiveConfig::default();
        assert_eq!(ReloadAction::from_config(&config), ReloadAction::Flush);

        config.flush_on_reload = false;
        assert_eq!(ReloadAction::from_config(&config), ReloadAction::Continue);

        config.reset_time_on_reload = true;
        assert_eq!(ReloadAction::from_config(&config), ReloadAction::Restart);
    }
}
