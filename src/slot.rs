//! Hot-swappable program slot
//!
//! The reload path compiles new source and publishes the result as one
//! immutable [`LoadedProgram`]; the render loop takes a lock-free snapshot
//! once per frame and keeps using it for the whole frame. A failed compile
//! leaves the published program untouched.

use crate::error::CompileError;
use crate::formula::ProgramCompiler;
use arc_swap::ArcSwapOption;
use std::sync::{Arc, Mutex};

/// One published program version
#[derive(Debug)]
pub struct LoadedProgram<P> {
    pub generation: u64,
    pub program: P,
    pub fingerprint: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SwapOutcome {
    Swapped { generation: u64 },
    Unchanged,
    Failed(CompileError),
}

pub struct FormulaSlot<C: ProgramCompiler> {
    compiler: C,
    current: ArcSwapOption<LoadedProgram<C::Program>>,
    // Serializes writers; readers never touch it
    writer: Mutex<()>,
}

impl<C: ProgramCompiler> FormulaSlot<C> {
    pub fn new(compiler: C) -> Self {
        Self {
            compiler,
            current: ArcSwapOption::new(None),
            writer: Mutex::new(()),
        }
    }

    /// Compile `source` and publish it if it differs from the loaded text.
    pub fn try_compile_and_swap(&self, source: &str) -> SwapOutcome {
        let source = source.trim();
        if source.is_empty() {
            return SwapOutcome::Unchanged;
        }

        let _guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());

        let previous = self.current.load_full();
        if let Some(loaded) = previous.as_deref() {
            if loaded.fingerprint == source {
                return SwapOutcome::Unchanged;
            }
        }

        match self.compiler.compile(source) {
            Ok(program) => {
                let generation = previous.as_ref().map_or(0, |p| p.generation) + 1;
                self.current.store(Some(Arc::new(LoadedProgram {
                    generation,
                    program,
                    fingerprint: source.to_string(),
                })));
                SwapOutcome::Swapped { generation }
            }
            Err(e) => SwapOutcome::Failed(e),
        }
    }

    /// Current program, if any has been loaded.
    #[inline]
    pub fn snapshot(&self) -> Option<Arc<LoadedProgram<C::Program>>> {
        self.current.load_full()
    }

    /// Generation of the loaded program, 0 before the first load.
    pub fn generation(&self) -> u64 {
        match &*self.current.load() {
            Some(loaded) => loaded.generation,
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::{BytebeatCompiler, Program};

    #[test]
    fn test_starts_empty() {
        let slot = FormulaSlot::new(BytebeatCompiler);
        assert!(slot.snapshot().is_none());
        assert_eq!(slot.generation(), 0);
    }

    #[test]
    fn test_swap_increments_generation() {
        let slot = FormulaSlot::new(BytebeatCompiler);
        assert_eq!(
            slot.try_compile_and_swap("t"),
            SwapOutcome::Swapped { generation: 1 }
        );
        assert_eq!(
            slot.try_compile_and_swap("t>>1"),
            SwapOutcome::Swapped { generation: 2 }
        );
        assert_eq!(slot.generation(), 2);
    }

    #[test]
    fn test_identical_source_is_unchanged() {
        let slot = FormulaSlot::new(BytebeatCompiler);
        slot.try_compile_and_swap("t & 255");
        let before = slot.snapshot().unwrap();

        // surrounding whitespace does not count as an edit
        assert_eq!(
            slot.try_compile_and_swap("  t & 255\n"),
            SwapOutcome::Unchanged
        );
        let after = slot.snapshot().unwrap();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(slot.generation(), 1);
    }

    #[test]
    fn test_empty_source_is_unchanged() {
        let slot = FormulaSlot::new(BytebeatCompiler);
        assert_eq!(slot.try_compile_and_swap("   \n"), SwapOutcome::Unchanged);
        assert!(slot.snapshot().is_none());
    }

    #[test]
    fn test_failed_compile_keeps_previous_program() {
        let slot = FormulaSlot::new(BytebeatCompiler);
        slot.try_compile_and_swap("t * 2");

        let outcome = slot.try_compile_and_swap("t * (");
        assert!(matches!(outcome, SwapOutcome::Failed(CompileError::Syntax { .. })));

        let loaded = slot.snapshot().unwrap();
        assert_eq!(loaded.generation, 1);
        assert_eq!(loaded.fingerprint, "t * 2");
        assert_eq!(loaded.program.evaluate(3).unwrap(), 6);
    }

    #[test]
    fn test_reader_snapshot_survives_swap() {
        let slot = FormulaSlot::new(BytebeatCompiler);
        slot.try_compile_and_swap("1");
        let held = slot.snapshot().unwrap();
        slot.try_compile_and_swap("2");

        assert_eq!(held.program.evaluate(0).unwrap(), 1);
        assert_eq!(slot.snapshot().unwrap().program.evaluate(0).unwrap(), 2);
    }
}
