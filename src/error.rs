//! Error taxonomy for the live renderer
//!
//! Recoverable faults (`CompileError`, `EvalError`) are handled where they
//! occur and never unwind past the scheduler. `ConfigError` and `SinkError`
//! are fatal and propagate up to `main`.

use std::path::PathBuf;
use thiserror::Error;

/// Formula source could not be turned into a program.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("syntax error at line {line}:{column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },
    #[error("unknown identifier `{0}` (only `t` is defined)")]
    UnknownIdentifier(String),
    #[error("unknown function `{0}`")]
    UnknownFunction(String),
    #[error("`{name}` takes {expected} argument(s), got {found}")]
    Arity {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("formula too complex: {0}")]
    TooComplex(String),
}

/// A single sample could not be evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum EvalError {
    #[error("result is not a finite number ({value})")]
    NonFinite { value: f64 },
}

/// The audio output failed. Fatal to the render loop.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("no audio output device available")]
    NoDevice,
    #[error("audio device error: {0}")]
    Device(String),
    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),
    #[error("sink lock poisoned")]
    Poisoned,
    #[error("wav output failed: {0}")]
    Wav(#[from] hound::Error),
    #[error("cannot start render thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Missing or invalid configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// File watching could not be set up.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("file watcher error: {0}")]
    Notify(#[from] notify::Error),
    #[error("watch channel closed")]
    Disconnected,
}

/// Fatal errors that end a live or render session.
#[derive(Debug, Error)]
pub enum LiveError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error(transparent)]
    Watch(#[from] WatchError),
    #[error("formula does not compile: {0}")]
    Compile(#[from] CompileError),
    #[error("cannot access formula file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("render loop thread panicked")]
    LoopPanicked,
}

pub type LiveResult<T> = Result<T, LiveError>;
