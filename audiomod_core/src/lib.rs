//! Orchestration layer for audio edits that are carried out by external
//! engines.
//!
//! The crate never decodes audio itself. It resolves job options, probes the
//! input, turns an [`Operation`] into a descriptor for ffmpeg or SoX, runs it
//! (once, or twice for normalization), and puts the result where the caller
//! asked for it.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub mod config;
pub mod console;
pub mod descriptor;
pub mod engine;
pub mod executor;
pub mod finalize;
pub mod job;
pub mod metadata;
pub mod progress;

pub use config::{validate_fade_seconds, JobConfig, JobOptions, OptionKey};
pub use console::Console;
pub use descriptor::{AudioFilter, Effect, EffectChain, Gain, Input, OutputTarget, Pass, Plan};
pub use engine::{
    CaptureDevice, CommandPlayer, EffectsEngine, EngineEvent, EngineReport, Ffmpeg, Player, Sox,
    Toolchain, Transcoder,
};
pub use executor::{JobEvent, JobListener, MeasuredPeak, SilentListener};
pub use job::{AudioModifier, JobOutcome, JobStatus, Operation};
pub use metadata::{AudioMetadata, FfprobeProbe, Probe, SymphoniaProbe};

/// Coarse classification of an [`AudioModError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// A parameter was missing or out of range. Nothing was executed.
    Validation,
    /// The job options could not be turned into a configuration.
    Config,
    /// Reading the input metadata failed.
    Probe,
    /// An external engine failed or produced output that could not be parsed.
    Engine,
    /// Replacing the original input with the processed output failed.
    Overwrite,
}

/// Errors produced while resolving, running or finishing a job.
#[derive(Debug, Error)]
pub enum AudioModError {
    /// No input file was given, neither as an argument nor in the options.
    #[error("You must enter a valid local path file")]
    MissingInput,

    /// The input path does not point at a readable file.
    #[error("input file does not exist: {}", .0.display())]
    InputNotFound(PathBuf),

    /// A required positional argument was omitted.
    #[error("You must enter {0}")]
    MissingArgument(&'static str),

    /// A positional argument was not a number.
    #[error("'{value}' is not a valid {what}")]
    InvalidNumber { what: &'static str, value: String },

    /// Pitch percent outside `1..=200`.
    #[error("Pitch percent to change must be between 1 and 200 (got {0})")]
    PitchOutOfRange(i64),

    /// Fade length outside `1..=30` seconds.
    #[error("Fade time must be between 1 and 30 seconds (got {0})")]
    FadeOutOfRange(f64),

    /// Recording time below one second.
    #[error("You must enter a valid seconds time to record mic (got {0})")]
    RecordTooShort(f64),

    /// Effect name outside the supported set.
    #[error(
        "You must enter a valid effect: (reverb | echo | chorus | flanger | distort | lowpass | highpass | bendup | benddown | reverse), got '{0}'"
    )]
    UnknownEffect(String),

    /// The resolved output would overwrite the input while it is being read.
    #[error("output path '{}' is the input file; pass overwrite=true to replace it", .0.display())]
    OutputIsInput(PathBuf),

    /// A job option carried a value that is not a number.
    #[error("invalid value '{value}' for option {option}: expected a number")]
    NotNumeric { option: &'static str, value: String },

    /// A job option name that is not recognized.
    #[error("unknown option '{0}'")]
    UnknownOption(String),

    /// The metadata probe failed for the given file.
    #[error("failed to probe '{}': {reason}", path.display())]
    Probe { path: PathBuf, reason: String },

    /// An external program could not be started.
    #[error("failed to start {program}: {source}")]
    EngineSpawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// An external program exited unsuccessfully.
    #[error("{program} exited with {}: {detail}", code.map_or_else(|| "a signal".to_owned(), |c| format!("code {c}")))]
    EngineFailed {
        program: String,
        code: Option<i32>,
        detail: String,
    },

    /// Engine output that should have contained a measurement did not parse.
    #[error("unreadable engine report: {0}")]
    UnreadableReport(String),

    /// None of the known local players could be started.
    #[error("no audio player found (tried {0})")]
    NoPlayer(String),

    /// Copying the processed temp file over the original input failed.
    #[error("failed to overwrite '{}' with the processed output: {source}", path.display())]
    Overwrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Wrapper around IO errors encountered while reading or writing files.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl AudioModError {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AudioModError::MissingInput
            | AudioModError::InputNotFound(_)
            | AudioModError::MissingArgument(_)
            | AudioModError::InvalidNumber { .. }
            | AudioModError::PitchOutOfRange(_)
            | AudioModError::FadeOutOfRange(_)
            | AudioModError::RecordTooShort(_)
            | AudioModError::UnknownEffect(_)
            | AudioModError::OutputIsInput(_) => ErrorKind::Validation,
            AudioModError::NotNumeric { .. } | AudioModError::UnknownOption(_) => ErrorKind::Config,
            AudioModError::Probe { .. } => ErrorKind::Probe,
            AudioModError::EngineSpawn { .. }
            | AudioModError::EngineFailed { .. }
            | AudioModError::UnreadableReport(_)
            | AudioModError::NoPlayer(_)
            | AudioModError::Io(_) => ErrorKind::Engine,
            AudioModError::Overwrite { .. } => ErrorKind::Overwrite,
        }
    }
}

pub type Result<T, E = AudioModError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_carry_the_corrective_instruction() {
        let err = AudioModError::MissingArgument("your output volume wished");
        assert_eq!(err.to_string(), "You must enter your output volume wished");
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn engine_failure_message_names_exit_code() {
        let err = AudioModError::EngineFailed {
            program: "ffmpeg".into(),
            code: Some(1),
            detail: "Invalid data found when processing input".into(),
        };
        assert_eq!(
            err.to_string(),
            "ffmpeg exited with code 1: Invalid data found when processing input"
        );
        assert_eq!(err.kind(), ErrorKind::Engine);
    }

    #[test]
    fn overwrite_failures_are_classified_separately() {
        let err = AudioModError::Overwrite {
            path: PathBuf::from("/tmp/in.mp3"),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert_eq!(err.kind(), ErrorKind::Overwrite);
    }
}
