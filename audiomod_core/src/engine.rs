//! Boundaries to the external programs that do the actual audio work.

use std::ffi::OsStr;
use std::io::{self, Read, Write};
use std::path::Path;
use std::process::{ChildStderr, ExitStatus};
use std::thread::{self, JoinHandle};

use crate::descriptor::{EffectChain, Pass};
use crate::metadata::{FfprobeProbe, Probe};
use crate::{AudioModError, Result};

mod ffmpeg;
mod player;
mod sox;

pub use ffmpeg::{ffmpeg_args, filter_expr, filter_graph, Ffmpeg};
pub use player::CommandPlayer;
pub use sox::{sox_args, Sox};

/// Non-terminal notifications emitted while an engine runs.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineEvent {
    /// The engine process was spawned with this command line.
    Started(String),
    /// Seconds of output produced so far.
    Elapsed(f64),
    /// Bytes of output written so far.
    Transferred(u64),
}

/// Result of an engine run that exited successfully.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EngineReport {
    /// Everything the engine wrote to its diagnostic stream.
    pub log: String,
}

/// Runs one [`Pass`] through a transcoding engine.
pub trait Transcoder {
    /// The command line [`Transcoder::run`] would spawn.
    fn describe(&self, pass: &Pass) -> String;

    /// Run the pass to completion. Blocks until the engine exits.
    fn run(&self, pass: &Pass, events: &mut dyn FnMut(EngineEvent)) -> Result<EngineReport>;
}

/// Streams bytes through an effect chain.
pub trait EffectsEngine {
    fn describe(&self, chain: &EffectChain) -> String;

    fn transform(
        &self,
        chain: &EffectChain,
        input: Box<dyn Read + Send>,
        output: Box<dyn Write + Send>,
        events: &mut dyn FnMut(EngineEvent),
    ) -> Result<EngineReport>;
}

/// Plays a file on the local output device.
pub trait Player {
    fn play(&self, path: &Path) -> Result<()>;
}

/// Input device handed to the transcoding engine for recordings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptureDevice {
    pub format: String,
    pub device: String,
}

impl CaptureDevice {
    pub fn platform_default() -> Self {
        let (format, device) = if cfg!(target_os = "linux") {
            ("alsa", "default")
        } else if cfg!(target_os = "macos") {
            ("avfoundation", ":0")
        } else {
            ("dshow", "audio=default")
        };
        Self {
            format: format.to_owned(),
            device: device.to_owned(),
        }
    }

    /// Platform default, overridden by `AUDIOMOD_CAPTURE_FORMAT` and
    /// `AUDIOMOD_CAPTURE_DEVICE`.
    pub fn from_env() -> Self {
        let default = Self::platform_default();
        Self {
            format: std::env::var("AUDIOMOD_CAPTURE_FORMAT").unwrap_or(default.format),
            device: std::env::var("AUDIOMOD_CAPTURE_DEVICE").unwrap_or(default.device),
        }
    }
}

/// The set of collaborators a job runs against.
pub struct Toolchain {
    pub transcoder: Box<dyn Transcoder>,
    pub effects: Box<dyn EffectsEngine>,
    pub probe: Box<dyn Probe>,
    pub player: Box<dyn Player>,
    pub capture: CaptureDevice,
}

impl Toolchain {
    pub fn new(
        transcoder: Box<dyn Transcoder>,
        effects: Box<dyn EffectsEngine>,
        probe: Box<dyn Probe>,
        player: Box<dyn Player>,
    ) -> Self {
        Self {
            transcoder,
            effects,
            probe,
            player,
            capture: CaptureDevice::platform_default(),
        }
    }

    /// ffmpeg, ffprobe and SoX as found through the environment.
    pub fn system() -> Self {
        Self {
            transcoder: Box::new(Ffmpeg::from_env()),
            effects: Box::new(Sox::from_env()),
            probe: Box::new(FfprobeProbe::from_env().with_native_fallback()),
            player: Box::new(CommandPlayer::default()),
            capture: CaptureDevice::from_env(),
        }
    }

    pub fn with_capture(mut self, capture: CaptureDevice) -> Self {
        self.capture = capture;
        self
    }
}

fn command_line<S: AsRef<OsStr>>(program: &OsStr, args: &[S]) -> String {
    let mut line = program.to_string_lossy().into_owned();
    for arg in args {
        line.push(' ');
        line.push_str(&arg.as_ref().to_string_lossy());
    }
    line
}

fn spawn_error(program: &OsStr, source: io::Error) -> AudioModError {
    AudioModError::EngineSpawn {
        program: program.to_string_lossy().into_owned(),
        source,
    }
}

fn failure(program: &OsStr, status: ExitStatus, log: &str) -> AudioModError {
    let detail = log
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("no diagnostic output")
        .to_owned();
    AudioModError::EngineFailed {
        program: program.to_string_lossy().into_owned(),
        code: status.code(),
        detail,
    }
}

fn collect_log(mut stderr: ChildStderr) -> JoinHandle<io::Result<String>> {
    thread::spawn(move || {
        let mut bytes = Vec::new();
        stderr.read_to_end(&mut bytes)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    })
}

fn join<T>(handle: JoinHandle<io::Result<T>>) -> io::Result<T> {
    handle
        .join()
        .unwrap_or_else(|_| Err(io::Error::other("engine I/O thread panicked")))
}

fn missing_pipe(name: &str) -> AudioModError {
    AudioModError::Io(io::Error::other(format!("engine {name} was not captured")))
}
