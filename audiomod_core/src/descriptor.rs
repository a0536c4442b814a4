//! Engine-agnostic descriptions of what each operation asks the engines to do.
//!
//! Every builder here is a pure function of its arguments. Rendering to a
//! concrete command line lives with the engines in [`crate::engine`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::validate_pitch_percent;
use crate::metadata::AudioMetadata;
use crate::{AudioModError, Result};

/// Attenuation applied before silence detection.
pub const SILENCE_ATTENUATION: f64 = 0.2;
pub const SILENCE_NOISE_FLOOR_DB: f64 = -50.0;
pub const SILENCE_MIN_SECONDS: f64 = 5.0;

/// Subtracted from the probed duration to size pitch-bend envelopes.
pub const BEND_SAFETY_MARGIN_SECONDS: f64 = 0.1;
const BEND_CENTS: i32 = 2_000;
const BEND_FRAME_RATE: u32 = 25;
const BEND_OVERSAMPLE: u32 = 16;

/// Stream type handed to the effects engine when the input has no extension.
pub const DEFAULT_STREAM_TYPE: &str = "mp3";

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Gain {
    /// Linear factor, `1.0` is unity.
    Ratio(f64),
    Decibels(f64),
}

/// Half-open `[start, end)` interval in seconds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimeWindow {
    pub start: f64,
    pub end: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FadeDirection {
    In,
    Out,
}

#[derive(Clone, Debug, PartialEq)]
pub enum AudioFilter {
    Volume {
        gain: Gain,
        window: Option<TimeWindow>,
    },
    /// Peak and mean loudness measurement; reports on the engine's log.
    VolumeDetect,
    SilenceDetect {
        noise_floor_db: f64,
        min_silence_seconds: f64,
    },
    /// Reinterpret the stream at a new rate without resampling.
    SetRate {
        sample_rate: u32,
    },
    Resample {
        sample_rate: u32,
    },
    Fade {
        direction: FadeDirection,
        start: f64,
        duration: f64,
    },
}

/// Live capture source for recordings.
#[derive(Clone, Debug, PartialEq)]
pub struct Capture {
    /// Demuxer that owns the device, e.g. `alsa`.
    pub format: String,
    pub device: String,
    pub seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Input {
    File(PathBuf),
    Capture(Capture),
}

#[derive(Clone, Debug, PartialEq)]
pub enum OutputTarget {
    File(PathBuf),
    /// Discard decoded output; used by measurement passes.
    Null,
}

/// One invocation of the transcoding engine.
#[derive(Clone, Debug, PartialEq)]
pub struct Pass {
    pub input: Input,
    pub filters: Vec<AudioFilter>,
    pub output: OutputTarget,
}

impl OutputTarget {
    pub fn path(&self) -> Option<&Path> {
        match self {
            OutputTarget::File(path) => Some(path.as_path()),
            OutputTarget::Null => None,
        }
    }
}

impl Pass {
    fn from_file(input: &Path, filters: Vec<AudioFilter>, output: OutputTarget) -> Self {
        Self {
            input: Input::File(input.to_path_buf()),
            filters,
            output,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Effect {
    Reverb,
    Echo,
    Chorus,
    Flanger,
    Distort,
    Lowpass,
    Highpass,
    BendUp,
    BendDown,
    Reverse,
}

impl Effect {
    pub const ALL: [Effect; 10] = [
        Effect::Reverb,
        Effect::Echo,
        Effect::Chorus,
        Effect::Flanger,
        Effect::Distort,
        Effect::Lowpass,
        Effect::Highpass,
        Effect::BendUp,
        Effect::BendDown,
        Effect::Reverse,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Effect::Reverb => "REVERB",
            Effect::Echo => "ECHO",
            Effect::Chorus => "CHORUS",
            Effect::Flanger => "FLANGER",
            Effect::Distort => "DISTORT",
            Effect::Lowpass => "LOWPASS",
            Effect::Highpass => "HIGHPASS",
            Effect::BendUp => "BENDUP",
            Effect::BendDown => "BENDDOWN",
            Effect::Reverse => "REVERSE",
        }
    }

    /// Whether building the chain needs the probed duration.
    pub fn needs_duration(self) -> bool {
        matches!(self, Effect::BendUp | Effect::BendDown)
    }

    fn input_volume(self) -> Option<f64> {
        match self {
            Effect::Reverb => Some(0.7),
            Effect::Echo => Some(0.6),
            Effect::BendUp | Effect::BendDown => Some(0.5),
            Effect::Reverse => None,
            _ => Some(0.8),
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Effect {
    type Err = AudioModError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_uppercase();
        Effect::ALL
            .into_iter()
            .find(|effect| effect.name() == wanted)
            .ok_or_else(|| AudioModError::UnknownEffect(s.to_owned()))
    }
}

/// Effect invocation for the effects engine: one effect and its arguments,
/// reading a byte stream of `input_type` and writing one of `output_type`.
#[derive(Clone, Debug, PartialEq)]
pub struct EffectChain {
    pub effect: Effect,
    pub input_type: String,
    pub output_type: String,
    pub input_volume: Option<f64>,
    pub arguments: Vec<String>,
}

/// What running an operation amounts to, before anything is spawned.
#[derive(Clone, Debug, PartialEq)]
pub enum Plan {
    Transcode(Pass),
    /// Measurement pass; the gain pass is built from its report.
    Normalize(Pass),
    Effect(EffectChain),
}

/// First normalization pass: measure the peak and discard the audio.
pub fn measure_peak(input: &Path) -> Pass {
    Pass::from_file(input, vec![AudioFilter::VolumeDetect], OutputTarget::Null)
}

/// Second normalization pass: lift the whole file by `gain_db`.
pub fn apply_gain(input: &Path, gain_db: f64, output: OutputTarget) -> Pass {
    Pass::from_file(
        input,
        vec![AudioFilter::Volume {
            gain: Gain::Decibels(gain_db),
            window: None,
        }],
        output,
    )
}

/// Gain change over the first half of the file; the second half stays at
/// unity.
pub fn change_volume(
    input: &Path,
    percent: f64,
    metadata: &AudioMetadata,
    output: OutputTarget,
) -> Pass {
    let duration = metadata.duration_seconds;
    let half = duration / 2.0;
    Pass::from_file(
        input,
        vec![
            AudioFilter::Volume {
                gain: Gain::Ratio(percent / 100.0),
                window: Some(TimeWindow {
                    start: 0.0,
                    end: half,
                }),
            },
            AudioFilter::Volume {
                gain: Gain::Ratio(1.0),
                window: Some(TimeWindow {
                    start: half,
                    end: duration,
                }),
            },
        ],
        output,
    )
}

pub fn split_silences(input: &Path, output: OutputTarget) -> Pass {
    Pass::from_file(
        input,
        vec![
            AudioFilter::Volume {
                gain: Gain::Ratio(SILENCE_ATTENUATION),
                window: None,
            },
            AudioFilter::SilenceDetect {
                noise_floor_db: SILENCE_NOISE_FLOOR_DB,
                min_silence_seconds: SILENCE_MIN_SECONDS,
            },
        ],
        output,
    )
}

/// Pitch change by playing the samples back at a different rate.
///
/// Tempo follows the pitch; only the rate is resampled back afterwards.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PitchShift {
    pub ratio: f64,
    pub original_rate: u32,
    pub shifted_rate: u32,
}

impl PitchShift {
    pub fn new(original_rate: u32, pitch_percent: i64) -> Result<Self> {
        let percent = validate_pitch_percent(pitch_percent)?;
        let ratio = 1.0 - (100.0 - f64::from(percent)).round() / 100.0;
        let shifted_rate = (f64::from(original_rate) * ratio).round() as u32;
        Ok(Self {
            ratio,
            original_rate,
            shifted_rate,
        })
    }
}

pub fn shift_pitch(input: &Path, shift: &PitchShift, output: OutputTarget) -> Pass {
    Pass::from_file(
        input,
        vec![
            AudioFilter::SetRate {
                sample_rate: shift.shifted_rate,
            },
            AudioFilter::Resample {
                sample_rate: shift.original_rate,
            },
        ],
        output,
    )
}

/// Fade in from zero and fade out ending at `duration`.
///
/// The fade-out start is not clamped: a fade longer than the file starts
/// before zero.
pub fn fade(
    input: &Path,
    duration: f64,
    fade_in: f64,
    fade_out: f64,
    output: OutputTarget,
) -> Pass {
    Pass::from_file(
        input,
        vec![
            AudioFilter::Fade {
                direction: FadeDirection::In,
                start: 0.0,
                duration: fade_in,
            },
            AudioFilter::Fade {
                direction: FadeDirection::Out,
                start: duration - fade_out,
                duration: fade_out,
            },
        ],
        output,
    )
}

pub fn record(capture: Capture, output: OutputTarget) -> Pass {
    Pass {
        input: Input::Capture(capture),
        filters: Vec::new(),
        output,
    }
}

/// Effect chain for `effect`. Stream types follow the file extensions of
/// `input` and `output`.
pub fn effect_chain(
    effect: Effect,
    input: &Path,
    output: &Path,
    metadata: &AudioMetadata,
) -> EffectChain {
    let arguments: Vec<String> = match effect {
        Effect::Reverb => args(["reverb", "50", "60", "60", "10", "0", "-6"]),
        Effect::Echo => args([
            "echos", "0.9", "0.05", "300", "0.25", "600", "0.08", "900", "0.015",
        ]),
        Effect::Chorus => args(["chorus", "0.9", "0.5", "25", "0.8", "0.5", "9", "-s"]),
        Effect::Flanger => args([
            "flanger", "20", "10", "90", "100", "1.5", "sine", "linear",
        ]),
        Effect::Distort => args(["overdrive", "20", "30"]),
        Effect::Lowpass => args(["lowpass", "-2", "1800"]),
        Effect::Highpass => args(["highpass", "-2", "340"]),
        Effect::BendUp => bend(BEND_CENTS, metadata.duration_seconds),
        Effect::BendDown => bend(-BEND_CENTS, metadata.duration_seconds),
        Effect::Reverse => args(["reverse"]),
    };

    EffectChain {
        effect,
        input_type: stream_type(input),
        output_type: stream_type(output),
        input_volume: effect.input_volume(),
        arguments,
    }
}

fn bend(cents: i32, duration: f64) -> Vec<String> {
    let end = duration - BEND_SAFETY_MARGIN_SECONDS;
    vec![
        "bend".to_owned(),
        "-f".to_owned(),
        BEND_FRAME_RATE.to_string(),
        "-o".to_owned(),
        BEND_OVERSAMPLE.to_string(),
        format!("0,{cents},{end}"),
    ]
}

fn args<const N: usize>(values: [&str; N]) -> Vec<String> {
    values.iter().map(|value| (*value).to_owned()).collect()
}

fn stream_type(input: &Path) -> String {
    input
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map_or_else(|| DEFAULT_STREAM_TYPE.to_owned(), str::to_ascii_lowercase)
}
