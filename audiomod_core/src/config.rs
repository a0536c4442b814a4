use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use std::str::FromStr;

use crate::{AudioModError, Result};

/// File name used when no `outFile` option is given.
pub const DEFAULT_OUTPUT_NAME: &str = "output.mp3";
/// Directory, relative to the working directory, that receives bare output names.
pub const PROCESSED_DIR: &str = "processed";

pub const DEFAULT_VOLUME: f64 = 1.0;
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;
pub const DEFAULT_PITCH_PERCENT: u32 = 110;
pub const DEFAULT_FADE_SECONDS: f64 = 5.0;
pub const DEFAULT_RECORD_SECONDS: f64 = 10.0;

pub const MIN_PITCH_PERCENT: i64 = 1;
pub const MAX_PITCH_PERCENT: i64 = 200;
pub const MIN_FADE_SECONDS: f64 = 1.0;
pub const MAX_FADE_SECONDS: f64 = 30.0;

/// Names accepted as `name=value` job options.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OptionKey {
    OutFile,
    Overwrite,
    Volume,
    SampleRate,
    Channels,
    Pitch,
    Fade,
    FadeIn,
    FadeOut,
    RecTime,
    Verbose,
}

impl OptionKey {
    pub const ALL: [OptionKey; 11] = [
        OptionKey::OutFile,
        OptionKey::Overwrite,
        OptionKey::Volume,
        OptionKey::SampleRate,
        OptionKey::Channels,
        OptionKey::Pitch,
        OptionKey::Fade,
        OptionKey::FadeIn,
        OptionKey::FadeOut,
        OptionKey::RecTime,
        OptionKey::Verbose,
    ];

    pub fn name(self) -> &'static str {
        match self {
            OptionKey::OutFile => "outFile",
            OptionKey::Overwrite => "overwrite",
            OptionKey::Volume => "volume",
            OptionKey::SampleRate => "sampleRate",
            OptionKey::Channels => "channels",
            OptionKey::Pitch => "pitch",
            OptionKey::Fade => "fade",
            OptionKey::FadeIn => "fadeIn",
            OptionKey::FadeOut => "fadeOut",
            OptionKey::RecTime => "recTime",
            OptionKey::Verbose => "verbose",
        }
    }
}

impl fmt::Display for OptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OptionKey {
    type Err = AudioModError;

    fn from_str(s: &str) -> Result<Self> {
        OptionKey::ALL
            .into_iter()
            .find(|key| key.name() == s)
            .ok_or_else(|| AudioModError::UnknownOption(s.to_owned()))
    }
}

/// Caller-supplied job options, kept as raw text until [`JobOptions::resolve`].
#[derive(Clone, Debug, Default)]
pub struct JobOptions {
    input: Option<PathBuf>,
    values: BTreeMap<OptionKey, String>,
}

impl JobOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build options from `(name, value)` pairs, rejecting unknown names.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut options = Self::new();
        for (key, value) in pairs {
            let key = key.as_ref().parse::<OptionKey>()?;
            options.set(key, value);
        }
        Ok(options)
    }

    pub fn set(&mut self, key: OptionKey, value: impl Into<String>) -> &mut Self {
        self.values.insert(key, value.into());
        self
    }

    pub fn get(&self, key: OptionKey) -> Option<&str> {
        self.values
            .get(&key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    pub fn with(mut self, key: OptionKey, value: impl ToString) -> Self {
        self.set(key, value.to_string());
        self
    }

    /// Default input file used when an operation is not given one.
    pub fn input<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.input = Some(path.into());
        self
    }

    pub fn overwrite(self, overwrite: bool) -> Self {
        self.with(OptionKey::Overwrite, overwrite)
    }

    pub fn verbose(self, verbose: bool) -> Self {
        self.with(OptionKey::Verbose, verbose)
    }

    pub fn out_file(self, name: impl Into<String>) -> Self {
        self.with(OptionKey::OutFile, name.into())
    }

    /// Resolve against the current working directory.
    pub fn resolve(&self) -> Result<JobConfig> {
        let base = std::env::current_dir()?;
        self.resolve_in(&base)
    }

    /// Resolve against `base`, which hosts the processed-output directory.
    pub fn resolve_in(&self, base: &Path) -> Result<JobConfig> {
        let input_path = self.input.clone().filter(|path| path.is_file());

        Ok(JobConfig {
            input_path,
            output_path: resolve_output_path(self.get(OptionKey::OutFile), base),
            overwrite: self.get(OptionKey::Overwrite).is_some_and(|raw| coerce_flag(Some(raw))),
            volume: self.number(OptionKey::Volume)?.unwrap_or(DEFAULT_VOLUME),
            sample_rate: self
                .number(OptionKey::SampleRate)?
                .map_or(DEFAULT_SAMPLE_RATE, |rate| rate as u32),
            channel_count: resolve_channels(self.get(OptionKey::Channels))?,
            pitch_percent: self
                .number(OptionKey::Pitch)?
                .map_or(DEFAULT_PITCH_PERCENT, |pitch| pitch as u32),
            fade_seconds: self.number(OptionKey::Fade)?,
            fade_in_seconds: self.number(OptionKey::FadeIn)?.unwrap_or(DEFAULT_FADE_SECONDS),
            fade_out_seconds: self
                .number(OptionKey::FadeOut)?
                .unwrap_or(DEFAULT_FADE_SECONDS),
            record_seconds: self
                .number(OptionKey::RecTime)?
                .unwrap_or(DEFAULT_RECORD_SECONDS),
            verbose: coerce_flag(self.get(OptionKey::Verbose)),
            temp_dir: None,
        })
    }

    fn number(&self, key: OptionKey) -> Result<Option<f64>> {
        self.get(key)
            .map(|raw| parse_number(key, raw))
            .transpose()
    }
}

/// Fully resolved, immutable settings for one job.
#[derive(Clone, Debug, PartialEq)]
pub struct JobConfig {
    /// Default input, present only if it pointed at an existing file.
    pub input_path: Option<PathBuf>,
    /// Where non-overwrite jobs write their result.
    pub output_path: PathBuf,
    /// Replace the input with the processed output once the job succeeds.
    pub overwrite: bool,
    pub volume: f64,
    pub sample_rate: u32,
    /// Always 1 or 2.
    pub channel_count: u16,
    pub pitch_percent: u32,
    /// Applies to both fade edges when set.
    pub fade_seconds: Option<f64>,
    pub fade_in_seconds: f64,
    pub fade_out_seconds: f64,
    pub record_seconds: f64,
    pub verbose: bool,
    /// Where overwrite jobs stage their output. The system temp dir when
    /// unset.
    pub temp_dir: Option<PathBuf>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            input_path: None,
            output_path: PathBuf::from(PROCESSED_DIR).join(DEFAULT_OUTPUT_NAME),
            overwrite: false,
            volume: DEFAULT_VOLUME,
            sample_rate: DEFAULT_SAMPLE_RATE,
            channel_count: 2,
            pitch_percent: DEFAULT_PITCH_PERCENT,
            fade_seconds: None,
            fade_in_seconds: DEFAULT_FADE_SECONDS,
            fade_out_seconds: DEFAULT_FADE_SECONDS,
            record_seconds: DEFAULT_RECORD_SECONDS,
            verbose: true,
            temp_dir: None,
        }
    }
}

/// Reject fade lengths outside `1..=30` seconds.
pub fn validate_fade_seconds(seconds: f64) -> Result<f64> {
    if (MIN_FADE_SECONDS..=MAX_FADE_SECONDS).contains(&seconds) {
        Ok(seconds)
    } else {
        Err(AudioModError::FadeOutOfRange(seconds))
    }
}

/// Reject pitch percentages outside `1..=200`.
pub fn validate_pitch_percent(percent: i64) -> Result<u32> {
    if (MIN_PITCH_PERCENT..=MAX_PITCH_PERCENT).contains(&percent) {
        Ok(percent as u32)
    } else {
        Err(AudioModError::PitchOutOfRange(percent))
    }
}

/// More than two channels collapse to stereo, one stays mono, anything else is stereo.
fn resolve_channels(raw: Option<&str>) -> Result<u16> {
    let Some(raw) = raw else {
        return Ok(2);
    };
    let channels = parse_number(OptionKey::Channels, raw)?.trunc();
    Ok(if channels == 1.0 { 1 } else { 2 })
}

fn resolve_output_path(out_file: Option<&str>, base: &Path) -> PathBuf {
    let name = out_file.unwrap_or(DEFAULT_OUTPUT_NAME);
    if name.contains('/') || name.contains(MAIN_SEPARATOR) {
        PathBuf::from(name)
    } else {
        base.join(PROCESSED_DIR).join(name)
    }
}

/// Absent means `true`; only the literal `false` turns a flag off.
fn coerce_flag(raw: Option<&str>) -> bool {
    !matches!(raw, Some("false"))
}

fn parse_number(key: OptionKey, raw: &str) -> Result<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| AudioModError::NotNumeric {
            option: key.name(),
            value: raw.to_owned(),
        })
}
