//! Job lifecycle: validate, probe, build, run, finish.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::{validate_pitch_percent, JobConfig};
use crate::console::Console;
use crate::descriptor::{self, Capture, Effect, OutputTarget, PitchShift, Plan};
use crate::engine::Toolchain;
use crate::executor::{Executor, JobListener, PassOutcome};
use crate::finalize::{self, OutputSlot};
use crate::metadata::AudioMetadata;
use crate::{AudioModError, Result};

/// An edit the modifier knows how to carry out.
#[derive(Clone, Debug, PartialEq)]
pub enum Operation {
    /// Lift the peak to 0 dB.
    Normalize,
    /// Scale the first half of the file to `percent` of its volume.
    Volume { percent: f64 },
    SplitSilences,
    /// Falls back to the configured pitch when `None`.
    Pitch { percent: Option<i64> },
    /// Same length for both edges; falls back to the configured fades.
    Fade { seconds: Option<f64> },
    Effect(Effect),
    /// Capture the input device; falls back to the configured length.
    Record { seconds: Option<f64> },
}

impl Operation {
    fn label(&self) -> &'static str {
        match self {
            Operation::Normalize => "Normalizing",
            Operation::Volume { .. } => "Changing volume",
            Operation::SplitSilences => "Splitting",
            Operation::Pitch { .. } => "Pitching",
            Operation::Fade { .. } => "Creating fades",
            Operation::Effect(_) => "Applying FX",
            Operation::Record { .. } => "Recording",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Normalize => f.write_str("normalize"),
            Operation::Volume { percent } => write!(f, "volume {percent}%"),
            Operation::SplitSilences => f.write_str("split on silences"),
            Operation::Pitch { percent: Some(p) } => write!(f, "pitch {p}%"),
            Operation::Pitch { percent: None } => f.write_str("pitch"),
            Operation::Fade { seconds: Some(s) } => write!(f, "fade {s} secs"),
            Operation::Fade { seconds: None } => f.write_str("fade"),
            Operation::Effect(effect) => write!(f, "effect {effect}"),
            Operation::Record { seconds: Some(s) } => write!(f, "record {s} secs"),
            Operation::Record { seconds: None } => f.write_str("record"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobStatus {
    Completed,
    /// The peak was already at 0 dB; nothing was written.
    AlreadyNormalized,
}

#[derive(Clone, Debug, PartialEq)]
pub struct JobOutcome {
    /// Final location of the result: the input itself in overwrite mode, or
    /// when nothing had to change.
    pub output_path: PathBuf,
    pub status: JobStatus,
}

/// Everything needed to run one operation once inputs are known.
struct Prepared {
    plan: Plan,
    expected_seconds: Option<f64>,
}

/// Runs operations against one resolved configuration.
pub struct AudioModifier {
    config: JobConfig,
    tools: Toolchain,
    console: Console,
}

impl AudioModifier {
    pub fn new(config: JobConfig, tools: Toolchain) -> Self {
        let console = Console::new(config.verbose);
        console.log("Initialized with config", format_args!("{config:?}"));
        Self {
            config,
            tools,
            console,
        }
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    pub fn console(&self) -> Console {
        self.console
    }

    /// Run `operation` on `input`, or on the configured input when `None`.
    ///
    /// The listener gets exactly one `on_end` or `on_error`.
    pub fn run(
        &self,
        operation: &Operation,
        input: Option<&Path>,
        listener: &mut dyn JobListener,
    ) -> Result<JobOutcome> {
        match self.execute(operation, input, listener) {
            Ok(outcome) => {
                listener.on_end();
                Ok(outcome)
            }
            Err(err) => Err(self.fail(err, listener)),
        }
    }

    /// Like [`AudioModifier::run`] with [`Operation::Effect`], for effect
    /// names that still have to be parsed.
    pub fn apply_effect(
        &self,
        input: Option<&Path>,
        effect: &str,
        listener: &mut dyn JobListener,
    ) -> Result<JobOutcome> {
        match effect.parse::<Effect>() {
            Ok(effect) => self.run(&Operation::Effect(effect), input, listener),
            Err(err) => Err(self.fail(err, listener)),
        }
    }

    /// Print the file info, then play the file on the first available player.
    pub fn play_audio_file(&self, input: Option<&Path>) -> Result<()> {
        let played = self.input_path(input).and_then(|input| {
            self.inspect(&input)?;
            self.console.info("Playing", input.display());
            self.tools.player.play(&input)
        });
        if let Err(err) = &played {
            self.console.error("Cannot play audio", err);
        }
        played
    }

    /// Build what [`AudioModifier::run`] would execute without spawning
    /// anything. The input is still probed.
    pub fn plan(&self, operation: &Operation, input: Option<&Path>) -> Result<Plan> {
        self.validate(operation)?;
        let source = self.source(operation, input)?;
        let output = OutputTarget::File(finalize::planned_path(
            &self.config,
            source.as_ref().map(|(input, _)| input.as_path()),
        ));
        let prepared = self.prepare(operation, source.as_ref(), output)?;
        Ok(prepared.plan)
    }

    /// Command lines for the passes of `plan`. A normalization only lists
    /// its measurement pass; the gain pass depends on what it measures.
    pub fn describe(&self, plan: &Plan) -> Vec<String> {
        match plan {
            Plan::Transcode(pass) | Plan::Normalize(pass) => {
                vec![self.tools.transcoder.describe(pass)]
            }
            Plan::Effect(chain) => vec![self.tools.effects.describe(chain)],
        }
    }

    fn execute(
        &self,
        operation: &Operation,
        input: Option<&Path>,
        listener: &mut dyn JobListener,
    ) -> Result<JobOutcome> {
        self.validate(operation)?;
        let source = self.source(operation, input)?;
        let input = source.as_ref().map(|(input, _)| input.as_path());
        match input {
            Some(input) => self.console.info(
                operation.label(),
                format_args!("{operation} on {}", input.display()),
            ),
            None => self.console.info(operation.label(), operation),
        }

        let slot = OutputSlot::allocate(&self.config, input)?;
        let output = OutputTarget::File(slot.path().to_path_buf());
        let prepared = self.prepare(operation, source.as_ref(), output)?;

        let mut executor = Executor::new(&self.tools, self.console, listener);
        let outcome = match &prepared.plan {
            Plan::Transcode(pass) => {
                executor.run_pass(pass, operation.label(), prepared.expected_seconds)?;
                PassOutcome::Written
            }
            Plan::Normalize(_) => {
                let (input, metadata) = source.as_ref().ok_or(AudioModError::MissingInput)?;
                executor.normalize(input, slot.path(), metadata.duration_seconds)?
            }
            Plan::Effect(chain) => {
                let (input, _) = source.as_ref().ok_or(AudioModError::MissingInput)?;
                executor.run_effect(chain, input, slot.path())?;
                PassOutcome::Written
            }
        };

        match (outcome, source) {
            (PassOutcome::Unchanged, Some((input, _))) => Ok(JobOutcome {
                output_path: input,
                status: JobStatus::AlreadyNormalized,
            }),
            _ => Ok(JobOutcome {
                output_path: slot.finish(&self.console)?,
                status: JobStatus::Completed,
            }),
        }
    }

    /// Parameter checks that need neither the input nor an engine.
    fn validate(&self, operation: &Operation) -> Result<()> {
        match *operation {
            Operation::Volume { percent } if !(percent.is_finite() && percent >= 0.0) => {
                Err(AudioModError::InvalidNumber {
                    what: "volume percent",
                    value: percent.to_string(),
                })
            }
            Operation::Pitch { percent } => {
                validate_pitch_percent(self.pitch_percent(percent)).map(|_| ())
            }
            Operation::Fade { seconds } => {
                let (fade_in, fade_out) = self.fade_lengths(seconds);
                match [fade_in, fade_out]
                    .into_iter()
                    .find(|s| !(s.is_finite() && *s >= 0.0))
                {
                    Some(bad) => Err(AudioModError::InvalidNumber {
                        what: "fade length",
                        value: bad.to_string(),
                    }),
                    None => Ok(()),
                }
            }
            Operation::Record { seconds } => {
                let seconds = seconds.unwrap_or(self.config.record_seconds);
                if seconds >= 1.0 && seconds.is_finite() {
                    Ok(())
                } else {
                    Err(AudioModError::RecordTooShort(seconds))
                }
            }
            _ => Ok(()),
        }
    }

    /// Input file and its metadata, for every operation that reads one.
    fn source(
        &self,
        operation: &Operation,
        input: Option<&Path>,
    ) -> Result<Option<(PathBuf, AudioMetadata)>> {
        if matches!(operation, Operation::Record { .. }) {
            return Ok(None);
        }
        let input = self.input_path(input)?;
        let metadata = self.inspect(&input)?;
        Ok(Some((input, metadata)))
    }

    fn input_path(&self, input: Option<&Path>) -> Result<PathBuf> {
        match input {
            Some(path) if path.is_file() => Ok(path.to_path_buf()),
            Some(path) => Err(AudioModError::InputNotFound(path.to_path_buf())),
            None => self
                .config
                .input_path
                .clone()
                .ok_or(AudioModError::MissingInput),
        }
    }

    fn inspect(&self, input: &Path) -> Result<AudioMetadata> {
        let metadata = self.tools.probe.probe(input)?;
        metadata.report(&self.console);
        Ok(metadata)
    }

    fn prepare(
        &self,
        operation: &Operation,
        source: Option<&(PathBuf, AudioMetadata)>,
        output: OutputTarget,
    ) -> Result<Prepared> {
        if let Operation::Record { seconds } = *operation {
            let seconds = seconds.unwrap_or(self.config.record_seconds);
            let capture = Capture {
                format: self.tools.capture.format.clone(),
                device: self.tools.capture.device.clone(),
                seconds,
                sample_rate: self.config.sample_rate,
                channels: self.config.channel_count,
            };
            return Ok(Prepared {
                plan: Plan::Transcode(descriptor::record(capture, output)),
                expected_seconds: Some(seconds),
            });
        }

        let (input, metadata) = source.ok_or(AudioModError::MissingInput)?;
        let duration = metadata.duration_seconds;
        let prepared = match *operation {
            Operation::Normalize => Prepared {
                plan: Plan::Normalize(descriptor::measure_peak(input)),
                expected_seconds: Some(duration),
            },
            Operation::Volume { percent } => Prepared {
                plan: Plan::Transcode(descriptor::change_volume(input, percent, metadata, output)),
                expected_seconds: Some(duration),
            },
            Operation::SplitSilences => Prepared {
                plan: Plan::Transcode(descriptor::split_silences(input, output)),
                expected_seconds: Some(duration),
            },
            Operation::Pitch { percent } => {
                let original_rate = match metadata.sample_rate_hz {
                    0 => self.config.sample_rate,
                    rate => rate,
                };
                let shift = PitchShift::new(original_rate, self.pitch_percent(percent))?;
                self.console.log(
                    "Pitch rate",
                    format_args!("{} Hz -> {} Hz", shift.original_rate, shift.shifted_rate),
                );
                Prepared {
                    plan: Plan::Transcode(descriptor::shift_pitch(input, &shift, output)),
                    // Playback speed follows the pitch.
                    expected_seconds: Some(duration / shift.ratio),
                }
            }
            Operation::Fade { seconds } => {
                let (fade_in, fade_out) = self.fade_lengths(seconds);
                Prepared {
                    plan: Plan::Transcode(descriptor::fade(
                        input, duration, fade_in, fade_out, output,
                    )),
                    expected_seconds: Some(duration),
                }
            }
            Operation::Effect(effect) => Prepared {
                plan: Plan::Effect(descriptor::effect_chain(
                    effect,
                    input,
                    output.path().unwrap_or(input.as_path()),
                    metadata,
                )),
                expected_seconds: None,
            },
            Operation::Record { .. } => return Err(AudioModError::MissingInput),
        };
        Ok(prepared)
    }

    fn pitch_percent(&self, percent: Option<i64>) -> i64 {
        percent.unwrap_or(i64::from(self.config.pitch_percent))
    }

    /// The argument wins over the `fade` option, which wins over the
    /// per-edge options.
    fn fade_lengths(&self, seconds: Option<f64>) -> (f64, f64) {
        match seconds.or(self.config.fade_seconds) {
            Some(both) => (both, both),
            None => (self.config.fade_in_seconds, self.config.fade_out_seconds),
        }
    }

    fn fail(&self, err: AudioModError, listener: &mut dyn JobListener) -> AudioModError {
        self.console.error("Cannot process audio", &err);
        listener.on_error(&err);
        err
    }
}
