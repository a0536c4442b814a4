//! Runs descriptors through the engines and relays their lifecycle to a
//! [`JobListener`].

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::LazyLock;

use log::debug;
use regex::Regex;

use crate::console::Console;
use crate::descriptor::{self, EffectChain, OutputTarget, Pass};
use crate::engine::{EngineEvent, EngineReport, Toolchain};
use crate::progress::ProgressTracker;
use crate::{AudioModError, Result};

static MAX_VOLUME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"max_volume: (-*\d*\.\d*) dB").expect("max_volume pattern is valid")
});

/// A lifecycle notification, as delivered to closure listeners.
#[derive(Debug)]
pub enum JobEvent<'a> {
    /// A pass was spawned with this command line.
    Start(&'a str),
    /// Percent done, two decimals, non-decreasing within a pass.
    Progress(f64),
    End,
    Error(&'a AudioModError),
}

/// Receives job lifecycle events.
///
/// `on_start` fires once per spawned pass and `on_progress` any number of
/// times. Exactly one of `on_end` or `on_error` fires per job.
pub trait JobListener {
    fn on_start(&mut self, _command_line: &str) {}

    fn on_progress(&mut self, _percent: f64) {}

    fn on_end(&mut self) {}

    fn on_error(&mut self, _error: &AudioModError) {}
}

impl<F> JobListener for F
where
    F: FnMut(JobEvent<'_>),
{
    fn on_start(&mut self, command_line: &str) {
        self(JobEvent::Start(command_line));
    }

    fn on_progress(&mut self, percent: f64) {
        self(JobEvent::Progress(percent));
    }

    fn on_end(&mut self) {
        self(JobEvent::End);
    }

    fn on_error(&mut self, error: &AudioModError) {
        self(JobEvent::Error(error));
    }
}

/// Listener that ignores every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct SilentListener;

impl JobListener for SilentListener {}

/// Peak level parsed from a loudness measurement report.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeasuredPeak {
    pub decibels: f64,
}

impl MeasuredPeak {
    /// Reads `max_volume: <dB> dB` from the engine log. A report without the
    /// line counts as a peak of 0 dB.
    pub fn from_report(log: &str) -> Result<Self> {
        let Some(captures) = MAX_VOLUME.captures(log) else {
            return Ok(Self { decibels: 0.0 });
        };
        let raw = &captures[1];
        let decibels = raw
            .parse::<f64>()
            .map_err(|_| AudioModError::UnreadableReport(format!("max_volume '{raw}'")))?;
        Ok(Self { decibels })
    }

    /// Peak at 0.0 dB when rounded to the report's precision.
    pub fn is_unity(&self) -> bool {
        (self.decibels * 10.0).round() == 0.0
    }

    /// Gain that lifts the peak to 0 dB.
    pub fn compensating_gain(&self) -> f64 {
        -self.decibels
    }
}

/// What a finished pass sequence did to the output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PassOutcome {
    Written,
    /// The input needed no change and nothing was written.
    Unchanged,
}

enum NormalizeStage {
    Measuring,
    Applying { gain_db: f64 },
    Done(PassOutcome),
}

/// Forwards engine events to the listener, turning raw measurements into
/// percentages.
struct Relay<'a> {
    listener: &'a mut dyn JobListener,
    console: Console,
    label: &'static str,
    tracker: Option<ProgressTracker>,
}

impl Relay<'_> {
    fn handle(&mut self, event: EngineEvent) {
        let done = match event {
            EngineEvent::Started(command_line) => {
                self.console.log("Spawned engine with command", &command_line);
                self.listener.on_start(&command_line);
                return;
            }
            EngineEvent::Elapsed(seconds) => seconds,
            EngineEvent::Transferred(bytes) => bytes as f64,
        };
        if let Some(percent) = self.tracker.as_mut().and_then(|tracker| tracker.observe(done)) {
            self.console.progress(self.label, percent);
            self.listener.on_progress(percent);
        }
    }
}

/// Drives the passes of one job.
pub(crate) struct Executor<'a> {
    tools: &'a Toolchain,
    console: Console,
    listener: &'a mut dyn JobListener,
}

impl<'a> Executor<'a> {
    pub(crate) fn new(
        tools: &'a Toolchain,
        console: Console,
        listener: &'a mut dyn JobListener,
    ) -> Self {
        Self {
            tools,
            console,
            listener,
        }
    }

    /// Run one pass. Progress is reported against `expected_seconds` of
    /// output, or not at all when that is `None`.
    pub(crate) fn run_pass(
        &mut self,
        pass: &Pass,
        label: &'static str,
        expected_seconds: Option<f64>,
    ) -> Result<EngineReport> {
        let mut relay = Relay {
            listener: &mut *self.listener,
            console: self.console,
            label,
            tracker: expected_seconds.map(ProgressTracker::new),
        };
        self.tools
            .transcoder
            .run(pass, &mut |event| relay.handle(event))
    }

    /// Measure the peak, then apply the compensating gain into `output`.
    pub(crate) fn normalize(
        &mut self,
        input: &Path,
        output: &Path,
        duration: f64,
    ) -> Result<PassOutcome> {
        let mut stage = NormalizeStage::Measuring;
        loop {
            stage = match stage {
                NormalizeStage::Measuring => {
                    let report =
                        self.run_pass(&descriptor::measure_peak(input), "Measuring", None)?;
                    let peak = MeasuredPeak::from_report(&report.log)?;
                    if peak.is_unity() {
                        self.console.info(
                            "Now volume is 0.0 dB,",
                            "it is not necessary file normalization",
                        );
                        NormalizeStage::Done(PassOutcome::Unchanged)
                    } else {
                        let gain_db = peak.compensating_gain();
                        self.console
                            .info("Audio normalization to", format_args!("{gain_db}dB"));
                        NormalizeStage::Applying { gain_db }
                    }
                }
                NormalizeStage::Applying { gain_db } => {
                    let pass = descriptor::apply_gain(
                        input,
                        gain_db,
                        OutputTarget::File(output.to_path_buf()),
                    );
                    self.run_pass(&pass, "Normalizing", Some(duration))?;
                    NormalizeStage::Done(PassOutcome::Written)
                }
                NormalizeStage::Done(outcome) => return Ok(outcome),
            };
        }
    }

    /// Stream `input` through the effect chain into `output`. Progress is
    /// bytes written against the input size.
    pub(crate) fn run_effect(
        &mut self,
        chain: &EffectChain,
        input: &Path,
        output: &Path,
    ) -> Result<()> {
        let source = File::open(input)?;
        let input_size = source.metadata()?.len();
        let sink = File::create(output)?;
        debug!(
            "applying {} to {} bytes from '{}'",
            chain.effect,
            input_size,
            input.display()
        );

        let mut relay = Relay {
            listener: &mut *self.listener,
            console: self.console,
            label: "Applying FX",
            tracker: Some(ProgressTracker::new(input_size as f64)),
        };
        self.tools.effects.transform(
            chain,
            Box::new(BufReader::new(source)),
            Box::new(BufWriter::new(sink)),
            &mut |event| relay.handle(event),
        )?;
        Ok(())
    }
}
