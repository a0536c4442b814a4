use std::ffi::OsString;
use std::path::PathBuf;

use audiomod_core::config::validate_pitch_percent;
use audiomod_core::{
    validate_fade_seconds, AudioModError, Effect, JobOptions, Operation, OptionKey,
};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};

/// What the command line asked for.
#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    Run {
        operation: Operation,
        input: Option<PathBuf>,
    },
    Play {
        input: Option<PathBuf>,
    },
}

/// Split `name=value` job options from the rest of argv.
///
/// A token is an option when it starts with a known option name followed by
/// `=`. Later occurrences win.
pub fn extract_options<I>(args: I) -> (Vec<OsString>, JobOptions)
where
    I: IntoIterator<Item = OsString>,
{
    let mut rest = Vec::new();
    let mut options = JobOptions::new();
    for arg in args {
        match arg.to_str().and_then(parse_option) {
            Some((key, value)) => {
                options.set(key, value);
            }
            None => rest.push(arg),
        }
    }
    (rest, options)
}

/// `fadeIn=3` -> `(FadeIn, "3")`.
pub fn parse_option(token: &str) -> Option<(OptionKey, &str)> {
    let (name, value) = token.split_once('=')?;
    let key = name.parse::<OptionKey>().ok()?;
    Some((key, value))
}

fn file_arg() -> Arg {
    Arg::new("file_path")
        .value_name("FILE_PATH")
        .help("Path to the input audio file")
        .value_parser(value_parser!(PathBuf))
}

pub fn build_cli() -> Command {
    Command::new(env!("CARGO_PKG_NAME"))
        .author(env!("CARGO_PKG_AUTHORS"))
        .about("Normalize, re-gain, pitch, fade and apply effects to audio files")
        .version(env!("CARGO_PKG_VERSION"))
        .after_help(
            "Job options are given as name=value tokens anywhere on the command line:\n  \
             outFile, volume, sampleRate, channels, pitch, fade, fadeIn, fadeOut,\n  \
             recTime, verbose, overwrite",
        )
        .subcommand_required(true)
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .global(true)
                .help("Print the engine invocations without running them")
                .action(ArgAction::SetTrue),
        )
        .subcommand(
            Command::new("normalize")
                .about("Raise the peak level to 0 dB")
                .arg(file_arg()),
        )
        .subcommand(
            Command::new("volume")
                .about("Change the volume of the first half of the file")
                .arg(file_arg())
                .arg(
                    Arg::new("percent")
                        .value_name("PERCENT")
                        .help("Output volume in percent of the original"),
                ),
        )
        .subcommand(
            Command::new("split")
                .about("Attenuate and mark silences")
                .arg(file_arg()),
        )
        .subcommand(
            Command::new("pitch")
                .about("Shift the pitch by resampling")
                .arg(file_arg())
                .arg(
                    Arg::new("percent")
                        .value_name("PERCENT")
                        .allow_negative_numbers(true)
                        .help("Pitch in percent of the original, 1-200"),
                ),
        )
        .subcommand(
            Command::new("fade")
                .about("Fade in and out")
                .arg(file_arg())
                .arg(
                    Arg::new("seconds")
                        .value_name("SECONDS")
                        .allow_negative_numbers(true)
                        .help("Fade length in seconds, 1-30"),
                ),
        )
        .subcommand(
            Command::new("record")
                .about("Record the default input device")
                .arg(
                    Arg::new("seconds")
                        .value_name("SECONDS")
                        .allow_negative_numbers(true)
                        .help("Recording length in seconds"),
                ),
        )
        .subcommand(
            Command::new("play")
                .about("Play a file on the local output device")
                .arg(file_arg()),
        )
        .subcommand(
            Command::new("effect")
                .about("Apply a SoX effect")
                .arg(file_arg())
                .arg(Arg::new("effect").value_name("EFFECT").help(
                    "REVERB, ECHO, CHORUS, FLANGER, DISTORT, LOWPASS, HIGHPASS, BENDUP, \
                     BENDDOWN or REVERSE",
                )),
        )
}

/// `--dry-run` may be given before or after the subcommand.
pub fn is_dry_run(matches: &ArgMatches) -> bool {
    matches.get_flag("dry-run")
        || matches
            .subcommand()
            .is_some_and(|(_, sub)| sub.get_flag("dry-run"))
}

/// Turn parsed arguments into an [`Action`], rejecting missing or invalid
/// parameters before anything is probed. A missing file is reported before
/// a missing parameter.
pub fn parse_action(matches: &ArgMatches) -> Result<Action, AudioModError> {
    let Some((name, sub)) = matches.subcommand() else {
        return Err(AudioModError::MissingArgument("a valid operation"));
    };
    let input = sub
        .try_get_one::<PathBuf>("file_path")
        .ok()
        .flatten()
        .cloned();
    if input.is_none() && name != "record" {
        return Err(AudioModError::MissingInput);
    }
    let text = |id: &str| {
        sub.try_get_one::<String>(id)
            .ok()
            .flatten()
            .map(String::as_str)
    };

    let operation = match name {
        "play" => return Ok(Action::Play { input }),
        "normalize" => Operation::Normalize,
        "split" => Operation::SplitSilences,
        "volume" => {
            let raw = text("percent").ok_or(AudioModError::MissingArgument(
                "your output volume wished",
            ))?;
            Operation::Volume {
                percent: number("volume percent", raw)?,
            }
        }
        "pitch" => {
            let raw = text("percent").ok_or(AudioModError::MissingArgument(
                "wished pitch percent to change",
            ))?;
            let percent = number("pitch percent", raw)?.trunc() as i64;
            validate_pitch_percent(percent)?;
            Operation::Pitch {
                percent: Some(percent),
            }
        }
        "fade" => {
            let raw = text("seconds").ok_or(AudioModError::MissingArgument(
                "wished time to fade in/out",
            ))?;
            let seconds = validate_fade_seconds(number("fade time", raw)?)?;
            Operation::Fade {
                seconds: Some(seconds),
            }
        }
        "record" => {
            let raw = text("seconds").ok_or(AudioModError::MissingArgument(
                "a valid seconds time to record mic",
            ))?;
            let seconds = number("record time", raw)?;
            if seconds < 1.0 {
                return Err(AudioModError::RecordTooShort(seconds));
            }
            Operation::Record {
                seconds: Some(seconds),
            }
        }
        "effect" => {
            let raw = text("effect").unwrap_or_default();
            Operation::Effect(raw.parse::<Effect>()?)
        }
        other => return Err(AudioModError::UnknownOption(other.to_owned())),
    };

    Ok(Action::Run { operation, input })
}

fn number(what: &'static str, raw: &str) -> Result<f64, AudioModError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| AudioModError::InvalidNumber {
            what,
            value: raw.to_owned(),
        })
}
