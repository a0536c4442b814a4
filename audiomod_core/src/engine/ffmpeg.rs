use std::ffi::OsString;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;

use log::debug;

use super::{
    collect_log, command_line, failure, join, missing_pipe, spawn_error, EngineEvent,
    EngineReport, Transcoder,
};
use crate::descriptor::{AudioFilter, FadeDirection, Gain, Input, OutputTarget, Pass};
use crate::progress::parse_ffmpeg_progress;
use crate::Result;

/// The `ffmpeg` command-line transcoder.
#[derive(Clone, Debug)]
pub struct Ffmpeg {
    program: PathBuf,
}

impl Ffmpeg {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// `FFMPEG_PATH` when set, otherwise `ffmpeg` from `PATH`.
    pub fn from_env() -> Self {
        Self::new(std::env::var_os("FFMPEG_PATH").unwrap_or_else(|| OsString::from("ffmpeg")))
    }
}

impl Default for Ffmpeg {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl Transcoder for Ffmpeg {
    fn describe(&self, pass: &Pass) -> String {
        command_line(self.program.as_os_str(), &ffmpeg_args(pass))
    }

    fn run(&self, pass: &Pass, events: &mut dyn FnMut(EngineEvent)) -> Result<EngineReport> {
        let program = self.program.as_os_str();
        let args = ffmpeg_args(pass);
        let mut child = Command::new(program)
            .args(&args)
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| spawn_error(program, source))?;

        let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;
        events(EngineEvent::Started(command_line(program, &args)));

        let log = collect_log(stderr);
        let (tx, rx) = mpsc::channel();
        let reader = thread::spawn(move || -> io::Result<()> {
            for line in BufReader::new(stdout).lines() {
                if let Some(seconds) = parse_ffmpeg_progress(&line?) {
                    if tx.send(seconds).is_err() {
                        break;
                    }
                }
            }
            Ok(())
        });

        for seconds in rx {
            events(EngineEvent::Elapsed(seconds));
        }

        let status = child.wait()?;
        let progress = join(reader);
        let log = join(log)?;
        debug!("{} exited with {status}", program.to_string_lossy());

        if !status.success() {
            return Err(failure(program, status, &log));
        }
        progress?;
        Ok(EngineReport { log })
    }
}

/// Full argument list for one pass, without the program name.
pub fn ffmpeg_args(pass: &Pass) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-hide_banner", "-nostdin", "-nostats", "-y"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.extend(["-progress", "pipe:1"].map(OsString::from));

    match &pass.input {
        Input::File(path) => {
            args.push("-i".into());
            args.push(path.as_os_str().to_owned());
        }
        Input::Capture(capture) => {
            args.push("-f".into());
            args.push(capture.format.as_str().into());
            args.push("-ac".into());
            args.push(capture.channels.to_string().into());
            args.push("-ar".into());
            args.push(capture.sample_rate.to_string().into());
            args.push("-t".into());
            args.push(capture.seconds.to_string().into());
            args.push("-i".into());
            args.push(capture.device.as_str().into());
        }
    }

    if !pass.filters.is_empty() {
        args.push("-af".into());
        args.push(filter_graph(&pass.filters).into());
    }

    match &pass.output {
        OutputTarget::File(path) => args.push(path.as_os_str().to_owned()),
        OutputTarget::Null => args.extend(["-f", "null", "-"].map(OsString::from)),
    }
    args
}

/// Comma-separated filter chain for `-af`.
pub fn filter_graph(filters: &[AudioFilter]) -> String {
    filters
        .iter()
        .map(filter_expr)
        .collect::<Vec<_>>()
        .join(",")
}

pub fn filter_expr(filter: &AudioFilter) -> String {
    match filter {
        AudioFilter::Volume { gain, window } => {
            let gain = match gain {
                Gain::Ratio(ratio) => ratio.to_string(),
                Gain::Decibels(db) => format!("{db}dB"),
            };
            match window {
                Some(window) => format!(
                    "volume=enable='between(t,{},{})':volume={gain}",
                    window.start, window.end
                ),
                None => format!("volume={gain}"),
            }
        }
        AudioFilter::VolumeDetect => "volumedetect".to_owned(),
        AudioFilter::SilenceDetect {
            noise_floor_db,
            min_silence_seconds,
        } => format!("silencedetect=n={noise_floor_db}dB:d={min_silence_seconds}"),
        AudioFilter::SetRate { sample_rate } => format!("asetrate={sample_rate}"),
        AudioFilter::Resample { sample_rate } => format!("aresample={sample_rate}"),
        AudioFilter::Fade {
            direction,
            start,
            duration,
        } => {
            let direction = match direction {
                FadeDirection::In => "in",
                FadeDirection::Out => "out",
            };
            format!("afade={direction}:st={start}:d={duration}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use crate::descriptor::{self, Capture, PitchShift};
    use crate::metadata::AudioMetadata;

    fn strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }

    fn out() -> OutputTarget {
        OutputTarget::File(PathBuf::from("/tmp/out.mp3"))
    }

    #[test]
    fn measurement_pass_writes_to_null_muxer() {
        let args = strings(ffmpeg_args(&descriptor::measure_peak(Path::new(
            "/music/in.mp3",
        ))));
        assert_eq!(
            args,
            vec![
                "-hide_banner",
                "-nostdin",
                "-nostats",
                "-y",
                "-progress",
                "pipe:1",
                "-i",
                "/music/in.mp3",
                "-af",
                "volumedetect",
                "-f",
                "null",
                "-",
            ]
        );
    }

    #[test]
    fn gain_is_rendered_in_decibels() {
        let pass = descriptor::apply_gain(Path::new("/in.mp3"), 10.5, out());
        assert_eq!(filter_graph(&pass.filters), "volume=10.5dB");
    }

    #[test]
    fn volume_change_renders_two_timeline_windows() {
        let metadata = AudioMetadata {
            duration_seconds: 60.0,
            ..AudioMetadata::default()
        };
        let pass = descriptor::change_volume(Path::new("/in.mp3"), 50.0, &metadata, out());
        assert_eq!(
            filter_graph(&pass.filters),
            "volume=enable='between(t,0,30)':volume=0.5,\
             volume=enable='between(t,30,60)':volume=1"
        );
    }

    #[test]
    fn silence_split_renders_fixed_chain() {
        let pass = descriptor::split_silences(Path::new("/in.mp3"), out());
        assert_eq!(
            filter_graph(&pass.filters),
            "volume=0.2,silencedetect=n=-50dB:d=5"
        );
    }

    #[test]
    fn pitch_and_fade_render() {
        let shift = PitchShift::new(44_100, 110).unwrap();
        let pass = descriptor::shift_pitch(Path::new("/in.mp3"), &shift, out());
        assert_eq!(filter_graph(&pass.filters), "asetrate=48510,aresample=44100");

        let pass = descriptor::fade(Path::new("/in.mp3"), 60.0, 5.0, 2.5, out());
        assert_eq!(
            filter_graph(&pass.filters),
            "afade=in:st=0:d=5,afade=out:st=57.5:d=2.5"
        );
    }

    #[test]
    fn capture_input_sets_format_before_device() {
        let pass = descriptor::record(
            Capture {
                format: "alsa".to_owned(),
                device: "default".to_owned(),
                seconds: 10.0,
                sample_rate: 44_100,
                channels: 2,
            },
            out(),
        );
        let args = strings(ffmpeg_args(&pass));
        let input = args.iter().position(|arg| arg == "-f").unwrap();
        assert_eq!(
            &args[input..],
            &[
                "-f",
                "alsa",
                "-ac",
                "2",
                "-ar",
                "44100",
                "-t",
                "10",
                "-i",
                "default",
                "/tmp/out.mp3"
            ]
        );
    }

    #[test]
    fn describe_prefixes_program() {
        let ffmpeg = Ffmpeg::new("/opt/ffmpeg/bin/ffmpeg");
        let line = ffmpeg.describe(&descriptor::measure_peak(Path::new("in.mp3")));
        assert!(line.starts_with("/opt/ffmpeg/bin/ffmpeg -hide_banner"));
        assert!(line.ends_with("-af volumedetect -f null -"));
    }
}
