use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use log::debug;
use serde::Deserialize;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::console::Console;
use crate::{AudioModError, Result};

/// Stream properties needed to build descriptors.
///
/// Every field has a defined fallback: zero for measurements, one for the
/// channel count.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioMetadata {
    pub duration_seconds: f64,
    pub sample_rate_hz: u32,
    pub channel_count: u16,
    /// `bit_rate / 1024`.
    pub bitrate_kbps: f64,
    pub byte_size: u64,
}

impl Default for AudioMetadata {
    fn default() -> Self {
        Self {
            duration_seconds: 0.0,
            sample_rate_hz: 0,
            channel_count: 1,
            bitrate_kbps: 0.0,
            byte_size: 0,
        }
    }
}

impl AudioMetadata {
    pub fn is_stereo(&self) -> bool {
        self.channel_count > 1
    }

    pub fn readable_size(&self) -> String {
        readable_size(self.byte_size)
    }

    pub fn formatted_duration(&self) -> String {
        format_duration(self.duration_seconds)
    }

    /// Log the summary printed before every operation.
    pub fn report(&self, console: &Console) {
        console.info("Duration", self.formatted_duration());
        console.info("Sample Rate", format_args!("{} Hz", self.sample_rate_hz));
        console.info("Bit Rate", format_args!("{} kbits", self.bitrate_kbps));
        console.info("Mode", if self.is_stereo() { "Stereo" } else { "Mono" });
        console.info("Size", self.readable_size());
    }
}

/// Metadata source for an audio file.
pub trait Probe {
    fn probe(&self, path: &Path) -> Result<AudioMetadata>;
}

/// Probe backed by the `ffprobe` binary.
#[derive(Clone, Debug)]
pub struct FfprobeProbe {
    program: PathBuf,
    native_fallback: bool,
}

impl FfprobeProbe {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
            native_fallback: false,
        }
    }

    /// Use `FFPROBE_PATH` if set, else `ffprobe` from `PATH`.
    pub fn from_env() -> Self {
        Self::new(std::env::var_os("FFPROBE_PATH").unwrap_or_else(|| "ffprobe".into()))
    }

    /// Fall back to [`SymphoniaProbe`] when the binary is not installed.
    pub fn with_native_fallback(mut self) -> Self {
        self.native_fallback = true;
        self
    }
}

impl Probe for FfprobeProbe {
    fn probe(&self, path: &Path) -> Result<AudioMetadata> {
        let byte_size = byte_size(path)?;
        let output = Command::new(&self.program)
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .output();

        let output = match output {
            Ok(output) => output,
            Err(err) if err.kind() == io::ErrorKind::NotFound && self.native_fallback => {
                debug!(
                    "{} not found, probing '{}' natively",
                    self.program.display(),
                    path.display()
                );
                return SymphoniaProbe.probe(path);
            }
            Err(err) => {
                return Err(probe_error(
                    path,
                    format!("failed to run {}: {err}", self.program.display()),
                ))
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(probe_error(path, stderr.trim().to_owned()));
        }

        let json = String::from_utf8_lossy(&output.stdout);
        parse_ffprobe_json(&json, byte_size).map_err(|err| probe_error(path, err.to_string()))
    }
}

#[derive(Debug, Default, Deserialize)]
struct ProbeReport {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    #[serde(default)]
    format: ProbeFormat,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u16>,
    duration: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
    bit_rate: Option<String>,
}

/// Normalize `ffprobe -print_format json` output.
///
/// The first audio stream wins; stream fields that are missing fall back to
/// the container's values and then to the sentinels.
pub fn parse_ffprobe_json(json: &str, byte_size: u64) -> serde_json::Result<AudioMetadata> {
    let report: ProbeReport = serde_json::from_str(json)?;
    let stream = report
        .streams
        .iter()
        .find(|stream| stream.codec_type.as_deref() == Some("audio"))
        .or_else(|| report.streams.first());

    let duration = parse_field(stream.and_then(|s| s.duration.as_deref()))
        .or_else(|| parse_field(report.format.duration.as_deref()))
        .unwrap_or(0.0);
    let bit_rate = parse_field(stream.and_then(|s| s.bit_rate.as_deref()))
        .or_else(|| parse_field(report.format.bit_rate.as_deref()))
        .unwrap_or(0.0);
    let sample_rate = parse_field(stream.and_then(|s| s.sample_rate.as_deref()));

    Ok(AudioMetadata {
        duration_seconds: duration,
        sample_rate_hz: sample_rate.map_or(0, |rate| rate as u32),
        channel_count: stream.and_then(|s| s.channels).filter(|&c| c > 0).unwrap_or(1),
        bitrate_kbps: bit_rate / 1024.0,
        byte_size,
    })
}

fn parse_field(raw: Option<&str>) -> Option<f64> {
    raw.and_then(|raw| raw.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite())
}

/// In-process probe built on symphonia's format readers.
#[derive(Clone, Copy, Debug, Default)]
pub struct SymphoniaProbe;

impl Probe for SymphoniaProbe {
    fn probe(&self, path: &Path) -> Result<AudioMetadata> {
        let byte_size = byte_size(path)?;

        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(extension);
        }

        let file = File::open(path).map_err(|err| probe_error(path, err.to_string()))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());
        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|err| probe_error(path, err.to_string()))?;

        let Some(track) = probed.format.default_track() else {
            return Ok(AudioMetadata {
                byte_size,
                ..AudioMetadata::default()
            });
        };

        let params = &track.codec_params;
        let sample_rate = params.sample_rate.unwrap_or(0);
        let duration = match (params.n_frames, sample_rate) {
            (Some(frames), rate) if rate > 0 => frames as f64 / f64::from(rate),
            _ => 0.0,
        };
        let bitrate_kbps = if duration > 0.0 {
            byte_size as f64 * 8.0 / duration / 1024.0
        } else {
            0.0
        };

        Ok(AudioMetadata {
            duration_seconds: duration,
            sample_rate_hz: sample_rate,
            channel_count: params
                .channels
                .map(|channels| channels.count() as u16)
                .filter(|&count| count > 0)
                .unwrap_or(1),
            bitrate_kbps,
            byte_size,
        })
    }
}

fn byte_size(path: &Path) -> Result<u64> {
    fs::metadata(path)
        .map(|meta| meta.len())
        .map_err(|err| probe_error(path, err.to_string()))
}

fn probe_error(path: &Path, reason: String) -> AudioModError {
    AudioModError::Probe {
        path: path.to_path_buf(),
        reason,
    }
}

const SIZE_UNITS: [&str; 8] = ["kB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];

/// Human readable byte count: at least one division by 1024, one decimal,
/// never below `0.1`.
pub fn readable_size(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    value /= 1024.0;
    while value > 1024.0 && unit + 1 < SIZE_UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value.max(0.1), SIZE_UNITS[unit])
}

/// `HH:MM:SS` with hours, `MM:SS` with minutes, otherwise `SS secs`.
pub fn format_duration(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.trunc() as u64
    } else {
        0
    };
    let hours = total / 3_600;
    let minutes = (total % 3_600) / 60;
    let secs = total % 60;

    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{secs:02}")
    } else if minutes > 0 {
        format!("{minutes:02}:{secs:02}")
    } else {
        format!("{secs:02} secs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FFPROBE_MP3: &str = r#"{
        "streams": [
            {
                "index": 0,
                "codec_name": "mp3",
                "codec_type": "audio",
                "sample_rate": "44100",
                "channels": 2,
                "duration": "187.402438",
                "bit_rate": "320000"
            }
        ],
        "format": { "duration": "187.402438", "bit_rate": "320117" }
    }"#;

    #[test]
    fn parses_first_audio_stream() {
        let metadata = parse_ffprobe_json(FFPROBE_MP3, 7_500_000).unwrap();
        assert_eq!(metadata.sample_rate_hz, 44_100);
        assert_eq!(metadata.channel_count, 2);
        assert!((metadata.duration_seconds - 187.402438).abs() < 1e-9);
        assert_eq!(metadata.bitrate_kbps, 320_000.0 / 1024.0);
        assert_eq!(metadata.byte_size, 7_500_000);
        assert!(metadata.is_stereo());
    }

    #[test]
    fn skips_cover_art_streams() {
        let json = r#"{
            "streams": [
                { "codec_type": "video", "duration": "1.0" },
                { "codec_type": "audio", "sample_rate": "22050", "channels": 1, "duration": "12.5" }
            ]
        }"#;
        let metadata = parse_ffprobe_json(json, 0).unwrap();
        assert_eq!(metadata.sample_rate_hz, 22_050);
        assert_eq!(metadata.channel_count, 1);
        assert_eq!(metadata.duration_seconds, 12.5);
    }

    #[test]
    fn missing_fields_become_sentinels() {
        let json = r#"{ "streams": [ { "codec_type": "audio" } ], "format": { "duration": "9.5" } }"#;
        let metadata = parse_ffprobe_json(json, 42).unwrap();
        assert_eq!(metadata.duration_seconds, 9.5);
        assert_eq!(metadata.sample_rate_hz, 0);
        assert_eq!(metadata.channel_count, 1);
        assert_eq!(metadata.bitrate_kbps, 0.0);

        let metadata = parse_ffprobe_json("{}", 0).unwrap();
        assert_eq!(metadata, AudioMetadata::default());
    }

    #[test]
    fn rejects_non_json_output() {
        assert!(parse_ffprobe_json("Invalid data found", 0).is_err());
    }

    #[test]
    fn readable_size_matches_expected_units() {
        assert_eq!(readable_size(0), "0.1 kB");
        assert_eq!(readable_size(1_536), "1.5 kB");
        assert_eq!(readable_size(1_048_576), "1024.0 kB");
        assert_eq!(readable_size(5 * 1_048_576), "5.0 MB");
        assert_eq!(readable_size(3 * 1_073_741_824), "3.0 GB");
    }

    #[test]
    fn duration_formatting_drops_empty_units() {
        assert_eq!(format_duration(5.9), "05 secs");
        assert_eq!(format_duration(65.0), "01:05");
        assert_eq!(format_duration(3_661.2), "01:01:01");
        assert_eq!(format_duration(f64::NAN), "00 secs");
    }

    #[test]
    fn probe_of_missing_file_is_a_probe_error() {
        let err = SymphoniaProbe
            .probe(Path::new("/no/such/file.wav"))
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Probe);
    }
}
