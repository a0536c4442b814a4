use assert_cmd::Command;
use predicates::prelude::*;
use predicates::str::contains;
use std::error::Error;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tempfile::tempdir;

/// Generate a small single-channel WAV file for testing.
///
/// The samples are synthesized on the fly so the repository carries no binary
/// fixtures.
fn write_test_tone<P: AsRef<Path>>(
    path: P,
    sample_rate: u32,
    duration_ms: u64,
) -> Result<(), Box<dyn Error>> {
    let total_samples = (sample_rate as u64 * duration_ms).div_ceil(1_000);
    let mut samples = Vec::with_capacity(total_samples as usize * 2);

    for n in 0..total_samples {
        let theta = (n as f32 / sample_rate as f32) * 2.0 * std::f32::consts::PI * 440.0;
        let sample = (theta.sin() * i16::MAX as f32) as i16;
        samples.extend_from_slice(&sample.to_le_bytes());
    }

    let mut file = File::create(path)?;
    let data_len = samples.len() as u32;
    file.write_all(b"RIFF")?;
    file.write_all(&(36u32 + data_len).to_le_bytes())?;
    file.write_all(b"WAVE")?;
    file.write_all(b"fmt ")?;
    file.write_all(&16u32.to_le_bytes())?; // PCM header size
    file.write_all(&1u16.to_le_bytes())?; // audio format = PCM
    file.write_all(&1u16.to_le_bytes())?; // channels
    file.write_all(&sample_rate.to_le_bytes())?;
    file.write_all(&(sample_rate * 2).to_le_bytes())?;
    file.write_all(&2u16.to_le_bytes())?; // block align
    file.write_all(&16u16.to_le_bytes())?; // bits per sample
    file.write_all(b"data")?;
    file.write_all(&data_len.to_le_bytes())?;
    file.write_all(&samples)?;
    Ok(())
}

fn audiomod(work_dir: &Path) -> Result<Command, Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("audiomod")?;
    cmd.current_dir(work_dir)
        .env("FFMPEG_PATH", "audiomod-test-missing-ffmpeg")
        .env("FFPROBE_PATH", "audiomod-test-missing-ffprobe")
        .env("SOX_PATH", "audiomod-test-missing-sox");
    Ok(cmd)
}

#[test]
fn cli_requires_an_input_file() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    audiomod(work_dir.path())?
        .arg("normalize")
        .assert()
        .failure()
        .stderr(contains("You must enter a valid local path file"));
    Ok(())
}

#[test]
fn cli_reports_missing_input_file() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    audiomod(work_dir.path())?
        .args(["split", "missing.wav"])
        .assert()
        .failure()
        .stderr(contains("input file does not exist"));
    assert!(!work_dir.path().join("processed").exists());
    Ok(())
}

#[test]
fn cli_rejects_pitch_outside_range() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    audiomod(work_dir.path())?
        .args(["pitch", "song.mp3", "500"])
        .assert()
        .failure()
        .stderr(contains("Pitch percent to change must be between 1 and 200"));
    Ok(())
}

#[test]
fn cli_rejects_fade_outside_range() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    audiomod(work_dir.path())?
        .args(["fade", "song.mp3", "31"])
        .assert()
        .failure()
        .stderr(contains("Fade time must be between 1 and 30 seconds"));
    Ok(())
}

#[test]
fn cli_asks_for_file_before_volume_percent() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    audiomod(work_dir.path())?
        .arg("volume")
        .assert()
        .failure()
        .stderr(
            contains("You must enter a valid local path file")
                .and(contains("output volume wished").not()),
        );
    Ok(())
}

#[test]
fn cli_asks_for_volume_percent() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    audiomod(work_dir.path())?
        .args(["volume", "song.mp3"])
        .assert()
        .failure()
        .stderr(contains("You must enter your output volume wished"));
    Ok(())
}

#[test]
fn cli_lists_valid_effects() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    audiomod(work_dir.path())?
        .args(["effect", "song.mp3", "wobble"])
        .assert()
        .failure()
        .stderr(contains("You must enter a valid effect").and(contains("benddown")));
    Ok(())
}

#[test]
fn cli_rejects_non_numeric_options() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    audiomod(work_dir.path())?
        .args(["normalize", "song.mp3", "channels=abc"])
        .assert()
        .failure()
        .stderr(contains("failed to resolve job options").and(contains("abc")));
    Ok(())
}

#[test]
fn cli_reports_missing_engine() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    let input_path = work_dir.path().join("input.wav");
    write_test_tone(&input_path, 8_000, 1_100)?;

    audiomod(work_dir.path())?
        .arg("split")
        .arg(&input_path)
        .arg("verbose=false")
        .assert()
        .failure()
        .stderr(contains("failed to start audiomod-test-missing-ffmpeg"));
    Ok(())
}

#[test]
fn cli_dry_run_prints_invocation_without_writing() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    let input_path = work_dir.path().join("input.wav");
    write_test_tone(&input_path, 8_000, 1_100)?;

    audiomod(work_dir.path())?
        .args(["--dry-run", "volume"])
        .arg(&input_path)
        .args(["50", "verbose=false"])
        .assert()
        .success()
        .stdout(
            contains("Dry run: would run:")
                .and(contains("audiomod-test-missing-ffmpeg"))
                .and(contains("volume=enable='between(t,0,0.55)':volume=0.5")),
        );
    assert!(!work_dir.path().join("processed").exists());
    Ok(())
}

#[test]
fn cli_dry_run_lists_effect_chain() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    let input_path = work_dir.path().join("input.wav");
    write_test_tone(&input_path, 8_000, 1_100)?;

    audiomod(work_dir.path())?
        .arg("effect")
        .arg(&input_path)
        .args(["reverb", "--dry-run"])
        .assert()
        .success()
        .stdout(contains("-t wav -v 0.7 - -t mp3 - reverb 50 60 60 10 0 -6"));
    Ok(())
}
