use std::ffi::OsStr;
use std::io;
use std::path::Path;
use std::process::{Command, Stdio};

use log::debug;

use super::{failure, spawn_error, Player};
use crate::{AudioModError, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
struct PlayerCommand {
    program: String,
    args: Vec<String>,
}

impl PlayerCommand {
    fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_owned(),
            args: args.iter().map(|arg| (*arg).to_owned()).collect(),
        }
    }
}

/// Plays files through the first command-line player that is installed.
#[derive(Clone, Debug)]
pub struct CommandPlayer {
    candidates: Vec<PlayerCommand>,
}

impl CommandPlayer {
    /// Player with a single candidate, run as `<program> <args>... <file>`.
    pub fn with_command(program: &str, args: &[&str]) -> Self {
        Self {
            candidates: vec![PlayerCommand::new(program, args)],
        }
    }

    pub fn candidates(&self) -> impl Iterator<Item = &str> {
        self.candidates
            .iter()
            .map(|candidate| candidate.program.as_str())
    }
}

impl Default for CommandPlayer {
    fn default() -> Self {
        Self {
            candidates: vec![
                PlayerCommand::new("ffplay", &["-nodisp", "-autoexit", "-loglevel", "error"]),
                PlayerCommand::new("afplay", &[]),
                PlayerCommand::new("mpg123", &["-q"]),
                PlayerCommand::new("play", &["-q"]),
                PlayerCommand::new("aplay", &["-q"]),
                PlayerCommand::new("cvlc", &["--play-and-exit", "--quiet"]),
            ],
        }
    }
}

impl Player for CommandPlayer {
    fn play(&self, path: &Path) -> Result<()> {
        for candidate in &self.candidates {
            let program: &OsStr = candidate.program.as_ref();
            let output = Command::new(program)
                .args(&candidate.args)
                .arg(path)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::piped())
                .output();

            match output {
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    debug!("player {} is not installed", candidate.program);
                }
                Err(source) => return Err(spawn_error(program, source)),
                Ok(output) if output.status.success() => return Ok(()),
                Ok(output) => {
                    let log = String::from_utf8_lossy(&output.stderr);
                    return Err(failure(program, output.status, &log));
                }
            }
        }

        Err(AudioModError::NoPlayer(
            self.candidates().collect::<Vec<_>>().join(", "),
        ))
    }
}
