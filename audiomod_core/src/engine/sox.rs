use std::ffi::OsString;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;

use log::debug;

use super::{
    collect_log, command_line, failure, join, missing_pipe, spawn_error, EffectsEngine,
    EngineEvent, EngineReport,
};
use crate::descriptor::EffectChain;
use crate::Result;

const CHUNK_SIZE: usize = 64 * 1024;

/// The `sox` effects processor, driven over stdin/stdout.
#[derive(Clone, Debug)]
pub struct Sox {
    program: PathBuf,
}

impl Sox {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// `SOX_PATH` when set, otherwise `sox` from `PATH`.
    pub fn from_env() -> Self {
        Self::new(std::env::var_os("SOX_PATH").unwrap_or_else(|| OsString::from("sox")))
    }
}

impl Default for Sox {
    fn default() -> Self {
        Self::new("sox")
    }
}

impl EffectsEngine for Sox {
    fn describe(&self, chain: &EffectChain) -> String {
        command_line(self.program.as_os_str(), &sox_args(chain))
    }

    fn transform(
        &self,
        chain: &EffectChain,
        input: Box<dyn Read + Send>,
        output: Box<dyn Write + Send>,
        events: &mut dyn FnMut(EngineEvent),
    ) -> Result<EngineReport> {
        let program = self.program.as_os_str();
        let args = sox_args(chain);
        let mut child = Command::new(program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| spawn_error(program, source))?;

        let stdin = child.stdin.take().ok_or_else(|| missing_pipe("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;
        events(EngineEvent::Started(command_line(program, &args)));

        let log = collect_log(stderr);
        let feeder = thread::spawn(move || -> io::Result<u64> {
            let mut input = input;
            let mut stdin = stdin;
            io::copy(&mut input, &mut stdin)
        });

        let (tx, rx) = mpsc::channel();
        let drain = thread::spawn(move || -> io::Result<u64> {
            let mut stdout = stdout;
            let mut output = output;
            let mut buf = vec![0u8; CHUNK_SIZE];
            let mut written = 0u64;
            loop {
                let n = match stdout.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                    Err(err) => return Err(err),
                };
                output.write_all(&buf[..n])?;
                written += n as u64;
                // The receiver only goes away once the job gave up listening.
                let _ = tx.send(written);
            }
            output.flush()?;
            Ok(written)
        });

        for written in rx {
            events(EngineEvent::Transferred(written));
        }

        let status = child.wait()?;
        let fed = join(feeder);
        let drained = join(drain);
        let log = join(log)?;

        if !status.success() {
            return Err(failure(program, status, &log));
        }
        let read = fed?;
        let written = drained?;
        debug!("sox read {read} bytes and wrote {written} bytes");
        Ok(EngineReport { log })
    }
}

/// `-t <type> [-v <volume>] - -t <type> - <effect> <args>...`
pub fn sox_args(chain: &EffectChain) -> Vec<String> {
    let mut args = vec!["-t".to_owned(), chain.input_type.clone()];
    if let Some(volume) = chain.input_volume {
        args.push("-v".to_owned());
        args.push(volume.to_string());
    }
    args.push("-".to_owned());
    args.push("-t".to_owned());
    args.push(chain.output_type.clone());
    args.push("-".to_owned());
    args.extend(chain.arguments.iter().cloned());
    args
}
