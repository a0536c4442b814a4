//! Where a job writes, and how the result ends up in its final place.

use std::fs;
use std::path::{Path, PathBuf};

use log::warn;
use tempfile::TempPath;

use crate::config::JobConfig;
use crate::console::Console;
use crate::descriptor::DEFAULT_STREAM_TYPE;
use crate::{AudioModError, Result};

const TEMP_PREFIX: &str = "audiomod-";

/// The file a job writes to.
///
/// In overwrite mode this is a fresh temp file that replaces the input on
/// [`OutputSlot::finish`]. The temp file is removed when the slot is dropped,
/// whether or not the job got that far.
#[derive(Debug)]
pub struct OutputSlot {
    path: PathBuf,
    target: PathBuf,
    temp: Option<TempPath>,
}

impl OutputSlot {
    pub fn allocate(config: &JobConfig, input: Option<&Path>) -> Result<Self> {
        match input {
            Some(input) if config.overwrite => {
                let temp = tempfile::Builder::new()
                    .prefix(TEMP_PREFIX)
                    .suffix(&temp_suffix(input))
                    .tempfile_in(temp_dir(config))?
                    .into_temp_path();
                Ok(Self {
                    path: temp.to_path_buf(),
                    target: input.to_path_buf(),
                    temp: Some(temp),
                })
            }
            _ => {
                let path = config.output_path.clone();
                if input.is_some_and(|input| same_file(&path, input)) {
                    return Err(AudioModError::OutputIsInput(path));
                }
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    fs::create_dir_all(parent)?;
                }
                Ok(Self {
                    target: path.clone(),
                    path,
                    temp: None,
                })
            }
        }
    }

    /// Path the engines write to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Move the written output into place and return its final path.
    pub fn finish(self, console: &Console) -> Result<PathBuf> {
        let Some(temp) = self.temp else {
            console.log("Output written to", self.target.display());
            return Ok(self.target);
        };

        fs::copy(&temp, &self.target).map_err(|source| AudioModError::Overwrite {
            path: self.target.clone(),
            source,
        })?;
        console.log("Overwritten", self.target.display());

        if let Err(err) = temp.close() {
            warn!("failed to remove temp file: {err}");
        }
        Ok(self.target)
    }
}

/// Where [`OutputSlot::allocate`] would put the output, without creating
/// anything. Temp names are shown with a placeholder.
pub(crate) fn planned_path(config: &JobConfig, input: Option<&Path>) -> PathBuf {
    match input {
        Some(input) if config.overwrite => {
            temp_dir(config).join(format!("{TEMP_PREFIX}XXXXXX{}", temp_suffix(input)))
        }
        _ => config.output_path.clone(),
    }
}

fn temp_dir(config: &JobConfig) -> PathBuf {
    config.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
}

/// The transcoder infers the container from this, so it is never empty.
fn temp_suffix(input: &Path) -> String {
    let ext = input
        .extension()
        .map(|ext| ext.to_string_lossy())
        .filter(|ext| !ext.is_empty());
    match ext {
        Some(ext) => format!(".{ext}"),
        None => format!(".{DEFAULT_STREAM_TYPE}"),
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
