use std::fmt::Display;

use log::{debug, error, info};

/// Per-job logging handle.
///
/// `log` lines are only emitted for verbose jobs; `info` and `error` always
/// reach the `log` facade.
#[derive(Clone, Copy, Debug)]
pub struct Console {
    verbose: bool,
}

impl Console {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    pub fn log(&self, key: &str, value: impl Display) {
        if self.verbose {
            info!("{key} {value}");
        }
    }

    pub fn info(&self, key: &str, value: impl Display) {
        info!("{key} {value}");
    }

    pub fn error(&self, key: &str, value: impl Display) {
        error!("{key}: {value}");
    }

    pub fn progress(&self, label: &str, percent: f64) {
        if self.verbose {
            debug!("{label} {percent}%");
        }
    }
}
