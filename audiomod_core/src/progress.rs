/// Turns raw engine measurements into the percentages handed to listeners.
///
/// Values are clamped to `0..=100`, rounded to two decimals and never go
/// backwards within one invocation. Repeats are dropped.
#[derive(Clone, Debug)]
pub struct ProgressTracker {
    total: f64,
    last: Option<f64>,
}

impl ProgressTracker {
    /// `total` is the measurement that corresponds to 100%.
    pub fn new(total: f64) -> Self {
        Self { total, last: None }
    }

    pub fn observe(&mut self, done: f64) -> Option<f64> {
        if self.total.is_nan() || self.total <= 0.0 || !done.is_finite() {
            return None;
        }

        let percent = round_percent((done / self.total * 100.0).clamp(0.0, 100.0));
        let percent = match self.last {
            Some(last) if percent <= last => return None,
            _ => percent,
        };
        self.last = Some(percent);
        Some(percent)
    }
}

/// Round to two decimal places.
pub fn round_percent(percent: f64) -> f64 {
    ((percent + f64::EPSILON) * 100.0).round() / 100.0
}

/// Parse one line of ffmpeg's `-progress` key/value stream into elapsed
/// output seconds.
pub fn parse_ffmpeg_progress(line: &str) -> Option<f64> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        "out_time_us" => value
            .parse::<i64>()
            .ok()
            .map(|micros| micros as f64 / 1_000_000.0),
        "out_time" => parse_timestamp(value),
        _ => None,
    }
}

/// `HH:MM:SS.ffffff`, possibly negative.
fn parse_timestamp(value: &str) -> Option<f64> {
    let (negative, value) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value),
    };
    let mut parts = value.splitn(3, ':');
    let hours = parts.next()?.parse::<f64>().ok()?;
    let minutes = parts.next()?.parse::<f64>().ok()?;
    let seconds = parts.next()?.parse::<f64>().ok()?;
    let total = hours * 3_600.0 + minutes * 60.0 + seconds;
    Some(if negative { -total } else { total })
}
