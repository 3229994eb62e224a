//! Parser for ffmpeg diagnostic (stderr) output

use crate::error::TranscodeError;
use regex::Regex;
use std::sync::OnceLock;

/// Metadata recovered from the diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Diagnostics {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Duration in whole seconds, rounded up
    pub duration_secs: u64,
}

fn resolution_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::expect_used)]
    RE.get_or_init(|| Regex::new(r"Video: .*? (\d{3,4})x(\d{3,4})").expect("valid regex"))
}

fn time_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::expect_used)]
    RE.get_or_init(|| {
        Regex::new(r"time=(\d{2}):(\d{2}):(\d{2})\.(\d{2})").expect("valid regex")
    })
}

/// Extract resolution and duration from the accumulated diagnostic text
///
/// The *last* resolution marker and the *last* progress time marker win.
/// Hundredths of a second round the duration up to the next whole second.
pub fn parse_diagnostics(output: &str) -> Result<Diagnostics, TranscodeError> {
    let resolution = resolution_regex()
        .captures_iter(output)
        .last()
        .ok_or(TranscodeError::MissingResolution)?;
    let time = time_regex()
        .captures_iter(output)
        .last()
        .ok_or(TranscodeError::MissingDuration)?;

    let width = number::<u32>(&resolution[1], "width")?;
    let height = number::<u32>(&resolution[2], "height")?;

    let hours = number::<u64>(&time[1], "hours")?;
    let minutes = number::<u64>(&time[2], "minutes")?;
    let seconds = number::<u64>(&time[3], "seconds")?;
    let hundredths = number::<u64>(&time[4], "hundredths")?;

    Ok(Diagnostics {
        width,
        height,
        duration_secs: hours * 3600 + minutes * 60 + seconds + u64::from(hundredths > 0),
    })
}

/// Last non-empty line of the diagnostic output (error context)
pub fn last_line(output: &str) -> String {
    output
        .lines()
        .flat_map(|line| line.split('\r'))
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .unwrap_or_default()
        .to_string()
}

fn number<T: std::str::FromStr>(value: &str, field: &'static str) -> Result<T, TranscodeError> {
    value.parse().map_err(|_| TranscodeError::InvalidMarker {
        field,
        value: value.to_string(),
    })
}
