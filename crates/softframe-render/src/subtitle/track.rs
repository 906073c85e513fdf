//! SRT subtitle tracks.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubtitleError {
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("subtitle file contains no cues")]
    EmptyFile,
}

/// One timed subtitle cue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleCue {
    pub start: Duration,
    pub end: Duration,
    /// Cue text; lines joined with `\n`.
    pub text: String,
}

/// A parsed subtitle track, cues sorted by start time.
#[derive(Debug, Clone, Default)]
pub struct SubtitleTrack {
    cues: Vec<SubtitleCue>,
}

impl SubtitleTrack {
    /// Parse SubRip text.
    ///
    /// Blocks without a `-->` line are skipped; a malformed timestamp is an
    /// error.
    pub fn from_srt(content: &str) -> Result<Self, SubtitleError> {
        let content = content.replace("\r\n", "\n");
        let content = content.trim_start_matches('\u{feff}');
        let mut cues = Vec::new();

        for block in content.split("\n\n") {
            let lines: Vec<&str> = block.trim().lines().collect();
            let Some(timing) = lines.iter().position(|l| l.contains("-->")) else {
                continue;
            };
            let (start, end) = parse_timing(lines[timing])?;
            let text = lines[timing + 1..]
                .iter()
                .map(|l| strip_tags(l))
                .collect::<Vec<_>>()
                .join("\n");
            if !text.trim().is_empty() && end > start {
                cues.push(SubtitleCue { start, end, text });
            }
        }

        if cues.is_empty() {
            return Err(SubtitleError::EmptyFile);
        }
        cues.sort_by_key(|c| c.start);
        Ok(Self { cues })
    }

    /// Text of the first cue covering `position`.
    pub fn active_text(&self, position: Duration) -> Option<&str> {
        // Overlapping cues: the earliest start wins.
        let candidates = self.cues.partition_point(|c| c.start <= position);
        self.cues[..candidates]
            .iter()
            .find(|c| position < c.end)
            .map(|c| c.text.as_str())
    }

    /// Same as [`SubtitleTrack::active_text`] for a position in seconds.
    pub fn active_text_at_secs(&self, seconds: f64) -> Option<&str> {
        let position = Duration::try_from_secs_f64(seconds).ok()?;
        self.active_text(position)
    }

    pub fn cues(&self) -> &[SubtitleCue] {
        &self.cues
    }

    pub fn len(&self) -> usize {
        self.cues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }
}

/// Parse `00:00:01,000 --> 00:00:04,000`, ignoring trailing cue settings.
fn parse_timing(line: &str) -> Result<(Duration, Duration), SubtitleError> {
    let (start, rest) = line
        .split_once("-->")
        .ok_or_else(|| SubtitleError::InvalidTimestamp(line.to_string()))?;
    let end = rest.split_whitespace().next().unwrap_or_default();
    Ok((parse_timestamp(start.trim())?, parse_timestamp(end)?))
}

/// `HH:MM:SS,mmm` or `MM:SS.mmm`.
fn parse_timestamp(s: &str) -> Result<Duration, SubtitleError> {
    let invalid = || SubtitleError::InvalidTimestamp(s.to_string());
    let normalized = s.replace(',', ".");
    let parts: Vec<&str> = normalized.split(':').collect();
    let (hours, minutes, seconds) = match parts.as_slice() {
        [m, sec] => (0, m.parse::<u64>().map_err(|_| invalid())?, *sec),
        [h, m, sec] => (
            h.parse::<u64>().map_err(|_| invalid())?,
            m.parse::<u64>().map_err(|_| invalid())?,
            *sec,
        ),
        _ => return Err(invalid()),
    };
    let (whole, frac) = seconds.split_once('.').unwrap_or((seconds, "0"));
    let whole: u64 = whole.parse().map_err(|_| invalid())?;
    let digits: String = frac.chars().take(3).collect();
    let millis: u64 = format!("{:0<3}", digits).parse().map_err(|_| invalid())?;
    Ok(Duration::from_millis(
        ((hours * 60 + minutes) * 60 + whole) * 1000 + millis,
    ))
}

/// Drop `<i>`-style markup.
fn strip_tags(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut in_tag = false;
    for c in line.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}
