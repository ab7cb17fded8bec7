pub mod extract;
pub mod probe;

pub use extract::{build_filter_graph, extract_segments};
pub use probe::{check_ffmpeg, check_ffprobe, get_video_duration};

use std::fmt;

/// A validated `[start, end)` interval of the source video, in whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    start: u64,
    end: u64,
}

impl TimeRange {
    /// Returns `None` unless `start < end`.
    pub fn new(start: u64, end: u64) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    /// Length of this range in seconds.
    pub fn duration(&self) -> u64 {
        self.end - self.start
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", format_hms(self.start), format_hms(self.end))
    }
}

/// Format whole seconds as `HH:MM:SS`.
pub fn format_hms(seconds: u64) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}
