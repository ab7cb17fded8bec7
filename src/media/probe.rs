use std::path::Path;
use std::process::Command;

use serde::Deserialize;
use tracing::debug;

use crate::error::{Result, VidqueryError};

/// Check if FFmpeg is installed and accessible.
pub fn check_ffmpeg() -> Result<()> {
    check_tool("ffmpeg")
}

/// Check if FFprobe is installed and accessible.
pub fn check_ffprobe() -> Result<()> {
    check_tool("ffprobe")
}

fn check_tool(tool: &str) -> Result<()> {
    let output = Command::new(tool).arg("-version").output().map_err(|e| {
        VidqueryError::MediaProcessing(format!(
            "{tool} not found. Please install FFmpeg and ensure it's in your PATH. Error: {e}"
        ))
    })?;

    if !output.status.success() {
        return Err(VidqueryError::MediaProcessing(format!(
            "{tool} check failed"
        )));
    }

    debug!("{} is available", tool);
    Ok(())
}

#[derive(Deserialize)]
struct ProbeOutput {
    format: ProbeFormat,
}

#[derive(Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Get the container duration of a media file in seconds.
pub fn get_video_duration(input: &Path) -> Result<f64> {
    if !input.exists() {
        return Err(VidqueryError::FileNotFound(input.display().to_string()));
    }
    check_ffprobe()?;

    let output = Command::new("ffprobe")
        .args(["-v", "quiet", "-print_format", "json", "-show_format"])
        .arg(input)
        .output()
        .map_err(|e| VidqueryError::Probe(format!("Failed to run FFprobe: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(VidqueryError::Probe(format!(
            "FFprobe failed on {}: {stderr}",
            input.display()
        )));
    }

    let duration = parse_probe_duration(&String::from_utf8_lossy(&output.stdout))?;
    debug!("Probed duration of {}: {:.3}s", input.display(), duration);
    Ok(duration)
}

fn parse_probe_duration(json: &str) -> Result<f64> {
    let probe: ProbeOutput = serde_json::from_str(json)
        .map_err(|e| VidqueryError::Probe(format!("Unreadable FFprobe output: {e}")))?;

    let raw = probe
        .format
        .duration
        .ok_or_else(|| VidqueryError::Probe("Container reports no duration".to_string()))?;

    let duration: f64 = raw
        .trim()
        .parse()
        .map_err(|e| VidqueryError::Probe(format!("Failed to parse duration '{raw}': {e}")))?;

    if !duration.is_finite() || duration <= 0.0 {
        return Err(VidqueryError::Probe(format!("Invalid duration: {raw}")));
    }

    Ok(duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ffprobe_available() -> bool {
        Command::new("ffprobe")
            .arg("-version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    #[test]
    fn test_check_ffprobe_matches_availability() {
        match check_ffprobe() {
            Ok(()) => assert!(ffprobe_available()),
            Err(VidqueryError::MediaProcessing(msg)) => {
                assert!(!ffprobe_available());
                assert!(msg.contains("ffprobe"));
            }
            Err(other) => panic!("Unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_duration_requires_ffprobe() {
        if ffprobe_available() {
            eprintln!("Skipping test: FFprobe is installed");
            return;
        }

        let file = tempfile::Builder::new().suffix(".mp4").tempfile().unwrap();
        assert!(matches!(
            get_video_duration(file.path()),
            Err(VidqueryError::MediaProcessing(_))
        ));
    }

    #[test]
    fn test_parse_probe_duration() {
        let json = r#"{"format": {"filename": "a.mp4", "duration": "63.480000"}}"#;
        let duration = parse_probe_duration(json).unwrap();
        assert!((duration - 63.48).abs() < 1e-9);
    }

    #[test]
    fn test_parse_probe_duration_missing() {
        let json = r#"{"format": {"filename": "a.txt"}}"#;
        assert!(matches!(
            parse_probe_duration(json),
            Err(VidqueryError::Probe(_))
        ));
    }

    #[test]
    fn test_parse_probe_duration_garbage() {
        assert!(parse_probe_duration("").is_err());
        assert!(parse_probe_duration(r#"{"format": {"duration": "N/A"}}"#).is_err());
    }

    #[test]
    fn test_duration_file_not_found() {
        let result = get_video_duration(Path::new("/nonexistent/video.mp4"));
        match result {
            Err(VidqueryError::FileNotFound(path)) => assert!(path.contains("nonexistent")),
            other => panic!("Expected FileNotFound error, got: {other:?}"),
        }
    }

    #[test]
    fn test_duration_of_non_media_file() {
        if !ffprobe_available() {
            eprintln!("Skipping test: FFprobe not available");
            return;
        }

        let file = tempfile::Builder::new().suffix(".mp4").tempfile().unwrap();
        std::fs::write(file.path(), b"definitely not a video").unwrap();

        assert!(get_video_duration(file.path()).is_err());
    }
}
