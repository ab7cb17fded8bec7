use std::path::Path;

use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{Result, VidqueryError};

use super::probe::{check_ffmpeg, get_video_duration};
use super::TimeRange;

/// Build the `-filter_complex` graph that trims every range out of input 0
/// and concatenates the pieces in the given order.
///
/// Each range yields a video and an audio branch, both reset to start at zero.
/// Ranges are neither reordered nor merged.
pub fn build_filter_graph(ranges: &[TimeRange]) -> String {
    let mut graph = String::new();
    let mut concat_inputs = String::new();

    for (i, range) in ranges.iter().enumerate() {
        graph.push_str(&format!(
            "[0:v]trim=start={}:end={},setpts=PTS-STARTPTS[v{i}];",
            range.start(),
            range.end()
        ));
        graph.push_str(&format!(
            "[0:a]atrim=start={}:end={},asetpts=PTS-STARTPTS[a{i}];",
            range.start(),
            range.end()
        ));
        concat_inputs.push_str(&format!("[v{i}][a{i}]"));
    }

    graph.push_str(&format!(
        "{concat_inputs}concat=n={}:v=1:a=1[outv][outa]",
        ranges.len()
    ));
    graph
}

/// Cut `ranges` out of `source` and write them, in order, as one H.264/AAC file.
///
/// The source is probed again first; a range that ends past the real media
/// length is reported instead of being silently truncated by FFmpeg.
pub async fn extract_segments(source: &Path, ranges: &[TimeRange], output: &Path) -> Result<()> {
    check_ffmpeg()?;

    if !source.exists() {
        return Err(VidqueryError::FileNotFound(source.display().to_string()));
    }

    if ranges.is_empty() {
        return Err(VidqueryError::MediaProcessing(
            "No segments to extract".to_string(),
        ));
    }

    let media_length = get_video_duration(source)?;
    if let Some(range) = ranges.iter().find(|r| r.end() as f64 > media_length) {
        return Err(VidqueryError::MediaProcessing(format!(
            "Segment {range} ends after the end of the media ({media_length:.2}s)"
        )));
    }

    let filter_graph = build_filter_graph(ranges);
    info!(
        "Extracting {} segment(s) from {} into {}",
        ranges.len(),
        source.display(),
        output.display()
    );
    debug!("FFmpeg filter graph: {}", filter_graph);

    let result = Command::new("ffmpeg")
        .args(["-y", "-i"])
        .arg(source)
        .args(["-filter_complex", &filter_graph])
        .args(["-map", "[outv]", "-map", "[outa]"])
        .args(["-c:v", "libx264", "-c:a", "aac"])
        .arg(output)
        .output()
        .await
        .map_err(|e| VidqueryError::MediaProcessing(format!("Failed to run FFmpeg: {e}")))?;

    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
        return Err(VidqueryError::MediaProcessing(format!(
            "FFmpeg exited with {}: {}",
            result.status,
            tail.into_iter().rev().collect::<Vec<_>>().join("\n")
        )));
    }

    if !output.exists() {
        return Err(VidqueryError::MediaProcessing(
            "Output file was not created".to_string(),
        ));
    }

    info!("Clip written to {}", output.display());
    Ok(())
}
