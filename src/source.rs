//! Resolving a user-supplied locator into a local video file.

use crate::error::{Result, VidqueryError};
use futures::StreamExt;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

/// Length of a YouTube video id.
const YOUTUBE_ID_LEN: usize = 11;

/// Where a video comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoSource {
    YouTube { url: String, video_id: String },
    DirectUrl(String),
    LocalFile(PathBuf),
}

impl VideoSource {
    /// Classify a locator: sharing link first, then direct `.mp4` URL, then local path.
    pub fn classify(locator: &str) -> Result<Self> {
        let locator = locator.trim();

        if let Some(video_id) = youtube_video_id(locator) {
            return Ok(VideoSource::YouTube {
                url: locator.to_string(),
                video_id,
            });
        }

        if is_direct_video_url(locator) {
            return Ok(VideoSource::DirectUrl(locator.to_string()));
        }

        let path = Path::new(locator);
        if !locator.is_empty() && path.is_file() {
            return Ok(VideoSource::LocalFile(path.to_path_buf()));
        }

        Err(VidqueryError::InputResolution(format!(
            "{locator:?} is not a YouTube link, an https .mp4 URL or an existing file"
        )))
    }

    /// The locator as the user gave it.
    pub fn locator(&self) -> String {
        match self {
            VideoSource::YouTube { url, .. } | VideoSource::DirectUrl(url) => url.clone(),
            VideoSource::LocalFile(path) => path.display().to_string(),
        }
    }

    /// Bring the video into `staging_dir` and return its local path.
    pub async fn fetch(&self, staging_dir: &Path, http: &reqwest::Client) -> Result<PathBuf> {
        fs::create_dir_all(staging_dir).await?;

        match self {
            VideoSource::YouTube { url, .. } => download_youtube(url, staging_dir).await,
            VideoSource::DirectUrl(url) => {
                download_direct(http, url, &staging_dir.join("video.mp4")).await
            }
            VideoSource::LocalFile(path) => stage_local(path, staging_dir).await,
        }
    }
}

impl fmt::Display for VideoSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VideoSource::YouTube { video_id, .. } => write!(f, "YouTube video {video_id}"),
            VideoSource::DirectUrl(url) => write!(f, "{url}"),
            VideoSource::LocalFile(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Extract the 11-character id from a `youtu.be`, `youtube.com/watch` or
/// `youtube.com/shorts` link.
pub fn youtube_video_id(url: &str) -> Option<String> {
    let last_segment = |u: &str| {
        u.rsplit('/')
            .next()
            .and_then(|s| s.split('?').next())
            .map(str::to_string)
    };

    let candidate = if url.contains("youtu.be") {
        last_segment(url)
    } else if url.contains("youtube.com/watch") {
        url.split_once("v=")
            .and_then(|(_, rest)| rest.split('&').next())
            .map(str::to_string)
    } else if url.contains("youtube.com/shorts") {
        last_segment(url)
    } else {
        None
    };

    candidate.filter(|id| id.chars().count() == YOUTUBE_ID_LEN)
}

/// An https URL pointing straight at an `.mp4` file.
pub fn is_direct_video_url(url: &str) -> bool {
    url.starts_with("https") && url.ends_with(".mp4")
}

/// Download a YouTube video with `yt-dlp` into `staging_dir`.
pub async fn download_youtube(url: &str, staging_dir: &Path) -> Result<PathBuf> {
    let output_template = staging_dir.join("%(id)s.%(ext)s");
    info!("Downloading {} with yt-dlp", url);

    let output = Command::new("yt-dlp")
        .arg(url)
        .args(["--no-playlist", "--print", "after_move:filepath", "-f", "best", "-o"])
        .arg(&output_template)
        .output()
        .await
        .map_err(|e| {
            VidqueryError::Ingestion(format!(
                "yt-dlp not found. Please install yt-dlp and ensure it's in your PATH. Error: {e}"
            ))
        })?;

    if !output.status.success() {
        return Err(VidqueryError::Ingestion(format!(
            "Failed to download {url}: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let path = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| VidqueryError::Ingestion("yt-dlp did not report a file".to_string()))?;

    info!("Downloaded to {}", path.display());
    Ok(path)
}

/// Stream a remote file to `dest`.
pub async fn download_direct(http: &reqwest::Client, url: &str, dest: &Path) -> Result<PathBuf> {
    info!("Downloading {}", url);

    let response = http.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(VidqueryError::Ingestion(format!(
            "Download of {url} failed with status {status}"
        )));
    }

    let mut file = fs::File::create(dest).await?;
    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    debug!("Wrote {} bytes to {}", written, dest.display());
    Ok(dest.to_path_buf())
}

/// Copy a local file into the staging directory, keeping its extension.
async fn stage_local(path: &Path, staging_dir: &Path) -> Result<PathBuf> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("mp4");
    let dest = staging_dir.join(format!("video.{ext}"));

    let same_file = match (fs::canonicalize(path).await, fs::canonicalize(&dest).await) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    };
    if same_file {
        return Ok(dest);
    }

    fs::copy(path, &dest).await?;
    debug!("Staged {} as {}", path.display(), dest.display());
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_youtube_patterns() {
        assert_eq!(
            youtube_video_id("https://youtu.be/dQw4w9WgXcQ").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(
            youtube_video_id("https://youtu.be/dQw4w9WgXcQ?si=abc").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(
            youtube_video_id("https://youtube.com/watch?v=dQw4w9WgXcQ&t=5").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(
            youtube_video_id("https://www.youtube.com/shorts/dQw4w9WgXcQ").as_deref(),
            Some("dQw4w9WgXcQ")
        );
    }

    #[test]
    fn test_youtube_rejects_wrong_length_ids() {
        assert!(youtube_video_id("https://youtu.be/short").is_none());
        assert!(youtube_video_id("https://youtube.com/watch?list=abc").is_none());
        assert!(youtube_video_id("https://youtube.com/watch?v=dQw4w9WgXcQextra").is_none());
    }

    #[test]
    fn test_classify_order() {
        assert!(matches!(
            VideoSource::classify("https://youtu.be/XXXXXXXXXXX").unwrap(),
            VideoSource::YouTube { .. }
        ));
        assert!(matches!(
            VideoSource::classify("https://youtube.com/watch?v=XXXXXXXXXXX&t=5").unwrap(),
            VideoSource::YouTube { .. }
        ));
        assert_eq!(
            VideoSource::classify("https://example.com/clip.mp4").unwrap(),
            VideoSource::DirectUrl("https://example.com/clip.mp4".to_string())
        );
    }

    #[test]
    fn test_classify_rejects_unknown() {
        assert!(matches!(
            VideoSource::classify("http://example.com/clip.mp4"),
            Err(VidqueryError::InputResolution(_))
        ));
        assert!(matches!(
            VideoSource::classify("/nonexistent/clip.mov"),
            Err(VidqueryError::InputResolution(_))
        ));
        assert!(VideoSource::classify("").is_err());
    }

    #[test]
    fn test_classify_local_file() {
        let file = tempfile::Builder::new().suffix(".mov").tempfile().unwrap();
        let locator = file.path().to_str().unwrap();
        assert_eq!(
            VideoSource::classify(locator).unwrap(),
            VideoSource::LocalFile(file.path().to_path_buf())
        );
    }

    #[tokio::test]
    async fn test_local_file_is_copied_not_moved() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("holiday.mkv");
        std::fs::write(&original, b"frames").unwrap();
        let staging = dir.path().join("staging");

        let source = VideoSource::classify(original.to_str().unwrap()).unwrap();
        let staged = source
            .fetch(&staging, &reqwest::Client::new())
            .await
            .unwrap();

        assert_eq!(staged, staging.join("video.mkv"));
        assert!(original.exists());
        assert_eq!(std::fs::read(&staged).unwrap(), b"frames");
    }

    #[tokio::test]
    async fn test_staging_the_staged_file_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let staged = dir.path().join("video.mp4");
        std::fs::write(&staged, b"frames").unwrap();

        let result = stage_local(&staged, dir.path()).await.unwrap();
        assert_eq!(result, staged);
        assert_eq!(std::fs::read(&staged).unwrap(), b"frames");
    }
}
