use crate::config::UploadPollSettings;
use crate::error::{Result, VidqueryError};
use crate::model::gemini::{Blob, FileData, FileState, Part, RemoteFile};
use crate::model::ModelBackend;
use base64::Engine;
use std::path::Path;
use std::time::Instant;
use tokio::fs;
use tracing::{debug, info};

/// Videos up to 19.5 MB are sent inline; anything larger goes through the Files API.
pub const INLINE_SIZE_THRESHOLD: u64 = 19 * 1024 * 1024 + 512 * 1024;

/// The video as presented to the model. Immutable once prepared.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaPayload {
    Inline {
        mime_type: String,
        /// Base64-encoded file contents.
        data: String,
    },
    Remote {
        name: String,
        uri: String,
        mime_type: String,
    },
}

impl MediaPayload {
    /// The request part referencing this video.
    pub fn to_part(&self) -> Part {
        match self {
            MediaPayload::Inline { mime_type, data } => Part::InlineData {
                inline_data: Blob {
                    mime_type: mime_type.clone(),
                    data: data.clone(),
                },
            },
            MediaPayload::Remote { uri, mime_type, .. } => Part::FileData {
                file_data: FileData {
                    mime_type: mime_type.clone(),
                    file_uri: uri.clone(),
                },
            },
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, MediaPayload::Inline { .. })
    }
}

/// Get MIME type for a video file from its extension.
pub fn guess_mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase);

    match ext.as_deref() {
        Some("mp4") | Some("m4v") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("avi") => "video/x-msvideo",
        Some("mkv") => "video/x-matroska",
        Some("webm") => "video/webm",
        Some("mpeg") | Some("mpg") => "video/mpeg",
        Some("flv") => "video/x-flv",
        Some("wmv") => "video/x-ms-wmv",
        Some("3gp") => "video/3gpp",
        _ => "video/mp4",
    }
}

/// Turn a local video into something the model can reference.
///
/// Small files are inlined. Large files are uploaded and polled until the
/// remote side finishes processing; a `FAILED` state is fatal.
pub async fn prepare_payload(
    backend: &dyn ModelBackend,
    path: &Path,
    poll: &UploadPollSettings,
) -> Result<MediaPayload> {
    let size = fs::metadata(path).await?.len();
    let mime_type = guess_mime_type(path);

    if size <= INLINE_SIZE_THRESHOLD {
        debug!("Using inline video data ({} bytes)", size);
        let bytes = fs::read(path).await?;
        return Ok(MediaPayload::Inline {
            mime_type: mime_type.to_string(),
            data: base64::engine::general_purpose::STANDARD.encode(&bytes),
        });
    }

    info!(
        "Uploading {} ({} bytes) to {}",
        path.display(),
        size,
        backend.name()
    );
    let uploaded = backend.upload_file(path, mime_type).await?;
    let file = wait_until_ready(backend, uploaded, poll).await?;

    Ok(MediaPayload::Remote {
        mime_type: file
            .mime_type
            .clone()
            .unwrap_or_else(|| mime_type.to_string()),
        name: file.name,
        uri: file.uri,
    })
}

async fn wait_until_ready(
    backend: &dyn ModelBackend,
    mut file: RemoteFile,
    poll: &UploadPollSettings,
) -> Result<RemoteFile> {
    let started = Instant::now();
    let mut interval = poll.initial_interval();

    while file.state == FileState::Processing {
        if let Some(timeout) = poll.timeout() {
            if started.elapsed() >= timeout {
                return Err(VidqueryError::Ingestion(format!(
                    "{} still processing after {:?}",
                    file.name, timeout
                )));
            }
        }

        debug!("{} is processing, checking again in {:?}", file.name, interval);
        tokio::time::sleep(interval).await;
        file = backend.get_file(&file.name).await?;
        interval = poll.next_interval(interval);
    }

    if file.state == FileState::Failed {
        return Err(VidqueryError::Ingestion(format!(
            "Remote processing of {} failed",
            file.name
        )));
    }

    info!("{} is ready", file.name);
    Ok(file)
}
