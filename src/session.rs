use crate::config::Config;
use crate::error::{Result, VidqueryError};
use crate::media::{extract_segments, get_video_duration};
use crate::model::{
    prepare_payload, Conversation, MediaPayload, ModelBackend, ModelGateway, OutputSchema, Part,
    TokenUsage, CHAT_SYSTEM_INSTRUCTION,
};
use crate::source::VideoSource;
use crate::validate::get_validated_ranges;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

const HIGHLIGHT_INSTRUCTION: &str = "You are an expert video analyst. Carefully examine the provided video thoroughly. Identify and provide timestamps of any potential highlights, significant events, key, or noteworthy moments found within the video. Keep it concise";

const MOMENT_INSTRUCTION: &str = "You are a highly skilled expert in video analysis with deep expertise in frame-by-frame inspection, scene recognition, and precise timestamp identification. Your task is to carefully examine a given video and accurately determine the exact timestamp(s) that correspond to the user's query, only if it exist in the video. You must ensure a thorough and detailed analysis before making a decision. Maintain accuracy, attention to detail while delivering results with consistent and correct formatting.";

/// Result of a highlight or moment request.
///
/// `clip` is set only when a new video file was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    pub clip: Option<PathBuf>,
    pub message: String,
}

impl TaskOutcome {
    fn message(message: impl Into<String>) -> Self {
        Self {
            clip: None,
            message: message.into(),
        }
    }
}

struct TaskMessages {
    found: &'static str,
    not_found: &'static str,
}

/// One ingested video and everything the model has seen of it.
pub struct VideoSession {
    locator: String,
    video_path: PathBuf,
    duration: f64,
    payload: MediaPayload,
    gateway: ModelGateway,
    conversation: Conversation,
    max_retries: u32,
    clip_dir: Option<PathBuf>,
}

impl VideoSession {
    /// Resolve, download, probe and upload a video, then open the chat.
    ///
    /// Any failure after the locator is recognized is reported as ingestion failure.
    pub async fn open(
        locator: &str,
        config: &Config,
        backend: Arc<dyn ModelBackend>,
    ) -> Result<Self> {
        let source = VideoSource::classify(locator)?;
        info!("Opening session for {}", source);

        Self::ingest(&source, config, backend)
            .await
            .map_err(VidqueryError::into_ingestion)
    }

    async fn ingest(
        source: &VideoSource,
        config: &Config,
        backend: Arc<dyn ModelBackend>,
    ) -> Result<Self> {
        let http = reqwest::Client::new();
        let video_path = source.fetch(&config.staging_dir, &http).await?;
        let duration = get_video_duration(&video_path)?;
        let payload = prepare_payload(backend.as_ref(), &video_path, &config.upload_poll).await?;
        let gateway = ModelGateway::new(backend, config.generation.clone());

        Self::start(source.locator(), video_path, duration, payload, gateway, config).await
    }

    /// Build a session around an already staged and probed video.
    pub async fn start(
        locator: String,
        video_path: PathBuf,
        duration: f64,
        payload: MediaPayload,
        mut gateway: ModelGateway,
        config: &Config,
    ) -> Result<Self> {
        let conversation = gateway
            .open_conversation(CHAT_SYSTEM_INSTRUCTION, payload.to_part())
            .await?;

        info!(
            "Session ready: {} ({:.1}s, {})",
            video_path.display(),
            duration,
            if payload.is_inline() { "inline" } else { "uploaded" }
        );

        Ok(Self {
            locator,
            video_path,
            duration,
            payload,
            gateway,
            conversation,
            max_retries: config.max_retries,
            clip_dir: config.clip_dir.clone(),
        })
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn video_path(&self) -> &Path {
        &self.video_path
    }

    /// Probed duration in seconds. Every range is validated against it.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn token_usage(&self) -> TokenUsage {
        self.gateway.usage()
    }

    /// Ask a free-form question. Never fails; errors come back as text.
    pub async fn ask(&mut self, question: &str) -> String {
        self.gateway.converse(&mut self.conversation, question).await
    }

    /// Cut the model's highlights into one clip.
    pub async fn generate_highlights(&mut self) -> TaskOutcome {
        let parts = vec![self.payload.to_part()];
        self.run_task(
            parts,
            HIGHLIGHT_INSTRUCTION,
            OutputSchema::Highlights,
            TaskMessages {
                found: "Highlights generated!",
                not_found: "No highlight found!",
            },
        )
        .await
    }

    /// Find the moment described by `query` and cut it into a clip.
    pub async fn identify_moment(&mut self, query: &str) -> TaskOutcome {
        let parts = vec![self.payload.to_part(), Part::text(capitalize(query))];
        self.run_task(
            parts,
            MOMENT_INSTRUCTION,
            OutputSchema::Moment,
            TaskMessages {
                found: "Moment identified!",
                not_found: "Moment could not be found within the video",
            },
        )
        .await
    }

    async fn run_task(
        &mut self,
        parts: Vec<Part>,
        instruction: &str,
        schema: OutputSchema,
        messages: TaskMessages,
    ) -> TaskOutcome {
        match self.try_task(&parts, instruction, schema).await {
            Ok(Some(clip)) => TaskOutcome {
                clip: Some(clip),
                message: messages.found.to_string(),
            },
            Ok(None) => TaskOutcome::message(messages.not_found),
            Err(e) => {
                warn!("Task failed: {}", e);
                TaskOutcome::message(format!("Process interrupted. Error occurred: {e}"))
            }
        }
    }

    async fn try_task(
        &mut self,
        parts: &[Part],
        instruction: &str,
        schema: OutputSchema,
    ) -> Result<Option<PathBuf>> {
        let ranges = get_validated_ranges(
            &mut self.gateway,
            parts,
            instruction,
            schema,
            self.max_retries,
            self.duration,
        )
        .await?;

        if ranges.is_empty() {
            return Ok(None);
        }

        let clip = self.new_clip_path()?;
        if let Err(e) = extract_segments(&self.video_path, &ranges, &clip).await {
            let _ = std::fs::remove_file(&clip);
            return Err(e);
        }
        Ok(Some(clip))
    }

    /// A fresh, uniquely named `.mp4` path that outlives the session.
    fn new_clip_path(&self) -> Result<PathBuf> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("vidquery-").suffix(".mp4");

        let file = match &self.clip_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                builder.tempfile_in(dir)?
            }
            None => builder.tempfile()?,
        };

        let (_, path) = file.keep().map_err(|e| e.error)?;
        Ok(path)
    }
}

/// Trim and capitalize like a sentence: first letter upper, rest lower.
pub fn capitalize(query: &str) -> String {
    let mut chars = query.trim().chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}
