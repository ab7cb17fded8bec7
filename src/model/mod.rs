pub mod gateway;
pub mod gemini;
pub mod payload;
pub mod schema;

pub use gateway::{Conversation, ModelGateway, TokenUsage, CHAT_SYSTEM_INSTRUCTION};
pub use gemini::{
    Content, FileState, GenerateContentRequest, GenerateContentResponse, GeminiClient, Part,
    RemoteFile, UsageMetadata,
};
pub use payload::{guess_mime_type, prepare_payload, MediaPayload, INLINE_SIZE_THRESHOLD};
pub use schema::{OutputSchema, RawTimestamp, StructuredQueryResult};

use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

/// The remote multimodal model, seen as a black box.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// One generateContent round trip.
    async fn generate_content(
        &self,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse>;

    /// Upload a local file out-of-band and return its handle.
    async fn upload_file(&self, path: &Path, mime_type: &str) -> Result<RemoteFile>;

    /// Fetch the current state of an uploaded file.
    async fn get_file(&self, name: &str) -> Result<RemoteFile>;

    fn name(&self) -> &'static str;
}
