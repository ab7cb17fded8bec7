use crate::config::GenerationSettings;
use crate::error::{Result, VidqueryError};
use crate::model::gemini::{
    Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig, Part,
    UsageMetadata,
};
use crate::model::schema::{OutputSchema, StructuredQueryResult};
use crate::model::ModelBackend;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// System instruction for the free-form question answering chat.
pub const CHAT_SYSTEM_INSTRUCTION: &str = "You are an expert video analyzer, and your job is to answer the user's query based on the provided video. Always respond in a natural tone.";

/// Running token totals for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
    pub total: u64,
}

impl TokenUsage {
    /// Add whichever counters the response reported. Missing ones change nothing.
    pub fn record(&mut self, usage: &UsageMetadata) {
        self.input += usage.prompt_token_count.unwrap_or(0);
        self.output += usage.candidates_token_count.unwrap_or(0);
        self.total += usage.total_token_count.unwrap_or(0);
    }
}

impl fmt::Display for TokenUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "input {} / output {} / total {}",
            self.input, self.output, self.total
        )
    }
}

/// Multi-turn chat context whose first user turn is the video itself.
#[derive(Debug, Clone)]
pub struct Conversation {
    system_instruction: String,
    history: Vec<Content>,
}

impl Conversation {
    pub fn history(&self) -> &[Content] {
        &self.history
    }
}

/// Wraps the model backend with the two calling conventions the app needs.
///
/// `converse` never fails: errors come back as an apology the user can read.
/// `generate_structured` is contract-bound and propagates every error so the
/// caller can decide how to retry.
pub struct ModelGateway {
    backend: Arc<dyn ModelBackend>,
    generation: GenerationSettings,
    usage: TokenUsage,
}

impl ModelGateway {
    pub fn new(backend: Arc<dyn ModelBackend>, generation: GenerationSettings) -> Self {
        Self {
            backend,
            generation,
            usage: TokenUsage::default(),
        }
    }

    pub fn usage(&self) -> TokenUsage {
        self.usage
    }

    fn record_usage(&mut self, response: &GenerateContentResponse) {
        if let Some(usage) = &response.usage_metadata {
            self.usage.record(usage);
        }
    }

    fn request(
        &self,
        contents: Vec<Content>,
        system_instruction: &str,
        generation_config: GenerationConfig,
    ) -> GenerateContentRequest {
        GenerateContentRequest {
            contents,
            system_instruction: Some(Content::instruction(system_instruction)),
            generation_config: Some(generation_config),
        }
    }

    /// Start a chat by sending the video as its first turn.
    pub async fn open_conversation(
        &mut self,
        system_instruction: &str,
        video: Part,
    ) -> Result<Conversation> {
        let mut conversation = Conversation {
            system_instruction: system_instruction.to_string(),
            history: vec![Content::user(vec![video])],
        };

        let request = self.request(
            conversation.history.clone(),
            system_instruction,
            GenerationConfig::from(&self.generation),
        );
        let response = self.backend.generate_content(&request).await?;
        self.record_usage(&response);

        let text = response.text().ok_or_else(|| {
            VidqueryError::Ingestion("Model returned no reply to the video".to_string())
        })?;
        conversation.history.push(Content::model(text));

        debug!("Conversation opened, usage so far: {}", self.usage);
        Ok(conversation)
    }

    /// Send one user message and return the reply text.
    pub async fn converse(&mut self, conversation: &mut Conversation, message: &str) -> String {
        conversation
            .history
            .push(Content::user(vec![Part::text(message)]));

        match self.send_turn(conversation).await {
            Ok(reply) => {
                conversation.history.push(Content::model(reply.clone()));
                reply
            }
            Err(e) => {
                // Keep the history alternating user/model.
                conversation.history.pop();
                warn!("Chat turn failed: {}", e);
                format!("I apologize, I encountered an error: {e}")
            }
        }
    }

    async fn send_turn(&mut self, conversation: &Conversation) -> Result<String> {
        let request = self.request(
            conversation.history.clone(),
            &conversation.system_instruction,
            GenerationConfig::from(&self.generation),
        );
        let response = self.backend.generate_content(&request).await?;
        self.record_usage(&response);

        response
            .text()
            .ok_or_else(|| VidqueryError::Api("Model returned an empty reply".to_string()))
    }

    /// Single-turn call constrained to JSON matching `schema`.
    ///
    /// A reply that does not decode against the schema is reported as
    /// [`VidqueryError::MalformedOutput`]; usage is recorded either way.
    pub async fn generate_structured(
        &mut self,
        parts: Vec<Part>,
        system_instruction: &str,
        schema: OutputSchema,
    ) -> Result<StructuredQueryResult> {
        let generation_config = GenerationConfig {
            response_mime_type: Some("application/json".to_string()),
            response_schema: Some(schema.to_json()),
            ..GenerationConfig::from(&self.generation)
        };
        let request = self.request(
            vec![Content::user(parts)],
            system_instruction,
            generation_config,
        );

        let response = self.backend.generate_content(&request).await?;
        self.record_usage(&response);

        let text = response.text().ok_or_else(|| {
            VidqueryError::MalformedOutput("structured reply had no text".to_string())
        })?;
        debug!("Structured reply: {}", text);

        serde_json::from_str(&text).map_err(|e| {
            let snippet: String = text.chars().take(200).collect();
            VidqueryError::MalformedOutput(format!("{e} in reply {snippet:?}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::testing::ScriptedBackend;

    fn gateway(backend: &Arc<ScriptedBackend>) -> ModelGateway {
        ModelGateway::new(backend.clone(), GenerationSettings::default())
    }

    #[test]
    fn test_usage_record_skips_missing_counters() {
        let mut usage = TokenUsage {
            input: 10,
            output: 5,
            total: 15,
        };
        usage.record(&UsageMetadata {
            prompt_token_count: Some(7),
            candidates_token_count: None,
            total_token_count: Some(0),
        });
        assert_eq!(
            usage,
            TokenUsage {
                input: 17,
                output: 5,
                total: 15
            }
        );
    }

    #[tokio::test]
    async fn test_open_conversation_seeds_history_and_usage() {
        let backend = Arc::new(ScriptedBackend::new().reply("I see a cat.", (100, 4, 104)));
        let mut gateway = gateway(&backend);

        let conversation = gateway
            .open_conversation(CHAT_SYSTEM_INSTRUCTION, Part::text("<video>"))
            .await
            .unwrap();

        assert_eq!(conversation.history().len(), 2);
        assert_eq!(conversation.history()[0].role.as_deref(), Some("user"));
        assert_eq!(conversation.history()[1], Content::model("I see a cat."));
        assert_eq!(gateway.usage().total, 104);
    }

    #[tokio::test]
    async fn test_converse_appends_turns_and_counts_tokens() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .reply("ok", (100, 1, 101))
                .reply("It is orange.", (110, 5, 115)),
        );
        let mut gateway = gateway(&backend);
        let mut conversation = gateway
            .open_conversation(CHAT_SYSTEM_INSTRUCTION, Part::text("<video>"))
            .await
            .unwrap();

        let answer = gateway
            .converse(&mut conversation, "What colour is the cat?")
            .await;

        assert_eq!(answer, "It is orange.");
        assert_eq!(conversation.history().len(), 4);
        assert_eq!(
            gateway.usage(),
            TokenUsage {
                input: 210,
                output: 6,
                total: 216
            }
        );

        // The second request carries the whole history, video first.
        let requests = backend.requests();
        assert_eq!(requests[1].contents.len(), 3);
        assert_eq!(requests[1].contents[0].parts[0], Part::text("<video>"));
    }

    #[tokio::test]
    async fn test_open_conversation_rejects_empty_reply() {
        let backend = Arc::new(ScriptedBackend::new().reply_without_usage(""));
        let mut gateway = gateway(&backend);

        let result = gateway
            .open_conversation(CHAT_SYSTEM_INSTRUCTION, Part::text("<video>"))
            .await;
        assert!(matches!(result, Err(VidqueryError::Ingestion(_))));
    }

    #[tokio::test]
    async fn test_reply_without_usage_keeps_totals() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .reply("ok", (100, 1, 101))
                .reply_without_usage("Sure."),
        );
        let mut gateway = gateway(&backend);
        let mut conversation = gateway
            .open_conversation(CHAT_SYSTEM_INSTRUCTION, Part::text("<video>"))
            .await
            .unwrap();

        assert_eq!(gateway.converse(&mut conversation, "Hi").await, "Sure.");
        assert_eq!(
            gateway.usage(),
            TokenUsage {
                input: 100,
                output: 1,
                total: 101
            }
        );
    }

    #[tokio::test]
    async fn test_converse_failure_becomes_apology() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .reply("ok", (100, 1, 101))
                .fail("503 overloaded"),
        );
        let mut gateway = gateway(&backend);
        let mut conversation = gateway
            .open_conversation(CHAT_SYSTEM_INSTRUCTION, Part::text("<video>"))
            .await
            .unwrap();
        let before = gateway.usage();

        let answer = gateway.converse(&mut conversation, "Hello?").await;

        assert!(answer.starts_with("I apologize, I encountered an error:"));
        assert!(answer.contains("503 overloaded"));
        assert_eq!(conversation.history().len(), 2);
        assert_eq!(gateway.usage(), before);
    }

    #[tokio::test]
    async fn test_generate_structured_requests_json() {
        let backend = Arc::new(ScriptedBackend::new().reply(
            r#"{"timestamp": {"start_time": "00:00:01", "end_time": "00:00:03"}}"#,
            (50, 10, 60),
        ));
        let mut gateway = gateway(&backend);

        let result = gateway
            .generate_structured(
                vec![Part::text("<video>"), Part::text("A dog")],
                "Find it",
                OutputSchema::Moment,
            )
            .await
            .unwrap();

        assert_eq!(result.into_candidates().len(), 1);
        assert_eq!(gateway.usage().total, 60);

        let request = &backend.requests()[0];
        let config = request.generation_config.as_ref().unwrap();
        assert_eq!(config.response_mime_type.as_deref(), Some("application/json"));
        assert_eq!(config.response_schema, Some(OutputSchema::Moment.to_json()));
        assert_eq!(request.contents[0].parts.len(), 2);
    }

    #[tokio::test]
    async fn test_generate_structured_propagates_transport_errors() {
        let backend = Arc::new(ScriptedBackend::new().fail("connection reset"));
        let mut gateway = gateway(&backend);

        let result = gateway
            .generate_structured(vec![], "x", OutputSchema::Highlights)
            .await;
        assert!(matches!(result, Err(VidqueryError::Api(_))));
    }

    #[tokio::test]
    async fn test_generate_structured_flags_invalid_json() {
        let backend = Arc::new(ScriptedBackend::new().reply("Sure! Here you go", (5, 5, 10)));
        let mut gateway = gateway(&backend);

        let result = gateway
            .generate_structured(vec![], "x", OutputSchema::Highlights)
            .await;
        assert!(matches!(result, Err(VidqueryError::MalformedOutput(_))));
        assert_eq!(gateway.usage().total, 10);
    }
}
