use thiserror::Error;

#[derive(Error, Debug)]
pub enum VidqueryError {
    #[error("Could not resolve video input: {0}")]
    InputResolution(String),

    #[error("Failed to process video content: {0}")]
    Ingestion(String),

    #[error("{0}")]
    FormatValidation(String),

    #[error("Media processing failed: {0}")]
    MediaProcessing(String),

    #[error("Media probe failed: {0}")]
    Probe(String),

    #[error("Malformed model output: {0}")]
    MalformedOutput(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VidqueryError {
    /// Wrap any failure raised while bringing a video into a session.
    ///
    /// Resolution and ingestion errors pass through untouched.
    pub fn into_ingestion(self) -> Self {
        match self {
            e @ (VidqueryError::InputResolution(_) | VidqueryError::Ingestion(_)) => e,
            other => VidqueryError::Ingestion(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, VidqueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_ingestion_wraps_other_errors() {
        let err = VidqueryError::Api("quota exceeded".to_string()).into_ingestion();
        match err {
            VidqueryError::Ingestion(msg) => assert!(msg.contains("quota exceeded")),
            other => panic!("Expected Ingestion, got: {other}"),
        }
    }

    #[test]
    fn test_into_ingestion_keeps_resolution_errors() {
        let err = VidqueryError::InputResolution("bad".to_string()).into_ingestion();
        assert!(matches!(err, VidqueryError::InputResolution(_)));
    }
}
