pub mod config;
pub mod error;
pub mod interactive;
pub mod media;
pub mod model;
pub mod session;
pub mod source;
pub mod validate;

pub use config::Config;
pub use error::{Result, VidqueryError};
pub use media::TimeRange;
pub use model::{GeminiClient, ModelBackend, TokenUsage};
pub use session::{TaskOutcome, VideoSession};
pub use source::VideoSource;
