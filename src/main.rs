use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use vidquery::config::Config;
use vidquery::interactive::{print_outcome, print_usage, run_interactive, with_spinner};
use vidquery::{GeminiClient, VideoSession};

#[derive(Parser)]
#[command(name = "vidquery")]
#[command(version, about = "Question, summarize and search videos using AI")]
#[command(long_about = "Ask questions about a video, cut highlight reels and find moments described in plain language using Google Gemini.")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Gemini model to use (overrides config)
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Attempts allowed for well-formed timestamps (overrides config)
    #[arg(short, long, global = true)]
    retries: Option<u32>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Ask a single question about a video
    Ask {
        /// YouTube link, https .mp4 URL or local file
        source: String,
        question: String,
    },
    /// Cut the highlights of a video into one clip
    Highlights {
        /// YouTube link, https .mp4 URL or local file
        source: String,
    },
    /// Find a moment described in natural language
    Find {
        /// YouTube link, https .mp4 URL or local file
        source: String,
        query: String,
    },
    /// Interactive session: ask, cut and search repeatedly
    Chat {
        /// YouTube link, https .mp4 URL or local file
        source: Option<String>,
    },
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(ref model) = cli.model {
        config.model = model.clone();
    }
    if let Some(retries) = cli.retries {
        config.max_retries = retries;
    }
}

async fn open_session(source: &str, config: &Config) -> Result<VideoSession> {
    config
        .validate()
        .context("Configuration validation failed")?;

    let api_key = config.gemini_api_key.clone().unwrap_or_default();
    let backend = Arc::new(GeminiClient::new(api_key).with_model(config.model.clone()));

    info!("Model:  {}", config.model);
    info!("Source: {}", source);

    let session = with_spinner(
        "Processing video... This may take a moment.",
        VideoSession::open(source, config, backend),
    )
    .await
    .context("Error processing video")?;

    info!(
        "Video ready: {} ({:.1}s)",
        session.video_path().display(),
        session.duration()
    );
    Ok(session)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let mut config = Config::load().context("Failed to load configuration")?;
    apply_overrides(&mut config, &cli);

    match cli.command {
        Command::Chat { source } => return run_interactive(config, source).await,
        Command::Ask { source, question } => {
            let mut session = open_session(&source, &config).await?;
            let answer = with_spinner("Analyzing video...", session.ask(&question)).await;
            println!("\n{}\n", answer);
            print_usage(&session.token_usage());
        }
        Command::Highlights { source } => {
            let mut session = open_session(&source, &config).await?;
            let outcome =
                with_spinner("Generating highlights...", session.generate_highlights()).await;
            print_outcome(&outcome);
            print_usage(&session.token_usage());
        }
        Command::Find { source, query } => {
            let mut session = open_session(&source, &config).await?;
            let outcome =
                with_spinner("Searching for moment...", session.identify_moment(&query)).await;
            print_outcome(&outcome);
            print_usage(&session.token_usage());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "vidquery",
            "find",
            "clip.mp4",
            "the goal",
            "--model",
            "gemini-2.5-pro",
            "--retries",
            "5",
        ]);

        let mut config = Config::default();
        apply_overrides(&mut config, &cli);
        assert_eq!(config.model, "gemini-2.5-pro");
        assert_eq!(config.max_retries, 5);
        assert!(matches!(cli.command, Command::Find { .. }));
    }

    #[test]
    fn test_chat_source_is_optional() {
        let cli = Cli::parse_from(["vidquery", "chat"]);
        assert!(matches!(cli.command, Command::Chat { source: None }));
    }
}
