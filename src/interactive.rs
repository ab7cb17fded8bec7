use crate::config::Config;
use crate::model::{GeminiClient, TokenUsage};
use crate::session::{TaskOutcome, VideoSession};
use console::style;
use dialoguer::{Confirm, Input, Select};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

const ACTIONS: &[&str] = &[
    "Ask a question",
    "Generate highlights",
    "Find a moment",
    "Show token usage",
    "Quit",
];

/// Run the menu-driven session: load a video, then ask, cut and search until quit.
pub async fn run_interactive(mut config: Config, locator: Option<String>) -> anyhow::Result<()> {
    print_header();

    setup_api_key(&mut config)?;
    config.validate()?;

    let locator = match locator {
        Some(l) => l,
        None => Input::new()
            .with_prompt("YouTube link, https .mp4 URL or local file")
            .interact_text()?,
    };

    let backend = Arc::new(
        GeminiClient::new(config.gemini_api_key.clone().unwrap_or_default())
            .with_model(config.model.clone()),
    );

    let mut session = with_spinner(
        "Processing video... This may take a moment.",
        VideoSession::open(&locator, &config, backend),
    )
    .await?;

    print_session(&session);

    loop {
        let choice = Select::new()
            .with_prompt("What next?")
            .items(ACTIONS)
            .default(0)
            .interact()?;

        match choice {
            0 => {
                let question: String = Input::new()
                    .with_prompt("Ask a question about the video")
                    .interact_text()?;
                let answer = with_spinner("Analyzing video...", session.ask(&question)).await;
                println!("\n{}\n", answer);
            }
            1 => {
                let outcome =
                    with_spinner("Generating highlights...", session.generate_highlights()).await;
                print_outcome(&outcome);
            }
            2 => {
                let query: String = Input::new()
                    .with_prompt("Describe the moment you're looking for")
                    .interact_text()?;
                let outcome =
                    with_spinner("Searching for moment...", session.identify_moment(&query)).await;
                print_outcome(&outcome);
            }
            3 => print_usage(&session.token_usage()),
            _ => break,
        }
    }

    print_usage(&session.token_usage());
    Ok(())
}

/// Show a spinner while `task` runs.
pub async fn with_spinner<F: Future>(message: &str, task: F) -> F::Output {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));

    let output = task.await;
    pb.finish_and_clear();
    output
}

fn print_header() {
    println!();
    println!(
        "{}",
        style("╔═══════════════════════════════════════════════════╗").cyan()
    );
    println!(
        "{}",
        style("║          vidquery - AI Video Analysis             ║").cyan()
    );
    println!(
        "{}",
        style("╚═══════════════════════════════════════════════════╝").cyan()
    );
    println!();
}

fn setup_api_key(config: &mut Config) -> anyhow::Result<()> {
    if config.gemini_api_key.is_some() {
        println!("{} API key configured", style("✓").green());
        return Ok(());
    }

    println!("{} Gemini API key not found", style("!").yellow());
    println!("  Get one at: https://aistudio.google.com/apikey\n");

    let api_key: String = Input::new()
        .with_prompt("Enter your Gemini API key")
        .interact_text()?;

    if api_key.trim().is_empty() {
        anyhow::bail!("API key is required");
    }

    config.gemini_api_key = Some(api_key.trim().to_string());

    // Offer to save
    if Confirm::new()
        .with_prompt("Save API key to config file?")
        .default(true)
        .interact()?
    {
        save_config(config)?;
        println!("{} API key saved to config\n", style("✓").green());
    }

    Ok(())
}

fn save_config(config: &Config) -> anyhow::Result<()> {
    if let Some(config_path) = Config::config_file_path() {
        if let Some(dir) = config_path.parent() {
            fs::create_dir_all(dir)?;
        }
        let toml_content = toml::to_string_pretty(config)?;
        fs::write(config_path, toml_content)?;
    }
    Ok(())
}

fn print_session(session: &VideoSession) {
    let size = fs::metadata(session.video_path())
        .map(|m| format_size(m.len()))
        .unwrap_or_else(|_| "?".to_string());

    println!("\n{}", style("═══ Video ═══").bold());
    println!("  Source:    {}", style(session.locator()).cyan());
    println!(
        "  Local:     {} ({})",
        style(session.video_path().display()).cyan(),
        size
    );
    println!("  Duration:  {:.1}s", session.duration());
    println!();
}

/// Print the result of a highlight or moment request.
pub fn print_outcome(outcome: &TaskOutcome) {
    match &outcome.clip {
        Some(path) => {
            println!("{} {}", style("✓").green(), outcome.message);
            println!("  Clip: {}", style(path.display()).cyan());
        }
        None => println!("{} {}", style("!").yellow(), outcome.message),
    }
    println!();
}

/// Print the running token totals.
pub fn print_usage(usage: &TokenUsage) {
    println!("{}", style("Token usage").bold());
    println!("  Input tokens:  {}", usage.input);
    println!("  Output tokens: {}", usage.output);
    println!("  Total tokens:  {}", usage.total);
}

fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(500), "500 B");
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(1024 * 1024), "1.0 MB");
        assert_eq!(format_size(1024 * 1024 * 1024), "1.0 GB");
    }

    #[tokio::test]
    async fn test_with_spinner_returns_output() {
        let value = with_spinner("working", async { 41 + 1 }).await;
        assert_eq!(value, 42);
    }
}
