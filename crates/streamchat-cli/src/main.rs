mod config;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use streamchat_client::{ChatApi, ChatBackend, ChatSession, ChatSettings, SessionEvent};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

use config::CliConfig;

#[derive(Parser, Debug)]
#[command(name = "streamchat", about = "Terminal chat against a streamchat backend")]
struct Cli {
    /// Backend base URL
    #[arg(long, env = "STREAMCHAT_BASE_URL")]
    base_url: Option<String>,

    /// Model identifier
    #[arg(long, env = "STREAMCHAT_MODEL")]
    model: Option<String>,

    /// System prompt
    #[arg(long)]
    system_prompt: Option<String>,

    /// Sampling temperature in [0, 1]
    #[arg(long)]
    temperature: Option<f32>,

    /// Use the single-shot endpoint instead of streaming
    #[arg(long)]
    no_stream: bool,

    /// Path to an alternate config file
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => CliConfig::load_from_path(Some(path.clone())),
        None => CliConfig::load(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let defaults = ChatSettings::default();
    let settings = ChatSettings {
        model: cli.model.or(config.default.model).unwrap_or(defaults.model),
        system_prompt: cli
            .system_prompt
            .or(config.default.system_prompt)
            .unwrap_or(defaults.system_prompt),
        temperature: cli
            .temperature
            .or(config.default.temperature)
            .unwrap_or(defaults.temperature),
    };

    tracing::debug!(model = %settings.model, temperature = settings.temperature, "resolved settings");

    let mut api = ChatApi::new();
    if let Some(base_url) = cli.base_url.or(config.default.base_url) {
        api = api.with_base_url(base_url);
    }

    let backend = Arc::new(api);
    let session = ChatSession::new(backend.clone());
    session.set_streaming(!cli.no_stream);

    repl(session, backend, settings).await
}

/// Print one reply as its events arrive, returning once the reply reached
/// `Completed` or `Failed` (so the caller's next prompt lands after the
/// output, not interleaved with it).
///
/// Falling behind the event channel drops the oldest deltas, never the
/// terminal event, so a lagged receiver keeps draining instead of giving up.
async fn render_reply(events: &mut broadcast::Receiver<SessionEvent>) {
    let mut streamed_any = false;
    loop {
        match events.recv().await {
            Ok(SessionEvent::Started { .. }) => {
                streamed_any = false;
            }
            Ok(SessionEvent::Token { text, .. }) => {
                streamed_any = true;
                print!("{text}");
                let _ = std::io::stdout().flush();
            }
            Ok(SessionEvent::Completed { content, .. }) => {
                if streamed_any {
                    println!();
                } else {
                    // Single-shot fallback delivers everything at once.
                    println!("{content}");
                }
                return;
            }
            Ok(SessionEvent::Failed { error, .. }) => {
                if streamed_any {
                    println!();
                }
                println!("{}", error.red());
                return;
            }
            Ok(SessionEvent::Cleared) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "renderer fell behind session events");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

async fn repl(session: ChatSession, backend: Arc<ChatApi>, settings: ChatSettings) -> Result<()> {
    println!(
        "{} model={} (/clear, /health, /quit)",
        "streamchat".bold(),
        settings.model
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{} ", ">".cyan());
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();

        match input {
            "" => {}
            "/quit" | "/exit" => break,
            "/clear" => {
                session.clear_messages();
                println!("{}", "Conversation cleared.".dimmed());
            }
            "/health" => match backend.check_health().await {
                Ok(status) => println!("backend: {}", status.status),
                Err(e) => println!("{}", format!("backend unreachable: {e}").red()),
            },
            _ => {
                let mut events = session.subscribe();
                let _ = tokio::join!(
                    session.send_message(input, &settings),
                    render_reply(&mut events)
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn token(text: &str) -> SessionEvent {
        SessionEvent::Token {
            message_id: "m1".to_string(),
            text: text.to_string(),
        }
    }

    fn completed(content: &str) -> SessionEvent {
        SessionEvent::Completed {
            message_id: "m1".to_string(),
            content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn render_reply_returns_at_the_terminal_event() {
        let (tx, mut rx) = broadcast::channel(8);
        tx.send(SessionEvent::Started {
            message_id: "m1".to_string(),
            model: "test-model".to_string(),
        })
        .unwrap();
        tx.send(token("Hel")).unwrap();
        tx.send(token("lo")).unwrap();
        tx.send(completed("Hello")).unwrap();

        tokio::time::timeout(Duration::from_secs(1), render_reply(&mut rx))
            .await
            .expect("renderer should stop at the terminal event");
    }

    #[tokio::test]
    async fn render_reply_survives_falling_behind_the_channel() {
        let (tx, mut rx) = broadcast::channel(4);
        // Overflow the channel so the receiver observes a lag before it
        // reaches the terminal event.
        for i in 0..64 {
            tx.send(token(&i.to_string())).unwrap();
        }
        tx.send(completed("done")).unwrap();

        tokio::time::timeout(Duration::from_secs(1), render_reply(&mut rx))
            .await
            .expect("a lagged renderer should keep draining to the terminal event");
    }

    #[tokio::test]
    async fn render_reply_stops_when_the_channel_closes() {
        let (tx, mut rx) = broadcast::channel::<SessionEvent>(4);
        drop(tx);

        tokio::time::timeout(Duration::from_secs(1), render_reply(&mut rx))
            .await
            .expect("renderer should stop on a closed channel");
    }
}
