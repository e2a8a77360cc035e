mod config;
mod observability;

use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser as _;
use spider_assist_chat::prelude::*;
use spider_assist_chat::{BackendPageFetcher, ConversationTurn, extract_code, system_prompt};
use tokio::io::AsyncBufReadExt as _;
use tracing::{info, warn};

use crate::config::Cli;

/// Prints deltas as they arrive and remembers the latest artifact.
#[derive(Default)]
struct ConsolePrinter {
    artifact: Option<CodeArtifact>,
}

impl TurnHandler for ConsolePrinter {
    fn on_chunk(&mut self, text: &str, artifact: Option<&CodeArtifact>) {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
        if let Some(artifact) = artifact {
            self.artifact = Some(artifact.clone());
        }
    }

    fn on_complete(&mut self, output: &TurnOutput) {
        println!();
        if output.artifact.is_some() {
            self.artifact = output.artifact.clone();
        }
    }

    fn on_error(&mut self, error: &ChatError) {
        eprintln!("\nerror [{}]: {error}", error.code());
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    config::init();
    observability::init_observability();
    let cli = Cli::parse();

    let client = CompletionsClient::new(cli.client_config(ClientConfig::from_env()?))?;
    let page = match &cli.url {
        Some(url) => Some(fetch_page(&cli.backend_url, url).await?),
        None => None,
    };
    let mode = cli.prompt_mode(page).await?;
    info!(
        event = "cli.started",
        domain = "cli",
        mode = mode.label(),
        model = %client.config().model
    );

    if cli.once {
        return run_once(&cli, &client, &mode).await;
    }

    let session = ChatSession::new(Arc::new(client), mode);
    if let Some(greeting) = session.history().await.first() {
        eprintln!("{}\n", greeting.content);
    }

    if let Some(prompt) = &cli.prompt {
        let artifact = stream_turn(&session, prompt).await?;
        return save_artifact(cli.save_code.as_deref(), artifact.as_ref()).await;
    }

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let mut last_artifact = None;
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match stream_turn(&session, &line).await {
            Ok(Some(artifact)) => last_artifact = Some(artifact),
            Ok(None) => {}
            Err(err) => warn!(event = "cli.turn_failed", domain = "cli", code = err.code()),
        }
    }
    save_artifact(cli.save_code.as_deref(), last_artifact.as_ref()).await
}

async fn fetch_page(backend_url: &str, url: &str) -> anyhow::Result<HtmlContext> {
    let preview = BackendPageFetcher::new(backend_url)?.fetch(url).await;
    let page = HtmlContext::try_from(&preview)?;
    eprintln!(
        "fetched {} ({} bytes, HTTP {})",
        page.title, preview.content_length, preview.status_code
    );
    Ok(page)
}

async fn stream_turn(
    session: &ChatSession,
    text: &str,
) -> Result<Option<CodeArtifact>, ChatError> {
    let mut printer = ConsolePrinter::default();
    session.submit(text).await?.drive(&mut printer).await?;
    Ok(printer.artifact)
}

async fn run_once(
    cli: &Cli,
    client: &CompletionsClient,
    mode: &PromptMode,
) -> anyhow::Result<()> {
    let text = match mode {
        PromptMode::Edit { .. } => {
            let prompt = cli.prompt.clone().unwrap_or_default();
            client
                .complete(vec![
                    ConversationTurn::system(system_prompt(mode)),
                    ConversationTurn::user(prompt),
                ])
                .await?
        }
        _ => {
            let request = cli.spider_request().context("--once needs a prompt")?;
            client.generate_spider_code(&request, mode.page()).await?
        }
    };
    println!("{text}");
    save_artifact(cli.save_code.as_deref(), extract_code(&text).as_ref()).await
}

async fn save_artifact(
    path: Option<&Path>,
    artifact: Option<&CodeArtifact>,
) -> anyhow::Result<()> {
    let Some(path) = path else {
        return Ok(());
    };
    let Some(artifact) = artifact else {
        eprintln!("no python block to save");
        return Ok(());
    };
    tokio::fs::write(path, format!("{}\n", artifact.body))
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;
    eprintln!("saved code to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_artifact_writes_body_with_trailing_newline() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("spider.py");
        let artifact = CodeArtifact {
            language: "python".into(),
            body: "print(1)".into(),
        };
        save_artifact(Some(&path), Some(&artifact))
            .await
            .expect("save");
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "print(1)\n");

        let untouched = dir.path().join("none.py");
        save_artifact(Some(&untouched), None).await.expect("no-op");
        assert!(!untouched.exists());
    }

    #[test]
    fn printer_keeps_latest_artifact() {
        let mut printer = ConsolePrinter::default();
        let artifact = CodeArtifact {
            language: "python".into(),
            body: "x = 1".into(),
        };
        printer.on_chunk("", Some(&artifact));
        printer.on_complete(&TurnOutput {
            transcript: String::new(),
            artifact: None,
        });
        assert_eq!(printer.artifact, Some(artifact));
    }
}
