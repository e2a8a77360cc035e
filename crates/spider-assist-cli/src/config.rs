use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::Parser;
use spider_assist_chat::client::ClientConfig;
use spider_assist_chat::page::DEFAULT_BACKEND_URL;
use spider_assist_chat::prompt::{HtmlContext, PromptMode, SpiderRequest};

/// Loads `.env` from the crate directory, then from the working directory.
/// Variables already set in the process win.
pub fn init() {
    let _ = dotenvy::from_path(Path::new(
        format!("{}/.env", env!("CARGO_MANIFEST_DIR")).as_str(),
    ));
    dotenvy::dotenv().ok();
}

#[derive(Debug, Parser)]
#[command(
    name = "spider-assist",
    about = "Chat with an LLM to draft and refine Python spiders",
    version
)]
pub struct Cli {
    /// Model id (overrides DEEP_INFRA_MODEL)
    #[arg(long)]
    pub model: Option<String>,

    /// Completions API root (overrides DEEP_INFRA_BASE_URL)
    #[arg(long)]
    pub base_url: Option<String>,

    /// Scraping backend API root used to fetch page previews
    #[arg(long, env = "SPIDER_ASSIST_BACKEND_URL", default_value = DEFAULT_BACKEND_URL)]
    pub backend_url: String,

    /// Page to fetch and ground the conversation on
    #[arg(long)]
    pub url: Option<String>,

    /// Existing spider source to refine
    #[arg(long)]
    pub code_file: Option<PathBuf>,

    /// Write the last extracted python block to this file
    #[arg(long)]
    pub save_code: Option<PathBuf>,

    /// Ask once without streaming and exit
    #[arg(long, requires = "prompt")]
    pub once: bool,

    /// First message; without it turns are read from stdin
    pub prompt: Option<String>,
}

impl Cli {
    /// Applies command-line overrides on top of the environment config.
    pub fn client_config(&self, mut config: ClientConfig) -> ClientConfig {
        if let Some(model) = &self.model {
            config = config.model(model.clone());
        }
        if let Some(base_url) = &self.base_url {
            config = config.base_url(base_url.clone());
        }
        config
    }

    /// Picks the prompting mode: edit when a code file is given, grounded
    /// when only a page is available, plain otherwise.
    pub async fn prompt_mode(&self, page: Option<HtmlContext>) -> anyhow::Result<PromptMode> {
        let Some(path) = &self.code_file else {
            return Ok(match page {
                Some(page) => PromptMode::HtmlGrounded { page },
                None => PromptMode::Plain,
            });
        };
        let existing_code = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read code file {}", path.display()))?;
        Ok(PromptMode::Edit {
            existing_code,
            page,
        }
        .resolved())
    }

    /// Request used by `--once`.
    pub fn spider_request(&self) -> Option<SpiderRequest> {
        self.prompt.as_ref().map(|description| SpiderRequest {
            description: description.clone(),
            target_url: self.url.clone(),
            spider_name: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("spider-assist").chain(args.iter().copied()))
            .expect("valid args")
    }

    #[test]
    fn overrides_replace_environment_values() {
        let cli = parse(&["--model", "qwen", "--base-url", "http://localhost:9000/v1"]);
        let config = cli.client_config(ClientConfig::new("key"));
        assert_eq!(config.model, "qwen");
        assert_eq!(config.base_url, "http://localhost:9000/v1");

        let untouched = parse(&[]).client_config(ClientConfig::new("key"));
        assert_eq!(untouched.model, ClientConfig::new("key").model);
    }

    #[test]
    fn once_requires_a_prompt() {
        assert!(Cli::try_parse_from(["spider-assist", "--once"]).is_err());
        let cli = parse(&["--once", "--url", "https://books.example", "collect titles"]);
        let request = cli.spider_request().expect("request");
        assert_eq!(request.description, "collect titles");
        assert_eq!(request.target_url.as_deref(), Some("https://books.example"));
    }

    #[tokio::test]
    async fn mode_follows_available_inputs() {
        let page = HtmlContext::new("https://books.example", "Books", "<h1>Books</h1>");
        let plain = parse(&[]).prompt_mode(None).await.expect("mode");
        assert_eq!(plain, PromptMode::Plain);
        let grounded = parse(&[]).prompt_mode(Some(page.clone())).await.expect("mode");
        assert_eq!(grounded, PromptMode::HtmlGrounded { page: page.clone() });

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("books.py");
        std::fs::write(&path, "class BooksSpider:\n    pass\n").expect("write");
        let cli = parse(&["--code-file", path.to_str().expect("utf-8 path")]);
        match cli.prompt_mode(Some(page)).await.expect("mode") {
            PromptMode::Edit {
                existing_code,
                page,
            } => {
                assert!(existing_code.starts_with("class BooksSpider"));
                assert!(page.is_some());
            }
            other => panic!("expected edit mode, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn blank_code_file_falls_back_to_plain() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("empty.py");
        std::fs::write(&path, "  \n").expect("write");
        let cli = parse(&["--code-file", path.to_str().expect("utf-8 path")]);
        assert_eq!(cli.prompt_mode(None).await.expect("mode"), PromptMode::Plain);

        let missing = parse(&["--code-file", "/definitely/not/here.py"]);
        assert!(missing.prompt_mode(None).await.is_err());
    }
}
