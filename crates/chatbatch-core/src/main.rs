//! chatbatch - Entry Point
//!
//! Reads a JSON array of conversations from stdin, dispatches them concurrently and
//! prints a JSON array of response texts to stdout.

use std::io::Read;
use std::path::PathBuf;

use anyhow::Context;
use chatbatch_abstraction::ChatMessage;
use chatbatch_core::ChatBatchClient;
use chatbatch_core::config::{self, Config};
use chatbatch_core::telemetry::{self, DEFAULT_FILTER};
use chatbatch_models::ModelFactory;
use tracing::{error, info};

#[allow(clippy::disallowed_methods)] // env::var selects the config file
fn config_path() -> anyhow::Result<PathBuf> {
    match std::env::var("CHATBATCH_CONFIG") {
        Ok(path) => Ok(PathBuf::from(path)),
        Err(_) => Ok(config::default_config_path(
            &std::env::current_dir().context("Failed to read current directory")?,
        )),
    }
}

async fn run() -> anyhow::Result<()> {
    let path = config_path()?;
    let config = Config::load(&path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    let options = config.dispatch.to_options()?;
    let model = ModelFactory::create(config.model.to_model_config()?)?;
    let client = ChatBatchClient::new(model).with_options(options);
    info!(client = %client, config = %path.display(), "Client ready");

    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("Failed to read stdin")?;
    let conversations: Vec<Vec<ChatMessage>> = serde_json::from_str(&input)
        .context("stdin must be a JSON array of conversations")?;

    let texts = client
        .batch_generate_chat_response(&conversations, None)
        .await?;
    println!("{}", serde_json::to_string(&texts)?);
    Ok(())
}

#[tokio::main]
async fn main() {
    telemetry::init_tracing(DEFAULT_FILTER);

    if let Err(e) = run().await {
        error!("chatbatch failed: {e:#}");
        std::process::exit(1);
    }
}
