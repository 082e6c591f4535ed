//! Orgscout binary - composition root.
//!
//! 1. Load configuration (TOML, then env, then CLI overrides)
//! 2. Open the SQLite turn log
//! 3. Build the upstream gateways and the turn orchestrator
//! 4. Serve the WebSocket gateway

mod cli;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use orgscout_api::{start_server, AppState};
use orgscout_chat::{
    ChatOrchestrator, GeminiGateway, OrchestratorSettings, PerplexityGateway, SqliteTurnSink,
    TurnLimitGate, WebDriverResolver,
};
use orgscout_core::config::OrgscoutConfig;
use orgscout_storage::{Database, MemoryStore, TurnRepository};

use crate::cli::CliArgs;

/// Expand a leading `~` to the home directory.
fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        Some(rest) => cli::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(rest),
        None => PathBuf::from(path),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config. Tracing is not up yet, so load problems surface after init.
    let config_file = args.resolve_config_path();
    let loaded = OrgscoutConfig::load(&config_file);
    let mut config = match &loaded {
        Ok(config) => config.clone(),
        Err(_) => OrgscoutConfig::default(),
    };
    config.apply_env_keys();
    config.general.port = args.resolve_port(config.general.port);
    if let Some(dir) = args.resolve_data_dir() {
        config.general.data_dir = dir;
    }
    if let Some(level) = args.resolve_log_level() {
        config.general.log_level = level;
    }

    // Tracing: RUST_LOG wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .init();

    tracing::info!("Starting Orgscout v{}", env!("CARGO_PKG_VERSION"));
    match loaded {
        Ok(_) => tracing::info!(path = %config_file.display(), "Configuration loaded"),
        Err(e) => tracing::warn!(
            path = %config_file.display(),
            error = %e,
            "Using default configuration"
        ),
    }
    if config.llm.api_key.is_empty() || config.search.api_key.is_empty() {
        tracing::warn!("Upstream API key missing; turns will fail until one is configured");
    }

    // Storage.
    let data_dir = expand_home(&config.general.data_dir);
    let db_path = data_dir.join("orgscout.db");
    let db = Arc::new(Database::new(&db_path)?);
    tracing::info!(path = %db_path.display(), "SQLite database opened");
    let repo = TurnRepository::new(db);

    // Upstreams.
    let llm = Arc::new(GeminiGateway::new(&config.llm)?);
    let search = Arc::new(PerplexityGateway::new(&config.search)?);
    let memory = Arc::new(MemoryStore::new(Duration::from_secs(
        config.memory.retention_secs,
    )));

    let mut orchestrator = ChatOrchestrator::new(
        llm,
        search,
        memory,
        Arc::new(SqliteTurnSink::new(repo.clone())),
    )
    .with_settings(OrchestratorSettings::from_config(&config))
    .with_gate(Arc::new(TurnLimitGate::new(
        repo,
        config.limits.max_turns_per_conversation,
    )));

    if config.browser.enabled {
        let browser = WebDriverResolver::new(&config.browser)?;
        orchestrator = orchestrator.with_browser(Arc::new(browser));
        tracing::info!(url = %config.browser.webdriver_url, "Browser coordinate fallback enabled");
    }

    let state = AppState::new(orchestrator, config.auth.api_token.clone());
    if state.api_token.is_none() {
        tracing::warn!("No API token configured; chat endpoint is public");
    }

    start_server(&config, state).await?;
    Ok(())
}
