//! Application state and initialization

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use chatsales_adapters::LlmInferenceCollaborator;
use chatsales_core::{AppConfig, InferenceCollaborator};
use chatsales_ingestion::SalesPipeline;

use crate::cli::Args;
use crate::server::Server;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<SalesPipeline>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(config: AppConfig, collaborator: Arc<dyn InferenceCollaborator>) -> Self {
        let pipeline = SalesPipeline::new(config.pipeline.clone(), collaborator);
        Self {
            pipeline: Arc::new(pipeline),
            config: Arc::new(config),
        }
    }

    /// Build the state with the completion-backed collaborator from `config`.
    pub fn from_config(config: AppConfig) -> Result<Self> {
        info!(
            base_url = %config.inference.base_url,
            model = %config.inference.model,
            "Initializing inference collaborator"
        );

        if config.inference.api_key.is_empty() {
            warn!("No inference API key configured; set CHATSALES__INFERENCE__API_KEY");
        }

        let collaborator = LlmInferenceCollaborator::from_config(&config.inference)
            .context("Failed to create inference client")?;

        Ok(Self::new(config, Arc::new(collaborator)))
    }
}

/// Main application
pub struct App {
    state: AppState,
}

impl App {
    pub async fn build(args: Args) -> Result<Self> {
        args.validate().context("Invalid command line arguments")?;

        let mut config = AppConfig::load_from_file(&args.config).with_context(|| {
            format!("Failed to load configuration from {}", args.config.display())
        })?;

        if let Some(port) = args.port {
            config.server.port = port;
        }

        let state = AppState::from_config(config)?;

        Ok(Self { state })
    }

    pub async fn run(self) -> Result<()> {
        let server = Server::new(self.state);
        server.run().await
    }
}
