use std::sync::Arc;

use anyhow::{Context, Result};
use pantry_chef::api_connection::RetryPolicy;
use pantry_chef::cli::{parse_args, Command};
use pantry_chef::config::{AppConfig, RecipeStoreConfig};
use pantry_chef::logging::LoggingConfig;
use pantry_chef::pipeline::RecipePipeline;
use pantry_chef::search::{load_recipe_rows, populate_collection, PopulateOptions, WeaviateStore};
use pantry_chef::server::{serve, AppState};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok(); // Load .env file for API keys
    LoggingConfig::from_env().init()?;

    match parse_args().command {
        Command::Serve { host, port } => {
            let mut config = AppConfig::from_env().context("Invalid configuration")?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            let pipeline = RecipePipeline::from_config(&config).context("Failed to build pipeline")?;
            let state = AppState {
                pipeline: Arc::new(pipeline),
                request_timeout: config.request_timeout,
            };
            serve(&config.server, state).await?;
        }
        Command::Generate { input } => {
            let config = AppConfig::from_env().context("Invalid configuration")?;
            let pipeline = RecipePipeline::from_config(&config).context("Failed to build pipeline")?;
            let result = pipeline
                .run_within(&input, config.request_timeout)
                .await
                .context("Recipe generation failed")?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Populate {
            csv,
            batch_size,
            ollama_endpoint,
        } => {
            // Provisioning needs no nutrition key, so only the store settings are read.
            let store_config = RecipeStoreConfig::from_env().context("Invalid store configuration")?;
            let store = WeaviateStore::new(store_config, RetryPolicy::default())?;
            let rows = load_recipe_rows(&csv)
                .with_context(|| format!("Failed to load recipes from {:?}", csv))?;
            info!(rows = rows.len(), "Loaded recipe CSV");

            let options = PopulateOptions {
                ollama_endpoint,
                batch_size,
                ..PopulateOptions::default()
            };
            let report = populate_collection(&store, &rows, &options)
                .await
                .context("Failed to populate recipe store")?;
            info!(
                created = report.created,
                inserted = report.inserted,
                failed = report.failed,
                "Population finished"
            );
        }
    }

    Ok(())
}
