//! Process configuration.
//!
//! Everything the pipeline needs is collected once into [`AppConfig`] and handed to the
//! constructors; nothing below this module reads the environment.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::api_connection::endpoints::{DEFAULT_GENERATOR_MODEL, DEFAULT_OLLAMA_BASE_URL};
use crate::api_connection::retry::RetryPolicy;

pub const NUTRITION_API_KEY_ENV_VAR: &str = "API_KEY";
const NUTRITION_API_KEY_FALLBACK_ENV_VAR: &str = "USDA_API_KEY";

pub const DEFAULT_USDA_BASE_URL: &str = "https://api.nal.usda.gov/fdc/v1";
pub const DEFAULT_WEAVIATE_URL: &str = "http://localhost:8080";
pub const DEFAULT_RECIPE_COLLECTION: &str = "Recept_medium";
pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value {value:?} for {name}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct NutritionConfig {
    pub api_key: String,
    pub base_url: String,
    /// Candidates requested per search; only the first is used.
    pub page_size: u32,
    pub timeout: Duration,
}

impl Default for NutritionConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_USDA_BASE_URL.to_string(),
            page_size: 1,
            timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub base_url: String,
    pub model: String,
    /// Kept low: the extraction completion has to be machine-parseable.
    pub extraction_temperature: f32,
    /// `None` leaves the final round on the model's default sampling.
    pub final_temperature: Option<f32>,
    pub timeout: Duration,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_BASE_URL.to_string(),
            model: DEFAULT_GENERATOR_MODEL.to_string(),
            extraction_temperature: 0.05,
            final_temperature: None,
            timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecipeStoreConfig {
    pub base_url: String,
    pub collection: String,
    pub timeout: Duration,
}

impl Default for RecipeStoreConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_WEAVIATE_URL.to_string(),
            collection: DEFAULT_RECIPE_COLLECTION.to_string(),
            timeout: Duration::from_secs(15),
        }
    }
}

impl RecipeStoreConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            base_url: env_or("WEAVIATE_URL", defaults.base_url),
            collection: env_or("RECIPE_COLLECTION", defaults.collection),
            timeout: Duration::from_secs(parse_env("HTTP_TIMEOUT_SECS", defaults.timeout.as_secs())?),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8090,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub nutrition: NutritionConfig,
    pub generator: GeneratorConfig,
    pub store: RecipeStoreConfig,
    pub server: ServerConfig,
    pub retry: RetryPolicy,
    /// Upper bound on nutrient lookups in flight for one request.
    pub lookup_concurrency: usize,
    /// Budget for one whole `/process` request.
    pub request_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            nutrition: NutritionConfig::default(),
            generator: GeneratorConfig::default(),
            store: RecipeStoreConfig::default(),
            server: ServerConfig::default(),
            retry: RetryPolicy::default(),
            lookup_concurrency: 4,
            request_timeout: Duration::from_secs(300),
        }
    }
}

impl AppConfig {
    /// Reads the configuration from the process environment (after `.env` is loaded).
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let api_key = env::var(NUTRITION_API_KEY_ENV_VAR)
            .or_else(|_| env::var(NUTRITION_API_KEY_FALLBACK_ENV_VAR))
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::Missing(NUTRITION_API_KEY_ENV_VAR))?;

        let http_timeout = parse_env::<u64>("HTTP_TIMEOUT_SECS", defaults.nutrition.timeout.as_secs())?;
        let generator_timeout =
            parse_env::<u64>("GENERATOR_TIMEOUT_SECS", defaults.generator.timeout.as_secs())?;

        let final_temperature = match env::var("FINAL_TEMPERATURE") {
            Ok(raw) => Some(parse_value::<f32>("FINAL_TEMPERATURE", &raw)?),
            Err(_) => defaults.generator.final_temperature,
        };

        let retry = RetryPolicy {
            max_attempts: parse_env("RETRY_MAX_ATTEMPTS", defaults.retry.max_attempts)?,
            initial_backoff: Duration::from_millis(parse_env(
                "RETRY_BACKOFF_MS",
                defaults.retry.initial_backoff.as_millis() as u64,
            )?),
            max_backoff: defaults.retry.max_backoff,
        };

        Ok(Self {
            nutrition: NutritionConfig {
                api_key,
                base_url: env_or("USDA_BASE_URL", defaults.nutrition.base_url),
                page_size: defaults.nutrition.page_size,
                timeout: Duration::from_secs(http_timeout),
            },
            generator: GeneratorConfig {
                base_url: env_or("OLLAMA_BASE_URL", defaults.generator.base_url),
                model: env_or("GENERATOR_MODEL", defaults.generator.model),
                extraction_temperature: parse_env(
                    "EXTRACTION_TEMPERATURE",
                    defaults.generator.extraction_temperature,
                )?,
                final_temperature,
                timeout: Duration::from_secs(generator_timeout),
            },
            store: RecipeStoreConfig::from_env()?,
            server: ServerConfig {
                host: env_or("HOST", defaults.server.host),
                port: parse_env("PORT", defaults.server.port)?,
            },
            retry,
            lookup_concurrency: parse_env("LOOKUP_CONCURRENCY", defaults.lookup_concurrency)?,
            request_timeout: Duration::from_secs(parse_env(
                "REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )?),
        })
    }
}

fn env_or(name: &str, default: String) -> String {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(default)
}

fn parse_value<T: FromStr>(name: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        name,
        value: raw.to_string(),
    })
}

fn parse_env<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => parse_value(name, &raw),
        _ => Ok(default),
    }
}
