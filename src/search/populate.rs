//! Creation and bulk loading of the recipe collection.

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::data_loader::RecipeRow;
use super::recipe_store::{StoreSession, WeaviateStore, SERVICE};
use crate::api_connection::connection::{ensure_success, ApiConnectionError};
use crate::api_connection::endpoints::{DEFAULT_GENERATOR_MODEL, DEFAULT_OLLAMA_BASE_URL};
use crate::config::DEFAULT_EMBEDDING_MODEL;

#[derive(Debug, Clone)]
pub struct PopulateOptions {
    /// Ollama endpoint as seen from the store (often `host.docker.internal`).
    pub ollama_endpoint: String,
    pub embedding_model: String,
    pub generative_model: String,
    pub batch_size: usize,
}

impl Default for PopulateOptions {
    fn default() -> Self {
        Self {
            ollama_endpoint: DEFAULT_OLLAMA_BASE_URL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            generative_model: DEFAULT_GENERATOR_MODEL.to_string(),
            batch_size: 100,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PopulateReport {
    pub created: bool,
    pub inserted: usize,
    pub failed: usize,
}

#[derive(Debug, Deserialize)]
struct BatchObjectResult {
    #[serde(default)]
    result: Option<BatchResultBody>,
}

#[derive(Debug, Deserialize)]
struct BatchResultBody {
    #[serde(default)]
    errors: Option<BatchErrors>,
}

#[derive(Debug, Deserialize)]
struct BatchErrors {
    #[serde(default)]
    error: Vec<BatchErrorMessage>,
}

#[derive(Debug, Deserialize)]
struct BatchErrorMessage {
    message: String,
}

/// Class definition with an Ollama vectorizer and generative module.
pub fn collection_schema(collection: &str, options: &PopulateOptions) -> Value {
    json!({
        "class": collection,
        "vectorizer": "text2vec-ollama",
        "moduleConfig": {
            "text2vec-ollama": {
                "apiEndpoint": options.ollama_endpoint,
                "model": options.embedding_model,
            },
            "generative-ollama": {
                "apiEndpoint": options.ollama_endpoint,
                "model": options.generative_model,
            },
        },
    })
}

impl StoreSession<'_> {
    pub async fn collection_exists(&self) -> Result<bool, ApiConnectionError> {
        let url = self.store.url(&format!("/v1/schema/{}", self.store.collection()));
        let response = self.store.client().get(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        ensure_success(SERVICE, response).await?;
        Ok(true)
    }

    pub async fn create_collection(&self, options: &PopulateOptions) -> Result<(), ApiConnectionError> {
        let url = self.store.url("/v1/schema");
        let schema = collection_schema(self.store.collection(), options);
        let response = self.store.client().post(&url).json(&schema).send().await?;
        ensure_success(SERVICE, response).await?;
        Ok(())
    }

    /// Inserts one batch and returns how many objects the store rejected.
    pub async fn insert_batch(&self, rows: &[RecipeRow]) -> Result<usize, ApiConnectionError> {
        let collection = self.store.collection();
        let objects: Vec<Value> = rows
            .iter()
            .map(|row| json!({ "class": collection, "properties": row }))
            .collect();
        let body = json!({ "objects": objects });

        let url = self.store.url("/v1/batch/objects");
        let client = self.store.client();
        let url = url.as_str();
        let body = &body;
        let results: Vec<BatchObjectResult> = self
            .store
            .retry()
            .run("weaviate batch insert", || async move {
                let response = client.post(url).json(body).send().await?;
                let response = ensure_success(SERVICE, response).await?;
                let bytes = response.bytes().await?;
                Ok(serde_json::from_slice::<Vec<BatchObjectResult>>(&bytes)?)
            })
            .await?;

        let mut failed = 0;
        for errors in results
            .iter()
            .filter_map(|r| r.result.as_ref())
            .filter_map(|body| body.errors.as_ref())
            .filter(|errors| !errors.error.is_empty())
        {
            failed += 1;
            for e in &errors.error {
                warn!(error = %e.message, "Recipe rejected by store");
            }
        }
        Ok(failed)
    }
}

/// Creates the collection when it is missing and loads `rows` into it.
///
/// An existing collection is left untouched.
pub async fn populate_collection(
    store: &WeaviateStore,
    rows: &[RecipeRow],
    options: &PopulateOptions,
) -> Result<PopulateReport, ApiConnectionError> {
    let session = store.connect().await?;
    info!(collection = store.collection(), "Recipe store is ready");

    if session.collection_exists().await? {
        info!(collection = store.collection(), "Collection already exists, skipping load");
        return Ok(PopulateReport::default());
    }

    info!(collection = store.collection(), "Creating collection");
    session.create_collection(options).await?;

    let mut report = PopulateReport {
        created: true,
        ..PopulateReport::default()
    };
    let batch_size = options.batch_size.max(1);
    for (idx, chunk) in rows.chunks(batch_size).enumerate() {
        let failed = session.insert_batch(chunk).await?;
        report.failed += failed;
        report.inserted += chunk.len().saturating_sub(failed);
        info!(
            batch = idx + 1,
            inserted = report.inserted,
            failed = report.failed,
            total = rows.len(),
            "Loaded recipe batch"
        );
    }
    Ok(report)
}
