use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::api_connection::connection::{ensure_success, http_client, ApiConnectionError};
use crate::api_connection::retry::RetryPolicy;
use crate::config::RecipeStoreConfig;

pub(crate) const SERVICE: &str = "weaviate";

/// Properties fetched for every reference recipe.
pub const RECIPE_FIELDS: &[&str] = &["title", "directions", "NER", "ingredients"];

/// Finds the stored recipe closest to a set of ingredients.
#[async_trait]
pub trait RecipeRetriever: Send + Sync {
    /// Returns the best match serialized as text, or an empty string when nothing matched.
    async fn retrieve(&self, ingredients: &[String]) -> Result<String, ApiConnectionError>;
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

pub type RecipeObject = Map<String, Value>;

/// Client for a Weaviate instance holding the recipe collection.
///
/// The HTTP client is pooled and shared; each request works inside a [`StoreSession`].
#[derive(Debug, Clone)]
pub struct WeaviateStore {
    config: RecipeStoreConfig,
    client: Client,
    retry: RetryPolicy,
    open_sessions: Arc<AtomicUsize>,
}

fn valid_collection_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl WeaviateStore {
    pub fn new(config: RecipeStoreConfig, retry: RetryPolicy) -> Result<Self, ApiConnectionError> {
        if !valid_collection_name(&config.collection) {
            return Err(ApiConnectionError::Upstream {
                service: SERVICE,
                message: format!("invalid collection name {:?}", config.collection),
            });
        }
        Ok(Self {
            client: http_client(config.timeout)?,
            config,
            retry,
            open_sessions: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn collection(&self) -> &str {
        &self.config.collection
    }

    /// Sessions acquired and not yet released.
    pub fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::SeqCst)
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    pub(crate) fn client(&self) -> &Client {
        &self.client
    }

    pub(crate) fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Probes readiness and opens a session. The session is released when dropped.
    pub async fn connect(&self) -> Result<StoreSession<'_>, ApiConnectionError> {
        let url = self.url("/v1/.well-known/ready");
        let client = &self.client;
        let url = url.as_str();
        self.retry
            .run("weaviate readiness", || async move {
                let response = client.get(url).send().await?;
                ensure_success(SERVICE, response).await.map(|_| ())
            })
            .await?;

        let open = self.open_sessions.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(open, "Recipe store session acquired");
        Ok(StoreSession { store: self })
    }
}

/// A scoped unit of work against the store.
pub struct StoreSession<'a> {
    pub(crate) store: &'a WeaviateStore,
}

impl StoreSession<'_> {
    /// Semantic search over the collection, returning at most `limit` property sets.
    pub async fn near_text(&self, query: &str, limit: u32) -> Result<Vec<RecipeObject>, ApiConnectionError> {
        let store = self.store;
        let collection = store.collection();
        let graphql = format!(
            "{{ Get {{ {collection}(nearText: {{concepts: [{concept}]}}, limit: {limit}) {{ {fields} }} }} }}",
            collection = collection,
            concept = serde_json::to_string(query)?,
            limit = limit,
            fields = RECIPE_FIELDS.join(" "),
        );
        let body = json!({ "query": graphql });

        let url = store.url("/v1/graphql");
        let client = store.client();
        let url = url.as_str();
        let body = &body;
        let parsed: GraphQlResponse = store
            .retry()
            .run("weaviate nearText", || async move {
                let response = client.post(url).json(body).send().await?;
                let response = ensure_success(SERVICE, response).await?;
                let bytes = response.bytes().await?;
                Ok(serde_json::from_slice::<GraphQlResponse>(&bytes)?)
            })
            .await?;

        if !parsed.errors.is_empty() {
            let message = parsed
                .errors
                .into_iter()
                .map(|e| e.message)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(ApiConnectionError::Upstream {
                service: SERVICE,
                message,
            });
        }

        let objects = parsed
            .data
            .as_ref()
            .and_then(|data| data.get("Get"))
            .and_then(|get| get.get(collection))
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.as_object().cloned())
                    .collect()
            })
            .unwrap_or_default();
        Ok(objects)
    }
}

impl Drop for StoreSession<'_> {
    fn drop(&mut self) {
        let open = self.store.open_sessions.fetch_sub(1, Ordering::SeqCst) - 1;
        debug!(open, "Recipe store session released");
    }
}

/// Natural-language query used to find inspiration for a set of ingredients.
pub fn inspiration_query(ingredients: &[String]) -> String {
    format!("if I have {}, what can I make?", ingredients.join(", "))
}

/// Pretty JSON (two-space indent) for each object, one after another.
pub fn render_recipes(objects: &[RecipeObject]) -> Result<String, ApiConnectionError> {
    let rendered = objects
        .iter()
        .map(serde_json::to_string_pretty)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rendered.join("\n"))
}

#[async_trait]
impl RecipeRetriever for WeaviateStore {
    async fn retrieve(&self, ingredients: &[String]) -> Result<String, ApiConnectionError> {
        let session = self.connect().await?;
        let objects = session.near_text(&inspiration_query(ingredients), 1).await?;
        drop(session);
        info!(matches = objects.len(), "Fetched reference recipe");
        render_recipes(&objects)
    }
}
