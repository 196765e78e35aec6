use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use futures_util::{stream, StreamExt, TryStreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::api_connection::connection::{ensure_success, http_client, ApiConnectionError};
use crate::api_connection::retry::RetryPolicy;
use crate::config::NutritionConfig;

const SERVICE: &str = "usda";

/// Resolves an ingredient name to a one-line nutrient description.
#[async_trait]
pub trait NutrientLookup: Send + Sync {
    /// Returns an empty string when nothing matches.
    async fn lookup(&self, ingredient: &str) -> Result<String, ApiConnectionError>;
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FoodSearchResponse {
    #[serde(default)]
    pub foods: Vec<FoodRecord>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FoodRecord {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub food_nutrients: Vec<FoodNutrient>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FoodNutrient {
    #[serde(default)]
    pub nutrient_name: String,
    pub value: Option<f64>,
    #[serde(default)]
    pub unit_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NutrientKind {
    Fat,
    Protein,
    Carbs,
    Calories,
}

impl NutrientKind {
    pub fn from_usda_name(name: &str) -> Option<Self> {
        match name {
            "Total lipid (fat)" => Some(NutrientKind::Fat),
            "Protein" => Some(NutrientKind::Protein),
            "Carbohydrate, by difference" => Some(NutrientKind::Carbs),
            "Energy" => Some(NutrientKind::Calories),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            NutrientKind::Fat => "Fat",
            NutrientKind::Protein => "Protein",
            NutrientKind::Carbs => "Carbs",
            NutrientKind::Calories => "Calories",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutrientAmount {
    pub kind: NutrientKind,
    pub value: f64,
    pub unit: String,
}

impl fmt::Display for NutrientAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.kind.label(), self.value, self.unit)
    }
}

fn is_kcal(unit: &str) -> bool {
    unit.eq_ignore_ascii_case("kcal")
}

/// Keeps fat, protein, carbs and energy in the order the service listed them.
///
/// A label seen twice keeps its first entry, except that a kcal energy entry replaces an
/// earlier energy entry in another unit (the service often reports kJ as well).
pub fn summarize_food(food: &FoodRecord) -> Vec<NutrientAmount> {
    let mut kept: Vec<NutrientAmount> = Vec::new();
    for nutrient in &food.food_nutrients {
        let Some(kind) = NutrientKind::from_usda_name(&nutrient.nutrient_name) else {
            continue;
        };
        let Some(value) = nutrient.value else {
            continue;
        };
        let amount = NutrientAmount {
            kind,
            value,
            unit: nutrient.unit_name.clone(),
        };
        match kept.iter_mut().find(|existing| existing.kind == kind) {
            None => kept.push(amount),
            Some(existing) => {
                if kind == NutrientKind::Calories && !is_kcal(&existing.unit) && is_kcal(&amount.unit) {
                    *existing = amount;
                }
            }
        }
    }
    kept
}

/// Space-joined `<label> <value> <unit>` triples.
pub fn render_nutrients(amounts: &[NutrientAmount]) -> String {
    amounts
        .iter()
        .map(|amount| amount.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// USDA FoodData Central search client.
#[derive(Debug, Clone)]
pub struct UsdaClient {
    config: NutritionConfig,
    client: Client,
    retry: RetryPolicy,
}

impl UsdaClient {
    pub fn new(config: NutritionConfig, retry: RetryPolicy) -> Result<Self, ApiConnectionError> {
        if config.api_key.trim().is_empty() {
            return Err(ApiConnectionError::MissingApiKey(
                crate::config::NUTRITION_API_KEY_ENV_VAR.to_string(),
            ));
        }
        let client = http_client(config.timeout)?;
        Ok(Self {
            config,
            client,
            retry,
        })
    }

    pub async fn search_foods(&self, query: &str) -> Result<FoodSearchResponse, ApiConnectionError> {
        let url = format!("{}/foods/search", self.config.base_url.trim_end_matches('/'));
        let page_size = self.config.page_size.to_string();
        let params = [
            ("query", query),
            ("pageSize", page_size.as_str()),
            ("api_key", self.config.api_key.as_str()),
        ];

        let client = &self.client;
        let url = url.as_str();
        let params = &params;
        self.retry
            .run("usda food search", || async move {
                let response = client.get(url).query(params).send().await?;
                let response = ensure_success(SERVICE, response).await?;
                let body = response.bytes().await?;
                Ok(serde_json::from_slice::<FoodSearchResponse>(&body)?)
            })
            .await
    }
}

#[async_trait]
impl NutrientLookup for UsdaClient {
    async fn lookup(&self, ingredient: &str) -> Result<String, ApiConnectionError> {
        let query = ingredient.trim();
        if query.is_empty() {
            return Ok(String::new());
        }
        let response = self.search_foods(query).await?;
        let Some(food) = response.foods.first() else {
            debug!(ingredient = query, "No USDA match");
            return Ok(String::new());
        };
        let text = render_nutrients(&summarize_food(food));
        debug!(ingredient = query, matched = %food.description, nutrients = %text, "USDA match");
        Ok(text)
    }
}

#[derive(Debug, Error)]
#[error("nutrient lookup for '{ingredient}' failed: {source}")]
pub struct LookupError {
    pub ingredient: String,
    #[source]
    pub source: ApiConnectionError,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngredientNutrients {
    pub ingredient: String,
    pub nutrients: String,
}

/// Per-ingredient nutrient lines, in extraction order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NutrientSummary {
    pub lines: Vec<IngredientNutrients>,
}

impl fmt::Display for NutrientSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, line) in self.lines.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{}: {}", line.ingredient, line.nutrients)?;
        }
        Ok(())
    }
}

/// Looks up every ingredient with at most `concurrency` calls in flight.
///
/// Repeated names are looked up once. The first failure aborts the remaining lookups.
pub async fn summarize_meal(
    lookup: &dyn NutrientLookup,
    ingredients: &[String],
    concurrency: usize,
) -> Result<NutrientSummary, LookupError> {
    let mut unique: Vec<String> = Vec::new();
    for name in ingredients {
        if !unique.contains(name) {
            unique.push(name.clone());
        }
    }
    info!(
        ingredients = ingredients.len(),
        distinct = unique.len(),
        "Fetching nutrient data"
    );

    // Futures own their name so the stream is `Send` for any caller lifetime.
    let found: Vec<(String, String)> = stream::iter(unique)
        .map(|name: String| async move {
            match lookup.lookup(&name).await {
                Ok(text) => Ok((name, text)),
                Err(source) => Err(LookupError {
                    ingredient: name,
                    source,
                }),
            }
        })
        .buffered(concurrency.max(1))
        .try_collect()
        .await?;
    let by_name: HashMap<String, String> = found.into_iter().collect();

    let lines = ingredients
        .iter()
        .map(|name| IngredientNutrients {
            ingredient: name.clone(),
            nutrients: by_name.get(name.as_str()).cloned().unwrap_or_default(),
        })
        .collect();
    Ok(NutrientSummary { lines })
}
