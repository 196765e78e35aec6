use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument};

use crate::api_connection::{ApiConnectionError, Generator, Provider, TextGenerator};
use crate::config::AppConfig;
use crate::nutritional_matcher::{summarize_meal, LookupError, NutrientLookup, UsdaClient};
use crate::prompts::{extraction_prompt, final_prompt};
use crate::recipe_parser::{parse_extraction, ExtractionError, NutrientTarget};
use crate::search::{RecipeRetriever, WeaviateStore};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("text generation failed: {0}")]
    Generator(#[source] ApiConnectionError),
    #[error(transparent)]
    NutritionLookup(#[from] LookupError),
    #[error("recipe retrieval failed: {0}")]
    Retrieval(#[source] ApiConnectionError),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

/// What a successful request returns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineResult {
    pub ingredients: Vec<String>,
    pub weights: Vec<String>,
    /// Calories, protein, carbs, fat.
    pub nutrients: [u32; 4],
    pub recipe: String,
}

/// Sampling and fan-out knobs for one pipeline.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub extraction_temperature: f32,
    pub final_temperature: Option<f32>,
    pub lookup_concurrency: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            extraction_temperature: 0.05,
            final_temperature: None,
            lookup_concurrency: 4,
        }
    }
}

/// Two-round recipe generation: extract constraints, gather context, write the recipe.
#[derive(Clone)]
pub struct RecipePipeline {
    generator: Arc<dyn TextGenerator>,
    nutrition: Arc<dyn NutrientLookup>,
    recipes: Arc<dyn RecipeRetriever>,
    settings: PipelineSettings,
}

impl RecipePipeline {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        nutrition: Arc<dyn NutrientLookup>,
        recipes: Arc<dyn RecipeRetriever>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            generator,
            nutrition,
            recipes,
            settings,
        }
    }

    /// Wires the live Ollama, USDA and Weaviate clients from `config`.
    pub fn from_config(config: &AppConfig) -> Result<Self, ApiConnectionError> {
        let provider = Provider::ollama(&config.generator.base_url, &config.generator.model);
        let generator = Generator::new(provider, config.generator.timeout, config.retry.clone())?;
        let nutrition = UsdaClient::new(config.nutrition.clone(), config.retry.clone())?;
        let recipes = WeaviateStore::new(config.store.clone(), config.retry.clone())?;
        Ok(Self::new(
            Arc::new(generator),
            Arc::new(nutrition),
            Arc::new(recipes),
            PipelineSettings {
                extraction_temperature: config.generator.extraction_temperature,
                final_temperature: config.generator.final_temperature,
                lookup_concurrency: config.lookup_concurrency,
            },
        ))
    }

    #[instrument(skip_all, fields(input_chars = user_text.len()))]
    pub async fn run(&self, user_text: &str) -> Result<PipelineResult, PipelineError> {
        let extraction = self
            .generator
            .generate(&extraction_prompt(user_text), Some(self.settings.extraction_temperature))
            .await
            .map_err(PipelineError::Generator)?;

        let lists = parse_extraction(&extraction)?;
        let specs = lists.ingredient_specs()?;
        let target: NutrientTarget = lists.nutrient_target()?;
        info!(
            ingredients = specs.len(),
            defaulted_target = lists.nutrients.is_none(),
            "Constraints extracted"
        );

        let names: Vec<String> = specs.iter().map(|spec| spec.name.clone()).collect();
        let summary = summarize_meal(self.nutrition.as_ref(), &names, self.settings.lookup_concurrency).await?;
        let reference = self
            .recipes
            .retrieve(&names)
            .await
            .map_err(PipelineError::Retrieval)?;

        let recipe = self
            .generator
            .generate(
                &final_prompt(&specs, &summary, &reference, &target),
                self.settings.final_temperature,
            )
            .await
            .map_err(PipelineError::Generator)?;
        info!(chars = recipe.len(), "Recipe generated");

        Ok(PipelineResult {
            ingredients: names,
            weights: lists.weights.unwrap_or_default(),
            nutrients: target.0,
            recipe,
        })
    }

    /// [`run`](Self::run) bounded by `budget`; expiry abandons every outstanding call.
    pub async fn run_within(&self, user_text: &str, budget: Duration) -> Result<PipelineResult, PipelineError> {
        tokio::time::timeout(budget, self.run(user_text))
            .await
            .map_err(|_| PipelineError::Timeout(budget))?
    }
}
