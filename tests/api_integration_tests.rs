use std::collections::HashMap;
use std::env;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::extract::{Path, Query, State};
use axum::http::{Request, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use dotenv::dotenv;
use pantry_chef::api_connection::{ApiConnectionError, Generator, Provider, RetryPolicy, TextGenerator};
use pantry_chef::config::{AppConfig, NutritionConfig, RecipeStoreConfig};
use pantry_chef::nutritional_matcher::{NutrientLookup, UsdaClient};
use pantry_chef::pipeline::RecipePipeline;
use pantry_chef::search::{populate_collection, PopulateOptions, RecipeRetriever, RecipeRow, WeaviateStore};
use pantry_chef::server::{router, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;

/// Requests seen by a mock upstream.
#[derive(Clone, Default)]
struct Recorder {
    bodies: Arc<Mutex<Vec<Value>>>,
    queries: Arc<Mutex<Vec<HashMap<String, String>>>>,
    hits: Arc<AtomicUsize>,
}

async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_backoff: Duration::from_millis(5),
        max_backoff: Duration::from_millis(20),
    }
}

fn nutrition_config(base_url: &str) -> NutritionConfig {
    NutritionConfig {
        api_key: "test-key".into(),
        base_url: base_url.to_string(),
        page_size: 1,
        timeout: Duration::from_secs(5),
    }
}

fn store_config(base_url: &str) -> RecipeStoreConfig {
    RecipeStoreConfig {
        base_url: base_url.to_string(),
        collection: "Recept_medium".into(),
        timeout: Duration::from_secs(5),
    }
}

fn food_for(query: &str) -> Value {
    match query {
        "chicken" => json!({"foods": [{
            "description": "Chicken, broiler, breast",
            "foodNutrients": [
                {"nutrientName": "Protein", "value": 31.0, "unitName": "G"},
                {"nutrientName": "Cholesterol", "value": 85.0, "unitName": "MG"},
                {"nutrientName": "Total lipid (fat)", "value": 3.6, "unitName": "G"},
                {"nutrientName": "Energy", "value": 165.0, "unitName": "KCAL"}
            ]
        }]}),
        "rice" => json!({"foods": [{
            "description": "Rice, white, cooked",
            "foodNutrients": [
                {"nutrientName": "Carbohydrate, by difference", "value": 28.2, "unitName": "G"},
                {"nutrientName": "Energy", "value": 130.0, "unitName": "KCAL"}
            ]
        }]}),
        _ => json!({"totalHits": 0, "foods": []}),
    }
}

async fn usda_search(
    State(rec): State<Recorder>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    rec.hits.fetch_add(1, Ordering::SeqCst);
    let query = params.get("query").cloned().unwrap_or_default();
    rec.queries.lock().unwrap().push(params);
    Json(food_for(&query))
}

async fn ollama_generate(State(rec): State<Recorder>, Json(body): Json<Value>) -> Json<Value> {
    rec.hits.fetch_add(1, Ordering::SeqCst);
    let prompt = body["prompt"].as_str().unwrap_or_default().to_string();
    rec.bodies.lock().unwrap().push(body);
    let response = if prompt.contains("Do not write program code.") {
        "ingredients = ['chicken', 'rice']\nweights = ['200g', '100g']\nnutrients = [500, 45, 50, 15]"
    } else {
        "Chicken Rice Bowl\n\nIngredients:\n- 200g chicken\n- 100g rice"
    };
    Json(json!({"model": "llama3.2", "response": response, "done": true}))
}

async fn weaviate_ready() -> StatusCode {
    StatusCode::OK
}

async fn weaviate_graphql(State(rec): State<Recorder>, Json(body): Json<Value>) -> Json<Value> {
    rec.hits.fetch_add(1, Ordering::SeqCst);
    let query = body["query"].as_str().unwrap_or_default().to_string();
    rec.bodies.lock().unwrap().push(body);
    if query.contains("broken") {
        return Json(json!({"errors": [{"message": "Cannot query field"}]}));
    }
    Json(json!({"data": {"Get": {"Recept_medium": [{
        "title": "Chicken Fried Rice",
        "directions": "[\"Fry.\"]",
        "NER": "[\"chicken\", \"rice\"]",
        "ingredients": "[\"1 c. rice\"]"
    }]}}}))
}

fn upstreams(rec: Recorder) -> Router {
    Router::new()
        .route("/foods/search", get(usda_search))
        .route("/api/generate", post(ollama_generate))
        .route("/v1/.well-known/ready", get(weaviate_ready))
        .route("/v1/graphql", post(weaviate_graphql))
        .with_state(rec)
}

#[tokio::test]
async fn test_usda_lookup_filters_nutrients() {
    let rec = Recorder::default();
    let base = spawn(upstreams(rec.clone())).await;
    let client = UsdaClient::new(nutrition_config(&base), RetryPolicy::none()).unwrap();

    let text = client.lookup("chicken").await.unwrap();
    assert_eq!(text, "Protein 31 G Fat 3.6 G Calories 165 KCAL");

    let queries = rec.queries.lock().unwrap().clone();
    assert_eq!(queries[0].get("query").map(String::as_str), Some("chicken"));
    assert_eq!(queries[0].get("pageSize").map(String::as_str), Some("1"));
    assert_eq!(queries[0].get("api_key").map(String::as_str), Some("test-key"));
}

#[tokio::test]
async fn test_usda_lookup_without_match_is_empty() {
    let base = spawn(upstreams(Recorder::default())).await;
    let client = UsdaClient::new(nutrition_config(&base), RetryPolicy::none()).unwrap();
    assert_eq!(client.lookup("unobtainium").await.unwrap(), "");
}

#[tokio::test]
async fn test_usda_server_errors_are_retried_then_reported() {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let app = Router::new().route(
        "/foods/search",
        get(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                (StatusCode::SERVICE_UNAVAILABLE, "try later")
            }
        }),
    );
    let base = spawn(app).await;
    let client = UsdaClient::new(nutrition_config(&base), fast_retry(3)).unwrap();

    let err = client.lookup("rice").await.unwrap_err();
    match err {
        ApiConnectionError::ApiError { service, status, error_body } => {
            assert_eq!(service, "usda");
            assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
            assert_eq!(error_body, "try later");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_usda_client_errors_are_not_retried() {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let app = Router::new().route(
        "/foods/search",
        get(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                (StatusCode::FORBIDDEN, "API_KEY_INVALID")
            }
        }),
    );
    let base = spawn(app).await;
    let client = UsdaClient::new(nutrition_config(&base), fast_retry(3)).unwrap();

    assert!(client.lookup("rice").await.is_err());
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_missing_api_key_error() {
    let config = NutritionConfig {
        api_key: "   ".into(),
        ..NutritionConfig::default()
    };
    let result = UsdaClient::new(config, RetryPolicy::none());
    match result {
        Err(ApiConnectionError::MissingApiKey(name)) => assert_eq!(name, "API_KEY"),
        other => panic!("expected MissingApiKey, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_generator_posts_non_streaming_request() {
    let rec = Recorder::default();
    let base = spawn(upstreams(rec.clone())).await;
    let generator = Generator::new(
        Provider::ollama(&base, "llama3.2"),
        Duration::from_secs(5),
        RetryPolicy::none(),
    )
    .unwrap();

    let text = generator.generate("Write a haiku.", Some(0.05)).await.unwrap();
    assert!(text.starts_with("Chicken Rice Bowl"));

    let text = generator.generate("Write a haiku.", None).await.unwrap();
    assert!(!text.is_empty());

    let bodies = rec.bodies.lock().unwrap().clone();
    assert_eq!(bodies[0]["model"], "llama3.2");
    assert_eq!(bodies[0]["stream"], false);
    let temperature = bodies[0]["options"]["temperature"].as_f64().unwrap();
    assert!((temperature - 0.05).abs() < 1e-6);
    assert!(bodies[1].get("options").is_none());
}

#[tokio::test]
async fn test_weaviate_retrieve_renders_best_match() {
    let rec = Recorder::default();
    let base = spawn(upstreams(rec.clone())).await;
    let store = WeaviateStore::new(store_config(&base), RetryPolicy::none()).unwrap();

    let text = store
        .retrieve(&["chicken".to_string(), "rice".to_string()])
        .await
        .unwrap();
    assert!(text.starts_with("{\n  \"title\": \"Chicken Fried Rice\""));
    assert_eq!(store.open_sessions(), 0);

    let bodies = rec.bodies.lock().unwrap().clone();
    let query = bodies[0]["query"].as_str().unwrap();
    assert!(query.contains("Recept_medium(nearText"));
    assert!(query.contains("if I have chicken, rice, what can I make?"));
    assert!(query.contains("limit: 1"));
    assert!(query.contains("title directions NER ingredients"));
}

#[tokio::test]
async fn test_weaviate_graphql_errors_release_session() {
    let base = spawn(upstreams(Recorder::default())).await;
    let store = WeaviateStore::new(store_config(&base), RetryPolicy::none()).unwrap();

    let err = store.retrieve(&["broken".to_string()]).await.unwrap_err();
    assert!(err.to_string().contains("Cannot query field"));
    assert_eq!(store.open_sessions(), 0);
}

#[tokio::test]
async fn test_populate_creates_collection_and_loads_batches() {
    let rec = Recorder::default();
    let schema_created = Arc::new(AtomicUsize::new(0));
    let created = schema_created.clone();

    let app = Router::new()
        .route("/v1/.well-known/ready", get(weaviate_ready))
        .route(
            "/v1/schema/:name",
            get(|Path(_name): Path<String>| async { StatusCode::NOT_FOUND }),
        )
        .route(
            "/v1/schema",
            post(move |Json(body): Json<Value>| {
                let created = created.clone();
                async move {
                    assert_eq!(body["vectorizer"], "text2vec-ollama");
                    created.fetch_add(1, Ordering::SeqCst);
                    Json(body)
                }
            }),
        )
        .route(
            "/v1/batch/objects",
            post(|State(rec): State<Recorder>, Json(body): Json<Value>| async move {
                let objects = body["objects"].as_array().cloned().unwrap_or_default();
                rec.bodies.lock().unwrap().push(body);
                let results: Vec<Value> = objects
                    .iter()
                    .map(|object| {
                        if object["properties"]["title"] == "Bad" {
                            json!({"result": {"errors": {"error": [{"message": "vectorizer failed"}]}}})
                        } else {
                            json!({"result": {}})
                        }
                    })
                    .collect();
                Json(Value::Array(results))
            }),
        )
        .with_state(rec.clone());
    let base = spawn(app).await;
    let store = WeaviateStore::new(store_config(&base), RetryPolicy::none()).unwrap();

    let rows: Vec<RecipeRow> = ["Toast", "Bad", "Soup"]
        .iter()
        .map(|title| RecipeRow {
            title: title.to_string(),
            directions: "[\"Cook.\"]".into(),
            ner: "[\"bread\"]".into(),
            ingredients: "[\"1 slice bread\"]".into(),
        })
        .collect();
    let options = PopulateOptions {
        batch_size: 2,
        ..PopulateOptions::default()
    };

    let report = populate_collection(&store, &rows, &options).await.unwrap();
    assert!(report.created);
    assert_eq!(report.inserted, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(schema_created.load(Ordering::SeqCst), 1);
    assert_eq!(rec.bodies.lock().unwrap().len(), 2);
    assert_eq!(store.open_sessions(), 0);
}

#[tokio::test]
async fn test_populate_tolerates_more_errors_than_objects() {
    let app = Router::new()
        .route("/v1/.well-known/ready", get(weaviate_ready))
        .route(
            "/v1/schema/:name",
            get(|Path(_name): Path<String>| async { StatusCode::NOT_FOUND }),
        )
        .route("/v1/schema", post(|Json(body): Json<Value>| async move { Json(body) }))
        .route(
            "/v1/batch/objects",
            post(|| async {
                let rejected = json!({"result": {"errors": {"error": [{"message": "duplicate"}]}}});
                Json(json!([rejected.clone(), rejected.clone(), rejected]))
            }),
        );
    let base = spawn(app).await;
    let store = WeaviateStore::new(store_config(&base), RetryPolicy::none()).unwrap();
    let rows = vec![RecipeRow {
        title: "Toast".into(),
        directions: "[\"Toast.\"]".into(),
        ner: "[\"bread\"]".into(),
        ingredients: "[\"1 slice bread\"]".into(),
    }];

    let report = populate_collection(&store, &rows, &PopulateOptions::default())
        .await
        .unwrap();
    assert_eq!(report.inserted, 0);
    assert_eq!(report.failed, 3);
}

#[tokio::test]
async fn test_process_end_to_end_against_mock_services() {
    let rec = Recorder::default();
    let base = spawn(upstreams(rec.clone())).await;

    let mut config = AppConfig::default();
    config.nutrition = nutrition_config(&base);
    config.generator.base_url = base.clone();
    config.store = store_config(&base);
    config.retry = RetryPolicy::none();

    let pipeline = RecipePipeline::from_config(&config).unwrap();
    let app = router(AppState {
        pipeline: Arc::new(pipeline),
        request_timeout: Duration::from_secs(10),
    });

    let response = app
        .oneshot(
            Request::builder()
                .uri("/process?input=I%20have%20200g%20chicken%20and%20100g%20rice")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();

    assert_eq!(body["ingredients"], json!(["chicken", "rice"]));
    assert_eq!(body["weights"], json!(["200g", "100g"]));
    assert_eq!(body["nutrients"], json!([500, 45, 50, 15]));
    assert!(body["recipe"].as_str().unwrap().starts_with("Chicken Rice Bowl"));

    let generator_calls: Vec<Value> = rec
        .bodies
        .lock()
        .unwrap()
        .iter()
        .filter(|b| b.get("prompt").is_some())
        .cloned()
        .collect();
    assert_eq!(generator_calls.len(), 2);
    let final_prompt = generator_calls[1]["prompt"].as_str().unwrap();
    assert!(final_prompt.contains("chicken: Protein 31 G Fat 3.6 G Calories 165 KCAL"));
    assert!(final_prompt.contains("rice: Carbs 28.2 G Calories 130 KCAL"));
    assert!(final_prompt.contains("Chicken Fried Rice"));
}

#[tokio::test]
async fn test_process_fails_when_nutrition_service_is_down() {
    let rec = Recorder::default();
    let base = spawn(upstreams(rec.clone())).await;

    let mut config = AppConfig::default();
    // Nothing listens on the discard port.
    config.nutrition = nutrition_config("http://127.0.0.1:9");
    config.generator.base_url = base.clone();
    config.store = store_config(&base);
    config.retry = RetryPolicy::none();

    let app = router(AppState {
        pipeline: Arc::new(RecipePipeline::from_config(&config).unwrap()),
        request_timeout: Duration::from_secs(10),
    });
    let response = app
        .oneshot(Request::builder().uri("/process?input=chicken").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["error"].as_str().unwrap().contains("chicken"));

    // Only the extraction round reached the generator.
    let prompts = rec
        .bodies
        .lock()
        .unwrap()
        .iter()
        .filter(|b| b.get("prompt").is_some())
        .count();
    assert_eq!(prompts, 1);
}

fn setup_test_environment() {
    dotenv().ok();
}

#[tokio::test]
#[ignore]
async fn test_live_usda_lookup() {
    setup_test_environment();
    let Ok(config) = AppConfig::from_env() else {
        println!("Skipping test_live_usda_lookup: API_KEY not set.");
        return;
    };
    let client = UsdaClient::new(config.nutrition, RetryPolicy::default()).unwrap();
    let text = client.lookup("banana").await.unwrap();
    assert!(text.contains("Carbs"), "unexpected nutrient text: {text}");
}

#[tokio::test]
#[ignore]
async fn test_live_generator_call() {
    setup_test_environment();
    let base_url = env::var("OLLAMA_BASE_URL").unwrap_or_else(|_| "http://localhost:11434".into());
    let model = env::var("GENERATOR_MODEL").unwrap_or_else(|_| "llama3.2".into());
    let generator = Generator::new(
        Provider::ollama(&base_url, &model),
        Duration::from_secs(120),
        RetryPolicy::default(),
    )
    .unwrap();
    let text = generator
        .generate("What is the capital of France? Respond concisely.", Some(0.1))
        .await
        .unwrap();
    assert!(text.to_lowercase().contains("paris"));
}

#[tokio::test]
#[ignore]
async fn test_live_pipeline() {
    setup_test_environment();
    let Ok(config) = AppConfig::from_env() else {
        println!("Skipping test_live_pipeline: API_KEY not set.");
        return;
    };
    let pipeline = RecipePipeline::from_config(&config).unwrap();
    let result = pipeline
        .run_within("I have 200g chicken and 100g rice, I want 500 kcal", config.request_timeout)
        .await
        .unwrap();
    assert!(!result.ingredients.is_empty());
    assert_eq!(result.ingredients.len(), result.weights.len());
    assert!(!result.recipe.is_empty());
}
