use serde::{Deserialize, Serialize};

pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_GENERATOR_MODEL: &str = "llama3.2";

#[derive(Clone, Debug, Serialize)]
pub enum Provider {
    Ollama { base_url: String, model: String },
}

impl Provider {
    pub fn ollama(base_url: &str, model: &str) -> Self {
        Self::Ollama {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    pub fn model(&self) -> &str {
        match self {
            Provider::Ollama { model, .. } => model,
        }
    }

    pub fn generate_url(&self) -> String {
        match self {
            Provider::Ollama { base_url, .. } => format!("{}/api/generate", base_url),
        }
    }

    pub fn service_name(&self) -> &'static str {
        match self {
            Provider::Ollama { .. } => "ollama",
        }
    }
}

/// Sampling settings. Unset fields fall back to the model's own defaults.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct GenerateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<u32>,
}

impl GenerateOptions {
    pub fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.num_predict.is_none()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
    #[serde(default, skip_serializing_if = "GenerateOptions::is_empty")]
    pub options: GenerateOptions,
}

impl GenerateRequest {
    pub fn new(model: &str, prompt: &str, temperature: Option<f32>) -> Self {
        Self {
            model: model.to_string(),
            prompt: prompt.to_string(),
            stream: false,
            options: GenerateOptions {
                temperature,
                num_predict: None,
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GenerateResponse {
    #[serde(default)]
    pub model: String,
    pub response: String,
    #[serde(default)]
    pub done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eval_count: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_omits_unset_options() {
        let request = GenerateRequest::new("llama3.2", "hello", None);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["stream"], false);
        assert!(value.get("options").is_none());

        let request = GenerateRequest::new("llama3.2", "hello", Some(0.05));
        let value = serde_json::to_value(&request).unwrap();
        assert!((value["options"]["temperature"].as_f64().unwrap() - 0.05).abs() < 1e-6);
    }

    #[test]
    fn test_provider_url_strips_trailing_slash() {
        let provider = Provider::ollama("http://localhost:11434/", "llama3.2");
        assert_eq!(provider.generate_url(), "http://localhost:11434/api/generate");
        assert_eq!(provider.model(), "llama3.2");
    }

    #[test]
    fn test_response_tolerates_missing_metadata() {
        let response: GenerateResponse =
            serde_json::from_str(r#"{"response": "ingredients = ['egg']"}"#).unwrap();
        assert_eq!(response.response, "ingredients = ['egg']");
        assert!(!response.done);
    }
}
