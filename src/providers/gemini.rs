//! Google Gemini `generateContent` backend with API-key rotation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::sticky::{StickyList, exhausted};
use super::{Generation, Provider, ProviderError, TaskRequest};
use crate::credentials::ApiKey;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

#[derive(Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_k: u32,
    top_p: f32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// Text parts of the first candidate, concatenated.
fn response_text(response: GenerateResponse) -> String {
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default()
}

pub struct GeminiProvider {
    name: String,
    base_url: String,
    keys: StickyList<ApiKey>,
    models: StickyList<String>,
    generation: Generation,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        keys: Vec<ApiKey>,
        models: Vec<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            keys: StickyList::new(keys),
            models: StickyList::new(models),
            generation: Generation::default(),
            client,
        }
    }

    pub fn with_generation(mut self, generation: Generation) -> Self {
        self.generation = generation;
        self
    }

    async fn generate(
        &self,
        key: &ApiKey,
        model: &str,
        request: &TaskRequest,
    ) -> Result<String, ProviderError> {
        let mut parts = vec![Part::Text {
            text: request.prompt.clone(),
        }];
        if let Some(image) = &request.image {
            parts.push(Part::InlineData {
                inline_data: InlineData {
                    mime_type: image.media_type.clone(),
                    data: image.to_base64(),
                },
            });
        }
        let body = GenerateRequest {
            contents: vec![Content { role: "user", parts }],
            generation_config: GenerationConfig {
                temperature: self.generation.temperature,
                top_k: 40,
                top_p: 0.95,
                max_output_tokens: self.generation.max_tokens,
            },
        };

        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            model
        );
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::transport(&self.name, e))?;
        if !response.status().is_success() {
            return Err(ProviderError::from_response(&self.name, response).await);
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::transport(&self.name, e))?;
        let text = response_text(parsed);
        if text.trim().is_empty() {
            return Err(ProviderError::other(format!(
                "{}: empty candidate from {model}",
                self.name
            )));
        }
        Ok(text)
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    /// Tries every (key, model) pair, remembered key and model first.
    async fn invoke(&self, request: &TaskRequest) -> Result<String, ProviderError> {
        let mut last = None;
        let mut attempts = 0;
        for (key_idx, key) in self.keys.order() {
            for (model_idx, model) in self.models.order() {
                attempts += 1;
                debug!(provider = %self.name, key = key_idx + 1, model = %model, "calling model");
                match self.generate(key, model, request).await {
                    Ok(text) => {
                        self.keys.remember(key_idx);
                        self.models.remember(model_idx);
                        return Ok(text);
                    }
                    Err(err) => {
                        debug!(provider = %self.name, key = key_idx + 1, "key/model failed");
                        self.models.record_failure(&self.name, model_idx, &err);
                        last = Some(err);
                    }
                }
            }
        }
        Err(exhausted(&self.name, attempts, last))
    }
}
