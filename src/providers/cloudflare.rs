//! Cloudflare Workers AI backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::sticky::{StickyList, exhausted};
use super::{Generation, Provider, ProviderError, TaskRequest};
use crate::credentials::ApiKey;

#[derive(Serialize)]
struct RunRequest<'a> {
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<Vec<String>>,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct RunEnvelope {
    success: bool,
    result: Option<RunResult>,
    #[serde(default)]
    errors: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct RunResult {
    response: Option<String>,
}

pub struct CloudflareProvider {
    name: String,
    base_url: String,
    account_id: String,
    api_token: ApiKey,
    models: StickyList<String>,
    generation: Generation,
    client: reqwest::Client,
}

impl CloudflareProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        account_id: impl Into<String>,
        api_token: ApiKey,
        models: Vec<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            account_id: account_id.into(),
            api_token,
            models: StickyList::new(models),
            generation: Generation::default(),
            client,
        }
    }

    pub fn with_generation(mut self, generation: Generation) -> Self {
        self.generation = generation;
        self
    }

    async fn run(&self, model: &str, request: &TaskRequest) -> Result<String, ProviderError> {
        let body = RunRequest {
            prompt: &request.prompt,
            image: request.image.as_ref().map(|i| vec![i.to_base64()]),
            max_tokens: self.generation.max_tokens,
        };
        let url = format!(
            "{}/accounts/{}/ai/run/{}",
            self.base_url.trim_end_matches('/'),
            self.account_id,
            model
        );
        let response = self
            .client
            .post(url)
            .bearer_auth(self.api_token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::transport(&self.name, e))?;
        if !response.status().is_success() {
            return Err(ProviderError::from_response(&self.name, response).await);
        }

        let envelope: RunEnvelope = response
            .json()
            .await
            .map_err(|e| ProviderError::transport(&self.name, e))?;
        if !envelope.success {
            return Err(ProviderError::other(format!(
                "{} reported failure: {}",
                self.name,
                serde_json::Value::Array(envelope.errors)
            )));
        }
        envelope
            .result
            .and_then(|r| r.response)
            .filter(|r| !r.trim().is_empty())
            .ok_or_else(|| ProviderError::other(format!("{}: empty response from {model}", self.name)))
    }
}

#[async_trait]
impl Provider for CloudflareProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, request: &TaskRequest) -> Result<String, ProviderError> {
        let mut last = None;
        let mut attempts = 0;
        for (idx, model) in self.models.order() {
            attempts += 1;
            debug!(provider = %self.name, model = %model, "calling model");
            match self.run(model, request).await {
                Ok(text) => {
                    self.models.remember(idx);
                    return Ok(text);
                }
                Err(err) => {
                    self.models.record_failure(&self.name, idx, &err);
                    last = Some(err);
                }
            }
        }
        Err(exhausted(&self.name, attempts, last))
    }
}
