//! OpenAI-style `/chat/completions` backends (OpenRouter, Groq).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::sticky::{StickyList, exhausted};
use super::{Generation, Provider, ProviderError, TaskRequest};
use crate::credentials::ApiKey;

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: MessageContent,
}

#[derive(Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

pub struct OpenAiCompatibleProvider {
    name: String,
    base_url: String,
    api_key: ApiKey,
    headers: Vec<(String, String)>,
    models: StickyList<String>,
    generation: Generation,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: ApiKey,
        models: Vec<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            api_key,
            headers: Vec::new(),
            models: StickyList::new(models),
            generation: Generation::default(),
            client,
        }
    }

    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_generation(mut self, generation: Generation) -> Self {
        self.generation = generation;
        self
    }

    /// Model that served the most recent successful call.
    pub fn current_model(&self) -> Option<&str> {
        self.models.current().map(String::as_str)
    }

    async fn complete(&self, model: &str, request: &TaskRequest) -> Result<String, ProviderError> {
        let content = match &request.image {
            None => MessageContent::Text(request.prompt.clone()),
            Some(image) => MessageContent::Parts(vec![
                ContentPart::Text {
                    text: request.prompt.clone(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image.data_url(),
                    },
                },
            ]),
        };
        let body = ChatRequest {
            model,
            messages: vec![ChatMessage {
                role: "user",
                content,
            }],
            max_tokens: self.generation.max_tokens,
            temperature: self.generation.temperature,
        };

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let mut builder = self
            .client
            .post(url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body);
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ProviderError::transport(&self.name, e))?;
        if !response.status().is_success() {
            return Err(ProviderError::from_response(&self.name, response).await);
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::transport(&self.name, e))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ProviderError::other(format!("{}: empty completion from {model}", self.name)))
    }
}

#[async_trait]
impl Provider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, request: &TaskRequest) -> Result<String, ProviderError> {
        let mut last = None;
        let mut attempts = 0;
        for (idx, model) in self.models.order() {
            attempts += 1;
            debug!(provider = %self.name, model = %model, "calling model");
            match self.complete(model, request).await {
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
