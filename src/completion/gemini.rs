use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::{CompletionClient, CompletionError, CompletionRequest, ProviderResponse, Reply};
use crate::config::Config;

/// Gemini `generateContent` 客户端
pub struct GeminiClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<WireContent<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct WireContent<'a> {
    role: &'static str,
    parts: [WirePart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct WirePart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

impl GeminiClient {
    pub fn new(api_key: Option<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.gemini_api_key.clone(), config.gemini_base_url.clone())
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
    }
}

fn wire_body(request: &CompletionRequest) -> GenerateContentRequest<'_> {
    GenerateContentRequest {
        contents: request
            .turns
            .iter()
            .map(|turn| WireContent {
                role: turn.role.as_str(),
                parts: [WirePart { text: &turn.text }],
            })
            .collect(),
        generation_config: GenerationConfig {
            temperature: request.temperature,
            max_output_tokens: request.max_tokens,
        },
    }
}

#[async_trait]
impl CompletionClient for GeminiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<Reply, CompletionError> {
        let api_key = self.api_key.as_deref().ok_or(CompletionError::NotConfigured)?;

        let response = self
            .client
            .post(self.endpoint(&request.model))
            .header("x-goog-api-key", api_key)
            .json(&wire_body(request))
            .send()
            .await
            .map_err(|e| CompletionError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| CompletionError::Transport(e.to_string()))?;

        Ok(ProviderResponse::parse(&bytes).into_reply())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{Turn, TurnRole};

    #[test]
    fn request_body_uses_gemini_field_names() {
        let request = CompletionRequest {
            model: "gemini-2.5-flash".into(),
            turns: vec![
                Turn { role: TurnRole::User, text: "Hi".into() },
                Turn { role: TurnRole::Model, text: "Hello".into() },
                Turn { role: TurnRole::User, text: "How are you?".into() },
            ],
            temperature: 0.5,
            max_tokens: 256,
        };

        let json = serde_json::to_value(wire_body(&request)).unwrap();
        assert_eq!(json["contents"][1]["role"], "model");
        assert_eq!(json["contents"][2]["parts"][0]["text"], "How are you?");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 256);
        assert_eq!(json["generationConfig"]["temperature"], 0.5);
    }

    #[test]
    fn endpoint_includes_model_and_ignores_trailing_slash() {
        let client = GeminiClient::new(Some("k".into()), "https://example.test/");
        assert_eq!(
            client.endpoint("gemini-2.5-flash"),
            "https://example.test/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[tokio::test]
    async fn missing_api_key_fails_before_any_request() {
        let client = GeminiClient::new(None, "https://example.test");
        let request = CompletionRequest {
            model: "m".into(),
            turns: vec![],
            temperature: 0.0,
            max_tokens: 1,
        };
        assert!(matches!(
            client.complete(&request).await,
            Err(CompletionError::NotConfigured)
        ));
    }
}
