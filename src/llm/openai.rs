use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::provider::ChatModel;
use super::types::ChatRequest;
use crate::core::config::settings::AuxiliaryModelSettings;
use crate::core::errors::RagError;

/// Client for any server exposing `/v1/chat/completions`
/// (LM Studio, vLLM, OpenAI and friends).
#[derive(Clone)]
pub struct OpenAiCompatibleModel {
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: Option<f64>,
    client: Client,
}

impl OpenAiCompatibleModel {
    pub fn new(base_url: &str, model: &str) -> Self {
        let trimmed = base_url.trim_end_matches('/');
        Self {
            base_url: trimmed.strip_suffix("/v1").unwrap_or(trimmed).to_string(),
            model: model.to_string(),
            api_key: None,
            temperature: None,
            client: Client::new(),
        }
    }

    pub fn from_settings(settings: &AuxiliaryModelSettings) -> Result<Self, RagError> {
        if settings.base_url.trim().is_empty() || settings.model.trim().is_empty() {
            return Err(RagError::Configuration(
                "auxiliary_model requires base_url and model".into(),
            ));
        }
        let mut model = Self::new(&settings.base_url, &settings.model);
        model.api_key = settings.api_key.clone().filter(|k| !k.trim().is_empty());
        model.temperature = settings.temperature;
        Ok(model)
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatibleModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn chat(&self, request: ChatRequest) -> Result<String, RagError> {
        let mut body = json!({
            "model": self.model,
            "messages": request.messages,
            "stream": false,
        });

        if let Some(obj) = body.as_object_mut() {
            if let Some(t) = request.temperature.or(self.temperature) {
                obj.insert("temperature".to_string(), json!(t));
            }
            if let Some(t) = request.max_tokens {
                obj.insert("max_tokens".to_string(), json!(t));
            }
            if let Some(user) = &request.user {
                obj.insert("user".to_string(), json!(user));
            }
        }

        let mut req = self.client.post(self.completions_url()).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let res = req.send().await?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(RagError::external("chat-completions", status, text));
        }

        let payload: Value = res.json().await?;
        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.trim().to_string())
            .ok_or_else(|| RagError::Provider("chat completion without message content".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::ChatMessage;
    use axum::{http::HeaderMap, routing::post, Json, Router};

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn base_url_drops_trailing_v1() {
        let model = OpenAiCompatibleModel::new("http://localhost:1234/v1/", "qwen");
        assert_eq!(model.completions_url(), "http://localhost:1234/v1/chat/completions");
    }

    #[test]
    fn settings_require_model() {
        let settings = AuxiliaryModelSettings {
            base_url: "http://localhost:1234".into(),
            model: " ".into(),
            api_key: None,
            temperature: None,
        };
        assert!(matches!(
            OpenAiCompatibleModel::from_settings(&settings),
            Err(RagError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn chat_returns_first_choice() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                assert_eq!(body["model"], "qwen");
                assert_eq!(body["messages"][0]["role"], "user");
                assert_eq!(body["user"], "42");
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                Json(json!({
                    "choices": [{ "message": { "role": "assistant", "content": format!(" ok {} ", auth) } }]
                }))
            }),
        );
        let base = serve(app).await;

        let mut model = OpenAiCompatibleModel::new(&base, "qwen");
        model.api_key = Some("secret".into());
        let reply = model
            .chat(ChatRequest::new(vec![ChatMessage::user("hi")]).with_user(Some("42")))
            .await
            .unwrap();
        assert_eq!(reply, "ok Bearer secret");
    }

    #[tokio::test]
    async fn non_success_status_is_external_error() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async { (axum::http::StatusCode::SERVICE_UNAVAILABLE, "loading") }),
        );
        let base = serve(app).await;

        let err = OpenAiCompatibleModel::new(&base, "qwen")
            .chat(ChatRequest::new(vec![ChatMessage::user("hi")]))
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::ExternalApi { status: 503, .. }));
    }
}
