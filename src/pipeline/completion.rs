//! 文本补全服务（OpenAI 兼容 chat/completions）

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::util::config::CompletionConfig;
use crate::util::http_client::HttpClient;

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("未配置解读服务凭据")]
    MissingCredential,
    #[error("请求解读服务失败: {0}")]
    Transport(String),
    #[error("解读服务返回错误 {status}: {body}")]
    Status { status: u16, body: String },
    #[error("解读服务响应无法解析: {0}")]
    Decode(String),
    #[error("解读服务超时 ({0}s)")]
    Timeout(u64),
    #[error("当前构建未启用 HTTP 客户端")]
    Unavailable,
}

/// 单轮补全：一条 user 消息进，一段文本出
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatResponse {
    /// 取第一个候选的文本，缺失时为空串
    fn first_content(self) -> String {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .unwrap_or_default()
    }
}

#[cfg(feature = "reqwest")]
pub struct OpenAiCompletionService {
    http: Arc<HttpClient>,
    endpoint: String,
    model: String,
    temperature: f32,
    api_key: Option<String>,
}

#[cfg(feature = "reqwest")]
impl OpenAiCompletionService {
    pub fn new(config: &CompletionConfig, http: Arc<HttpClient>) -> Self {
        Self {
            http,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            temperature: config.temperature,
            api_key: config
                .api_key
                .as_deref()
                .map(str::trim)
                .filter(|key| !key.is_empty())
                .map(str::to_string),
        }
    }
}

#[cfg(feature = "reqwest")]
#[async_trait]
impl CompletionService for OpenAiCompletionService {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(CompletionError::MissingCredential)?;

        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
        };

        let response = self
            .http
            .reqwest_client()
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CompletionError::Timeout(self.http.config().timeout_secs)
                } else {
                    CompletionError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body: body.chars().take(512).collect(),
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::Decode(e.to_string()))?;
        Ok(parsed.first_content())
    }
}

/// 未启用 reqwest 时的占位实现，调用即失败
pub struct UnavailableCompletionService;

#[async_trait]
impl CompletionService for UnavailableCompletionService {
    async fn complete(&self, _prompt: &str) -> Result<String, CompletionError> {
        Err(CompletionError::Unavailable)
    }
}

/// 按构建特性选择补全服务实现
pub fn build_completion_service(
    config: &CompletionConfig,
    http: Arc<HttpClient>,
) -> Arc<dyn CompletionService> {
    #[cfg(feature = "reqwest")]
    {
        Arc::new(OpenAiCompletionService::new(config, http))
    }

    #[cfg(not(feature = "reqwest"))]
    {
        let _ = (config, http);
        Arc::new(UnavailableCompletionService)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_choice_content_is_empty_string() {
        let parsed: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#)
                .unwrap();
        assert_eq!(parsed.first_content(), "");

        let parsed: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert_eq!(parsed.first_content(), "");
    }

    #[tokio::test]
    async fn unavailable_service_always_fails() {
        let err = UnavailableCompletionService.complete("x").await.unwrap_err();
        assert!(matches!(err, CompletionError::Unavailable));
    }

    #[cfg(feature = "reqwest")]
    mod openai {
        use super::super::*;
        use crate::util::http_client::HttpClientConfig;
        use axum::http::{HeaderMap, StatusCode};
        use axum::routing::post;
        use axum::{Json, Router};
        use serde_json::{json, Value};

        async fn fake_completions(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
            let authorized = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                == Some("Bearer sk-test");
            if !authorized {
                return (StatusCode::UNAUTHORIZED, Json(json!({"error": "bad key"})));
            }
            let prompt = body["messages"][0]["content"].as_str().unwrap_or_default();
            let reply = format!(
                "model={} role={} temp={} len={}",
                body["model"].as_str().unwrap_or_default(),
                body["messages"][0]["role"].as_str().unwrap_or_default(),
                body["temperature"],
                prompt.len()
            );
            (
                StatusCode::OK,
                Json(json!({"choices": [{"message": {"role": "assistant", "content": reply}}]})),
            )
        }

        async fn spawn_fake() -> String {
            let app = Router::new().route("/v1/chat/completions", post(fake_completions));
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });
            format!("http://{}/v1", addr)
        }

        fn service(base_url: String, api_key: Option<&str>) -> OpenAiCompletionService {
            let config = CompletionConfig {
                base_url,
                api_key: api_key.map(str::to_string),
                ..CompletionConfig::default()
            };
            let http = Arc::new(HttpClient::new(HttpClientConfig::for_completion(&config)).unwrap());
            OpenAiCompletionService::new(&config, http)
        }

        #[tokio::test]
        async fn posts_single_user_message() {
            let base = spawn_fake().await;
            let reply = service(base, Some("sk-test")).complete("hola").await.unwrap();
            assert_eq!(reply, "model=gpt-3.5-turbo role=user temp=0.6 len=4");
        }

        #[tokio::test]
        async fn rejected_key_is_status_error() {
            let base = spawn_fake().await;
            let err = service(base, Some("sk-wrong")).complete("hola").await.unwrap_err();
            assert!(matches!(err, CompletionError::Status { status: 401, .. }));
        }

        #[tokio::test]
        async fn missing_key_fails_before_sending() {
            let err = service("http://127.0.0.1:9/v1".to_string(), None)
                .complete("hola")
                .await
                .unwrap_err();
            assert!(matches!(err, CompletionError::MissingCredential));
        }

        #[tokio::test]
        async fn unreachable_host_is_transport_error() {
            let err = service("http://127.0.0.1:9/v1".to_string(), Some("sk-test"))
                .complete("hola")
                .await
                .unwrap_err();
            assert!(matches!(err, CompletionError::Transport(_)));
        }
    }
}
