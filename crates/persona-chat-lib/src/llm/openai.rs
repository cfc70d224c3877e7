use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use super::{ChatMessage, Completion, CompletionRequest, FinishReason, TextCompletion, ToolCall};
use crate::config::BackendConfig;
use crate::error::{ChatError, Service, ServiceErrorKind};

/// Client for any `/chat/completions` endpoint speaking the OpenAI wire format
/// (OpenAI itself, Gemini's compatibility layer, local servers).
pub struct OpenAiCompatibleClient {
    client: Client,
    service: Service,
    base_url: String,
    api_key: String,
    model: String,
}

impl std::fmt::Debug for OpenAiCompatibleClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleClient")
            .field("service", &self.service)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

/// HTTPS is required for remote URLs; plain HTTP only for localhost servers.
fn validate_base_url(base_url: &str) -> Result<(), String> {
    let parsed = reqwest::Url::parse(base_url)
        .map_err(|e| format!("Invalid base_url '{}': {}", base_url, e))?;
    let host = parsed.host_str().unwrap_or("");
    match parsed.scheme() {
        "https" => Ok(()),
        "http" => {
            let is_localhost =
                host == "localhost" || host == "127.0.0.1" || host == "[::1]" || host == "::1";
            if is_localhost {
                warn!(base_url, "Using unencrypted HTTP for a local completion server");
                Ok(())
            } else {
                Err(format!(
                    "HTTP is not allowed for remote URLs (base_url: '{}'). Use HTTPS.",
                    base_url
                ))
            }
        }
        scheme => Err(format!(
            "Unsupported URL scheme '{}' in base_url '{}'. Only http and https are allowed.",
            scheme, base_url
        )),
    }
}

impl OpenAiCompatibleClient {
    pub fn new(service: Service, config: &BackendConfig) -> Result<Self, ChatError> {
        validate_base_url(&config.base_url).map_err(ChatError::Config)?;
        let api_key = config.api_key.clone().ok_or_else(|| {
            ChatError::Config(format!(
                "{service} API key missing; set {}",
                config.api_key_env
            ))
        })?;
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ChatError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            service,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
        })
    }

    fn request_body(&self, request: &CompletionRequest) -> Value {
        let messages: Vec<Value> = request.messages.iter().map(message_to_json).collect();
        let mut body = json!({
            "model": self.model,
            "messages": messages,
        });
        if !request.tools.is_empty() {
            body["tools"] = json!(request.tools);
        }
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(format) = &request.response_format {
            body["response_format"] = format.clone();
        }
        body
    }

    fn protocol_error(&self, message: impl Into<String>) -> ChatError {
        ChatError::external(self.service, ServiceErrorKind::Protocol, message)
    }
}

fn message_to_json(msg: &ChatMessage) -> Value {
    let mut v = json!({ "role": msg.role });
    match &msg.content {
        Some(content) => v["content"] = json!(content),
        None => v["content"] = Value::Null,
    }
    if !msg.tool_calls.is_empty() {
        v["tool_calls"] = msg
            .tool_calls
            .iter()
            .map(|tc| {
                json!({
                    "id": tc.id,
                    "type": "function",
                    "function": { "name": tc.name, "arguments": tc.arguments },
                })
            })
            .collect();
    }
    if let Some(id) = &msg.tool_call_id {
        v["tool_call_id"] = json!(id);
    }
    v
}

/// Extract the first choice of a chat-completions response body.
fn parse_completion(data: &Value) -> Result<Completion, String> {
    let choice = data["choices"]
        .get(0)
        .ok_or_else(|| "No choices in response".to_string())?;
    let message = &choice["message"];
    let content = message["content"].as_str().map(|s| s.to_string());

    let mut tool_calls = Vec::new();
    if let Some(tcs) = message["tool_calls"].as_array() {
        for tc in tcs {
            tool_calls.push(ToolCall {
                id: tc["id"].as_str().unwrap_or("").to_string(),
                name: tc["function"]["name"].as_str().unwrap_or("").to_string(),
                arguments: tc["function"]["arguments"]
                    .as_str()
                    .unwrap_or("{}")
                    .to_string(),
            });
        }
    }

    Ok(Completion {
        content,
        tool_calls,
        finish_reason: FinishReason::parse(choice["finish_reason"].as_str()),
    })
}

#[async_trait]
impl TextCompletion for OpenAiCompatibleClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ChatError> {
        let body = self.request_body(request);
        let url = format!("{}/chat/completions", self.base_url);
        info!(
            service = %self.service,
            model = %self.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Calling completion API"
        );

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(service = %self.service, "HTTP request failed: {}", e);
                ChatError::from_reqwest(self.service, &e)
            })?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ChatError::from_reqwest(self.service, &e))?;

        if !status.is_success() {
            error!(service = %self.service, status = %status, "Completion API error: {}", text);
            return Err(ChatError::from_status(self.service, status.as_u16(), &text));
        }
        debug!(service = %self.service, bytes = text.len(), "Completion response received");

        let data: Value = serde_json::from_str(&text)
            .map_err(|e| self.protocol_error(format!("response is not JSON: {e}")))?;
        parse_completion(&data).map_err(|e| self.protocol_error(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MessageRole;

    fn backend(base_url: &str) -> BackendConfig {
        BackendConfig {
            base_url: base_url.to_string(),
            api_key: Some("test-key".into()),
            ..BackendConfig::generator_default()
        }
    }

    #[test]
    fn base_url_rules() {
        assert!(validate_base_url("https://api.openai.com/v1").is_ok());
        assert!(validate_base_url("http://localhost:8080").is_ok());
        assert!(validate_base_url("http://127.0.0.1:1234").is_ok());
        let err = validate_base_url("http://api.example.com").unwrap_err();
        assert!(err.contains("HTTP is not allowed"), "{err}");
        let err = validate_base_url("ftp://example.com").unwrap_err();
        assert!(err.contains("Unsupported URL scheme"), "{err}");
        assert!(validate_base_url("not a url").is_err());
    }

    #[test]
    fn missing_key_is_config_error() {
        let mut cfg = backend("https://api.openai.com/v1/");
        cfg.api_key = None;
        let err = OpenAiCompatibleClient::new(Service::Generator, &cfg).unwrap_err();
        assert!(matches!(err, ChatError::Config(ref m) if m.contains("OPENAI_API_KEY")));
    }

    #[test]
    fn trailing_slash_trimmed() {
        let client =
            OpenAiCompatibleClient::new(Service::Judge, &backend("https://x.test/v1/")).unwrap();
        assert_eq!(client.base_url, "https://x.test/v1");
    }

    #[test]
    fn request_body_includes_tools_and_tool_results() {
        let client =
            OpenAiCompatibleClient::new(Service::Generator, &backend("https://x.test")).unwrap();
        let call = ToolCall {
            id: "call_1".into(),
            name: "record_contact".into(),
            arguments: r#"{"email":"a@b.com"}"#.into(),
        };
        let request = CompletionRequest {
            messages: vec![
                ChatMessage::system("sys"),
                ChatMessage::assistant_tool_calls(None, vec![call]),
                ChatMessage::tool_result("call_1", "ok"),
            ],
            tools: vec![json!({"type": "function"})],
            max_tokens: Some(500),
            response_format: None,
        };
        let body = client.request_body(&request);
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["max_tokens"], 500);
        assert_eq!(body["tools"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["tool_calls"][0]["function"]["name"], "record_contact");
        assert!(body["messages"][1]["content"].is_null());
        assert_eq!(body["messages"][2]["tool_call_id"], "call_1");
        assert!(body.get("response_format").is_none());
        assert_eq!(request.messages[2].role, MessageRole::Tool);
    }

    #[test]
    fn parses_tool_call_response() {
        let data = json!({
            "choices": [{
                "finish_reason": "tool_calls",
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": {"name": "record_contact", "arguments": "{\"email\":\"a@b.com\"}"}
                    }]
                }
            }]
        });
        let completion = parse_completion(&data).unwrap();
        assert_eq!(completion.finish_reason, FinishReason::ToolCalls);
        assert!(completion.wants_tools());
        assert_eq!(completion.tool_calls[0].id, "call_9");
        assert_eq!(completion.content, None);
    }

    #[test]
    fn missing_choices_is_an_error() {
        assert!(parse_completion(&json!({"choices": []})).is_err());
    }

    fn hello() -> CompletionRequest {
        CompletionRequest {
            messages: vec![ChatMessage::user("hello")],
            ..CompletionRequest::default()
        }
    }

    #[tokio::test]
    async fn silent_server_times_out_as_timeout() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            // Accept and never answer.
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(std::time::Duration::from_secs(10)).await;
        });

        let cfg = BackendConfig {
            request_timeout_secs: 1,
            ..backend(&format!("http://127.0.0.1:{port}"))
        };
        let client = OpenAiCompatibleClient::new(Service::Judge, &cfg).unwrap();
        let started = std::time::Instant::now();
        let err = client.complete(&hello()).await.unwrap_err();
        server.abort();

        assert!(started.elapsed() < std::time::Duration::from_secs(5));
        match err {
            ChatError::ExternalService { service, kind, .. } => {
                assert_eq!(service, Service::Judge);
                assert_eq!(kind, ServiceErrorKind::Timeout);
            }
            other => panic!("expected a timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn refused_connection_is_network_error() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let client =
            OpenAiCompatibleClient::new(Service::Generator, &backend(&format!("http://127.0.0.1:{port}")))
                .unwrap();
        let err = client.complete(&hello()).await.unwrap_err();
        assert!(err.user_message().contains("try again"));
        match err {
            ChatError::ExternalService { service, kind, .. } => {
                assert_eq!(service, Service::Generator);
                assert_eq!(kind, ServiceErrorKind::Network);
            }
            other => panic!("expected a network error, got {other:?}"),
        }
    }
}
