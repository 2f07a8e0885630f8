//! Completion Backend
//!
//! Fallback text generation for queries with no catalog match.
//! `GroqClient` talks to any OpenAI-compatible `/chat/completions` endpoint
//! (Groq by default) with a single user message per call.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::Config;

/// Completion failures; all of them map to the same user-facing notice
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("Completion backend unreachable: {0}")]
    Unreachable(reqwest::Error),

    #[error("Completion backend rate limited")]
    RateLimited,

    #[error("Completion API error {status}: {body}")]
    Api { status: StatusCode, body: String },

    #[error("Malformed completion response: {0}")]
    MalformedResponse(String),

    #[error("Completion timed out after {0:?}")]
    Timeout(Duration),
}

/// Text generation used off the query router's miss path
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;
}

/// Chat message
#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

/// API request
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
}

/// API response
#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl ChatResponse {
    /// Text of the first choice
    fn into_text(self) -> Result<String, CompletionError> {
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| CompletionError::MalformedResponse("no choices".to_string()))?;

        match choice.message.content {
            Some(content) if !content.is_empty() => Ok(content),
            _ => Err(CompletionError::MalformedResponse("empty content".to_string())),
        }
    }
}

/// Groq (OpenAI-compatible) chat completion client
#[derive(Clone)]
pub struct GroqClient {
    client: Client,
    api_key: String,
    api_url: String,
    model: String,
    timeout: Duration,
}

impl GroqClient {
    pub fn new(
        api_key: &str,
        api_url: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, CompletionError> {
        // Only connecting is bounded here; `complete` bounds the whole call
        let client = Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(CompletionError::Unreachable)?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            api_url: api_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            timeout,
        })
    }

    /// Create from config
    pub fn from_config(config: &Config) -> Result<Self, CompletionError> {
        Self::new(
            &config.completion_api_key,
            &config.completion_api_url,
            &config.completion_model,
            config.completion_timeout,
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Transport failures; any reqwest timeout counts as a call timeout
    fn transport_error(&self, e: reqwest::Error) -> CompletionError {
        if e.is_timeout() {
            CompletionError::Timeout(self.timeout)
        } else {
            CompletionError::Unreachable(e)
        }
    }

    async fn request(&self, prompt: &str) -> Result<String, CompletionError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };

        debug!("Calling completion API: model={}, prompt_len={}", self.model, prompt.len());

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(CompletionError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Api { status, body });
        }

        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| CompletionError::MalformedResponse(e.to_string()))?;
        let text = parsed.into_text()?;

        info!("Completion response: model={}, len={}", self.model, text.len());
        Ok(text)
    }
}

#[async_trait]
impl CompletionBackend for GroqClient {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        match tokio::time::timeout(self.timeout, self.request(prompt)).await {
            Ok(result) => result,
            Err(_) => Err(CompletionError::Timeout(self.timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> Result<String, CompletionError> {
        let parsed: ChatResponse = serde_json::from_str(body)
            .map_err(|e| CompletionError::MalformedResponse(e.to_string()))?;
        parsed.into_text()
    }

    #[test]
    fn test_first_choice_returned_verbatim() {
        let body = r#"{
            "id": "chatcmpl-1",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "  Hello there!\n"}},
                {"index": 1, "message": {"role": "assistant", "content": "ignored"}}
            ]
        }"#;
        assert_eq!(parse(body).unwrap(), "  Hello there!\n");
    }

    #[test]
    fn test_missing_choices_is_malformed() {
        assert!(matches!(
            parse(r#"{"choices": []}"#),
            Err(CompletionError::MalformedResponse(_))
        ));
        assert!(matches!(parse(r#"{}"#), Err(CompletionError::MalformedResponse(_))));
    }

    #[test]
    fn test_null_or_empty_content_is_malformed() {
        let null = r#"{"choices": [{"message": {"role": "assistant", "content": null}}]}"#;
        let empty = r#"{"choices": [{"message": {"role": "assistant", "content": ""}}]}"#;
        assert!(matches!(parse(null), Err(CompletionError::MalformedResponse(_))));
        assert!(matches!(parse(empty), Err(CompletionError::MalformedResponse(_))));
    }

    #[test]
    fn test_whitespace_content_returned_verbatim() {
        let body = r#"{"choices": [{"message": {"role": "assistant", "content": " \n "}}]}"#;
        assert_eq!(parse(body).unwrap(), " \n ");
    }

    #[test]
    fn test_request_shape() {
        let request = ChatRequest {
            model: "llama-3.1-8b-instant",
            messages: vec![Message {
                role: "user",
                content: "recommend a heist movie",
            }],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "llama-3.1-8b-instant");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "recommend a heist movie");
    }

    // ============ Stub backends ============

    use std::time::Instant;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// Read one HTTP request: headers plus a Content-Length body
    async fn read_request(sock: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = sock.read(&mut chunk).await.unwrap_or(0);
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
                let body_len = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + body_len {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    fn http_response(status_line: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            status_line,
            body.len(),
            body
        )
    }

    /// Answers every request with `response`; the first request is sent back on the channel
    async fn canned_backend(response: String) -> (String, tokio::sync::mpsc::UnboundedReceiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Ok((mut sock, _)) = listener.accept().await {
                let request = read_request(&mut sock).await;
                let _ = tx.send(request);
                let _ = sock.write_all(response.as_bytes()).await;
                let _ = sock.shutdown().await;
            }
        });
        (format!("http://{}/v1", addr), rx)
    }

    /// Accepts connections and never answers
    async fn silent_backend() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((sock, _)) = listener.accept().await {
                held.push(sock);
            }
        });
        format!("http://{}/v1", addr)
    }

    fn client(api_url: &str, timeout: Duration) -> GroqClient {
        GroqClient::new("gsk_test", api_url, "llama-3.1-8b-instant", timeout).unwrap()
    }

    #[tokio::test]
    async fn test_hung_backend_times_out() {
        let url = silent_backend().await;
        let timeout = Duration::from_millis(300);

        for _ in 0..3 {
            let started = Instant::now();
            let result = client(&url, timeout).complete("hi").await;

            match result {
                Err(CompletionError::Timeout(after)) => assert_eq!(after, timeout),
                other => panic!("expected Timeout, got {:?}", other),
            }
            assert!(started.elapsed() < Duration::from_secs(5));
        }
    }

    #[tokio::test]
    async fn test_too_many_requests_is_rate_limited() {
        let (url, _requests) =
            canned_backend(http_response("429 Too Many Requests", r#"{"error":"slow down"}"#)).await;

        let result = client(&url, Duration::from_secs(5)).complete("hi").await;
        assert!(matches!(result, Err(CompletionError::RateLimited)), "{:?}", result);
    }

    #[tokio::test]
    async fn test_server_error_keeps_status_and_body() {
        let (url, _requests) =
            canned_backend(http_response("500 Internal Server Error", "upstream exploded")).await;

        match client(&url, Duration::from_secs(5)).complete("hi").await {
            Err(CompletionError::Api { status, body }) => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body, "upstream exploded");
            }
            other => panic!("expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_success_sends_bearer_and_prompt() {
        let body = r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"Watch Heat."}}]}"#;
        let (url, mut requests) = canned_backend(http_response("200 OK", body)).await;

        let answer = client(&url, Duration::from_secs(5))
            .complete("recommend a heist movie")
            .await
            .unwrap();
        assert_eq!(answer, "Watch Heat.");

        let request = requests.recv().await.unwrap();
        assert!(request.starts_with("POST /v1/chat/completions"));
        assert!(request.to_lowercase().contains("authorization: bearer gsk_test"));
        assert!(request.contains("recommend a heist movie"));
    }

    #[tokio::test]
    async fn test_non_json_body_is_malformed() {
        let (url, _requests) = canned_backend(http_response("200 OK", "<html>oops</html>")).await;

        let result = client(&url, Duration::from_secs(5)).complete("hi").await;
        assert!(matches!(result, Err(CompletionError::MalformedResponse(_))), "{:?}", result);
    }

    #[tokio::test]
    async fn test_refused_connection_is_unreachable() {
        // Bind then drop to get a port nobody listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let url = format!("http://127.0.0.1:{}/v1", port);

        let result = client(&url, Duration::from_secs(2)).complete("hello").await;
        assert!(matches!(result, Err(CompletionError::Unreachable(_))), "{:?}", result);
    }
}
