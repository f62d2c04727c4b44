use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::GenerationError;
use crate::llm::GenerationBackend;

const HEALTH_TIMEOUT_SECS: u64 = 5;

/// Blocking chat client for Ollama or any OpenAI-compatible server.
pub struct LlmClient {
    http: reqwest::blocking::Client,
    health: reqwest::blocking::Client,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Result<Self, GenerationError> {
        if !matches!(config.provider.as_str(), "ollama" | "openai") {
            return Err(GenerationError::UnsupportedProvider(config.provider));
        }

        let http = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let health = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(HEALTH_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            http,
            health,
            config,
        })
    }

    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }
}

impl GenerationBackend for LlmClient {
    fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        tracing::debug!(
            "Generating with {} ({} prompt chars)",
            self.config.model,
            prompt.chars().count()
        );
        match self.config.provider.as_str() {
            "ollama" => call_ollama(&self.http, &self.config, self.base_url(), prompt),
            "openai" => call_openai(&self.http, &self.config, self.base_url(), prompt),
            other => Err(GenerationError::UnsupportedProvider(other.to_string())),
        }
    }

    fn is_available(&self) -> bool {
        let url = match self.config.provider.as_str() {
            "ollama" => format!("{}/api/tags", self.base_url()),
            _ => format!("{}/v1/models", self.base_url()),
        };

        let mut req = self.health.get(&url);
        if let Some(key) = self.config.api_key.as_deref() {
            req = req.header("Authorization", format!("Bearer {key}"));
        }

        match req.send() {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                tracing::warn!("LLM health check {url} returned {}", resp.status());
                false
            }
            Err(e) => {
                tracing::warn!("LLM health check {url} failed: {e}");
                false
            }
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

impl Message {
    fn user(content: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: content.to_string(),
        }
    }
}

fn send_json<T: Serialize>(
    http: &reqwest::blocking::Client,
    url: &str,
    api_key: Option<&str>,
    body: &T,
) -> Result<String, GenerationError> {
    let mut req = http.post(url).json(body);
    if let Some(key) = api_key {
        req = req.header("Authorization", format!("Bearer {key}"));
    }

    let resp = req.send()?;
    let status = resp.status();
    let text = resp.text()?;
    if !status.is_success() {
        return Err(GenerationError::Status {
            status: status.as_u16(),
            body: text,
        });
    }
    Ok(text)
}

// ─── Ollama ──────────────────────────────────────────────

#[derive(Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<Message>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: Message,
}

fn call_ollama(
    http: &reqwest::blocking::Client,
    config: &LlmConfig,
    base_url: &str,
    prompt: &str,
) -> Result<String, GenerationError> {
    let url = format!("{base_url}/api/chat");
    let req = OllamaChatRequest {
        model: config.model.clone(),
        messages: vec![Message::user(prompt)],
        stream: false,
        options: OllamaOptions {
            temperature: config.temperature,
        },
    };
    let body = send_json(http, &url, None, &req)?;
    parse_ollama_response(&body)
}

/// Extract the assistant message from a non-streaming Ollama chat response.
pub fn parse_ollama_response(body: &str) -> Result<String, GenerationError> {
    let parsed: OllamaChatResponse =
        serde_json::from_str(body).map_err(|e| GenerationError::Malformed(e.to_string()))?;
    non_empty(parsed.message.content)
}

// ─── OpenAI-compatible ───────────────────────────────────

#[derive(Serialize)]
struct OpenAiChatRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
}

#[derive(Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Deserialize)]
struct OpenAiResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

fn call_openai(
    http: &reqwest::blocking::Client,
    config: &LlmConfig,
    base_url: &str,
    prompt: &str,
) -> Result<String, GenerationError> {
    let url = format!("{base_url}/v1/chat/completions");
    let req = OpenAiChatRequest {
        model: config.model.clone(),
        messages: vec![Message::user(prompt)],
        temperature: config.temperature,
    };
    let body = send_json(http, &url, config.api_key.as_deref(), &req)?;
    parse_openai_response(&body)
}

/// Extract the first choice's content from an OpenAI chat completion.
pub fn parse_openai_response(body: &str) -> Result<String, GenerationError> {
    let parsed: OpenAiChatResponse =
        serde_json::from_str(body).map_err(|e| GenerationError::Malformed(e.to_string()))?;
    let content = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| GenerationError::Malformed("response has no choices".to_string()))?;
    non_empty(content)
}

fn non_empty(content: String) -> Result<String, GenerationError> {
    if content.trim().is_empty() {
        Err(GenerationError::Malformed("empty completion".to_string()))
    } else {
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ollama_message() {
        let body = r#"{"model":"codellama:7b","message":{"role":"assistant","content":"Use ArrayList."},"done":true}"#;
        assert_eq!(parse_ollama_response(body).unwrap(), "Use ArrayList.");
    }

    #[test]
    fn test_parse_ollama_missing_message_is_malformed() {
        let body = r#"{"error":"model not found"}"#;
        assert!(matches!(
            parse_ollama_response(body),
            Err(GenerationError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_ollama_blank_content_is_malformed() {
        let body = r#"{"message":{"role":"assistant","content":"   "}}"#;
        assert!(matches!(
            parse_ollama_response(body),
            Err(GenerationError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_openai_first_choice() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"first"}},{"message":{"role":"assistant","content":"second"}}]}"#;
        assert_eq!(parse_openai_response(body).unwrap(), "first");
    }

    #[test]
    fn test_parse_openai_no_choices() {
        assert!(matches!(
            parse_openai_response(r#"{"choices":[]}"#),
            Err(GenerationError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_openai_null_content() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#;
        assert!(parse_openai_response(body).is_err());
    }

    #[test]
    fn test_parse_garbage() {
        assert!(parse_openai_response("<html>502</html>").is_err());
        assert!(parse_ollama_response("").is_err());
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        let config = LlmConfig {
            provider: "carrier-pigeon".into(),
            ..LlmConfig::default()
        };
        assert_eq!(
            LlmClient::new(config).err(),
            Some(GenerationError::UnsupportedProvider("carrier-pigeon".into()))
        );
    }

    #[test]
    fn test_unreachable_backend_reports_unavailable() {
        // Port 9 (discard) is closed on test hosts; the health check must fail fast, not panic.
        let config = LlmConfig {
            base_url: "http://127.0.0.1:9".into(),
            ..LlmConfig::default()
        };
        let client = LlmClient::new(config).unwrap();
        assert!(!client.is_available());
        assert!(client.generate("hello").is_err());
    }
}
