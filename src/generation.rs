use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::GenerationConfig;
use crate::error::BanterError;

#[derive(Serialize)]
struct CompletionRequest {
    model: String,
    prompt: String,
    max_tokens: u32,
    n: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    text: String,
}

/// Client for an OpenAI-compatible completions endpoint served locally
/// (Ollama, llama.cpp server, and friends). One prompt in, one candidate out.
pub struct GenerationClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl GenerationClient {
    pub fn new(config: &GenerationConfig) -> Result<Self, BanterError> {
        let mut builder = reqwest::Client::builder().timeout(Duration::from_millis(config.timeout_ms));

        if !config.api_key.is_empty() {
            let mut headers = reqwest::header::HeaderMap::new();
            let value = format!("Bearer {}", config.api_key);
            headers.insert(
                reqwest::header::AUTHORIZATION,
                reqwest::header::HeaderValue::from_str(&value)
                    .map_err(|e| BanterError::Generation(format!("invalid API key: {}", e)))?,
            );
            builder = builder.default_headers(headers);
        }

        let client = builder
            .build()
            .map_err(|e| BanterError::Generation(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    /// Generate a reply for `prompt`. Returns the raw candidate text; callers
    /// run it through [`strip_prompt_echo`] before display.
    pub async fn generate(&self, prompt: &str) -> Result<String, BanterError> {
        debug!("Requesting completion for {} char prompt", prompt.len());

        let request = CompletionRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            max_tokens: self.max_tokens,
            n: 1,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| BanterError::Generation(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(BanterError::Generation(format!(
                "API returned status {}",
                response.status()
            )));
        }

        let body: CompletionResponse = response
            .json()
            .await
            .map_err(|e| BanterError::Generation(format!("failed to parse response: {}", e)))?;

        let text = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.text)
            .ok_or_else(|| BanterError::Generation("no choices in response".to_string()))?;

        debug!("Completion returned {} chars", text.len());
        Ok(text)
    }
}

/// Remove the echoed prompt from generated text. Backends that echo do so as
/// a prefix; this removes the prompt wherever it appears verbatim, which also
/// eats legitimate recurrences of the prompt inside the continuation. That
/// matches the shipped behavior and stays until someone confirms a change.
pub fn strip_prompt_echo(prompt: &str, text: &str) -> String {
    if prompt.is_empty() {
        return text.trim().to_string();
    }
    text.replace(prompt, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerationConfig;

    #[test]
    fn test_generation_client_new() {
        let config = GenerationConfig::default();
        let client = GenerationClient::new(&config);
        assert!(client.is_ok());
    }

    #[test]
    fn test_generation_client_with_api_key() {
        let config = GenerationConfig {
            api_key: "sk-test-key".to_string(),
            ..GenerationConfig::default()
        };
        let client = GenerationClient::new(&config);
        assert!(client.is_ok());
    }

    #[test]
    fn test_completion_request_serialization() {
        let request = CompletionRequest {
            model: "llama3".to_string(),
            prompt: "Hello".to_string(),
            max_tokens: 100,
            n: 1,
            temperature: 0.7,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"model\":\"llama3\""));
        assert!(json.contains("\"max_tokens\":100"));
        assert!(json.contains("\"n\":1"));
    }

    #[test]
    fn test_completion_response_deserialization() {
        let json = r#"{
            "choices": [{
                "text": "Hello! How can I help?"
            }]
        }"#;
        let response: CompletionResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.choices[0].text, "Hello! How can I help?");
    }

    #[test]
    fn test_completion_response_empty_choices() {
        let json = r#"{"choices": []}"#;
        let response: CompletionResponse = serde_json::from_str(json).unwrap();
        assert!(response.choices.is_empty());
    }

    #[test]
    fn test_strip_prompt_echo_prefix() {
        let out = strip_prompt_echo("Hello", "Hello there, nice to meet you");
        assert_eq!(out, "there, nice to meet you");
    }

    #[test]
    fn test_strip_prompt_echo_no_echo() {
        let out = strip_prompt_echo("Hello", "Nice to meet you");
        assert_eq!(out, "Nice to meet you");
    }

    #[test]
    fn test_strip_prompt_echo_removes_recurrences() {
        // Substring removal takes every occurrence, not just the prefix.
        let out = strip_prompt_echo("hi", "hi you said hi to me");
        assert_eq!(out, "you said  to me");
    }

    #[test]
    fn test_strip_prompt_echo_empty_prompt() {
        let out = strip_prompt_echo("", "  some text  ");
        assert_eq!(out, "some text");
    }

    #[test]
    fn test_stripped_reply_is_not_prompt_prefixed() {
        let prompt = "Hello";
        let generated = "Hello I am a language model.";
        let reply = strip_prompt_echo(prompt, generated);
        assert!(!reply.is_empty());
        assert!(!reply.starts_with(prompt));
    }
}
