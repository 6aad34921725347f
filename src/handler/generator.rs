use super::types::{FinishReason, GenerationParameters};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Byte range of one token inside the text it was produced from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct TokenSpan {
    pub start: usize,
    pub stop: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOutput {
    pub text: String,
    pub generated_tokens: usize,
    pub finish_reason: FinishReason,
}

/// A loaded model that can tokenize and generate.
#[async_trait]
pub trait Generator: Send + Sync {
    fn name(&self) -> &str;

    async fn tokenize(&self, text: &str) -> Result<Vec<TokenSpan>>;

    async fn generate(
        &self,
        prompt: &str,
        parameters: &GenerationParameters,
    ) -> Result<GenerationOutput>;

    /// Ok once the model can serve requests.
    async fn health(&self) -> Result<()>;
}

/// Whitespace-tokenized generator that replays a fixed reply.
pub struct StubGenerator {
    reply: String,
}

impl StubGenerator {
    pub const DEFAULT_REPLY: &'static str = "SELECT * FROM customers;";

    pub fn new() -> Self {
        Self::with_reply(Self::DEFAULT_REPLY)
    }

    pub fn with_reply(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
        }
    }
}

impl Default for StubGenerator {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn whitespace_spans(text: &str) -> Vec<TokenSpan> {
    let mut spans = Vec::new();
    let mut start = None;
    for (idx, ch) in text.char_indices() {
        match (ch.is_whitespace(), start) {
            (true, Some(s)) => {
                spans.push(TokenSpan { start: s, stop: idx });
                start = None;
            }
            (false, None) => start = Some(idx),
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push(TokenSpan {
            start: s,
            stop: text.len(),
        });
    }
    spans
}

#[async_trait]
impl Generator for StubGenerator {
    fn name(&self) -> &str {
        "stub"
    }

    async fn tokenize(&self, text: &str) -> Result<Vec<TokenSpan>> {
        Ok(whitespace_spans(text))
    }

    async fn generate(
        &self,
        _prompt: &str,
        parameters: &GenerationParameters,
    ) -> Result<GenerationOutput> {
        let words: Vec<&str> = self.reply.split_whitespace().collect();
        let take = words.len().min(parameters.max_new_tokens);
        let finish_reason = if take < words.len() {
            FinishReason::Length
        } else {
            FinishReason::EosToken
        };

        Ok(GenerationOutput {
            text: words[..take].join(" "),
            generated_tokens: take,
            finish_reason,
        })
    }

    async fn health(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct TgiGenerateRequest<'a> {
    inputs: &'a str,
    parameters: TgiParameters,
}

#[derive(Debug, Serialize)]
struct TgiParameters {
    max_new_tokens: usize,
    do_sample: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    return_full_text: bool,
    details: bool,
}

#[derive(Debug, Deserialize)]
struct TgiGenerateResponse {
    generated_text: String,
    details: Option<TgiDetails>,
}

#[derive(Debug, Deserialize)]
struct TgiDetails {
    finish_reason: FinishReason,
    generated_tokens: usize,
}

#[derive(Debug, Serialize)]
struct TgiTokenizeRequest<'a> {
    inputs: &'a str,
}

#[derive(Debug, Deserialize)]
struct TgiError {
    error: String,
}

/// Client for a text-generation-inference server running beside the handler.
/// When `TGI_LAUNCHER` is set, `server::run` starts that server through
/// `handler::launcher` before binding.
pub struct TgiGenerator {
    client: reqwest::Client,
    base_url: String,
}

impl TgiGenerator {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn error_from(response: reqwest::Response) -> Error {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<TgiError>(&body)
            .map(|e| e.error)
            .unwrap_or(body);
        Error::generation(format!("backend returned {}: {}", status, message))
    }
}

#[async_trait]
impl Generator for TgiGenerator {
    fn name(&self) -> &str {
        "tgi"
    }

    async fn tokenize(&self, text: &str) -> Result<Vec<TokenSpan>> {
        let response = self
            .client
            .post(format!("{}/tokenize", self.base_url))
            .json(&TgiTokenizeRequest { inputs: text })
            .send()
            .await
            .map_err(|e| Error::generation(format!("tokenize request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        response
            .json::<Vec<TokenSpan>>()
            .await
            .map_err(|e| Error::generation(format!("invalid tokenize response: {}", e)))
    }

    async fn generate(
        &self,
        prompt: &str,
        parameters: &GenerationParameters,
    ) -> Result<GenerationOutput> {
        // The backend rejects sampling knobs on greedy requests and top_p == 1.0.
        let sampling = parameters.do_sample && parameters.temperature > 0.0;
        let request = TgiGenerateRequest {
            inputs: prompt,
            parameters: TgiParameters {
                max_new_tokens: parameters.max_new_tokens,
                do_sample: sampling,
                temperature: sampling.then_some(parameters.temperature),
                top_p: (sampling && parameters.top_p < 1.0).then_some(parameters.top_p),
                return_full_text: false,
                details: true,
            },
        };

        debug!(
            "Forwarding generation request ({} prompt bytes, max_new_tokens={})",
            prompt.len(),
            parameters.max_new_tokens
        );

        let response = self
            .client
            .post(format!("{}/generate", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::generation(format!("generate request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        let body: TgiGenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::generation(format!("invalid generate response: {}", e)))?;

        let (generated_tokens, finish_reason) = match body.details {
            Some(details) => (details.generated_tokens, details.finish_reason),
            None => (
                whitespace_spans(&body.generated_text).len(),
                FinishReason::EosToken,
            ),
        };

        Ok(GenerationOutput {
            text: body.generated_text,
            generated_tokens,
            finish_reason,
        })
    }

    async fn health(&self) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .map_err(|e| Error::generation(format!("backend unreachable: {}", e)))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::error_from(response).await)
        }
    }
}
