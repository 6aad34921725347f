//! Inference handler run inside the hosted container.
//!
//! The hosted runtime drives four stages per container: `ModelHandle::load`
//! once, then `parse_request`, `ModelHandle::generate` and `format_response`
//! for every invocation.
//!
//! Prompts longer than the context budget are truncated, keeping their
//! leading tokens. The budget is `max_context_length` minus the effective
//! `max_new_tokens` of the request.

mod generator;
pub mod launcher;
mod types;

pub use generator::{GenerationOutput, Generator, StubGenerator, TgiGenerator, TokenSpan};
pub use types::*;

use crate::{
    Error, Result,
    config::{AttentionImpl, BackendConfig, HandlerSettings},
};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const JSON_CONTENT_TYPE: &str = "application/json";

const BACKEND_TIMEOUT: Duration = Duration::from_secs(600);

/// The long-lived model state shared by every request.
pub struct ModelHandle {
    max_context_length: usize,
    max_new_tokens: usize,
    attention: AttentionImpl,
    generator: Box<dyn Generator>,
}

impl ModelHandle {
    /// Builds the generation backend once for the lifetime of the container.
    pub fn load(settings: &HandlerSettings) -> Result<Self> {
        let generator: Box<dyn Generator> = match &settings.backend {
            BackendConfig::Tgi { url } => {
                Box::new(TgiGenerator::new(url.clone(), BACKEND_TIMEOUT)?)
            }
            BackendConfig::Stub => Box::new(StubGenerator::new()),
        };
        Ok(Self::with_generator(settings, generator))
    }

    pub fn with_generator(settings: &HandlerSettings, generator: Box<dyn Generator>) -> Self {
        let attention = settings.quantization.attention.resolve(settings.gpu_count > 0);

        info!(
            "Loaded model {} via {} backend \
             (quantize={}, compute_dtype={}, double_quant={}, attention={})",
            settings.model_id,
            generator.name(),
            settings.quantization.quantize_flag().unwrap_or("none"),
            settings.quantization.compute_dtype,
            settings.quantization.double_quant,
            attention
        );

        Self {
            max_context_length: settings.max_context_length,
            max_new_tokens: settings.max_new_tokens,
            attention,
            generator,
        }
    }

    pub fn attention(&self) -> AttentionImpl {
        self.attention
    }

    pub async fn ready(&self) -> Result<()> {
        self.generator.health().await
    }

    /// Runs bounded generation. Failures propagate without retry.
    pub async fn generate(&self, request: &InferenceRequest) -> Result<InferenceResponse> {
        let mut parameters = request.parameters.clone();
        if parameters.max_new_tokens > self.max_new_tokens {
            debug!(
                "Clamping max_new_tokens from {} to {}",
                parameters.max_new_tokens, self.max_new_tokens
            );
            parameters.max_new_tokens = self.max_new_tokens;
        }
        let input_budget = self
            .max_context_length
            .saturating_sub(parameters.max_new_tokens);
        if input_budget == 0 {
            return Err(Error::request_format(format!(
                "max_new_tokens {} leaves no room for the prompt in a {} token context",
                parameters.max_new_tokens, self.max_context_length
            )));
        }

        let spans = self.generator.tokenize(&request.prompt).await?;
        let prompt_tokens = spans.len().min(input_budget);
        let truncated = spans.len() > input_budget;
        let prompt = if truncated {
            warn!(
                "Prompt has {} tokens, truncating to {}",
                spans.len(),
                input_budget
            );
            truncate_at(&request.prompt, spans[input_budget - 1].stop)
        } else {
            request.prompt.clone()
        };

        let output = self.generator.generate(&prompt, &parameters).await?;

        let generated_text = if parameters.return_full_text {
            format!("{}{}", prompt, output.text)
        } else {
            output.text
        };

        Ok(InferenceResponse {
            generated_text,
            prompt,
            details: Some(GenerationDetails {
                prompt_tokens,
                generated_tokens: output.generated_tokens,
                finish_reason: output.finish_reason,
                truncated,
            }),
        })
    }
}

/// Cuts `text` at byte offset `stop`, backing off to a char boundary.
fn truncate_at(text: &str, stop: usize) -> String {
    let mut end = stop.min(text.len());
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

fn media_type(header: &str) -> String {
    header
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Decodes a raw invocation body into an `InferenceRequest`.
///
/// Accepts both `{"prompt": ..., "max_new_tokens": ...}` and the
/// `{"inputs": ..., "parameters": {...}}` form. Top-level parameters win
/// over nested ones.
pub fn parse_request(body: &[u8], content_type: Option<&str>) -> Result<InferenceRequest> {
    let content_type = content_type.unwrap_or_default();
    if media_type(content_type) != JSON_CONTENT_TYPE {
        return Err(Error::UnsupportedContentType(content_type.to_string()));
    }

    let wire: WireRequest = serde_json::from_slice(body)
        .map_err(|e| Error::request_format(format!("malformed JSON body: {}", e)))?;

    let prompt = wire
        .prompt
        .or(wire.inputs)
        .ok_or_else(|| Error::request_format("missing 'prompt' (or 'inputs') field"))?;

    let nested = wire.parameters.unwrap_or_default();
    let top = wire.top_level;
    let defaults = GenerationParameters::default();

    let parameters = GenerationParameters {
        max_new_tokens: top
            .max_new_tokens
            .or(nested.max_new_tokens)
            .unwrap_or(defaults.max_new_tokens),
        temperature: top
            .temperature
            .or(nested.temperature)
            .unwrap_or(defaults.temperature),
        top_p: top.top_p.or(nested.top_p).unwrap_or(defaults.top_p),
        do_sample: top
            .do_sample
            .or(nested.do_sample)
            .unwrap_or(defaults.do_sample),
        return_full_text: top
            .return_full_text
            .or(nested.return_full_text)
            .unwrap_or(defaults.return_full_text),
    };

    if parameters.max_new_tokens == 0 {
        return Err(Error::request_format("max_new_tokens must be at least 1"));
    }
    if !(parameters.temperature >= 0.0) {
        return Err(Error::request_format("temperature must be non-negative"));
    }
    if !(parameters.top_p > 0.0 && parameters.top_p <= 1.0) {
        return Err(Error::request_format("top_p must be in (0, 1]"));
    }

    Ok(InferenceRequest { prompt, parameters })
}

fn accepts_json(accept: &str) -> bool {
    accept
        .split(',')
        .map(media_type)
        .any(|t| t == JSON_CONTENT_TYPE || t == "*/*" || t == "application/*")
}

/// Serializes a response for the requested `Accept` type. Returns the body
/// and the content type to send it with.
pub fn format_response(
    response: &InferenceResponse,
    accept: Option<&str>,
) -> Result<(Vec<u8>, &'static str)> {
    match accept.map(str::trim).filter(|a| !a.is_empty()) {
        Some(accept) if !accepts_json(accept) => {
            Err(Error::UnsupportedAccept(accept.to_string()))
        }
        _ => Ok((serde_json::to_vec(response)?, JSON_CONTENT_TYPE)),
    }
}
