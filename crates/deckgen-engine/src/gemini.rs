use anyhow::{anyhow, bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use deckgen_contracts::resolution::ResolutionTier;
use image::DynamicImage;
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::http::{response_json_or_error, send_with_transport_retries, truncate_text, RetryPolicy};
use crate::images::{decode_image, inline_image_part};
use crate::{CaptionProvider, ImageGenerationRequest, ImageProvider, TextProvider};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

const DEFAULT_CAPTION_PROMPT: &str = "Please describe this image in detail.";
const TEXT_PART_PREVIEW_CHARS: usize = 100;

/// Google Gemini over the REST `generateContent` endpoint.
pub struct GeminiProvider {
    api_base: String,
    api_key: String,
    model: String,
    http: HttpClient,
    retry: RetryPolicy,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: api_key.into(),
            model: model.into(),
            http: HttpClient::new(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn post(&self, payload: &Value) -> Result<Value> {
        let endpoint = self.endpoint_for_model(&self.model);
        debug!(model = %self.model, "gemini generateContent");
        let response = send_with_transport_retries("Gemini", &self.retry, || {
            self.http
                .post(&endpoint)
                .query(&[("key", self.api_key.as_str())])
                .json(payload)
        })?;
        response_json_or_error("Gemini", response)
    }
}

impl TextProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate_text(&self, prompt: &str, thinking_budget: u32) -> Result<String> {
        let payload = text_payload(prompt, thinking_budget);
        let response = self.post(&payload)?;
        extract_text(&response)
    }
}

impl ImageProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate_image(&self, request: &ImageGenerationRequest) -> Result<Option<DynamicImage>> {
        let payload = image_payload(request)?;
        let response = self.post(&payload)?;
        extract_first_image(&response).map(Some)
    }
}

impl CaptionProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn describe_image(&self, image: &DynamicImage, prompt: Option<&str>) -> Result<String> {
        let prompt = prompt
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(DEFAULT_CAPTION_PROMPT);
        let payload = json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt }, inline_image_part(image)?],
            }],
        });
        let response = self.post(&payload)?;
        extract_text(&response)
    }
}

fn text_payload(prompt: &str, thinking_budget: u32) -> Value {
    json!({
        "contents": [{
            "role": "user",
            "parts": [{ "text": prompt }],
        }],
        "generationConfig": {
            "thinkingConfig": { "thinkingBudget": thinking_budget },
        },
    })
}

fn image_payload(request: &ImageGenerationRequest) -> Result<Value> {
    let mut parts = vec![json!({ "text": request.prompt })];
    for image in &request.reference_images {
        parts.push(inline_image_part(image)?);
    }
    let image_size = image_size_tag(&request.resolution);
    Ok(json!({
        "contents": [{
            "role": "user",
            "parts": parts,
        }],
        "generationConfig": {
            "responseModalities": ["TEXT", "IMAGE"],
            "imageConfig": {
                "aspectRatio": request.aspect_ratio.trim(),
                "imageSize": image_size,
            },
        },
    }))
}

/// Gemini only accepts tier tags for `imageSize`.
fn image_size_tag(resolution: &str) -> &'static str {
    match ResolutionTier::from_tag(resolution) {
        Some(tier) => tier.as_str(),
        None => {
            let fallback = ResolutionTier::default().as_str();
            debug!(requested = resolution, fallback, "unrecognised resolution for gemini imageSize");
            fallback
        }
    }
}

fn text_part_preview(text: &str) -> String {
    truncate_text(text, TEXT_PART_PREVIEW_CHARS)
}

fn response_parts(response: &Value) -> Vec<&Value> {
    response
        .get("candidates")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|candidate| {
            candidate
                .get("content")
                .and_then(|content| content.get("parts"))
                .and_then(Value::as_array)
        })
        .flatten()
        .collect()
}

fn extract_text(response: &Value) -> Result<String> {
    let text = response_parts(response)
        .into_iter()
        .filter(|part| !part.get("thought").and_then(Value::as_bool).unwrap_or(false))
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<&str>>()
        .join("");
    if text.trim().is_empty() {
        let reason = response
            .pointer("/candidates/0/finishReason")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        bail!("Gemini response contained no text (finish reason: {reason})");
    }
    Ok(text)
}

fn extract_first_image(response: &Value) -> Result<DynamicImage> {
    let parts = response_parts(response);
    if parts.is_empty() {
        bail!("No image found in API response. Response had no parts.");
    }
    for (idx, part) in parts.iter().enumerate() {
        if let Some(text) = part.get("text").and_then(Value::as_str) {
            let preview = text_part_preview(text);
            info!(part = idx, text = %preview, "gemini text part");
            continue;
        }
        let Some(inline) = part.get("inlineData").or_else(|| part.get("inline_data")) else {
            continue;
        };
        let data = inline
            .get("data")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if data.is_empty() {
            continue;
        }
        let decoded = BASE64
            .decode(data.as_bytes())
            .context("Gemini image base64 decode failed")
            .and_then(|bytes| decode_image(&bytes));
        match decoded {
            Ok(image) => {
                debug!(part = idx, width = image.width(), height = image.height(), "gemini image part");
                return Ok(image);
            }
            Err(err) => {
                let message = format!("{err:#}");
                warn!(part = idx, error = %message, "skipping undecodable image part");
            }
        }
    }
    Err(anyhow!(
        "No image found in API response. Response had {} parts but none contained valid images.",
        parts.len()
    ))
}
