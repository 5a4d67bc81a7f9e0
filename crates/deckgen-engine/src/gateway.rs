use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use deckgen_contracts::providers::GatewaySource;
use deckgen_contracts::resolution::ResolutionStrategy;
use image::DynamicImage;
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::http::{response_json_or_error, send_with_transport_retries, RetryPolicy};
use crate::images::{data_url, decode_image, download_image, encode_png, StagedImages, DOWNLOAD_TIMEOUT};
use crate::{CaptionProvider, ImageGenerationRequest, ImageProvider, TextProvider};

const DEFAULT_CAPTION_PROMPT: &str = "Please describe this image in detail.";

/// A vendor spoken to through its OpenAI-compatible API.
pub struct GatewayProvider {
    source: GatewaySource,
    api_key: String,
    model: String,
    http: HttpClient,
    retry: RetryPolicy,
}

impl GatewayProvider {
    pub fn new(source: GatewaySource, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            source,
            api_key: api_key.into(),
            model: model.into(),
            http: HttpClient::new(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_resolution_strategy(mut self, strategy: ResolutionStrategy) -> Self {
        self.source = self.source.with_resolution_strategy(strategy);
        self
    }

    pub fn source(&self) -> &GatewaySource {
        &self.source
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.source.api_base.trim_end_matches('/'), path)
    }

    fn post_json(&self, path: &str, payload: &Value) -> Result<Value> {
        let endpoint = self.endpoint(path);
        debug!(source = %self.source.name, model = %self.model, endpoint = %endpoint, "gateway request");
        let response = send_with_transport_retries(&self.source.name, &self.retry, || {
            self.http
                .post(&endpoint)
                .bearer_auth(&self.api_key)
                .json(payload)
        })?;
        response_json_or_error(&self.source.name, response)
    }

    fn chat(&self, content: Value) -> Result<String> {
        let payload = chat_payload(&self.model, content);
        let response = self.post_json("chat/completions", &payload)?;
        extract_chat_text(&self.source.name, &response)
    }
}

impl TextProvider for GatewayProvider {
    fn name(&self) -> &str {
        &self.source.name
    }

    fn generate_text(&self, prompt: &str, _thinking_budget: u32) -> Result<String> {
        self.chat(Value::String(prompt.to_string()))
    }
}

impl ImageProvider for GatewayProvider {
    fn name(&self) -> &str {
        &self.source.name
    }

    fn generate_image(&self, request: &ImageGenerationRequest) -> Result<Option<DynamicImage>> {
        let size = self
            .source
            .resolution_strategy
            .size_param(&request.aspect_ratio, &request.resolution)
            .context("invalid image size request")?;
        // Dropping `staged` removes the directory on every return path.
        let staged = StagedImages::stage(&request.reference_images)?;
        let references = staged.data_urls()?;
        let payload = image_payload(&self.model, &request.prompt, &size, &references);
        let response = self.post_json("images/generations", &payload)?;
        let Some(found) = first_image_row(&response) else {
            warn!(source = %self.source.name, model = %self.model, "gateway reply carried no image");
            return Ok(None);
        };
        let image = match found {
            GatewayImage::Base64(encoded) => {
                let bytes = BASE64
                    .decode(encoded.as_bytes())
                    .with_context(|| format!("{} image base64 decode failed", self.source.name))?;
                decode_image(&bytes)?
            }
            GatewayImage::Url(url) => download_image(&self.http, url, DOWNLOAD_TIMEOUT)?,
        };
        Ok(Some(image))
    }
}

impl CaptionProvider for GatewayProvider {
    fn name(&self) -> &str {
        &self.source.name
    }

    fn describe_image(&self, image: &DynamicImage, prompt: Option<&str>) -> Result<String> {
        let prompt = prompt
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(DEFAULT_CAPTION_PROMPT);
        let image_url = data_url(&encode_png(image)?, "image/png");
        self.chat(caption_content(prompt, &image_url))
    }
}

fn chat_payload(model: &str, content: Value) -> Value {
    json!({
        "model": model,
        "messages": [{
            "role": "user",
            "content": content,
        }],
        "stream": false,
    })
}

fn caption_content(prompt: &str, image_url: &str) -> Value {
    json!([
        { "type": "text", "text": prompt },
        { "type": "image_url", "image_url": { "url": image_url } },
    ])
}

fn image_payload(model: &str, prompt: &str, size: &str, references: &[String]) -> Value {
    let mut payload = json!({
        "model": model,
        "prompt": prompt,
        "size": size,
        "n": 1,
        "response_format": "b64_json",
    });
    if !references.is_empty() {
        payload["image"] = json!(references);
    }
    payload
}

fn extract_chat_text(provider: &str, response: &Value) -> Result<String> {
    let content = response.pointer("/choices/0/message/content");
    let text = match content {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect::<Vec<&str>>()
            .join(""),
        _ => String::new(),
    };
    if text.trim().is_empty() {
        bail!("{provider} response contained no text");
    }
    Ok(text)
}

#[derive(Debug, PartialEq, Eq)]
enum GatewayImage<'a> {
    Base64(&'a str),
    Url(&'a str),
}

fn first_image_row(response: &Value) -> Option<GatewayImage<'_>> {
    let row = response.pointer("/data/0")?;
    let non_empty = |key: &str| {
        row.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };
    non_empty("b64_json")
        .map(GatewayImage::Base64)
        .or_else(|| non_empty("url").map(GatewayImage::Url))
}
