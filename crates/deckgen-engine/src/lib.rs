pub mod dryrun;
pub mod gateway;
pub mod gemini;
pub mod http;
pub mod images;
pub mod service;

use anyhow::{anyhow, bail, Result};
use deckgen_contracts::config::{Credentials, ModelChoice, ServiceConfig};
use deckgen_contracts::models::ModelSelector;
use deckgen_contracts::providers::default_gateway_sources;
use image::DynamicImage;
use tracing::debug;

pub use dryrun::DryrunImageProvider;
pub use gateway::GatewayProvider;
pub use gemini::GeminiProvider;
pub use http::RetryPolicy;
pub use images::ImageRef;
pub use service::{AiService, DeckOptions, DeckPage, DeckReport};

pub trait TextProvider: Send + Sync {
    fn name(&self) -> &str;
    fn generate_text(&self, prompt: &str, thinking_budget: u32) -> Result<String>;
}

pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &str;
    /// `Ok(None)` when the vendor answered without an image.
    fn generate_image(&self, request: &ImageGenerationRequest) -> Result<Option<DynamicImage>>;
}

pub trait CaptionProvider: Send + Sync {
    fn name(&self) -> &str;
    fn describe_image(&self, image: &DynamicImage, prompt: Option<&str>) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct ImageGenerationRequest {
    pub prompt: String,
    pub reference_images: Vec<DynamicImage>,
    pub aspect_ratio: String,
    pub resolution: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capability {
    Text,
    Image,
    Vision,
}

impl Capability {
    fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Vision => "vision",
        }
    }
}

/// Concrete provider picked for one capability. Each variant implements all
/// three traits it is used through.
enum Built {
    Gemini(GeminiProvider),
    Gateway(GatewayProvider),
}

fn build(
    choice: &ModelChoice,
    capability: Capability,
    config: &ServiceConfig,
    credentials: &Credentials,
) -> Result<Built> {
    let selection = ModelSelector::default()
        .select(&choice.source, choice.requested_model(), capability.as_str())
        .map_err(|err| anyhow!(err))?;
    if selection.model.source != choice.source {
        bail!(
            "{} model '{}' belongs to source '{}', not '{}'",
            capability.as_str(),
            selection.model.name,
            selection.model.source,
            choice.source
        );
    }
    if let Some(reason) = selection.fallback_reason.as_deref() {
        debug!(source = %choice.source, capability = capability.as_str(), reason, "model selection note");
    }
    let model = selection.model.name;
    let api_key = || {
        credentials
            .api_key_for(&choice.source, &config.namespace)
            .map(str::to_string)
            .ok_or_else(|| {
                anyhow!(
                    "no API key for source '{}'; set one of: {}",
                    choice.source,
                    Credentials::api_key_candidates(&choice.source, &config.namespace).join(", ")
                )
            })
    };

    if choice.source == "gemini" {
        let mut provider = GeminiProvider::new(api_key()?, model);
        if let Some(base) = credentials.api_base_for("gemini") {
            provider = provider.with_api_base(base);
        }
        return Ok(Built::Gemini(provider));
    }

    let sources = default_gateway_sources();
    let Some(source) = sources.get(&choice.source).cloned() else {
        bail!(
            "unknown {} source '{}' (known: gemini, {})",
            capability.as_str(),
            choice.source,
            sources.list().join(", ")
        );
    };
    let source = match credentials.api_base_for(&source.name) {
        Some(base) => source.with_api_base(base),
        None => source,
    };
    Ok(Built::Gateway(GatewayProvider::new(source, api_key()?, model)))
}

pub fn build_text_provider(
    config: &ServiceConfig,
    credentials: &Credentials,
) -> Result<Box<dyn TextProvider>> {
    Ok(match build(&config.text, Capability::Text, config, credentials)? {
        Built::Gemini(provider) => Box::new(provider),
        Built::Gateway(provider) => Box::new(provider),
    })
}

pub fn build_image_provider(
    config: &ServiceConfig,
    credentials: &Credentials,
) -> Result<Box<dyn ImageProvider>> {
    if config.image.source == "dryrun" {
        return Ok(Box::new(DryrunImageProvider::new()));
    }
    Ok(match build(&config.image, Capability::Image, config, credentials)? {
        Built::Gemini(provider) => Box::new(provider),
        Built::Gateway(provider) => Box::new(provider),
    })
}

pub fn build_caption_provider(
    config: &ServiceConfig,
    credentials: &Credentials,
) -> Result<Box<dyn CaptionProvider>> {
    Ok(match build(&config.caption, Capability::Vision, config, credentials)? {
        Built::Gemini(provider) => Box::new(provider),
        Built::Gateway(provider) => Box::new(provider),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(text: ModelChoice, image: ModelChoice, caption: ModelChoice) -> ServiceConfig {
        ServiceConfig {
            text,
            image,
            caption,
            ..ServiceConfig::default()
        }
    }

    #[test]
    fn builds_configured_sources() -> Result<()> {
        let credentials = Credentials::from_pairs([
            ("GOOGLE_API_KEY", "g"),
            ("BANANA_DOUBAO_API_KEY", "d"),
            ("LAZYLLM_QWEN_API_KEY", "q"),
        ]);
        let config = config_with(
            ModelChoice::new("gemini", "gemini-2.5-pro"),
            ModelChoice::new("doubao", "doubao-seedream-4-0-250828"),
            ModelChoice::new("qwen", "qwen-vl-plus"),
        );
        assert_eq!(build_text_provider(&config, &credentials)?.name(), "gemini");
        assert_eq!(build_image_provider(&config, &credentials)?.name(), "doubao");
        assert_eq!(build_caption_provider(&config, &credentials)?.name(), "qwen");
        Ok(())
    }

    #[test]
    fn gateway_base_override_is_applied() -> Result<()> {
        let credentials = Credentials::from_pairs([
            ("DOUBAO_API_KEY", "d"),
            ("DOUBAO_API_BASE", "https://proxy.local/v3/"),
        ]);
        let config = config_with(
            ModelChoice::new("doubao", "doubao-pro-128k"),
            ModelChoice::new("dryrun", "dryrun-image-1"),
            ModelChoice::new("doubao", "doubao-pro-128k"),
        );
        match build(&config.text, Capability::Text, &config, &credentials)? {
            Built::Gateway(provider) => {
                assert_eq!(provider.source().api_base, "https://proxy.local/v3");
                assert_eq!(provider.model(), "doubao-pro-128k");
            }
            Built::Gemini(_) => bail!("expected a gateway provider"),
        }
        Ok(())
    }

    #[test]
    fn dryrun_images_need_no_key() -> Result<()> {
        let config = config_with(
            ModelChoice::new("gemini", "gemini-2.5-pro"),
            ModelChoice::new("dryrun", "dryrun-image-1"),
            ModelChoice::new("qwen", "qwen-vl-plus"),
        );
        let provider = build_image_provider(&config, &Credentials::default())?;
        assert_eq!(provider.name(), "dryrun");
        Ok(())
    }

    #[test]
    fn missing_key_names_expected_variables() {
        let err = build_text_provider(&ServiceConfig::default(), &Credentials::default())
            .err()
            .map(|err| err.to_string())
            .unwrap_or_default();
        assert_eq!(
            err,
            "no API key for source 'gemini'; set one of: BANANA_GEMINI_API_KEY, GEMINI_API_KEY, \
             BANANA_SLIDES_GEMINI_API_KEY, LAZYLLM_GEMINI_API_KEY, GOOGLE_API_KEY"
        );
    }

    #[test]
    fn model_registered_elsewhere_is_rejected() {
        let config = config_with(
            ModelChoice::new("gemini", "gemini-2.5-pro"),
            ModelChoice::new("doubao", "gemini-3-pro-image-preview"),
            ModelChoice::new("qwen", "qwen-vl-plus"),
        );
        let credentials = Credentials::from_pairs([("DOUBAO_API_KEY", "d")]);
        let err = build_image_provider(&config, &credentials)
            .err()
            .map(|err| err.to_string())
            .unwrap_or_default();
        assert_eq!(
            err,
            "image model 'gemini-3-pro-image-preview' belongs to source 'gemini', not 'doubao'"
        );
    }

    #[test]
    fn empty_model_uses_source_default() -> Result<()> {
        let credentials = Credentials::from_pairs([("DOUBAO_API_KEY", "d"), ("QWEN_API_KEY", "q")]);
        let config = config_with(
            ModelChoice::new("qwen", ""),
            ModelChoice::new("doubao", ""),
            ModelChoice::new("qwen", "qwen-vl-plus"),
        );
        match build(&config.image, Capability::Image, &config, &credentials)? {
            Built::Gateway(provider) => assert_eq!(provider.model(), "doubao-seedream-4-0-250828"),
            Built::Gemini(_) => bail!("expected a gateway provider"),
        }
        match build(&config.text, Capability::Text, &config, &credentials)? {
            Built::Gateway(provider) => assert_eq!(provider.model(), "qwen-plus"),
            Built::Gemini(_) => bail!("expected a gateway provider"),
        }

        let bare = config_with(
            ModelChoice::new("siliconflow", ""),
            ModelChoice::new("dryrun", "dryrun-image-1"),
            ModelChoice::new("qwen", "qwen-vl-plus"),
        );
        let err = build_text_provider(&bare, &Credentials::from_pairs([("SILICONFLOW_API_KEY", "s")]))
            .err()
            .map(|err| err.to_string())
            .unwrap_or_default();
        assert_eq!(err, "No models available for source 'siliconflow' and capability 'text'.");
        Ok(())
    }

    #[test]
    fn unknown_source_is_rejected() {
        let config = config_with(
            ModelChoice::new("acme", "acme-1"),
            ModelChoice::new("dryrun", "dryrun-image-1"),
            ModelChoice::new("qwen", "qwen-vl-plus"),
        );
        let err = build_text_provider(&config, &Credentials::from_pairs([("ACME_API_KEY", "k")]))
            .err()
            .map(|err| err.to_string())
            .unwrap_or_default();
        assert!(err.starts_with("unknown text source 'acme' (known: gemini, deepseek, doubao"));
    }
}
