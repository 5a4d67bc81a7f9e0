use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use deckgen_contracts::config::{Credentials, ServiceConfig};
use deckgen_contracts::markdown::{dedent, extract_image_urls, strip_code_fence};
use deckgen_contracts::outline::{Outline, OutlinePage};
use deckgen_contracts::prompts::{
    edit_instruction, image_prompt, outline_prompt, page_description_prompt, ImagePromptOptions,
};
use deckgen_contracts::resolution::check_image_resolution;
use image::DynamicImage;
use reqwest::blocking::Client as HttpClient;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use crate::images::{download_image, load_image, ImageRef, DOWNLOAD_TIMEOUT};
use crate::{build_image_provider, build_text_provider, ImageGenerationRequest, ImageProvider, TextProvider};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeckOptions {
    pub out_dir: PathBuf,
    pub aspect_ratio: String,
    pub resolution: String,
    pub extra_requirements: Option<String>,
}

impl DeckOptions {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
            aspect_ratio: "16:9".to_string(),
            resolution: "2K".to_string(),
            extra_requirements: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeckPage {
    pub index: usize,
    pub title: String,
    pub part: Option<String>,
    pub description: String,
    pub image_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct DeckReport {
    pub outline: Outline,
    pub pages: Vec<DeckPage>,
}

/// Idea → outline → page descriptions → page images.
pub struct AiService {
    text: Option<Box<dyn TextProvider>>,
    image: Box<dyn ImageProvider>,
    config: ServiceConfig,
    http: HttpClient,
}

impl AiService {
    pub fn new(
        text: Box<dyn TextProvider>,
        image: Box<dyn ImageProvider>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            text: Some(text),
            image,
            config,
            http: HttpClient::new(),
        }
    }

    /// Service for image generation and editing only; text operations fail.
    pub fn for_images(image: Box<dyn ImageProvider>, config: ServiceConfig) -> Self {
        Self {
            text: None,
            image,
            config,
            http: HttpClient::new(),
        }
    }

    pub fn from_config(config: ServiceConfig, credentials: &Credentials) -> Result<Self> {
        let text = build_text_provider(&config, credentials)?;
        let image = build_image_provider(&config, credentials)?;
        Ok(Self::new(text, image, config))
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    fn ask(&self, prompt: &str) -> Result<String> {
        let Some(text) = self.text.as_ref() else {
            bail!("no text provider configured");
        };
        debug!(provider = text.name(), chars = prompt.len(), "text request");
        text.generate_text(prompt, self.config.thinking_budget)
            .with_context(|| format!("{} text generation failed", text.name()))
    }

    pub fn generate_outline(&self, idea: &str) -> Result<Outline> {
        let reply = self.ask(&outline_prompt(idea, &self.config.language))?;
        let outline = Outline::from_json_str(strip_code_fence(&reply))
            .context("model returned an invalid outline")?;
        info!(items = outline.len(), "outline generated");
        Ok(outline)
    }

    pub fn flatten_outline(&self, outline: &Outline) -> Vec<OutlinePage> {
        outline.flatten()
    }

    pub fn generate_outline_text(&self, outline: &Outline) -> String {
        outline.text()
    }

    pub fn generate_page_description(
        &self,
        idea: &str,
        outline: &Outline,
        page: &OutlinePage,
        page_index: usize,
    ) -> Result<String> {
        let prompt =
            page_description_prompt(idea, outline, page, page_index, &self.config.language);
        Ok(dedent(&self.ask(&prompt)?))
    }

    pub fn generate_image_prompt(
        &self,
        outline: &Outline,
        page: &OutlinePage,
        page_desc: &str,
        page_index: usize,
        has_material_images: bool,
        extra_requirements: Option<&str>,
    ) -> String {
        let options = ImagePromptOptions {
            language: &self.config.language,
            has_material_images,
            extra_requirements,
        };
        image_prompt(outline, page, page_desc, page_index, &options)
    }

    /// The main reference image must exist; additional references that fail
    /// to load are skipped.
    pub fn generate_image(
        &self,
        prompt: &str,
        ref_image_path: Option<&Path>,
        aspect_ratio: &str,
        resolution: &str,
        additional_refs: &[ImageRef],
    ) -> Result<Option<DynamicImage>> {
        let request_id = Uuid::new_v4();
        let span = info_span!("generate_image", %request_id, provider = self.image.name());
        let _guard = span.enter();
        self.generate_image_inner(prompt, ref_image_path, aspect_ratio, resolution, additional_refs)
            .context("Error generating image")
    }

    fn generate_image_inner(
        &self,
        prompt: &str,
        ref_image_path: Option<&Path>,
        aspect_ratio: &str,
        resolution: &str,
        additional_refs: &[ImageRef],
    ) -> Result<Option<DynamicImage>> {
        let mut reference_images = Vec::new();
        if let Some(path) = ref_image_path {
            if !path.exists() {
                bail!("Reference image not found: {}", path.display());
            }
            reference_images.push(load_image(path)?);
        }
        for reference in additional_refs {
            match self.load_reference(reference) {
                Ok(image) => reference_images.push(image),
                Err(err) => {
                    let message = format!("{err:#}");
                    warn!(error = %message, "skipping reference image");
                }
            }
        }
        info!(
            aspect_ratio,
            resolution,
            references = reference_images.len(),
            "requesting image"
        );

        let request = ImageGenerationRequest {
            prompt: prompt.to_string(),
            reference_images,
            aspect_ratio: aspect_ratio.to_string(),
            resolution: resolution.to_string(),
        };
        let Some(image) = self.image.generate_image(&request)? else {
            warn!("image provider returned no image");
            return Ok(None);
        };
        let (actual, matches) = check_image_resolution(image.width(), image.height(), resolution);
        if !matches {
            warn!(
                requested = resolution,
                actual = %actual,
                width = image.width(),
                height = image.height(),
                "image resolution differs from request"
            );
        }
        Ok(Some(image))
    }

    fn load_reference(&self, reference: &ImageRef) -> Result<DynamicImage> {
        match reference {
            ImageRef::Image(image) => Ok(image.clone()),
            ImageRef::Url(url) => download_image(&self.http, url, DOWNLOAD_TIMEOUT),
            ImageRef::Path(path) if path.exists() => load_image(path),
            ImageRef::Path(path) => Err(anyhow!("reference image does not exist: {}", path.display())),
        }
    }

    pub fn edit_image(
        &self,
        instruction: &str,
        current_image_path: &Path,
        aspect_ratio: &str,
        resolution: &str,
        original_description: Option<&str>,
        additional_refs: &[ImageRef],
    ) -> Result<Option<DynamicImage>> {
        let prompt = edit_instruction(instruction, original_description);
        self.generate_image(
            &prompt,
            Some(current_image_path),
            aspect_ratio,
            resolution,
            additional_refs,
        )
    }

    /// Runs the whole pipeline and writes `page-NN.png` plus `outline.json`
    /// into `options.out_dir`.
    pub fn generate_deck(
        &self,
        idea: &str,
        template: Option<&Path>,
        options: &DeckOptions,
    ) -> Result<DeckReport> {
        fs::create_dir_all(&options.out_dir)
            .with_context(|| format!("failed to create {}", options.out_dir.display()))?;
        let outline = self.generate_outline(idea)?;
        let outline_path = options.out_dir.join("outline.json");
        fs::write(&outline_path, serde_json::to_string_pretty(&outline.to_value())?)
            .with_context(|| format!("failed to write {}", outline_path.display()))?;

        let pages = self.flatten_outline(&outline);
        let total = pages.len();
        let mut report_pages = Vec::with_capacity(total);
        for (offset, page) in pages.iter().enumerate() {
            let index = offset + 1;
            info!(page = index, total, title = %page.display_title(), "building page");
            let description = self.generate_page_description(idea, &outline, page, index)?;
            let materials = extract_image_urls(&description)
                .into_iter()
                .map(ImageRef::Url)
                .collect::<Vec<ImageRef>>();
            let prompt = self.generate_image_prompt(
                &outline,
                page,
                &description,
                index,
                !materials.is_empty(),
                options.extra_requirements.as_deref(),
            );
            let image = self.generate_image(
                &prompt,
                template,
                &options.aspect_ratio,
                &options.resolution,
                &materials,
            )?;
            let image_path = match image {
                Some(image) => {
                    let path = options.out_dir.join(format!("page-{index:02}.png"));
                    image
                        .save(&path)
                        .with_context(|| format!("failed to save {}", path.display()))?;
                    Some(path)
                }
                None => None,
            };
            report_pages.push(DeckPage {
                index,
                title: page.display_title().to_string(),
                part: page.part().map(str::to_string),
                description,
                image_path,
            });
        }
        Ok(DeckReport {
            outline,
            pages: report_pages,
        })
    }
}
