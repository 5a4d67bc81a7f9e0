use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use deckgen_contracts::markdown::is_http_url;
use image::{DynamicImage, ImageFormat};
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};
use tempfile::TempDir;
use tracing::debug;

pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// A reference image handed to a generation call.
#[derive(Debug, Clone)]
pub enum ImageRef {
    Image(DynamicImage),
    Path(PathBuf),
    Url(String),
}

impl ImageRef {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if is_http_url(trimmed) {
            Self::Url(trimmed.to_string())
        } else {
            Self::Path(PathBuf::from(trimmed))
        }
    }
}

pub fn load_image(path: &Path) -> Result<DynamicImage> {
    image::open(path).with_context(|| format!("failed to load image {}", path.display()))
}

pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes).context("image bytes could not be decoded")
}

pub fn download_image(http: &HttpClient, url: &str, timeout: Duration) -> Result<DynamicImage> {
    debug!(url, "downloading image");
    let bytes = http
        .get(url)
        .timeout(timeout)
        .send()
        .with_context(|| format!("image download failed ({url})"))?
        .error_for_status()
        .with_context(|| format!("image download failed ({url})"))?
        .bytes()
        .with_context(|| format!("image download body read failed ({url})"))?;
    let image = decode_image(&bytes).with_context(|| format!("downloaded file is not an image ({url})"))?;
    debug!(url, width = image.width(), height = image.height(), "downloaded image");
    Ok(image)
}

pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .context("PNG encode failed")?;
    Ok(out.into_inner())
}

pub fn data_url(bytes: &[u8], mime: &str) -> String {
    format!("data:{mime};base64,{}", BASE64.encode(bytes))
}

pub fn inline_image_part(image: &DynamicImage) -> Result<Value> {
    let bytes = encode_png(image)?;
    Ok(json!({
        "inlineData": {
            "mimeType": "image/png",
            "data": BASE64.encode(bytes),
        }
    }))
}

pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())?;
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

/// Reference images written to a private temporary directory. The directory
/// and its files are removed when this value is dropped.
pub struct StagedImages {
    dir: TempDir,
    paths: Vec<PathBuf>,
}

impl StagedImages {
    pub fn stage(images: &[DynamicImage]) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("deckgen-ref-")
            .tempdir()
            .context("failed to create staging directory")?;
        let mut paths = Vec::with_capacity(images.len());
        for (idx, image) in images.iter().enumerate() {
            let path = dir.path().join(format!("ref_{idx}.png"));
            image
                .save_with_format(&path, ImageFormat::Png)
                .with_context(|| format!("failed to stage {}", path.display()))?;
            paths.push(path);
        }
        Ok(Self { dir, paths })
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn data_urls(&self) -> Result<Vec<String>> {
        self.paths
            .iter()
            .map(|path| {
                let bytes =
                    fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
                Ok(data_url(&bytes, mime_for_path(path).unwrap_or("image/png")))
            })
            .collect()
    }
}
