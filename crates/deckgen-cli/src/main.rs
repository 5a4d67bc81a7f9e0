use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use deckgen_contracts::config::{Credentials, ModelChoice, ServiceConfig};
use deckgen_contracts::markdown::extract_image_urls;
use deckgen_contracts::models::ModelRegistry;
use deckgen_contracts::outline::Outline;
use deckgen_contracts::resolution::{ResolutionStrategy, ResolutionTier};
use deckgen_engine::{
    build_caption_provider, build_image_provider, AiService, DeckOptions, ImageRef,
};
use image::imageops::FilterType;
use image::DynamicImage;
use serde_json::Value;
use tracing::info;

const CAPTION_MAX_EDGE: u32 = 1536;

#[derive(Debug, Parser)]
#[command(name = "deckgen", version, about = "Slide deck generation from an idea")]
struct Cli {
    /// Route image generation through the offline dry-run provider.
    #[arg(long, global = true)]
    dryrun: bool,
    /// Output language for generated text (overrides OUTPUT_LANGUAGE).
    #[arg(long, global = true)]
    language: Option<String>,
    #[arg(long, global = true)]
    text_source: Option<String>,
    #[arg(long, global = true)]
    text_model: Option<String>,
    #[arg(long, global = true)]
    image_source: Option<String>,
    #[arg(long, global = true)]
    image_model: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the size parameter for an aspect ratio and tier.
    Resolve(ResolveArgs),
    /// Flatten an outline JSON file into its page list.
    Flatten(FlattenArgs),
    /// List markdown image URLs found in a file.
    Urls(UrlsArgs),
    /// List known models.
    Models(ModelsArgs),
    Outline(OutlineArgs),
    Image(ImageArgs),
    Edit(EditArgs),
    Describe(DescribeArgs),
    Deck(DeckArgs),
}

#[derive(Debug, Args)]
struct SizeArgs {
    #[arg(long, default_value = "16:9")]
    aspect_ratio: String,
    #[arg(long, default_value = "2K")]
    resolution: String,
}

#[derive(Debug, Parser)]
struct ResolveArgs {
    #[command(flatten)]
    size: SizeArgs,
    #[arg(long, default_value = "ratio-computed")]
    strategy: String,
}

#[derive(Debug, Parser)]
struct FlattenArgs {
    input: PathBuf,
    /// Print the numbered outline text instead of the page list.
    #[arg(long)]
    text: bool,
}

#[derive(Debug, Parser)]
struct UrlsArgs {
    input: PathBuf,
}

#[derive(Debug, Parser)]
struct ModelsArgs {
    #[arg(long)]
    capability: Option<String>,
}

#[derive(Debug, Parser)]
struct OutlineArgs {
    #[arg(long)]
    idea: String,
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct ImageArgs {
    #[arg(long)]
    prompt: String,
    /// Main reference image; must exist when given.
    #[arg(long)]
    reference: Option<PathBuf>,
    /// Additional reference: a local path or an http(s) URL. Repeatable.
    #[arg(long = "ref")]
    refs: Vec<String>,
    #[command(flatten)]
    size: SizeArgs,
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct EditArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    instruction: String,
    #[arg(long)]
    description: Option<String>,
    #[arg(long = "ref")]
    refs: Vec<String>,
    #[command(flatten)]
    size: SizeArgs,
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct DescribeArgs {
    image: PathBuf,
    #[arg(long)]
    prompt: Option<String>,
}

#[derive(Debug, Parser)]
struct DeckArgs {
    #[arg(long)]
    idea: String,
    #[arg(long)]
    template: Option<PathBuf>,
    #[arg(long)]
    out: PathBuf,
    #[command(flatten)]
    size: SizeArgs,
    #[arg(long)]
    extra_requirements: Option<String>,
}

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("deckgen error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(
        "deckgen=info"
            .parse()
            .unwrap_or_else(|_| tracing_subscriber::filter::LevelFilter::INFO.into()),
    );
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let credentials = Credentials::from_env();
    let config = service_config(&cli, &credentials);
    match cli.command {
        Command::Resolve(args) => {
            println!("{}", resolve_size(&args)?);
            Ok(0)
        }
        Command::Flatten(args) => {
            println!("{}", flatten_file(&args.input, args.text)?);
            Ok(0)
        }
        Command::Urls(args) => {
            let text = fs::read_to_string(&args.input)
                .with_context(|| format!("failed reading {}", args.input.display()))?;
            for url in extract_image_urls(&text) {
                println!("{url}");
            }
            Ok(0)
        }
        Command::Models(args) => {
            for line in model_lines(args.capability.as_deref()) {
                println!("{line}");
            }
            Ok(0)
        }
        Command::Outline(args) => run_outline(args, config, &credentials),
        Command::Image(args) => run_image(args, config, &credentials),
        Command::Edit(args) => run_edit(args, config, &credentials),
        Command::Describe(args) => run_describe(args, &config, &credentials),
        Command::Deck(args) => run_deck(args, config, &credentials),
    }
}

fn service_config(cli: &Cli, credentials: &Credentials) -> ServiceConfig {
    let mut config = ServiceConfig::from_credentials(credentials);
    if let Some(language) = cli.language.as_deref() {
        config.language = language.to_string();
    }
    config.text = config.text.overridden(cli.text_source.as_deref(), cli.text_model.as_deref());
    config.image = config.image.overridden(cli.image_source.as_deref(), cli.image_model.as_deref());
    if cli.dryrun {
        config.image = ModelChoice::new("dryrun", "dryrun-image-1");
    }
    config
}

fn resolve_size(args: &ResolveArgs) -> Result<String> {
    let Some(strategy) = ResolutionStrategy::parse(&args.strategy) else {
        bail!(
            "unknown strategy '{}' (expected {} or {})",
            args.strategy,
            ResolutionStrategy::RatioComputed,
            ResolutionStrategy::FixedLookup
        );
    };
    Ok(strategy.size_param(&args.size.aspect_ratio, &args.size.resolution)?)
}

fn flatten_file(path: &Path, as_text: bool) -> Result<String> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("failed reading {}", path.display()))?;
    let outline = Outline::from_json_str(&raw)
        .with_context(|| format!("invalid outline in {}", path.display()))?;
    if as_text {
        return Ok(outline.text());
    }
    let pages = outline
        .flatten()
        .into_iter()
        .map(|page| page.to_value())
        .collect::<Vec<Value>>();
    Ok(serde_json::to_string_pretty(&pages)?)
}

fn model_lines(capability: Option<&str>) -> Vec<String> {
    let registry = ModelRegistry::default();
    registry
        .list()
        .filter(|model| capability.map(|cap| model.supports(cap)).unwrap_or(true))
        .map(|model| format!("{}\t{}\t{}", model.name, model.source, model.capabilities.join(",")))
        .collect()
}

fn parse_refs(raw: &[String]) -> Vec<ImageRef> {
    raw.iter()
        .map(String::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ImageRef::parse)
        .collect()
}

fn artifact_path(out: Option<PathBuf>, stem: &str) -> PathBuf {
    out.unwrap_or_else(|| {
        PathBuf::from(format!("{stem}-{}.png", Utc::now().format("%Y%m%d-%H%M%S")))
    })
}

fn save_image(image: Option<DynamicImage>, path: &Path) -> Result<i32> {
    let Some(image) = image else {
        eprintln!("No image was returned.");
        return Ok(2);
    };
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    image
        .save(path)
        .with_context(|| format!("failed to save {}", path.display()))?;
    println!("Saved {} ({}x{})", path.display(), image.width(), image.height());
    Ok(0)
}

fn image_service(config: ServiceConfig, credentials: &Credentials) -> Result<AiService> {
    let image = build_image_provider(&config, credentials)?;
    Ok(AiService::for_images(image, config))
}

fn run_outline(args: OutlineArgs, config: ServiceConfig, credentials: &Credentials) -> Result<i32> {
    let service = AiService::from_config(config, credentials)?;
    let outline = service.generate_outline(&args.idea)?;
    let rendered = serde_json::to_string_pretty(&outline.to_value())?;
    match args.out {
        Some(path) => {
            fs::write(&path, rendered)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("{}", service.generate_outline_text(&outline));
            println!("Outline written to {}", path.display());
        }
        None => println!("{rendered}"),
    }
    Ok(0)
}

fn run_image(args: ImageArgs, config: ServiceConfig, credentials: &Credentials) -> Result<i32> {
    let service = image_service(config, credentials)?;
    let image = service.generate_image(
        &args.prompt,
        args.reference.as_deref(),
        &args.size.aspect_ratio,
        &args.size.resolution,
        &parse_refs(&args.refs),
    )?;
    save_image(image, &artifact_path(args.out, "image"))
}

fn run_edit(args: EditArgs, config: ServiceConfig, credentials: &Credentials) -> Result<i32> {
    let service = image_service(config, credentials)?;
    let image = service.edit_image(
        &args.instruction,
        &args.image,
        &args.size.aspect_ratio,
        &args.size.resolution,
        args.description.as_deref(),
        &parse_refs(&args.refs),
    )?;
    save_image(image, &artifact_path(args.out, "edit"))
}

fn run_describe(args: DescribeArgs, config: &ServiceConfig, credentials: &Credentials) -> Result<i32> {
    let provider = build_caption_provider(config, credentials)?;
    let image = image::open(&args.image)
        .with_context(|| format!("failed to load image {}", args.image.display()))?;
    let image = downscale_for_caption(image, CAPTION_MAX_EDGE);
    let caption = provider.describe_image(&image, args.prompt.as_deref())?;
    println!("{}", caption.trim());
    Ok(0)
}

fn downscale_for_caption(image: DynamicImage, max_edge: u32) -> DynamicImage {
    if image.width().max(image.height()) <= max_edge {
        return image;
    }
    image.resize(max_edge, max_edge, FilterType::Triangle)
}

fn run_deck(args: DeckArgs, config: ServiceConfig, credentials: &Credentials) -> Result<i32> {
    let service = AiService::from_config(config, credentials)?;
    let options = DeckOptions {
        out_dir: args.out,
        aspect_ratio: args.size.aspect_ratio,
        resolution: args.size.resolution,
        extra_requirements: args.extra_requirements,
    };
    let tier = ResolutionTier::from_tag(&options.resolution).unwrap_or_default();
    info!(tier = %tier, out = %options.out_dir.display(), "generating deck");
    let report = service.generate_deck(&args.idea, args.template.as_deref(), &options)?;
    let mut missing = 0;
    for page in &report.pages {
        match page.image_path.as_deref() {
            Some(path) => println!("{:02}. {} -> {}", page.index, page.title, path.display()),
            None => {
                missing += 1;
                println!("{:02}. {} -> (no image)", page.index, page.title);
            }
        }
    }
    Ok(if missing == 0 { 0 } else { 2 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use deckgen_engine::build_text_provider;
    use tempfile::TempDir;

    fn parse(args: &[&str]) -> Result<Cli> {
        Ok(Cli::try_parse_from(args)?)
    }

    #[test]
    fn resolve_uses_requested_strategy() -> Result<()> {
        let Command::Resolve(args) = parse(&["deckgen", "resolve", "--resolution", "4K"])?.command
        else {
            bail!("expected resolve");
        };
        assert_eq!(resolve_size(&args)?, "4096x2304");

        let Command::Resolve(args) =
            parse(&["deckgen", "resolve", "--strategy", "fixed-lookup", "--resolution", "1k"])?
                .command
        else {
            bail!("expected resolve");
        };
        assert_eq!(resolve_size(&args)?, "1920*1080");
        Ok(())
    }

    #[test]
    fn resolve_rejects_degenerate_ratio_and_unknown_strategy() -> Result<()> {
        let Command::Resolve(args) = parse(&["deckgen", "resolve", "--aspect-ratio", "0:9"])?.command
        else {
            bail!("expected resolve");
        };
        assert!(resolve_size(&args).is_err());

        let Command::Resolve(args) = parse(&["deckgen", "resolve", "--strategy", "magic"])?.command
        else {
            bail!("expected resolve");
        };
        let err = resolve_size(&args).err().map(|err| err.to_string()).unwrap_or_default();
        assert_eq!(
            err,
            "unknown strategy 'magic' (expected ratio-computed or fixed-lookup)"
        );
        Ok(())
    }

    #[test]
    fn flatten_file_prints_pages_or_text() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("outline.json");
        fs::write(
            &path,
            r#"[{"part": "Intro", "pages": [{"title": "Hi", "points": []}]}, {"title": "", "points": []}]"#,
        )?;
        let pages: Value = serde_json::from_str(&flatten_file(&path, false)?)?;
        assert_eq!(pages[0]["part"], "Intro");
        assert_eq!(pages.as_array().map(Vec::len), Some(2));
        assert_eq!(flatten_file(&path, true)?, "1. Intro\n2. Untitled");
        Ok(())
    }

    #[test]
    fn dryrun_and_flags_override_environment() -> Result<()> {
        let credentials = Credentials::from_pairs([
            ("IMAGE_SOURCE", "doubao"),
            ("OUTPUT_LANGUAGE", "Chinese"),
        ]);
        let cli = parse(&[
            "deckgen",
            "--dryrun",
            "--language",
            "English",
            "--text-source",
            "qwen",
            "--text-model",
            "qwen-max",
            "models",
        ])?;
        let config = service_config(&cli, &credentials);
        assert_eq!(config.image, ModelChoice::new("dryrun", "dryrun-image-1"));
        assert_eq!(config.text, ModelChoice::new("qwen", "qwen-max"));
        assert_eq!(config.language, "English");
        Ok(())
    }

    #[test]
    fn source_flag_alone_selects_that_sources_default_model() -> Result<()> {
        let credentials = Credentials::from_pairs([
            ("TEXT_MODEL", "gemini-2.5-flash"),
            ("IMAGE_MODEL", "gemini-3-pro-image-preview"),
        ]);

        let cli = parse(&["deckgen", "--image-source", "doubao", "--text-source", "qwen", "models"])?;
        let config = service_config(&cli, &credentials);
        assert_eq!(config.image, ModelChoice::new("doubao", ""));
        assert_eq!(config.text, ModelChoice::new("qwen", ""));

        let cli = parse(&["deckgen", "--image-source", "gemini", "models"])?;
        let config = service_config(&cli, &credentials);
        assert_eq!(config.image, ModelChoice::new("gemini", "gemini-3-pro-image-preview"));

        let cli = parse(&["deckgen", "--image-model", "gemini-2.5-flash-image", "models"])?;
        let config = service_config(&cli, &credentials);
        assert_eq!(config.image, ModelChoice::new("gemini", "gemini-2.5-flash-image"));

        let cli = parse(&[
            "deckgen",
            "--image-source",
            "doubao",
            "--image-model",
            "doubao-seedream-4.5",
            "models",
        ])?;
        let config = service_config(&cli, &credentials);
        assert_eq!(config.image, ModelChoice::new("doubao", "doubao-seedream-4.5"));
        Ok(())
    }

    #[test]
    fn source_flag_alone_builds_a_provider_for_that_source() -> Result<()> {
        let credentials = Credentials::from_pairs([
            ("DOUBAO_API_KEY", "d"),
            ("QWEN_API_KEY", "q"),
        ]);
        let cli = parse(&["deckgen", "--image-source", "doubao", "--text-source", "qwen", "models"])?;
        let config = service_config(&cli, &credentials);
        assert_eq!(build_image_provider(&config, &credentials)?.name(), "doubao");
        assert_eq!(build_text_provider(&config, &credentials)?.name(), "qwen");
        Ok(())
    }

    #[test]
    fn dryrun_image_command_writes_png() -> Result<()> {
        let dir = TempDir::new()?;
        let out = dir.path().join("nested").join("slide.png");
        let cli = parse(&[
            "deckgen",
            "--dryrun",
            "image",
            "--prompt",
            "a title slide",
            "--aspect-ratio",
            "1:1",
            "--resolution",
            "1K",
        ])?;
        let config = service_config(&cli, &Credentials::default());
        let Command::Image(mut args) = cli.command else {
            bail!("expected image");
        };
        args.out = Some(out.clone());
        assert_eq!(run_image(args, config, &Credentials::default())?, 0);
        let image = image::open(&out)?;
        assert_eq!((image.width(), image.height()), (1920, 1920));
        Ok(())
    }

    #[test]
    fn model_listing_filters_by_capability() {
        let lines = model_lines(Some("vision"));
        assert!(lines.iter().any(|line| line.starts_with("qwen-vl-plus\tqwen\t")));
        assert!(lines.iter().all(|line| line.contains("vision")));
        assert!(model_lines(None).len() > lines.len());
    }

    #[test]
    fn refs_are_split_into_urls_and_paths() {
        let refs = parse_refs(&[
            "https://x.com/a.png".to_string(),
            " ".to_string(),
            "local.png".to_string(),
        ]);
        assert_eq!(refs.len(), 2);
        assert!(matches!(refs[0], ImageRef::Url(_)));
        assert!(matches!(refs[1], ImageRef::Path(_)));
    }

    #[test]
    fn caption_input_is_downscaled() {
        let big = DynamicImage::new_rgb8(3000, 1500);
        let small = downscale_for_caption(big, 1536);
        assert_eq!((small.width(), small.height()), (1536, 768));
        let tiny = downscale_for_caption(DynamicImage::new_rgb8(10, 10), 1536);
        assert_eq!(tiny.width(), 10);
    }
}
