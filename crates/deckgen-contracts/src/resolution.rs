use std::fmt;

use thiserror::Error;

/// Minimum total pixel count a ratio-computed size must reach.
pub const MIN_PIXELS: u64 = 3_686_400;
/// Both edges of a ratio-computed size are multiples of this.
pub const ALIGNMENT: u32 = 64;

const SUPPORTED_RATIOS: [(&str, u32, u32); 10] = [
    ("1:1", 1, 1),
    ("2:3", 2, 3),
    ("3:2", 3, 2),
    ("3:4", 3, 4),
    ("4:3", 4, 3),
    ("4:5", 4, 5),
    ("5:4", 5, 4),
    ("9:16", 9, 16),
    ("16:9", 16, 9),
    ("21:9", 21, 9),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AspectRatio {
    width: u32,
    height: u32,
}

impl Default for AspectRatio {
    fn default() -> Self {
        Self {
            width: 16,
            height: 9,
        }
    }
}

impl AspectRatio {
    pub fn new(width: u32, height: u32) -> Result<Self, ResolveError> {
        if width == 0 || height == 0 {
            return Err(ResolveError::InvalidArgument(format!(
                "degenerate aspect ratio {width}:{height}"
            )));
        }
        Ok(Self { width, height })
    }

    /// Parses a ratio tag such as `"16:9"`.
    ///
    /// Tags outside the supported set fall back to 16:9. A tag whose
    /// components parse as numbers but are zero or negative is rejected.
    pub fn parse(tag: &str) -> Result<Self, ResolveError> {
        let normalized = tag.trim();
        if let Some((_, width, height)) = SUPPORTED_RATIOS
            .iter()
            .find(|(candidate, _, _)| *candidate == normalized)
        {
            return Ok(Self {
                width: *width,
                height: *height,
            });
        }
        if let Some((left, right)) = normalized.split_once(':') {
            if let (Ok(width), Ok(height)) =
                (left.trim().parse::<i64>(), right.trim().parse::<i64>())
            {
                if width <= 0 || height <= 0 {
                    return Err(ResolveError::InvalidArgument(format!(
                        "degenerate aspect ratio '{normalized}'"
                    )));
                }
            }
        }
        Ok(Self::default())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn supported_tags() -> impl Iterator<Item = &'static str> {
        SUPPORTED_RATIOS.iter().map(|(tag, _, _)| *tag)
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolutionTier {
    OneK,
    #[default]
    TwoK,
    FourK,
}

impl ResolutionTier {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_uppercase().as_str() {
            "1K" => Some(Self::OneK),
            "2K" => Some(Self::TwoK),
            "4K" => Some(Self::FourK),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OneK => "1K",
            Self::TwoK => "2K",
            Self::FourK => "4K",
        }
    }

    pub fn base_pixels(self) -> u32 {
        match self {
            Self::OneK => 1024,
            Self::TwoK => 2048,
            Self::FourK => 4096,
        }
    }

    /// Literal size sent by fixed-lookup providers. Ignores aspect ratio.
    pub fn fixed_size(self) -> &'static str {
        match self {
            Self::OneK => "1920*1080",
            Self::TwoK => "2048*1080",
            Self::FourK => "3840*2160",
        }
    }

    /// Tier an image of the given size actually landed in, by longest edge.
    pub fn classify(width: u32, height: u32) -> Self {
        let longest = width.max(height);
        if longest < 1500 {
            Self::OneK
        } else if longest < 3000 {
            Self::TwoK
        } else {
            Self::FourK
        }
    }
}

impl fmt::Display for ResolutionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelDimensions {
    pub width: u32,
    pub height: u32,
}

impl PixelDimensions {
    pub fn total(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

impl fmt::Display for PixelDimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

pub fn resolve(aspect_ratio: &str, tier: &str) -> Result<PixelDimensions, ResolveError> {
    let ratio = AspectRatio::parse(aspect_ratio)?;
    let tier = ResolutionTier::from_tag(tier).unwrap_or_default();
    Ok(resolve_dimensions(ratio, tier))
}

pub fn resolve_dimensions(ratio: AspectRatio, tier: ResolutionTier) -> PixelDimensions {
    let base = u64::from(tier.base_pixels());
    let rw = u64::from(ratio.width());
    let rh = u64::from(ratio.height());

    // Floor division on the split, ceiling on the alignment below.
    let (width, height) = if rw >= rh {
        (base, (base * rh / rw).max(1))
    } else {
        ((base * rw / rh).max(1), base)
    };

    let total = width * height;
    let (scaled_width, scaled_height) = if total < MIN_PIXELS {
        let scale = (MIN_PIXELS as f64 / total as f64).sqrt();
        (width as f64 * scale, height as f64 * scale)
    } else {
        (width as f64, height as f64)
    };

    let mut out = PixelDimensions {
        width: align_up(scaled_width),
        height: align_up(scaled_height),
    };
    while out.total() < MIN_PIXELS {
        if out.width <= out.height {
            out.width += ALIGNMENT;
        } else {
            out.height += ALIGNMENT;
        }
    }
    out
}

fn align_up(value: f64) -> u32 {
    let multiple = f64::from(ALIGNMENT);
    // Absorb float noise so an exact multiple does not bump a full step.
    let units = (value / multiple - 1e-9).ceil().max(1.0);
    units as u32 * ALIGNMENT
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStrategy {
    FixedLookup,
    RatioComputed,
}

impl ResolutionStrategy {
    /// Strategy used by a gateway source unless the provider is built with an override.
    pub fn for_source(source: &str) -> Self {
        match source.trim().to_ascii_lowercase().as_str() {
            "doubao" => Self::RatioComputed,
            _ => Self::FixedLookup,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "fixed-lookup" | "fixed" | "lookup" => Some(Self::FixedLookup),
            "ratio-computed" | "computed" | "ratio" => Some(Self::RatioComputed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::FixedLookup => "fixed-lookup",
            Self::RatioComputed => "ratio-computed",
        }
    }

    /// Size parameter sent to the vendor for this strategy.
    ///
    /// Fixed lookup passes an unrecognized resolution through verbatim so a
    /// caller can supply a literal `WIDTH*HEIGHT`.
    pub fn size_param(self, aspect_ratio: &str, resolution: &str) -> Result<String, ResolveError> {
        match self {
            Self::FixedLookup => {
                let trimmed = resolution.trim();
                if trimmed.is_empty() {
                    return Ok(ResolutionTier::default().fixed_size().to_string());
                }
                Ok(ResolutionTier::from_tag(trimmed)
                    .map(|tier| tier.fixed_size().to_string())
                    .unwrap_or_else(|| trimmed.to_string()))
            }
            Self::RatioComputed => Ok(resolve(aspect_ratio, resolution)?.to_string()),
        }
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns the tier the image actually has and whether it matches `expected`.
pub fn check_image_resolution(width: u32, height: u32, expected: &str) -> (ResolutionTier, bool) {
    let actual = ResolutionTier::classify(width, height);
    let matches = actual.as_str() == expected.trim().to_ascii_uppercase();
    (actual, matches)
}
