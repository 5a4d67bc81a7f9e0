use std::sync::OnceLock;

use regex::Regex;

fn image_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"!\[.*?\]\((.*?)\)").expect("valid markdown image pattern"))
}

/// Collects `http(s)` URLs from `![alt](url)` markdown images, in order.
/// Duplicates are kept.
pub fn extract_image_urls(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    image_pattern()
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|url| url.as_str().trim())
        .filter(|url| is_http_url(url))
        .map(str::to_string)
        .collect()
}

pub fn is_http_url(raw: &str) -> bool {
    raw.starts_with("http://") || raw.starts_with("https://")
}

/// Removes a surrounding ```` ``` ```` / ```` ```json ```` fence from a model reply.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(idx) if rest[..idx].trim().chars().all(|c| c.is_ascii_alphanumeric()) => {
            &rest[idx + 1..]
        }
        _ => rest.strip_prefix("json").unwrap_or(rest),
    };
    body.trim_end().trim_end_matches("```").trim()
}

/// Removes indentation shared by every non-blank line, then surrounding blank space.
pub fn dedent(text: &str) -> String {
    let indent = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);
    text.lines()
        .map(|line| line.get(indent..).unwrap_or_else(|| line.trim_start()))
        .collect::<Vec<&str>>()
        .join("\n")
        .trim()
        .to_string()
}
