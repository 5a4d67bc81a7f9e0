use std::collections::BTreeMap;

pub const DEFAULT_NAMESPACE: &str = "BANANA";
pub const LEGACY_NAMESPACE: &str = "BANANA_SLIDES";
pub const GATEWAY_NAMESPACE: &str = "LAZYLLM";

pub const DEFAULT_TEXT_SOURCE: &str = "gemini";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-pro";
pub const DEFAULT_IMAGE_SOURCE: &str = "gemini";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-3-pro-image-preview";
pub const DEFAULT_CAPTION_SOURCE: &str = "qwen";
pub const DEFAULT_CAPTION_MODEL: &str = "qwen-vl-plus";
pub const DEFAULT_LANGUAGE: &str = "Chinese";
pub const DEFAULT_THINKING_BUDGET: u32 = 1000;

/// Immutable snapshot of keys, API bases and source selections.
///
/// Read once from the process environment (or built from explicit pairs in
/// tests); lookups never write back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    values: BTreeMap<String, String>,
}

impl Credentials {
    /// Variables whose name or value is not valid UTF-8 are skipped.
    pub fn from_env() -> Self {
        Self::from_pairs(std::env::vars_os().filter_map(|(key, value)| {
            Some((key.into_string().ok()?, value.into_string().ok()?))
        }))
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let values = pairs
            .into_iter()
            .map(|(key, value)| (key.into(), value.into().trim().to_string()))
            .filter(|(_, value)| !value.is_empty())
            .collect();
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn first_of(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|key| self.get(key))
    }

    /// Candidate variable names for a source, in lookup order.
    pub fn api_key_candidates(source: &str, namespace: &str) -> Vec<String> {
        let source_upper = source.trim().to_ascii_uppercase();
        if source_upper.is_empty() {
            return Vec::new();
        }
        let mut candidates = vec![
            format!("{namespace}_{source_upper}_API_KEY"),
            format!("{source_upper}_API_KEY"),
            format!("{LEGACY_NAMESPACE}_{source_upper}_API_KEY"),
            format!("{GATEWAY_NAMESPACE}_{source_upper}_API_KEY"),
        ];
        if source_upper == "GEMINI" {
            candidates.push("GOOGLE_API_KEY".to_string());
        }
        candidates.dedup();
        candidates
    }

    pub fn api_key_for(&self, source: &str, namespace: &str) -> Option<&str> {
        Self::api_key_candidates(source, namespace)
            .iter()
            .find_map(|key| self.get(key))
    }

    pub fn api_base_for(&self, source: &str) -> Option<String> {
        let source_upper = source.trim().to_ascii_uppercase();
        if source_upper.is_empty() {
            return None;
        }
        self.get(&format!("{source_upper}_API_BASE"))
            .map(|value| value.trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelChoice {
    pub source: String,
    pub model: String,
}

impl ModelChoice {
    pub fn new(source: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            source: source.into().trim().to_ascii_lowercase(),
            model: model.into().trim().to_string(),
        }
    }

    /// The model name, or `None` when the source's default should be used.
    pub fn requested_model(&self) -> Option<&str> {
        Some(self.model.as_str()).filter(|model| !model.is_empty())
    }

    /// Switches source and model together. A new source without a model
    /// drops the current model, which belongs to the old source.
    pub fn overridden(&self, source: Option<&str>, model: Option<&str>) -> Self {
        let source = source
            .map(|value| value.trim().to_ascii_lowercase())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| self.source.clone());
        let model = match model {
            Some(model) => model,
            None if source == self.source => &self.model,
            None => "",
        };
        Self::new(source, model)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub text: ModelChoice,
    pub image: ModelChoice,
    pub caption: ModelChoice,
    pub namespace: String,
    pub language: String,
    pub thinking_budget: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            text: ModelChoice::new(DEFAULT_TEXT_SOURCE, DEFAULT_TEXT_MODEL),
            image: ModelChoice::new(DEFAULT_IMAGE_SOURCE, DEFAULT_IMAGE_MODEL),
            caption: ModelChoice::new(DEFAULT_CAPTION_SOURCE, DEFAULT_CAPTION_MODEL),
            namespace: DEFAULT_NAMESPACE.to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
            thinking_budget: DEFAULT_THINKING_BUDGET,
        }
    }
}

impl ServiceConfig {
    pub fn from_credentials(credentials: &Credentials) -> Self {
        let defaults = Self::default();
        let pick = |keys: &[&str], fallback: &str| {
            credentials
                .first_of(keys)
                .unwrap_or(fallback)
                .to_string()
        };
        let choose = |source_keys: &[&str], model_keys: &[&str], fallback: &ModelChoice| {
            fallback.overridden(credentials.first_of(source_keys), credentials.first_of(model_keys))
        };
        Self {
            text: choose(&["TEXT_SOURCE", "LAZYLLM_TEXT_SOURCE"], &["TEXT_MODEL"], &defaults.text),
            image: choose(
                &["IMAGE_SOURCE", "LAZYLLM_IMAGE_SOURCE"],
                &["IMAGE_MODEL"],
                &defaults.image,
            ),
            caption: choose(
                &["CAPTION_SOURCE", "LAZYLLM_IMAGE_CAPTION_SOURCE"],
                &["IMAGE_CAPTION_MODEL"],
                &defaults.caption,
            ),
            namespace: pick(&["KEY_NAMESPACE"], &defaults.namespace),
            language: pick(&["OUTPUT_LANGUAGE"], &defaults.language),
            thinking_budget: credentials
                .get("THINKING_BUDGET")
                .and_then(|raw| raw.parse::<u32>().ok())
                .unwrap_or(defaults.thinking_budget),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_key_wins_over_fallbacks() {
        let creds = Credentials::from_pairs([
            ("LAZYLLM_QWEN_API_KEY", "gateway"),
            ("BANANA_SLIDES_QWEN_API_KEY", "legacy"),
            ("QWEN_API_KEY", "vendor"),
            ("BANANA_QWEN_API_KEY", "namespaced"),
        ]);
        assert_eq!(creds.api_key_for("qwen", DEFAULT_NAMESPACE), Some("namespaced"));
    }

    #[test]
    fn lookup_walks_candidates_in_order() {
        let creds = Credentials::from_pairs([
            ("LAZYLLM_DOUBAO_API_KEY", "gateway"),
            ("BANANA_SLIDES_DOUBAO_API_KEY", "legacy"),
        ]);
        assert_eq!(creds.api_key_for("doubao", DEFAULT_NAMESPACE), Some("legacy"));

        let creds = Credentials::from_pairs([("LAZYLLM_DOUBAO_API_KEY", "gateway")]);
        assert_eq!(creds.api_key_for("Doubao", DEFAULT_NAMESPACE), Some("gateway"));
    }

    #[test]
    fn empty_values_and_sources_are_ignored() {
        let creds = Credentials::from_pairs([("BANANA_GLM_API_KEY", "  "), ("GLM_API_KEY", "k")]);
        assert_eq!(creds.api_key_for("glm", DEFAULT_NAMESPACE), Some("k"));
        assert_eq!(creds.api_key_for("", DEFAULT_NAMESPACE), None);
        assert!(Credentials::api_key_candidates(" ", DEFAULT_NAMESPACE).is_empty());
    }

    #[test]
    fn custom_namespace_and_gemini_google_fallback() {
        let creds = Credentials::from_pairs([
            ("ACME_GEMINI_API_KEY", "acme"),
            ("GOOGLE_API_KEY", "google"),
        ]);
        assert_eq!(creds.api_key_for("gemini", "ACME"), Some("acme"));
        assert_eq!(creds.api_key_for("gemini", DEFAULT_NAMESPACE), Some("google"));
    }

    #[cfg(unix)]
    #[test]
    fn from_env_skips_non_utf8_values() {
        use std::ffi::OsString;
        use std::os::unix::ffi::OsStringExt;

        std::env::set_var(
            "DECKGEN_TEST_NON_UTF8_VALUE",
            OsString::from_vec(b"f\xffo".to_vec()),
        );
        std::env::set_var("DECKGEN_TEST_UTF8_VALUE", "fine");
        let creds = Credentials::from_env();
        std::env::remove_var("DECKGEN_TEST_NON_UTF8_VALUE");
        std::env::remove_var("DECKGEN_TEST_UTF8_VALUE");
        assert_eq!(creds.get("DECKGEN_TEST_NON_UTF8_VALUE"), None);
        assert_eq!(creds.get("DECKGEN_TEST_UTF8_VALUE"), Some("fine"));
    }

    #[test]
    fn api_base_trims_trailing_slash() {
        let creds = Credentials::from_pairs([("QWEN_API_BASE", "https://proxy.local/v1/")]);
        assert_eq!(
            creds.api_base_for("qwen").as_deref(),
            Some("https://proxy.local/v1")
        );
        assert_eq!(creds.api_base_for("doubao"), None);
    }

    #[test]
    fn service_config_defaults_and_overrides() {
        assert_eq!(
            ServiceConfig::from_credentials(&Credentials::default()),
            ServiceConfig::default()
        );

        let creds = Credentials::from_pairs([
            ("LAZYLLM_TEXT_SOURCE", "DeepSeek"),
            ("TEXT_MODEL", "deepseek-v3.2"),
            ("IMAGE_SOURCE", "doubao"),
            ("LAZYLLM_IMAGE_SOURCE", "qwen"),
            ("IMAGE_MODEL", "doubao-seedream-4-0-250828"),
            ("OUTPUT_LANGUAGE", "English"),
            ("THINKING_BUDGET", "oops"),
        ]);
        let config = ServiceConfig::from_credentials(&creds);
        assert_eq!(config.text, ModelChoice::new("deepseek", "deepseek-v3.2"));
        assert_eq!(config.image.source, "doubao");
        assert_eq!(config.image.model, "doubao-seedream-4-0-250828");
        assert_eq!(config.caption, ModelChoice::new("qwen", "qwen-vl-plus"));
        assert_eq!(config.language, "English");
        assert_eq!(config.thinking_budget, DEFAULT_THINKING_BUDGET);
    }

    #[test]
    fn source_override_without_model_drops_old_model() {
        let gemini = ModelChoice::new("gemini", "gemini-2.5-pro");
        let switched = gemini.overridden(Some("Doubao"), None);
        assert_eq!(switched, ModelChoice::new("doubao", ""));
        assert_eq!(switched.requested_model(), None);

        assert_eq!(gemini.overridden(Some("gemini"), None), gemini);
        assert_eq!(gemini.overridden(None, None), gemini);
        assert_eq!(
            gemini.overridden(None, Some("gemini-2.5-flash")),
            ModelChoice::new("gemini", "gemini-2.5-flash")
        );
        assert_eq!(
            gemini.overridden(Some("qwen"), Some("qwen-max")),
            ModelChoice::new("qwen", "qwen-max")
        );
        assert_eq!(
            gemini.overridden(Some("  "), None).requested_model(),
            Some("gemini-2.5-pro")
        );
    }

    #[test]
    fn env_source_without_model_leaves_model_to_source_default() {
        let config = ServiceConfig::from_credentials(&Credentials::from_pairs([
            ("TEXT_SOURCE", "qwen"),
            ("IMAGE_SOURCE", "doubao"),
        ]));
        assert_eq!(config.text, ModelChoice::new("qwen", ""));
        assert_eq!(config.image, ModelChoice::new("doubao", ""));
        assert_eq!(config.caption, ServiceConfig::default().caption);
    }
}
