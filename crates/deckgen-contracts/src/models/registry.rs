use indexmap::IndexMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub source: String,
    pub capabilities: Vec<String>,
}

impl ModelSpec {
    pub fn new(name: &str, source: &str, capabilities: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            source: source.to_string(),
            capabilities: capabilities
                .iter()
                .map(|item| (*item).to_string())
                .collect(),
        }
    }

    pub fn supports(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|item| item == capability)
    }
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name)
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    pub fn by_capability(&self, capability: &str) -> Vec<ModelSpec> {
        self.models
            .values()
            .filter(|model| model.supports(capability))
            .cloned()
            .collect()
    }

    pub fn by_source_and_capability(&self, source: &str, capability: &str) -> Vec<ModelSpec> {
        self.models
            .values()
            .filter(|model| model.source == source && model.supports(capability))
            .cloned()
            .collect()
    }

    pub fn ensure(&self, name: &str, capability: &str) -> Option<ModelSpec> {
        let model = self.get(name)?;
        if model.supports(capability) {
            return Some(model.clone());
        }
        None
    }
}

fn default_models() -> IndexMap<String, ModelSpec> {
    let mut map = IndexMap::new();

    let mut insert = |name: &str, source: &str, capabilities: &[&str]| {
        map.insert(name.to_string(), ModelSpec::new(name, source, capabilities));
    };

    insert("gemini-2.5-pro", "gemini", &["text"]);
    insert("gemini-2.5-flash", "gemini", &["text", "vision"]);
    insert("gemini-3-pro-image-preview", "gemini", &["image"]);
    insert("gemini-2.5-flash-image", "gemini", &["image"]);
    insert("dryrun-image-1", "dryrun", &["image"]);
    insert("qwen-plus", "qwen", &["text"]);
    insert("qwen-max", "qwen", &["text"]);
    insert("qwen-turbo", "qwen", &["text"]);
    insert("qwen-vl-plus", "qwen", &["vision"]);
    insert("qwen-image-edit", "qwen", &["image"]);
    insert("qwen-image-edit-plus", "qwen", &["image"]);
    insert("qwen-image-edit-plus-2025-10-30", "qwen", &["image"]);
    insert("doubao-seedream-4-0-250828", "doubao", &["image"]);
    insert("doubao-seedream-4.5", "doubao", &["image"]);
    insert("doubao-seededit-3-0-i2i-250628", "doubao", &["image"]);
    insert("doubao-pro-128k", "doubao", &["text"]);
    insert("doubao-lite-128k", "doubao", &["text"]);
    insert("deepseek-v3-1-terminus", "deepseek", &["text"]);
    insert("deepseek-v3.2", "deepseek", &["text"]);
    insert("deepseek-v3", "deepseek", &["text"]);
    insert("glm-4-plus", "glm", &["text"]);
    insert("glm-4", "glm", &["text"]);
    insert("glm-4v-plus", "glm", &["vision"]);

    map
}
