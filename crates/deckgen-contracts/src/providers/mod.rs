use crate::resolution::ResolutionStrategy;

pub trait NamedProvider {
    fn name(&self) -> &str;
}

#[derive(Debug, Clone)]
pub struct ProviderRegistry<T: NamedProvider> {
    providers: Vec<T>,
}

impl<T: NamedProvider> ProviderRegistry<T> {
    pub fn new(providers: Vec<T>) -> Self {
        Self { providers }
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        let wanted = name.trim();
        self.providers
            .iter()
            .find(|provider| provider.name().eq_ignore_ascii_case(wanted))
    }

    pub fn list(&self) -> Vec<String> {
        let mut names = self
            .providers
            .iter()
            .map(|provider| provider.name().to_string())
            .collect::<Vec<String>>();
        names.sort();
        names
    }

    pub fn providers(&self) -> &[T] {
        self.providers.as_slice()
    }
}

/// A vendor reachable through an OpenAI-compatible HTTP API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewaySource {
    pub name: String,
    pub api_base: String,
    pub resolution_strategy: ResolutionStrategy,
}

impl GatewaySource {
    pub fn new(name: &str, api_base: &str) -> Self {
        Self {
            name: name.to_string(),
            api_base: api_base.to_string(),
            resolution_strategy: ResolutionStrategy::for_source(name),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_resolution_strategy(mut self, strategy: ResolutionStrategy) -> Self {
        self.resolution_strategy = strategy;
        self
    }
}

impl NamedProvider for GatewaySource {
    fn name(&self) -> &str {
        self.name.as_str()
    }
}

pub type GatewaySourceRegistry = ProviderRegistry<GatewaySource>;

pub fn default_gateway_sources() -> GatewaySourceRegistry {
    ProviderRegistry::new(vec![
        GatewaySource::new("qwen", "https://dashscope.aliyuncs.com/compatible-mode/v1"),
        GatewaySource::new("doubao", "https://ark.cn-beijing.volces.com/api/v3"),
        GatewaySource::new("deepseek", "https://api.deepseek.com/v1"),
        GatewaySource::new("glm", "https://open.bigmodel.cn/api/paas/v4"),
        GatewaySource::new("siliconflow", "https://api.siliconflow.cn/v1"),
        GatewaySource::new("minimax", "https://api.minimax.chat/v1"),
        GatewaySource::new("sensenova", "https://api.sensenova.cn/compatible-mode/v1"),
    ])
}

#[cfg(test)]
mod tests {
    use super::{default_gateway_sources, GatewaySource, NamedProvider, ProviderRegistry};
    use crate::resolution::ResolutionStrategy;

    #[derive(Clone, Debug)]
    struct DummyProvider {
        name: String,
    }

    impl NamedProvider for DummyProvider {
        fn name(&self) -> &str {
            self.name.as_str()
        }
    }

    #[test]
    fn registry_lists_sorted_but_keeps_insertion_order() {
        let registry = ProviderRegistry::new(vec![
            DummyProvider {
                name: "z".to_string(),
            },
            DummyProvider {
                name: "a".to_string(),
            },
            DummyProvider {
                name: "m".to_string(),
            },
        ]);
        assert_eq!(registry.list(), vec!["a", "m", "z"]);
        assert_eq!(
            registry
                .providers()
                .iter()
                .map(|provider| provider.name().to_string())
                .collect::<Vec<String>>(),
            vec!["z", "a", "m"]
        );
    }

    #[test]
    fn gateway_lookup_is_case_insensitive() {
        let sources = default_gateway_sources();
        let doubao = sources.get(" Doubao ").cloned();
        assert_eq!(
            doubao.map(|source| source.resolution_strategy),
            Some(ResolutionStrategy::RatioComputed)
        );
        assert_eq!(
            sources.get("qwen").map(|source| source.resolution_strategy),
            Some(ResolutionStrategy::FixedLookup)
        );
        assert!(sources.get("gemini").is_none());
    }

    #[test]
    fn overrides_replace_base_and_strategy() {
        let source = GatewaySource::new("qwen", "https://a")
            .with_api_base("https://b")
            .with_resolution_strategy(ResolutionStrategy::RatioComputed);
        assert_eq!(source.api_base, "https://b");
        assert_eq!(source.resolution_strategy, ResolutionStrategy::RatioComputed);
    }
}
