use super::registry::{ModelRegistry, ModelSpec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model: ModelSpec,
    pub requested: Option<String>,
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ModelSelector {
    pub registry: ModelRegistry,
}

impl ModelSelector {
    pub fn new(registry: Option<ModelRegistry>) -> Self {
        Self {
            registry: registry.unwrap_or_default(),
        }
    }

    /// Picks the model for `source`. Gateways accept models the registry
    /// does not know about, so an unknown request passes through with a note.
    pub fn select(
        &self,
        source: &str,
        requested: Option<&str>,
        capability: &str,
    ) -> Result<ModelSelection, String> {
        let requested = requested.map(str::trim).filter(|value| !value.is_empty());
        if let Some(requested_value) = requested {
            if let Some(model) = self.registry.ensure(requested_value, capability) {
                let fallback_reason = (model.source != source).then(|| {
                    format!(
                        "Model '{requested_value}' is registered for source '{}', not '{source}'.",
                        model.source
                    )
                });
                return Ok(ModelSelection {
                    model,
                    requested: Some(requested_value.to_string()),
                    fallback_reason,
                });
            }
            return Ok(ModelSelection {
                model: ModelSpec::new(requested_value, source, &[capability]),
                requested: Some(requested_value.to_string()),
                fallback_reason: Some(format!(
                    "Model '{requested_value}' is not registered for capability '{capability}'; passing it through."
                )),
            });
        }

        let candidates = self.registry.by_source_and_capability(source, capability);
        let Some(model) = candidates.first().cloned() else {
            return Err(format!(
                "No models available for source '{source}' and capability '{capability}'."
            ));
        };
        Ok(ModelSelection {
            model,
            requested: None,
            fallback_reason: Some("No model specified; using default.".to_string()),
        })
    }
}
