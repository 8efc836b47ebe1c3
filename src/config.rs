// Runtime configuration passed from JS as JSON. Every field has a default,
// so `{}` yields the stock gallery.

use std::collections::HashSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::Level;

use crate::catalog::{default_catalog, EffectManifest};
use crate::error::EmbedError;
use crate::types::ControllerSettings;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedConfig {
    #[serde(default)]
    pub settings: ControllerSettings,
    /// One of `trace`, `debug`, `info`, `warn`, `error`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_catalog")]
    pub effects: Vec<EffectManifest>,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        EmbedConfig {
            settings: ControllerSettings::default(),
            log_level: default_log_level(),
            effects: default_catalog(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl EmbedConfig {
    pub fn from_json(json: &str) -> Result<Self, EmbedError> {
        let config: EmbedConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn level(&self) -> Result<Level, EmbedError> {
        Level::from_str(&self.log_level)
            .map_err(|_| EmbedError::InvalidConfig(format!("unknown log level \"{}\"", self.log_level)))
    }

    fn validate(&self) -> Result<(), EmbedError> {
        self.level()?;

        let mut seen = HashSet::new();
        for manifest in &self.effects {
            if !seen.insert(&manifest.id) {
                return Err(EmbedError::InvalidConfig(format!(
                    "effect \"{}\" listed twice",
                    manifest.id
                )));
            }
        }

        for (name, value) in [
            ("effect_attribute", &self.settings.effect_attribute),
            ("preview_selector", &self.settings.preview_selector),
            ("active_class", &self.settings.active_class),
        ] {
            if value.trim().is_empty() {
                return Err(EmbedError::InvalidConfig(format!("{name} must not be empty")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_gives_stock_gallery() {
        let config = EmbedConfig::from_json("{}").unwrap();
        assert_eq!(config.effects.len(), 13);
        assert_eq!(config.level().unwrap(), Level::INFO);
        assert_eq!(config.settings, ControllerSettings::default());
    }

    #[test]
    fn custom_effects_replace_catalog() {
        let config = EmbedConfig::from_json(
            r#"{"log_level":"debug","effects":[{"id":"hover-underline","styles":["effects/hover-underline/style.css"]}]}"#,
        )
        .unwrap();
        assert_eq!(config.effects.len(), 1);
        assert_eq!(config.level().unwrap(), Level::DEBUG);
    }

    #[test]
    fn rejects_unknown_log_level() {
        let err = EmbedConfig::from_json(r#"{"log_level":"loud"}"#).unwrap_err();
        assert!(matches!(err, EmbedError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_duplicate_effects() {
        let err = EmbedConfig::from_json(r#"{"effects":[{"id":"a"},{"id":"a"}]}"#).unwrap_err();
        assert!(err.to_string().contains("listed twice"));
    }

    #[test]
    fn rejects_blank_settings() {
        let err = EmbedConfig::from_json(r#"{"settings":{"active_class":" "}}"#).unwrap_err();
        assert!(matches!(err, EmbedError::InvalidConfig(_)));
    }

    #[test]
    fn malformed_json_is_serialization_error() {
        let err = EmbedConfig::from_json("{").unwrap_err();
        assert!(matches!(err, EmbedError::Serialization(_)));
    }
}
