//! Compiler configuration.
//!
//! Every field has a default matching the form-view vocabulary, so an empty
//! JSON object is a valid configuration.

use crate::errors::{ArchError, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

static DEFAULT_CONFIG: Lazy<NormalizeConfig> = Lazy::new(NormalizeConfig::default);

/// How synthetic names for unnamed container nodes are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyntheticNames {
    /// UUID v5 derived from the new arch and an ordinal; stable across runs.
    Deterministic,
    /// UUID v4.
    Random,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NormalizeConfig {
    /// Structural tags that receive a synthetic name when added unnamed
    /// next to a same-tag sibling.
    pub container_tags: Vec<String>,
    /// Tags whose `name` attribute is technical and never identifies the
    /// node on its own.
    pub non_identifying_name_tags: Vec<String>,
    /// Tags eligible for move detection.
    pub moveable_tags: Vec<String>,
    pub synthetic_name_prefix: String,
    pub synthetic_names: SyntheticNames,
    /// Spaces per nesting level in the serialized patch.
    pub indent: usize,
    /// Check every generated xpath and the replayed result.
    pub verify: bool,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            container_tags: ["group", "page", "sheet", "div", "ul", "li", "notebook"]
                .iter()
                .map(|t| t.to_string())
                .collect(),
            non_identifying_name_tags: vec!["button".to_string()],
            moveable_tags: vec!["field".to_string()],
            synthetic_name_prefix: "studio_".to_string(),
            synthetic_names: SyntheticNames::Deterministic,
            indent: 2,
            verify: true,
        }
    }
}

impl NormalizeConfig {
    /// Shared default configuration.
    pub fn shared() -> &'static NormalizeConfig {
        &DEFAULT_CONFIG
    }

    /// Load a configuration from JSON, filling missing fields with defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: NormalizeConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.synthetic_name_prefix.is_empty() {
            return Err(ArchError::Config(
                "synthetic_name_prefix must not be empty".to_string(),
            ));
        }
        if let Some(bad) = self
            .synthetic_name_prefix
            .chars()
            .find(|c| *c == '\'' || *c == '"' || c.is_whitespace())
        {
            return Err(ArchError::Config(format!(
                "synthetic_name_prefix contains {bad:?}"
            )));
        }
        if let Some(tag) = self.moveable_tags.iter().find(|t| t.is_empty()) {
            return Err(ArchError::Config(format!("empty moveable tag {tag:?}")));
        }
        Ok(())
    }

    pub fn is_container(&self, tag: &str) -> bool {
        self.container_tags.iter().any(|t| t == tag)
    }

    pub fn has_identifying_name(&self, tag: &str) -> bool {
        !self.non_identifying_name_tags.iter().any(|t| t == tag)
    }

    pub fn is_moveable(&self, tag: &str) -> bool {
        self.moveable_tags.iter().any(|t| t == tag)
    }
}
