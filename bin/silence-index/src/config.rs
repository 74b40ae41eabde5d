// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use steel::{OllamaConfig, QdrantConfig};
use stele::ResolverConfig;
use tally::StoreConfig;

pub const DEFAULT_CONFIG_PATH: &str = "config/silence-index.toml";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Json,
    Qdrant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSection {
    pub kind: SourceKind,
    /// JSON array or JSONL file, used when `kind = "json"`.
    pub path: PathBuf,
    pub qdrant: QdrantConfig,
}

impl Default for SourceSection {
    fn default() -> Self {
        Self {
            kind: SourceKind::Json,
            path: PathBuf::from("data/complaints.json"),
            qdrant: QdrantConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// Disabled means every spec comes from the keyword parsers.
    pub enabled: bool,
    pub ollama: OllamaConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSection {
    /// Uses the `[llm.ollama]` endpoint and its `embedding_model`.
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub source: SourceSection,
    pub llm: LlmSection,
    pub embedding: EmbeddingSection,
    pub resolver: ResolverConfig,
}

impl AppConfig {
    pub fn load_from_file(config_path: &Path) -> Result<Self> {
        let content = fs::read_to_string(config_path)
            .with_context(|| format!("reading config {}", config_path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config {}", config_path.display()))
    }

    /// Explicit path, else the default path when it exists, else built-in defaults.
    /// `SILENCE_*` environment variables are applied on top.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut config = match config_path {
            Some(path) => Self::load_from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::load_from_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(kind) = lookup("SILENCE_SOURCE") {
            self.source.kind = match kind.trim().to_ascii_lowercase().as_str() {
                "json" => SourceKind::Json,
                "qdrant" => SourceKind::Qdrant,
                other => bail!("SILENCE_SOURCE must be json or qdrant, got '{other}'"),
            };
        }
        if let Some(path) = lookup("SILENCE_DATA_PATH") {
            self.source.path = PathBuf::from(path);
        }
        if let Some(url) = lookup("SILENCE_QDRANT_URL") {
            self.source.qdrant.url = url;
        }
        if let Some(collection) = lookup("SILENCE_QDRANT_COLLECTION") {
            self.source.qdrant.collection = collection;
        }
        if let Some(key) = lookup("SILENCE_QDRANT_API_KEY") {
            self.source.qdrant.api_key = Some(key);
        }
        if let Some(enabled) = lookup("SILENCE_LLM_ENABLED") {
            self.llm.enabled = parse_flag("SILENCE_LLM_ENABLED", &enabled)?;
        }
        if let Some(url) = lookup("SILENCE_OLLAMA_URL") {
            self.llm.ollama.base_url = url;
        }
        if let Some(model) = lookup("SILENCE_LLM_MODEL") {
            self.llm.ollama.model = model;
        }
        if let Some(model) = lookup("SILENCE_EMBEDDING_MODEL") {
            self.llm.ollama.embedding_model = model;
        }
        if let Some(enabled) = lookup("SILENCE_EMBEDDING_ENABLED") {
            self.embedding.enabled = parse_flag("SILENCE_EMBEDDING_ENABLED", &enabled)?;
        }
        if let Some(ttl) = lookup("SILENCE_CACHE_TTL_SECS") {
            let secs: u64 = ttl
                .trim()
                .parse()
                .with_context(|| format!("SILENCE_CACHE_TTL_SECS is not a number: '{ttl}'"))?;
            self.store.ttl = Duration::from_secs(secs);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.store.ttl.is_zero() {
            bail!("store.ttl must be at least one second");
        }
        if self.store.max_pages == 0 {
            bail!("store.max_pages must be positive");
        }
        match self.source.kind {
            SourceKind::Json if self.source.path.as_os_str().is_empty() => {
                bail!("source.path is required for a json source")
            }
            SourceKind::Qdrant if self.source.qdrant.url.trim().is_empty() => {
                bail!("source.qdrant.url is required for a qdrant source")
            }
            SourceKind::Qdrant if self.source.qdrant.collection.trim().is_empty() => {
                bail!("source.qdrant.collection is required for a qdrant source")
            }
            _ => {}
        }
        if self.resolver.default_chart_field.trim().is_empty() {
            bail!("resolver.default_chart_field must not be empty");
        }
        Ok(())
    }
}

fn parse_flag(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("{name} must be a boolean, got '{other}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tally::Field;

    #[test]
    fn parses_sections_and_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[store]
ttl = 120

[source]
kind = "qdrant"

[source.qdrant]
url = "http://qdrant:6333"

[llm]
enabled = true

[llm.ollama]
model = "mistral"

[resolver]
default_breakdown_field = "ward_type"
"#
        )
        .unwrap();

        let config = AppConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.store.ttl, Duration::from_secs(120));
        assert_eq!(config.store.max_pages, 10_000);
        assert_eq!(config.source.kind, SourceKind::Qdrant);
        assert_eq!(config.source.qdrant.url, "http://qdrant:6333");
        assert_eq!(config.source.qdrant.collection, "silence_complaints");
        assert!(config.llm.enabled);
        assert_eq!(config.llm.ollama.model, "mistral");
        assert_eq!(config.llm.ollama.embedding_model, "nomic-embed-text");
        assert_eq!(config.resolver.default_breakdown_field, Field::WardType);
        assert_eq!(config.resolver.default_chart_field, "gender");
        assert!(!config.embedding.enabled);
        config.validate().unwrap();
    }

    #[test]
    fn environment_overrides_apply() {
        let env: HashMap<&str, &str> = [
            ("SILENCE_SOURCE", "qdrant"),
            ("SILENCE_QDRANT_URL", "http://elsewhere:6333"),
            ("SILENCE_LLM_ENABLED", "yes"),
            ("SILENCE_LLM_MODEL", "llama3.1"),
            ("SILENCE_CACHE_TTL_SECS", "5"),
        ]
        .into_iter()
        .collect();
        let mut config = AppConfig::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.source.kind, SourceKind::Qdrant);
        assert_eq!(config.source.qdrant.url, "http://elsewhere:6333");
        assert!(config.llm.enabled);
        assert_eq!(config.llm.ollama.model, "llama3.1");
        assert_eq!(config.store.ttl, Duration::from_secs(5));
    }

    #[test]
    fn bad_overrides_are_rejected() {
        let mut config = AppConfig::default();
        assert!(config
            .apply_overrides(|key| (key == "SILENCE_SOURCE").then(|| "postgres".to_string()))
            .is_err());
        assert!(config
            .apply_overrides(|key| (key == "SILENCE_LLM_ENABLED").then(|| "maybe".to_string()))
            .is_err());
    }

    #[test]
    fn validation_catches_empty_settings() {
        let mut config = AppConfig::default();
        config.store.ttl = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.source.kind = SourceKind::Qdrant;
        config.source.qdrant.collection = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(AppConfig::load_from_file(Path::new("/nonexistent/silence.toml")).is_err());
    }
}
