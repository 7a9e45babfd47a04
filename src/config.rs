use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_MAX_TOKENS: u32 = 4096;

pub const ENV_API_KEY: &str = "ANTHROPIC_API_KEY";
pub const ENV_USE_VERTEX: &str = "ANTHROPIC_USE_VERTEX";
pub const ENV_VERTEX_PROJECT: &str = "GOOGLE_CLOUD_PROJECT";
pub const ENV_VERTEX_LOCATION: &str = "GOOGLE_CLOUD_LOCATION";

/// Error type for configuration loading
#[derive(Debug)]
pub enum ConfigError {
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
    MissingValue {
        field: &'static str,
        env: &'static str,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError { path, source } => {
                write!(
                    f,
                    "Failed to read config file {}: {}",
                    path.display(),
                    source
                )
            }
            ConfigError::ParseError { path, source } => {
                write!(f, "Invalid TOML syntax in {}: {}", path.display(), source)
            }
            ConfigError::MissingValue { field, env } => {
                write!(
                    f,
                    "Missing '{}' for Vertex AI (set it in the config file or via {})",
                    field, env
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::ReadError { source, .. } => Some(source),
            ConfigError::ParseError { source, .. } => Some(source),
            ConfigError::MissingValue { .. } => None,
        }
    }
}

/// Which deployment of the Messages API the model talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    #[default]
    AnthropicApi,
    VertexAi,
}

impl Variant {
    /// Interpret an `ANTHROPIC_USE_VERTEX` value.
    pub fn from_flag(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Variant::VertexAi,
            _ => Variant::AnthropicApi,
        }
    }

    /// Whether the native JSON-schema output surface is available.
    pub fn supports_structured_output(self) -> bool {
        self == Variant::AnthropicApi
    }
}

/// Model settings, typically loaded from a TOML file.
///
/// Unset fields are filled from the environment by [`ModelConfig::resolve`].
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ModelConfig {
    #[serde(default)]
    pub variant: Option<Variant>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub vertex_project_id: Option<String>,
    #[serde(default)]
    pub vertex_location: Option<String>,
    #[serde(default)]
    pub default_max_tokens: Option<u32>,
}

/// Fully resolved settings handed to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub variant: Variant,
    pub api_key: Option<String>,
    pub vertex_project_id: Option<String>,
    pub vertex_location: Option<String>,
    pub default_max_tokens: u32,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            variant: Variant::AnthropicApi,
            api_key: None,
            vertex_project_id: None,
            vertex_location: None,
            default_max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

impl ModelConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Apply CLI overrides
    pub fn with_overrides(mut self, variant: Option<Variant>, max_tokens: Option<u32>) -> Self {
        if let Some(v) = variant {
            self.variant = Some(v);
        }
        if let Some(n) = max_tokens {
            self.default_max_tokens = Some(n);
        }
        self
    }

    pub fn resolve(&self) -> Result<ResolvedConfig, ConfigError> {
        self.resolve_with(|key| std::env::var(key).ok())
    }

    /// Resolve against an arbitrary variable lookup. Empty values count as unset.
    pub fn resolve_with<F>(&self, lookup: F) -> Result<ResolvedConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let pick = |value: &Option<String>, key: &str| {
            value.clone().filter(|v| !v.is_empty()).or_else(|| env(key))
        };

        let variant = self
            .variant
            .or_else(|| env(ENV_USE_VERTEX).map(|v| Variant::from_flag(&v)))
            .unwrap_or_default();

        let resolved = ResolvedConfig {
            variant,
            api_key: pick(&self.api_key, ENV_API_KEY),
            vertex_project_id: pick(&self.vertex_project_id, ENV_VERTEX_PROJECT),
            vertex_location: pick(&self.vertex_location, ENV_VERTEX_LOCATION),
            default_max_tokens: self
                .default_max_tokens
                .filter(|&n| n > 0)
                .unwrap_or(DEFAULT_MAX_TOKENS),
        };

        if variant == Variant::VertexAi {
            if resolved.vertex_project_id.is_none() {
                return Err(ConfigError::MissingValue {
                    field: "vertex_project_id",
                    env: ENV_VERTEX_PROJECT,
                });
            }
            if resolved.vertex_location.is_none() {
                return Err(ConfigError::MissingValue {
                    field: "vertex_location",
                    env: ENV_VERTEX_LOCATION,
                });
            }
        }

        Ok(resolved)
    }
}
