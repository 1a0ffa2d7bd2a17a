//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Stratum configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub llm: LlmConfig,
    pub communities: CommunityConfig,
    pub drift: DriftConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(skip)]
    pub api_key: Option<String>,
    pub default_model: String,
    pub embedding_model: String,
    /// Sampling temperature of community summarization calls
    pub temperature: f32,
    pub max_tokens: usize,
    pub timeout_secs: u64,
}

/// Settings for community detection, incremental assignment and summarisation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunityConfig {
    /// Clustering resolutions, finest first. Each entry produces one level.
    pub resolutions: Vec<f64>,
    /// Clusters with fewer members are never persisted
    pub min_community_size: usize,
    /// How many stale communities one summarisation pass refreshes
    pub summary_batch_size: usize,
}

/// Settings for the DRIFT search engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftConfig {
    /// Communities retrieved by the HyDE vector search
    pub top_k: usize,
    /// Follow-up depth bound (0 disables follow-ups)
    pub max_depth: usize,
    /// Questions promoted into each follow-up depth
    pub per_step_cap: usize,
    /// Global bound on phase transitions for a single search
    pub hop_ceiling: u32,
    /// Matched communities whose members feed follow-up answers
    pub local_context_communities: usize,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_model: "anthropic/claude-sonnet-4-20250514".to_string(),
            embedding_model: "openai/text-embedding-3-small".to_string(),
            temperature: 0.2,
            max_tokens: 4096,
            timeout_secs: 120,
        }
    }
}

impl Default for CommunityConfig {
    fn default() -> Self {
        Self {
            resolutions: vec![1.0, 0.5, 0.25],
            min_community_size: 3,
            summary_batch_size: 25,
        }
    }
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            max_depth: 2,
            per_step_cap: 3,
            hop_ceiling: 20,
            local_context_communities: 3,
            temperature: 0.2,
        }
    }
}

impl LlmConfig {
    pub fn resolved_api_key(&self) -> anyhow::Result<Option<String>> {
        self.enforce_env_only()?;

        Ok(env::var("STRATUM_API_KEY")
            .or_else(|_| env::var("OPENROUTER_API_KEY"))
            .ok())
    }

    pub fn enforce_env_only(&self) -> anyhow::Result<()> {
        if self.api_key.is_some() {
            return Err(anyhow!(
                "LLM API keys must be provided via environment variables, not stored in configuration"
            ));
        }
        Ok(())
    }
}

impl CommunityConfig {
    /// Resolutions ordered finest (largest) to coarsest, duplicates removed
    pub fn ordered_resolutions(&self) -> Vec<f64> {
        let mut resolutions: Vec<f64> = self
            .resolutions
            .iter()
            .copied()
            .filter(|r| r.is_finite() && *r > 0.0)
            .collect();
        resolutions.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
        resolutions.dedup();
        resolutions
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("STRATUM_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("stratum")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from the default location, or defaults if absent
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from a specific file, or defaults if absent
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        self.validate()?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.llm.enforce_env_only()?;

        if self.communities.ordered_resolutions().is_empty() {
            return Err(anyhow!("At least one positive clustering resolution is required"));
        }
        if self.communities.min_community_size == 0 {
            return Err(anyhow!("communities.min_community_size must be at least 1"));
        }
        if self.drift.top_k == 0 {
            return Err(anyhow!("drift.top_k must be at least 1"));
        }
        if self.drift.hop_ceiling == 0 {
            return Err(anyhow!("drift.hop_ceiling must be at least 1"));
        }
        Ok(())
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            "llm.default_model" => Ok(self.llm.default_model.clone()),
            "llm.embedding_model" => Ok(self.llm.embedding_model.clone()),
            "llm.temperature" => Ok(self.llm.temperature.to_string()),
            "llm.max_tokens" => Ok(self.llm.max_tokens.to_string()),
            "llm.timeout_secs" => Ok(self.llm.timeout_secs.to_string()),

            "communities.resolutions" => Ok(self
                .communities
                .resolutions
                .iter()
                .map(|r| r.to_string())
                .collect::<Vec<_>>()
                .join(", ")),
            "communities.min_community_size" => Ok(self.communities.min_community_size.to_string()),
            "communities.summary_batch_size" => Ok(self.communities.summary_batch_size.to_string()),

            "drift.top_k" => Ok(self.drift.top_k.to_string()),
            "drift.max_depth" => Ok(self.drift.max_depth.to_string()),
            "drift.per_step_cap" => Ok(self.drift.per_step_cap.to_string()),
            "drift.hop_ceiling" => Ok(self.drift.hop_ceiling.to_string()),
            "drift.local_context_communities" => {
                Ok(self.drift.local_context_communities.to_string())
            }
            "drift.temperature" => Ok(self.drift.temperature.to_string()),

            "llm.api_key" | "api_key" => match self.llm.resolved_api_key()? {
                Some(key) => Ok(mask_api_key(&key)),
                None => Ok("(not set - use STRATUM_API_KEY or OPENROUTER_API_KEY env var)".to_string()),
            },

            _ => Err(anyhow!("Unknown configuration key: {}", key)),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "llm.default_model" => self.llm.default_model = value.to_string(),
            "llm.embedding_model" => self.llm.embedding_model = value.to_string(),
            "llm.temperature" => self.llm.temperature = parse_temperature(value)?,
            "llm.max_tokens" => {
                self.llm.max_tokens = value
                    .parse()
                    .with_context(|| format!("Invalid max_tokens value: {}", value))?;
            }
            "llm.timeout_secs" => {
                self.llm.timeout_secs = value
                    .parse()
                    .with_context(|| format!("Invalid timeout_secs value: {}", value))?;
            }

            "communities.resolutions" => {
                let resolutions = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| {
                        s.parse::<f64>()
                            .with_context(|| format!("Invalid resolution value: {}", s))
                    })
                    .collect::<anyhow::Result<Vec<f64>>>()?;
                if resolutions.iter().any(|r| !r.is_finite() || *r <= 0.0) {
                    return Err(anyhow!("Resolutions must be positive numbers"));
                }
                if resolutions.is_empty() {
                    return Err(anyhow!("At least one resolution is required"));
                }
                self.communities.resolutions = resolutions;
            }
            "communities.min_community_size" => {
                let size: usize = value
                    .parse()
                    .with_context(|| format!("Invalid min_community_size value: {}", value))?;
                if size == 0 {
                    return Err(anyhow!("min_community_size must be at least 1"));
                }
                self.communities.min_community_size = size;
            }
            "communities.summary_batch_size" => {
                self.communities.summary_batch_size = value
                    .parse()
                    .with_context(|| format!("Invalid summary_batch_size value: {}", value))?;
            }

            "drift.top_k" => {
                let top_k: usize = value
                    .parse()
                    .with_context(|| format!("Invalid top_k value: {}", value))?;
                if top_k == 0 {
                    return Err(anyhow!("top_k must be at least 1"));
                }
                self.drift.top_k = top_k;
            }
            "drift.max_depth" => {
                self.drift.max_depth = value
                    .parse()
                    .with_context(|| format!("Invalid max_depth value: {}", value))?;
            }
            "drift.per_step_cap" => {
                self.drift.per_step_cap = value
                    .parse()
                    .with_context(|| format!("Invalid per_step_cap value: {}", value))?;
            }
            "drift.hop_ceiling" => {
                let ceiling: u32 = value
                    .parse()
                    .with_context(|| format!("Invalid hop_ceiling value: {}", value))?;
                if ceiling == 0 {
                    return Err(anyhow!("hop_ceiling must be at least 1"));
                }
                self.drift.hop_ceiling = ceiling;
            }
            "drift.local_context_communities" => {
                self.drift.local_context_communities = value.parse().with_context(|| {
                    format!("Invalid local_context_communities value: {}", value)
                })?;
            }
            "drift.temperature" => self.drift.temperature = parse_temperature(value)?,

            "llm.api_key" | "api_key" => {
                return Err(anyhow!(
                    "API keys cannot be stored in configuration for security. \
                     Set the STRATUM_API_KEY or OPENROUTER_API_KEY environment variable instead."
                ));
            }

            _ => return Err(anyhow!("Unknown configuration key: {}", key)),
        }
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        let keys = [
            "llm.default_model",
            "llm.embedding_model",
            "llm.temperature",
            "llm.max_tokens",
            "llm.timeout_secs",
            "llm.api_key",
            "communities.resolutions",
            "communities.min_community_size",
            "communities.summary_batch_size",
            "drift.top_k",
            "drift.max_depth",
            "drift.per_step_cap",
            "drift.hop_ceiling",
            "drift.local_context_communities",
            "drift.temperature",
        ];

        keys.into_iter()
            .map(|key| Ok((key.to_string(), self.get(key)?)))
            .collect()
    }

    /// Reset configuration to defaults
    pub fn reset() -> anyhow::Result<()> {
        let path = Self::config_path()?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove config file: {}", path.display()))?;
        }
        Ok(())
    }
}

/// Show only the last four characters of a key
fn mask_api_key(key: &str) -> String {
    let count = key.chars().count();
    if count <= 4 {
        return "***".to_string();
    }
    let tail: String = key.chars().skip(count - 4).collect();
    format!("***{}", tail)
}

fn parse_temperature(value: &str) -> anyhow::Result<f32> {
    let temp: f32 = value
        .parse()
        .with_context(|| format!("Invalid temperature value: {}", value))?;
    if !(0.0..=2.0).contains(&temp) {
        return Err(anyhow!("Temperature must be between 0.0 and 2.0"));
    }
    Ok(temp)
}
