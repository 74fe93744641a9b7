//! Configuration for the graph database, the language model and retrieval
//!
//! Loads configuration from config.yml; `.env` is read first and
//! environment variables take precedence over `${VAR}` placeholders.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::graph::assembler::DEFAULT_TOP_K;
use crate::graph::embeddings::DEFAULT_EMBEDDING_MODEL;
use crate::orchestrator::BundlePolicy;
use crate::{Error, Result};

/// Default constants (fallback if config.yml not found)
pub const DEFAULT_NEO4J_URI: &str = "bolt://localhost:7687";
pub const DEFAULT_NEO4J_USER: &str = "neo4j";
pub const DEFAULT_VECTOR_INDEX: &str = "content_index";
pub const DEFAULT_FULLTEXT_INDEX: &str = "fulltext-index";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_MAX_TOKENS: u32 = 800;
pub const DEFAULT_TEMPERATURE: f32 = 0.2;

/// YAML config structures
#[derive(Debug, Default, Deserialize)]
struct YamlConfig {
    neo4j: Option<YamlNeo4j>,
    openai: Option<YamlOpenAI>,
    retrieval: Option<YamlRetrieval>,
    history: Option<YamlHistory>,
}

#[derive(Debug, Default, Deserialize)]
struct YamlNeo4j {
    uri: Option<String>,
    user: Option<String>,
    password: Option<String>,
    vector_index: Option<String>,
    fulltext_index: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct YamlOpenAI {
    model: Option<String>,
    embedding_model: Option<String>,
    base_url: Option<String>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct YamlRetrieval {
    top_k: Option<usize>,
    bundle_policy: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct YamlHistory {
    path: Option<String>,
}

/// Neo4j connection and index names.
#[derive(Debug, Clone, PartialEq)]
pub struct Neo4jSettings {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub vector_index: String,
    pub fulltext_index: String,
}

impl Default for Neo4jSettings {
    fn default() -> Self {
        Self {
            uri: DEFAULT_NEO4J_URI.to_string(),
            user: DEFAULT_NEO4J_USER.to_string(),
            password: String::new(),
            vector_index: DEFAULT_VECTOR_INDEX.to_string(),
            fulltext_index: DEFAULT_FULLTEXT_INDEX.to_string(),
        }
    }
}

/// Chat and embedding model settings.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenAISettings {
    pub model: String,
    pub embedding_model: String,
    pub base_url: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for OpenAISettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_CHAT_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            base_url: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

/// Retrieval behaviour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalSettings {
    pub top_k: usize,
    pub bundle_policy: BundlePolicy,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            bundle_policy: BundlePolicy::Always,
        }
    }
}

/// Main configuration struct
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub neo4j: Neo4jSettings,
    pub openai: OpenAISettings,
    pub retrieval: RetrievalSettings,
    /// JSON snapshot of the conversation registry, if persistence is on.
    pub history_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from config.yml or use defaults
    pub fn new() -> Self {
        Self::load_dotenv();
        for path in ["config.yml", "../config.yml"] {
            if !Path::new(path).exists() {
                continue;
            }
            match Self::load_from_file(path) {
                Ok(config) => return config,
                Err(err) => warn!(path, "Ignoring invalid config file: {}", err),
            }
        }
        Self::from_yaml(YamlConfig::default()).unwrap_or_default()
    }

    /// Resolve a value: prefer env var if config value looks like ${VAR}
    fn resolve_env_string(value: Option<String>, env_key: &str) -> Option<String> {
        if let Some(ref v) = value {
            if let Some(var_name) = v.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
                if let Ok(env_val) = std::env::var(var_name) {
                    return Some(env_val);
                }
            }
        }
        if let Ok(env_val) = std::env::var(env_key) {
            return Some(env_val);
        }
        value.filter(|v| !v.starts_with("${"))
    }

    /// Load .env file into environment variables using dotenvy
    fn load_dotenv() {
        if dotenvy::dotenv().is_err() {
            let _ = dotenvy::from_filename("../.env");
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_dotenv();

        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        let yaml: YamlConfig = serde_yaml::from_str(&content)?;
        Self::from_yaml(yaml)
    }

    fn from_yaml(yaml: YamlConfig) -> Result<Self> {
        let neo4j = yaml.neo4j.unwrap_or_default();
        let openai = yaml.openai.unwrap_or_default();
        let retrieval = yaml.retrieval.unwrap_or_default();
        let history = yaml.history.unwrap_or_default();

        let bundle_policy = match retrieval.bundle_policy.as_deref() {
            Some(policy) => policy
                .parse::<BundlePolicy>()
                .map_err(|e| Error::ConfigError(format!("retrieval.bundle_policy: {}", e)))?,
            None => BundlePolicy::default(),
        };

        Ok(Self {
            neo4j: Neo4jSettings {
                uri: Self::resolve_env_string(neo4j.uri, "NEO4J_URI")
                    .unwrap_or_else(|| DEFAULT_NEO4J_URI.to_string()),
                user: Self::resolve_env_string(neo4j.user, "NEO4J_USER")
                    .unwrap_or_else(|| DEFAULT_NEO4J_USER.to_string()),
                password: Self::resolve_env_string(neo4j.password, "NEO4J_PASSWORD")
                    .unwrap_or_default(),
                vector_index: neo4j
                    .vector_index
                    .unwrap_or_else(|| DEFAULT_VECTOR_INDEX.to_string()),
                fulltext_index: neo4j
                    .fulltext_index
                    .unwrap_or_else(|| DEFAULT_FULLTEXT_INDEX.to_string()),
            },
            openai: OpenAISettings {
                model: openai
                    .model
                    .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
                embedding_model: openai
                    .embedding_model
                    .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
                base_url: Self::resolve_env_string(openai.base_url, "OPENAI_BASE_URL"),
                max_tokens: openai.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
                temperature: openai.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            },
            retrieval: RetrievalSettings {
                top_k: retrieval.top_k.filter(|k| *k > 0).unwrap_or(DEFAULT_TOP_K),
                bundle_policy,
            },
            history_path: history.path.map(PathBuf::from),
        })
    }
}
