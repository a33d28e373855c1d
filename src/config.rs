use serde::Deserialize;
use std::env;
use std::sync::OnceLock;
use thiserror::Error;

const DEFAULT_GENERATION_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_GENERATION_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";
const DEFAULT_EMBEDDING_DIMENSION: usize = 768;
const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_VECTOR_STORE_URL: &str = "http://127.0.0.1:6333";
const DEFAULT_COLLECTION_NAME: &str = "rag-collection";
const DEFAULT_CHUNK_SIZE: usize = 1000;
const DEFAULT_CHUNK_OVERLAP: usize = 200;
const DEFAULT_API_HOST: &str = "localhost";
const DEFAULT_API_PORT: u16 = 8001;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;
const DEFAULT_IMAGE_CACHE_MAX_COLLECTIONS: u64 = 128;
const DEFAULT_TASK_HISTORY_LIMIT: usize = 1024;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the document QA server.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// API key for the hosted generation service (also used by Google embeddings).
    pub google_api_key: String,
    /// Generation model identifier, e.g. `gemini-2.5-flash`.
    pub generation_model: String,
    /// Root URL of the generation API.
    pub generation_base_url: String,
    /// Embedding provider used by the vector store gateway.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Base URL of the Ollama runtime, used when the provider is `ollama`.
    pub ollama_url: String,
    /// Location of the persistent vector store.
    pub vector_store_url: String,
    /// Optional API key required to access the vector store.
    pub vector_store_api_key: Option<String>,
    /// Collection probed by the health endpoint.
    pub default_collection_name: String,
    /// Maximum characters per chunk.
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks.
    pub chunk_overlap: usize,
    /// Host the HTTP server binds to.
    pub api_host: String,
    /// Port the HTTP server binds to.
    pub api_port: u16,
    /// Largest accepted upload in bytes.
    pub max_upload_bytes: usize,
    /// Number of collections whose images are kept in memory.
    pub image_cache_max_collections: u64,
    /// Number of finished ingestion status records retained.
    pub task_history_limit: usize,
}

/// Supported embedding backends for the vector store gateway.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Hosted Google embeddings (`batchEmbedContents`).
    Google,
    /// Local Ollama runtime.
    Ollama,
    /// Deterministic byte-hashing vectors; no network access.
    Hashed,
}

impl Config {
    /// Build a configuration with every optional setting at its default.
    pub fn with_api_key(google_api_key: impl Into<String>) -> Self {
        Self {
            google_api_key: google_api_key.into(),
            generation_model: DEFAULT_GENERATION_MODEL.to_string(),
            generation_base_url: DEFAULT_GENERATION_BASE_URL.to_string(),
            embedding_provider: EmbeddingProvider::Google,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            vector_store_url: DEFAULT_VECTOR_STORE_URL.to_string(),
            vector_store_api_key: None,
            default_collection_name: DEFAULT_COLLECTION_NAME.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            api_host: DEFAULT_API_HOST.to_string(),
            api_port: DEFAULT_API_PORT,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            image_cache_max_collections: DEFAULT_IMAGE_CACHE_MAX_COLLECTIONS,
            task_history_limit: DEFAULT_TASK_HISTORY_LIMIT,
        }
    }

    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = load_env("GOOGLE_API_KEY")?;
        if api_key.trim().is_empty() {
            return Err(ConfigError::MissingVariable("GOOGLE_API_KEY".to_string()));
        }
        let defaults = Self::with_api_key(api_key);

        Ok(Self {
            generation_model: load_env_optional("GENERATION_MODEL")
                .unwrap_or(defaults.generation_model.clone()),
            generation_base_url: load_env_optional("GENERATION_BASE_URL")
                .unwrap_or(defaults.generation_base_url.clone()),
            embedding_provider: match load_env_optional("EMBEDDING_PROVIDER") {
                Some(value) => value.parse().map_err(|()| {
                    ConfigError::InvalidValue("EMBEDDING_PROVIDER".to_string())
                })?,
                None => defaults.embedding_provider,
            },
            embedding_model: load_env_optional("EMBEDDING_MODEL")
                .unwrap_or(defaults.embedding_model.clone()),
            embedding_dimension: parse_optional("EMBEDDING_DIMENSION")?
                .unwrap_or(defaults.embedding_dimension),
            ollama_url: load_env_optional("OLLAMA_URL").unwrap_or(defaults.ollama_url.clone()),
            vector_store_url: load_env_optional("VECTOR_STORE_URL")
                .unwrap_or(defaults.vector_store_url.clone()),
            vector_store_api_key: load_env_optional("VECTOR_STORE_API_KEY"),
            default_collection_name: load_env_optional("DEFAULT_COLLECTION_NAME")
                .unwrap_or(defaults.default_collection_name.clone()),
            chunk_size: parse_optional("CHUNK_SIZE")?.unwrap_or(defaults.chunk_size),
            chunk_overlap: parse_optional("CHUNK_OVERLAP")?.unwrap_or(defaults.chunk_overlap),
            api_host: load_env_optional("API_HOST").unwrap_or(defaults.api_host.clone()),
            api_port: parse_optional("API_PORT")?.unwrap_or(defaults.api_port),
            max_upload_bytes: parse_optional("MAX_UPLOAD_BYTES")?
                .unwrap_or(defaults.max_upload_bytes),
            image_cache_max_collections: parse_optional("IMAGE_CACHE_MAX_COLLECTIONS")?
                .unwrap_or(defaults.image_cache_max_collections),
            task_history_limit: parse_optional("TASK_HISTORY_LIMIT")?
                .unwrap_or(defaults.task_history_limit),
            ..defaults
        })
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "google" | "gemini" => Ok(Self::Google),
            "ollama" => Ok(Self::Ollama),
            "hashed" => Ok(Self::Hashed),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, if [`init_config`] has run.
pub fn get_config() -> Option<&'static Config> {
    CONFIG.get()
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        vector_store_url = %config.vector_store_url,
        generation_model = %config.generation_model,
        embedding_provider = ?config.embedding_provider,
        chunk_size = config.chunk_size,
        chunk_overlap = config.chunk_overlap,
        "Loaded configuration"
    );
    Ok(CONFIG.get_or_init(|| config))
}
