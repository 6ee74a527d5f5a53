use core_config::{ConfigError, FromEnv, env_optional, env_or_default, env_parse, env_required};

pub const DEFAULT_BASE_URL: &str = "http://localhost:9380/api/v1";

#[derive(Clone)]
pub struct RagConfig {
    pub base_url: String,
    pub api_key: String,
    pub request_timeout_secs: u64,
    /// Server default when unset
    pub embedding_model: Option<String>,
    pub chunk_method: String,
}

impl RagConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            request_timeout_secs: 60,
            embedding_model: None,
            chunk_method: "naive".to_string(),
        }
    }

    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = Some(model.into());
        self
    }

    pub fn with_request_timeout(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }
}

impl std::fmt::Debug for RagConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"***")
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("embedding_model", &self.embedding_model)
            .field("chunk_method", &self.chunk_method)
            .finish()
    }
}

/// - `RAG_BASE_URL` (http://localhost:9380/api/v1)
/// - `RAG_API_KEY` (required)
/// - `RAG_REQUEST_TIMEOUT_SECS` (60)
/// - `RAG_EMBEDDING_MODEL` (optional)
/// - `RAG_CHUNK_METHOD` (naive)
impl FromEnv for RagConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: env_or_default("RAG_BASE_URL", DEFAULT_BASE_URL),
            api_key: env_required("RAG_API_KEY")?,
            request_timeout_secs: env_parse("RAG_REQUEST_TIMEOUT_SECS", "60")?,
            embedding_model: env_optional("RAG_EMBEDDING_MODEL"),
            chunk_method: env_or_default("RAG_CHUNK_METHOD", "naive"),
        })
    }
}
