use config::{Config, ConfigError, Environment};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub openai: OpenAiConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub rust_log: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Directory holding the vector indexes, mappings and document metadata.
    pub data_dir: String,
    /// Directory where raw uploads are kept.
    pub upload_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OpenAiConfig {
    pub api_url: String,
    /// Set to "mock" to run against in-process mock backends.
    pub api_key: String,
    pub embedding_model: String,
    pub completion_model: String,
    pub embedding_dim: usize,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Token count per chunk for the advanced pipeline and for large-document
    /// summarization.
    pub chunk_size: usize,
    /// Character threshold above which summarization goes two-level.
    pub summary_threshold: usize,
    /// When true, a failed summarization sub-call aborts the upload instead
    /// of degrading to an empty summary.
    pub strict_upstream: bool,
}

impl AppConfig {
    pub fn build() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            // Defaults
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("server.rust_log", "info,docqa=debug")?
            .set_default("storage.data_dir", "data")?
            .set_default("storage.upload_dir", "uploads")?
            .set_default("openai.api_url", "https://api.openai.com/v1")?
            .set_default("openai.api_key", "mock")?
            .set_default("openai.embedding_model", "text-embedding-ada-002")?
            .set_default("openai.completion_model", "gpt-3.5-turbo")?
            .set_default("openai.embedding_dim", 1536)?
            .set_default("openai.request_timeout_secs", 60)?
            .set_default("pipeline.chunk_size", 3000)?
            .set_default("pipeline.summary_threshold", 4000)?
            .set_default("pipeline.strict_upstream", false)?
            // Environment overrides, e.g. `APP_SERVER__PORT=8080`
            .add_source(Environment::default().separator("__").prefix("APP"));

        builder.build()?.try_deserialize()
    }
}
