//! Command-line and environment settings shared by the binaries.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::chunker::PdfChunker;
use crate::classifier::Classifier;
use crate::embedder::openai::OpenAiEmbedder;
use crate::embedder::Embedder;
use crate::ingest::IngestionPipeline;
use crate::providers::{AnthropicProvider, LlmProvider, OpenAiProvider};
use crate::router::ResponseRouter;
use crate::storage::{postgres, MemoryStore, PgStore, Store};
use crate::vector_store::{CollectionName, MemoryVectorIndex, PgVectorIndex, VectorIndex};
use crate::weather::{WeatherApiClient, WeatherProvider};

/// Loads `.env` and installs the `RUST_LOG`-driven subscriber (default `info`).
pub fn init_logging() {
    dotenv::dotenv().ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Where embeddings live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum VectorBackend {
    /// pgvector tables in `DATABASE_URL`.
    Pgvector,
    /// Process-local index, lost on exit.
    Memory,
}

/// Where documents, pages and messages live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackend {
    /// Postgres tables in `DATABASE_URL`.
    Postgres,
    /// Process-local tables, lost on exit.
    Memory,
}

/// Host used for answer generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GeneratorKind {
    /// Groq's OpenAI-compatible chat completions.
    Groq,
    /// OpenAI chat completions.
    Openai,
    /// Anthropic messages API.
    Anthropic,
}

/// Model, storage and index settings used by both binaries.
#[derive(Args, Debug, Clone)]
pub struct ModelArgs {
    /// Postgres connection string (postgres://...).
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Backend for documents, pages and messages.
    #[arg(long, env = "PAGEWISE_STORAGE", value_enum, default_value = "postgres")]
    pub storage: StorageBackend,

    /// Backend for page embeddings.
    #[arg(
        long,
        env = "PAGEWISE_VECTOR_BACKEND",
        value_enum,
        default_value = "pgvector"
    )]
    pub vector_backend: VectorBackend,

    /// Schema holding the pgvector collection tables.
    #[arg(long, env = "PAGEWISE_PGVECTOR_SCHEMA", default_value = "public")]
    pub pgvector_schema: String,

    /// Prefix for pgvector collection tables.
    #[arg(long, env = "PAGEWISE_PGVECTOR_PREFIX", default_value = "pagewise_")]
    pub pgvector_prefix: String,

    /// Collection that page embeddings are written to and queried from.
    #[arg(long, env = "PAGEWISE_COLLECTION", default_value = "documents")]
    pub collection: String,

    /// OpenAI API key used for embeddings and classification.
    #[arg(long, env = "OPENAI_API_KEY")]
    pub openai_api_key: String,

    /// Base URL for OpenAI-compatible endpoints.
    #[arg(
        long,
        env = "PAGEWISE_OPENAI_BASE",
        default_value = "https://api.openai.com/v1"
    )]
    pub openai_base_url: String,

    /// Embedding model identifier.
    #[arg(
        long,
        env = "PAGEWISE_EMBEDDING_MODEL",
        default_value = "text-embedding-ada-002"
    )]
    pub embedding_model: String,

    /// Optional embedding dimension override.
    #[arg(long, env = "PAGEWISE_EMBEDDING_DIMENSIONS")]
    pub embedding_dimensions: Option<usize>,

    /// OpenAI chat model for intent classification and weather summaries.
    #[arg(long, env = "PAGEWISE_CLASSIFIER_MODEL", default_value = "gpt-4")]
    pub classifier_model: String,

    /// Host used for answer generation.
    #[arg(long, env = "PAGEWISE_GENERATOR", value_enum, default_value = "groq")]
    pub generator: GeneratorKind,

    /// Model used for answer generation.
    #[arg(
        long,
        env = "PAGEWISE_GENERATION_MODEL",
        default_value = "llama-3.3-70b-versatile"
    )]
    pub generation_model: String,

    /// Groq API key (required when the generator is groq).
    #[arg(long, env = "GROQ_API_KEY")]
    pub groq_api_key: Option<String>,

    /// Base URL for Groq's OpenAI-compatible API.
    #[arg(
        long,
        env = "PAGEWISE_GROQ_BASE",
        default_value = "https://api.groq.com/openai/v1"
    )]
    pub groq_base_url: String,

    /// Anthropic API key (required when the generator is anthropic).
    #[arg(long, env = "ANTHROPIC_API_KEY")]
    pub anthropic_api_key: Option<String>,

    /// Seconds before any embedding, classification, generation or weather call is abandoned.
    #[arg(long, env = "PAGEWISE_CALL_TIMEOUT_SECS", default_value_t = 30)]
    pub call_timeout_secs: u64,

    /// Pages embedded and indexed at once during ingestion.
    #[arg(long, env = "PAGEWISE_INGEST_CONCURRENCY", default_value_t = 1)]
    pub ingest_concurrency: usize,
}

/// Settings for the HTTP service.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "pagewise-server",
    about = "HTTP API for PDF ingestion and intent-routed answers"
)]
pub struct ServeCli {
    /// Address to bind the HTTP server to (host:port).
    #[arg(long, env = "PAGEWISE_BIND", default_value = "127.0.0.1:8000")]
    pub bind: String,

    /// Directory uploaded PDFs are written to.
    #[arg(long, env = "PAGEWISE_UPLOAD_DIR", default_value = "./uploads")]
    pub upload_dir: PathBuf,

    /// Nearest chunks retrieved per food query.
    #[arg(long, env = "PAGEWISE_TOP_K", default_value_t = 3)]
    pub top_k: usize,

    /// weatherapi.com API key.
    #[arg(long, env = "WEATHER_API_KEY")]
    pub weather_api_key: String,

    /// Base URL for weatherapi.com.
    #[arg(
        long,
        env = "PAGEWISE_WEATHER_BASE",
        default_value = "https://api.weatherapi.com/v1"
    )]
    pub weather_base_url: String,

    /// City used for weather queries.
    #[arg(long, env = "PAGEWISE_WEATHER_CITY", default_value = "New York")]
    pub weather_city: String,

    /// Model, storage and index settings.
    #[command(flatten)]
    pub model: ModelArgs,
}

/// Settings for the one-shot ingestion binary.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "pagewise-ingest",
    about = "Ingest a local PDF through the same pipeline as the upload endpoint"
)]
pub struct IngestCli {
    /// PDF file to ingest.
    pub file: PathBuf,

    /// Document title (defaults to the file name).
    #[arg(long)]
    pub title: Option<String>,

    /// Model, storage and index settings.
    #[command(flatten)]
    pub model: ModelArgs,
}

/// Long-lived clients built once at startup.
#[derive(Clone)]
pub struct Backends {
    /// Relational persistence.
    pub store: Arc<dyn Store>,
    /// Page embedding index.
    pub index: Arc<dyn VectorIndex>,
    /// Embedding provider.
    pub embedder: Arc<dyn Embedder>,
    /// Target collection.
    pub collection: CollectionName,
}

impl ModelArgs {
    /// Per-call guard applied to every external request.
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs.max(1))
    }

    fn database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL is required for the postgres and pgvector backends")
    }

    /// Connects the store, index and embedder selected by these settings.
    pub async fn connect(&self) -> Result<Backends> {
        let collection = CollectionName::new(self.collection.clone())?;
        let needs_pg = self.storage == StorageBackend::Postgres
            || self.vector_backend == VectorBackend::Pgvector;
        let client = if needs_pg {
            Some(postgres::connect(self.database_url()?).await?)
        } else {
            None
        };

        let store: Arc<dyn Store> = match (self.storage, &client) {
            (StorageBackend::Postgres, Some(client)) => {
                let store = PgStore::new(Arc::clone(client));
                store.prepare().await?;
                Arc::new(store)
            }
            _ => Arc::new(MemoryStore::new()),
        };
        let index: Arc<dyn VectorIndex> = match (self.vector_backend, &client) {
            (VectorBackend::Pgvector, Some(client)) => {
                let index = PgVectorIndex::new(
                    Arc::clone(client),
                    self.pgvector_schema.clone(),
                    self.pgvector_prefix.clone(),
                )?;
                index.prepare().await?;
                Arc::new(index)
            }
            _ => Arc::new(MemoryVectorIndex::new()),
        };
        info!(
            storage = ?self.storage,
            vector_backend = ?self.vector_backend,
            collection = %collection,
            "backends ready"
        );

        let embedder = OpenAiEmbedder::new(
            self.openai_api_key.clone(),
            self.openai_base_url.clone(),
            self.embedding_model.clone(),
            self.embedding_dimensions,
            self.call_timeout(),
        )?;
        Ok(Backends {
            store,
            index,
            embedder: Arc::new(embedder),
            collection,
        })
    }

    /// OpenAI client for classification and weather summaries.
    pub fn classifier_provider(&self) -> Result<Arc<dyn LlmProvider>> {
        let provider = OpenAiProvider::new(
            self.openai_api_key.clone(),
            &self.openai_base_url,
            self.classifier_model.clone(),
            self.call_timeout(),
        )?;
        Ok(Arc::new(provider))
    }

    /// Answer-generation client for the configured host.
    pub fn generation_provider(&self) -> Result<Arc<dyn LlmProvider>> {
        let timeout = self.call_timeout();
        let model = self.generation_model.clone();
        let provider: Arc<dyn LlmProvider> = match self.generator {
            GeneratorKind::Groq => {
                let key = self
                    .groq_api_key
                    .clone()
                    .context("GROQ_API_KEY is required when the generator is groq")?;
                Arc::new(OpenAiProvider::new(key, &self.groq_base_url, model, timeout)?)
            }
            GeneratorKind::Openai => Arc::new(OpenAiProvider::new(
                self.openai_api_key.clone(),
                &self.openai_base_url,
                model,
                timeout,
            )?),
            GeneratorKind::Anthropic => {
                let key = self
                    .anthropic_api_key
                    .clone()
                    .context("ANTHROPIC_API_KEY is required when the generator is anthropic")?;
                Arc::new(AnthropicProvider::new(key, model, timeout)?)
            }
        };
        Ok(provider)
    }

    /// Ingestion pipeline over `backends`.
    pub fn pipeline(&self, backends: &Backends) -> IngestionPipeline {
        IngestionPipeline::new(
            Arc::new(PdfChunker),
            Arc::clone(&backends.embedder),
            Arc::clone(&backends.index),
            Arc::clone(&backends.store),
            backends.collection.clone(),
        )
        .with_call_timeout(self.call_timeout())
        .with_concurrency(self.ingest_concurrency)
    }
}

impl ServeCli {
    /// Weather client.
    pub fn weather_provider(&self) -> Result<Arc<dyn WeatherProvider>> {
        let client = WeatherApiClient::new(
            self.weather_api_key.clone(),
            &self.weather_base_url,
            self.model.call_timeout(),
        )?;
        Ok(Arc::new(client))
    }

    /// Query router over `backends`.
    pub fn router(&self, backends: &Backends) -> Result<ResponseRouter> {
        let timeout = self.model.call_timeout();
        let openai = self.model.classifier_provider()?;
        let classifier = Classifier::new(Arc::clone(&openai), timeout);
        Ok(ResponseRouter::new(
            classifier,
            Arc::clone(&backends.embedder),
            Arc::clone(&backends.index),
            self.model.generation_provider()?,
            self.weather_provider()?,
            Arc::clone(&backends.store),
            backends.collection.clone(),
        )
        .with_top_k(self.top_k)
        .with_weather_city(self.weather_city.clone())
        .with_weather_generator(openai)
        .with_call_timeout(timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_defaults() {
        let cli = ServeCli::try_parse_from([
            "pagewise-server",
            "--openai-api-key",
            "sk-test",
            "--weather-api-key",
            "w-test",
            "--groq-api-key",
            "g-test",
        ])
        .unwrap();
        assert_eq!(cli.top_k, 3);
        assert_eq!(cli.weather_city, "New York");
        assert_eq!(cli.model.collection, "documents");
        assert_eq!(cli.model.call_timeout(), Duration::from_secs(30));
        assert_eq!(cli.model.generator, GeneratorKind::Groq);
        assert_eq!(cli.model.embedding_model, "text-embedding-ada-002");
    }

    #[test]
    fn memory_backends_and_clamped_timeout() {
        let cli = IngestCli::try_parse_from([
            "pagewise-ingest",
            "menu.pdf",
            "--openai-api-key",
            "sk-test",
            "--storage",
            "memory",
            "--vector-backend",
            "memory",
            "--call-timeout-secs",
            "0",
        ])
        .unwrap();
        assert_eq!(cli.model.storage, StorageBackend::Memory);
        assert_eq!(cli.model.vector_backend, VectorBackend::Memory);
        assert_eq!(cli.model.call_timeout(), Duration::from_secs(1));
        assert_eq!(cli.file, PathBuf::from("menu.pdf"));
    }

    #[test]
    fn missing_generator_key_is_reported() {
        let mut cli = IngestCli::try_parse_from([
            "pagewise-ingest",
            "menu.pdf",
            "--openai-api-key",
            "sk-test",
            "--generator",
            "anthropic",
        ])
        .unwrap();
        cli.model.anthropic_api_key = None;
        let err = cli.model.generation_provider().err().unwrap();
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"), "{err}");

        cli.model.generator = GeneratorKind::Groq;
        cli.model.groq_api_key = None;
        assert!(cli.model.generation_provider().is_err());
    }
}
