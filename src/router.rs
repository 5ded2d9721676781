//! Query path: classify, answer by intent, persist the exchange.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::classifier::{Classifier, Intent};
use crate::embedder::Embedder;
use crate::error::{EmbeddingError, GenerationError, QueryError, StorageError};
use crate::external::bounded;
use crate::models::Message;
use crate::providers::{LlmProvider, ProviderRequest};
use crate::storage::Store;
use crate::vector_store::{CollectionName, VectorIndex};
use crate::weather::{WeatherError, WeatherProvider};

/// Reply when retrieval finds nothing.
pub const NO_RELEVANT_INFO: &str =
    "I'm sorry, I couldn't find relevant information to answer your query.";
/// Reply when the retrieval answer cannot be generated.
pub const GENERATION_FALLBACK: &str = "Unable to generate a response at the moment.";
/// Reply when the weather provider fails.
pub const WEATHER_UNAVAILABLE: &str = "Unable to retrieve weather information at the moment.";
/// Reply when the weather summary cannot be generated.
pub const WEATHER_GENERATION_FALLBACK: &str =
    "Unable to generate a weather response at the moment.";
/// Reply for unrecognized intents.
pub const OUT_OF_SCOPE: &str = "I'm sorry, I can only handle food or weather queries.";

const RAG_SYSTEM_PROMPT: &str = "You are a helpful assistant for food-related queries.";
const WEATHER_SYSTEM_PROMPT: &str = "You are a weather assistant.";
const RAG_MAX_TOKENS: usize = 300;
const WEATHER_MAX_TOKENS: usize = 100;
const GENERATION_TEMPERATURE: f32 = 0.7;

/// One handled query: the stored user message, the stored answer and the route taken.
#[derive(Debug, Clone, Serialize)]
pub struct Exchange {
    /// Persisted user message.
    pub user_message: Message,
    /// Persisted generated answer.
    pub ai_message: Message,
    /// Intent the query was routed by.
    pub classification: Intent,
}

/// Routes classified queries to retrieval, weather or the out-of-scope reply.
pub struct ResponseRouter {
    classifier: Classifier,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    generator: Arc<dyn LlmProvider>,
    weather_generator: Arc<dyn LlmProvider>,
    weather: Arc<dyn WeatherProvider>,
    store: Arc<dyn Store>,
    collection: CollectionName,
    top_k: usize,
    weather_city: String,
    call_timeout: Duration,
}

impl ResponseRouter {
    /// Builds a router with top-k 3, "New York" as weather city and a 30s call timeout.
    pub fn new(
        classifier: Classifier,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        generator: Arc<dyn LlmProvider>,
        weather: Arc<dyn WeatherProvider>,
        store: Arc<dyn Store>,
        collection: CollectionName,
    ) -> Self {
        Self {
            classifier,
            embedder,
            index,
            weather_generator: Arc::clone(&generator),
            generator,
            weather,
            store,
            collection,
            top_k: 3,
            weather_city: "New York".to_string(),
            call_timeout: Duration::from_secs(30),
        }
    }

    /// Number of chunks retrieved per query.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    /// City used for weather lookups.
    pub fn with_weather_city(mut self, city: impl Into<String>) -> Self {
        self.weather_city = city.into();
        self
    }

    /// Provider that writes weather summaries; defaults to the answer generator.
    pub fn with_weather_generator(mut self, generator: Arc<dyn LlmProvider>) -> Self {
        self.weather_generator = generator;
        self
    }

    /// Bounds every embedding, generation and weather call.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Classifies, answers and persists `content` plus the answer, user message first.
    ///
    /// Both messages are written in one store call, so a failed request saves neither.
    pub async fn handle(&self, content: &str) -> Result<Exchange, QueryError> {
        let classification = self.classifier.classify(content).await;
        info!(intent = %classification, "query classified");
        let answer = self.respond(classification, content).await?;
        let (user_message, ai_message) = self.store.create_exchange(content, &answer).await?;
        Ok(Exchange {
            user_message,
            ai_message,
            classification,
        })
    }

    /// Produces the answer text for an already classified query.
    pub async fn respond(&self, intent: Intent, content: &str) -> Result<String, QueryError> {
        match intent {
            Intent::Food => self.answer_from_documents(content).await,
            Intent::Weather => Ok(self.answer_weather().await),
            Intent::Unknown => Ok(OUT_OF_SCOPE.to_string()),
        }
    }

    /// All stored messages in creation order.
    pub async fn history(&self) -> Result<Vec<Message>, StorageError> {
        self.store.list_messages().await
    }

    async fn answer_from_documents(&self, query: &str) -> Result<String, QueryError> {
        let embedding = match bounded(
            self.call_timeout,
            self.embedder.embed(query),
            EmbeddingError::Timeout,
        )
        .await
        {
            Ok(embedding) => embedding,
            Err(err) => {
                warn!(error = %err, "query embedding failed");
                return Ok(GENERATION_FALLBACK.to_string());
            }
        };
        let hits = self
            .index
            .query(&self.collection, &embedding, self.top_k)
            .await?;
        if hits.is_empty() {
            info!(collection = %self.collection, "no relevant chunks");
            return Ok(NO_RELEVANT_INFO.to_string());
        }
        let context = hits
            .iter()
            .map(|hit| hit.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = build_rag_prompt(query, &context);
        let request = ProviderRequest {
            system: RAG_SYSTEM_PROMPT,
            prompt: &prompt,
            temperature: GENERATION_TEMPERATURE,
            max_tokens: RAG_MAX_TOKENS,
        };
        match self.generate(&self.generator, &request).await {
            Ok(answer) => Ok(answer),
            Err(err) => {
                warn!(error = %err, chunks = hits.len(), "retrieval answer generation failed");
                Ok(GENERATION_FALLBACK.to_string())
            }
        }
    }

    async fn answer_weather(&self) -> String {
        let conditions = match bounded(
            self.call_timeout,
            self.weather.fetch_current_conditions(&self.weather_city),
            WeatherError::Timeout,
        )
        .await
        {
            Ok(conditions) => conditions,
            Err(err) => {
                warn!(city = %self.weather_city, error = %err, "weather lookup failed");
                return WEATHER_UNAVAILABLE.to_string();
            }
        };
        let prompt = conditions.report_prompt();
        let request = ProviderRequest {
            system: WEATHER_SYSTEM_PROMPT,
            prompt: &prompt,
            temperature: GENERATION_TEMPERATURE,
            max_tokens: WEATHER_MAX_TOKENS,
        };
        match self.generate(&self.weather_generator, &request).await {
            Ok(answer) => answer,
            Err(err) => {
                warn!(error = %err, "weather summary generation failed");
                WEATHER_GENERATION_FALLBACK.to_string()
            }
        }
    }

    async fn generate(
        &self,
        provider: &Arc<dyn LlmProvider>,
        request: &ProviderRequest<'_>,
    ) -> Result<String, GenerationError> {
        let text = bounded(
            self.call_timeout,
            provider.complete(request),
            GenerationError::Timeout,
        )
        .await?;
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(GenerationError::Empty);
        }
        Ok(trimmed.to_string())
    }
}

fn build_rag_prompt(query: &str, context: &str) -> String {
    format!("User Query: {query}\n\nContext:\n{context}\n\nAnswer:")
}
