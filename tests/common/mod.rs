#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pagewise::error::{
    EmbeddingError, ExtractionError, GenerationError, IndexError, StorageError,
};
use pagewise::{
    Chunker, Classifier, CollectionName, CurrentConditions, Document, Embedder, IndexRecord,
    IngestionPipeline, LlmProvider, MemoryStore, MemoryVectorIndex, Message, Page, PageText,
    ProviderRequest, ResponseRouter, ScoredText, Store, VectorIndex, WeatherError,
    WeatherProvider,
};

pub const VOCABULARY: [&str; 4] = ["soup", "bread", "cake", "rain"];

/// Splits UTF-8 bytes into pages on form feeds.
pub struct FormFeedChunker;

impl Chunker for FormFeedChunker {
    fn split(&self, bytes: &[u8]) -> Result<Vec<PageText>, ExtractionError> {
        let text =
            std::str::from_utf8(bytes).map_err(|err| ExtractionError::Parse(err.to_string()))?;
        if text.is_empty() {
            return Err(ExtractionError::NoPages);
        }
        Ok(text
            .split('\u{c}')
            .enumerate()
            .map(|(idx, page)| PageText {
                page_number: idx as u32 + 1,
                text: page.to_string(),
            })
            .collect())
    }
}

/// Bag-of-words embedder over [`VOCABULARY`] plus a constant bias dimension.
///
/// Texts containing any of `fail_markers` fail with a provider error.
#[derive(Default)]
pub struct KeywordEmbedder {
    fail_markers: Vec<String>,
    calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn failing_on(marker: &str) -> Self {
        Self {
            fail_markers: vec![marker.to_string()],
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }
        if self.fail_markers.iter().any(|marker| text.contains(marker)) {
            return Err(EmbeddingError::Provider("scripted failure".into()));
        }
        let lower = text.to_lowercase();
        let mut vector: Vec<f32> = VOCABULARY
            .iter()
            .map(|word| lower.matches(word).count() as f32)
            .collect();
        vector.push(0.1);
        Ok(vector)
    }
}

/// LLM fake: classification calls (max_tokens 5) answer by keyword, every other call
/// echoes a canned answer and is recorded.
#[derive(Default)]
pub struct ScriptedLlm {
    pub answer: String,
    pub fail_generation: bool,
    pub hang_generation: bool,
    generations: Mutex<Vec<String>>,
    classifications: AtomicUsize,
}

impl ScriptedLlm {
    pub fn answering(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_generation: true,
            ..Self::default()
        }
    }

    /// Classifies normally but never finishes a generation call.
    pub fn hanging() -> Self {
        Self {
            hang_generation: true,
            ..Self::default()
        }
    }

    pub fn generation_prompts(&self) -> Vec<String> {
        self.generations.lock().unwrap().clone()
    }

    pub fn classification_calls(&self) -> usize {
        self.classifications.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    async fn complete(&self, request: &ProviderRequest<'_>) -> Result<String, GenerationError> {
        if request.max_tokens == 5 {
            self.classifications.fetch_add(1, Ordering::SeqCst);
            let message = request
                .prompt
                .strip_prefix("Classify this message: ")
                .and_then(|rest| rest.split('\n').next())
                .unwrap_or_default()
                .to_lowercase();
            let label = if message.contains("soup") || message.contains("recipe") {
                "food"
            } else if message.contains("weather") || message.contains("rain") {
                "Weather."
            } else {
                "unknown"
            };
            return Ok(label.to_string());
        }
        self.generations
            .lock()
            .unwrap()
            .push(request.prompt.to_string());
        if self.hang_generation {
            std::future::pending::<()>().await;
        }
        if self.fail_generation {
            return Err(GenerationError::Provider("scripted failure".into()));
        }
        Ok(format!("  {}\n", self.answer))
    }
}

/// Weather fake returning fixed conditions or a provider error.
pub struct FixedWeather {
    pub conditions: Option<CurrentConditions>,
    pub hang: bool,
    pub cities: Mutex<Vec<String>>,
}

impl FixedWeather {
    pub fn boston() -> Self {
        Self {
            conditions: Some(CurrentConditions {
                location: "Boston".into(),
                temp_c: 11.5,
                condition: "Light rain".into(),
                humidity: 87.0,
                wind_kph: 19.1,
            }),
            hang: false,
            cities: Mutex::new(Vec::new()),
        }
    }

    pub fn down() -> Self {
        Self {
            conditions: None,
            hang: false,
            cities: Mutex::new(Vec::new()),
        }
    }

    /// Never answers.
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::boston()
        }
    }
}

#[async_trait]
impl WeatherProvider for FixedWeather {
    async fn fetch_current_conditions(
        &self,
        city: &str,
    ) -> Result<CurrentConditions, WeatherError> {
        self.cities.lock().unwrap().push(city.to_string());
        if self.hang {
            std::future::pending::<()>().await;
        }
        self.conditions
            .clone()
            .ok_or_else(|| WeatherError::Provider("503 Service Unavailable".into()))
    }
}

/// Index that accepts `allowed` upserts and then reports itself unavailable.
pub struct FlakyIndex {
    inner: MemoryVectorIndex,
    allowed: usize,
    upserts: AtomicUsize,
}

impl FlakyIndex {
    pub fn failing_after(allowed: usize) -> Self {
        Self {
            inner: MemoryVectorIndex::new(),
            allowed,
            upserts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl VectorIndex for FlakyIndex {
    async fn upsert(
        &self,
        collection: &CollectionName,
        record: IndexRecord,
    ) -> Result<(), IndexError> {
        if self.upserts.fetch_add(1, Ordering::SeqCst) >= self.allowed {
            return Err(IndexError::Unavailable("connection refused".into()));
        }
        self.inner.upsert(collection, record).await
    }

    async fn query(
        &self,
        collection: &CollectionName,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredText>, IndexError> {
        self.inner.query(collection, vector, k).await
    }

    async fn count(
        &self,
        collection: &CollectionName,
        document_id: i64,
    ) -> Result<usize, IndexError> {
        self.inner.count(collection, document_id).await
    }
}

/// Index whose backing store is gone.
pub struct DownIndex;

#[async_trait]
impl VectorIndex for DownIndex {
    async fn upsert(&self, _: &CollectionName, _: IndexRecord) -> Result<(), IndexError> {
        Err(IndexError::Unavailable("connection refused".into()))
    }

    async fn query(
        &self,
        _: &CollectionName,
        _: &[f32],
        _: usize,
    ) -> Result<Vec<ScoredText>, IndexError> {
        Err(IndexError::Unavailable("connection refused".into()))
    }

    async fn count(&self, _: &CollectionName, _: i64) -> Result<usize, IndexError> {
        Err(IndexError::Unavailable("connection refused".into()))
    }
}

/// Store that delegates to a [`MemoryStore`] but refuses to save exchanges.
pub struct ExchangeRejectingStore {
    pub inner: Arc<MemoryStore>,
}

#[async_trait]
impl Store for ExchangeRejectingStore {
    async fn create_document(
        &self,
        title: &str,
        file_path: &str,
    ) -> Result<Document, StorageError> {
        self.inner.create_document(title, file_path).await
    }

    async fn create_page(
        &self,
        document_id: i64,
        page_number: u32,
        content: &str,
    ) -> Result<Page, StorageError> {
        self.inner.create_page(document_id, page_number, content).await
    }

    async fn mark_page_processed(&self, page_id: i64) -> Result<(), StorageError> {
        self.inner.mark_page_processed(page_id).await
    }

    async fn mark_document_processed(&self, document_id: i64) -> Result<(), StorageError> {
        self.inner.mark_document_processed(document_id).await
    }

    async fn get_document(&self, document_id: i64) -> Result<Option<Document>, StorageError> {
        self.inner.get_document(document_id).await
    }

    async fn list_pages(&self, document_id: i64) -> Result<Vec<Page>, StorageError> {
        self.inner.list_pages(document_id).await
    }

    async fn create_exchange(&self, _: &str, _: &str) -> Result<(Message, Message), StorageError> {
        Err(StorageError("disk full".into()))
    }

    async fn list_messages(&self) -> Result<Vec<Message>, StorageError> {
        self.inner.list_messages().await
    }
}

pub fn collection() -> CollectionName {
    CollectionName::new("documents").unwrap()
}

/// Wired pipeline and router sharing one store and index.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub index: Arc<dyn VectorIndex>,
    pub embedder: Arc<KeywordEmbedder>,
    pub llm: Arc<ScriptedLlm>,
    pub weather_llm: Arc<ScriptedLlm>,
    pub weather: Arc<FixedWeather>,
    pub pipeline: IngestionPipeline,
    pub router: ResponseRouter,
}

pub struct HarnessBuilder {
    chunker: Arc<dyn Chunker>,
    index: Arc<dyn VectorIndex>,
    embedder: KeywordEmbedder,
    llm: ScriptedLlm,
    weather_llm: Option<ScriptedLlm>,
    weather: FixedWeather,
    concurrency: usize,
    reject_exchanges: bool,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self {
            chunker: Arc::new(FormFeedChunker),
            index: Arc::new(MemoryVectorIndex::new()),
            embedder: KeywordEmbedder::default(),
            llm: ScriptedLlm::answering("Simmer the soup for twenty minutes."),
            weather_llm: None,
            weather: FixedWeather::boston(),
            concurrency: 1,
            reject_exchanges: false,
        }
    }
}

impl HarnessBuilder {
    pub fn chunker(mut self, chunker: impl Chunker + 'static) -> Self {
        self.chunker = Arc::new(chunker);
        self
    }

    pub fn index(mut self, index: impl VectorIndex + 'static) -> Self {
        self.index = Arc::new(index);
        self
    }

    pub fn embedder(mut self, embedder: KeywordEmbedder) -> Self {
        self.embedder = embedder;
        self
    }

    pub fn llm(mut self, llm: ScriptedLlm) -> Self {
        self.llm = llm;
        self
    }

    pub fn weather(mut self, weather: FixedWeather) -> Self {
        self.weather = weather;
        self
    }

    /// Separate provider for weather summaries.
    pub fn weather_llm(mut self, llm: ScriptedLlm) -> Self {
        self.weather_llm = Some(llm);
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Routes queries through an [`ExchangeRejectingStore`].
    pub fn reject_exchanges(mut self) -> Self {
        self.reject_exchanges = true;
        self
    }

    pub fn build(self) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let embedder = Arc::new(self.embedder);
        let llm = Arc::new(self.llm);
        let weather_llm = match self.weather_llm {
            Some(weather_llm) => Arc::new(weather_llm),
            None => llm.clone(),
        };
        let weather = Arc::new(self.weather);
        let router_store: Arc<dyn Store> = if self.reject_exchanges {
            Arc::new(ExchangeRejectingStore {
                inner: store.clone(),
            })
        } else {
            store.clone()
        };
        let timeout = Duration::from_secs(5);
        let pipeline = IngestionPipeline::new(
            self.chunker,
            embedder.clone(),
            self.index.clone(),
            store.clone(),
            collection(),
        )
        .with_call_timeout(timeout)
        .with_concurrency(self.concurrency);
        let router = ResponseRouter::new(
            Classifier::new(llm.clone(), timeout),
            embedder.clone(),
            self.index.clone(),
            llm.clone(),
            weather.clone(),
            router_store,
            collection(),
        )
        .with_weather_generator(weather_llm.clone())
        .with_call_timeout(timeout);
        Harness {
            store,
            index: self.index,
            embedder,
            llm,
            weather_llm,
            weather,
            pipeline,
            router,
        }
    }
}

pub fn pages(texts: &[&str]) -> Vec<u8> {
    texts.join("\u{c}").into_bytes()
}

/// Minimal PDF with one Courier text line per page.
pub fn sample_pdf(pages: &[&str]) -> Vec<u8> {
    pagewise::chunker::text_pdf(pages).unwrap()
}
