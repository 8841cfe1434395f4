//! Deterministic in-process backends for tests.
//!
//! ```rust
//! use notegraph_inference::mock::{MockEmbeddingBackend, MockExtractionBackend};
//!
//! let embedder = MockEmbeddingBackend::new(8);
//! let extractor = MockExtractionBackend::new().with_latency_ms(50);
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

use notegraph_core::{
    EmbeddingBackend, Error, ExtractionBackend, ExtractionRequest, ExtractionResponse,
    GenerationBackend, Result, Vector,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Deterministic unit vector derived from the characters of `text`.
pub fn deterministic_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let mut vec = vec![0.0; dimension];
    if dimension == 0 {
        return vec;
    }
    for (i, c) in text.chars().enumerate() {
        let idx = (c as usize + i) % dimension;
        vec[idx] += 0.1;
    }
    let magnitude: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        vec.iter_mut().for_each(|x| *x /= magnitude);
    }
    vec
}

// =============================================================================
// EMBEDDINGS
// =============================================================================

#[derive(Debug, Default)]
struct EmbeddingState {
    batches: Vec<Vec<String>>,
    failure: Option<String>,
}

/// Embedding backend returning [`deterministic_embedding`]s.
#[derive(Clone)]
pub struct MockEmbeddingBackend {
    dimension: usize,
    latency: Duration,
    state: Arc<Mutex<EmbeddingState>>,
}

impl MockEmbeddingBackend {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            latency: Duration::ZERO,
            state: Arc::new(Mutex::new(EmbeddingState::default())),
        }
    }

    pub fn with_latency_ms(mut self, ms: u64) -> Self {
        self.latency = Duration::from_millis(ms);
        self
    }

    /// Fail every subsequent call with `message`.
    pub fn fail_with(&self, message: impl Into<String>) {
        lock(&self.state).failure = Some(message.into());
    }

    /// Texts received, one entry per call.
    pub fn batches(&self) -> Vec<Vec<String>> {
        lock(&self.state).batches.clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.state).batches.len()
    }
}

#[async_trait]
impl EmbeddingBackend for MockEmbeddingBackend {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        let failure = {
            let mut state = lock(&self.state);
            state.batches.push(texts.to_vec());
            state.failure.clone()
        };
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if let Some(message) = failure {
            return Err(Error::Embedding(message));
        }
        Ok(texts
            .iter()
            .map(|t| Vector::from(deterministic_embedding(t, self.dimension)))
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "mock-embed"
    }
}

// =============================================================================
// EXTRACTION
// =============================================================================

#[derive(Debug, Default)]
struct ExtractionState {
    requests: Vec<ExtractionRequest>,
    scripted: HashMap<Uuid, JsonValue>,
    omitted: HashSet<Uuid>,
    failure: Option<String>,
}

/// Extraction backend with scripted per-note entries.
///
/// Notes without a scripted entry get a minimal valid extraction whose
/// summary is `"Summary of <title>"`.
#[derive(Clone, Default)]
pub struct MockExtractionBackend {
    latency: Duration,
    state: Arc<Mutex<ExtractionState>>,
}

impl MockExtractionBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency_ms(mut self, ms: u64) -> Self {
        self.latency = Duration::from_millis(ms);
        self
    }

    /// Return `entry` verbatim for `note_id`.
    pub fn script(&self, note_id: Uuid, entry: JsonValue) {
        lock(&self.state).scripted.insert(note_id, entry);
    }

    /// Leave `note_id` out of every response.
    pub fn omit(&self, note_id: Uuid) {
        lock(&self.state).omitted.insert(note_id);
    }

    /// Fail every subsequent call with `message`.
    pub fn fail_with(&self, message: impl Into<String>) {
        lock(&self.state).failure = Some(message.into());
    }

    pub fn requests(&self) -> Vec<ExtractionRequest> {
        lock(&self.state).requests.clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.state).requests.len()
    }
}

#[async_trait]
impl ExtractionBackend for MockExtractionBackend {
    async fn extract(&self, request: &ExtractionRequest) -> Result<ExtractionResponse> {
        let (failure, results) = {
            let mut state = lock(&self.state);
            state.requests.push(request.clone());
            let results: HashMap<Uuid, JsonValue> = request
                .notes
                .iter()
                .filter(|n| !state.omitted.contains(&n.id))
                .map(|n| {
                    let entry = state
                        .scripted
                        .get(&n.id)
                        .cloned()
                        .unwrap_or_else(|| json!({"summary": format!("Summary of {}", n.title)}));
                    (n.id, entry)
                })
                .collect();
            (state.failure.clone(), results)
        };
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if let Some(message) = failure {
            return Err(Error::Extraction(message));
        }
        Ok(ExtractionResponse { results })
    }

    fn model_name(&self) -> &str {
        "mock-extract"
    }
}

// =============================================================================
// GENERATION
// =============================================================================

/// Generation backend returning one fixed reply and recording prompts.
#[derive(Clone)]
pub struct MockGenerationBackend {
    response: String,
    prompts: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockGenerationBackend {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// `(system, prompt)` pairs received.
    pub fn prompts(&self) -> Vec<(String, String)> {
        lock(&self.prompts).clone()
    }
}

#[async_trait]
impl GenerationBackend for MockGenerationBackend {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.generate_with_system("", prompt).await
    }

    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String> {
        lock(&self.prompts).push((system.to_string(), prompt.to_string()));
        Ok(self.response.clone())
    }

    fn model_name(&self) -> &str {
        "mock-gen"
    }
}
