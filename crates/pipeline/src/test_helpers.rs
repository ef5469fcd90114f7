//! Shared test doubles for pipeline tests.
//!
//! Every mock counts its calls so tests can assert that short-circuit paths
//! make no external calls at all.

use async_trait::async_trait;
use careline_core::error::{ProviderError, StoreError};
use careline_core::knowledge::{VectorHit, VectorStore};
use careline_core::provider::{
    ChunkReceiver, EmbeddingService, GenerationRequest, GenerationResponse, GenerationService,
    StreamChunk,
};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;

/// What `stream()` does.
#[derive(Debug, Clone)]
pub enum StreamScript {
    /// Emit these chunks, then a final `done` chunk.
    Chunks(Vec<String>),
    /// Fail before any chunk is produced.
    FailToStart(ProviderError),
    /// Emit these chunks, then an error.
    BreakAfter(Vec<String>, ProviderError),
    /// Emit these chunks, then stay silent with the channel open.
    StallAfter(Vec<String>),
}

/// A generation service with a scripted label reply and stream.
pub struct MockGenerator {
    label: Result<String, ProviderError>,
    script: StreamScript,
    complete_calls: AtomicUsize,
    stream_calls: AtomicUsize,
    requests: Mutex<Vec<GenerationRequest>>,
    // Keeps stalled streams open for the lifetime of the mock.
    held: Mutex<Vec<mpsc::Sender<Result<StreamChunk, ProviderError>>>>,
}

impl MockGenerator {
    pub fn new(label: &str, script: StreamScript) -> Self {
        Self::with_label_result(Ok(label.to_string()), script)
    }

    pub fn with_label_result(label: Result<String, ProviderError>, script: StreamScript) -> Self {
        Self {
            label,
            script,
            complete_calls: AtomicUsize::new(0),
            stream_calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            held: Mutex::new(Vec::new()),
        }
    }

    /// Labels INFORMATIONAL and streams `answer` in two chunks.
    pub fn informational(answer: &str) -> Self {
        let (a, b) = answer.split_at(answer.len() / 2);
        Self::new(
            "INFORMATIONAL",
            StreamScript::Chunks(vec![a.to_string(), b.to_string()]),
        )
    }

    pub fn complete_calls(&self) -> usize {
        self.complete_calls.load(Ordering::SeqCst)
    }

    pub fn stream_calls(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.complete_calls() + self.stream_calls()
    }

    /// The most recent request passed to `stream()`.
    pub fn last_request(&self) -> Option<GenerationRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl GenerationService for MockGenerator {
    fn name(&self) -> &str {
        "mock_generator"
    }

    async fn complete(&self, _request: GenerationRequest) -> Result<GenerationResponse, ProviderError> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        self.label.clone().map(|content| GenerationResponse {
            content,
            usage: None,
            model: "mock-model".into(),
        })
    }

    async fn stream(&self, request: GenerationRequest) -> Result<ChunkReceiver, ProviderError> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);

        let (chunks, tail) = match &self.script {
            StreamScript::FailToStart(e) => return Err(e.clone()),
            StreamScript::Chunks(c) => (c.clone(), Some(Ok(done()))),
            StreamScript::BreakAfter(c, e) => (c.clone(), Some(Err(e.clone()))),
            StreamScript::StallAfter(c) => (c.clone(), None),
        };

        let (tx, rx) = mpsc::channel(chunks.len() + 1);
        for text in chunks {
            let _ = tx.try_send(Ok(content(&text)));
        }
        match tail {
            Some(item) => {
                let _ = tx.try_send(item);
            }
            None => self.held.lock().unwrap().push(tx),
        }
        Ok(rx)
    }
}

fn content(text: &str) -> StreamChunk {
    StreamChunk {
        content: Some(text.to_string()),
        done: false,
        usage: None,
    }
}

fn done() -> StreamChunk {
    StreamChunk {
        content: None,
        done: true,
        usage: None,
    }
}

/// An embedder returning a fixed vector, an error, or hanging.
pub struct MockEmbedder {
    behaviour: Behaviour<Vec<f32>, ProviderError>,
    calls: AtomicUsize,
}

/// A vector store returning fixed hits, an error, or hanging.
pub struct MockStore {
    behaviour: Behaviour<Vec<VectorHit>, StoreError>,
    calls: AtomicUsize,
    last_top_k: Mutex<Option<usize>>,
}

enum Behaviour<T, E> {
    Reply(T),
    Fail(E),
    Hang,
}

impl<T: Clone, E: Clone> Behaviour<T, E> {
    async fn run(&self) -> Result<T, E> {
        match self {
            Self::Reply(v) => Ok(v.clone()),
            Self::Fail(e) => Err(e.clone()),
            Self::Hang => std::future::pending().await,
        }
    }
}

impl MockEmbedder {
    pub fn returning(vector: Vec<f32>) -> Self {
        Self {
            behaviour: Behaviour::Reply(vector),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: ProviderError) -> Self {
        Self {
            behaviour: Behaviour::Fail(error),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingService for MockEmbedder {
    fn name(&self) -> &str {
        "mock_embedder"
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.behaviour.run().await
    }
}

impl MockStore {
    pub fn returning(hits: Vec<VectorHit>) -> Self {
        Self::with(Behaviour::Reply(hits))
    }

    pub fn failing(error: StoreError) -> Self {
        Self::with(Behaviour::Fail(error))
    }

    pub fn hanging() -> Self {
        Self::with(Behaviour::Hang)
    }

    fn with(behaviour: Behaviour<Vec<VectorHit>, StoreError>) -> Self {
        Self {
            behaviour,
            calls: AtomicUsize::new(0),
            last_top_k: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_top_k(&self) -> Option<usize> {
        *self.last_top_k.lock().unwrap()
    }
}

#[async_trait]
impl VectorStore for MockStore {
    fn name(&self) -> &str {
        "mock_store"
    }

    async fn query(&self, _vector: &[f32], top_k: usize) -> Result<Vec<VectorHit>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_top_k.lock().unwrap() = Some(top_k);
        self.behaviour.run().await
    }
}

pub fn hit(id: &str, text: &str, score: f32) -> VectorHit {
    VectorHit {
        id: id.into(),
        text: text.into(),
        score,
    }
}
