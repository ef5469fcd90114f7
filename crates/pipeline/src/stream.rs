//! The response stream handed back to callers.
//!
//! A `ResponseStream` is a lazy, finite `futures::Stream` of
//! [`ResponseChunk`]s. Dropping it cancels the request: the generation
//! receiver is dropped with it, so the producer's next send fails and it
//! stops reading the upstream response.

use crate::notify::TransitionNotifier;
use careline_core::{ChunkReceiver, Intent, PipelineState};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tracing::{debug, warn};

/// How a chunk was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    /// A fixed short-circuit reply (greeting, refusal, emergency)
    Template,
    /// Text from the generation service
    Generated,
    /// Hospital-referral suffix after a completed answer
    Referral,
    /// Sent when an answer could not be produced
    Apology,
}

/// One unit of streamed output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseChunk {
    pub kind: ChunkKind,
    pub text: String,
}

impl ResponseChunk {
    pub fn new(kind: ChunkKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }
}

/// The streamed answer to one request. Produced once, not restartable.
pub struct ResponseStream {
    request_id: String,
    intent: Intent,
    context_degraded: bool,
    inner: BoxStream<'static, ResponseChunk>,
}

impl ResponseStream {
    /// A single fixed chunk.
    pub(crate) fn single(request_id: &str, intent: Intent, chunk: ResponseChunk) -> Self {
        Self {
            request_id: request_id.to_string(),
            intent,
            context_degraded: false,
            inner: stream::iter([chunk]).boxed(),
        }
    }

    pub(crate) fn generated(intent: Intent, context_degraded: bool, relay: GenerationRelay) -> Self {
        Self {
            request_id: relay.notifier.request_id().to_string(),
            intent,
            context_degraded,
            inner: stream::unfold(relay, GenerationRelay::next).boxed(),
        }
    }

    pub(crate) fn with_context_degraded(mut self, degraded: bool) -> Self {
        self.context_degraded = degraded;
        self
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn intent(&self) -> Intent {
        self.intent
    }

    /// Retrieval failed and the answer was generated without context.
    pub fn context_degraded(&self) -> bool {
        self.context_degraded
    }

    /// Drain the stream into its chunks.
    pub async fn collect_chunks(self) -> Vec<ResponseChunk> {
        self.collect().await
    }

    /// Drain the stream and concatenate the text of every chunk.
    pub async fn collect_text(self) -> String {
        self.map(|c| c.text).collect::<Vec<_>>().await.concat()
    }
}

impl std::fmt::Debug for ResponseStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseStream")
            .field("request_id", &self.request_id)
            .field("intent", &self.intent)
            .field("context_degraded", &self.context_degraded)
            .finish_non_exhaustive()
    }
}

impl Stream for ResponseStream {
    type Item = ResponseChunk;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().inner.poll_next_unpin(cx)
    }
}

// ── Generation relay ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RelayPhase {
    Streaming,
    Completed,
    Finished,
}

/// Re-emits generation chunks, then the referral suffix or the apology.
pub(crate) struct GenerationRelay {
    rx: ChunkReceiver,
    idle_timeout: Duration,
    referral: Option<String>,
    apology: String,
    intent: Intent,
    notifier: TransitionNotifier,
    phase: RelayPhase,
    emitted: usize,
}

impl GenerationRelay {
    pub(crate) fn new(
        rx: ChunkReceiver,
        idle_timeout: Duration,
        referral: Option<String>,
        apology: String,
        intent: Intent,
        notifier: TransitionNotifier,
    ) -> Self {
        Self {
            rx,
            idle_timeout,
            referral,
            apology,
            intent,
            notifier,
            phase: RelayPhase::Streaming,
            emitted: 0,
        }
    }

    async fn next(mut self) -> Option<(ResponseChunk, Self)> {
        loop {
            match self.phase {
                RelayPhase::Finished => return None,
                RelayPhase::Completed => {
                    self.phase = RelayPhase::Finished;
                    debug!(
                        request_id = %self.notifier.request_id(),
                        chunks = self.emitted,
                        "Generation complete"
                    );
                    self.notifier
                        .notify(PipelineState::Done, Some(self.intent), None);
                    let referral = self.referral.take()?;
                    return Some((ResponseChunk::new(ChunkKind::Referral, referral), self));
                }
                RelayPhase::Streaming => {
                    match tokio::time::timeout(self.idle_timeout, self.rx.recv()).await {
                        Ok(Some(Ok(chunk))) => {
                            if chunk.done {
                                self.phase = RelayPhase::Completed;
                            }
                            if let Some(text) = chunk.content.filter(|t| !t.is_empty()) {
                                self.emitted += 1;
                                return Some((ResponseChunk::new(ChunkKind::Generated, text), self));
                            }
                        }
                        Ok(Some(Err(e))) => {
                            warn!(request_id = %self.notifier.request_id(), error = %e, "Generation stream broke");
                            return self.fail("generation stream interrupted");
                        }
                        Ok(None) => {
                            warn!(request_id = %self.notifier.request_id(), "Generation stream closed early");
                            return self.fail("generation stream closed early");
                        }
                        Err(_) => {
                            warn!(
                                request_id = %self.notifier.request_id(),
                                idle_ms = self.idle_timeout.as_millis() as u64,
                                "Generation stream stalled"
                            );
                            return self.fail("generation stream stalled");
                        }
                    }
                }
            }
        }
    }

    fn fail(mut self, detail: &str) -> Option<(ResponseChunk, Self)> {
        self.phase = RelayPhase::Finished;
        self.notifier
            .notify(PipelineState::Failed, Some(self.intent), Some(detail));
        let apology = std::mem::take(&mut self.apology);
        Some((ResponseChunk::new(ChunkKind::Apology, apology), self))
    }
}

impl Drop for GenerationRelay {
    fn drop(&mut self) {
        if self.phase == RelayPhase::Streaming {
            debug!(
                request_id = %self.notifier.request_id(),
                chunks = self.emitted,
                "Response stream dropped before completion"
            );
        }
    }
}
