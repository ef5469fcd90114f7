//! Subcommand implementations and the runtime they share.

pub mod ask;
pub mod chat;
pub mod config_cmd;
pub mod doctor;

use anyhow::Context;
use careline_config::AppConfig;
use careline_core::{EventBus, PipelineObserver};
use careline_knowledge::{InMemoryVectorStore, KnowledgeIndex};
use careline_pipeline::{ChunkKind, Orchestrator, ResponseChunk, Services};
use careline_providers::OpenAiCompatProvider;
use careline_security::{AuditLogger, TracingSink};
use futures::{Stream, StreamExt};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// `--config` if given, otherwise `~/.careline/config.toml`.
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
}

pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<AppConfig> {
    let path = config_path(explicit);
    AppConfig::load_with_env(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))
}

/// A ready pipeline plus the handles the commands report from.
pub struct Runtime {
    pub orchestrator: Orchestrator,
    pub audit: Arc<AuditLogger>,
    pub events: Arc<EventBus>,
}

/// Build the provider, index the knowledge corpus, and wire observers.
pub async fn build_runtime(config: AppConfig) -> anyhow::Result<Runtime> {
    if !config.has_api_key() {
        anyhow::bail!(
            "No API key configured. Set CARELINE_API_KEY (or OPENAI_API_KEY), \
             or add provider.api_key to {}",
            AppConfig::config_dir().join("config.toml").display()
        );
    }

    let provider = Arc::new(OpenAiCompatProvider::from_config(&config.provider)?);

    let store = match &config.knowledge.corpus_path {
        Some(path) => KnowledgeIndex::build_from_path(provider.as_ref(), path)
            .await
            .with_context(|| format!("Failed to index knowledge corpus {}", path.display()))?,
        None => {
            tracing::warn!("No knowledge.corpus_path configured; answers will have no retrieved context");
            InMemoryVectorStore::new()
        }
    };

    let audit = Arc::new(AuditLogger::with_sinks(vec![Box::new(TracingSink)]));
    let events = Arc::new(EventBus::default());

    let orchestrator = Orchestrator::new(
        config,
        Services {
            generator: provider.clone(),
            embedder: provider,
            store: Arc::new(store),
        },
    )?
    .with_observer(audit.clone() as Arc<dyn PipelineObserver>)
    .with_observer(events.clone() as Arc<dyn PipelineObserver>);

    Ok(Runtime {
        orchestrator,
        audit,
        events,
    })
}

/// Write chunks to `out` as they arrive; returns the full reply text.
pub async fn write_stream<S>(mut stream: S, out: &mut impl Write) -> anyhow::Result<String>
where
    S: Stream<Item = ResponseChunk> + Unpin,
{
    let mut reply = String::new();
    while let Some(chunk) = stream.next().await {
        if chunk.kind == ChunkKind::Referral && !reply.is_empty() {
            write!(out, "\n\n")?;
            reply.push_str("\n\n");
        }
        write!(out, "{}", chunk.text)?;
        out.flush()?;
        reply.push_str(&chunk.text);
    }
    writeln!(out)?;
    Ok(reply)
}
