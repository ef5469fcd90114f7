//! `careline doctor`: Diagnose configuration and provider health.

use careline_config::AppConfig;
use careline_core::GenerationService;
use careline_knowledge::KnowledgeIndex;
use careline_providers::OpenAiCompatProvider;
use std::path::Path;

pub async fn run(config_path: Option<&Path>) -> anyhow::Result<()> {
    println!("Careline Doctor: System Diagnostics");
    println!("====================================\n");

    let mut issues = 0;
    let path = super::config_path(config_path);

    if path.exists() {
        println!("  ✅ Config file found at {}", path.display());
    } else {
        println!("  ⚠️  No config file at {} (using defaults; run `careline config init`)", path.display());
    }

    let config = match super::load_config(config_path) {
        Ok(config) => {
            println!("  ✅ Configuration valid");
            config
        }
        Err(e) => {
            println!("  ❌ {e:#}");
            println!("\n  1 issue found. Fix the configuration and run again.");
            return Ok(());
        }
    };

    match &config.knowledge.corpus_path {
        Some(corpus) => match KnowledgeIndex::load_corpus(corpus) {
            Ok(docs) => println!("  ✅ Knowledge corpus: {} documents", docs.len()),
            Err(e) => {
                println!("  ❌ Knowledge corpus: {e}");
                issues += 1;
            }
        },
        None => println!("  ⚠️  No knowledge.corpus_path; answers will have no retrieved context"),
    }

    issues += check_provider(&config).await;

    println!();
    if issues == 0 {
        println!("  All checks passed.");
    } else {
        println!("  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}

async fn check_provider(config: &AppConfig) -> usize {
    if !config.has_api_key() {
        println!("  ❌ No API key (set CARELINE_API_KEY or provider.api_key)");
        return 1;
    }

    let provider = match OpenAiCompatProvider::from_config(&config.provider) {
        Ok(p) => p,
        Err(e) => {
            println!("  ❌ Provider: {e}");
            return 1;
        }
    };

    let timeout = config.calls.generation.timeout();
    match tokio::time::timeout(timeout, provider.health_check()).await {
        Ok(Ok(true)) => {
            println!("  ✅ Provider reachable at {}", provider.base_url());
            0
        }
        Ok(Ok(false)) => {
            println!("  ❌ Provider at {} reported unhealthy", provider.base_url());
            1
        }
        Ok(Err(e)) => {
            println!("  ❌ Provider check failed: {e}");
            1
        }
        Err(_) => {
            println!("  ❌ Provider did not answer within {}ms", timeout.as_millis());
            1
        }
    }
}
