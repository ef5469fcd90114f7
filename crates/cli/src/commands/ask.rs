//! `careline ask`: Answer a single message.

use careline_core::{ConversationTurn, Modality};
use std::path::Path;

pub async fn run(
    config_path: Option<&Path>,
    message: &str,
    modality: &str,
    history: Option<&Path>,
) -> anyhow::Result<()> {
    let modality: Modality = modality.parse()?;
    let history = match history {
        Some(path) => load_history(path)?,
        None => Vec::new(),
    };

    let config = super::load_config(config_path)?;
    let runtime = super::build_runtime(config).await?;

    let stream = runtime.orchestrator.handle(message, modality, &history).await?;
    tracing::debug!(request_id = %stream.request_id(), intent = %stream.intent(), "Answering");

    super::write_stream(stream, &mut std::io::stdout()).await?;
    Ok(())
}

/// Read a JSON array of turns.
pub fn load_history(path: &Path) -> anyhow::Result<Vec<ConversationTurn>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read history {}: {e}", path.display()))?;
    let turns = serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Invalid history JSON in {}: {e}", path.display()))?;
    Ok(turns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use careline_core::Role;
    use std::io::Write;

    #[test]
    fn history_file_is_parsed_without_timestamps() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"role": "user", "text": "hello"}}, {{"role": "assistant", "text": "Hi!"}}]"#
        )
        .unwrap();

        let turns = load_history(file.path()).unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[1].text, "Hi!");
    }

    #[test]
    fn malformed_history_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"role": "user"}}"#).unwrap();
        let err = load_history(file.path()).unwrap_err();
        assert!(err.to_string().contains("Invalid history JSON"));
    }
}
