//! `careline chat`: Interactive conversation.
//!
//! The history lives here, in the CLI. Each turn is handed to the pipeline
//! in full and the pipeline keeps nothing between requests.

use careline_core::{ConversationTurn, Modality, PipelineState};
use careline_security::AuditOutcome;
use std::io::Write;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::TryRecvError;

pub async fn run(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;
    let model = config.provider.model.clone();
    let runtime = super::build_runtime(config).await?;
    let mut events = runtime.events.subscribe();

    println!();
    println!("  Careline: Interactive Mode");
    println!("  Model: {model}");
    println!("  Type your message and press Enter. Type 'exit' or Ctrl+D to quit.");
    println!();

    let mut history: Vec<ConversationTurn> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }

        let stream = match runtime.orchestrator.handle(line, Modality::Text, &history).await {
            Ok(s) => s,
            Err(e) => {
                eprintln!("  [Input Error] {e}");
                continue;
            }
        };

        print!("  Assistant > ");
        let reply = super::write_stream(stream, &mut std::io::stdout()).await?;
        println!();

        loop {
            match events.try_recv() {
                Ok(event) if event.state == PipelineState::Failed => {
                    eprintln!("  [The answer above is incomplete]");
                }
                Ok(_) | Err(TryRecvError::Lagged(_)) => {}
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }

        history.push(ConversationTurn::user(line));
        history.push(ConversationTurn::assistant(reply));
    }

    let escalations = runtime.audit.entries_by_outcome(&AuditOutcome::Escalated).len();
    println!();
    println!("  Goodbye.");
    if escalations > 0 {
        println!("  {escalations} emergency response(s) were given in this session.");
    }
    println!();
    Ok(())
}
