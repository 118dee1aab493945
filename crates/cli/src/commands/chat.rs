//! `depo chat`: Single-message or interactive chat in the terminal.

use depo_agent::{Assembly, ChatOutcome};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

pub struct ChatOptions {
    pub message: Option<String>,
    pub conversation: Option<String>,
    pub strategy: Option<String>,
    pub document: Option<PathBuf>,
}

pub async fn run(config_path: Option<&Path>, options: ChatOptions) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = super::load_config(config_path)?;
    if let Some(strategy) = options.strategy {
        config.agent.strategy = strategy;
    }

    if let Err(e) = config.check_credentials() {
        eprintln!();
        eprintln!("  ERROR: {e}");
        eprintln!();
        eprintln!("  Set DEPO_API_KEY or OPENAI_API_KEY, or add api_key to:");
        eprintln!("    {}", depo_config::AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err(e.into());
    }

    let assembly = depo_agent::assemble(config).await?;
    let conversation_id = options
        .conversation
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    debug!(conversation_id = %conversation_id, strategy = %assembly.strategy, "Chat session started");

    if let Some(document) = options.document {
        if !document.is_file() {
            return Err(format!("Document not found: {}", document.display()).into());
        }
        assembly
            .sessions
            .update_document_ref(&conversation_id, &document.display().to_string())
            .await?;
    }

    match options.message {
        Some(message) => {
            eprint!("  Thinking...");
            let outcome = assembly.orchestrator.handle_turn(&conversation_id, &message).await;
            eprint!("\r              \r");
            print_answer(&outcome?);
        }
        None => interactive(&assembly, &conversation_id).await?,
    }
    Ok(())
}

fn print_answer(outcome: &ChatOutcome) {
    println!("{}", outcome.assistant_message);
    if outcome.degraded {
        eprintln!("  (stopped at the step limit)");
    }
}

async fn interactive(assembly: &Assembly, conversation_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    println!();
    println!("  Deposition assistant: interactive mode");
    println!();
    println!("  Model:        {}", assembly.config.default_model);
    println!("  Strategy:     {}", assembly.strategy);
    println!("  Conversation: {conversation_id}");
    println!();
    println!("  Type your question and press Enter. Type 'exit' to quit.");
    println!();

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

        match assembly.orchestrator.handle_turn(conversation_id, line).await {
            Ok(outcome) => {
                print!("\n  Assistant > ");
                print_answer(&outcome);
                println!();
            }
            Err(e) => eprintln!("\n  Error: {e}\n"),
        }
    }
    println!("  Goodbye.");
    Ok(())
}
