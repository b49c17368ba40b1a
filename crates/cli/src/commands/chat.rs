//! Chat command handler.
//!
//! Runs one session against the terminal: stdin lines become messages,
//! outbound events are printed to stdout.

use anyhow::Context;
use clap::Args;
use medbot_chat::{OutboundEvent, SessionId, SessionManager, SharedResources, Transport};
use medbot_core::{config::AppConfig, AppError, AppResult};
use medbot_knowledge::{Completion, SourceRef};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

const QUIT_COMMAND: &str = "/quit";

/// Start an interactive session
#[derive(Args, Debug)]
pub struct ChatCommand {
    /// Wait for complete answers instead of streaming them
    #[arg(long)]
    pub no_stream: bool,

    /// Print the source documents after each answer
    #[arg(long)]
    pub show_sources: bool,
}

impl ChatCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing chat command");

        let mut config = config.clone();
        if self.no_stream {
            config.pipeline.streaming = false;
        }

        let resources = SharedResources::load(&config).await?;
        let (transport, turns) = TerminalTransport::new(self.show_sources);
        let manager = SessionManager::new(resources, Arc::new(transport));

        let id = SessionId::generate();
        manager.on_session_start(id.clone()).await?;

        let result = repl(&manager, &id, turns).await;
        manager.on_session_end(&id).await?;

        result.map_err(|e| AppError::Other(format!("{:#}", e)))
    }
}

/// Read questions until `/quit` or end of input, one turn at a time.
async fn repl(
    manager: &SessionManager,
    id: &SessionId,
    mut turns: mpsc::UnboundedReceiver<()>,
) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    // Greeting
    turns.recv().await.context("session ended before greeting")?;

    loop {
        print!("> ");
        std::io::stdout().flush().context("failed to flush stdout")?;

        let Some(line) = lines.next_line().await.context("failed to read input")? else {
            println!();
            break;
        };

        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question == QUIT_COMMAND {
            break;
        }

        manager.on_message(id, question).await?;
        turns.recv().await.context("session ended while answering")?;
    }

    Ok(())
}

/// Prints outbound events and signals the end of each turn.
struct TerminalTransport {
    show_sources: bool,
    mid_answer: AtomicBool,
    turns: mpsc::UnboundedSender<()>,
}

impl TerminalTransport {
    fn new(show_sources: bool) -> (Self, mpsc::UnboundedReceiver<()>) {
        let (turns, rx) = mpsc::unbounded_channel();
        let transport = Self {
            show_sources,
            mid_answer: AtomicBool::new(false),
            turns,
        };
        (transport, rx)
    }

    fn end_turn(&self) {
        // The REPL may already be gone on shutdown
        let _ = self.turns.send(());
    }

    fn print_sources(sources: &[SourceRef]) {
        if sources.is_empty() {
            println!("Sources: (none)");
            return;
        }

        println!("Sources:");
        for source in sources {
            match source.page {
                Some(page) => println!("- {} (page {}) [{}]", source.source, page, source.id),
                None => println!("- {} [{}]", source.source, source.id),
            }
        }
    }
}

#[async_trait::async_trait]
impl Transport for TerminalTransport {
    async fn send(&self, _session_id: &SessionId, event: OutboundEvent) -> AppResult<()> {
        match event {
            OutboundEvent::Greeting { text } => {
                println!("{}", text);
                self.end_turn();
            }
            OutboundEvent::Delta { text } => {
                self.mid_answer.store(true, Ordering::SeqCst);
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(text.as_bytes())?;
                stdout.flush()?;
            }
            OutboundEvent::Answer {
                text,
                sources,
                completion,
            } => {
                if self.mid_answer.swap(false, Ordering::SeqCst) {
                    println!();
                } else {
                    println!("{}", text);
                }
                if completion == Completion::Partial {
                    println!("(the answer may be incomplete)");
                }
                if self.show_sources {
                    Self::print_sources(&sources);
                }
                self.end_turn();
            }
            OutboundEvent::Error { message } => {
                if self.mid_answer.swap(false, Ordering::SeqCst) {
                    println!();
                }
                println!("{}", message);
                self.end_turn();
            }
        }
        Ok(())
    }
}
