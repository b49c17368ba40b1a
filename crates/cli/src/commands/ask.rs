//! Ask command handler.
//!
//! Runs the pipeline once for a question given on the command line.

use clap::Args;
use futures::StreamExt;
use medbot_chat::{Pipeline, SharedResources};
use medbot_core::{config::AppConfig, AppError, AppResult};
use medbot_knowledge::{AnswerEvent, AnswerResult, Completion};
use std::io::Write;

/// Answer a single question
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub question: String,

    /// Number of chunks to retrieve (default: pipeline topK)
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Disable streaming
    #[arg(long)]
    pub no_stream: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    /// Execute the ask command.
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");
        tracing::debug!("Ask command options: {:?}", self);

        let mut config = config.clone();
        if let Some(k) = self.top_k {
            config.pipeline.top_k = k;
        }

        let pipeline = Pipeline::new(SharedResources::load(&config).await?);

        let streaming = !self.json && !self.no_stream && config.pipeline.streaming;
        let result = if streaming {
            self.stream_answer(&pipeline).await?
        } else {
            pipeline.answer(&self.question).await?
        };

        if self.json {
            let output = serde_json::json!({
                "answer": result.answer,
                "completion": result.completion,
                "sources": result.source_refs(),
                "diagnostic": result.diagnostic,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else if !streaming && !result.is_failed() {
            println!("{}", result.answer);
        }

        if result.is_failed() {
            return Err(AppError::Llm(
                result
                    .diagnostic
                    .unwrap_or_else(|| "no answer was produced".to_string()),
            ));
        }

        if result.completion == Completion::Partial {
            tracing::warn!(diagnostic = ?result.diagnostic, "Answer may be incomplete");
        }

        if !self.json {
            print_sources(&result);
        }

        Ok(())
    }

    /// Print deltas as they arrive and return the final result.
    async fn stream_answer(&self, pipeline: &Pipeline) -> AppResult<AnswerResult> {
        let mut stream = pipeline.answer_stream(&self.question).await?;
        let mut printed = false;

        while let Some(event) = stream.next().await {
            match event {
                AnswerEvent::Delta(text) => {
                    print!("{}", text);
                    std::io::stdout().flush()?;
                    printed = true;
                }
                AnswerEvent::Finished(result) => {
                    if printed {
                        println!();
                    } else if !result.is_failed() {
                        println!("{}", result.answer);
                    }
                    return Ok(result);
                }
            }
        }

        Err(AppError::Llm("answer stream ended without a result".to_string()))
    }
}

fn print_sources(result: &AnswerResult) {
    let sources = result.source_refs();
    if sources.is_empty() {
        return;
    }

    println!();
    println!("Sources:");
    for source in sources {
        match source.page {
            Some(page) => println!("- {} (page {})", source.source, page),
            None => println!("- {}", source.source),
        }
    }
}
