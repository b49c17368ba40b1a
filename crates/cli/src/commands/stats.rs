//! Stats command handler.
//!
//! Shows what the vector index holds and how it was built.

use clap::Args;
use medbot_core::{config::AppConfig, AppResult};

/// Show vector index statistics
#[derive(Args, Debug)]
pub struct StatsCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatsCommand {
    pub fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing stats command");

        let path = config.index_path();
        let stats = medbot_knowledge::stats(&path, &config.pipeline.embedding)?;

        if self.json {
            let output = serde_json::json!({
                "path": path,
                "dimensions": stats.meta.dimensions,
                "metric": stats.meta.metric.as_str(),
                "embeddingModel": stats.meta.embedding_model,
                "chunks": stats.chunks_count,
                "sources": stats.sources_count,
                "sizeBytes": stats.size_bytes,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            println!("Vector index: {}", path.display());
            println!("  Dimensions: {}", stats.meta.dimensions);
            println!("  Metric: {}", stats.meta.metric.as_str());
            println!(
                "  Embedding model: {}",
                stats.meta.embedding_model.as_deref().unwrap_or("(unrecorded)")
            );
            println!("  Chunks: {}", stats.chunks_count);
            println!("  Sources: {}", stats.sources_count);
            println!("  Size: {} bytes", stats.size_bytes);
        }

        Ok(())
    }
}
