//! SQLite-backed vector index.
//!
//! Layout:
//! - `index_meta(key, value)`: `dimensions`, `metric`, `embedding_model`
//! - `chunks(seq, id, text, source, page, char_offset, embedding)`, with
//!   embeddings stored as little-endian `f32` blobs and `seq` recording
//!   insertion order.
//!
//! The index is validated once when opened. Queries open their own read-only
//! connection, so a file that disappears or breaks later fails those queries
//! with `AppError::IndexUnavailable` and recovers once it is readable again.

use crate::types::{Chunk, IndexMeta, IndexStats, ScoredChunk};
use crate::vector_index::{rank_top_k, similarity, VectorIndex};
use medbot_core::{AppError, AppResult, EmbeddingSettings, SimilarityMetric};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS index_meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS chunks (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        text TEXT NOT NULL,
        source TEXT NOT NULL,
        page INTEGER,
        char_offset INTEGER,
        embedding BLOB NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source);
"#;

/// Read-only handle to a prebuilt SQLite vector index.
#[derive(Debug, Clone)]
pub struct SqliteIndex {
    path: PathBuf,
    meta: IndexMeta,
}

impl SqliteIndex {
    /// Open and validate an index against the configured embedding settings.
    ///
    /// # Errors
    /// `AppError::Config` if the file is missing or corrupt, or if its
    /// dimensions or metric differ from `expected`. An embedding model
    /// mismatch is only logged.
    pub fn open(path: &Path, expected: &EmbeddingSettings) -> AppResult<Self> {
        if !path.exists() {
            return Err(AppError::Config(format!(
                "Vector index not found at {}",
                path.display()
            )));
        }

        let corrupt = |e: rusqlite::Error| {
            AppError::Config(format!(
                "Vector index at {} is unreadable or corrupt: {}",
                path.display(),
                e
            ))
        };

        let conn = Connection::open_with_flags(path, read_only_flags()).map_err(corrupt)?;
        let meta = read_meta(&conn, path)?;

        let expected_bytes = (meta.dimensions * 4) as i64;
        let (count, min_len, max_len): (i64, Option<i64>, Option<i64>) = conn
            .query_row(
                "SELECT COUNT(*), MIN(length(embedding)), MAX(length(embedding)) FROM chunks",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(corrupt)?;
        if count > 0 && (min_len != Some(expected_bytes) || max_len != Some(expected_bytes)) {
            return Err(AppError::Config(format!(
                "Vector index at {} is corrupt: stored embeddings do not match {} dimensions",
                path.display(),
                meta.dimensions
            )));
        }

        if meta.dimensions != expected.dimensions {
            return Err(AppError::Config(format!(
                "Embedding dimension mismatch: index has {}, configured embedder produces {}",
                meta.dimensions, expected.dimensions
            )));
        }

        if meta.metric != expected.metric {
            return Err(AppError::Config(format!(
                "Similarity metric mismatch: index was built for {}, configuration says {}",
                meta.metric.as_str(),
                expected.metric.as_str()
            )));
        }

        match meta.embedding_model.as_deref() {
            Some(model) if model != expected.model => tracing::warn!(
                index_model = model,
                configured_model = %expected.model,
                "Index was built with a different embedding model"
            ),
            _ => {}
        }

        tracing::info!(
            path = %path.display(),
            chunks = count,
            dimensions = meta.dimensions,
            metric = meta.metric.as_str(),
            "Opened vector index"
        );

        Ok(Self {
            path: path.to_path_buf(),
            meta,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> AppResult<Connection> {
        Connection::open_with_flags(&self.path, read_only_flags()).map_err(|e| {
            AppError::IndexUnavailable(format!(
                "Failed to open vector index at {}: {}",
                self.path.display(),
                e
            ))
        })
    }
}

impl VectorIndex for SqliteIndex {
    fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    fn search(&self, query: &[f32], top_k: usize) -> AppResult<Vec<ScoredChunk>> {
        let unavailable =
            |e: rusqlite::Error| AppError::IndexUnavailable(format!("Failed to query chunks: {}", e));

        let conn = self.connect()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, text, source, page, char_offset, embedding FROM chunks ORDER BY seq",
            )
            .map_err(unavailable)?;

        let rows = stmt
            .query_map([], |row| {
                let chunk = Chunk {
                    id: row.get(0)?,
                    text: row.get(1)?,
                    source: row.get(2)?,
                    page: row.get::<_, Option<i64>>(3)?.map(|p| p as u32),
                    offset: row.get::<_, Option<i64>>(4)?.map(|o| o as u64),
                };
                let embedding: Vec<u8> = row.get(5)?;
                Ok((chunk, embedding))
            })
            .map_err(unavailable)?;

        let mut candidates = Vec::new();
        for row in rows {
            let (chunk, bytes) = row.map_err(unavailable)?;
            let embedding = bytes_to_embedding(&bytes).ok_or_else(|| {
                AppError::IndexUnavailable(format!("Chunk '{}' has a malformed embedding", chunk.id))
            })?;
            candidates.push(ScoredChunk {
                score: similarity(self.meta.metric, query, &embedding),
                chunk: Arc::new(chunk),
            });
        }

        let scanned = candidates.len();
        let ranked = rank_top_k(candidates, top_k);
        tracing::debug!(scanned, returned = ranked.len(), top_k, "Searched vector index");

        Ok(ranked)
    }

    fn stats(&self) -> AppResult<IndexStats> {
        let conn = self.connect()?;
        let (chunks, sources): (i64, i64) = conn
            .query_row(
                "SELECT COUNT(*), COUNT(DISTINCT source) FROM chunks",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(|e| AppError::IndexUnavailable(format!("Failed to count chunks: {}", e)))?;

        let size_bytes = std::fs::metadata(&self.path).map(|m| m.len())?;

        Ok(IndexStats {
            chunks_count: chunks as usize,
            sources_count: sources as usize,
            meta: self.meta.clone(),
            size_bytes,
        })
    }
}

/// Writer used by index builders and tests.
///
/// Re-inserting an existing chunk id replaces its content but keeps its
/// original position.
pub struct IndexWriter {
    conn: Connection,
    meta: IndexMeta,
}

impl IndexWriter {
    /// Create (or reopen for appending) an index file with the given metadata.
    pub fn create(path: &Path, meta: IndexMeta) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).map_err(write_error)?;
        conn.execute_batch(SCHEMA).map_err(write_error)?;

        let existing = read_meta_values(&conn).map_err(write_error)?;
        if let Some(dims) = existing.get("dimensions") {
            if dims != &meta.dimensions.to_string() {
                return Err(AppError::Config(format!(
                    "Index at {} already holds {}-dimensional embeddings",
                    path.display(),
                    dims
                )));
            }
        }

        let mut entries = vec![
            ("dimensions", meta.dimensions.to_string()),
            ("metric", meta.metric.as_str().to_string()),
        ];
        if let Some(model) = &meta.embedding_model {
            entries.push(("embedding_model", model.clone()));
        }
        for (key, value) in entries {
            conn.execute(
                "INSERT OR REPLACE INTO index_meta (key, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .map_err(write_error)?;
        }

        tracing::debug!("Initialized SQLite index at {:?}", path);
        Ok(Self { conn, meta })
    }

    /// Insert or replace one chunk.
    pub fn insert(&mut self, chunk: &Chunk, embedding: &[f32]) -> AppResult<()> {
        insert_chunk(&self.conn, &self.meta, chunk, embedding)
    }

    /// Insert many chunks in one transaction. Returns the number written.
    pub fn insert_batch(&mut self, items: &[(Chunk, Vec<f32>)]) -> AppResult<usize> {
        let tx = self.conn.transaction().map_err(write_error)?;
        for (chunk, embedding) in items {
            insert_chunk(&tx, &self.meta, chunk, embedding)?;
        }
        tx.commit().map_err(write_error)?;
        Ok(items.len())
    }
}

fn insert_chunk(
    conn: &Connection,
    meta: &IndexMeta,
    chunk: &Chunk,
    embedding: &[f32],
) -> AppResult<()> {
    if embedding.len() != meta.dimensions {
        return Err(AppError::InvalidInput(format!(
            "Chunk '{}' has {} dimensions, index expects {}",
            chunk.id,
            embedding.len(),
            meta.dimensions
        )));
    }

    conn.execute(
        "INSERT INTO chunks (id, text, source, page, char_offset, embedding)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(id) DO UPDATE SET
             text = excluded.text,
             source = excluded.source,
             page = excluded.page,
             char_offset = excluded.char_offset,
             embedding = excluded.embedding",
        params![
            chunk.id,
            chunk.text,
            chunk.source,
            chunk.page.map(i64::from),
            chunk.offset.map(|o| o as i64),
            embedding_to_bytes(embedding),
        ],
    )
    .map_err(write_error)?;

    Ok(())
}

fn write_error(e: rusqlite::Error) -> AppError {
    AppError::IndexUnavailable(format!("Failed to write vector index: {}", e))
}

fn read_only_flags() -> OpenFlags {
    OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX
}

fn read_meta_values(conn: &Connection) -> rusqlite::Result<HashMap<String, String>> {
    let mut stmt = conn.prepare("SELECT key, value FROM index_meta")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    rows.collect()
}

fn read_meta(conn: &Connection, path: &Path) -> AppResult<IndexMeta> {
    let values = read_meta_values(conn).map_err(|e| {
        AppError::Config(format!(
            "Vector index at {} is unreadable or corrupt: {}",
            path.display(),
            e
        ))
    })?;

    let missing = |key: &str| {
        AppError::Config(format!(
            "Vector index at {} has no '{}' metadata",
            path.display(),
            key
        ))
    };

    let dimensions = values
        .get("dimensions")
        .ok_or_else(|| missing("dimensions"))?
        .parse::<usize>()
        .map_err(|e| AppError::Config(format!("Invalid index dimensions: {}", e)))?;

    let metric_name = values.get("metric").ok_or_else(|| missing("metric"))?;
    let metric = SimilarityMetric::parse(metric_name)
        .ok_or_else(|| AppError::Config(format!("Unknown index metric: {}", metric_name)))?;

    Ok(IndexMeta {
        dimensions,
        metric,
        embedding_model: values.get("embedding_model").cloned(),
    })
}

/// Look up one chunk by id. Used by tooling that inspects an index.
pub fn find_chunk(index: &SqliteIndex, id: &str) -> AppResult<Option<Chunk>> {
    let conn = index.connect()?;
    conn.query_row(
        "SELECT id, text, source, page, char_offset FROM chunks WHERE id = ?1",
        params![id],
        |row| {
            Ok(Chunk {
                id: row.get(0)?,
                text: row.get(1)?,
                source: row.get(2)?,
                page: row.get::<_, Option<i64>>(3)?.map(|p| p as u32),
                offset: row.get::<_, Option<i64>>(4)?.map(|o| o as u64),
            })
        },
    )
    .optional()
    .map_err(|e| AppError::IndexUnavailable(format!("Failed to look up chunk: {}", e)))
}

/// Convert embedding vector to bytes for storage.
fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Convert bytes back to an embedding vector.
fn bytes_to_embedding(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }

    Some(
        bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
    )
}
