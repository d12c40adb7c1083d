pub mod pdf;

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;

use crate::chroma_store::ChromaStore;
use crate::models::{ChunkMetadata, RetrievedChunk};

/// Loads a local PDF, chunks its text layer, and upserts the chunks into a
/// named collection. Each chunk carries the metadata the citation formatter
/// reads back out at query time.
#[derive(Clone)]
pub struct Ingestor {
    store: ChromaStore,
}

#[derive(Debug, Clone)]
pub struct IngestReport {
    pub source_file: String,
    pub page_count: usize,
    pub chunk_count: usize,
}

impl Ingestor {
    pub fn new(store: ChromaStore) -> Self {
        Self { store }
    }

    pub async fn ingest_pdf(
        &self,
        path: &Path,
        collection: &str,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Result<IngestReport> {
        let source_file = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("document.pdf")
            .to_string();

        let path_for_task = path.to_path_buf();
        let pages = tokio::task::spawn_blocking(move || pdf::extract_page_texts(&path_for_task))
            .await
            .context("PDF extraction task panicked")??;

        if pages.iter().all(|page| page.trim().is_empty()) {
            anyhow::bail!(
                "no text layer found in {}; scanned PDFs must be OCRed before ingestion",
                path.display()
            );
        }

        let date = Utc::now().format("%Y-%m-%d").to_string();

        let mut documents = Vec::new();
        for (page_index, page_text) in pages.iter().enumerate() {
            for piece in split_with_overlap(page_text, chunk_size, chunk_overlap) {
                documents.push(RetrievedChunk {
                    text: piece.text,
                    metadata: ChunkMetadata {
                        source_file: Some(source_file.clone()),
                        page: Some(page_index as i64),
                        date: Some(date.clone()),
                        start_line: Some(piece.start_line),
                        ..ChunkMetadata::default()
                    },
                });
            }
        }

        if documents.is_empty() {
            anyhow::bail!("no chunks generated from {}", path.display());
        }

        let chunk_count = self.store.add_documents(collection, &documents).await?;

        Ok(IngestReport {
            source_file,
            page_count: pages.len(),
            chunk_count,
        })
    }
}

struct ChunkPiece {
    text: String,
    /// 1-indexed line within the page where the chunk's content begins.
    start_line: i64,
}

fn split_with_overlap(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<ChunkPiece> {
    if chunk_size == 0 || text.trim().is_empty() {
        return vec![];
    }

    let chars: Vec<char> = text.trim_end().chars().collect();
    let step = chunk_size.saturating_sub(chunk_overlap).max(1);

    let mut out = Vec::new();
    let mut start = 0usize;
    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());

        let window: String = chars[start..end].iter().collect();
        let piece = window.trim();
        if !piece.is_empty() {
            let content_offset = chars[start..end]
                .iter()
                .position(|c| !c.is_whitespace())
                .unwrap_or(0);
            let start_line = chars[..start + content_offset]
                .iter()
                .filter(|&&c| c == '\n')
                .count() as i64
                + 1;

            out.push(ChunkPiece {
                text: piece.to_string(),
                start_line,
            });
        }

        if end == chars.len() {
            break;
        }
        start += step;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_page_stays_one_chunk() {
        let pieces = split_with_overlap("Section 22(1) Every supplier shall be liable.", 1000, 200);
        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0].start_line, 1);
    }

    #[test]
    fn long_text_splits_with_overlap() {
        let text = "abcdefghij".repeat(30);
        let pieces = split_with_overlap(&text, 100, 20);
        assert!(pieces.len() >= 3);

        // Consecutive chunks share their overlap region.
        let first: String = pieces[0].text.chars().skip(80).collect();
        assert!(pieces[1].text.starts_with(&first));
    }

    #[test]
    fn start_line_tracks_newlines_before_chunk() {
        let text = "line one\nline two\nline three\nline four";
        let pieces = split_with_overlap(text, 20, 0);
        assert_eq!(pieces[0].start_line, 1);
        assert!(pieces[1].start_line > 1);
    }

    #[test]
    fn blank_pages_produce_no_chunks() {
        assert!(split_with_overlap("   \n\n  ", 100, 10).is_empty());
    }
}
