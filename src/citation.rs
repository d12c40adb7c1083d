use crate::models::{Citation, RetrievedChunk};

/// Build the display reference for one chunk. `include_line` is only set for
/// citation-grade collections; when the store carries no explicit line
/// metadata the line number is approximated from the chunk text (best
/// effort, documented fallback).
pub fn citation_for_chunk(
    chunk: &RetrievedChunk,
    collection_label: &str,
    ref_index: usize,
    include_line: bool,
) -> Citation {
    let meta = &chunk.metadata;

    let line = if include_line {
        Some(
            meta.start_line
                .unwrap_or_else(|| approximate_line_number(&chunk.text)),
        )
    } else {
        None
    };

    Citation {
        ref_index,
        collection_label: collection_label.to_string(),
        document_name: meta.source_file.as_deref().map(basename),
        date: meta.date.clone(),
        page: meta.page.map(|p| p + 1),
        line,
    }
}

pub fn render_citation(citation: &Citation) -> String {
    let mut fields = Vec::new();
    if let Some(doc) = &citation.document_name {
        fields.push(format!("Document: {doc}"));
    }
    if let Some(date) = &citation.date {
        fields.push(format!("Date: {date}"));
    }
    if let Some(page) = citation.page {
        fields.push(format!("Page: {page}"));
    }
    if let Some(line) = citation.line {
        fields.push(format!("Line: {line}"));
    }

    if fields.is_empty() {
        return format!("[{}] Unknown source", citation.ref_index);
    }

    format!(
        "[{}] {} Collection - {}",
        citation.ref_index,
        citation.collection_label,
        fields.join(", ")
    )
}

pub fn format_citation(
    chunk: &RetrievedChunk,
    collection_label: &str,
    ref_index: usize,
    include_line: bool,
) -> String {
    render_citation(&citation_for_chunk(
        chunk,
        collection_label,
        ref_index,
        include_line,
    ))
}

/// Render a citation-grade chunk as quoted lines, each carrying its own
/// reference. Blank lines are dropped; the line counter starts at the
/// chunk's recorded start line (or 1) and advances per emitted line. Every
/// line of one chunk shares the same ref index.
pub fn render_cited_lines(
    chunk: &RetrievedChunk,
    collection_label: &str,
    ref_index: usize,
) -> String {
    let base = citation_for_chunk(chunk, collection_label, ref_index, true);
    let mut line_no = chunk.metadata.start_line.unwrap_or(1);

    let mut out = Vec::new();
    for line in chunk.text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let citation = Citation {
            line: Some(line_no),
            ..base.clone()
        };
        out.push(format!("\"{}\" {}", trimmed, render_citation(&citation)));
        line_no += 1;
    }

    out.join("\n")
}

/// Best-effort line number for a chunk without explicit line metadata: the
/// 1-indexed position of the first non-blank line among the first five, or 1
/// when all five are blank.
fn approximate_line_number(text: &str) -> i64 {
    for (index, line) in text.lines().take(5).enumerate() {
        if !line.trim().is_empty() {
            return index as i64 + 1;
        }
    }
    1
}

fn basename(path: &str) -> String {
    path.rsplit(['/', '\\']).next().unwrap_or(path).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkMetadata;

    fn chunk(text: &str, metadata: ChunkMetadata) -> RetrievedChunk {
        RetrievedChunk {
            text: text.to_string(),
            metadata,
        }
    }

    #[test]
    fn renders_all_fields_with_one_indexed_page() {
        let c = chunk(
            "Input tax credit shall not be available...",
            ChunkMetadata {
                source_file: Some("papers/ey-gst-alert.pdf".to_string()),
                date: Some("2024-01-15".to_string()),
                page: Some(4),
                ..ChunkMetadata::default()
            },
        );

        let rendered = format_citation(&c, "EY-Papers", 1, false);
        assert_eq!(
            rendered,
            "[1] EY-Papers Collection - Document: ey-gst-alert.pdf, Date: 2024-01-15, Page: 5"
        );
    }

    #[test]
    fn formatting_is_idempotent() {
        let c = chunk(
            "Section 22(1) Every supplier shall be liable to be registered...",
            ChunkMetadata {
                source_file: Some("cgst-act.pdf".to_string()),
                page: Some(14),
                start_line: Some(3),
                ..ChunkMetadata::default()
            },
        );

        let first = format_citation(&c, "Bare-Law", 2, true);
        let second = format_citation(&c, "Bare-Law", 2, true);
        assert_eq!(first, second);
        assert!(first.contains("Page: 15"));
        assert!(first.contains("Line: 3"));
    }

    #[test]
    fn missing_metadata_renders_unknown_source() {
        let c = chunk("orphan text", ChunkMetadata::default());
        assert_eq!(format_citation(&c, "Cases", 3, false), "[3] Unknown source");
    }

    #[test]
    fn line_number_approximated_from_first_nonblank_line() {
        let c = chunk("\n\nSection 9 levy...\nmore", ChunkMetadata::default());
        let rendered = format_citation(&c, "Bare-Law", 1, true);
        assert!(rendered.contains("Line: 3"));

        let blank = chunk("\n\n\n\n\n", ChunkMetadata::default());
        let rendered = format_citation(&blank, "Bare-Law", 1, true);
        assert!(rendered.contains("Line: 1"));
    }

    #[test]
    fn cited_lines_share_ref_index_and_advance_line_counter() {
        let c = chunk(
            "Section 22(1) Every supplier shall be liable.\n\nSection 22(2) Provided that...",
            ChunkMetadata {
                source_file: Some("cgst-act.pdf".to_string()),
                page: Some(14),
                start_line: Some(8),
                ..ChunkMetadata::default()
            },
        );

        let rendered = render_cited_lines(&c, "Bare-Law", 4);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("\"Section 22(1)"));
        assert!(lines[0].contains("[4] Bare-Law Collection"));
        assert!(lines[0].contains("Line: 8"));
        assert!(lines[1].contains("[4] Bare-Law Collection"));
        assert!(lines[1].contains("Line: 9"));
        assert!(rendered.matches("Page: 15").count() == 2);
    }
}
