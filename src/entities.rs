use std::collections::HashSet;

use regex::Regex;

use crate::gemini::TextGenerator;

/// Below this input length the model enrichment pass is skipped entirely.
const MIN_ENRICHMENT_LEN: usize = 200;
/// Enrichment prompts carry at most this many characters of input text.
const ENRICHMENT_PREFIX_CHARS: usize = 4000;
/// Extracted identifiers shorter than this are discarded as noise.
const MIN_IDENTIFIER_LEN: usize = 3;

/// Extract case numbers and case citations from retrieved text. The regex
/// pass always runs; when a model is supplied and the text is long enough,
/// one enrichment call merges additional identifiers into the result. The
/// enrichment call is best effort and never aborts extraction.
pub async fn extract_case_identifiers(
    text: &str,
    model: Option<&dyn TextGenerator>,
) -> HashSet<String> {
    let mut identifiers = regex_identifiers(text);

    if let Some(model) = model {
        if text.len() >= MIN_ENRICHMENT_LEN {
            let prefix: String = text.chars().take(ENRICHMENT_PREFIX_CHARS).collect();
            let prompt = format!(
                "List every case number or case citation that appears in the text below, \
                 one per line, with no other commentary. If there are none, return nothing.\n\n\
                 Text:\n{prefix}"
            );

            match model.generate(&prompt).await {
                Ok(output) => {
                    for line in output.lines() {
                        let trimmed = line.trim();
                        if trimmed.len() >= MIN_IDENTIFIER_LEN {
                            identifiers.insert(trimmed.to_string());
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!("entity enrichment call failed, using regex-only result: {err:#}");
                }
            }
        }
    }

    identifiers
}

fn regex_identifiers(text: &str) -> HashSet<String> {
    let patterns = [
        // "Case No. 1234 of 2023", "Case No: 45/2021"
        r"(?i)\bcase\s+no\.?\s*:?\s*[A-Z0-9][A-Za-z0-9/\-\.]*(?:\s+of\s+\d{4})?",
        // "W.P. No. 13090 of 2023", "W.P.(C) No. 55/2022"
        r"(?i)\bw\.?\s*p\.?\s*(?:\(c\))?\s*no\.?\s*\d[\d/\-]*(?:\s+of\s+\d{4})?",
        // "Union of India v. Mohit Minerals", "Safari Retreats vs. CCGST"
        r"\b[A-Z][\w\.&]*(?:\s+[A-Z&a-z][\w\.&]*){0,4}\s+vs?\.\s+[A-Z][\w\.&]*(?:\s+[A-Z&a-z][\w\.&]*){0,4}",
        // "2022 SCC", "2019 GSTR"
        r"\b(?:19|20)\d{2}\s+[A-Z]{2,6}\b",
    ];

    let mut out = HashSet::new();
    for pattern in patterns {
        let re = Regex::new(pattern).unwrap_or_else(|_| Regex::new("^$").unwrap());
        for found in re.find_iter(text) {
            let candidate = found.as_str().trim();
            if candidate.len() >= MIN_IDENTIFIER_LEN {
                out.insert(candidate.to_string());
            }
        }
    }

    out
}
