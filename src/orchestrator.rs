use std::sync::{Arc, Mutex};

use anyhow::Result;

use crate::citation::{format_citation, render_cited_lines};
use crate::entities::extract_case_identifiers;
use crate::gemini::TextGenerator;
use crate::models::{RetrievalContext, SourceCounts};
use crate::retrieval::CollectionRetriever;

/// Relevance-gate prompts carry at most this many characters of reasoning
/// text.
const RELEVANCE_PREFIX_CHARS: usize = 1500;
/// At most this many characters of reasoning text are appended to the
/// citation-grade query as a retrieval hint.
const CONTEXT_HINT_CHARS: usize = 300;

const EMPTY_CONTEXT_PLACEHOLDER: &str = "No relevant context found.";

/// Per-invocation tally of how many chunks each collection contributed.
/// The caller resets it immediately before each top-level query; only the
/// orchestrator writes to it during the call.
#[derive(Clone, Default)]
pub struct SourceTracker {
    counts: Arc<Mutex<SourceCounts>>,
}

impl SourceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset_to_zero(&self, collections: &[String]) {
        let mut guard = lock_counts(&self.counts);
        guard.clear();
        for name in collections {
            guard.insert(name.clone(), 0);
        }
    }

    pub fn update(&self, counts: SourceCounts) {
        let mut guard = lock_counts(&self.counts);
        for (collection, count) in counts {
            guard.insert(collection, count);
        }
    }

    pub fn get(&self) -> SourceCounts {
        lock_counts(&self.counts).clone()
    }
}

fn lock_counts(counts: &Mutex<SourceCounts>) -> std::sync::MutexGuard<'_, SourceCounts> {
    match counts.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Two-hop retrieval: query the primary collection, mine its results for
/// case identifiers, and use them to refine the secondary query. The
/// secondary hop is skipped entirely when no identifiers surface.
pub struct ChainedStrategy {
    primary: CollectionRetriever,
    secondary: CollectionRetriever,
}

impl ChainedStrategy {
    pub fn new(primary: CollectionRetriever, secondary: CollectionRetriever) -> Self {
        Self { primary, secondary }
    }

    pub async fn retrieve_context(
        &self,
        question: &str,
        model: Option<&dyn TextGenerator>,
        tracker: &SourceTracker,
    ) -> Result<RetrievalContext> {
        let primary_label = self.primary.collection().to_string();
        let secondary_label = self.secondary.collection().to_string();

        let primary_chunks = self.primary.fetch(question).await?;

        let mut ref_index = 0;
        let primary_context = primary_chunks
            .iter()
            .map(|chunk| {
                ref_index += 1;
                format!(
                    "{}\n{}",
                    chunk.text,
                    format_citation(chunk, &primary_label, ref_index, false)
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let identifiers = extract_case_identifiers(&primary_context, model).await;

        let mut secondary_chunks = Vec::new();
        let mut secondary_context = String::new();
        if !identifiers.is_empty() {
            // Sets are unordered; sort so the refined query (and therefore
            // the rendered context) is deterministic for a given result set.
            let mut sorted: Vec<String> = identifiers.into_iter().collect();
            sorted.sort();
            let refined_query = format!("{} {}", question, sorted.join(" "));

            secondary_chunks = self.secondary.fetch(&refined_query).await?;
            secondary_context = secondary_chunks
                .iter()
                .map(|chunk| {
                    ref_index += 1;
                    format!(
                        "{}\n{}",
                        chunk.text,
                        format_citation(chunk, &secondary_label, ref_index, false)
                    )
                })
                .collect::<Vec<_>>()
                .join("\n\n");
        }

        let mut context = format!("# {primary_label} Collection\n\n{primary_context}");
        if !secondary_context.is_empty() {
            context.push_str(&format!(
                "\n\n# {secondary_label} Collection\n\n{secondary_context}"
            ));
        }

        let mut source_counts = SourceCounts::new();
        source_counts.insert(primary_label, primary_chunks.len());
        source_counts.insert(secondary_label, secondary_chunks.len());
        tracker.update(source_counts.clone());

        Ok(RetrievalContext {
            context,
            question: question.to_string(),
            source_counts,
        })
    }
}

/// Pairs a reasoning-only collection (grounding text, never cited) with a
/// citation-grade collection rendered line by line. The reasoning side is
/// optionally relevance-gated by the model; the citation query is enhanced
/// for direct factual questions and hinted with reasoning text.
pub struct LayeredStrategy {
    reasoning: CollectionRetriever,
    citation: CollectionRetriever,
}

impl LayeredStrategy {
    pub fn new(reasoning: CollectionRetriever, citation: CollectionRetriever) -> Self {
        Self { reasoning, citation }
    }

    pub async fn retrieve_context(
        &self,
        question: &str,
        model: Option<&dyn TextGenerator>,
        tracker: &SourceTracker,
    ) -> Result<RetrievalContext> {
        let reasoning_label = self.reasoning.collection().to_string();
        let citation_label = self.citation.collection().to_string();

        let reasoning_chunks = self.reasoning.fetch(question).await?;

        let reasoning_text = reasoning_chunks
            .iter()
            .map(|chunk| chunk.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let relevant = !reasoning_chunks.is_empty()
            && is_reasoning_relevant(question, &reasoning_text, model).await;

        let reasoning_context = if relevant { reasoning_text } else { String::new() };
        let reasoning_count = if relevant { reasoning_chunks.len() } else { 0 };

        let mut query = question.to_string();
        if is_direct_factual_question(question) {
            query.push_str(" in detail");
        }
        if !reasoning_context.is_empty() {
            let hint: String = reasoning_context.chars().take(CONTEXT_HINT_CHARS).collect();
            query.push(' ');
            query.push_str(&hint);
        }

        let citation_chunks = self.citation.fetch(&query).await?;
        let citation_context = citation_chunks
            .iter()
            .enumerate()
            .map(|(index, chunk)| render_cited_lines(chunk, &citation_label, index + 1))
            .collect::<Vec<_>>()
            .join("\n\n");

        let mut sections = Vec::new();
        if !reasoning_context.is_empty() {
            sections.push(format!(
                "# {reasoning_label} Collection (background reasoning only - do not cite)\n\n{reasoning_context}"
            ));
        }
        if !citation_context.is_empty() {
            sections.push(format!(
                "# {citation_label} Collection (for citations with page and line numbers)\n\n{citation_context}"
            ));
        }
        let context = if sections.is_empty() {
            EMPTY_CONTEXT_PLACEHOLDER.to_string()
        } else {
            sections.join("\n\n")
        };

        let mut source_counts = SourceCounts::new();
        source_counts.insert(reasoning_label, reasoning_count);
        source_counts.insert(citation_label, citation_chunks.len());
        tracker.update(source_counts.clone());

        Ok(RetrievalContext {
            context,
            question: question.to_string(),
            source_counts,
        })
    }
}

/// One relevance-check call over a capped prefix of the reasoning text.
/// Any failure of the gate fails open: a broken gate must never block
/// retrieval.
async fn is_reasoning_relevant(
    question: &str,
    reasoning_text: &str,
    model: Option<&dyn TextGenerator>,
) -> bool {
    let Some(model) = model else {
        return true;
    };

    let prefix: String = reasoning_text.chars().take(RELEVANCE_PREFIX_CHARS).collect();
    let prompt = format!(
        "Question: {question}\n\nBackground:\n{prefix}\n\n\
         Is this background text relevant to answering the question? Answer yes or no."
    );

    match model.generate(&prompt).await {
        Ok(reply) => !reply.trim().to_lowercase().starts_with("no"),
        Err(err) => {
            tracing::warn!("relevance gate failed, assuming relevant: {err:#}");
            true
        }
    }
}

fn is_direct_factual_question(question: &str) -> bool {
    let q = question.trim().to_lowercase();
    [
        "what is",
        "what are",
        "explain",
        "define",
        "describe",
        "tell me about",
        "how is",
        "how are",
        "who is",
        "who are",
        "when is",
        "when are",
        "where is",
        "where are",
    ]
    .iter()
    .any(|prefix| q.starts_with(prefix))
}

/// The orchestration entry point the chain invokes: one of the two
/// interchangeable retrieval strategies.
pub enum RetrievalStrategy {
    Chained(ChainedStrategy),
    Layered(LayeredStrategy),
}

impl RetrievalStrategy {
    pub fn collection_names(&self) -> Vec<String> {
        match self {
            RetrievalStrategy::Chained(s) => vec![
                s.primary.collection().to_string(),
                s.secondary.collection().to_string(),
            ],
            RetrievalStrategy::Layered(s) => vec![
                s.reasoning.collection().to_string(),
                s.citation.collection().to_string(),
            ],
        }
    }

    pub async fn retrieve_context(
        &self,
        question: &str,
        model: Option<&dyn TextGenerator>,
        tracker: &SourceTracker,
    ) -> Result<RetrievalContext> {
        match self {
            RetrievalStrategy::Chained(s) => s.retrieve_context(question, model, tracker).await,
            RetrievalStrategy::Layered(s) => s.retrieve_context(question, model, tracker).await,
        }
    }
}
