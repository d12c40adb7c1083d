use std::sync::Arc;

use anyhow::Result;

use crate::chroma_store::DocumentSearch;
use crate::config::{AppConfig, CollectionsConfig, RetrievalConfig};
use crate::gemini::TextGenerator;
use crate::orchestrator::{ChainedStrategy, LayeredStrategy, RetrievalStrategy, SourceTracker};
use crate::retrieval::CollectionRetriever;

const SYSTEM_PROMPT: &str = "You are a GST compliance assistant engaged in a conversational session. \
Answer strictly using the provided context. \
Give the answer in detail. Mention all the sections and clauses as mentioned in the papers. \
You have access to the conversation history from this session, which may provide context for follow-up questions. \
If the current question refers to previous questions or answers, use that context to provide a more complete response. \
IMPORTANT: For each part of your answer, you must cite the exact source using the reference number format. \
Each document in the context has a reference number like [1], [2], etc. with full citation details. \
When referencing information in your answer, use the reference number in brackets (e.g., [1], [2]) inline with your text. \
Then, at the end of your answer, provide a 'References' section listing all cited sources with their full details. \
For example, if you reference document [1], mention it inline like: 'According to [1], the case involves...' \
Then at the end, include: 'References: [1] EY-Papers Collection - Document: example.pdf, Date: 2024-01-15, Page: 5' \
If information comes from multiple sources, cite all relevant reference numbers.";

const CLOSING_INSTRUCTIONS: &str = "Remember to use reference numbers [1], [2], etc. inline in your answer, \
and provide a complete References section at the end with full citation details. \
If the question refers to previous conversation, use that context to provide a more complete and relevant answer.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StrategyKind {
    Layered,
    Chained,
}

/// Builds one pipeline per request from shared clients. Chains are cheap to
/// construct, and a fresh chain per invocation keeps each Source Tracker
/// scoped to exactly one query.
#[derive(Clone)]
pub struct ChainBuilder {
    store: Arc<dyn DocumentSearch>,
    llm: Arc<dyn TextGenerator>,
    collections: CollectionsConfig,
    retrieval: RetrievalConfig,
}

impl ChainBuilder {
    pub fn new(
        config: &AppConfig,
        store: Arc<dyn DocumentSearch>,
        llm: Arc<dyn TextGenerator>,
    ) -> Self {
        Self {
            store,
            llm,
            collections: config.collections.clone(),
            retrieval: config.retrieval.clone(),
        }
    }

    /// Map an optional collection selector to a strategy. `None` means the
    /// default layered pipeline; an unknown name means the caller referenced
    /// a collection this deployment does not serve.
    pub fn strategy_for(&self, collection_name: Option<&str>) -> Option<StrategyKind> {
        let Some(name) = collection_name else {
            return Some(StrategyKind::Layered);
        };

        if name.eq_ignore_ascii_case(&self.collections.handbook)
            || name.eq_ignore_ascii_case(&self.collections.bare_law)
        {
            Some(StrategyKind::Layered)
        } else if name.eq_ignore_ascii_case(&self.collections.ey_papers)
            || name.eq_ignore_ascii_case(&self.collections.cases)
        {
            Some(StrategyKind::Chained)
        } else {
            None
        }
    }

    pub fn build(&self, kind: StrategyKind) -> RagChain {
        let strategy = match kind {
            StrategyKind::Layered => RetrievalStrategy::Layered(LayeredStrategy::new(
                CollectionRetriever::new(
                    self.store.clone(),
                    self.collections.handbook.clone(),
                    self.retrieval.reasoning_k,
                ),
                CollectionRetriever::new(
                    self.store.clone(),
                    self.collections.bare_law.clone(),
                    self.retrieval.citation_k,
                ),
            )),
            StrategyKind::Chained => RetrievalStrategy::Chained(ChainedStrategy::new(
                CollectionRetriever::new(
                    self.store.clone(),
                    self.collections.ey_papers.clone(),
                    self.retrieval.chained_k,
                ),
                CollectionRetriever::new(
                    self.store.clone(),
                    self.collections.cases.clone(),
                    self.retrieval.chained_k,
                ),
            )),
        };

        let tracker = SourceTracker::new();
        tracker.reset_to_zero(&strategy.collection_names());

        RagChain {
            strategy,
            llm: self.llm.clone(),
            tracker,
        }
    }
}

/// The invocable pipeline paired with its Source Tracker handle. The caller
/// resets the tracker immediately before invoking and reads the counts
/// afterwards.
pub struct RagChain {
    strategy: RetrievalStrategy,
    llm: Arc<dyn TextGenerator>,
    pub tracker: SourceTracker,
}

impl RagChain {
    pub fn reset_tracker(&self) {
        self.tracker.reset_to_zero(&self.strategy.collection_names());
    }

    pub async fn invoke(&self, question: &str, history: &[(String, String)]) -> Result<String> {
        let retrieved = self
            .strategy
            .retrieve_context(question, Some(self.llm.as_ref()), &self.tracker)
            .await?;

        let prompt = build_prompt(&retrieved.context, &retrieved.question, history);
        let answer = self.llm.generate(&prompt).await?;
        Ok(answer.trim().to_string())
    }
}

pub(crate) fn build_prompt(
    context: &str,
    question: &str,
    history: &[(String, String)],
) -> String {
    let history_text = render_history(history);
    format!(
        "{SYSTEM_PROMPT}\n\n\
         Previous Conversation History:\n{history_text}\n\n\
         Current Context:\n{context}\n\n\
         Current Question:\n{question}\n\n\
         {CLOSING_INSTRUCTIONS}"
    )
}

fn render_history(history: &[(String, String)]) -> String {
    if history.is_empty() {
        return "No previous conversation.".to_string();
    }

    history
        .iter()
        .map(|(question, answer)| format!("User: {question}\nAssistant: {answer}"))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChunkMetadata, RetrievedChunk};
    use async_trait::async_trait;

    struct EmptyStore;

    #[async_trait]
    impl DocumentSearch for EmptyStore {
        async fn search(
            &self,
            collection: &str,
            _query: &str,
            _k: usize,
        ) -> Result<Vec<RetrievedChunk>> {
            if collection == "Bare-Law" {
                return Ok(vec![RetrievedChunk {
                    text: "Section 22(1) Every supplier shall be liable to be registered."
                        .to_string(),
                    metadata: ChunkMetadata {
                        source_file: Some("cgst-act.pdf".to_string()),
                        page: Some(14),
                        start_line: Some(1),
                        ..ChunkMetadata::default()
                    },
                }]);
            }
            Ok(vec![])
        }
    }

    struct CannedModel;

    #[async_trait]
    impl TextGenerator for CannedModel {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Ok("The threshold is set by section 22(1) [1]. References: [1] ...".to_string())
        }
    }

    fn builder() -> ChainBuilder {
        let config = AppConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            chroma_base_url: "http://127.0.0.1:8000".to_string(),
            gemini_api_key: "test".to_string(),
            gemini_model: "test-model".to_string(),
            cf_account_id: "acc".to_string(),
            cf_api_token: "tok".to_string(),
            cf_embeddings_model: "embed".to_string(),
            request_timeout_secs: 5,
            upstream_timeout_secs: 5,
            collections: CollectionsConfig {
                handbook: "Handbook".to_string(),
                bare_law: "Bare-Law".to_string(),
                ey_papers: "EY-Papers".to_string(),
                cases: "Cases".to_string(),
            },
            retrieval: RetrievalConfig {
                reasoning_k: 3,
                citation_k: 5,
                chained_k: 4,
                max_history_turns: 5,
            },
            sheets: None,
        };

        ChainBuilder::new(&config, Arc::new(EmptyStore), Arc::new(CannedModel))
    }

    #[test]
    fn selector_maps_collections_to_strategies() {
        let builder = builder();
        assert_eq!(builder.strategy_for(None), Some(StrategyKind::Layered));
        assert_eq!(
            builder.strategy_for(Some("bare-law")),
            Some(StrategyKind::Layered)
        );
        assert_eq!(
            builder.strategy_for(Some("EY-Papers")),
            Some(StrategyKind::Chained)
        );
        assert_eq!(builder.strategy_for(Some("Unknown")), None);
    }

    #[tokio::test]
    async fn invoke_answers_and_tracks_sources() {
        let chain = builder().build(StrategyKind::Layered);
        chain.reset_tracker();

        let answer = chain
            .invoke("What is GST registration threshold?", &[])
            .await
            .expect("invoke");
        assert!(answer.contains("section 22(1)"));

        let counts = chain.tracker.get();
        assert_eq!(counts["Handbook"], 0);
        assert_eq!(counts["Bare-Law"], 1);
    }

    #[test]
    fn prompt_carries_history_and_context() {
        let history = vec![("What is ITC?".to_string(), "Input tax credit [1].".to_string())];
        let prompt = build_prompt("CONTEXT BODY", "And for capital goods?", &history);

        assert!(prompt.contains("User: What is ITC?"));
        assert!(prompt.contains("Assistant: Input tax credit [1]."));
        assert!(prompt.contains("Current Context:\nCONTEXT BODY"));
        assert!(prompt.contains("Current Question:\nAnd for capital goods?"));

        let empty = build_prompt("ctx", "q", &[]);
        assert!(empty.contains("No previous conversation."));
    }
}
