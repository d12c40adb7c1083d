use std::sync::Arc;

use anyhow::Result;

use crate::chroma_store::DocumentSearch;
use crate::models::RetrievedChunk;

/// Fetches top-k chunks from one named collection. `k` is fixed per instance
/// at construction; reasoning-only collections use a smaller k than
/// citation-grade ones. No retry logic lives here; failures propagate to the
/// orchestrator.
#[derive(Clone)]
pub struct CollectionRetriever {
    store: Arc<dyn DocumentSearch>,
    collection: String,
    k: usize,
}

impl CollectionRetriever {
    pub fn new(store: Arc<dyn DocumentSearch>, collection: impl Into<String>, k: usize) -> Self {
        Self {
            store,
            collection: collection.into(),
            k,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub async fn fetch(&self, query: &str) -> Result<Vec<RetrievedChunk>> {
        let mut chunks = self.store.search(&self.collection, query, self.k).await?;
        chunks.truncate(self.k);
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkMetadata;
    use async_trait::async_trait;

    struct OverfullStore;

    #[async_trait]
    impl DocumentSearch for OverfullStore {
        async fn search(
            &self,
            _collection: &str,
            _query: &str,
            _k: usize,
        ) -> Result<Vec<RetrievedChunk>> {
            Ok((0..10)
                .map(|n| RetrievedChunk {
                    text: format!("chunk {n}"),
                    metadata: ChunkMetadata::default(),
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn fetch_never_exceeds_k() {
        let retriever = CollectionRetriever::new(Arc::new(OverfullStore), "Bare-Law", 4);
        let chunks = retriever.fetch("section 22").await.expect("fetch");
        assert_eq!(chunks.len(), 4);
        assert_eq!(retriever.collection(), "Bare-Law");
    }
}
