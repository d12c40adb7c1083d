use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::embeddings::EmbeddingClient;
use crate::models::{ChunkMetadata, RetrievedChunk};

/// Seam over the vector document store. The orchestrator and retrievers only
/// ever see this trait; tests stub it.
#[async_trait]
pub trait DocumentSearch: Send + Sync {
    async fn search(&self, collection: &str, query: &str, k: usize)
        -> Result<Vec<RetrievedChunk>>;
}

/// Chroma server client. Collection names are resolved to server-side ids
/// once and cached for the life of the process.
#[derive(Clone)]
pub struct ChromaStore {
    client: Client,
    base_url: String,
    embedder: EmbeddingClient,
    collection_ids: Arc<RwLock<HashMap<String, String>>>,
}

impl ChromaStore {
    pub fn new(config: &AppConfig, embedder: EmbeddingClient) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.upstream_timeout_secs))
            .build()
            .context("failed to build Chroma HTTP client")?;

        Ok(Self {
            client,
            base_url: config.chroma_base_url.clone(),
            embedder,
            collection_ids: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Resolve a collection name to its server id. Returns `None` when the
    /// collection does not exist yet; that is a valid state, not an error.
    async fn resolve_collection(&self, name: &str) -> Result<Option<String>> {
        {
            let known = self.collection_ids.read().await;
            if let Some(id) = known.get(name) {
                return Ok(Some(id.clone()));
            }
        }

        let url = format!("{}/api/v1/collections/{}", self.base_url, name);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("failed to contact Chroma while resolving collection")?;

        if !response.status().is_success() {
            return Ok(None);
        }

        let info = response
            .json::<CollectionInfo>()
            .await
            .context("failed to decode Chroma collection info")?;

        self.collection_ids
            .write()
            .await
            .insert(name.to_string(), info.id.clone());
        Ok(Some(info.id))
    }

    /// Resolve a collection, creating it server-side if missing. Used by the
    /// ingestion path; the query path never creates collections.
    pub async fn ensure_collection(&self, name: &str) -> Result<String> {
        if let Some(id) = self.resolve_collection(name).await? {
            return Ok(id);
        }

        let url = format!("{}/api/v1/collections", self.base_url);
        let info = self
            .client
            .post(url)
            .json(&json!({ "name": name, "get_or_create": true }))
            .send()
            .await
            .context("failed to contact Chroma while creating collection")?
            .error_for_status()
            .context("Chroma failed to create collection")?
            .json::<CollectionInfo>()
            .await
            .context("failed to decode Chroma create-collection response")?;

        self.collection_ids
            .write()
            .await
            .insert(name.to_string(), info.id.clone());
        Ok(info.id)
    }

    /// Add documents in batches with retries, embedding each batch first.
    /// Returns the number of documents added.
    pub async fn add_documents(
        &self,
        collection: &str,
        documents: &[RetrievedChunk],
    ) -> Result<usize> {
        if documents.is_empty() {
            return Ok(0);
        }

        let collection_id = self.ensure_collection(collection).await?;

        const BATCH_SIZE: usize = 20;
        const MAX_RETRIES: u32 = 3;

        let mut total_added = 0usize;
        for batch in documents.chunks(BATCH_SIZE) {
            let texts: Vec<String> = batch.iter().map(|d| d.text.clone()).collect();
            let embeddings = self.embedder.embed_batch(&texts).await?;

            let ids: Vec<String> = batch.iter().map(|_| Uuid::new_v4().to_string()).collect();
            let metadatas: Vec<serde_json::Value> = batch
                .iter()
                .map(|d| serde_json::to_value(&d.metadata))
                .collect::<Result<_, _>>()
                .context("failed to serialize chunk metadata")?;

            let url = format!(
                "{}/api/v1/collections/{}/add",
                self.base_url, collection_id
            );
            let body = json!({
                "ids": ids,
                "embeddings": embeddings,
                "documents": texts,
                "metadatas": metadatas,
            });

            let mut attempt = 1;
            loop {
                let result = self
                    .client
                    .post(&url)
                    .json(&body)
                    .send()
                    .await
                    .context("failed to contact Chroma during add")
                    .and_then(|r| {
                        r.error_for_status()
                            .context("Chroma add returned non-success status")
                    });

                match result {
                    Ok(_) => break,
                    Err(err) if attempt < MAX_RETRIES => {
                        tracing::warn!(
                            collection,
                            attempt,
                            "Chroma add batch failed, retrying: {err:#}"
                        );
                        tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
                        attempt += 1;
                    }
                    Err(err) => return Err(err),
                }
            }

            total_added += batch.len();
        }

        Ok(total_added)
    }
}

#[async_trait]
impl DocumentSearch for ChromaStore {
    async fn search(
        &self,
        collection: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        if k == 0 {
            return Ok(vec![]);
        }

        let Some(collection_id) = self.resolve_collection(collection).await? else {
            tracing::warn!(collection, "collection not found; returning no results");
            return Ok(vec![]);
        };

        let vector = self.embedder.embed(query).await?;

        let url = format!(
            "{}/api/v1/collections/{}/query",
            self.base_url, collection_id
        );
        let body = json!({
            "query_embeddings": [vector],
            "n_results": k,
            "include": ["documents", "metadatas"],
        });

        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .context("failed to contact Chroma during query")?
            .error_for_status()
            .context("Chroma query returned non-success status")?
            .json::<QueryResponseBody>()
            .await
            .context("failed to decode Chroma query response")?;

        let documents = response.documents.map(Rows::into_first_row).unwrap_or_default();
        let metadatas = response.metadatas.map(Rows::into_first_row).unwrap_or_default();

        let mut out = Vec::with_capacity(documents.len());
        for (index, text) in documents.into_iter().enumerate() {
            let Some(text) = text else { continue };
            if text.trim().is_empty() {
                continue;
            }

            let metadata = metadatas
                .get(index)
                .cloned()
                .flatten()
                .map(metadata_from_value)
                .unwrap_or_default();

            out.push(RetrievedChunk { text, metadata });
        }

        Ok(out)
    }
}

fn metadata_from_value(value: serde_json::Value) -> ChunkMetadata {
    serde_json::from_value(value).unwrap_or_default()
}

#[derive(Deserialize)]
struct CollectionInfo {
    id: String,
}

/// Chroma nests result rows one level per query embedding. Older server
/// builds have been seen returning a flat row for single-query requests, so
/// both shapes decode.
#[derive(Deserialize)]
#[serde(untagged)]
enum Rows<T> {
    Many(Vec<Vec<T>>),
    One(Vec<T>),
}

impl<T> Rows<T> {
    fn into_first_row(self) -> Vec<T> {
        match self {
            Rows::Many(rows) => rows.into_iter().next().unwrap_or_default(),
            Rows::One(row) => row,
        }
    }
}

#[derive(Deserialize)]
struct QueryResponseBody {
    documents: Option<Rows<Option<String>>>,
    metadatas: Option<Rows<Option<serde_json::Value>>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_rows_decode_to_first_row() {
        let raw = r#"{"documents": [["a", "b"]], "metadatas": [[{"page": 3}, null]]}"#;
        let parsed: QueryResponseBody = serde_json::from_str(raw).expect("decode");

        let docs = parsed.documents.map(Rows::into_first_row).unwrap_or_default();
        assert_eq!(docs, vec![Some("a".to_string()), Some("b".to_string())]);

        let metas = parsed.metadatas.map(Rows::into_first_row).unwrap_or_default();
        let first = metas[0].clone().map(metadata_from_value).unwrap_or_default();
        assert_eq!(first.page, Some(3));
    }

    #[test]
    fn flat_rows_are_normalized() {
        let raw = r#"{"documents": ["only one"], "metadatas": null}"#;
        let parsed: QueryResponseBody = serde_json::from_str(raw).expect("decode");

        let docs = parsed.documents.map(Rows::into_first_row).unwrap_or_default();
        assert_eq!(docs, vec![Some("only one".to_string())]);
    }

    #[test]
    fn metadata_tolerates_unknown_keys_and_aliases() {
        let value = serde_json::json!({
            "source_file": "docs/gst-handbook.pdf",
            "line_number": 7,
            "unrelated": true,
        });
        let metadata = metadata_from_value(value);
        assert_eq!(metadata.source_file.as_deref(), Some("docs/gst-handbook.pdf"));
        assert_eq!(metadata.start_line, Some(7));
    }
}
