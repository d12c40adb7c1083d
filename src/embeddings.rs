use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;

/// Cloudflare Workers AI embedding client. The document store uses this to
/// turn query text and ingested chunks into vectors.
#[derive(Clone)]
pub struct EmbeddingClient {
    client: Client,
    account_id: String,
    api_token: String,
    model: String,
}

impl EmbeddingClient {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.upstream_timeout_secs))
            .build()
            .context("failed to build embedding HTTP client")?;

        Ok(Self {
            client,
            account_id: config.cf_account_id.clone(),
            api_token: config.cf_api_token.clone(),
            model: config.cf_embeddings_model.clone(),
        })
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let input = text.trim();
        if input.is_empty() {
            anyhow::bail!("cannot embed empty text input");
        }

        let mut vectors = self.embed_batch(&[input.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| anyhow::anyhow!("embedding endpoint returned no vectors"))
    }

    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        #[derive(Serialize)]
        struct EmbedReq<'a> {
            text: &'a [String],
        }

        #[derive(Deserialize)]
        struct EmbedResult {
            data: Vec<Vec<f32>>,
        }

        #[derive(Deserialize)]
        struct EmbedResp {
            success: bool,
            result: Option<EmbedResult>,
        }

        let url = format!(
            "https://api.cloudflare.com/client/v4/accounts/{}/ai/run/{}",
            self.account_id, self.model
        );

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_token)
            .json(&EmbedReq { text: texts })
            .send()
            .await
            .context("failed to call Workers AI embedding endpoint")?;

        if response.status() != StatusCode::OK {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "Workers AI embedding endpoint returned {status}: {}",
                body.trim()
            );
        }

        let response = response
            .json::<EmbedResp>()
            .await
            .context("failed to decode Workers AI embedding response")?;

        if !response.success {
            anyhow::bail!("Workers AI embedding call reported failure");
        }

        let data = response
            .result
            .map(|r| r.data)
            .ok_or_else(|| anyhow::anyhow!("Workers AI embedding response missing result"))?;

        if data.len() != texts.len() {
            anyhow::bail!(
                "Workers AI returned {} vectors for {} inputs",
                data.len(),
                texts.len()
            );
        }

        Ok(data)
    }
}
