use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;

/// Seam for every model call the pipeline makes: final answer generation,
/// entity-extraction enrichment, and the relevance gate. Tests stub this.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.upstream_timeout_secs))
            .build()
            .context("failed to build Gemini HTTP client")?;

        Ok(Self {
            client,
            api_key: config.gemini_api_key.clone(),
            model: config.gemini_model.clone(),
        })
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        #[derive(Serialize)]
        struct Part<'a> {
            text: &'a str,
        }

        #[derive(Serialize)]
        struct Content<'a> {
            parts: Vec<Part<'a>>,
        }

        #[derive(Serialize)]
        struct GenerationConfig {
            temperature: f32,
        }

        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct GenerateReq<'a> {
            contents: Vec<Content<'a>>,
            generation_config: GenerationConfig,
        }

        #[derive(Deserialize)]
        struct RespPart {
            text: Option<String>,
        }

        #[derive(Deserialize)]
        struct RespContent {
            parts: Option<Vec<RespPart>>,
        }

        #[derive(Deserialize)]
        struct Candidate {
            content: Option<RespContent>,
        }

        #[derive(Deserialize)]
        struct GenerateResp {
            candidates: Option<Vec<Candidate>>,
        }

        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        );

        let response = self
            .client
            .post(url)
            .json(&GenerateReq {
                contents: vec![Content {
                    parts: vec![Part { text: prompt }],
                }],
                generation_config: GenerationConfig { temperature: 0.0 },
            })
            .send()
            .await
            .context("failed to call Gemini generate endpoint")?;

        if response.status() != StatusCode::OK {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Gemini generate returned {status}: {}", body.trim());
        }

        let response = response
            .json::<GenerateResp>()
            .await
            .context("failed to decode Gemini generate response")?;

        let text = response
            .candidates
            .unwrap_or_default()
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|p| p.text)
            .collect::<Vec<_>>()
            .join("");

        if text.trim().is_empty() {
            anyhow::bail!("Gemini returned an empty candidate");
        }

        Ok(text.trim().to_string())
    }
}
