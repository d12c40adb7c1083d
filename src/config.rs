use std::env;

use anyhow::Result;

#[derive(Clone, Debug)]
pub struct CollectionsConfig {
    pub handbook: String,
    pub bare_law: String,
    pub ey_papers: String,
    pub cases: String,
}

#[derive(Clone, Debug)]
pub struct RetrievalConfig {
    pub reasoning_k: usize,
    pub citation_k: usize,
    pub chained_k: usize,
    pub max_history_turns: usize,
}

#[derive(Clone, Debug)]
pub struct SheetsConfig {
    pub spreadsheet_id: String,
    pub sheet_name: String,
    pub api_token: String,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_addr: String,
    pub chroma_base_url: String,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub cf_account_id: String,
    pub cf_api_token: String,
    pub cf_embeddings_model: String,
    pub request_timeout_secs: u64,
    pub upstream_timeout_secs: u64,
    pub collections: CollectionsConfig,
    pub retrieval: RetrievalConfig,
    pub sheets: Option<SheetsConfig>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let gemini_api_key = require_env("GEMINI_API_KEY")?;
        let cf_account_id = require_env("CLOUDFLARE_ACCOUNT_ID")?;
        let cf_api_token = require_env("CLOUDFLARE_API_TOKEN")?;

        let sheets = match (
            env::var("GOOGLE_SHEETS_SPREADSHEET_ID").ok(),
            env::var("GOOGLE_SHEETS_API_TOKEN").ok(),
        ) {
            (Some(spreadsheet_id), Some(api_token)) => Some(SheetsConfig {
                spreadsheet_id,
                sheet_name: env::var("GOOGLE_SHEETS_SHEET_NAME")
                    .unwrap_or_else(|_| "Queries".to_string()),
                api_token,
            }),
            _ => None,
        };

        Ok(Self {
            bind_addr: env::var("GST_ASSISTANT_BIND")
                .unwrap_or_else(|_| "127.0.0.1:8080".to_string()),
            chroma_base_url: env::var("CHROMA_BASE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8000".to_string()),
            gemini_api_key,
            gemini_model: env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| "gemini-2.5-flash-lite".to_string()),
            cf_account_id,
            cf_api_token,
            cf_embeddings_model: env::var("CF_EMBEDDINGS_MODEL")
                .unwrap_or_else(|_| "@cf/baai/bge-base-en-v1.5".to_string()),
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", 60),
            upstream_timeout_secs: env_or("UPSTREAM_TIMEOUT_SECS", 30),
            collections: CollectionsConfig {
                handbook: env::var("COLLECTION_HANDBOOK")
                    .unwrap_or_else(|_| "Handbook".to_string()),
                bare_law: env::var("COLLECTION_BARE_LAW")
                    .unwrap_or_else(|_| "Bare-Law".to_string()),
                ey_papers: env::var("COLLECTION_EY_PAPERS")
                    .unwrap_or_else(|_| "EY-Papers".to_string()),
                cases: env::var("COLLECTION_CASES").unwrap_or_else(|_| "Cases".to_string()),
            },
            retrieval: RetrievalConfig {
                reasoning_k: env_or("RETRIEVAL_REASONING_K", 3),
                citation_k: env_or("RETRIEVAL_CITATION_K", 5),
                chained_k: env_or("RETRIEVAL_CHAINED_K", 4),
                max_history_turns: env_or("MAX_HISTORY_TURNS", 5),
            },
            sheets,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => anyhow::bail!("{key} is not configured; set it in the environment"),
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
