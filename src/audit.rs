use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::Client;
use serde_json::json;

use crate::config::{AppConfig, SheetsConfig};

/// Fire-and-forget audit trail: one spreadsheet row per accepted query.
/// When the sheet is not configured the logger is a no-op; when a write
/// fails the failure is logged and swallowed. Nothing on this path may ever
/// fail or delay a query response.
#[derive(Clone)]
pub struct AuditLogger {
    client: Client,
    sheets: Option<SheetsConfig>,
}

impl AuditLogger {
    pub fn new(config: &AppConfig) -> Result<Self> {
        if config.sheets.is_none() {
            tracing::info!("audit sheet not configured; query logging disabled");
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.upstream_timeout_secs))
            .build()
            .context("failed to build audit HTTP client")?;

        Ok(Self {
            client,
            sheets: config.sheets.clone(),
        })
    }

    pub async fn log_query(&self, username: &str, question: &str, session_id: &str) {
        let Some(sheets) = &self.sheets else {
            return;
        };

        if let Err(err) = self
            .append_row(sheets, username, question, session_id)
            .await
        {
            tracing::warn!("audit log append failed, query continues: {err:#}");
        }
    }

    async fn append_row(
        &self,
        sheets: &SheetsConfig,
        username: &str,
        question: &str,
        session_id: &str,
    ) -> Result<()> {
        let url = format!(
            "https://sheets.googleapis.com/v4/spreadsheets/{}/values/{}!A:D:append?valueInputOption=USER_ENTERED",
            sheets.spreadsheet_id, sheets.sheet_name
        );

        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let body = json!({
            "values": [[timestamp, username, question, session_id]],
        });

        self.client
            .post(url)
            .bearer_auth(&sheets.api_token)
            .json(&body)
            .send()
            .await
            .context("failed to contact Sheets append endpoint")?
            .error_for_status()
            .context("Sheets append returned non-success status")?;

        Ok(())
    }
}
