//! SQL assistant backed by an OpenAI-compatible chat completion endpoint

use crate::config::LlmConfig;
use crate::datasources::SchemaColumn;
use crate::engine::quote_ident;
use crate::error::{Result, WorkbenchError};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// Rows sampled per data source for the prompt
pub const SAMPLE_ROWS: usize = 5;

lazy_static! {
    static ref CODE_FENCE: Regex = Regex::new(r"(?s)```[A-Za-z]*\s*\n?(.*?)```").expect("valid regex");
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceContext {
    pub name: String,
    pub table_name: String,
    pub schema: Vec<SchemaColumn>,
    pub sample_rows: Vec<Map<String, Value>>,
}

/// Everything the assistant sees about the workbench
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationContext {
    pub user_request: String,
    pub data_sources: Vec<SourceContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_query: Option<String>,
}

impl GenerationContext {
    /// Query fetching the sample rows for one table
    pub fn sample_query(table_name: &str) -> String {
        format!("SELECT * FROM {} LIMIT {}", quote_ident(table_name), SAMPLE_ROWS)
    }

    fn prompt(&self) -> Result<String> {
        let sources = serde_json::to_string_pretty(&self.data_sources)?;
        let current = self
            .current_query
            .as_deref()
            .filter(|q| !q.trim().is_empty())
            .map(|q| format!("\nThe editor currently contains:\n{}\n", q))
            .unwrap_or_default();

        Ok(format!(
            r#"Write a single DuckDB SQL query for this request: "{}"

Available tables (schema and up to {} sample rows each):
{}
{}
Use only the tables and columns listed. Return only the SQL, no explanation."#,
            self.user_request, SAMPLE_ROWS, sources, current
        ))
    }
}

#[async_trait]
pub trait SqlAssistant: Send + Sync {
    async fn generate_sql(&self, context: &GenerationContext) -> Result<String>;
}

pub struct OpenAiSqlAssistant {
    client: reqwest::Client,
    config: LlmConfig,
}

impl OpenAiSqlAssistant {
    pub fn new(config: LlmConfig) -> Result<Self> {
        if config.api_key.is_none() {
            return Err(WorkbenchError::Config(
                "BLOCKETHER_LLM_API_KEY is not set".to_string(),
            ));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            config,
        })
    }

    async fn call_llm(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": "You are an expert DuckDB SQL assistant. Reply with SQL only."},
                {"role": "user", "content": prompt}
            ],
            "temperature": 0.1
        });

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url.trim_end_matches('/')))
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| WorkbenchError::Llm(format!("LLM API call failed: {}", e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(WorkbenchError::Llm(format!("LLM API returned HTTP {}", status.as_u16())));
        }

        let response_json: Value = response
            .json()
            .await
            .map_err(|e| WorkbenchError::Llm(format!("Failed to parse LLM response: {}", e)))?;

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| WorkbenchError::Llm("No content in LLM response".to_string()))?;

        Ok(content.to_string())
    }
}

#[async_trait]
impl SqlAssistant for OpenAiSqlAssistant {
    async fn generate_sql(&self, context: &GenerationContext) -> Result<String> {
        let prompt = context.prompt()?;
        debug!(model = %self.config.model, sources = context.data_sources.len(), "requesting SQL");

        let reply = self.call_llm(&prompt).await?;
        let sql = strip_code_fences(&reply);
        if sql.is_empty() {
            return Err(WorkbenchError::Llm("LLM returned an empty query".to_string()));
        }
        Ok(sql)
    }
}

/// SQL inside the first Markdown code block, or the whole reply trimmed
pub fn strip_code_fences(reply: &str) -> String {
    CODE_FENCE
        .captures(reply)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(reply)
        .trim()
        .to_string()
}
