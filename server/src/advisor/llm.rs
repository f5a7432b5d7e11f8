use async_trait::async_trait;
use shared::{IndexDefinition, QueryWorkloadItem};

use crate::error::Result;

/// Optional refinement step the anytime search can consult for additional
/// candidate indexes beyond what predicate-column extraction finds (e.g.
/// expression indexes, or indexes informed by application-level knowledge
/// of access patterns). Proposals go through the same `benefit()`/hypopg
/// costing path as any other candidate, so a bad proposal is simply
/// discarded rather than trusted outright.
#[async_trait]
pub trait Proposer: Send + Sync {
    async fn propose(&self, workload: &[QueryWorkloadItem]) -> Result<Vec<IndexDefinition>>;
}

/// Default proposer: contributes nothing. Used whenever no LLM backend is
/// configured.
pub struct NoopProposer;

#[async_trait]
impl Proposer for NoopProposer {
    async fn propose(&self, _workload: &[QueryWorkloadItem]) -> Result<Vec<IndexDefinition>> {
        Ok(Vec::new())
    }
}

/// Talks to an OpenAI-compatible chat completion endpoint and parses its
/// response as a JSON array of index definitions. Only constructed when
/// `OPENAI_API_KEY` is present in the environment; any malformed or
/// unparseable reply is treated as no proposals rather than an error.
pub struct OpenAiProposer {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiProposer {
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").ok()?;
        let base_url = std::env::var("OPENAI_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        Some(Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
            model,
        })
    }
}

#[async_trait]
impl Proposer for OpenAiProposer {
    async fn propose(&self, workload: &[QueryWorkloadItem]) -> Result<Vec<IndexDefinition>> {
        let queries: Vec<&str> = workload.iter().map(|q| q.query_text.as_str()).collect();
        let prompt = format!(
            "Given these SQL queries, propose additional candidate indexes as a JSON array of \
             {{\"table\":{{\"schema\":...,\"name\":...}},\"columns\":[...]}} objects. Queries: {:?}",
            queries
        );

        let body = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": 0.0,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await;

        let Ok(response) = response else {
            return Ok(Vec::new());
        };
        let Ok(value) = response.json::<serde_json::Value>().await else {
            return Ok(Vec::new());
        };

        let content = value["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("[]");
        let proposals: Vec<IndexDefinition> = serde_json::from_str(content).unwrap_or_default();
        Ok(proposals)
    }
}
