//! Schema compatibility validation via a generative-model call.
//!
//! Given a candidate source schema and a desired target column shape, the
//! validator asks a model whether the source is a conceptual fit for the
//! target's conceptual group and parses a `{is_good_fit, reasoning}` verdict.
//!
//! Internally the outcome is a sum type ([`FitOutcome`]) so tests can
//! distinguish a genuine "no" from an unreachable backend. The public
//! boundary ([`SchemaValidator::validate_schema`]) collapses `Unavailable`
//! to `false`: a validation error must never crash the batch discovery run
//! that calls this at scale, so it degrades to "not a fit" instead.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ValidatorConfig;
use crate::error::{Error, Result};

/// A column in a candidate source schema.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
}

/// A column in the desired target shape.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
    #[serde(default)]
    pub description: String,
}

/// Internal validation outcome, before the boundary collapse.
#[derive(Debug)]
pub enum FitOutcome {
    Fit { is_good_fit: bool, reasoning: String },
    /// The model call failed (network, timeout, malformed response).
    Unavailable(String),
}

#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Produce a completion for `prompt`. One call per invocation; no
    /// batching or caching at this layer.
    async fn generate(&self, prompt: &str, timeout: Duration) -> Result<String>;
}

pub struct SchemaValidator {
    model: Arc<dyn GenerativeModel>,
    timeout: Duration,
}

impl SchemaValidator {
    pub fn new(model: Arc<dyn GenerativeModel>, cfg: &ValidatorConfig) -> Self {
        Self {
            model,
            timeout: Duration::from_secs(cfg.timeout_secs),
        }
    }

    /// Judge whether `source_schema` conceptually fits `target_columns`.
    ///
    /// Any internal failure degrades to `false`; this method never returns
    /// an error and never panics on malformed model output.
    pub async fn validate_schema(
        &self,
        source_schema: &[SourceColumn],
        target_columns: &[TargetColumn],
        conceptual_group: &str,
        source_table_name: &str,
    ) -> bool {
        match self
            .check(source_schema, target_columns, conceptual_group, source_table_name)
            .await
        {
            FitOutcome::Fit {
                is_good_fit,
                reasoning,
            } => {
                tracing::debug!(
                    table = source_table_name,
                    group = conceptual_group,
                    fit = is_good_fit,
                    reasoning = %reasoning,
                    "schema validation verdict"
                );
                is_good_fit
            }
            FitOutcome::Unavailable(reason) => {
                tracing::warn!(
                    table = source_table_name,
                    group = conceptual_group,
                    reason = %reason,
                    "schema validation unavailable, treating as not a fit"
                );
                false
            }
        }
    }

    /// Typed variant of [`validate_schema`](Self::validate_schema) that keeps
    /// the unavailable case distinct.
    pub async fn check(
        &self,
        source_schema: &[SourceColumn],
        target_columns: &[TargetColumn],
        conceptual_group: &str,
        source_table_name: &str,
    ) -> FitOutcome {
        let prompt = build_prompt(
            source_schema,
            target_columns,
            conceptual_group,
            source_table_name,
        );

        match self.model.generate(&prompt, self.timeout).await {
            Ok(response) => match parse_fit_response(&response) {
                Ok((is_good_fit, reasoning)) => FitOutcome::Fit {
                    is_good_fit,
                    reasoning,
                },
                Err(e) => FitOutcome::Unavailable(e.to_string()),
            },
            Err(e) => FitOutcome::Unavailable(e.to_string()),
        }
    }
}

/// Serialize both column lists into the fit-judgment prompt.
pub fn build_prompt(
    source_schema: &[SourceColumn],
    target_columns: &[TargetColumn],
    conceptual_group: &str,
    source_table_name: &str,
) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "You are judging whether a source table can serve as input for a target column group.\n\n",
    );
    prompt.push_str(&format!("Conceptual group: {conceptual_group}\n"));
    prompt.push_str(&format!("Source table: {source_table_name}\n\n"));

    prompt.push_str("Source columns:\n");
    for col in source_schema {
        prompt.push_str(&format!("  - {} ({})\n", col.name, col.column_type));
    }

    prompt.push_str("\nTarget columns:\n");
    for col in target_columns {
        if col.description.is_empty() {
            prompt.push_str(&format!("  - {} ({})\n", col.name, col.column_type));
        } else {
            prompt.push_str(&format!(
                "  - {} ({}): {}\n",
                col.name, col.column_type, col.description
            ));
        }
    }

    prompt.push_str(
        "\nDoes the source table conceptually fit this group? Respond with a JSON object \
         of the form {\"is_good_fit\": true|false, \"reasoning\": \"...\"} and nothing else.\n",
    );
    prompt
}

#[derive(Deserialize)]
struct FitResponse {
    is_good_fit: bool,
    #[serde(default)]
    reasoning: String,
}

/// Parse the model's `{is_good_fit, reasoning}` reply.
///
/// Tolerates a fenced code block around the JSON, which chat models emit
/// even when told not to.
pub fn parse_fit_response(response: &str) -> Result<(bool, String)> {
    let trimmed = response.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|s| s.trim_end_matches("```").trim())
        .unwrap_or(trimmed);

    let parsed: FitResponse = serde_json::from_str(body)
        .map_err(|e| Error::Serialization(format!("malformed fit response: {e}; got: {body}")))?;
    Ok((parsed.is_good_fit, parsed.reasoning))
}

// ============ OpenAI model backend ============

/// Generative model backend using the OpenAI chat completions API.
///
/// Requires the `OPENAI_API_KEY` environment variable. No retries: the
/// validator's failure policy is to degrade, not to wait.
pub struct OpenAiModel {
    client: reqwest::Client,
    model: String,
}

impl OpenAiModel {
    pub fn new(client: reqwest::Client, cfg: &ValidatorConfig) -> Result<Self> {
        let model = cfg.model.clone().ok_or_else(|| {
            Error::InvalidArgument("validator.model required for openai provider".to_string())
        })?;
        Ok(Self { client, model })
    }
}

#[async_trait]
impl GenerativeModel for OpenAiModel {
    async fn generate(&self, prompt: &str, timeout: Duration) -> Result<String> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::UpstreamUnavailable("OPENAI_API_KEY not set".to_string()))?;

        let body = serde_json::json!({
            "model": self.model,
            "messages": [ { "role": "user", "content": prompt } ],
            "response_format": { "type": "json_object" },
        });

        let resp = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(api_key)
            .json(&body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::ValidationTimeout(format!("model did not respond within {timeout:?}"))
                } else {
                    Error::UpstreamUnavailable(e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::UpstreamUnavailable(format!(
                "model API returned {status}: {text}"
            )));
        }

        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| Error::Serialization(format!("model response was not JSON: {e}")))?;

        json.get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|t| t.as_str())
            .map(|t| t.to_string())
            .ok_or_else(|| {
                Error::Serialization("model response missing choices[0].message.content".to_string())
            })
    }
}
