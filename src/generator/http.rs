use super::{normalize_comment, ContentGenerator};
use crate::config::GeneratorConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    post_text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    comment: Option<String>,
}

/// Remote comment generator: `POST {endpoint}` with `{"post_text": ...}`,
/// answered by `{"comment": "..." | null}`.
pub struct HttpContentGenerator {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpContentGenerator {
    pub fn new(config: &GeneratorConfig, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .pool_max_idle_per_host(2)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

fn parse_response(body: &str) -> Result<Option<String>> {
    let parsed: GenerateResponse =
        serde_json::from_str(body).context("failed to parse generator response")?;
    Ok(normalize_comment(parsed.comment))
}

#[async_trait]
impl ContentGenerator for HttpContentGenerator {
    async fn generate(&self, content_text: &str) -> Result<Option<String>> {
        let mut req = self
            .client
            .post(&self.endpoint)
            .json(&GenerateRequest { post_text: content_text });
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await.context("generator request failed")?;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("generator failed ({}): {}", status, body);
        }

        let comment = parse_response(&body)?;
        if comment.is_none() {
            tracing::debug!("generator returned no comment");
        }
        Ok(comment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response_with_comment() {
        let comment = parse_response(r#"{"comment": " Great insight! "}"#).unwrap();
        assert_eq!(comment, Some("Great insight!".to_string()));
    }

    #[test]
    fn test_parse_response_null_or_missing() {
        assert_eq!(parse_response(r#"{"comment": null}"#).unwrap(), None);
        assert_eq!(parse_response(r#"{}"#).unwrap(), None);
        assert_eq!(parse_response(r#"{"comment": ""}"#).unwrap(), None);
    }

    #[test]
    fn test_parse_response_garbage_is_error() {
        assert!(parse_response("<html>502</html>").is_err());
    }

    #[test]
    fn test_endpoint_trailing_slash_trimmed() {
        let config = GeneratorConfig {
            endpoint: "http://localhost:8787/generate/".to_string(),
            request_timeout_ms: 1000,
        };
        let generator = HttpContentGenerator::new(&config, None).unwrap();
        assert_eq!(generator.endpoint, "http://localhost:8787/generate");
    }
}
