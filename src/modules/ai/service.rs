use std::time::Duration;

use tracing::{debug, error, warn};
use url::Url;

use super::dto::{Content, GenerateContentRequest, GenerateContentResponse, MetadataSuggestion, Part};
use crate::common::error::{AppError, AppResult};
use crate::config::settings::AppConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Asks an external text-generation endpoint for video metadata.
#[derive(Clone)]
pub struct MetadataService {
    http_client: reqwest::Client,
    endpoint: Option<Url>,
}

impl MetadataService {
    pub fn new(config: &AppConfig) -> Self {
        let endpoint = config.ai_api_url.as_deref().and_then(|base| {
            match build_endpoint(base, config.ai_api_key.as_deref()) {
                Ok(url) => Some(url),
                Err(e) => {
                    error!(error = %e, "ignoring invalid AI_API_URL");
                    None
                }
            }
        });
        if endpoint.is_none() {
            warn!("AI metadata endpoint not configured, suggestions will use the fallback");
        }

        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                error!(error = %e, "Failed to create HTTP client for AI endpoint, using default client");
                reqwest::Client::default()
            });

        Self {
            http_client,
            endpoint,
        }
    }

    /// Never fails: any problem with the endpoint yields
    /// [`MetadataSuggestion::unavailable`].
    pub async fn suggest(&self, transcript: &str) -> MetadataSuggestion {
        match self.request(transcript).await {
            Ok(suggestion) => suggestion,
            Err(e) => {
                warn!(error = %e, "metadata suggestion failed, using fallback");
                MetadataSuggestion::unavailable()
            }
        }
    }

    async fn request(&self, transcript: &str) -> AppResult<MetadataSuggestion> {
        let endpoint = self
            .endpoint
            .clone()
            .ok_or_else(|| AppError::Upstream("AI endpoint not configured".to_string()))?;

        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt(transcript),
                }],
            }],
        };

        debug!(transcript_len = transcript.len(), "requesting metadata suggestion");
        let response = self
            .http_client
            .post(endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("request failed: {}", e.without_url())))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!("endpoint returned {status}: {detail}")));
        }

        let reply: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("unreadable response: {}", e.without_url())))?;

        let text = reply
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| AppError::Upstream("response has no candidates".to_string()))?;

        serde_json::from_str(strip_code_fence(&text))
            .map_err(|e| AppError::Upstream(format!("suggestion is not the expected JSON: {e}")))
    }
}

fn build_endpoint(base: &str, key: Option<&str>) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(base)?;
    if let Some(key) = key {
        url.query_pairs_mut().append_pair("key", key);
    }
    Ok(url)
}

fn prompt(transcript: &str) -> String {
    format!(
        "You are an expert video editor. Read the following transcript and generate a JSON response with 3 fields: \
         'title' (catchy, max 10 words), 'description' (summary, max 50 words), \
         and 'tags' (comma separated list of 5 tags). \
         Return ONLY the raw JSON string, no markdown. \n\nTranscript: {transcript}"
    )
}

/// Models wrap JSON in a markdown fence despite being asked not to.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}
