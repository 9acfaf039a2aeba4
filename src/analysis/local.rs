use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use super::dto::{AnalysisInput, AnalysisResult, Stage};
use super::errors::ProviderError;
use super::prompt;
use super::provider::InferenceProvider;

pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Credential baked in at build time, if any.
pub const BUILD_TIME_API_KEY: Option<&str> = option_env!("MEALMIND_LOCAL_API_KEY");

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: &'static str,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Calls the third-party generative endpoint directly, bypassing our server.
#[derive(Clone)]
pub struct LocalProvider {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl std::fmt::Debug for LocalProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalProvider")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl LocalProvider {
    pub fn new(
        client: Client,
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    fn build_request(input: &AnalysisInput) -> GenerateRequest {
        let mut parts = vec![Part::Text {
            text: prompt::instructions(input.kind()),
        }];
        match input {
            AnalysisInput::Image(bytes) => parts.push(Part::InlineData {
                inline_data: InlineData {
                    mime_type: sniff_mime(bytes),
                    data: STANDARD.encode(bytes),
                },
            }),
            AnalysisInput::Text(description) => parts.push(Part::Text {
                text: format!("Meal: {}", description.trim()),
            }),
        }
        GenerateRequest {
            contents: vec![Content { role: "user", parts }],
            generation_config: GenerationConfig {
                temperature: 0.2,
                response_mime_type: "application/json",
            },
        }
    }
}

fn sniff_mime(bytes: &[u8]) -> &'static str {
    match bytes {
        [0x89, b'P', b'N', b'G', ..] => "image/png",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "image/webp",
        _ => "image/jpeg",
    }
}

/// Pulls the JSON object out of the oracle's text, which may arrive fenced.
fn extract_json(text: &str) -> &str {
    lazy_static! {
        static ref FENCED_RE: Regex = Regex::new(r"(?s)```(?:json)?\s*(\{.*\})\s*```").unwrap();
    }
    match FENCED_RE.captures(text).and_then(|c| c.get(1)) {
        Some(m) => m.as_str(),
        None => text.trim(),
    }
}

fn parse_response(body: &str) -> Result<AnalysisResult, ProviderError> {
    let response: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;
    let text = response
        .candidates
        .into_iter()
        .filter_map(|c| c.content)
        .flat_map(|c| c.parts)
        .find_map(|p| p.text)
        .ok_or_else(|| ProviderError::MalformedResponse("no text candidate in response".into()))?;

    let result: AnalysisResult = serde_json::from_str(extract_json(&text))
        .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;
    result.validate().map_err(ProviderError::MalformedResponse)?;
    Ok(result)
}

#[async_trait]
impl InferenceProvider for LocalProvider {
    fn stage(&self) -> Stage {
        Stage::Local
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    #[instrument(skip(self, input), fields(kind = %input.kind(), model = %self.model))]
    async fn infer(&self, input: &AnalysisInput) -> Result<AnalysisResult, ProviderError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(ProviderError::Unconfigured("local inference API key is not set"));
        };

        let url = format!("{}/models/{}:generateContent", self.endpoint, self.model);
        debug!(%url, "sending direct inference request");

        let response = self
            .client
            .post(&url)
            .query(&[("key", api_key)])
            .json(&Self::build_request(input))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            error!(status = %status, "direct inference error");
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let result = parse_response(&body).inspect_err(|e| {
            error!(error = %e, response = %body, "failed to parse direct inference response");
        })?;
        debug!(name = %result.name, confidence = result.confidence, "direct inference received");
        Ok(result)
    }
}
