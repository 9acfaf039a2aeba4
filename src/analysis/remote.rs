use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, error, instrument};

use super::dto::{AnalysisInput, AnalysisResult, Stage};
use super::errors::ProviderError;
use super::prompt;
use super::provider::InferenceProvider;

pub const ANALYZE_IMAGE_PATH: &str = "/api/analyze-food";
pub const ANALYZE_TEXT_PATH: &str = "/api/analyze-text";

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum AnalyzeRequest<'a> {
    Image { image: String, instructions: String },
    Text { description: &'a str, instructions: String },
}

/// Calls the application's own analysis endpoint.
#[derive(Clone)]
pub struct RemoteProvider {
    client: Client,
    base_url: String,
}

impl RemoteProvider {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    fn url_for(&self, input: &AnalysisInput) -> String {
        let path = match input {
            AnalysisInput::Image(_) => ANALYZE_IMAGE_PATH,
            AnalysisInput::Text(_) => ANALYZE_TEXT_PATH,
        };
        format!("{}{}", self.base_url, path)
    }

    fn build_request(input: &AnalysisInput) -> AnalyzeRequest<'_> {
        let instructions = prompt::instructions(input.kind());
        match input {
            AnalysisInput::Image(bytes) => AnalyzeRequest::Image {
                image: STANDARD.encode(bytes),
                instructions,
            },
            AnalysisInput::Text(description) => AnalyzeRequest::Text {
                description: description.trim(),
                instructions,
            },
        }
    }
}

#[async_trait]
impl InferenceProvider for RemoteProvider {
    fn stage(&self) -> Stage {
        Stage::Remote
    }

    #[instrument(skip(self, input), fields(kind = %input.kind()))]
    async fn infer(&self, input: &AnalysisInput) -> Result<AnalysisResult, ProviderError> {
        let url = self.url_for(input);
        debug!(%url, "sending analysis request");

        let response = self
            .client
            .post(&url)
            .json(&Self::build_request(input))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            error!(status = %status, "analysis endpoint error");
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let result: AnalysisResult = serde_json::from_str(&body).map_err(|e| {
            error!(error = %e, response = %body, "failed to parse analysis response");
            ProviderError::MalformedResponse(e.to_string())
        })?;
        result.validate().map_err(ProviderError::MalformedResponse)?;

        debug!(name = %result.name, confidence = result.confidence, "analysis received");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Json, Router};
    use serde_json::{json, Value};

    async fn spawn_endpoint(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral port");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve fake endpoint");
        });
        format!("http://{}", addr)
    }

    fn provider(base_url: &str) -> RemoteProvider {
        RemoteProvider::new(Client::new(), base_url)
    }

    #[tokio::test]
    async fn image_is_sent_as_base64_and_result_parsed() {
        let app = Router::new().route(
            ANALYZE_IMAGE_PATH,
            post(|Json(body): Json<Value>| async move {
                // "hi!" in base64
                assert_eq!(body["image"], "aGkh");
                assert!(body["instructions"].as_str().unwrap().contains("confidence"));
                Json(json!({
                    "name": "Pancakes", "calories": 350, "protein": 8,
                    "carbs": 52, "fat": 12, "sugar": 14, "confidence": 93
                }))
            }),
        );
        let base = spawn_endpoint(app).await;

        let result = provider(&base)
            .infer(&AnalysisInput::image(b"hi!".to_vec()))
            .await
            .expect("remote analysis");
        assert_eq!(result.name, "Pancakes");
        assert_eq!(result.calories, 350.0);
        assert_eq!(result.confidence, 93.0);
    }

    #[tokio::test]
    async fn text_goes_to_text_endpoint_as_description() {
        let app = Router::new().route(
            ANALYZE_TEXT_PATH,
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["description"], "two boiled eggs");
                assert!(body.get("image").is_none());
                Json(json!({
                    "name": "Boiled eggs", "calories": 155, "protein": 13,
                    "carbs": 1, "fat": 11, "sugar": 1, "confidence": 95
                }))
            }),
        );
        let base = spawn_endpoint(app).await;

        let result = provider(&format!("{base}/"))
            .infer(&AnalysisInput::text("  two boiled eggs "))
            .await
            .expect("remote analysis");
        assert_eq!(result.name, "Boiled eggs");
    }

    #[tokio::test]
    async fn non_success_status_is_reported_with_body() {
        let app = Router::new().route(
            ANALYZE_TEXT_PATH,
            post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "model overloaded") }),
        );
        let base = spawn_endpoint(app).await;

        let err = provider(&base)
            .infer(&AnalysisInput::text("soup"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ProviderError::Status {
                status: 503,
                body: "model overloaded".into()
            }
        );
    }

    #[tokio::test]
    async fn malformed_and_out_of_range_bodies_are_rejected() {
        let app = Router::new()
            .route(ANALYZE_TEXT_PATH, post(|| async { "not json" }))
            .route(
                ANALYZE_IMAGE_PATH,
                post(|| async {
                    Json(json!({
                        "name": "Mystery", "calories": -10, "protein": 0,
                        "carbs": 0, "fat": 0, "sugar": 0, "confidence": 80
                    }))
                }),
            );
        let base = spawn_endpoint(app).await;
        let remote = provider(&base);

        let err = remote.infer(&AnalysisInput::text("soup")).await.unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse(_)));

        let err = remote
            .infer(&AnalysisInput::image(vec![1, 2, 3]))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse(m) if m.contains("calories")));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = provider(&format!("http://{addr}"))
            .infer(&AnalysisInput::text("rice"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Transport(_)));
    }
}
