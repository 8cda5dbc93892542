//! Captioning through an OpenAI-compatible Responses API.
//!
//! One request per photo: the fixed marketing instructions, the photo as an
//! `input_image`, and a strict JSON schema for `{caption, hashtags}`.
//! Docs: https://platform.openai.com/docs/api-reference/responses

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use super::{CaptionError, CaptionGenerator, CaptionResult, GenerateFuture, ImagePayload};
use crate::config::ModelConfig;
use crate::constants::{CAPTION_INSTRUCTIONS, CAPTION_SCHEMA_NAME};

/// How much of an error body makes it into the log.
const ERROR_BODY_LOG_LIMIT: usize = 2048;

#[derive(Debug, Deserialize, Serialize)]
struct ResponsesCreateResponse {
    #[serde(default)]
    output_text: Option<String>,
    #[serde(default)]
    output: Vec<ResponseOutputItem>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize, Serialize)]
struct ResponseOutputItem {
    #[serde(default)]
    content: Vec<ResponseContentItem>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type")]
enum ResponseContentItem {
    #[serde(rename = "output_text")]
    OutputText { text: String },
    #[serde(rename = "refusal")]
    Refusal { refusal: String },
    #[serde(other)]
    Other,
}

impl ResponsesCreateResponse {
    fn into_output_text(self) -> Result<String, CaptionError> {
        if let Some(text) = self.output_text {
            return Ok(text);
        }
        let mut refusal = None;
        for content in self.output.into_iter().flat_map(|item| item.content) {
            match content {
                ResponseContentItem::OutputText { text } => return Ok(text),
                ResponseContentItem::Refusal { refusal: reason } => refusal = Some(reason),
                ResponseContentItem::Other => {}
            }
        }
        match refusal {
            Some(reason) => Err(CaptionError::Generation(format!("model refused: {reason}"))),
            None => Err(CaptionError::OutputValidation(
                "/responses reply has no output_text".to_string(),
            )),
        }
    }
}

/// [`CaptionGenerator`] backed by the Responses API.
#[derive(Clone, Debug)]
pub struct OpenAiCaptioner {
    client: reqwest::Client,
    config: ModelConfig,
}

impl OpenAiCaptioner {
    /// Builds the HTTP client with the configured request timeout.
    pub fn new(config: ModelConfig) -> Result<Self, CaptionError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| CaptionError::Generation(format!("building HTTP client: {err}")))?;
        Ok(Self { client, config })
    }

    fn request_body(&self, payload: &ImagePayload) -> Value {
        json!({
            "model": self.config.model,
            "instructions": CAPTION_INSTRUCTIONS.as_str(),
            "input": [
                {
                    "role": "user",
                    "content": [
                        {"type": "input_text", "text": "Photo:"},
                        {"type": "input_image", "image_url": payload.as_data_uri()}
                    ]
                }
            ],
            "text": {
                "format": {
                    "type": "json_schema",
                    "name": CAPTION_SCHEMA_NAME,
                    "strict": true,
                    "schema": CaptionResult::json_schema()
                }
            }
        })
    }

    async fn caption(&self, payload: &ImagePayload) -> Result<CaptionResult, CaptionError> {
        let url = self.config.responses_url();
        debug!("Sending {} photo to {} ({})", payload.mime(), url, self.config.model);

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&self.request_body(payload))
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    CaptionError::Generation(format!(
                        "request to {url} timed out after {:?}",
                        self.config.request_timeout
                    ))
                } else {
                    CaptionError::Generation(format!("request to {url} failed: {err}"))
                }
            })?;

        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .map_err(|err| CaptionError::Generation(format!("reading /responses body: {err}")))?;

        if !status.is_success() {
            let body = String::from_utf8_lossy(&bytes);
            let body: String = body.chars().take(ERROR_BODY_LOG_LIMIT).collect();
            return Err(CaptionError::Generation(format!(
                "Responses API error {status}: {body}"
            )));
        }

        let parsed: ResponsesCreateResponse = serde_json::from_slice(&bytes).map_err(|err| {
            CaptionError::OutputValidation(format!("failed to parse /responses JSON: {err}"))
        })?;
        if let Some(err) = parsed.error.as_ref().filter(|err| !err.is_null()) {
            return Err(CaptionError::Generation(format!(
                "Responses API returned error: {err}"
            )));
        }

        let output_text = parsed.into_output_text()?;
        CaptionResult::from_model_output(&output_text)
    }
}

impl CaptionGenerator for OpenAiCaptioner {
    fn generate<'a>(&'a self, payload: &'a ImagePayload) -> GenerateFuture<'a> {
        Box::pin(self.caption(payload))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::{Json, Router};

    use super::*;
    use crate::caption::payload::tests::sample_png_data_uri;

    #[derive(Clone, Default)]
    struct MockState {
        reply: Arc<Mutex<Option<(StatusCode, Value)>>>,
        delay: Option<Duration>,
        seen: Arc<Mutex<Vec<(Option<String>, Value)>>>,
    }

    async fn mock_responses(
        State(state): State<MockState>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> axum::response::Response {
        let auth = headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        state.seen.lock().expect("lock seen").push((auth, body));
        if let Some(delay) = state.delay {
            tokio::time::sleep(delay).await;
        }
        let (status, reply) = state
            .reply
            .lock()
            .expect("lock reply")
            .clone()
            .expect("reply configured");
        (status, Json(reply)).into_response()
    }

    async fn spawn_mock(state: MockState) -> String {
        let app = Router::new()
            .route("/v1/responses", axum::routing::post(mock_responses))
            .with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock");
        let addr = listener.local_addr().expect("mock addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}/v1")
    }

    fn captioner(api_base: &str, timeout: Duration) -> OpenAiCaptioner {
        OpenAiCaptioner::new(ModelConfig {
            api_key: "sk-test".to_string(),
            model: "test-vision".to_string(),
            api_base: api_base.parse().expect("api base"),
            request_timeout: timeout,
        })
        .expect("captioner")
    }

    fn mock_with(status: StatusCode, reply: Value) -> MockState {
        MockState {
            reply: Arc::new(Mutex::new(Some((status, reply)))),
            ..Default::default()
        }
    }

    fn payload() -> ImagePayload {
        ImagePayload::parse(&sample_png_data_uri()).expect("payload")
    }

    #[tokio::test]
    async fn sends_photo_with_schema_and_parses_output() {
        let state = mock_with(
            StatusCode::OK,
            json!({
                "output": [{
                    "type": "message",
                    "content": [{
                        "type": "output_text",
                        "text": "{\"caption\":\"Sunset vibes\",\"hashtags\":[\"#sunset\",\"#vibes\"]}"
                    }]
                }]
            }),
        );
        let seen = state.seen.clone();
        let base = spawn_mock(state).await;

        let result = captioner(&base, Duration::from_secs(5))
            .generate(&payload())
            .await
            .expect("caption");
        assert_eq!(result.caption, "Sunset vibes");
        assert_eq!(result.hashtags, vec!["#sunset", "#vibes"]);

        let seen = seen.lock().expect("lock seen");
        assert_eq!(seen.len(), 1);
        let (auth, body) = &seen[0];
        assert_eq!(auth.as_deref(), Some("Bearer sk-test"));
        assert_eq!(body["model"], "test-vision");
        assert_eq!(body["text"]["format"]["name"], CAPTION_SCHEMA_NAME);
        assert_eq!(body["text"]["format"]["strict"], true);
        assert_eq!(
            body["input"][0]["content"][1]["image_url"],
            Value::String(sample_png_data_uri())
        );
        assert!(
            body["instructions"]
                .as_str()
                .unwrap_or_default()
                .contains("AI marketing assistant")
        );
    }

    #[tokio::test]
    async fn prefers_top_level_output_text() {
        let base = spawn_mock(mock_with(
            StatusCode::OK,
            json!({"output_text": "{\"caption\":\"Fresh drop\",\"hashtags\":[]}"}),
        ))
        .await;
        let result = captioner(&base, Duration::from_secs(5))
            .generate(&payload())
            .await
            .expect("caption");
        assert_eq!(result.caption, "Fresh drop");
        assert!(result.hashtags.is_empty());
    }

    #[tokio::test]
    async fn output_missing_hashtags_is_a_validation_error() {
        let base = spawn_mock(mock_with(
            StatusCode::OK,
            json!({"output_text": "{\"caption\":\"Sunset vibes\"}"}),
        ))
        .await;
        let err = captioner(&base, Duration::from_secs(5))
            .generate(&payload())
            .await
            .expect_err("invalid output");
        assert!(matches!(err, CaptionError::OutputValidation(_)));
    }

    #[tokio::test]
    async fn reply_without_output_text_is_a_validation_error() {
        let base = spawn_mock(mock_with(StatusCode::OK, json!({"output": []}))).await;
        let err = captioner(&base, Duration::from_secs(5))
            .generate(&payload())
            .await
            .expect_err("no output");
        assert!(matches!(err, CaptionError::OutputValidation(_)));
    }

    #[tokio::test]
    async fn refusal_is_a_generation_error() {
        let base = spawn_mock(mock_with(
            StatusCode::OK,
            json!({"output": [{"content": [{"type": "refusal", "refusal": "no"}]}]}),
        ))
        .await;
        let err = captioner(&base, Duration::from_secs(5))
            .generate(&payload())
            .await
            .expect_err("refusal");
        assert!(matches!(err, CaptionError::Generation(_)));
    }

    #[tokio::test]
    async fn http_errors_are_generation_errors() {
        let base = spawn_mock(mock_with(
            StatusCode::UNAUTHORIZED,
            json!({"error": {"message": "Incorrect API key provided"}}),
        ))
        .await;
        let err = captioner(&base, Duration::from_secs(5))
            .generate(&payload())
            .await
            .expect_err("401");
        match err {
            CaptionError::Generation(message) => assert!(message.contains("401")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_model_times_out() {
        let mut state = mock_with(
            StatusCode::OK,
            json!({"output_text": "{\"caption\":\"late\",\"hashtags\":[]}"}),
        );
        state.delay = Some(Duration::from_secs(2));
        let base = spawn_mock(state).await;
        let err = captioner(&base, Duration::from_millis(200))
            .generate(&payload())
            .await
            .expect_err("timeout");
        match err {
            CaptionError::Generation(message) => assert!(message.contains("timed out")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_model_is_a_generation_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);
        let err = captioner(&format!("http://{addr}/v1"), Duration::from_secs(5))
            .generate(&payload())
            .await
            .expect_err("unreachable");
        assert!(matches!(err, CaptionError::Generation(_)));
    }
}
