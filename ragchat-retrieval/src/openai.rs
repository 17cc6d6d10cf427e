//! Embeddings from the OpenAI `/v1/embeddings` endpoint (`openai` feature).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";
const DEFAULT_MODEL: &str = "text-embedding-3-small";
const DEFAULT_DIMENSIONS: usize = 1536;
const PROVIDER: &str = "openai";

/// Embeds chunk and query text with an OpenAI embedding model.
///
/// A batch is sent as one request and the returned vectors are put back in
/// input order. Calls carry no timeout of their own; the coordinator's retry
/// policy bounds every attempt.
///
/// Out of the box this targets `text-embedding-3-small` at 1536 dimensions.
/// Any server speaking the same request shape can be used through
/// [`with_base_url`](Self::with_base_url).
///
/// ```rust,ignore
/// use ragchat_retrieval::openai::OpenAIEmbeddingProvider;
///
/// let provider = OpenAIEmbeddingProvider::from_env()?.with_dimensions(512);
/// let vector = provider.embed("What is ownership?").await?;
/// assert_eq!(vector.len(), 512);
/// ```
pub struct OpenAIEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dimensions: usize,
    /// Sent as `dimensions` when the caller asked for shortened vectors.
    requested_dimensions: Option<usize>,
}

impl OpenAIEmbeddingProvider {
    /// A provider for the default model, authenticated with `api_key`.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RagError::ConfigError("OpenAI API key must not be empty".into()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: OPENAI_EMBEDDINGS_URL.into(),
            model: DEFAULT_MODEL.into(),
            dimensions: DEFAULT_DIMENSIONS,
            requested_dimensions: None,
        })
    }

    /// Reads `OPENAI_API_KEY`, and `OPENAI_EMBEDDING_MODEL` if present.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            RagError::ConfigError("OPENAI_API_KEY environment variable not set".into())
        })?;
        let provider = Self::new(api_key)?;
        Ok(match std::env::var("OPENAI_EMBEDDING_MODEL") {
            Ok(model) => provider.with_model(model),
            Err(_) => provider,
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Ask the server for vectors of length `dims`.
    ///
    /// The vector collection is sized from [`dimensions`](EmbeddingProvider::dimensions),
    /// so this must be decided before the coordinator is initialized.
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self.requested_dimensions = Some(dims);
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn request<'a>(&'a self, texts: &[&'a str]) -> EmbeddingRequest<'a> {
        EmbeddingRequest {
            model: &self.model,
            input: texts.to_vec(),
            dimensions: self.requested_dimensions,
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// The server's error message, or the raw body when it is not the usual JSON.
fn error_detail(body: String) -> String {
    serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error.message).unwrap_or(body)
}

/// Vectors in input order; the server may answer out of order.
fn into_vectors(response: EmbeddingResponse, expected: usize) -> Result<Vec<Vec<f32>>> {
    let mut data = response.data;
    if data.len() != expected {
        return Err(RagError::embedding(
            PROVIDER,
            format!("expected {expected} embeddings, API returned {}", data.len()),
        ));
    }
    data.sort_by_key(|d| d.index);
    Ok(data.into_iter().map(|d| d.embedding).collect())
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text])
            .await?
            .pop()
            .ok_or_else(|| RagError::embedding(PROVIDER, "API returned empty response"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(provider = PROVIDER, batch_size = texts.len(), model = %self.model, "embedding batch");

        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(&self.request(texts))
            .send()
            .await
            .map_err(|e| {
                error!(provider = PROVIDER, error = %e, "request failed");
                RagError::embedding(PROVIDER, format!("request failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = error_detail(response.text().await.unwrap_or_default());
            error!(provider = PROVIDER, %status, "API error");
            return Err(RagError::embedding(PROVIDER, format!("API returned {status}: {detail}")));
        }

        let parsed: EmbeddingResponse = response.json().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "failed to parse response");
            RagError::embedding(PROVIDER, format!("failed to parse response: {e}"))
        })?;
        into_vectors(parsed, texts.len())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_api_key_is_rejected() {
        assert!(matches!(OpenAIEmbeddingProvider::new(""), Err(RagError::ConfigError(_))));
    }

    #[test]
    fn dimension_override_is_reported_and_sent() {
        let provider = OpenAIEmbeddingProvider::new("sk-test").unwrap().with_dimensions(256);
        assert_eq!(provider.dimensions(), 256);
        assert_eq!(provider.model_id(), DEFAULT_MODEL);

        let json = serde_json::to_value(provider.request(&["a"])).unwrap();
        assert_eq!(json["dimensions"], 256);
    }

    #[test]
    fn default_request_omits_dimensions() {
        let provider = OpenAIEmbeddingProvider::new("sk-test").unwrap();
        let json = serde_json::to_value(provider.request(&["a", "b"])).unwrap();
        assert!(json.get("dimensions").is_none());
        assert_eq!(json["input"], serde_json::json!(["a", "b"]));
        assert_eq!(json["model"], DEFAULT_MODEL);
    }

    #[test]
    fn out_of_order_response_is_restored_to_input_order() {
        let response: EmbeddingResponse = serde_json::from_str(
            r#"{"data": [{"index": 1, "embedding": [0.0, 1.0]}, {"index": 0, "embedding": [1.0, 0.0]}]}"#,
        )
        .unwrap();
        let vectors = into_vectors(response, 2).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn short_response_is_an_embedding_failure() {
        let response: EmbeddingResponse =
            serde_json::from_str(r#"{"data": [{"index": 0, "embedding": [1.0]}]}"#).unwrap();
        let err = into_vectors(response, 2).unwrap_err();
        assert!(matches!(err, RagError::EmbeddingFailure { .. }));
    }

    #[test]
    fn error_body_message_is_extracted() {
        let body = r#"{"error": {"message": "Rate limit reached", "type": "requests"}}"#;
        assert_eq!(error_detail(body.to_string()), "Rate limit reached");
        assert_eq!(error_detail("upstream timeout".to_string()), "upstream timeout");
    }
}
