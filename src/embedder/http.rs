/// Blocking client for an OpenAI-compatible `/embeddings` endpoint.
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

use super::{Embedder, EmbedderError};

pub struct HttpEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: usize,
}

impl HttpEmbedder {
    /// Build a client for `base_url` (the `/embeddings` path is appended).
    ///
    /// The request timeout bounds a single HTTP call; the retriever applies
    /// its own deadline on top.
    pub fn new(
        base_url: &str,
        model: &str,
        dimensions: usize,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, EmbedderError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key {
            let auth = format!("Bearer {}", key.trim());
            let value = HeaderValue::from_str(&auth)
                .map_err(|e| EmbedderError::RequestFailed(format!("invalid api key: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| EmbedderError::Unreachable(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: model.to_string(),
            dimensions,
        })
    }

    fn request(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    EmbedderError::Unreachable(e.to_string())
                } else {
                    EmbedderError::RequestFailed(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(EmbedderError::RequestFailed(format!("{status}: {body}")));
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .map_err(|e| EmbedderError::RequestFailed(format!("malformed response: {e}")))?;

        // Backends may return entries out of order; the index field is the
        // contract for pairing them back to inputs.
        parsed.data.sort_by_key(|entry| entry.index);

        if parsed.data.len() != texts.len() {
            return Err(EmbedderError::ShapeMismatch {
                expected: texts.len(),
                got: parsed.data.len(),
            });
        }

        let vectors: Vec<Vec<f32>> = parsed.data.into_iter().map(|d| d.embedding).collect();
        for vector in &vectors {
            if vector.len() != self.dimensions {
                return Err(EmbedderError::DimensionMismatch {
                    expected: self.dimensions,
                    got: vector.len(),
                });
            }
        }

        Ok(vectors)
    }
}

impl Embedder for HttpEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        let mut vectors = self.request(&[text])?;
        vectors.pop().ok_or(EmbedderError::ShapeMismatch {
            expected: 1,
            got: 0,
        })
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(texts)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}
