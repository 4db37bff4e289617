use schemars::schema_for;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use crate::types::*;
use crate::util::extract_json;

#[derive(Error, Debug)]
pub enum OracleError {
    #[error("Oracle HTTP error: {0}")]
    Http(String),

    #[error("Oracle returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Malformed oracle response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for OracleError {
    fn from(e: reqwest::Error) -> Self {
        OracleError::Http(e.to_string())
    }
}

/// Client for a local llama.cpp server speaking the OpenAI chat protocol.
/// The interesting entry point is [`Oracle::extract`], which requests
/// schema-constrained output and validates it into a typed value.
#[derive(Clone)]
pub struct Oracle {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl Oracle {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, OracleError> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        debug!(model = %request.model, "Oracle chat request");

        let response = self.http.post(&url).json(request).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Api { status, body });
        }

        Ok(response.json().await?)
    }

    /// One structured call: system + user prompt in, `T` out. The response
    /// is constrained to `T`'s JSON schema server-side; parsing still guards
    /// against drift and prose-wrapped output.
    pub async fn extract<T: DeserializeOwned + schemars::JsonSchema>(
        &self,
        system: &str,
        user: &str,
    ) -> Result<T, OracleError> {
        let schema = serde_json::to_value(schema_for!(T))
            .map_err(|e| OracleError::Malformed(e.to_string()))?;

        let request = ChatRequest::new(&self.model)
            .message(WireMessage::system(system))
            .message(WireMessage::user(user))
            .json_schema(schema);

        let response = self.chat(&request).await?;
        let text = response
            .text()
            .ok_or_else(|| OracleError::Malformed("empty response".to_string()))?;

        let json = extract_json(text)
            .ok_or_else(|| OracleError::Malformed(format!("no JSON in response: {text:.120}")))?;

        serde_json::from_str(json).map_err(|e| OracleError::Malformed(e.to_string()))
    }
}
