//! HTTP client for one record server API

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{NoloError, Result};
use crate::protocol::{
    ApiErrorBody, DeleteKind, DeleteResponse, QueryParams, WriteBody, WriteResponse, ACTOR_HEADER,
};
use crate::query::QueryRequest;

/// Talks to any server in the list; every call names its base URL.
#[derive(Debug, Clone)]
pub struct ServerClient {
    http: Client,
    api_prefix: String,
    actor: Option<String>,
}

impl ServerClient {
    pub fn new(timeout: Duration, api_prefix: &str, actor: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NoloError::Config(format!("http client: {}", e)))?;
        Ok(Self {
            http,
            api_prefix: api_prefix.trim_matches('/').to_string(),
            actor,
        })
    }

    pub async fn write(&self, server: &str, body: &WriteBody) -> Result<WriteResponse> {
        let url = self.endpoint(server, &["write", ""])?;
        let response = self.send(server, self.http.post(url).json(body)).await?;
        decode(server, response).await
    }

    pub async fn patch(&self, server: &str, key: &str, changes: &Value) -> Result<Value> {
        let url = self.endpoint(server, &["patch", key])?;
        let response = self.send(server, self.http.patch(url).json(changes)).await?;
        decode(server, response).await
    }

    pub async fn delete(&self, server: &str, key: &str, kind: DeleteKind) -> Result<DeleteResponse> {
        let mut url = self.endpoint(server, &["delete", key])?;
        url.query_pairs_mut().append_pair("type", kind.as_str());
        let response = self.send(server, self.http.delete(url)).await?;
        decode(server, response).await
    }

    /// `Ok(None)` when the server answers 404
    pub async fn read(&self, server: &str, key: &str) -> Result<Option<Value>> {
        let url = self.endpoint(server, &["read", key])?;
        let response = self.send(server, self.http.get(url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        decode(server, response).await.map(Some)
    }

    pub async fn query(&self, server: &str, request: &QueryRequest) -> Result<Vec<Value>> {
        let mut url = self.endpoint(server, &["query", &request.user_id])?;
        {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in QueryParams::pairs(request) {
                pairs.append_pair(name, &value);
            }
        }
        let response = self
            .send(server, self.http.post(url).json(&request.condition))
            .await?;
        decode(server, response).await
    }

    fn endpoint(&self, server: &str, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(server)
            .map_err(|e| NoloError::Config(format!("invalid server url {}: {}", server, e)))?;
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| NoloError::Config(format!("server url cannot be a base: {}", server)))?;
            path.pop_if_empty();
            for part in self.api_prefix.split('/').filter(|p| !p.is_empty()) {
                path.push(part);
            }
            path.extend(segments);
        }
        Ok(url)
    }

    async fn send(&self, server: &str, request: RequestBuilder) -> Result<Response> {
        let request = match &self.actor {
            Some(actor) => request.header(ACTOR_HEADER, actor),
            None => request,
        };
        request.send().await.map_err(|e| {
            let reason = if e.is_timeout() {
                "request timed out".to_string()
            } else {
                e.to_string()
            };
            NoloError::remote(server, reason)
        })
    }
}

/// Decode a 2xx body; map error statuses back onto the taxonomy
async fn decode<T: DeserializeOwned>(server: &str, response: Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| NoloError::remote(server, format!("invalid response body: {}", e)));
    }

    let message = match response.json::<ApiErrorBody>().await {
        Ok(body) => body.error,
        Err(_) => status.to_string(),
    };
    Err(match status {
        StatusCode::NOT_FOUND => NoloError::NotFound(message),
        StatusCode::UNAUTHORIZED => NoloError::Unauthorized(message),
        StatusCode::FORBIDDEN => NoloError::Forbidden(message),
        StatusCode::BAD_REQUEST => NoloError::MalformedInput(message),
        _ => NoloError::remote(server, format!("{}: {}", status, message)),
    })
}
