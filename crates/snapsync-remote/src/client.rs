//! Token-aware HTTP executor
//!
//! Every request is issued once. When the server rejects it with an error
//! payload whose key is `token_expired`, a fresh token is requested from the
//! [`ITokenSource`] and the request is retried exactly once with a rebuilt
//! `Authorization` header. Every other failure is surfaced immediately.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use reqwest::header::HeaderMap;
//! use snapsync_remote::{auth::NoTokenSource, client::HttpExecutor};
//!
//! # async fn example() -> Result<(), snapsync_remote::RemoteError> {
//! let http = HttpExecutor::new(Arc::new(NoTokenSource));
//! let value: serde_json::Value = http
//!     .get_json("https://pics.malliina.com/items", &HeaderMap::new())
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::sync::Arc;

use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Body, Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use snapsync_core::domain::IdToken;
use snapsync_core::ports::ITokenSource;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use crate::RemoteError;

/// Error key the backend uses for expired identity tokens
pub const TOKEN_EXPIRED_KEY: &str = "token_expired";

// ============================================================================
// Error payload
// ============================================================================

/// A single error from a `{errors: [...]}` response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub key: String,
    pub message: String,
}

/// Error payload returned by the backend on non-2xx responses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrors {
    pub errors: Vec<ApiError>,
}

impl ApiErrors {
    #[must_use]
    pub fn is_token_expired(&self) -> bool {
        self.errors.iter().any(|e| e.key == TOKEN_EXPIRED_KEY)
    }
}

/// Builds an `Authorization: Bearer` header value
pub fn bearer_header(token: &IdToken) -> Result<HeaderValue, RemoteError> {
    HeaderValue::from_str(&token.bearer())
        .map_err(|_| RemoteError::InvalidHeader("authorization token".to_string()))
}

// ============================================================================
// HttpExecutor
// ============================================================================

/// What to send as the request body; rebuilt for every attempt
enum Payload<'a> {
    Empty,
    Json(Vec<u8>),
    File(&'a Path),
}

/// HTTP client with a single token-refresh retry
#[derive(Clone)]
pub struct HttpExecutor {
    client: Client,
    token_source: Arc<dyn ITokenSource>,
}

impl HttpExecutor {
    /// Creates an executor that refreshes tokens through `token_source`
    pub fn new(token_source: Arc<dyn ITokenSource>) -> Self {
        Self {
            client: Client::new(),
            token_source,
        }
    }

    /// GETs `url` and decodes the JSON response body
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: &HeaderMap,
    ) -> Result<T, RemoteError> {
        let response = self
            .execute(Method::GET, url, headers, &Payload::Empty)
            .await?;
        decode_json(url, response).await
    }

    /// POSTs `body` as JSON and decodes the JSON response body
    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
        headers: &HeaderMap,
    ) -> Result<T, RemoteError> {
        let bytes = serde_json::to_vec(body).map_err(|e| RemoteError::Body {
            url: url.to_string(),
            message: format!("failed to encode request: {e}"),
        })?;
        let response = self
            .execute(Method::POST, url, headers, &Payload::Json(bytes))
            .await?;
        decode_json(url, response).await
    }

    /// POSTs the contents of `path`, streamed from disk
    ///
    /// Returns the status only on success; non-2xx responses are errors.
    pub async fn post_file(
        &self,
        path: &Path,
        url: &str,
        headers: &HeaderMap,
    ) -> Result<StatusCode, RemoteError> {
        let size = tokio::fs::metadata(path).await?.len();
        info!(path = %path.display(), url, size, "Uploading file");
        let response = self
            .execute(Method::POST, url, headers, &Payload::File(path))
            .await?;
        info!(path = %path.display(), url, "Uploaded file");
        Ok(response.status())
    }

    /// DELETEs `url`
    pub async fn delete(&self, url: &str, headers: &HeaderMap) -> Result<StatusCode, RemoteError> {
        let response = self
            .execute(Method::DELETE, url, headers, &Payload::Empty)
            .await?;
        Ok(response.status())
    }

    /// Downloads `url` into `to`, creating parent directories as needed
    ///
    /// Returns the number of bytes written. A partially written file is
    /// removed when the transfer fails.
    pub async fn download(&self, url: &str, to: &Path) -> Result<u64, RemoteError> {
        if let Some(parent) = to.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        debug!(url, to = %to.display(), "Downloading");
        let response = self
            .execute(Method::GET, url, &HeaderMap::new(), &Payload::Empty)
            .await?;

        match write_body(response, to).await {
            Ok(written) => {
                info!(url, to = %to.display(), bytes = written, "Downloaded");
                Ok(written)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(to).await;
                Err(e)
            }
        }
    }

    /// Runs a request, retrying once with a fresh token on `token_expired`
    async fn execute(
        &self,
        method: Method,
        url: &str,
        headers: &HeaderMap,
        payload: &Payload<'_>,
    ) -> Result<Response, RemoteError> {
        match self.execute_once(method.clone(), url, headers, payload).await {
            Err(expired @ RemoteError::AuthExpired { .. }) => {
                let token = match self.token_source.fetch_token().await {
                    Ok(Some(token)) => token,
                    Ok(None) => {
                        warn!(url, "Token expired and no session to renew it");
                        return Err(expired);
                    }
                    Err(e) => {
                        warn!(url, error = %e, "Token expired and renewal failed");
                        return Err(expired);
                    }
                };
                debug!(url, "Retrying with a renewed token");
                let mut renewed = headers.clone();
                renewed.insert(AUTHORIZATION, bearer_header(&token)?);
                self.execute_once(method, url, &renewed, payload).await
            }
            other => other,
        }
    }

    async fn execute_once(
        &self,
        method: Method,
        url: &str,
        headers: &HeaderMap,
        payload: &Payload<'_>,
    ) -> Result<Response, RemoteError> {
        let mut request = self
            .client
            .request(method, url)
            .headers(headers.clone());
        request = match payload {
            Payload::Empty => request,
            Payload::Json(bytes) => request
                .header(CONTENT_TYPE, "application/json")
                .body(bytes.clone()),
            Payload::File(path) => {
                let file = tokio::fs::File::open(path).await?;
                let size = file.metadata().await?.len();
                request
                    .header(CONTENT_LENGTH, size)
                    .body(Body::wrap_stream(ReaderStream::new(file)))
            }
        };

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.bytes().await.unwrap_or_default();
        let errors = serde_json::from_slice::<ApiErrors>(&body).ok();
        match errors {
            Some(errors) if errors.is_token_expired() => Err(RemoteError::AuthExpired {
                url: url.to_string(),
                status,
            }),
            errors => {
                debug!(url, %status, "Request failed");
                Err(RemoteError::Status {
                    status,
                    url: url.to_string(),
                    errors: errors.map(|e| e.errors).unwrap_or_default(),
                })
            }
        }
    }
}

async fn decode_json<T: DeserializeOwned>(url: &str, response: Response) -> Result<T, RemoteError> {
    let body = response.bytes().await?;
    if body.is_empty() {
        return Err(RemoteError::Body {
            url: url.to_string(),
            message: "empty body".to_string(),
        });
    }
    serde_json::from_slice(&body).map_err(|e| RemoteError::Body {
        url: url.to_string(),
        message: e.to_string(),
    })
}

async fn write_body(response: Response, to: &Path) -> Result<u64, RemoteError> {
    let mut file = tokio::fs::File::create(to).await?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_expired_detection() {
        let errors: ApiErrors = serde_json::from_str(
            r#"{"errors":[{"key":"input","message":"bad"},{"key":"token_expired","message":"Expired."}]}"#,
        )
        .unwrap();
        assert!(errors.is_token_expired());

        let errors: ApiErrors =
            serde_json::from_str(r#"{"errors":[{"key":"backend","message":"boom"}]}"#).unwrap();
        assert!(!errors.is_token_expired());
    }

    #[test]
    fn test_bearer_header() {
        let token = IdToken::new("abc").unwrap();
        assert_eq!(bearer_header(&token).unwrap(), "Bearer abc");

        let token = IdToken::new("bad\ntoken").unwrap();
        assert!(matches!(
            bearer_header(&token),
            Err(RemoteError::InvalidHeader(_))
        ));
    }
}
