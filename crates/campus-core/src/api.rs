//! Course backend REST client.
//!
//! Every call takes the bearer token explicitly; the session store owns it.
//! Errors are classified into [`ApiErrorKind`] so views can show the
//! 401/403-specific messages.

use std::fmt;
use std::time::Duration;

use anyhow::Context;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ApiConfig;

/// A course as returned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Payload for creating a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewCourse {
    pub title: String,
    pub description: String,
}

impl NewCourse {
    /// Both fields must contain something other than whitespace.
    pub fn is_valid(&self) -> bool {
        !self.title.trim().is_empty() && !self.description.trim().is_empty()
    }
}

/// Categories of backend errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// HTTP 401
    Unauthorized,
    /// HTTP 403
    Forbidden,
    /// Any other non-2xx status
    Server,
    /// Transport failure (connect, timeout)
    Network,
    /// 2xx with a body that does not parse
    Decode,
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiErrorKind::Unauthorized => write!(f, "unauthorized"),
            ApiErrorKind::Forbidden => write!(f, "forbidden"),
            ApiErrorKind::Server => write!(f, "server"),
            ApiErrorKind::Network => write!(f, "network"),
            ApiErrorKind::Decode => write!(f, "decode"),
        }
    }
}

/// Which backend call failed; selects the wording of 403 messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiOperation {
    Roles,
    ListCourses,
    CreateCourse,
}

/// Structured backend error.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    /// HTTP status, when a response was received
    pub status: Option<u16>,
    /// One-line summary
    pub message: String,
    /// Raw response body or transport error chain
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
            details: None,
        }
    }

    /// Classifies a non-2xx response.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let kind = match status {
            StatusCode::UNAUTHORIZED => ApiErrorKind::Unauthorized,
            StatusCode::FORBIDDEN => ApiErrorKind::Forbidden,
            _ => ApiErrorKind::Server,
        };
        Self {
            kind,
            status: Some(status.as_u16()),
            message: format!("HTTP {}", status.as_u16()),
            details: (!body.is_empty()).then(|| body.to_string()),
        }
    }

    fn network(err: &reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            "request timed out".to_string()
        } else if err.is_connect() {
            "could not reach the course service".to_string()
        } else {
            "request failed".to_string()
        };
        Self {
            kind: ApiErrorKind::Network,
            status: None,
            message,
            details: Some(error_chain(err)),
        }
    }

    fn decode(err: impl fmt::Display) -> Self {
        Self {
            kind: ApiErrorKind::Decode,
            status: None,
            message: "unexpected response from the course service".to_string(),
            details: Some(err.to_string()),
        }
    }

    /// Whether a GET may be retried after this error.
    pub fn is_transient(&self) -> bool {
        matches!(self.kind, ApiErrorKind::Network | ApiErrorKind::Server)
    }

    /// Message shown to the user for a failed `op`.
    pub fn user_message(&self, op: ApiOperation) -> String {
        match self.kind {
            ApiErrorKind::Unauthorized => "401 – invalid or expired token.".to_string(),
            ApiErrorKind::Forbidden => match op {
                ApiOperation::CreateCourse => {
                    "403 – insufficient role to create a course.".to_string()
                }
                ApiOperation::Roles | ApiOperation::ListCourses => {
                    "403 – access denied (insufficient role).".to_string()
                }
            },
            ApiErrorKind::Server => match self.status {
                Some(status) => format!("server error: {status}"),
                None => "server error".to_string(),
            },
            ApiErrorKind::Network => format!("network error: {}", self.message),
            ApiErrorKind::Decode => self.message.clone(),
        }
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut chain = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push_str(": ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    chain
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Extracts `realm_access.roles`, ignoring anything that is not a string.
pub fn roles_from_claims(claims: &Value) -> Vec<String> {
    claims
        .get("realm_access")
        .and_then(|access| access.get("roles"))
        .and_then(Value::as_array)
        .map(|roles| {
            roles
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// HTTP client for the course backend.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
    max_retries: u32,
    retry_backoff: Duration,
}

impl ApiClient {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &ApiConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .context("Failed to build API HTTP client")?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// `GET /me`: the caller's realm roles.
    ///
    /// # Errors
    /// Returns an [`ApiError`] classified by status or transport failure.
    pub async fn roles(&self, token: &str) -> ApiResult<Vec<String>> {
        let claims: Value = self.get_json("/me", token).await?;
        Ok(roles_from_claims(&claims))
    }

    /// `GET /courses`
    ///
    /// # Errors
    /// Returns an [`ApiError`] classified by status or transport failure.
    pub async fn list_courses(&self, token: &str) -> ApiResult<Vec<Course>> {
        self.get_json("/courses", token).await
    }

    /// `POST /courses`. Never retried.
    ///
    /// # Errors
    /// Returns an [`ApiError`] classified by status or transport failure.
    pub async fn create_course(&self, token: &str, course: &NewCourse) -> ApiResult<Course> {
        let response = self
            .http
            .post(self.url("/courses"))
            .bearer_auth(token)
            .json(course)
            .send()
            .await
            .map_err(|err| ApiError::network(&err))?;
        let course: Course = decode(response).await?;
        tracing::info!(id = course.id, "course created");
        Ok(course)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, token: &str) -> ApiResult<T> {
        let mut attempt = 0u32;
        loop {
            match self.get_once(path, token).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.retry_backoff * attempt;
                    tracing::warn!(
                        path,
                        attempt,
                        kind = %err.kind,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "retrying request"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    tracing::debug!(path, kind = %err.kind, status = ?err.status, "request failed");
                    return Err(err);
                }
            }
        }
    }

    async fn get_once<T: DeserializeOwned>(&self, path: &str, token: &str) -> ApiResult<T> {
        let response = self
            .http
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|err| ApiError::network(&err))?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> ApiResult<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ApiError::from_status(status, &body));
    }
    let body = response
        .bytes()
        .await
        .map_err(|err| ApiError::network(&err))?;
    serde_json::from_slice(&body).map_err(ApiError::decode)
}
