//! HTTP client for a running SunCube server.

use bytes::Bytes;
use reqwest::{Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use suncube_api::error::ApiErrorResponse;
use suncube_core::error::{AppError, ErrorKind};

/// Thin JSON client over the Status API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
}

impl ApiClient {
    /// Create a client for the server at `base_url`.
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// GET a JSON resource.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, AppError> {
        let response = self
            .http
            .get(format!("{}{path}", self.base_url))
            .send()
            .await
            .map_err(unreachable_server)?;
        decode(response).await
    }

    /// POST a JSON body and decode the JSON reply.
    pub async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        actor: Option<&str>,
    ) -> Result<T, AppError> {
        let mut request = self
            .http
            .post(format!("{}{path}", self.base_url))
            .json(body);
        if let Some(actor) = actor {
            request = request.header(suncube_api::extractors::ACTOR_HEADER, actor);
        }
        let response = request.send().await.map_err(unreachable_server)?;
        decode(response).await
    }

    /// Download raw bytes from an absolute URL.
    pub async fn download(&self, url: &str) -> Result<Bytes, AppError> {
        let response = self.http.get(url).send().await.map_err(unreachable_server)?;
        let response = check(response).await?;
        response
            .bytes()
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Internal, "Failed to read download", e))
    }
}

fn unreachable_server(e: reqwest::Error) -> AppError {
    AppError::with_source(ErrorKind::ServiceUnavailable, "Server unreachable", e)
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, AppError> {
    let response = check(response).await?;
    response.json::<T>().await.map_err(|e| {
        AppError::with_source(ErrorKind::Serialization, "Unexpected response body", e)
    })
}

/// Turn an error status into an [`AppError`] of the matching kind.
async fn check(response: Response) -> Result<Response, AppError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.json::<ApiErrorResponse>().await.ok();
    let message = body
        .as_ref()
        .map(|b| b.message.clone())
        .unwrap_or_else(|| format!("Request failed with status {status}"));
    let code = body.as_ref().map(|b| b.error.as_str()).unwrap_or_default();

    let kind = match status {
        StatusCode::BAD_REQUEST => ErrorKind::Validation,
        StatusCode::FORBIDDEN => ErrorKind::Forbidden,
        StatusCode::NOT_FOUND => ErrorKind::NotFound,
        StatusCode::CONFLICT if code == "NOT_READY" => ErrorKind::NotReady,
        StatusCode::CONFLICT => ErrorKind::Conflict,
        StatusCode::SERVICE_UNAVAILABLE => ErrorKind::ServiceUnavailable,
        _ => ErrorKind::Internal,
    };
    Err(AppError::new(kind, message))
}
